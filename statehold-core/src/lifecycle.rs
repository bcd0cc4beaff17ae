//! Clone and initialization bookkeeping shared by engines and operators.
//!
//! An original instance is initialized when it is created and may be
//! cloned. A clone starts uninitialized, is initialized exactly once by its
//! creator, and can never be cloned itself.

use crate::error::CoreError;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug)]
pub(crate) struct Lifecycle {
    is_clone: bool,
    initialized: AtomicBool,
}

impl Lifecycle {
    /// An original instance, initialized at creation.
    pub(crate) fn original() -> Self {
        Self {
            is_clone: false,
            initialized: AtomicBool::new(true),
        }
    }

    /// A freshly created clone, awaiting its single initialization.
    pub(crate) fn pending_clone() -> Self {
        Self {
            is_clone: true,
            initialized: AtomicBool::new(false),
        }
    }

    pub(crate) fn is_clone(&self) -> bool {
        self.is_clone
    }

    pub(crate) fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Flips the instance to initialized; fails on every call after the first.
    pub(crate) fn initialize(&self) -> Result<(), CoreError> {
        self.initialized
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| ())
            .map_err(|_| CoreError::AlreadyInitialized)
    }

    pub(crate) fn require_initialized(&self) -> Result<(), CoreError> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(CoreError::NotInitialized)
        }
    }

    pub(crate) fn require_cloneable(&self) -> Result<(), CoreError> {
        if self.is_clone {
            Err(CoreError::Multiplicity)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_original() {
        let lc = Lifecycle::original();
        assert!(!lc.is_clone());
        assert!(lc.require_initialized().is_ok());
        assert!(lc.require_cloneable().is_ok());
        assert_eq!(lc.initialize(), Err(CoreError::AlreadyInitialized));
    }

    #[test]
    fn test_clone_initializes_once() {
        let lc = Lifecycle::pending_clone();
        assert_eq!(lc.require_initialized(), Err(CoreError::NotInitialized));
        assert_eq!(lc.require_cloneable(), Err(CoreError::Multiplicity));

        lc.initialize().unwrap();
        assert!(lc.is_initialized());
        assert_eq!(lc.initialize(), Err(CoreError::AlreadyInitialized));
    }
}
