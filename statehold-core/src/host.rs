//! Execution host: deployed capabilities and address allocation.
//!
//! The engine never runs guard or initializer logic itself. It calls into
//! capabilities that were deployed to the host and relays whatever they
//! answer. An address with no capability behind it is a plain account.

use crate::address::Address;
use crate::guard::GuardCall;
use crate::id::Id;
use dashmap::DashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Failure returned by a capability call.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Revert {
    /// Reason given by the capability, if any.
    pub reason: Option<String>,
}

impl Revert {
    pub fn with_reason(reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
        }
    }

    /// A revert carrying no reason.
    pub fn silent() -> Self {
        Self { reason: None }
    }
}

impl fmt::Display for Revert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            Some(reason) => f.write_str(reason),
            None => f.write_str("reverted"),
        }
    }
}

/// Externally supplied logic deployed at an address.
///
/// A single capability may serve guards for several states; it tells them
/// apart by `selector` (see [`crate::guard::guard_selector`]). Unknown
/// selectors should revert.
pub trait Capability: Send + Sync {
    /// Runs the guard function identified by `selector`.
    fn call_guard(&self, selector: Id, call: &GuardCall<'_>) -> Result<String, Revert> {
        let _ = (selector, call);
        Err(Revert::silent())
    }

    /// Runs a one-shot initializer during machine install.
    fn initialize(&self, calldata: &[u8]) -> Result<(), Revert> {
        let _ = calldata;
        Err(Revert::silent())
    }
}

/// The environment engine instances run in.
///
/// Shared by an original engine and all of its clones.
pub struct Host {
    /// Deployed capabilities by address.
    code: DashMap<Address, Arc<dyn Capability>>,

    /// Creation nonce for address allocation.
    nonce: AtomicU64,
}

impl Host {
    pub fn new() -> Self {
        Self {
            code: DashMap::new(),
            nonce: AtomicU64::new(0),
        }
    }

    /// Allocates a fresh, never-before-returned address.
    pub fn allocate_address(&self) -> Address {
        let nonce = self.nonce.fetch_add(1, Ordering::SeqCst);
        let mut seed = b"statehold:create:".to_vec();
        seed.extend_from_slice(&nonce.to_be_bytes());
        Address::derive(&seed)
    }

    /// Deploys a capability at a fresh address.
    pub fn deploy(&self, capability: Arc<dyn Capability>) -> Address {
        let address = self.allocate_address();
        self.code.insert(address, capability);
        tracing::debug!("deployed capability at {}", address);
        address
    }

    /// Returns true if a capability is deployed at `address`.
    pub fn has_code(&self, address: Address) -> bool {
        self.code.contains_key(&address)
    }

    /// Returns the capability deployed at `address`.
    pub fn code(&self, address: Address) -> Option<Arc<dyn Capability>> {
        self.code.get(&address).map(|r| r.value().clone())
    }

    /// Returns the number of deployed capabilities.
    pub fn capability_count(&self) -> usize {
        self.code.len()
    }
}

impl Default for Host {
    fn default() -> Self {
        Self::new()
    }
}
