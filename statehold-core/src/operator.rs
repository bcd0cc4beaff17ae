//! Operator gateway.
//!
//! An [`Operator`] has its own address and is registered as the operator of
//! one or more machines. It forwards a user's action to its engine with
//! itself as caller and the user as the subject, so users never need
//! operator rights on the engine.

use crate::address::Address;
use crate::engine::Engine;
use crate::error::CoreError;
use crate::event::ActionResponse;
use crate::id::Id;
use crate::lifecycle::Lifecycle;
use parking_lot::RwLock;
use std::sync::Arc;

pub struct Operator {
    address: Address,
    lifecycle: Lifecycle,
    engine: RwLock<Option<Arc<Engine>>>,
}

impl Operator {
    /// Deploys an original operator bound to `engine`, on the engine's host.
    pub fn deploy(engine: Arc<Engine>) -> Arc<Self> {
        let address = engine.host().allocate_address();
        tracing::info!("operator deployed at {} for engine {}", address, engine.address());
        Arc::new(Self {
            address,
            lifecycle: Lifecycle::original(),
            engine: RwLock::new(Some(engine)),
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn is_clone(&self) -> bool {
        self.lifecycle.is_clone()
    }

    /// The engine this operator forwards to, once initialized.
    pub fn engine(&self) -> Option<Arc<Engine>> {
        self.engine.read().clone()
    }

    /// Binds a clone to its engine. Only the first call succeeds.
    pub fn init(&self, engine: Arc<Engine>) -> Result<(), CoreError> {
        self.lifecycle.initialize()?;
        *self.engine.write() = Some(engine);
        Ok(())
    }

    /// Creates a clone of this operator bound to `engine`. Clones cannot be
    /// cloned again.
    pub fn clone_operator(&self, engine: Arc<Engine>) -> Result<Arc<Operator>, CoreError> {
        self.lifecycle.require_cloneable()?;

        let clone = Arc::new(Self {
            address: engine.host().allocate_address(),
            lifecycle: Lifecycle::pending_clone(),
            engine: RwLock::new(None),
        });
        let engine_address = engine.address();
        clone.init(engine)?;

        tracing::info!(
            "operator {} cloned to {} for engine {}",
            self.address,
            clone.address,
            engine_address
        );
        Ok(clone)
    }

    /// Invokes an action on behalf of `user`.
    pub fn invoke_action(
        &self,
        user: Address,
        machine_id: Id,
        action_id: Id,
    ) -> Result<ActionResponse, CoreError> {
        self.lifecycle.require_initialized()?;
        let engine = self.engine().ok_or(CoreError::NotInitialized)?;
        engine.invoke_action(self.address, user, machine_id, action_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{Machine, State};
    use crate::host::Host;

    fn owner() -> Address {
        Address::derive(b"owner")
    }

    fn user() -> Address {
        Address::derive(b"user")
    }

    fn door(operator: Address) -> Machine {
        Machine::new("LockableDoor", operator)
            .with_state(
                State::new("Closed")
                    .with_transition("Open", "Opened")
                    .with_transition("Lock", "Locked"),
            )
            .with_state(State::new("Locked").with_transition("Unlock", "Closed"))
            .with_state(State::new("Opened").with_transition("Close", "Closed"))
    }

    fn setup() -> (Arc<Engine>, Arc<Operator>) {
        let engine = Engine::deploy(Arc::new(Host::new()), owner()).unwrap();
        let operator = Operator::deploy(engine.clone());
        engine
            .install_machine(owner(), door(operator.address()))
            .unwrap();
        (engine, operator)
    }

    #[test]
    fn test_forwards_user_actions() {
        let (engine, operator) = setup();

        let response = operator
            .invoke_action(user(), Id::derive("LockableDoor"), Id::derive("Open"))
            .unwrap();
        assert_eq!(response.next_state_name, "Opened");
        assert_eq!(
            engine
                .get_user_state(user(), Id::derive("LockableDoor"))
                .unwrap(),
            Id::derive("Opened")
        );
        // The operator moved the user, not itself
        assert!(engine.get_last_position(operator.address()).is_none());
    }

    #[test]
    fn test_user_cannot_bypass_operator() {
        let (engine, _operator) = setup();
        let result = engine.invoke_action(
            user(),
            user(),
            Id::derive("LockableDoor"),
            Id::derive("Open"),
        );
        assert_eq!(result, Err(CoreError::OnlyOperator));
    }

    #[test]
    fn test_errors_pass_through() {
        let (_engine, operator) = setup();
        assert_eq!(
            operator.invoke_action(user(), Id::derive("LockableDoor"), Id::derive("Close")),
            Err(CoreError::NoSuchAction)
        );
        assert_eq!(
            operator.invoke_action(user(), Id::derive("Nope"), Id::derive("Open")),
            Err(CoreError::NoSuchMachine)
        );
    }

    #[test]
    fn test_clone_operator() {
        let (engine, operator) = setup();
        let instance = engine.clone_instance(owner()).unwrap();
        let clone = operator.clone_operator(instance.clone()).unwrap();

        assert!(clone.is_clone());
        assert_ne!(clone.address(), operator.address());
        assert_eq!(clone.engine().unwrap().address(), instance.address());

        instance.install_machine(owner(), door(clone.address())).unwrap();
        clone
            .invoke_action(user(), Id::derive("LockableDoor"), Id::derive("Lock"))
            .unwrap();
        assert_eq!(
            instance
                .get_user_state(user(), Id::derive("LockableDoor"))
                .unwrap(),
            Id::derive("Locked")
        );
        assert!(engine.get_last_position(user()).is_none());

        assert_eq!(
            clone.clone_operator(engine.clone()).err(),
            Some(CoreError::Multiplicity)
        );
        assert_eq!(clone.init(engine.clone()), Err(CoreError::AlreadyInitialized));
        assert_eq!(operator.init(engine), Err(CoreError::AlreadyInitialized));
    }
}
