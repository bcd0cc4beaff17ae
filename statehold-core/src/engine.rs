//! State machine engine - coordinates the registry, guards and positions.
//!
//! One [`Engine`] is one independently owned, independently stateful
//! instance. Every mutating entrypoint runs under the instance's ledger
//! lock: calls from other threads wait their turn, and a call that re-enters
//! the instance from inside a guard or initializer is rejected with
//! [`CoreError::ReentrantCall`]. A call either commits completely or
//! returns an error with nothing changed.

use crate::address::Address;
use crate::definition::{Machine, State, Transition};
use crate::error::CoreError;
use crate::event::{ActionResponse, EngineEvent, EventJournal};
use crate::guard::{self, guard_selector, GuardCall, GuardMode};
use crate::host::Host;
use crate::id::Id;
use crate::interface;
use crate::lifecycle::Lifecycle;
use crate::position::{LastPosition, Position, PositionBook};
use crate::registry::MachineRegistry;
use parking_lot::{ReentrantMutex, ReentrantMutexGuard, RwLock};
use std::cell::Cell;
use std::sync::Arc;

/// Held for the duration of a mutating call. Clears the busy flag on drop.
struct LedgerGuard<'a> {
    busy: ReentrantMutexGuard<'a, Cell<bool>>,
}

impl Drop for LedgerGuard<'_> {
    fn drop(&mut self) {
        self.busy.set(false);
    }
}

/// Everything `invoke_action` needs, copied out of the registry so no lock
/// is held while guards run.
struct ResolvedAction {
    machine_name: String,
    action_name: String,
    prior: State,
    next: State,
}

/// The state machine engine.
pub struct Engine {
    /// This instance's own address.
    address: Address,

    host: Arc<Host>,

    lifecycle: Lifecycle,

    owner: RwLock<Address>,

    registry: RwLock<MachineRegistry>,

    positions: PositionBook,

    journal: EventJournal,

    /// Serializes mutating calls; the flag marks a call in progress.
    ledger: ReentrantMutex<Cell<bool>>,
}

impl Engine {
    /// Deploys an original (cloneable) instance owned by `owner`.
    pub fn deploy(host: Arc<Host>, owner: Address) -> Result<Arc<Self>, CoreError> {
        if owner.is_zero() {
            return Err(CoreError::InvalidAddress);
        }

        let engine = Self {
            address: host.allocate_address(),
            host,
            lifecycle: Lifecycle::original(),
            owner: RwLock::new(owner),
            registry: RwLock::new(MachineRegistry::new()),
            positions: PositionBook::new(),
            journal: EventJournal::new(),
            ledger: ReentrantMutex::new(Cell::new(false)),
        };
        engine.journal.emit(EngineEvent::OwnershipTransferred {
            previous_owner: Address::ZERO,
            new_owner: owner,
        });
        tracing::info!("engine deployed at {} (owner {})", engine.address, owner);

        Ok(Arc::new(engine))
    }

    /// A clone awaiting [`Engine::init`]. Shares the host, nothing else.
    fn pending_clone(host: Arc<Host>) -> Self {
        Self {
            address: host.allocate_address(),
            host,
            lifecycle: Lifecycle::pending_clone(),
            owner: RwLock::new(Address::ZERO),
            registry: RwLock::new(MachineRegistry::new()),
            positions: PositionBook::new(),
            journal: EventJournal::new(),
            ledger: ReentrantMutex::new(Cell::new(false)),
        }
    }

    /// Enters the ledger for a mutating call.
    fn begin(&self) -> Result<LedgerGuard<'_>, CoreError> {
        let busy = self.ledger.lock();
        if busy.get() {
            tracing::warn!("rejected reentrant call into engine {}", self.address);
            return Err(CoreError::ReentrantCall);
        }
        busy.set(true);
        Ok(LedgerGuard { busy })
    }

    fn only_owner(&self, caller: Address) -> Result<(), CoreError> {
        if *self.owner.read() != caller {
            return Err(CoreError::OnlyOwner);
        }
        Ok(())
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Creates a new, independently stateful instance owned by `caller`.
    pub fn clone_instance(&self, caller: Address) -> Result<Arc<Engine>, CoreError> {
        let _ledger = self.begin()?;
        self.lifecycle.require_cloneable()?;
        self.lifecycle.require_initialized()?;
        self.only_owner(caller)?;

        let instance = Arc::new(Engine::pending_clone(self.host.clone()));
        instance.init(caller)?;

        self.journal.emit(EngineEvent::InstanceCloned {
            owner: caller,
            instance: instance.address,
        });
        tracing::info!(
            "engine {} cloned to {} (owner {})",
            self.address,
            instance.address,
            caller
        );

        Ok(instance)
    }

    /// Initializes a clone with its owner. Fails on any instance that is
    /// already initialized, including every original.
    pub fn init(&self, owner: Address) -> Result<(), CoreError> {
        let _ledger = self.begin()?;
        if self.lifecycle.is_initialized() {
            return Err(CoreError::AlreadyInitialized);
        }
        if owner.is_zero() {
            return Err(CoreError::InvalidAddress);
        }
        self.lifecycle.initialize()?;

        *self.owner.write() = owner;
        self.journal.emit(EngineEvent::OwnershipTransferred {
            previous_owner: Address::ZERO,
            new_owner: owner,
        });
        Ok(())
    }

    pub fn transfer_ownership(&self, caller: Address, new_owner: Address) -> Result<(), CoreError> {
        let _ledger = self.begin()?;
        self.lifecycle.require_initialized()?;
        self.only_owner(caller)?;
        if new_owner.is_zero() {
            return Err(CoreError::InvalidAddress);
        }

        let previous_owner = std::mem::replace(&mut *self.owner.write(), new_owner);
        self.journal.emit(EngineEvent::OwnershipTransferred {
            previous_owner,
            new_owner,
        });
        tracing::info!(
            "engine {} ownership {} -> {}",
            self.address,
            previous_owner,
            new_owner
        );
        Ok(())
    }

    // =========================================================================
    // Machine Definition Management
    // =========================================================================

    /// Installs a machine. Owner only.
    pub fn install_machine(&self, caller: Address, machine: Machine) -> Result<(), CoreError> {
        let _ledger = self.begin()?;
        self.lifecycle.require_initialized()?;
        self.only_owner(caller)?;

        let (machine_id, machine_name) = (machine.id, machine.name.clone());
        self.registry.write().install(machine, &self.host)?;

        self.emit_installed(machine_id, machine_name);
        Ok(())
    }

    /// Installs a machine after one call to `initializer` with `calldata`.
    /// Nothing is stored if validation or the initializer fails.
    pub fn install_and_initialize_machine(
        &self,
        caller: Address,
        machine: Machine,
        initializer: Address,
        calldata: &[u8],
    ) -> Result<(), CoreError> {
        let _ledger = self.begin()?;
        self.lifecycle.require_initialized()?;
        self.only_owner(caller)?;

        self.registry.read().check_install(&machine, &self.host)?;

        let capability = self
            .host
            .code(initializer)
            .ok_or(CoreError::CodelessInitializer)?;
        if let Err(revert) = capability.initialize(calldata) {
            tracing::warn!(
                "initializer {} for machine {} reverted: {}",
                initializer,
                machine.name,
                revert
            );
            return Err(match revert.reason {
                Some(reason) => CoreError::InitializerRejected { reason },
                None => CoreError::InitializerReverted,
            });
        }

        let (machine_id, machine_name) = (machine.id, machine.name.clone());
        self.registry.write().insert_unchecked(machine);

        self.emit_installed(machine_id, machine_name);
        Ok(())
    }

    fn emit_installed(&self, machine_id: Id, machine_name: String) {
        tracing::info!("installed machine {} ({})", machine_name, machine_id);
        self.journal.emit(EngineEvent::MachineInstalled {
            machine_id,
            machine_name,
        });
    }

    /// Adds a state to an installed machine. Owner only.
    pub fn add_state(&self, caller: Address, machine_id: Id, state: State) -> Result<(), CoreError> {
        let _ledger = self.begin()?;
        self.lifecycle.require_initialized()?;
        self.only_owner(caller)?;

        let (state_id, state_name) = (state.id, state.name.clone());
        self.registry.write().add_state(machine_id, state, &self.host)?;

        tracing::info!("added state {} to machine {}", state_name, machine_id);
        self.journal.emit(EngineEvent::StateAdded {
            machine_id,
            state_id,
            state_name,
        });
        Ok(())
    }

    /// Replaces an existing state. Owner only.
    pub fn update_state(
        &self,
        caller: Address,
        machine_id: Id,
        state: State,
    ) -> Result<(), CoreError> {
        let _ledger = self.begin()?;
        self.lifecycle.require_initialized()?;
        self.only_owner(caller)?;

        let (state_id, state_name) = (state.id, state.name.clone());
        self.registry
            .write()
            .update_state(machine_id, state, &self.host)?;

        tracing::info!("updated state {} on machine {}", state_name, machine_id);
        self.journal.emit(EngineEvent::StateUpdated {
            machine_id,
            state_id,
            state_name,
        });
        Ok(())
    }

    /// Appends a transition to a state. Owner only.
    pub fn add_transition(
        &self,
        caller: Address,
        machine_id: Id,
        state_id: Id,
        transition: Transition,
    ) -> Result<(), CoreError> {
        let _ledger = self.begin()?;
        self.lifecycle.require_initialized()?;
        self.only_owner(caller)?;

        let (action_name, target_state_name) = (
            transition.action_name.clone(),
            transition.target_state_name.clone(),
        );
        self.registry
            .write()
            .add_transition(machine_id, state_id, transition)?;

        self.journal.emit(EngineEvent::TransitionAdded {
            machine_id,
            state_id,
            action_name,
            target_state_name,
        });
        Ok(())
    }

    // =========================================================================
    // Action Invocation
    // =========================================================================

    /// Moves `user` along the transition for `action_id` from their current
    /// state in `machine_id`. Only the machine's operator may call.
    ///
    /// Runs the current state's exit guard, then the target state's enter
    /// guard; any guard failure aborts with no position change.
    pub fn invoke_action(
        &self,
        caller: Address,
        user: Address,
        machine_id: Id,
        action_id: Id,
    ) -> Result<ActionResponse, CoreError> {
        let _ledger = self.begin()?;
        self.lifecycle.require_initialized()?;

        let resolved = self.resolve_action(caller, user, machine_id, action_id)?;
        let ResolvedAction {
            machine_name,
            action_name,
            prior,
            next,
        } = &resolved;

        let exit_message = if prior.exit_guarded {
            self.run_guard(
                user,
                machine_name,
                prior,
                GuardMode::Exit,
                Some(action_name.as_str()),
                &prior.name,
                &next.name,
            )?
        } else {
            String::new()
        };

        let enter_message = if next.enter_guarded {
            self.run_guard(
                user,
                machine_name,
                next,
                GuardMode::Enter,
                Some(action_name.as_str()),
                &prior.name,
                &next.name,
            )?
        } else {
            String::new()
        };

        let sequence = self.positions.record(
            user,
            Position::new(machine_id, prior.id),
            Position::new(machine_id, next.id),
        );

        let response = ActionResponse {
            machine_name: resolved.machine_name.clone(),
            action_name: resolved.action_name.clone(),
            prior_state_name: resolved.prior.name.clone(),
            next_state_name: resolved.next.name.clone(),
            exit_message,
            enter_message,
        };
        tracing::debug!(
            "user {} {}: {} -> {} via '{}' (seq {})",
            user,
            response.machine_name,
            response.prior_state_name,
            response.next_state_name,
            response.action_name,
            sequence
        );
        self.journal.emit(EngineEvent::UserTransitioned {
            user,
            machine_id,
            action_id,
            response: response.clone(),
        });

        Ok(response)
    }

    fn resolve_action(
        &self,
        caller: Address,
        user: Address,
        machine_id: Id,
        action_id: Id,
    ) -> Result<ResolvedAction, CoreError> {
        let registry = self.registry.read();

        let machine = registry
            .machine(machine_id)
            .ok_or(CoreError::NoSuchMachine)?;
        if caller != machine.operator {
            return Err(CoreError::OnlyOperator);
        }

        let current_state_id = self
            .positions
            .current_state(user, machine_id)
            .unwrap_or(machine.initial_state_id);
        let prior = registry
            .state(machine_id, current_state_id)
            .ok_or(CoreError::NoSuchState)?;
        let transition = prior
            .transition(action_id)
            .ok_or(CoreError::NoSuchAction)?;
        let next = registry
            .state(machine_id, transition.target_state_id)
            .ok_or(CoreError::NoSuchState)?;

        Ok(ResolvedAction {
            machine_name: machine.name.clone(),
            action_name: transition.action_name.clone(),
            prior: prior.clone(),
            next: next.clone(),
        })
    }

    /// Dispatches to the state's own guard logic; the selector only names
    /// the function being called.
    #[allow(clippy::too_many_arguments)]
    fn run_guard(
        &self,
        user: Address,
        machine_name: &str,
        state: &State,
        mode: GuardMode,
        action: Option<&str>,
        prior_state: &str,
        next_state: &str,
    ) -> Result<String, CoreError> {
        let guard_logic = state
            .guard_logic
            .filter(|_| state.is_guarded(mode))
            .ok_or(CoreError::NoSuchGuard)?;
        let selector = guard_selector(machine_name, &state.name, mode);

        let call = GuardCall {
            user,
            machine: machine_name,
            state: &state.name,
            mode,
            action,
            prior_state,
            next_state,
        };
        guard::dispatch(&self.host, guard_logic, selector, &call)
    }

    /// Calls a state's guard directly, with no transition and no position
    /// change.
    pub fn call_guard(
        &self,
        user: Address,
        machine_name: &str,
        state_name: &str,
        mode: GuardMode,
    ) -> Result<String, CoreError> {
        let machine_id = Id::derive(machine_name);
        let state = {
            let registry = self.registry.read();
            registry
                .machine(machine_id)
                .ok_or(CoreError::NoSuchMachine)?;
            registry
                .state(machine_id, Id::derive(state_name))
                .cloned()
                .ok_or(CoreError::NoSuchState)?
        };
        self.run_guard(
            user,
            machine_name,
            &state,
            mode,
            None,
            &state.name,
            &state.name,
        )
    }

    // =========================================================================
    // Views
    // =========================================================================

    /// Returns the guard capability registered for a guard selector.
    pub fn get_guard_address(&self, selector: Id) -> Option<Address> {
        self.registry.read().guard_address(selector)
    }

    pub fn get_last_position(&self, user: Address) -> Option<LastPosition> {
        self.positions.last_position(user)
    }

    pub fn get_position_history(&self, user: Address) -> Vec<Position> {
        self.positions.history(user)
    }

    /// The user's current state in a machine, or the machine's initial state
    /// if the user never moved in it.
    pub fn get_user_state(&self, user: Address, machine_id: Id) -> Result<Id, CoreError> {
        let registry = self.registry.read();
        let machine = registry
            .machine(machine_id)
            .ok_or(CoreError::NoSuchMachine)?;
        Ok(self
            .positions
            .current_state(user, machine_id)
            .unwrap_or(machine.initial_state_id))
    }

    pub fn get_machine_uri(&self, machine_id: Id) -> Result<String, CoreError> {
        self.registry
            .read()
            .machine(machine_id)
            .map(|m| m.uri.clone())
            .ok_or(CoreError::NoSuchMachine)
    }

    pub fn get_machine(&self, machine_id: Id) -> Result<Machine, CoreError> {
        self.registry
            .read()
            .machine(machine_id)
            .cloned()
            .ok_or(CoreError::NoSuchMachine)
    }

    pub fn get_state(&self, machine_id: Id, state_id: Id) -> Result<State, CoreError> {
        let registry = self.registry.read();
        registry
            .machine(machine_id)
            .ok_or(CoreError::NoSuchMachine)?;
        registry
            .state(machine_id, state_id)
            .cloned()
            .ok_or(CoreError::NoSuchState)
    }

    /// Returns all installed machine ids, sorted.
    pub fn machine_ids(&self) -> Vec<Id> {
        self.registry.read().machine_ids()
    }

    pub fn supports_interface(&self, interface_id: Id) -> bool {
        interface::supports(interface_id, self.lifecycle.is_clone())
    }

    pub fn owner(&self) -> Address {
        *self.owner.read()
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn is_clone(&self) -> bool {
        self.lifecycle.is_clone()
    }

    pub fn is_initialized(&self) -> bool {
        self.lifecycle.is_initialized()
    }

    pub fn host(&self) -> &Arc<Host> {
        &self.host
    }

    /// All events committed on this instance, oldest first.
    pub fn events(&self) -> Vec<EngineEvent> {
        self.journal.snapshot()
    }

    /// Events committed at or after `cursor`.
    pub fn events_since(&self, cursor: usize) -> Vec<EngineEvent> {
        self.journal.since(cursor)
    }

    /// Number of users who have moved at least once.
    pub fn user_count(&self) -> usize {
        self.positions.user_count()
    }
}
