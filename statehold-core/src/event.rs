//! Engine events and the per-instance event journal.

use crate::address::Address;
use crate::id::{validate_name_lax, validate_name_strict, Id};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Outcome of a successful action invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResponse {
    pub machine_name: String,
    pub action_name: String,
    pub prior_state_name: String,
    pub next_state_name: String,
    /// Message returned by the prior state's exit guard, or empty.
    pub exit_message: String,
    /// Message returned by the next state's enter guard, or empty.
    pub enter_message: String,
}

impl ActionResponse {
    /// Machine and state names are strict, the action name lax.
    pub fn is_valid(&self) -> bool {
        validate_name_strict(&self.machine_name)
            && validate_name_lax(&self.action_name)
            && validate_name_strict(&self.prior_state_name)
            && validate_name_strict(&self.next_state_name)
    }
}

/// Something that happened on an engine instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    MachineInstalled {
        machine_id: Id,
        machine_name: String,
    },
    StateAdded {
        machine_id: Id,
        state_id: Id,
        state_name: String,
    },
    StateUpdated {
        machine_id: Id,
        state_id: Id,
        state_name: String,
    },
    TransitionAdded {
        machine_id: Id,
        state_id: Id,
        action_name: String,
        target_state_name: String,
    },
    UserTransitioned {
        user: Address,
        machine_id: Id,
        action_id: Id,
        response: ActionResponse,
    },
    OwnershipTransferred {
        previous_owner: Address,
        new_owner: Address,
    },
    InstanceCloned {
        owner: Address,
        instance: Address,
    },
}

impl EngineEvent {
    pub fn name(&self) -> &'static str {
        match self {
            EngineEvent::MachineInstalled { .. } => "machine_installed",
            EngineEvent::StateAdded { .. } => "state_added",
            EngineEvent::StateUpdated { .. } => "state_updated",
            EngineEvent::TransitionAdded { .. } => "transition_added",
            EngineEvent::UserTransitioned { .. } => "user_transitioned",
            EngineEvent::OwnershipTransferred { .. } => "ownership_transferred",
            EngineEvent::InstanceCloned { .. } => "instance_cloned",
        }
    }
}

/// Append-only log of committed events.
#[derive(Debug, Default)]
pub struct EventJournal {
    events: RwLock<Vec<EngineEvent>>,
}

impl EventJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an event and returns its cursor (index).
    pub fn emit(&self, event: EngineEvent) -> usize {
        tracing::trace!("event {}", event.name());
        let mut events = self.events.write();
        events.push(event);
        events.len() - 1
    }

    pub fn snapshot(&self) -> Vec<EngineEvent> {
        self.events.read().clone()
    }

    /// Events at or after `cursor`.
    pub fn since(&self, cursor: usize) -> Vec<EngineEvent> {
        let events = self.events.read();
        events.get(cursor..).map(<[_]>::to_vec).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }
}
