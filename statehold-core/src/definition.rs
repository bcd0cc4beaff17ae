//! Machine, state and transition definitions.
//!
//! Machines are plain data. A machine owns its states; a state owns its
//! transitions. Every id is derived from the corresponding name (see
//! [`crate::id`]) and is re-checked on every write.
//!
//! Deployment tooling usually supplies a names-only document and lets the
//! ids be derived:
//!
//! ```json
//! {
//!   "name": "LockableDoor",
//!   "initial": "Closed",
//!   "uri": "ipfs://",
//!   "states": [
//!     {"name": "Closed", "transitions": [
//!       {"action": "Open", "target": "Opened"},
//!       {"action": "Lock", "target": "Locked"}
//!     ]},
//!     {"name": "Locked", "exitGuarded": true, "guardLogic": "0x…",
//!      "transitions": [{"action": "Unlock", "target": "Closed"}]},
//!     {"name": "Opened", "transitions": [{"action": "Close", "target": "Closed"}]}
//!   ]
//! }
//! ```

use crate::address::Address;
use crate::error::CoreError;
use crate::guard::GuardMode;
use crate::id::{validate_id, validate_name_lax, validate_name_strict, Id};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;

/// A named action leading from its owning state to a target state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transition {
    /// Id of the action name.
    pub action_id: Id,

    /// Id of the target state name.
    pub target_state_id: Id,

    /// Action name (lax policy).
    #[serde(rename = "action")]
    pub action_name: String,

    /// Target state name (strict policy).
    pub target_state_name: String,
}

impl Transition {
    /// Creates a transition, deriving both ids from the names.
    pub fn new(action: impl Into<String>, target_state: impl Into<String>) -> Self {
        let action_name = action.into();
        let target_state_name = target_state.into();
        Self {
            action_id: Id::derive(&action_name),
            target_state_id: Id::derive(&target_state_name),
            action_name,
            target_state_name,
        }
    }

    /// Checks id/name coherence for both the action and the target.
    pub fn validate(&self) -> Result<(), CoreError> {
        if !validate_id(&self.action_name, self.action_id) {
            return Err(CoreError::InvalidActionId);
        }
        if !validate_name_lax(&self.action_name) {
            return Err(CoreError::InvalidActionName {
                name: self.action_name.clone(),
            });
        }
        if !validate_id(&self.target_state_name, self.target_state_id) {
            return Err(CoreError::InvalidTargetId);
        }
        if !validate_name_strict(&self.target_state_name) {
            return Err(CoreError::InvalidTargetName {
                name: self.target_state_name.clone(),
            });
        }
        Ok(())
    }
}

/// A node in a machine, optionally guarded on entry and/or exit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct State {
    pub id: Id,

    pub name: String,

    #[serde(default)]
    pub enter_guarded: bool,

    #[serde(default)]
    pub exit_guarded: bool,

    /// Address of the capability implementing this state's guards.
    /// The zero address is read as "none".
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_guard_logic"
    )]
    pub guard_logic: Option<Address>,

    #[serde(default)]
    pub transitions: Vec<Transition>,
}

fn deserialize_guard_logic<'de, D>(deserializer: D) -> Result<Option<Address>, D::Error>
where
    D: Deserializer<'de>,
{
    let addr = Option::<Address>::deserialize(deserializer)?;
    Ok(addr.filter(|a| !a.is_zero()))
}

impl State {
    /// Creates an unguarded state with no transitions.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: Id::derive(&name),
            name,
            enter_guarded: false,
            exit_guarded: false,
            guard_logic: None,
            transitions: Vec::new(),
        }
    }

    pub fn with_transition(mut self, action: &str, target_state: &str) -> Self {
        self.transitions.push(Transition::new(action, target_state));
        self
    }

    pub fn with_enter_guard(mut self) -> Self {
        self.enter_guarded = true;
        self
    }

    pub fn with_exit_guard(mut self) -> Self {
        self.exit_guarded = true;
        self
    }

    pub fn with_guard_logic(mut self, guard_logic: Address) -> Self {
        self.guard_logic = Some(guard_logic);
        self
    }

    /// Looks up the transition triggered by `action_id` from this state.
    pub fn transition(&self, action_id: Id) -> Option<&Transition> {
        self.transitions.iter().find(|t| t.action_id == action_id)
    }

    /// Returns true if this state has a guard for the given mode.
    pub fn is_guarded(&self, mode: GuardMode) -> bool {
        match mode {
            GuardMode::Enter => self.enter_guarded,
            GuardMode::Exit => self.exit_guarded,
        }
    }

    /// Checks the state's id and name, then every transition.
    pub fn validate(&self) -> Result<(), CoreError> {
        if !validate_id(&self.name, self.id) {
            return Err(CoreError::InvalidStateId);
        }
        if !validate_name_strict(&self.name) {
            return Err(CoreError::InvalidStateName {
                name: self.name.clone(),
            });
        }

        let mut actions = HashSet::new();
        for transition in &self.transitions {
            transition.validate()?;
            if !actions.insert(transition.action_id) {
                return Err(CoreError::DuplicateAction);
            }
        }

        Ok(())
    }
}

/// A complete machine definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Machine {
    /// The only caller allowed to invoke actions on this machine.
    pub operator: Address,

    pub id: Id,

    pub name: String,

    /// Id of the state users start in. Zero while the machine has no states.
    #[serde(default)]
    pub initial_state_id: Id,

    /// Off-chain metadata pointer.
    #[serde(default)]
    pub uri: String,

    #[serde(default)]
    pub states: Vec<State>,
}

impl Machine {
    /// Creates an empty machine operated by `operator`.
    pub fn new(name: impl Into<String>, operator: Address) -> Self {
        let name = name.into();
        Self {
            operator,
            id: Id::derive(&name),
            name,
            initial_state_id: Id::ZERO,
            uri: String::new(),
            states: Vec::new(),
        }
    }

    /// Appends a state. The first state appended becomes the initial state
    /// unless one was set explicitly.
    pub fn with_state(mut self, state: State) -> Self {
        if self.initial_state_id.is_zero() {
            self.initial_state_id = state.id;
        }
        self.states.push(state);
        self
    }

    pub fn with_initial_state(mut self, state_name: &str) -> Self {
        self.initial_state_id = Id::derive(state_name);
        self
    }

    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = uri.into();
        self
    }

    pub fn state(&self, state_id: Id) -> Option<&State> {
        self.states.iter().find(|s| s.id == state_id)
    }

    pub fn initial_state(&self) -> Option<&State> {
        self.state(self.initial_state_id)
    }

    /// Validates the machine at every nesting level.
    ///
    /// Checks, in order: operator, machine id, machine name, each state
    /// (id, name, transitions), state uniqueness, initial state membership.
    /// A machine with no states must have no initial state.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.operator.is_zero() {
            return Err(CoreError::InvalidOperatorAddr);
        }
        if !validate_id(&self.name, self.id) {
            return Err(CoreError::InvalidMachineId);
        }
        if !validate_name_strict(&self.name) {
            return Err(CoreError::InvalidMachineName {
                name: self.name.clone(),
            });
        }

        let mut seen = HashSet::new();
        for state in &self.states {
            state.validate()?;
            if !seen.insert(state.id) {
                return Err(CoreError::StateExists);
            }
        }

        // An empty machine takes its first added state as initial
        let initial_ok = if self.states.is_empty() {
            self.initial_state_id.is_zero()
        } else {
            seen.contains(&self.initial_state_id)
        };
        if !initial_ok {
            return Err(CoreError::InvalidInitialState);
        }

        Ok(())
    }

    /// Parses a machine from its full JSON form (ids included).
    pub fn from_json(json: &serde_json::Value) -> Result<Self, CoreError> {
        Ok(serde_json::from_value(json.clone())?)
    }

    pub fn to_json(&self) -> Result<serde_json::Value, CoreError> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Names-only transition as written in a definition document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionDocument {
    pub action: String,

    pub target: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_id: Option<Id>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_state_id: Option<Id>,
}

/// Names-only state as written in a definition document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateDocument {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Id>,

    #[serde(default)]
    pub enter_guarded: bool,

    #[serde(default)]
    pub exit_guarded: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guard_logic: Option<Address>,

    #[serde(default)]
    pub transitions: Vec<TransitionDocument>,
}

/// Names-only machine definition. Ids are derived from names; any id
/// written explicitly is kept as-is so that validation catches mismatches.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineDocument {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Id>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<Address>,

    /// Initial state name. Defaults to the first state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial: Option<String>,

    #[serde(default)]
    pub uri: String,

    #[serde(default)]
    pub states: Vec<StateDocument>,
}

impl MachineDocument {
    pub fn from_json(json: &serde_json::Value) -> Result<Self, CoreError> {
        Ok(serde_json::from_value(json.clone())?)
    }

    /// Builds the machine and validates it. `default_operator` is used when
    /// the document names no operator.
    pub fn into_machine(self, default_operator: Address) -> Result<Machine, CoreError> {
        let initial_state_id = match (&self.initial, self.states.first()) {
            (Some(name), _) => Id::derive(name),
            (None, Some(first)) => first.id.unwrap_or_else(|| Id::derive(&first.name)),
            (None, None) => Id::ZERO,
        };

        let states = self
            .states
            .into_iter()
            .map(|s| State {
                id: s.id.unwrap_or_else(|| Id::derive(&s.name)),
                name: s.name,
                enter_guarded: s.enter_guarded,
                exit_guarded: s.exit_guarded,
                guard_logic: s.guard_logic.filter(|a| !a.is_zero()),
                transitions: s
                    .transitions
                    .into_iter()
                    .map(|t| Transition {
                        action_id: t.action_id.unwrap_or_else(|| Id::derive(&t.action)),
                        target_state_id: t
                            .target_state_id
                            .unwrap_or_else(|| Id::derive(&t.target)),
                        action_name: t.action,
                        target_state_name: t.target,
                    })
                    .collect(),
            })
            .collect();

        let machine = Machine {
            operator: self.operator.unwrap_or(default_operator),
            id: self.id.unwrap_or_else(|| Id::derive(&self.name)),
            name: self.name,
            initial_state_id,
            uri: self.uri,
            states,
        };
        machine.validate()?;
        Ok(machine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn operator() -> Address {
        Address::derive(b"operator")
    }

    fn lockable_door() -> serde_json::Value {
        serde_json::json!({
            "name": "LockableDoor",
            "initial": "Closed",
            "uri": "ipfs://",
            "states": [
                {"name": "Closed", "transitions": [
                    {"action": "Open", "target": "Opened"},
                    {"action": "Lock", "target": "Locked"}
                ]},
                {"name": "Locked", "exitGuarded": true, "transitions": [
                    {"action": "Unlock", "target": "Closed"}
                ]},
                {"name": "Opened", "transitions": [
                    {"action": "Close", "target": "Closed"}
                ]}
            ]
        })
    }

    #[test]
    fn test_parse_document() {
        let doc = MachineDocument::from_json(&lockable_door()).unwrap();
        let machine = doc.into_machine(operator()).unwrap();

        assert_eq!(machine.name, "LockableDoor");
        assert_eq!(machine.id, Id::derive("LockableDoor"));
        assert_eq!(machine.initial_state_id, Id::derive("Closed"));
        assert_eq!(machine.states.len(), 3);
        assert_eq!(machine.operator, operator());

        let locked = machine.state(Id::derive("Locked")).unwrap();
        assert!(locked.exit_guarded);
        assert!(!locked.enter_guarded);
        let unlock = locked.transition(Id::derive("Unlock")).unwrap();
        assert_eq!(unlock.target_state_name, "Closed");
    }

    #[test]
    fn test_document_with_stale_id_is_rejected() {
        let mut json = lockable_door();
        json["states"][1]["id"] = serde_json::json!("0xdeadbeef");
        let doc = MachineDocument::from_json(&json).unwrap();
        assert_eq!(doc.into_machine(operator()), Err(CoreError::InvalidStateId));
    }

    #[test]
    fn test_document_without_operator_needs_default() {
        let doc = MachineDocument::from_json(&lockable_door()).unwrap();
        assert_eq!(
            doc.into_machine(Address::ZERO),
            Err(CoreError::InvalidOperatorAddr)
        );
    }

    #[test]
    fn test_initial_state_defaults_to_first() {
        let json = serde_json::json!({
            "name": "Meditate",
            "states": [{"name": "Be", "transitions": [
                {"action": "Inhale", "target": "Be"},
                {"action": "Exhale", "target": "Be"}
            ]}]
        });
        let machine = MachineDocument::from_json(&json)
            .unwrap()
            .into_machine(operator())
            .unwrap();
        assert_eq!(machine.initial_state_id, Id::derive("Be"));
    }

    #[test]
    fn test_invalid_initial_state() {
        let machine = Machine::new("Door", operator())
            .with_state(State::new("Closed"))
            .with_initial_state("Ajar");
        assert_eq!(machine.validate(), Err(CoreError::InvalidInitialState));
    }

    #[test]
    fn test_empty_machine_is_valid() {
        let machine = Machine::new("Empty", operator());
        assert!(machine.validate().is_ok());
        assert!(machine.initial_state().is_none());
    }

    #[test]
    fn test_empty_machine_with_initial_state_is_rejected() {
        let machine = Machine::new("Empty", operator()).with_initial_state("Ajar");
        assert_eq!(machine.validate(), Err(CoreError::InvalidInitialState));

        let document = MachineDocument::from_json(&serde_json::json!({
            "name": "Empty",
            "initial": "Ajar",
            "states": []
        }))
        .unwrap();
        assert_eq!(
            document.into_machine(operator()).err(),
            Some(CoreError::InvalidInitialState)
        );
    }

    #[test]
    fn test_duplicate_state() {
        let machine = Machine::new("Twice", operator())
            .with_state(State::new("A"))
            .with_state(State::new("A"));
        assert_eq!(machine.validate(), Err(CoreError::StateExists));
    }

    #[test]
    fn test_duplicate_action() {
        let state = State::new("A")
            .with_transition("Go", "B")
            .with_transition("Go", "C");
        assert_eq!(state.validate(), Err(CoreError::DuplicateAction));
    }

    #[test]
    fn test_transition_validation() {
        let mut t = Transition::new("Hit the road", "Street");
        assert!(t.validate().is_ok());

        t.action_id = Id::derive("Hit the roads");
        assert_eq!(t.validate(), Err(CoreError::InvalidActionId));

        let mut t = Transition::new("Go", "Street");
        t.target_state_id = Id::ZERO;
        assert_eq!(t.validate(), Err(CoreError::InvalidTargetId));

        let t = Transition::new("Go", "Back Street");
        assert!(matches!(
            t.validate(),
            Err(CoreError::InvalidTargetName { .. })
        ));

        let t = Transition::new("Go!", "Street");
        assert!(matches!(
            t.validate(),
            Err(CoreError::InvalidActionName { .. })
        ));
    }

    #[test]
    fn test_state_validation() {
        let mut state = State::new("Foyer");
        state.id = Id::derive("Bar");
        assert_eq!(state.validate(), Err(CoreError::InvalidStateId));

        let state = State::new("The Foyer");
        assert!(matches!(
            state.validate(),
            Err(CoreError::InvalidStateName { .. })
        ));
    }

    #[test]
    fn test_full_form_json() {
        let machine = Machine::new("Meditate", operator())
            .with_state(State::new("Be").with_transition("Inhale", "Be"))
            .with_uri("ipfs://meditate");
        let json = machine.to_json().unwrap();

        assert_eq!(json["id"], "0x05c79070");
        assert_eq!(json["initialStateId"], "0x0ed7822d");
        assert_eq!(json["states"][0]["transitions"][0]["action"], "Inhale");
        assert!(json["states"][0].get("guardLogic").is_none());

        let parsed = Machine::from_json(&json).unwrap();
        assert_eq!(parsed, machine);
    }

    #[test]
    fn test_zero_guard_logic_reads_as_none() {
        let json = serde_json::json!({
            "id": "0x0ed7822d",
            "name": "Be",
            "guardLogic": "0x0000000000000000000000000000000000000000",
            "transitions": []
        });
        let state: State = serde_json::from_value(json).unwrap();
        assert!(state.guard_logic.is_none());
    }
}
