//! Machine registry.
//!
//! An arena of machines keyed by id. Each machine owns its states (kept in
//! insertion order, indexed by id) and each state owns its transitions.
//! Writes validate everything first and mutate last, so a rejected write
//! leaves the registry untouched.
//!
//! States and transitions are only ever added or replaced, never removed:
//! positions recorded against a state id must stay resolvable.

use crate::address::Address;
use crate::definition::{Machine, State, Transition};
use crate::error::CoreError;
use crate::guard::{guard_selector, GuardMode};
use crate::host::Host;
use crate::id::Id;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone)]
struct MachineEntry {
    machine: Machine,
    /// State id -> index into `machine.states`.
    state_index: HashMap<Id, usize>,
}

impl MachineEntry {
    fn new(machine: Machine) -> Self {
        let state_index = machine
            .states
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id, i))
            .collect();
        Self {
            machine,
            state_index,
        }
    }

    fn state(&self, state_id: Id) -> Option<&State> {
        self.state_index
            .get(&state_id)
            .map(|&i| &self.machine.states[i])
    }

    fn state_mut(&mut self, state_id: Id) -> Option<&mut State> {
        match self.state_index.get(&state_id) {
            Some(&i) => Some(&mut self.machine.states[i]),
            None => None,
        }
    }
}

/// The state a guard selector was registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct GuardSlot {
    machine_id: Id,
    state_id: Id,
    guard_logic: Address,
}

impl GuardSlot {
    fn belongs_to(&self, machine_id: Id, state_id: Id) -> bool {
        self.machine_id == machine_id && self.state_id == state_id
    }
}

/// All machines installed on one engine instance, plus the guard table.
///
/// Every selector in the guard table belongs to exactly one (machine, state)
/// pair; a write that would make two states share a selector is rejected.
#[derive(Debug, Clone, Default)]
pub struct MachineRegistry {
    machines: HashMap<Id, MachineEntry>,

    /// Guard selector -> owning state and its guard capability.
    guards: HashMap<Id, GuardSlot>,
}

impl MachineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Lookups
    // =========================================================================

    pub fn machine(&self, machine_id: Id) -> Option<&Machine> {
        self.machines.get(&machine_id).map(|e| &e.machine)
    }

    pub fn contains(&self, machine_id: Id) -> bool {
        self.machines.contains_key(&machine_id)
    }

    pub fn state(&self, machine_id: Id, state_id: Id) -> Option<&State> {
        self.machines.get(&machine_id)?.state(state_id)
    }

    /// Returns the guard capability registered for a selector.
    pub fn guard_address(&self, selector: Id) -> Option<Address> {
        self.guards.get(&selector).map(|slot| slot.guard_logic)
    }

    /// Returns all machine ids, sorted.
    pub fn machine_ids(&self) -> Vec<Id> {
        let mut ids: Vec<Id> = self.machines.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.machines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.machines.is_empty()
    }

    // =========================================================================
    // Validation
    // =========================================================================

    /// Full validation of a machine about to be installed.
    pub fn check_install(&self, machine: &Machine, host: &Host) -> Result<(), CoreError> {
        if machine.operator.is_zero() {
            return Err(CoreError::InvalidOperatorAddr);
        }
        if self.contains(machine.id) {
            return Err(CoreError::MachineExists);
        }
        machine.validate()?;

        let mut claimed = HashSet::new();
        for state in &machine.states {
            check_guard_logic(state, host)?;
            self.check_guard_selectors(machine.id, &machine.name, state)?;
            for selector in guarded_selectors(&machine.name, state) {
                if !claimed.insert(selector) {
                    return Err(CoreError::GuardSelectorTaken);
                }
            }
        }
        Ok(())
    }

    /// Fails if any selector the state would register is already held by a
    /// different state.
    fn check_guard_selectors(
        &self,
        machine_id: Id,
        machine_name: &str,
        state: &State,
    ) -> Result<(), CoreError> {
        for selector in guarded_selectors(machine_name, state) {
            if let Some(slot) = self.guards.get(&selector) {
                if !slot.belongs_to(machine_id, state.id) {
                    tracing::warn!(
                        "guard selector {} for {}/{} already held by {}/{}",
                        selector,
                        machine_name,
                        state.name,
                        slot.machine_id,
                        slot.state_id
                    );
                    return Err(CoreError::GuardSelectorTaken);
                }
            }
        }
        Ok(())
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Installs a machine.
    pub fn install(&mut self, machine: Machine, host: &Host) -> Result<(), CoreError> {
        self.check_install(&machine, host)?;
        self.insert_unchecked(machine);
        Ok(())
    }

    /// Stores a machine that already passed [`Self::check_install`].
    pub(crate) fn insert_unchecked(&mut self, machine: Machine) {
        for state in &machine.states {
            self.register_guards(machine.id, &machine.name, state);
        }
        self.machines
            .insert(machine.id, MachineEntry::new(machine));
    }

    /// Adds a new state to a machine.
    pub fn add_state(&mut self, machine_id: Id, state: State, host: &Host) -> Result<(), CoreError> {
        let entry = self
            .machines
            .get(&machine_id)
            .ok_or(CoreError::NoSuchMachine)?;
        state.validate()?;
        if entry.state_index.contains_key(&state.id) {
            return Err(CoreError::StateExists);
        }
        check_guard_logic(&state, host)?;
        let machine_name = entry.machine.name.clone();
        self.check_guard_selectors(machine_id, &machine_name, &state)?;

        self.register_guards(machine_id, &machine_name, &state);

        let entry = self
            .machines
            .get_mut(&machine_id)
            .ok_or(CoreError::NoSuchMachine)?;
        if entry.machine.states.is_empty() && entry.machine.initial_state_id.is_zero() {
            entry.machine.initial_state_id = state.id;
        }
        entry.state_index.insert(state.id, entry.machine.states.len());
        entry.machine.states.push(state);
        Ok(())
    }

    /// Replaces an existing state (flags, guard logic and transitions).
    pub fn update_state(
        &mut self,
        machine_id: Id,
        state: State,
        host: &Host,
    ) -> Result<(), CoreError> {
        let entry = self
            .machines
            .get(&machine_id)
            .ok_or(CoreError::NoSuchMachine)?;
        state.validate()?;
        if !entry.state_index.contains_key(&state.id) {
            return Err(CoreError::NoSuchState);
        }
        check_guard_logic(&state, host)?;
        let machine_name = entry.machine.name.clone();
        self.check_guard_selectors(machine_id, &machine_name, &state)?;

        self.register_guards(machine_id, &machine_name, &state);

        let entry = self
            .machines
            .get_mut(&machine_id)
            .ok_or(CoreError::NoSuchMachine)?;
        if let Some(slot) = entry.state_mut(state.id) {
            *slot = state;
        }
        Ok(())
    }

    /// Appends a transition to a state.
    ///
    /// The target state does not have to exist yet; it is resolved when the
    /// action is invoked.
    pub fn add_transition(
        &mut self,
        machine_id: Id,
        state_id: Id,
        transition: Transition,
    ) -> Result<(), CoreError> {
        let entry = self
            .machines
            .get_mut(&machine_id)
            .ok_or(CoreError::NoSuchMachine)?;
        transition.validate()?;
        let state = entry.state_mut(state_id).ok_or(CoreError::NoSuchState)?;
        if state.transition(transition.action_id).is_some() {
            return Err(CoreError::DuplicateAction);
        }
        state.transitions.push(transition);
        Ok(())
    }

    /// Points each guarded mode's selector at the state's guard logic, and
    /// clears this state's selectors for modes that are no longer guarded.
    fn register_guards(&mut self, machine_id: Id, machine_name: &str, state: &State) {
        for mode in [GuardMode::Enter, GuardMode::Exit] {
            let selector = guard_selector(machine_name, &state.name, mode);
            match state.guard_logic {
                Some(guard_logic) if state.is_guarded(mode) => {
                    self.guards.insert(
                        selector,
                        GuardSlot {
                            machine_id,
                            state_id: state.id,
                            guard_logic,
                        },
                    );
                }
                _ => {
                    if self
                        .guards
                        .get(&selector)
                        .is_some_and(|slot| slot.belongs_to(machine_id, state.id))
                    {
                        self.guards.remove(&selector);
                    }
                }
            }
        }
    }
}

/// Selectors a state registers: one per guarded mode, when it has guard logic.
fn guarded_selectors<'a>(
    machine_name: &'a str,
    state: &'a State,
) -> impl Iterator<Item = Id> + 'a {
    [GuardMode::Enter, GuardMode::Exit]
        .into_iter()
        .filter(move |&mode| state.guard_logic.is_some() && state.is_guarded(mode))
        .map(move |mode| guard_selector(machine_name, &state.name, mode))
}

/// A state's guard logic, if set, must be deployed code.
fn check_guard_logic(state: &State, host: &Host) -> Result<(), CoreError> {
    match state.guard_logic {
        Some(addr) if !host.has_code(addr) => Err(CoreError::CodelessGuard),
        _ => Ok(()),
    }
}
