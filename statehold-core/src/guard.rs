//! Guard dispatch.
//!
//! A guard is an optional external check attached to a state's entry or
//! exit. Each guard is addressed by a selector derived from the text
//! `"<Machine>_<State>_<Enter|Exit>"`, hashed the same way as any other
//! name. The selector is passed to the state's guard capability, which
//! answers with either a message or a revert.
//!
//! Outcomes:
//! - `Ok(message)` - the transition may proceed; the message is reported in
//!   the action response.
//! - revert with a reason - relayed verbatim as [`CoreError::GuardRejected`].
//! - revert without a reason - [`CoreError::GuardReverted`].

use crate::address::Address;
use crate::error::CoreError;
use crate::host::Host;
use crate::id::Id;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which side of a state a guard protects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GuardMode {
    Enter,
    Exit,
}

impl GuardMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            GuardMode::Enter => "Enter",
            GuardMode::Exit => "Exit",
        }
    }
}

impl fmt::Display for GuardMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returns the dispatch text for a guard, e.g. `LockableDoor_Locked_Exit`.
pub fn guard_signature(machine_name: &str, state_name: &str, mode: GuardMode) -> String {
    format!("{}_{}_{}", machine_name, state_name, mode)
}

/// Derives the selector a guard capability is called with.
pub fn guard_selector(machine_name: &str, state_name: &str, mode: GuardMode) -> Id {
    Id::derive(&guard_signature(machine_name, state_name, mode))
}

/// Context handed to a guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardCall<'a> {
    /// The user whose position is changing.
    pub user: Address,
    pub machine: &'a str,
    /// The guarded state.
    pub state: &'a str,
    pub mode: GuardMode,
    /// Triggering action, absent when the guard is called directly.
    pub action: Option<&'a str>,
    pub prior_state: &'a str,
    pub next_state: &'a str,
}

/// Calls the guard deployed at `guard_logic` and normalizes its answer.
pub(crate) fn dispatch(
    host: &Host,
    guard_logic: Address,
    selector: Id,
    call: &GuardCall<'_>,
) -> Result<String, CoreError> {
    let capability = host.code(guard_logic).ok_or(CoreError::CodelessGuard)?;

    match capability.call_guard(selector, call) {
        Ok(message) => {
            tracing::debug!(
                "guard {} for {}/{} passed: '{}'",
                call.mode,
                call.machine,
                call.state,
                message
            );
            Ok(message)
        }
        Err(revert) => {
            tracing::warn!(
                "guard {} for {}/{} rejected user {}: {}",
                call.mode,
                call.machine,
                call.state,
                call.user,
                revert
            );
            Err(match revert.reason {
                Some(reason) => CoreError::GuardRejected { reason },
                None => CoreError::GuardReverted,
            })
        }
    }
}
