//! Per-user position tracking.

use crate::address::Address;
use crate::id::Id;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A user's (machine, state) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub machine_id: Id,
    pub state_id: Id,
}

impl Position {
    pub fn new(machine_id: Id, state_id: Id) -> Self {
        Self {
            machine_id,
            state_id,
        }
    }

    /// A zeroed position means "never interacted".
    pub fn is_valid(&self) -> bool {
        !self.machine_id.is_zero() && !self.state_id.is_zero()
    }
}

/// The position a user most recently moved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastPosition {
    pub position: Position,

    /// Count of committed moves for this user. Advances on every move,
    /// including self-loops.
    pub sequence: u64,
}

#[derive(Debug, Default)]
struct UserPositions {
    /// Current state per machine.
    current: HashMap<Id, Id>,
    last: Option<Position>,
    /// Append-only log of positions left behind, oldest first.
    history: Vec<Position>,
    sequence: u64,
}

/// Positions and history for every user of one engine instance.
#[derive(Debug, Default)]
pub struct PositionBook {
    users: DashMap<Address, UserPositions>,
}

impl PositionBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the user's recorded state in a machine, if any.
    pub fn current_state(&self, user: Address, machine_id: Id) -> Option<Id> {
        self.users
            .get(&user)
            .and_then(|u| u.current.get(&machine_id).copied())
    }

    /// Commits a move: `next` becomes current and `prior` is appended to
    /// history. Returns the user's new sequence number.
    pub fn record(&self, user: Address, prior: Position, next: Position) -> u64 {
        let mut entry = self.users.entry(user).or_default();
        entry.current.insert(next.machine_id, next.state_id);
        entry.last = Some(next);
        entry.history.push(prior);
        entry.sequence += 1;
        entry.sequence
    }

    pub fn last_position(&self, user: Address) -> Option<LastPosition> {
        let entry = self.users.get(&user)?;
        entry.last.map(|position| LastPosition {
            position,
            sequence: entry.sequence,
        })
    }

    /// Full history for a user, in commit order. Empty if never moved.
    pub fn history(&self, user: Address) -> Vec<Position> {
        self.users
            .get(&user)
            .map(|u| u.history.clone())
            .unwrap_or_default()
    }

    /// Number of users who have moved at least once.
    pub fn user_count(&self) -> usize {
        self.users.len()
    }
}
