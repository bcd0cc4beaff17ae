//! Capability-group discovery.
//!
//! Each group of operations an engine instance exposes has a fixed 4-byte
//! id. The ids match the interface ids published by existing tooling, so
//! external callers can check an instance before using it.

use crate::id::Id;

/// Interface discovery itself (`supportsInterface(bytes4)`).
pub const SUPPORT: Id = Id::from_bytes([0x01, 0xff, 0xc9, 0xa7]);

/// Cloning an instance.
pub const CLONE: Id = Id::from_bytes([0x08, 0xa9, 0xf5, 0xec]);

/// Invoking actions.
pub const OPERATE: Id = Id::from_bytes([0xca, 0xd6, 0xb5, 0x76]);

/// Ownership queries and transfer.
pub const OWNER: Id = Id::from_bytes([0x7f, 0x58, 0x28, 0xd0]);

/// Installing and modifying machines.
pub const UPDATE: Id = Id::from_bytes([0xf8, 0xeb, 0xd0, 0x91]);

/// Read-only views.
pub const VIEW: Id = Id::from_bytes([0x69, 0x1b, 0x54, 0x51]);

/// All groups with a display name, in a stable order.
pub const ALL: [(&str, Id); 6] = [
    ("Support", SUPPORT),
    ("Clone", CLONE),
    ("Operate", OPERATE),
    ("Owner", OWNER),
    ("Update", UPDATE),
    ("View", VIEW),
];

/// Answers a discovery query for an instance. Clones do not expose the
/// clone group.
pub fn supports(interface_id: Id, is_clone: bool) -> bool {
    match interface_id {
        id if id == CLONE => !is_clone,
        id => id == SUPPORT || id == OPERATE || id == OWNER || id == UPDATE || id == VIEW,
    }
}
