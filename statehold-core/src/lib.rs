//! # statehold-core
//!
//! Data-driven finite state machine engine.
//!
//! This crate provides:
//! - Machine, state and transition definitions with name-derived ids
//! - A machine registry with all-or-nothing writes
//! - Action invocation with enter/exit guards
//! - Per-user positions and history
//! - Clonable engine instances and operator gateways

pub mod address;
pub mod definition;
pub mod engine;
pub mod error;
pub mod event;
pub mod guard;
pub mod host;
pub mod id;
pub mod interface;
mod lifecycle;
pub mod operator;
pub mod position;
pub mod registry;

pub use address::Address;
pub use definition::{Machine, MachineDocument, State, Transition};
pub use engine::Engine;
pub use error::{CoreError, ErrorClass};
pub use event::{ActionResponse, EngineEvent};
pub use guard::{guard_selector, guard_signature, GuardCall, GuardMode};
pub use host::{Capability, Host, Revert};
pub use id::{derive_id, validate_id, validate_name_lax, validate_name_strict, Id};
pub use operator::Operator;
pub use position::{LastPosition, Position};
pub use registry::MachineRegistry;
