//! Core error types.

use thiserror::Error;

/// Broad classes of engine failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// No such machine, state, action or guard.
    Lookup,
    /// Caller is not the owner or the machine's operator.
    Authorization,
    /// Identifier or name mismatch on write.
    Validation,
    /// A guard or initializer failed, or has no deployed code.
    Capability,
    /// Clone / initialization / reentrancy rules.
    Lifecycle,
}

/// Errors from the state machine engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("No such machine")]
    NoSuchMachine,

    #[error("No such state")]
    NoSuchState,

    #[error("No such action")]
    NoSuchAction,

    #[error("No such guard")]
    NoSuchGuard,

    #[error("Only owner may call")]
    OnlyOwner,

    #[error("Only operator may call")]
    OnlyOperator,

    #[error("Machine already exists")]
    MachineExists,

    #[error("State already exists")]
    StateExists,

    #[error("Duplicate action on state")]
    DuplicateAction,

    #[error("Guard selector already registered for another state")]
    GuardSelectorTaken,

    #[error("Invalid address")]
    InvalidAddress,

    #[error("Invalid operator address")]
    InvalidOperatorAddr,

    #[error("Invalid machine id")]
    InvalidMachineId,

    #[error("Invalid state id")]
    InvalidStateId,

    #[error("Invalid action id")]
    InvalidActionId,

    #[error("Invalid target state id")]
    InvalidTargetId,

    #[error("Invalid initial state id")]
    InvalidInitialState,

    #[error("Invalid machine name: '{name}'")]
    InvalidMachineName { name: String },

    #[error("Invalid state name: '{name}'")]
    InvalidStateName { name: String },

    #[error("Invalid action name: '{name}'")]
    InvalidActionName { name: String },

    #[error("Invalid target state name: '{name}'")]
    InvalidTargetName { name: String },

    #[error("Initializer address not a contract")]
    CodelessInitializer,

    #[error("{reason}")]
    InitializerRejected { reason: String },

    #[error("Initializer function reverted, no reason given")]
    InitializerReverted,

    #[error("Guard address not a contract")]
    CodelessGuard,

    #[error("{reason}")]
    GuardRejected { reason: String },

    #[error("Guard function reverted, no reason given")]
    GuardReverted,

    #[error("Can't clone a clone")]
    Multiplicity,

    #[error("Already initialized")]
    AlreadyInitialized,

    #[error("Not initialized")]
    NotInitialized,

    #[error("Reentrant call")]
    ReentrantCall,

    #[error("JSON error: {0}")]
    Json(String),
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::Json(e.to_string())
    }
}

impl CoreError {
    /// Returns whether this error indicates the operation can be retried.
    ///
    /// Every failure aborts the enclosing operation with state untouched;
    /// deciding to try again is up to the caller.
    pub fn is_retryable(&self) -> bool {
        false
    }

    /// Returns the class this error belongs to.
    pub fn class(&self) -> ErrorClass {
        match self {
            CoreError::NoSuchMachine
            | CoreError::NoSuchState
            | CoreError::NoSuchAction
            | CoreError::NoSuchGuard => ErrorClass::Lookup,

            CoreError::OnlyOwner | CoreError::OnlyOperator => ErrorClass::Authorization,

            CoreError::MachineExists
            | CoreError::StateExists
            | CoreError::DuplicateAction
            | CoreError::GuardSelectorTaken
            | CoreError::InvalidAddress
            | CoreError::InvalidOperatorAddr
            | CoreError::InvalidMachineId
            | CoreError::InvalidStateId
            | CoreError::InvalidActionId
            | CoreError::InvalidTargetId
            | CoreError::InvalidInitialState
            | CoreError::InvalidMachineName { .. }
            | CoreError::InvalidStateName { .. }
            | CoreError::InvalidActionName { .. }
            | CoreError::InvalidTargetName { .. }
            | CoreError::Json(_) => ErrorClass::Validation,

            CoreError::CodelessInitializer
            | CoreError::InitializerRejected { .. }
            | CoreError::InitializerReverted
            | CoreError::CodelessGuard
            | CoreError::GuardRejected { .. }
            | CoreError::GuardReverted => ErrorClass::Capability,

            CoreError::Multiplicity
            | CoreError::AlreadyInitialized
            | CoreError::NotInitialized
            | CoreError::ReentrantCall => ErrorClass::Lifecycle,
        }
    }

    /// Returns a stable error code suitable for machine consumption.
    pub fn error_code(&self) -> &'static str {
        match self {
            CoreError::NoSuchMachine => "NO_SUCH_MACHINE",
            CoreError::NoSuchState => "NO_SUCH_STATE",
            CoreError::NoSuchAction => "NO_SUCH_ACTION",
            CoreError::NoSuchGuard => "NO_SUCH_GUARD",
            CoreError::OnlyOwner => "ONLY_OWNER",
            CoreError::OnlyOperator => "ONLY_OPERATOR",
            CoreError::MachineExists => "MACHINE_EXISTS",
            CoreError::StateExists => "STATE_EXISTS",
            CoreError::DuplicateAction => "DUPLICATE_ACTION",
            CoreError::GuardSelectorTaken => "GUARD_SELECTOR_TAKEN",
            CoreError::InvalidAddress => "INVALID_ADDRESS",
            CoreError::InvalidOperatorAddr => "INVALID_OPERATOR_ADDR",
            CoreError::InvalidMachineId => "INVALID_MACHINE_ID",
            CoreError::InvalidStateId => "INVALID_STATE_ID",
            CoreError::InvalidActionId => "INVALID_ACTION_ID",
            CoreError::InvalidTargetId => "INVALID_TARGET_ID",
            CoreError::InvalidInitialState => "INVALID_INITIAL_STATE",
            CoreError::InvalidMachineName { .. } => "INVALID_MACHINE_NAME",
            CoreError::InvalidStateName { .. } => "INVALID_STATE_NAME",
            CoreError::InvalidActionName { .. } => "INVALID_ACTION_NAME",
            CoreError::InvalidTargetName { .. } => "INVALID_TARGET_NAME",
            CoreError::CodelessInitializer => "CODELESS_INITIALIZER",
            CoreError::InitializerRejected { .. } => "INITIALIZER_REJECTED",
            CoreError::InitializerReverted => "INITIALIZER_REVERTED",
            CoreError::CodelessGuard => "CODELESS_GUARD",
            CoreError::GuardRejected { .. } => "GUARD_REJECTED",
            CoreError::GuardReverted => "GUARD_REVERTED",
            CoreError::Multiplicity => "MULTIPLICITY",
            CoreError::AlreadyInitialized => "ALREADY_INITIALIZED",
            CoreError::NotInitialized => "NOT_INITIALIZED",
            CoreError::ReentrantCall => "REENTRANT_CALL",
            CoreError::Json(_) => "BAD_REQUEST",
        }
    }
}
