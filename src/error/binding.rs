// Engine binding error types and constants

use crate::error::{ErrorCode, StoreError};
use log::error;
use std::fmt;

/// Binding error code constants
///
/// These constants provide a single source of truth for error codes shared
/// with host-side consumers of the channel protocol.
///
/// Error code range: 2001-2005
pub struct BindingErrorCodes {}

impl BindingErrorCodes {
    /// Host runtime failed to spawn the engine instance
    pub const ENGINE_SPAWN_FAILED: i32 = 2001;

    /// Binding is already attached
    pub const ALREADY_ATTACHED: i32 = 2002;

    /// Operation attempted on a detached binding
    pub const DETACHED: i32 = 2003;

    /// Mutex guarding binding state was poisoned
    pub const LOCK_POISONED: i32 = 2004;

    /// Shared counter store operation failed
    pub const STORE_FAILURE: i32 = 2005;
}

/// Log a binding error with structured context
pub fn log_binding_error(err: &BindingError, context: &str) {
    error!(
        "Binding error in {}: code={}, component=EngineBindings, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Engine binding errors
///
/// These cover binding lifecycle operations: engine spawn, attach, detach,
/// and state access.
///
/// Error code range: 2001-2005
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingError {
    /// Host runtime failed to spawn the engine instance
    EngineSpawnFailed { reason: String },

    /// Binding is already attached
    AlreadyAttached,

    /// Operation attempted on a detached binding
    Detached,

    /// Mutex guarding binding state was poisoned
    LockPoisoned { component: String },

    /// Shared counter store operation failed
    StoreFailure { source: StoreError },
}

impl ErrorCode for BindingError {
    fn code(&self) -> i32 {
        match self {
            BindingError::EngineSpawnFailed { .. } => BindingErrorCodes::ENGINE_SPAWN_FAILED,
            BindingError::AlreadyAttached => BindingErrorCodes::ALREADY_ATTACHED,
            BindingError::Detached => BindingErrorCodes::DETACHED,
            BindingError::LockPoisoned { .. } => BindingErrorCodes::LOCK_POISONED,
            BindingError::StoreFailure { .. } => BindingErrorCodes::STORE_FAILURE,
        }
    }

    fn message(&self) -> String {
        match self {
            BindingError::EngineSpawnFailed { reason } => {
                format!("Failed to spawn engine instance: {}", reason)
            }
            BindingError::AlreadyAttached => {
                "Binding already attached. Call detach() first.".to_string()
            }
            BindingError::Detached => {
                "Binding is detached; no further operations are possible.".to_string()
            }
            BindingError::LockPoisoned { component } => {
                format!("Lock poisoned on {}", component)
            }
            BindingError::StoreFailure { source } => {
                format!("Counter store operation failed: {}", source.message())
            }
        }
    }
}

impl fmt::Display for BindingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "BindingError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for BindingError {}

impl From<StoreError> for BindingError {
    fn from(err: StoreError) -> Self {
        BindingError::StoreFailure { source: err }
    }
}
