// Counter store error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Store error code constants
///
/// These constants provide a single source of truth for error codes shared
/// with host-side consumers of the channel protocol.
///
/// Error code range: 1001-1002
pub struct StoreErrorCodes {}

impl StoreErrorCodes {
    /// Mutex guarding the store was poisoned
    pub const LOCK_POISONED: i32 = 1001;

    /// Observer id was not found in the registry
    pub const OBSERVER_NOT_FOUND: i32 = 1002;
}

/// Log a store error with structured context
///
/// Logs with the numeric error code, the component, and the human-readable
/// message so host-side log scrapers can match on the code.
pub fn log_store_error(err: &StoreError, context: &str) {
    error!(
        "Store error in {}: code={}, component=CounterStore, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Counter store errors
///
/// These cover the shared counter store operations: value access, mutation,
/// and observer registry maintenance.
///
/// Error code range: 1001-1002
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Mutex guarding the store was poisoned
    LockPoisoned,

    /// Observer id was not found in the registry
    ObserverNotFound { id: u64 },
}

impl ErrorCode for StoreError {
    fn code(&self) -> i32 {
        match self {
            StoreError::LockPoisoned => StoreErrorCodes::LOCK_POISONED,
            StoreError::ObserverNotFound { .. } => StoreErrorCodes::OBSERVER_NOT_FOUND,
        }
    }

    fn message(&self) -> String {
        match self {
            StoreError::LockPoisoned => "Lock poisoned on counter store".to_string(),
            StoreError::ObserverNotFound { id } => {
                format!("Observer {} is not registered with the store", id)
            }
        }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "StoreError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for StoreError {}
