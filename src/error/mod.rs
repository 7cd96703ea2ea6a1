// Error types for the counter bindings crate
//
// This module defines custom error types for store and binding operations,
// providing structured error handling with numeric codes suitable for
// reporting across the message-channel boundary.

mod binding;
mod store;

pub use binding::{log_binding_error, BindingError, BindingErrorCodes};
pub use store::{log_store_error, StoreError, StoreErrorCodes};

/// Error codes for structured error reporting
///
/// This trait provides a standard way to get error codes and messages
/// from custom error types, enabling consistent error handling when an
/// error has to cross the channel boundary or land in a log line.
pub trait ErrorCode {
    /// Get the numeric error code
    fn code(&self) -> i32;

    /// Get the human-readable error message
    fn message(&self) -> String;
}
