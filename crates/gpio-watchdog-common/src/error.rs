//! Error types for GPIO access.
//!
//! Every variant here is a hardware access failure from the watchdog's
//! point of view: the pin level is unknown for this tick and no correction
//! may be based on it. All errors implement `std::error::Error` via
//! `thiserror`.

use std::io;
use std::time::Duration;
use thiserror::Error;

use crate::gpio::{GpioOp, PinId};

/// Result type alias for GPIO operations.
pub type GpioResult<T> = Result<T, GpioError>;

/// Errors that can occur while reading or writing a pin.
#[derive(Debug, Error)]
pub enum GpioError {
    /// Failed to spawn the GPIO helper (missing binary, permission denied).
    #[error("Failed to execute GPIO helper '{command}': {source}")]
    Exec {
        /// The command line that failed to execute.
        command: String,
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },

    /// GPIO helper returned a non-zero exit code.
    #[error("GPIO helper failed: '{command}' (exit code {exit_code}): {output}")]
    CommandFailed {
        /// The command line that failed.
        command: String,
        /// The exit code.
        exit_code: i32,
        /// Combined stdout/stderr output.
        output: String,
    },

    /// GPIO helper was killed for exceeding its bound.
    #[error("GPIO helper '{command}' killed after {timeout:?}")]
    HelperTimeout {
        /// The command line that was killed.
        command: String,
        /// The bound that was exceeded.
        timeout: Duration,
    },

    /// A read or write did not complete within its bound.
    #[error("{op} of {pin} timed out after {timeout:?}")]
    Timeout {
        /// The pin being accessed.
        pin: PinId,
        /// The operation that timed out.
        op: GpioOp,
        /// The bound that was exceeded.
        timeout: Duration,
    },

    /// GPIO helper output did not contain a recognizable level.
    #[error("Unrecognized output from '{command}': {output:?}")]
    Parse {
        /// The command line whose output was rejected.
        command: String,
        /// The raw output.
        output: String,
    },

    /// The pin cannot be accessed at all.
    #[error("{op} of {pin} unavailable: {message}")]
    Unavailable {
        /// The pin being accessed.
        pin: PinId,
        /// The operation that failed.
        op: GpioOp,
        /// Error message.
        message: String,
    },
}

impl GpioError {
    /// Creates a timeout error.
    pub fn timeout(pin: PinId, op: GpioOp, timeout: Duration) -> Self {
        Self::Timeout { pin, op, timeout }
    }

    /// Creates an unavailable error.
    pub fn unavailable(pin: PinId, op: GpioOp, message: impl Into<String>) -> Self {
        Self::Unavailable {
            pin,
            op,
            message: message.into(),
        }
    }

    /// Returns true if the call was abandoned because it exceeded its bound.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            GpioError::Timeout { .. } | GpioError::HelperTimeout { .. }
        )
    }

    /// Returns true if the failure is likely permanent for this process,
    /// e.g. the helper binary is missing or not executable.
    pub fn is_permanent(&self) -> bool {
        match self {
            GpioError::Exec { source, .. } => matches!(
                source.kind(),
                io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied
            ),
            _ => false,
        }
    }
}
