//! Error types for gpiowatchdogd

use gpio_watchdog_common::{GpioError, Level, PinId};
use std::time::Duration;
use thiserror::Error;

/// GPIO watchdog daemon errors
#[derive(Error, Debug)]
pub enum WatchdogError {
    /// A pin read or write failed or timed out
    #[error("Hardware access error on {pin}: {source}")]
    HardwareAccess {
        /// Pin being accessed
        pin: PinId,
        /// Underlying GPIO failure
        #[source]
        source: GpioError,
    },

    /// Invalid policy, flag or config file value
    #[error("Invalid configuration for {field}: {message}")]
    Configuration {
        /// Offending field or flag
        field: String,
        /// Error message
        message: String,
    },

    /// A corrective write was issued but the pin stayed hazardous
    #[error(
        "Correction of {pin} to {correction_level} did not take effect: \
         still {observed} after {since_correction:?} ({elapsed:?} into hazard)"
    )]
    CorrectionFailure {
        /// Pin that failed to leave its hazardous level
        pin: PinId,
        /// Level that was written
        correction_level: Level,
        /// Level still observed
        observed: Level,
        /// Time since the hazard episode started
        elapsed: Duration,
        /// Time since the last corrective write
        since_correction: Duration,
    },

    /// No monitored pin could be read at startup
    #[error("GPIO interface unavailable: {0}")]
    GpioUnavailable(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WatchdogError {
    /// Creates a configuration error.
    pub fn config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates a hardware access error.
    pub fn hardware(pin: PinId, source: GpioError) -> Self {
        Self::HardwareAccess { pin, source }
    }
}

/// Result type for gpiowatchdogd operations
pub type Result<T> = std::result::Result<T, WatchdogError>;
