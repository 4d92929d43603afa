//! GPIO Safety Watchdog Daemon
//!
//! Independently samples the gate controller's output pins and bounds how
//! long any of them may stay at a hazardous level. A pin that dwells past
//! its limit is forced to its safe level, whatever the higher-level
//! automation believes it commanded.
//!
//! Levels are raw electrical values as reported by the GPIO backend; the
//! policy table decides which of them is hazardous for each pin.

pub mod config;
pub mod config_file;
pub mod durations;
pub mod error;
pub mod policy;
pub mod status;
pub mod tracker;
pub mod watchdog;

pub use config::{
    resolve, CliOverrides, GpioBackend, ResolvedConfig, WatchdogConfig, DEFAULT_CONFIG_PATH,
};
pub use config_file::{ConfigFile, PinEntry};
pub use durations::{format_duration, parse_duration};
pub use error::{Result, WatchdogError};
pub use policy::{PinPolicy, PinPolicyTable, PolicyOverride, DEFAULT_RULES};
pub use status::{PinSnapshot, StatusReporter, WatchdogSnapshot};
pub use tracker::{PinPhase, PinTracker, TrackerSettings, Verdict};
pub use watchdog::{TickReport, Watchdog};
