//! GPIO capability interface.
//!
//! Levels are always raw electrical levels. The gate automation layer
//! drives its relays with inverted logic (logical "on" is electrically
//! low); nothing in this module knows or cares about that mapping.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::GpioResult;

/// Highest BCM pin number exposed on the Raspberry Pi SoC.
pub const MAX_BCM_PIN: u8 = 53;

/// Raw electrical logic level of a digital pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    /// Electrically low (0).
    Low,
    /// Electrically high (1).
    High,
}

impl Level {
    /// Returns the other level.
    pub fn opposite(self) -> Self {
        match self {
            Level::Low => Level::High,
            Level::High => Level::Low,
        }
    }

    /// Returns the level as a bit, as printed by GPIO tools.
    pub fn as_bit(self) -> u8 {
        match self {
            Level::Low => 0,
            Level::High => 1,
        }
    }

    /// Returns the level name used in configuration.
    pub fn as_str(self) -> &'static str {
        match self {
            Level::Low => "low",
            Level::High => "high",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_bit())
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" | "0" => Ok(Level::Low),
            "high" | "1" => Ok(Level::High),
            other => Err(format!("invalid level '{other}' (expected low, high, 0 or 1)")),
        }
    }
}

/// BCM number of a monitored pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PinId(u8);

impl PinId {
    /// Creates a pin identifier from its BCM number.
    pub const fn new(bcm: u8) -> Self {
        Self(bcm)
    }

    /// Returns the BCM number.
    pub fn bcm(self) -> u8 {
        self.0
    }

    /// Returns true if the pin exists on the SoC.
    pub fn is_valid(self) -> bool {
        self.0 <= MAX_BCM_PIN
    }
}

impl fmt::Display for PinId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GPIO{}", self.0)
    }
}

impl FromStr for PinId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let digits = s
            .strip_prefix("GPIO")
            .or_else(|| s.strip_prefix("gpio"))
            .unwrap_or(s);
        digits
            .parse::<u8>()
            .map(PinId)
            .map_err(|e| format!("invalid pin '{s}': {e}"))
    }
}

/// Kind of GPIO access, for error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpioOp {
    /// Level read.
    Read,
    /// Level write.
    Write,
}

impl fmt::Display for GpioOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GpioOp::Read => write!(f, "read"),
            GpioOp::Write => write!(f, "write"),
        }
    }
}

/// Capability to read and drive pin levels.
///
/// Implementations perform exactly one hardware access per call and never
/// retry; retry policy belongs to the caller. Callers are expected to bound
/// every call with a timeout.
#[async_trait]
pub trait GpioAccessor: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &str;

    /// Reads the current level of `pin`.
    async fn read(&self, pin: PinId) -> GpioResult<Level>;

    /// Drives `pin` to `level`.
    async fn write(&self, pin: PinId, level: Level) -> GpioResult<()>;
}
