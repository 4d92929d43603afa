//! Verification helpers for testing the watchdog
//!
//! Provides assertion helpers over tracker state and over log lines
//! captured by `tracing-test`.

use gpio_watchdog_common::PinId;
use gpiowatchdogd::{PinPhase, PinTracker, Watchdog};
use std::time::Duration;
use thiserror::Error;

/// Verification error types
#[derive(Error, Debug)]
pub enum VerificationError {
    #[error("{pin} is not monitored")]
    PinNotMonitored { pin: PinId },

    #[error("Value mismatch for {pin} {what}: expected {expected}, got {actual}")]
    ValueMismatch {
        pin: PinId,
        what: &'static str,
        expected: String,
        actual: String,
    },
}

/// Result type for verification operations
pub type VerifyResult<T> = Result<T, VerificationError>;

/// Tracker state verification helper
pub struct WatchdogVerifier<'a> {
    watchdog: &'a Watchdog,
}

impl<'a> WatchdogVerifier<'a> {
    /// Create a new verifier
    pub fn new(watchdog: &'a Watchdog) -> Self {
        Self { watchdog }
    }

    fn tracker(&self, pin: PinId) -> VerifyResult<&'a PinTracker> {
        self.watchdog
            .tracker(pin)
            .ok_or(VerificationError::PinNotMonitored { pin })
    }

    fn check<T: PartialEq + std::fmt::Debug>(
        pin: PinId,
        what: &'static str,
        expected: T,
        actual: T,
    ) -> VerifyResult<()> {
        if expected == actual {
            return Ok(());
        }
        Err(VerificationError::ValueMismatch {
            pin,
            what,
            expected: format!("{expected:?}"),
            actual: format!("{actual:?}"),
        })
    }

    /// Verify the number of corrective writes recorded for a pin
    pub fn assert_corrections(&self, pin: PinId, expected: u64) -> VerifyResult<()> {
        Self::check(pin, "corrections", expected, self.tracker(pin)?.total_corrections())
    }

    /// Verify the number of violation episodes recorded for a pin
    pub fn assert_violations(&self, pin: PinId, expected: u64) -> VerifyResult<()> {
        Self::check(pin, "violations", expected, self.tracker(pin)?.violations())
    }

    /// Verify the phase name (`safe`, `hazardous` or `corrected`) of a pin
    pub fn assert_phase(&self, pin: PinId, expected: &str) -> VerifyResult<()> {
        let phase: PinPhase = self.tracker(pin)?.phase();
        Self::check(pin, "phase", expected, phase.as_str())
    }

    /// Verify the cumulative hazard time of a pin
    pub fn assert_cumulative_hazard(&self, pin: PinId, expected: Duration) -> VerifyResult<()> {
        Self::check(
            pin,
            "cumulative hazard time",
            expected,
            self.tracker(pin)?.cumulative_hazard_time(),
        )
    }
}

/// Number of captured log lines containing `needle`
pub fn count_lines(lines: &[&str], needle: &str) -> usize {
    lines.iter().filter(|line| line.contains(needle)).count()
}

/// Builds a `logs_assert` check expecting exactly `expected` lines that
/// contain `needle`.
pub fn expect_lines(needle: &'static str, expected: usize) -> impl Fn(&[&str]) -> Result<(), String> {
    move |lines| match count_lines(lines, needle) {
        n if n == expected => Ok(()),
        n => Err(format!("expected {expected} log lines containing '{needle}', found {n}")),
    }
}
