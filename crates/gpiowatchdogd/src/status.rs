//! Periodic status reporting
//!
//! The reporter is a read-only observer: it receives snapshots copied out
//! of the watchdog between ticks and writes them to the log. It has no way
//! to influence pin handling.

use gpio_watchdog_common::{Level, PinId};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tracing::info;

use crate::durations::format_secs;

/// Point-in-time copy of one pin's tracker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinSnapshot {
    pub pin: PinId,
    /// `None` until the first successful read.
    pub level: Option<Level>,
    pub phase: &'static str,
    /// Time spent in the current hazard episode, if any.
    pub hazard_elapsed: Option<Duration>,
    pub max_hazard_duration: Duration,
    pub cumulative_hazard_time: Duration,
    pub violations: u64,
    pub total_corrections: u64,
    pub correction_retries: u64,
    pub failed_corrections: u64,
}

impl fmt::Display for PinSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.level, self.hazard_elapsed) {
            (None, _) => write!(f, "{}=?", self.pin),
            (Some(level), Some(elapsed)) => write!(
                f,
                "{}={}({}/{})",
                self.pin,
                level,
                format_secs(elapsed),
                format_secs(self.max_hazard_duration)
            ),
            (Some(level), None) => write!(f, "{}={}", self.pin, level),
        }
    }
}

/// Consistent copy of the whole watchdog taken between ticks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchdogSnapshot {
    pub uptime: Duration,
    pub ticks: u64,
    pub dry_run: bool,
    pub pins: Vec<PinSnapshot>,
}

impl WatchdogSnapshot {
    pub fn total_corrections(&self) -> u64 {
        self.pins.iter().map(|p| p.total_corrections).sum()
    }

    pub fn total_violations(&self) -> u64 {
        self.pins.iter().map(|p| p.violations).sum()
    }

    pub fn total_failed_corrections(&self) -> u64 {
        self.pins.iter().map(|p| p.failed_corrections).sum()
    }

    pub fn pin(&self, pin: PinId) -> Option<&PinSnapshot> {
        self.pins.iter().find(|p| p.pin == pin)
    }
}

impl fmt::Display for WatchdogSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "uptime={}", format_secs(self.uptime))?;
        for pin in &self.pins {
            write!(f, " | {pin}")?;
        }
        write!(
            f,
            " | violations={} | corrections={}",
            self.total_violations(),
            self.total_corrections()
        )
    }
}

/// Emits status summaries on its own cadence
#[derive(Debug)]
pub struct StatusReporter {
    interval: Duration,
    last_report: Instant,
    reports: u64,
}

impl StatusReporter {
    /// Creates a reporter whose first summary is due one interval after
    /// `start`.
    pub fn new(interval: Duration, start: Instant) -> Self {
        Self {
            interval,
            last_report: start,
            reports: 0,
        }
    }

    /// Returns true if a summary is due at `now`.
    pub fn due(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_report) >= self.interval
    }

    /// Logs a periodic summary and restarts the interval at `now`.
    pub fn report(&mut self, snapshot: &WatchdogSnapshot, now: Instant) {
        self.last_report = now;
        self.reports += 1;
        info!(
            uptime_secs = snapshot.uptime.as_secs(),
            violations = snapshot.total_violations(),
            corrections = snapshot.total_corrections(),
            "Status: {}",
            snapshot
        );
    }

    /// Logs the shutdown summary with per-pin statistics.
    pub fn final_report(&mut self, snapshot: &WatchdogSnapshot) {
        self.reports += 1;
        info!("Final status: {}", snapshot);
        for pin in &snapshot.pins {
            info!(
                pin = %pin.pin,
                cumulative_hazard_ms = pin.cumulative_hazard_time.as_millis() as u64,
                violations = pin.violations,
                corrections = pin.total_corrections,
                retries = pin.correction_retries,
                failed_corrections = pin.failed_corrections,
                "  {}: hazard time {}, violations {}, corrections {}, failed corrections {}",
                pin.pin,
                format_secs(pin.cumulative_hazard_time),
                pin.violations,
                pin.total_corrections,
                pin.failed_corrections
            );
        }
        info!(
            "Total violations detected: {}, total corrections made: {}",
            snapshot.total_violations(),
            snapshot.total_corrections()
        );
    }

    /// Number of summaries emitted so far.
    pub fn reports(&self) -> u64 {
        self.reports
    }
}
