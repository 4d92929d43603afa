//! Watchdog loop
//!
//! One task owns every [`PinTracker`]. Each tick samples all monitored pins
//! in table order, feeds the samples to their trackers and acts on the
//! verdicts. Pin access failures are logged and never stop the loop.
//! Shutdown is only observed between ticks, so a corrective write is never
//! cut off halfway.

use gpio_watchdog_common::{GpioAccessor, GpioError, GpioOp, Level, PinId};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::WatchdogConfig;
use crate::durations::format_secs;
use crate::error::{Result, WatchdogError};
use crate::policy::PinPolicyTable;
use crate::status::{StatusReporter, WatchdogSnapshot};
use crate::tracker::{PinTracker, TrackerSettings, Verdict};

/// What a single tick did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Pins read successfully
    pub sampled: usize,
    /// Pins whose read failed or timed out
    pub read_failures: usize,
    /// Pins observed at their hazardous level
    pub hazardous: usize,
    /// Corrective writes that succeeded
    pub corrections: usize,
    /// Corrections suppressed by dry-run
    pub dry_run_corrections: usize,
    /// Corrective writes that failed or timed out
    pub failed_writes: usize,
    /// Corrections reported as not taking effect
    pub ineffective: usize,
}

/// Samples pins and enforces their dwell bounds
pub struct Watchdog {
    gpio: Arc<dyn GpioAccessor>,
    config: WatchdogConfig,
    settings: TrackerSettings,
    trackers: Vec<PinTracker>,
    started_at: Instant,
    ticks: u64,
}

impl Watchdog {
    /// Creates a watchdog with every pin unknown and assumed safe.
    pub fn new(gpio: Arc<dyn GpioAccessor>, policies: PinPolicyTable, config: WatchdogConfig) -> Self {
        let settings = config.tracker_settings();
        let trackers = policies.into_iter().map(PinTracker::new).collect();
        Self {
            gpio,
            config,
            settings,
            trackers,
            started_at: Instant::now(),
            ticks: 0,
        }
    }

    pub fn config(&self) -> &WatchdogConfig {
        &self.config
    }

    pub fn trackers(&self) -> &[PinTracker] {
        &self.trackers
    }

    pub fn tracker(&self, pin: PinId) -> Option<&PinTracker> {
        self.trackers.iter().find(|t| t.pin() == pin)
    }

    /// Number of completed ticks.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Reads every monitored pin once and logs its level. Fails if no pin
    /// can be read, or at once if the helper itself cannot be run; returns
    /// the number of readable pins.
    pub async fn probe(&self) -> Result<usize> {
        let timeout = self.config.gpio_timeout;
        let mut readable = 0;

        for tracker in &self.trackers {
            let pin = tracker.pin();
            match bounded_read(self.gpio.as_ref(), pin, timeout).await {
                Ok(level) => {
                    readable += 1;
                    info!(pin = %pin, level = %level, "{} current state: {}", pin, level);
                }
                Err(WatchdogError::HardwareAccess { source, .. }) if source.is_permanent() => {
                    error!(
                        backend = self.gpio.name(),
                        error = %source,
                        "GPIO helper cannot be run, giving up on probe"
                    );
                    return Err(WatchdogError::GpioUnavailable(format!(
                        "{} backend unusable: {}",
                        self.gpio.name(),
                        source
                    )));
                }
                Err(e) => {
                    warn!(pin = %pin, error = %e, "Cannot access {}", pin);
                }
            }
        }

        if readable == 0 {
            return Err(WatchdogError::GpioUnavailable(format!(
                "none of {} monitored pins could be read via {}",
                self.trackers.len(),
                self.gpio.name()
            )));
        }
        Ok(readable)
    }

    /// Drives every pin that is not already at its correction level to that
    /// level. Returns the number of writes issued; dry-run issues none.
    pub async fn initialize_safe_levels(&self) -> usize {
        if self.config.dry_run {
            info!("DRY-RUN: skipping safe-state initialization");
            return 0;
        }

        let timeout = self.config.gpio_timeout;
        let mut written = 0;
        for tracker in &self.trackers {
            let pin = tracker.pin();
            let target = tracker.policy().correction_level();

            match bounded_read(self.gpio.as_ref(), pin, timeout).await {
                Ok(level) if level == target => {
                    debug!(pin = %pin, "{} already in safe state ({})", pin, level);
                    continue;
                }
                Ok(_) => {}
                Err(e) => {
                    error!(pin = %pin, error = %e, "Cannot read {} before initialization", pin);
                    continue;
                }
            }

            match bounded_write(self.gpio.as_ref(), pin, target, timeout).await {
                Ok(()) => {
                    written += 1;
                    info!(pin = %pin, level = %target, "Initialized {} to safe state ({})", pin, target);
                }
                Err(e) => {
                    error!(pin = %pin, error = %e, "Failed to initialize {}", pin);
                }
            }
        }
        written
    }

    /// Runs one sampling pass at the current time.
    pub async fn tick(&mut self) -> TickReport {
        self.tick_at(Instant::now()).await
    }

    /// Runs one sampling pass, timestamping every sample with `now`.
    pub async fn tick_at(&mut self, now: Instant) -> TickReport {
        let mut report = TickReport::default();
        let gpio = self.gpio.as_ref();

        for tracker in &mut self.trackers {
            let pin = tracker.pin();
            let level = match bounded_read(gpio, pin, self.config.gpio_timeout).await {
                Ok(level) => level,
                Err(e) => {
                    // The hazard timer keeps running on the previous state
                    report.read_failures += 1;
                    let last_level = tracker
                        .last_observed_level()
                        .map_or_else(|| "unknown".to_string(), |l| l.to_string());
                    let elapsed = tracker
                        .hazard_since()
                        .map_or(Duration::ZERO, |since| now.saturating_duration_since(since));
                    warn!(
                        pin = %pin,
                        phase = tracker.phase().as_str(),
                        level = %last_level,
                        elapsed_ms = elapsed.as_millis() as u64,
                        error = %e,
                        "Failed to read {}, keeping previous state",
                        pin
                    );
                    continue;
                }
            };
            report.sampled += 1;

            let previous = tracker.last_observed_level();
            let verdict = tracker.observe(level, now, &self.settings);
            if previous != Some(level) {
                match previous {
                    Some(prev) => info!(pin = %pin, "{}: {} -> {}", pin, prev, level),
                    None => debug!(pin = %pin, "{}: initial level {}", pin, level),
                }
            }

            match verdict {
                Verdict::Nominal => {}
                Verdict::Entered => {
                    report.hazardous += 1;
                    info!(
                        pin = %pin,
                        level = %level,
                        "{} hazard timer started (max {} allowed)",
                        pin,
                        format_secs(tracker.policy().max_hazard_duration())
                    );
                }
                Verdict::Pending { elapsed } => {
                    report.hazardous += 1;
                    debug!(pin = %pin, elapsed_ms = elapsed.as_millis() as u64, "{} still hazardous", pin);
                }
                Verdict::Recovered {
                    hazard_duration,
                    corrected,
                } => {
                    info!(
                        pin = %pin,
                        hazard_ms = hazard_duration.as_millis() as u64,
                        corrected,
                        "{} returned to safe state after {:.3}s",
                        pin,
                        hazard_duration.as_secs_f64()
                    );
                }
                Verdict::Violation { elapsed } => {
                    report.hazardous += 1;
                    warn!(
                        pin = %pin,
                        level = %level,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "SAFETY VIOLATION: {} at {} for {:.1}s (max {})",
                        pin,
                        level,
                        elapsed.as_secs_f64(),
                        format_secs(tracker.policy().max_hazard_duration())
                    );
                    issue_correction(gpio, &self.config, tracker, level, elapsed, now, &mut report).await;
                }
                Verdict::AwaitingEffect {
                    elapsed,
                    since_correction,
                    ineffective,
                    retry_due,
                } => {
                    report.hazardous += 1;
                    if ineffective && self.config.dry_run {
                        warn!(
                            pin = %pin,
                            level = %level,
                            elapsed_ms = elapsed.as_millis() as u64,
                            "DRY-RUN: {} still hazardous ({} for {:.1}s)",
                            pin,
                            level,
                            elapsed.as_secs_f64()
                        );
                    } else if ineffective {
                        report.ineffective += 1;
                        let failure = WatchdogError::CorrectionFailure {
                            pin,
                            correction_level: tracker.policy().correction_level(),
                            observed: level,
                            elapsed,
                            since_correction,
                        };
                        error!(pin = %pin, error = %failure, "CRITICAL: {}", failure);
                    }
                    if retry_due {
                        warn!(
                            pin = %pin,
                            level = %level,
                            elapsed_ms = elapsed.as_millis() as u64,
                            "Re-issuing correction for {}",
                            pin
                        );
                        issue_correction(gpio, &self.config, tracker, level, elapsed, now, &mut report).await;
                    }
                }
            }
        }

        self.ticks += 1;
        report
    }

    /// Copies the state of every tracker.
    pub fn snapshot(&self, now: Instant) -> WatchdogSnapshot {
        WatchdogSnapshot {
            uptime: now.saturating_duration_since(self.started_at),
            ticks: self.ticks,
            dry_run: self.config.dry_run,
            pins: self.trackers.iter().map(|t| t.snapshot(now)).collect(),
        }
    }

    /// Ticks until `shutdown` is cancelled, then logs the final summary and
    /// returns the final snapshot.
    pub async fn run(mut self, mut reporter: StatusReporter, shutdown: CancellationToken) -> WatchdogSnapshot {
        info!(
            backend = self.gpio.name(),
            pins = self.trackers.len(),
            dry_run = self.config.dry_run,
            sampling_ms = self.config.sampling_interval.as_millis() as u64,
            "Watchdog loop started"
        );
        for tracker in &self.trackers {
            info!("  {}", tracker.policy());
        }

        loop {
            let now = Instant::now();
            let report = self.tick_at(now).await;
            if report.read_failures > 0 || report.failed_writes > 0 {
                debug!(?report, "Tick completed with errors");
            }

            if reporter.due(now) {
                reporter.report(&self.snapshot(now), now);
            }

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.config.sampling_interval) => {}
            }
        }

        info!("Shutdown requested, stopping watchdog loop");
        let snapshot = self.snapshot(Instant::now());
        reporter.final_report(&snapshot);
        snapshot
    }
}

/// Writes the correction level for a pin in violation, or logs the write
/// that would happen in dry-run mode.
async fn issue_correction(
    gpio: &dyn GpioAccessor,
    config: &WatchdogConfig,
    tracker: &mut PinTracker,
    observed: Level,
    elapsed: Duration,
    now: Instant,
    report: &mut TickReport,
) {
    let pin = tracker.pin();
    let target = tracker.policy().correction_level();

    if config.dry_run {
        warn!(
            pin = %pin,
            level = %target,
            "DRY-RUN: would set {} to {} (observed {} for {:.1}s)",
            pin,
            target,
            observed,
            elapsed.as_secs_f64()
        );
        tracker.record_correction(now);
        report.dry_run_corrections += 1;
        return;
    }

    match bounded_write(gpio, pin, target, config.gpio_timeout).await {
        Ok(()) => {
            tracker.record_correction(now);
            report.corrections += 1;
            warn!(pin = %pin, level = %target, "SAFETY: forced {} to {}", pin, target);
        }
        Err(e) => {
            tracker.record_failed_correction();
            report.failed_writes += 1;
            error!(
                pin = %pin,
                level = %observed,
                elapsed_ms = elapsed.as_millis() as u64,
                error = %e,
                "CRITICAL: failed to correct {}, retrying next tick",
                pin
            );
        }
    }
}

async fn bounded_read(gpio: &dyn GpioAccessor, pin: PinId, timeout: Duration) -> Result<Level> {
    match tokio::time::timeout(timeout, gpio.read(pin)).await {
        Ok(Ok(level)) => Ok(level),
        Ok(Err(e)) => Err(WatchdogError::hardware(pin, e)),
        Err(_) => Err(WatchdogError::hardware(
            pin,
            GpioError::timeout(pin, GpioOp::Read, timeout),
        )),
    }
}

async fn bounded_write(gpio: &dyn GpioAccessor, pin: PinId, level: Level, timeout: Duration) -> Result<()> {
    match tokio::time::timeout(timeout, gpio.write(pin, level)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(WatchdogError::hardware(pin, e)),
        Err(_) => Err(WatchdogError::hardware(
            pin,
            GpioError::timeout(pin, GpioOp::Write, timeout),
        )),
    }
}
