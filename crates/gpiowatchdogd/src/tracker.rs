//! Per-pin state tracking
//!
//! A [`PinTracker`] turns successive level samples of one pin into hazard
//! episodes:
//!
//! ```text
//!            hazardous sample                 bound reached + write issued
//!   Safe ─────────────────────► Hazardous(since) ─────────────────────► Corrected(since, at)
//!    ▲                                │                                        │
//!    └────────── safe sample ─────────┴──────────────── safe sample ───────────┘
//! ```
//!
//! The tracker never touches hardware. It only decides; the watchdog loop
//! acts on the returned [`Verdict`] and reports back what it did.

use gpio_watchdog_common::{Level, PinId};
use std::time::Duration;
use tokio::time::Instant;

use crate::policy::PinPolicy;
use crate::status::PinSnapshot;

/// Hazard phase of a pin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinPhase {
    /// Not at the hazardous level (or not yet observed).
    Safe,
    /// At the hazardous level since `since`, no correction issued.
    Hazardous { since: Instant },
    /// Still hazardous after a correction written at `corrected_at`.
    Corrected { since: Instant, corrected_at: Instant },
}

impl PinPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            PinPhase::Safe => "safe",
            PinPhase::Hazardous { .. } => "hazardous",
            PinPhase::Corrected { .. } => "corrected",
        }
    }
}

/// Outcome of feeding one sample to a tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Safe before and after.
    Nominal,
    /// The pin just reached its hazardous level; the timer started.
    Entered,
    /// The pin left its hazardous level.
    Recovered {
        hazard_duration: Duration,
        corrected: bool,
    },
    /// Hazardous, still within the dwell bound.
    Pending { elapsed: Duration },
    /// Hazardous for at least the dwell bound and no correction has been
    /// issued this episode.
    Violation { elapsed: Duration },
    /// Hazardous although a correction was issued.
    AwaitingEffect {
        elapsed: Duration,
        since_correction: Duration,
        /// First sample past the grace period since the last write.
        ineffective: bool,
        /// The retry cadence has elapsed; the correction should be re-sent.
        retry_due: bool,
    },
}

/// Timing knobs shared by all trackers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerSettings {
    /// Added to the cumulative hazard time for each hazardous sample.
    pub sampling_interval: Duration,
    /// Re-send a correction every this many hazardous samples.
    pub retry_ticks: u32,
    /// How long a correction may take before it counts as failed.
    pub correction_grace: Duration,
}

/// Runtime record of one monitored pin
#[derive(Debug, Clone)]
pub struct PinTracker {
    policy: PinPolicy,
    last_observed_level: Option<Level>,
    phase: PinPhase,
    episode_violated: bool,
    ticks_since_correction: u32,
    ineffective_reported: bool,
    total_corrections: u64,
    correction_retries: u64,
    failed_corrections: u64,
    violations: u64,
    cumulative_hazard_time: Duration,
}

impl PinTracker {
    /// Starts a pin as unknown and assumed safe.
    pub fn new(policy: PinPolicy) -> Self {
        Self {
            policy,
            last_observed_level: None,
            phase: PinPhase::Safe,
            episode_violated: false,
            ticks_since_correction: 0,
            ineffective_reported: false,
            total_corrections: 0,
            correction_retries: 0,
            failed_corrections: 0,
            violations: 0,
            cumulative_hazard_time: Duration::ZERO,
        }
    }

    /// Feeds one successfully read sample.
    pub fn observe(&mut self, level: Level, now: Instant, settings: &TrackerSettings) -> Verdict {
        self.last_observed_level = Some(level);

        if !self.policy.is_hazardous(level) {
            let previous = std::mem::replace(&mut self.phase, PinPhase::Safe);
            self.episode_violated = false;
            self.ticks_since_correction = 0;
            self.ineffective_reported = false;
            return match previous {
                PinPhase::Safe => Verdict::Nominal,
                PinPhase::Hazardous { since } => Verdict::Recovered {
                    hazard_duration: now.saturating_duration_since(since),
                    corrected: false,
                },
                PinPhase::Corrected { since, .. } => Verdict::Recovered {
                    hazard_duration: now.saturating_duration_since(since),
                    corrected: true,
                },
            };
        }

        self.cumulative_hazard_time = self
            .cumulative_hazard_time
            .saturating_add(settings.sampling_interval);

        match self.phase {
            PinPhase::Safe => {
                self.phase = PinPhase::Hazardous { since: now };
                Verdict::Entered
            }
            PinPhase::Hazardous { since } => {
                let elapsed = now.saturating_duration_since(since);
                if elapsed >= self.policy.max_hazard_duration() {
                    if !self.episode_violated {
                        self.episode_violated = true;
                        self.violations += 1;
                    }
                    Verdict::Violation { elapsed }
                } else {
                    Verdict::Pending { elapsed }
                }
            }
            PinPhase::Corrected {
                since,
                corrected_at,
            } => {
                self.ticks_since_correction = self.ticks_since_correction.saturating_add(1);
                let since_correction = now.saturating_duration_since(corrected_at);
                let ineffective =
                    !self.ineffective_reported && since_correction >= settings.correction_grace;
                if ineffective {
                    self.ineffective_reported = true;
                }
                Verdict::AwaitingEffect {
                    elapsed: now.saturating_duration_since(since),
                    since_correction,
                    ineffective,
                    retry_due: self.ticks_since_correction >= settings.retry_ticks.max(1),
                }
            }
        }
    }

    /// Records a corrective write (or, in dry-run, a would-be write) issued
    /// at `now` for the current episode.
    pub fn record_correction(&mut self, now: Instant) {
        let since = match self.phase {
            PinPhase::Hazardous { since } => since,
            PinPhase::Corrected { since, .. } => {
                self.correction_retries += 1;
                since
            }
            // Nothing to correct; the pin recovered on its own
            PinPhase::Safe => return,
        };
        self.phase = PinPhase::Corrected {
            since,
            corrected_at: now,
        };
        self.total_corrections += 1;
        self.ticks_since_correction = 0;
        self.ineffective_reported = false;
    }

    /// Records a corrective write that failed at the hardware level. The
    /// phase is left alone so the next sample makes the write due again.
    pub fn record_failed_correction(&mut self) {
        self.failed_corrections += 1;
    }

    pub fn pin(&self) -> PinId {
        self.policy.pin()
    }

    pub fn policy(&self) -> &PinPolicy {
        &self.policy
    }

    pub fn phase(&self) -> PinPhase {
        self.phase
    }

    pub fn last_observed_level(&self) -> Option<Level> {
        self.last_observed_level
    }

    /// Start of the current hazard episode, if any.
    pub fn hazard_since(&self) -> Option<Instant> {
        match self.phase {
            PinPhase::Safe => None,
            PinPhase::Hazardous { since } | PinPhase::Corrected { since, .. } => Some(since),
        }
    }

    /// True while a correction has been issued this episode and the pin is
    /// still seen hazardous.
    pub fn correction_triggered(&self) -> bool {
        matches!(self.phase, PinPhase::Corrected { .. })
    }

    pub fn total_corrections(&self) -> u64 {
        self.total_corrections
    }

    pub fn correction_retries(&self) -> u64 {
        self.correction_retries
    }

    pub fn failed_corrections(&self) -> u64 {
        self.failed_corrections
    }

    pub fn violations(&self) -> u64 {
        self.violations
    }

    pub fn cumulative_hazard_time(&self) -> Duration {
        self.cumulative_hazard_time
    }

    /// Copies the tracker's state for reporting.
    pub fn snapshot(&self, now: Instant) -> PinSnapshot {
        PinSnapshot {
            pin: self.pin(),
            level: self.last_observed_level,
            phase: self.phase.as_str(),
            hazard_elapsed: self.hazard_since().map(|since| now.saturating_duration_since(since)),
            max_hazard_duration: self.policy.max_hazard_duration(),
            cumulative_hazard_time: self.cumulative_hazard_time,
            violations: self.violations,
            total_corrections: self.total_corrections,
            correction_retries: self.correction_retries,
            failed_corrections: self.failed_corrections,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TICK: Duration = Duration::from_millis(500);

    fn settings() -> TrackerSettings {
        TrackerSettings {
            sampling_interval: TICK,
            retry_ticks: 3,
            correction_grace: Duration::from_secs(1),
        }
    }

    fn tracker(max: Duration) -> PinTracker {
        PinTracker::new(PinPolicy::opposite(PinId::new(4), Level::Low, max).unwrap())
    }

    #[test]
    fn test_starts_unknown_and_safe() {
        let t = tracker(Duration::from_secs(2));
        assert_eq!(t.last_observed_level(), None);
        assert_eq!(t.phase(), PinPhase::Safe);
        assert_eq!(t.hazard_since(), None);
        assert!(!t.correction_triggered());
        assert_eq!(t.total_corrections(), 0);
        assert_eq!(t.cumulative_hazard_time(), Duration::ZERO);
    }

    #[test]
    fn test_hazard_timer_lifecycle() {
        let s = settings();
        let t0 = Instant::now();
        let mut t = tracker(Duration::from_secs(2));

        assert_eq!(t.observe(Level::High, t0, &s), Verdict::Nominal);
        assert_eq!(t.observe(Level::Low, t0 + TICK, &s), Verdict::Entered);
        assert_eq!(t.hazard_since(), Some(t0 + TICK));
        assert_eq!(
            t.observe(Level::Low, t0 + TICK * 2, &s),
            Verdict::Pending { elapsed: TICK }
        );
        // Re-observing the hazardous level never moves the timer
        assert_eq!(t.hazard_since(), Some(t0 + TICK));

        assert_eq!(
            t.observe(Level::High, t0 + TICK * 3, &s),
            Verdict::Recovered {
                hazard_duration: TICK * 2,
                corrected: false
            }
        );
        assert_eq!(t.hazard_since(), None);
        assert_eq!(t.cumulative_hazard_time(), TICK * 2);
        assert_eq!(t.violations(), 0);
    }

    #[test]
    fn test_violation_at_bound() {
        let s = settings();
        let t0 = Instant::now();
        let mut t = tracker(Duration::from_secs(1));

        t.observe(Level::Low, t0, &s);
        assert_eq!(t.observe(Level::Low, t0 + TICK, &s), Verdict::Pending { elapsed: TICK });
        assert_eq!(
            t.observe(Level::Low, t0 + TICK * 2, &s),
            Verdict::Violation {
                elapsed: Duration::from_secs(1)
            }
        );
        assert_eq!(t.violations(), 1);

        // A failed write keeps the episode due without double counting it
        t.record_failed_correction();
        assert!(matches!(
            t.observe(Level::Low, t0 + TICK * 3, &s),
            Verdict::Violation { .. }
        ));
        assert_eq!(t.violations(), 1);
        assert_eq!(t.failed_corrections(), 1);
        assert!(!t.correction_triggered());
    }

    #[test]
    fn test_correction_then_retry_cadence() {
        let s = settings();
        let t0 = Instant::now();
        let mut t = tracker(Duration::from_millis(500));

        t.observe(Level::Low, t0, &s);
        assert!(matches!(t.observe(Level::Low, t0 + TICK, &s), Verdict::Violation { .. }));
        t.record_correction(t0 + TICK);
        assert!(t.correction_triggered());
        assert_eq!(t.total_corrections(), 1);

        let v1 = t.observe(Level::Low, t0 + TICK * 2, &s);
        assert_eq!(
            v1,
            Verdict::AwaitingEffect {
                elapsed: TICK * 2,
                since_correction: TICK,
                ineffective: false,
                retry_due: false
            }
        );
        let v2 = t.observe(Level::Low, t0 + TICK * 3, &s);
        assert!(matches!(
            v2,
            Verdict::AwaitingEffect {
                ineffective: true,
                retry_due: false,
                ..
            }
        ));
        // Ineffective is reported once per write
        let v3 = t.observe(Level::Low, t0 + TICK * 4, &s);
        assert!(matches!(
            v3,
            Verdict::AwaitingEffect {
                ineffective: false,
                retry_due: true,
                ..
            }
        ));

        t.record_correction(t0 + TICK * 4);
        assert_eq!(t.total_corrections(), 2);
        assert_eq!(t.correction_retries(), 1);
        assert_eq!(t.hazard_since(), Some(t0));
    }

    #[test]
    fn test_recovery_after_correction_resets_episode() {
        let s = settings();
        let t0 = Instant::now();
        let mut t = tracker(Duration::from_millis(500));

        t.observe(Level::Low, t0, &s);
        t.observe(Level::Low, t0 + TICK, &s);
        t.record_correction(t0 + TICK);
        assert_eq!(
            t.observe(Level::High, t0 + TICK * 2, &s),
            Verdict::Recovered {
                hazard_duration: TICK * 2,
                corrected: true
            }
        );
        assert!(!t.correction_triggered());

        // New episode starts from scratch but counters keep growing
        assert_eq!(t.observe(Level::Low, t0 + TICK * 3, &s), Verdict::Entered);
        assert!(matches!(
            t.observe(Level::Low, t0 + TICK * 4, &s),
            Verdict::Violation { .. }
        ));
        assert_eq!(t.violations(), 2);
        assert_eq!(t.total_corrections(), 1);
        assert_eq!(t.cumulative_hazard_time(), TICK * 4);
    }

    #[test]
    fn test_record_correction_when_safe_is_ignored() {
        let mut t = tracker(Duration::from_secs(1));
        t.record_correction(Instant::now());
        assert_eq!(t.total_corrections(), 0);
        assert_eq!(t.phase(), PinPhase::Safe);
    }

    #[test]
    fn test_snapshot() {
        let s = settings();
        let t0 = Instant::now();
        let mut t = tracker(Duration::from_secs(2));
        t.observe(Level::Low, t0, &s);

        let snap = t.snapshot(t0 + Duration::from_millis(1200));
        assert_eq!(snap.pin, PinId::new(4));
        assert_eq!(snap.level, Some(Level::Low));
        assert_eq!(snap.phase, "hazardous");
        assert_eq!(snap.hazard_elapsed, Some(Duration::from_millis(1200)));
        assert_eq!(snap.cumulative_hazard_time, TICK);
    }
}
