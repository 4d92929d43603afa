//! Test fixtures for common watchdog scenarios
//!
//! A [`Harness`] pairs a [`SimulatedGpio`] with a [`Watchdog`] and drives
//! ticks with timestamps spaced exactly one sampling interval apart, so
//! scenarios do not depend on wall-clock scheduling.

use gpio_watchdog_common::{Level, PinId, SimulatedGpio};
use gpiowatchdogd::{
    GpioBackend, PinPolicy, PinPolicyTable, TickReport, Watchdog, WatchdogConfig,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Sampling interval used by the scenarios
pub const SCENARIO_INTERVAL: Duration = Duration::from_millis(500);

/// Gate controller pins
pub mod gate_pins {
    use super::PinId;

    /// Motor relay A
    pub const MOTOR_A: PinId = PinId::new(2);
    /// Motor relay B
    pub const MOTOR_B: PinId = PinId::new(3);
    /// Lock solenoid
    pub const LOCK: PinId = PinId::new(4);
    /// Impulse relay
    pub const AUX: PinId = PinId::new(10);
}

/// Table with a single active-low pin
pub fn single_pin_table(pin: PinId, max_hazard_duration: Duration) -> PinPolicyTable {
    let policy = PinPolicy::opposite(pin, Level::Low, max_hazard_duration)
        .unwrap_or_else(|e| panic!("invalid fixture policy for {pin}: {e}"));
    PinPolicyTable::new(vec![policy]).unwrap_or_else(|e| panic!("invalid fixture table: {e}"))
}

/// Watchdog settings for simulated scenarios
pub fn scenario_config() -> WatchdogConfig {
    WatchdogConfig {
        sampling_interval: SCENARIO_INTERVAL,
        backend: GpioBackend::Simulated,
        ..Default::default()
    }
}

/// Simulated pins plus the watchdog guarding them
pub struct Harness {
    pub sim: Arc<SimulatedGpio>,
    pub watchdog: Watchdog,
    pub start: Instant,
    interval: Duration,
    steps: u32,
}

impl Harness {
    /// Creates a harness over a fresh simulated bank.
    pub fn new(table: PinPolicyTable, config: WatchdogConfig) -> Self {
        Self::with_gpio(Arc::new(SimulatedGpio::new()), table, config)
    }

    /// Creates a harness over an existing bank, e.g. to model a restart.
    pub fn with_gpio(sim: Arc<SimulatedGpio>, table: PinPolicyTable, config: WatchdogConfig) -> Self {
        let interval = config.sampling_interval;
        let watchdog = Watchdog::new(sim.clone(), table, config);
        Self {
            sim,
            watchdog,
            start: Instant::now(),
            interval,
            steps: 0,
        }
    }

    /// Single-pin harness with default scenario settings.
    pub fn single_pin(pin: PinId, max_hazard_duration: Duration) -> Self {
        Self::new(single_pin_table(pin, max_hazard_duration), scenario_config())
    }

    /// Timestamp of the next tick.
    pub fn now(&self) -> Instant {
        self.start + self.interval * self.steps
    }

    /// Runs one tick.
    pub async fn step(&mut self) -> TickReport {
        let now = self.now();
        self.steps += 1;
        self.watchdog.tick_at(now).await
    }

    /// Runs `count` ticks.
    pub async fn step_n(&mut self, count: usize) -> Vec<TickReport> {
        let mut reports = Vec::with_capacity(count);
        for _ in 0..count {
            reports.push(self.step().await);
        }
        reports
    }

    /// Queues `levels` on `pin` and runs one tick per level.
    pub async fn feed(&mut self, pin: PinId, levels: &[Level]) -> Vec<TickReport> {
        self.sim.script(pin, levels.iter().copied());
        self.step_n(levels.len()).await
    }
}

/// `level` repeated `count` times
pub fn repeat(level: Level, count: usize) -> Vec<Level> {
    vec![level; count]
}
