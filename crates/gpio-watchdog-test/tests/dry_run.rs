//! Dry-run mode: evaluate and log, never write

use gpio_watchdog_common::Level;
use gpio_watchdog_test::{
    expect_lines, gate_pins, scenario_config, single_pin_table, Harness,
};
use gpiowatchdogd::WatchdogConfig;
use pretty_assertions::assert_eq;
use std::time::Duration;
use tracing_test::traced_test;

fn dry_run_config() -> WatchdogConfig {
    WatchdogConfig {
        dry_run: true,
        ..scenario_config()
    }
}

#[tokio::test]
#[traced_test]
async fn test_dry_run_never_writes() {
    let pin = gate_pins::LOCK;
    let mut h = Harness::new(single_pin_table(pin, Duration::from_secs(2)), dry_run_config());
    h.sim.set_level(pin, Level::Low);

    let reports = h.step_n(5).await;
    assert_eq!(reports[4].dry_run_corrections, 1);
    assert_eq!(reports[4].corrections, 0);
    assert_eq!(h.sim.write_attempts(), 0);
    assert_eq!(h.sim.level(pin), Level::Low);

    assert!(logs_contain("SAFETY VIOLATION: GPIO4"));
    logs_assert(expect_lines("DRY-RUN: would set GPIO4 to 1", 1));

    let tracker = h.watchdog.tracker(pin).unwrap();
    assert_eq!(tracker.violations(), 1);
    assert_eq!(tracker.total_corrections(), 1);
    assert!(tracker.correction_triggered());
}

#[tokio::test]
async fn test_dry_run_follows_retry_cadence() {
    let pin = gate_pins::LOCK;
    let config = WatchdogConfig {
        correction_retry_ticks: 2,
        ..dry_run_config()
    };
    let mut h = Harness::new(single_pin_table(pin, Duration::from_millis(500)), config);
    h.sim.set_level(pin, Level::Low);

    // Violation on the second sample, then every second sample
    let reports = h.step_n(6).await;
    let would_write: usize = reports.iter().map(|r| r.dry_run_corrections).sum();
    assert_eq!(would_write, 3);
    assert_eq!(h.sim.write_attempts(), 0);
}

/// Scenario:
/// 1. Lock held low, 500ms limit
/// 2. Would-be correction at t=0.5s
/// 3. Still low past the grace period: no write was issued, so no failure
#[tokio::test]
#[traced_test]
async fn test_dry_run_raises_no_correction_failure() {
    let pin = gate_pins::LOCK;
    let mut h = Harness::new(single_pin_table(pin, Duration::from_millis(500)), dry_run_config());
    h.sim.set_level(pin, Level::Low);

    let reports = h.step_n(4).await;
    assert_eq!(reports[1].dry_run_corrections, 1);
    let ineffective: usize = reports.iter().map(|r| r.ineffective).sum();
    assert_eq!(ineffective, 0);
    assert_eq!(h.sim.write_attempts(), 0);

    logs_assert(expect_lines("did not take effect", 0));
    logs_assert(expect_lines("DRY-RUN: GPIO4 still hazardous", 1));
}

#[tokio::test]
async fn test_dry_run_skips_initialization() {
    let h = Harness::new(
        single_pin_table(gate_pins::AUX, Duration::from_secs(4)),
        dry_run_config(),
    );
    h.sim.set_level(gate_pins::AUX, Level::Low);

    assert_eq!(h.watchdog.initialize_safe_levels().await, 0);
    assert_eq!(h.sim.write_attempts(), 0);
}
