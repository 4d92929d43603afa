//! Hazard episode scenarios on the gate controller pins

use gpio_watchdog_common::Level;
use gpio_watchdog_test::{
    gate_pins, repeat, scenario_config, single_pin_table, Harness, WatchdogVerifier,
    SCENARIO_INTERVAL,
};
use gpiowatchdogd::{PinPolicyTable, WatchdogConfig};
use pretty_assertions::assert_eq;
use std::time::Duration;

/// Scenario:
/// 1. Lock solenoid held low, 2s limit, sampled every 0.5s
/// 2. Five low samples span exactly 2s
/// 3. Exactly one write to high on the fifth sample
#[tokio::test]
async fn test_lock_held_low_is_corrected_once() {
    let pin = gate_pins::LOCK;
    let mut h = Harness::single_pin(pin, Duration::from_secs(2));
    h.sim.set_level(pin, Level::Low);
    h.sim.set_stuck(pin, true);

    let reports = h.step_n(4).await;
    assert!(reports.iter().all(|r| r.corrections == 0));
    assert!(h.sim.writes_to(pin).is_empty());

    let report = h.step().await;
    assert_eq!(report.corrections, 1);
    assert_eq!(h.sim.writes_to(pin), vec![Level::High]);

    let verifier = WatchdogVerifier::new(&h.watchdog);
    verifier.assert_corrections(pin, 1).unwrap();
    verifier.assert_violations(pin, 1).unwrap();
    verifier.assert_phase(pin, "corrected").unwrap();
}

/// Scenario: motor relay B held at its safe level never sees a correction
#[tokio::test]
async fn test_pin_at_safe_level_is_left_alone() {
    let pin = gate_pins::MOTOR_B;
    let mut h = Harness::single_pin(pin, Duration::from_secs(20));
    h.sim.set_level(pin, Level::High);

    let reports = h.step_n(100).await;
    assert!(reports.iter().all(|r| r.hazardous == 0 && r.corrections == 0));
    assert_eq!(h.sim.write_attempts(), 0);

    let verifier = WatchdogVerifier::new(&h.watchdog);
    verifier.assert_corrections(pin, 0).unwrap();
    verifier.assert_cumulative_hazard(pin, Duration::ZERO).unwrap();
    verifier.assert_phase(pin, "safe").unwrap();
}

/// Scenario:
/// 1. Aux relay low for 1.5s, under its 4s limit
/// 2. Back high for one sample
/// 3. Low for 5s, over the limit
/// Only the second episode is corrected, and its timer starts from zero
#[tokio::test]
async fn test_independent_hazard_episodes() {
    let pin = gate_pins::AUX;
    let mut h = Harness::single_pin(pin, Duration::from_secs(4));

    let first = h.feed(pin, &repeat(Level::Low, 3)).await;
    assert!(first.iter().all(|r| r.corrections == 0));

    h.feed(pin, &[Level::High]).await;
    WatchdogVerifier::new(&h.watchdog).assert_phase(pin, "safe").unwrap();

    let second = h.feed(pin, &repeat(Level::Low, 10)).await;
    let fired: Vec<usize> = second
        .iter()
        .enumerate()
        .filter(|(_, r)| r.corrections > 0)
        .map(|(i, _)| i)
        .collect();
    // Episode began at the first low sample; 4s later is the ninth
    assert_eq!(fired, vec![8]);
    assert_eq!(h.sim.writes_to(pin), vec![Level::High]);

    let verifier = WatchdogVerifier::new(&h.watchdog);
    verifier.assert_violations(pin, 1).unwrap();
    verifier.assert_corrections(pin, 1).unwrap();
    verifier
        .assert_cumulative_hazard(pin, SCENARIO_INTERVAL * 13)
        .unwrap();
}

/// Scenario: a pin that does not respond to the correction is re-written on
/// the retry cadence instead of every tick
#[tokio::test]
async fn test_stuck_pin_retries_on_cadence() {
    let pin = gate_pins::LOCK;
    let config = WatchdogConfig {
        correction_retry_ticks: 4,
        ..scenario_config()
    };
    let mut h = Harness::new(single_pin_table(pin, Duration::from_secs(1)), config);
    h.sim.set_level(pin, Level::Low);
    h.sim.set_stuck(pin, true);

    // Violation on the third sample, then retries every fourth sample
    let reports = h.step_n(11).await;
    let fired: Vec<usize> = reports
        .iter()
        .enumerate()
        .filter(|(_, r)| r.corrections > 0)
        .map(|(i, _)| i)
        .collect();
    assert_eq!(fired, vec![2, 6, 10]);

    // Ineffective correction reported once per write, after the 1s grace
    let ineffective: usize = reports.iter().map(|r| r.ineffective).sum();
    assert_eq!(ineffective, 2);

    let tracker = h.watchdog.tracker(pin).unwrap();
    assert_eq!(tracker.total_corrections(), 3);
    assert_eq!(tracker.correction_retries(), 2);
    assert_eq!(tracker.violations(), 1);
    assert_eq!(h.sim.writes_to(pin).len(), 3);
}

/// Scenario: only the pin in violation is written; others keep running
#[tokio::test]
async fn test_pins_are_tracked_independently() {
    let mut h = Harness::new(PinPolicyTable::defaults(), scenario_config());
    h.sim.set_level(gate_pins::LOCK, Level::Low);
    h.sim.set_level(gate_pins::MOTOR_A, Level::Low);

    // Lock limit is 2s, motor A limit is 25s
    h.step_n(5).await;

    assert_eq!(h.sim.writes_to(gate_pins::LOCK), vec![Level::High]);
    assert!(h.sim.writes_to(gate_pins::MOTOR_A).is_empty());
    assert!(h.sim.writes_to(gate_pins::MOTOR_B).is_empty());

    let snapshot = h.watchdog.snapshot(h.now());
    assert_eq!(snapshot.total_corrections(), 1);
    assert_eq!(
        snapshot.pin(gate_pins::MOTOR_A).unwrap().hazard_elapsed,
        Some(Duration::from_millis(2500))
    );
    // Not sampled since the write
    assert_eq!(snapshot.pin(gate_pins::LOCK).unwrap().phase, "corrected");

    h.step().await;
    let snapshot = h.watchdog.snapshot(h.now());
    assert_eq!(snapshot.pin(gate_pins::LOCK).unwrap().phase, "safe");
    assert_eq!(snapshot.pin(gate_pins::LOCK).unwrap().level, Some(Level::High));
}

/// Scenario: a restarted watchdog forgets all history
#[tokio::test]
async fn test_restart_resets_counters() {
    let pin = gate_pins::LOCK;
    let mut h = Harness::single_pin(pin, Duration::from_millis(500));
    h.sim.set_level(pin, Level::Low);
    h.step_n(2).await;
    WatchdogVerifier::new(&h.watchdog).assert_corrections(pin, 1).unwrap();

    let restarted = Harness::with_gpio(
        h.sim.clone(),
        single_pin_table(pin, Duration::from_millis(500)),
        scenario_config(),
    );
    let tracker = restarted.watchdog.tracker(pin).unwrap();
    assert_eq!(tracker.total_corrections(), 0);
    assert_eq!(tracker.violations(), 0);
    assert_eq!(tracker.last_observed_level(), None);
    assert_eq!(tracker.cumulative_hazard_time(), Duration::ZERO);
}

/// Scenario: safe-state initialization only writes pins that need it
#[tokio::test]
async fn test_initialize_safe_levels_is_idempotent() {
    let h = Harness::new(PinPolicyTable::defaults(), scenario_config());
    h.sim.set_level(gate_pins::AUX, Level::Low);

    assert_eq!(h.watchdog.initialize_safe_levels().await, 1);
    assert_eq!(h.sim.writes_to(gate_pins::AUX), vec![Level::High]);
    assert_eq!(h.watchdog.initialize_safe_levels().await, 0);
    assert_eq!(h.sim.write_attempts(), 1);
}
