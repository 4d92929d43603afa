//! Control surface: runtime settings of the watchdog
//!
//! Settings come from three layers, later layers winning:
//! built-in defaults, the TOML config file, command-line flags.
//! Everything is validated once at startup; the loop never reloads.

use clap::ValueEnum;
use gpio_watchdog_common::{GpioAccessor, Pigs, RaspiGpio, SimulatedGpio};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::config_file::ConfigFile;
use crate::error::{Result, WatchdogError};
use crate::policy::{PinPolicyTable, PolicyOverride};
use crate::tracker::TrackerSettings;

/// Default config file location
pub const DEFAULT_CONFIG_PATH: &str = "/etc/gpio-watchdog/gpiowatchdogd.toml";

/// How pins are accessed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum GpioBackend {
    /// `raspi-gpio get/set`
    #[default]
    RaspiGpio,
    /// pigpio daemon via `pigs r/w`
    Pigs,
    /// In-memory pins, no hardware
    Simulated,
}

impl GpioBackend {
    /// Instantiates the backend; each helper call is killed after `timeout`.
    pub fn build(self, timeout: Duration) -> Arc<dyn GpioAccessor> {
        match self {
            GpioBackend::RaspiGpio => Arc::new(RaspiGpio::new(timeout)),
            GpioBackend::Pigs => Arc::new(Pigs::new(timeout)),
            GpioBackend::Simulated => Arc::new(SimulatedGpio::new()),
        }
    }
}

impl fmt::Display for GpioBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GpioBackend::RaspiGpio => write!(f, "raspi-gpio"),
            GpioBackend::Pigs => write!(f, "pigs"),
            GpioBackend::Simulated => write!(f, "simulated"),
        }
    }
}

/// Watchdog runtime settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WatchdogConfig {
    /// Evaluate and log corrections, never write pins
    pub dry_run: bool,

    /// Pause between sampling passes
    #[serde(with = "crate::durations::serde_str")]
    pub sampling_interval: Duration,

    /// Pause between status summaries
    #[serde(with = "crate::durations::serde_str")]
    pub status_interval: Duration,

    /// Upper bound on a single pin read or write
    #[serde(with = "crate::durations::serde_str")]
    pub gpio_timeout: Duration,

    /// Re-send an ineffective correction every this many samples
    pub correction_retry_ticks: u32,

    /// Time a correction may take before it is reported as failed
    #[serde(with = "crate::durations::serde_str")]
    pub correction_grace: Duration,

    /// Drive every pin to its correction level at startup
    pub initialize_safe: bool,

    /// Pin access backend
    pub backend: GpioBackend,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            sampling_interval: Duration::from_millis(500),
            status_interval: Duration::from_secs(60),
            gpio_timeout: Duration::from_secs(1),
            correction_retry_ticks: 10,
            correction_grace: Duration::from_secs(1),
            initialize_safe: false,
            backend: GpioBackend::default(),
        }
    }
}

impl WatchdogConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let intervals = [
            ("sampling_interval", self.sampling_interval),
            ("status_interval", self.status_interval),
            ("gpio_timeout", self.gpio_timeout),
        ];
        for (field, value) in intervals {
            if value.is_zero() {
                return Err(WatchdogError::config(field, "must be greater than zero"));
            }
        }
        if self.correction_retry_ticks == 0 {
            return Err(WatchdogError::config(
                "correction_retry_ticks",
                "must be at least 1",
            ));
        }
        Ok(())
    }

    /// Settings handed to every pin tracker
    pub fn tracker_settings(&self) -> TrackerSettings {
        TrackerSettings {
            sampling_interval: self.sampling_interval,
            retry_ticks: self.correction_retry_ticks,
            correction_grace: self.correction_grace,
        }
    }
}

/// Values given on the command line; `None`/`false` leaves the file value
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub dry_run: bool,
    pub sampling_interval: Option<Duration>,
    pub status_interval: Option<Duration>,
    pub gpio_timeout: Option<Duration>,
    pub correction_retry_ticks: Option<u32>,
    pub correction_grace: Option<Duration>,
    pub initialize_safe: bool,
    pub backend: Option<GpioBackend>,
    pub pins: Vec<PolicyOverride>,
}

/// Fully validated startup configuration
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub watchdog: WatchdogConfig,
    pub policies: PinPolicyTable,
}

/// Layers command-line values over the config file and validates the
/// result.
pub fn resolve(file: ConfigFile, cli: &CliOverrides) -> Result<ResolvedConfig> {
    let policies = file.policy_table()?.with_overrides(&cli.pins)?;

    let mut watchdog = file.watchdog;
    watchdog.dry_run |= cli.dry_run;
    watchdog.initialize_safe |= cli.initialize_safe;
    if let Some(v) = cli.sampling_interval {
        watchdog.sampling_interval = v;
    }
    if let Some(v) = cli.status_interval {
        watchdog.status_interval = v;
    }
    if let Some(v) = cli.gpio_timeout {
        watchdog.gpio_timeout = v;
    }
    if let Some(v) = cli.correction_retry_ticks {
        watchdog.correction_retry_ticks = v;
    }
    if let Some(v) = cli.correction_grace {
        watchdog.correction_grace = v;
    }
    if let Some(v) = cli.backend {
        watchdog.backend = v;
    }
    watchdog.validate()?;

    Ok(ResolvedConfig { watchdog, policies })
}

#[cfg(test)]
mod tests {
    use super::*;
    use gpio_watchdog_common::PinId;

    #[test]
    fn test_defaults() {
        let config = WatchdogConfig::default();
        assert!(!config.dry_run);
        assert_eq!(config.sampling_interval, Duration::from_millis(500));
        assert_eq!(config.status_interval, Duration::from_secs(60));
        assert_eq!(config.backend, GpioBackend::RaspiGpio);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_intervals() {
        let mut config = WatchdogConfig::default();
        config.sampling_interval = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = WatchdogConfig::default();
        config.gpio_timeout = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = WatchdogConfig::default();
        config.correction_retry_ticks = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_resolve_cli_wins() {
        let cli = CliOverrides {
            dry_run: true,
            sampling_interval: Some(Duration::from_millis(100)),
            backend: Some(GpioBackend::Simulated),
            pins: vec!["4=max:1s".parse().unwrap()],
            ..Default::default()
        };
        let resolved = resolve(ConfigFile::default(), &cli).unwrap();
        assert!(resolved.watchdog.dry_run);
        assert_eq!(resolved.watchdog.sampling_interval, Duration::from_millis(100));
        assert_eq!(resolved.watchdog.status_interval, Duration::from_secs(60));
        assert_eq!(resolved.watchdog.backend, GpioBackend::Simulated);
        assert_eq!(
            resolved
                .policies
                .get(PinId::new(4))
                .unwrap()
                .max_hazard_duration(),
            Duration::from_secs(1)
        );
    }

    #[test]
    fn test_resolve_rejects_invalid_values() {
        let cli = CliOverrides {
            status_interval: Some(Duration::ZERO),
            ..Default::default()
        };
        let err = resolve(ConfigFile::default(), &cli).unwrap_err();
        assert!(matches!(err, WatchdogError::Configuration { .. }));

        let cli = CliOverrides {
            pins: vec!["4=correct:low".parse().unwrap()],
            ..Default::default()
        };
        assert!(resolve(ConfigFile::default(), &cli).is_err());
    }

    #[test]
    fn test_backend_names() {
        assert_eq!(GpioBackend::RaspiGpio.to_string(), "raspi-gpio");
        assert_eq!(GpioBackend::Simulated.build(Duration::from_secs(1)).name(), "simulated");
        assert_eq!(GpioBackend::Pigs.build(Duration::from_secs(1)).name(), "pigs");
    }
}
