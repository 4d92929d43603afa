//! Configuration file support for gpiowatchdogd
//!
//! Loads the watchdog settings and pin policy table from TOML.
//! Default location: /etc/gpio-watchdog/gpiowatchdogd.toml
//!
//! ```toml
//! [watchdog]
//! sampling_interval = "250ms"
//! status_interval = "60s"
//!
//! [[pin]]
//! pin = 4
//! hazardous_level = "low"
//! max_hazard_duration = "2s"
//! correction_level = "high"   # optional, defaults to the opposite level
//! ```
//!
//! A file without `[[pin]]` entries keeps the built-in gate table.

use gpio_watchdog_common::{Level, PinId};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::config::{ResolvedConfig, WatchdogConfig};
use crate::error::{Result, WatchdogError};
use crate::policy::{PinPolicy, PinPolicyTable};

/// One `[[pin]]` entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PinEntry {
    pub pin: PinId,
    pub hazardous_level: Level,
    #[serde(with = "crate::durations::serde_str")]
    pub max_hazard_duration: Duration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correction_level: Option<Level>,
}

impl PinEntry {
    /// Validates the entry into a policy.
    pub fn to_policy(&self) -> Result<PinPolicy> {
        PinPolicy::new(
            self.pin,
            self.hazardous_level,
            self.max_hazard_duration,
            self.correction_level
                .unwrap_or(self.hazardous_level.opposite()),
        )
    }
}

impl From<&PinPolicy> for PinEntry {
    fn from(policy: &PinPolicy) -> Self {
        Self {
            pin: policy.pin(),
            hazardous_level: policy.hazardous_level(),
            max_hazard_duration: policy.max_hazard_duration(),
            correction_level: Some(policy.correction_level()),
        }
    }
}

/// Complete gpiowatchdogd configuration file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    /// Watchdog settings
    #[serde(default)]
    pub watchdog: WatchdogConfig,

    /// Pin policies; empty keeps the built-in table
    #[serde(default, rename = "pin", skip_serializing_if = "Vec::is_empty")]
    pub pins: Vec<PinEntry>,
}

impl ConfigFile {
    /// Parses TOML text.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| WatchdogError::config("config file", e.to_string()))
    }

    /// Load configuration from file, falling back to defaults if file not found
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(content) => Self::from_toml(&content).map_err(|e| match e {
                WatchdogError::Configuration { message, .. } => {
                    WatchdogError::config(path.display().to_string(), message)
                }
                other => other,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "Config file not found, using built-in defaults"
                );
                Ok(Self::default())
            }
            Err(e) => Err(WatchdogError::Io(e)),
        }
    }

    /// Writes the configuration as TOML, e.g. to pin down the settings a
    /// running daemon resolved from defaults, file and flags.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| WatchdogError::config("config file", format!("Failed to serialize config: {e}")))?;
        fs::write(path.as_ref(), content)?;
        Ok(())
    }

    /// Builds the policy table from `[[pin]]` entries, or the built-in
    /// table if there are none.
    pub fn policy_table(&self) -> Result<PinPolicyTable> {
        if self.pins.is_empty() {
            return Ok(PinPolicyTable::defaults());
        }
        let policies = self
            .pins
            .iter()
            .map(PinEntry::to_policy)
            .collect::<Result<Vec<_>>>()?;
        PinPolicyTable::new(policies)
    }
}

impl From<&ResolvedConfig> for ConfigFile {
    fn from(resolved: &ResolvedConfig) -> Self {
        Self {
            watchdog: resolved.watchdog.clone(),
            pins: resolved.policies.iter().map(PinEntry::from).collect(),
        }
    }
}
