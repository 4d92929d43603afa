//! Pin policy table
//!
//! Each monitored pin has exactly one immutable policy: the raw level that
//! is hazardous for the attached hardware, how long the pin may dwell at
//! that level, and the level the watchdog forces when the bound is hit.

use gpio_watchdog_common::{Level, PinId};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::durations::{format_duration, parse_duration};
use crate::error::{Result, WatchdogError};

/// Hazard policy for one pin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinPolicy {
    pin: PinId,
    hazardous_level: Level,
    max_hazard_duration: Duration,
    correction_level: Level,
}

impl PinPolicy {
    /// Creates a policy, rejecting a correction level equal to the
    /// hazardous level and a zero dwell bound.
    pub fn new(
        pin: PinId,
        hazardous_level: Level,
        max_hazard_duration: Duration,
        correction_level: Level,
    ) -> Result<Self> {
        if !pin.is_valid() {
            return Err(WatchdogError::config(
                pin.to_string(),
                "pin number out of range (0-53)",
            ));
        }
        if correction_level == hazardous_level {
            return Err(WatchdogError::config(
                pin.to_string(),
                format!(
                    "correction level must differ from hazardous level ({})",
                    hazardous_level.as_str()
                ),
            ));
        }
        if max_hazard_duration.is_zero() {
            return Err(WatchdogError::config(
                pin.to_string(),
                "max hazard duration must be greater than zero",
            ));
        }
        Ok(Self {
            pin,
            hazardous_level,
            max_hazard_duration,
            correction_level,
        })
    }

    /// Policy whose correction is the opposite of the hazardous level.
    pub fn opposite(pin: PinId, hazardous_level: Level, max_hazard_duration: Duration) -> Result<Self> {
        Self::new(
            pin,
            hazardous_level,
            max_hazard_duration,
            hazardous_level.opposite(),
        )
    }

    pub fn pin(&self) -> PinId {
        self.pin
    }

    pub fn hazardous_level(&self) -> Level {
        self.hazardous_level
    }

    pub fn max_hazard_duration(&self) -> Duration {
        self.max_hazard_duration
    }

    pub fn correction_level(&self) -> Level {
        self.correction_level
    }

    /// Returns true if `level` is this pin's hazardous level.
    pub fn is_hazardous(&self, level: Level) -> bool {
        level == self.hazardous_level
    }
}

impl fmt::Display for PinPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: hazardous={} max={} correct={}",
            self.pin,
            self.hazardous_level.as_str(),
            format_duration(self.max_hazard_duration),
            self.correction_level.as_str()
        )
    }
}

/// Production rules of the garage gate controller. All relay outputs are
/// active-low, so a pin held low keeps a coil or lock solenoid energized.
pub const DEFAULT_RULES: [(u8, u64); 4] = [
    // Gate motor relay A
    (2, 25_000),
    // Gate motor relay B
    (3, 20_000),
    // Lock solenoid
    (4, 2_000),
    // Impulse relay
    (10, 4_000),
];

/// Validated set of pin policies, one per pin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinPolicyTable {
    policies: Vec<PinPolicy>,
}

impl PinPolicyTable {
    /// Builds a table, rejecting an empty set and duplicate pins.
    pub fn new(policies: Vec<PinPolicy>) -> Result<Self> {
        if policies.is_empty() {
            return Err(WatchdogError::config("pins", "at least one pin must be monitored"));
        }
        let mut seen = HashSet::new();
        for policy in &policies {
            if !seen.insert(policy.pin()) {
                return Err(WatchdogError::config(
                    policy.pin().to_string(),
                    "duplicate policy for pin",
                ));
            }
        }
        Ok(Self { policies })
    }

    /// The gate controller's default table: GPIO2, GPIO3, GPIO4 and GPIO10,
    /// hazardous when low, corrected to high.
    pub fn defaults() -> Self {
        let policies = DEFAULT_RULES
            .iter()
            .map(|&(bcm, max_ms)| PinPolicy {
                pin: PinId::new(bcm),
                hazardous_level: Level::Low,
                max_hazard_duration: Duration::from_millis(max_ms),
                correction_level: Level::High,
            })
            .collect();
        Self { policies }
    }

    /// Applies overrides in order and re-validates the result.
    pub fn with_overrides(self, overrides: &[PolicyOverride]) -> Result<Self> {
        let mut policies = self.policies;
        for ov in overrides {
            match policies.iter_mut().find(|p| p.pin() == ov.pin) {
                Some(existing) => *existing = ov.apply_to(existing)?,
                None => policies.push(ov.to_policy()?),
            }
        }
        Self::new(policies)
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PinPolicy> {
        self.policies.iter()
    }

    /// Looks up the policy for `pin`.
    pub fn get(&self, pin: PinId) -> Option<&PinPolicy> {
        self.policies.iter().find(|p| p.pin() == pin)
    }

    /// Monitored pins in table order.
    pub fn pins(&self) -> Vec<PinId> {
        self.policies.iter().map(PinPolicy::pin).collect()
    }
}

impl IntoIterator for PinPolicyTable {
    type Item = PinPolicy;
    type IntoIter = std::vec::IntoIter<PinPolicy>;

    fn into_iter(self) -> Self::IntoIter {
        self.policies.into_iter()
    }
}

/// Partial policy for one pin, as given on the command line:
/// `PIN=FIELD:VALUE[,FIELD:VALUE...]` with fields `hazard`, `max` and
/// `correct`, e.g. `4=max:1500ms` or `17=hazard:high,max:3s`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyOverride {
    pub pin: PinId,
    pub hazardous_level: Option<Level>,
    pub max_hazard_duration: Option<Duration>,
    pub correction_level: Option<Level>,
}

impl PolicyOverride {
    /// Merges this override into an existing policy. A new hazardous level
    /// without an explicit correction implies the opposite correction.
    pub fn apply_to(&self, base: &PinPolicy) -> Result<PinPolicy> {
        let hazardous_level = self.hazardous_level.unwrap_or(base.hazardous_level());
        let correction_level = match (self.correction_level, self.hazardous_level) {
            (Some(level), _) => level,
            (None, Some(hazard)) => hazard.opposite(),
            (None, None) => base.correction_level(),
        };
        PinPolicy::new(
            self.pin,
            hazardous_level,
            self.max_hazard_duration.unwrap_or(base.max_hazard_duration()),
            correction_level,
        )
    }

    /// Builds a policy for a pin absent from the table; `hazard` and `max`
    /// are required.
    pub fn to_policy(&self) -> Result<PinPolicy> {
        let hazardous_level = self.hazardous_level.ok_or_else(|| {
            WatchdogError::config(self.pin.to_string(), "new pin requires 'hazard'")
        })?;
        let max = self.max_hazard_duration.ok_or_else(|| {
            WatchdogError::config(self.pin.to_string(), "new pin requires 'max'")
        })?;
        PinPolicy::new(
            self.pin,
            hazardous_level,
            max,
            self.correction_level.unwrap_or(hazardous_level.opposite()),
        )
    }
}

impl FromStr for PolicyOverride {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (pin, fields) = s
            .split_once('=')
            .ok_or_else(|| format!("invalid pin override '{s}' (expected PIN=FIELD:VALUE,...)"))?;
        let mut ov = PolicyOverride {
            pin: pin.parse()?,
            hazardous_level: None,
            max_hazard_duration: None,
            correction_level: None,
        };

        for field in fields.split(',').map(str::trim).filter(|f| !f.is_empty()) {
            let (key, value) = field
                .split_once(':')
                .ok_or_else(|| format!("invalid field '{field}' in '{s}' (expected FIELD:VALUE)"))?;
            match key.trim() {
                "hazard" => ov.hazardous_level = Some(value.parse()?),
                "max" => ov.max_hazard_duration = Some(parse_duration(value)?),
                "correct" => ov.correction_level = Some(value.parse()?),
                other => {
                    return Err(format!(
                        "unknown field '{other}' in '{s}' (expected hazard, max or correct)"
                    ))
                }
            }
        }

        if ov.hazardous_level.is_none()
            && ov.max_hazard_duration.is_none()
            && ov.correction_level.is_none()
        {
            return Err(format!("pin override '{s}' sets no fields"));
        }
        Ok(ov)
    }
}
