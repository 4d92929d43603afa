//! Human-readable durations for flags and the config file.
//!
//! Accepted forms: `500ms`, `2s`, `1.5s`, `1m`, or a bare number of
//! seconds (`2`, `0.25`).

use serde::{Deserialize, Deserializer, Serializer};
use std::time::Duration;

/// Parses a duration such as `500ms`, `2.5s` or `1m`.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    let (number, scale) = if let Some(n) = s.strip_suffix("ms") {
        (n, 0.001)
    } else if let Some(n) = s.strip_suffix('s') {
        (n, 1.0)
    } else if let Some(n) = s.strip_suffix('m') {
        (n, 60.0)
    } else {
        (s, 1.0)
    };

    let value: f64 = number
        .trim()
        .parse()
        .map_err(|_| format!("invalid duration '{input}' (expected e.g. 500ms, 2s, 1.5s, 1m)"))?;
    secs_to_duration(value * scale).map_err(|e| format!("invalid duration '{input}': {e}"))
}

fn secs_to_duration(secs: f64) -> Result<Duration, String> {
    if !secs.is_finite() || secs < 0.0 {
        return Err("must be a finite, non-negative value".to_string());
    }
    Duration::try_from_secs_f64(secs).map_err(|e| e.to_string())
}

/// Formats a duration the way [`parse_duration`] reads it back.
pub fn format_duration(d: Duration) -> String {
    let millis = d.as_millis();
    if millis % 1000 == 0 {
        format!("{}s", millis / 1000)
    } else {
        format!("{millis}ms")
    }
}

/// Formats a duration as seconds with one decimal, for status lines.
pub fn format_secs(d: Duration) -> String {
    format!("{:.1}s", d.as_secs_f64())
}

/// Serde adapter: durations as strings, or numbers of seconds.
pub mod serde_str {
    use super::*;

    /// Serializes as e.g. `"500ms"`.
    pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_duration(*d))
    }

    /// Deserializes from `"2s"`-style strings or plain seconds.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Secs(f64),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Text(s) => parse_duration(&s).map_err(serde::de::Error::custom),
            Raw::Secs(secs) => secs_to_duration(secs).map_err(serde::de::Error::custom),
        }
    }
}
