//! Monitor configuration.
//!
//! All types deserialize with `serde` so they can be loaded from a TOML file
//! or environment variables by the caller. Durations accept strings such as
//! `"6s"` or `"500ms"`, or a bare integer number of milliseconds.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};

use crate::codes::{CodeField, CodeTables};
use crate::error::ConfigError;
use crate::normalize::Normalizer;

/// Suffix to nanoseconds multiplier (order matters: longer suffixes first)
const UNITS: &[(&str, f64)] = &[
    ("ns", 1.0),
    ("µs", 1_000.0),
    ("us", 1_000.0),
    ("ms", 1_000_000.0),
    ("s", 1_000_000_000.0),
];

/// Parse duration strings like "6s", "500ms", "1.5s", "250us"
pub fn parse_duration(s: &str) -> Result<Duration, ConfigError> {
    let s = s.trim();

    for (suffix, multiplier) in UNITS {
        if let Some(val_str) = s.strip_suffix(suffix) {
            let val: f64 = val_str
                .trim()
                .parse()
                .map_err(|_| ConfigError::Duration(s.to_string()))?;
            if !val.is_finite() || val < 0.0 {
                return Err(ConfigError::Duration(s.to_string()));
            }
            return Ok(Duration::from_nanos((val * multiplier) as u64));
        }
    }

    Err(ConfigError::Duration(s.to_string()))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DurationRepr {
    Millis(u64),
    Text(String),
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    match DurationRepr::deserialize(deserializer)? {
        DurationRepr::Millis(ms) => Ok(Duration::from_millis(ms)),
        DurationRepr::Text(text) => match text.trim().parse::<u64>() {
            Ok(ms) => Ok(Duration::from_millis(ms)),
            Err(_) => parse_duration(&text).map_err(serde::de::Error::custom),
        },
    }
}

fn serialize_duration<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(&format!("{}ms", duration.as_millis()))
}

/// Watchdog timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchdogConfig {
    /// Silence after which the source is declared offline.
    #[serde(
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub timeout: Duration,

    /// How often the silence check runs.
    #[serde(
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub poll_interval: Duration,
}

impl WatchdogConfig {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(6);
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

    pub fn new(timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            timeout,
            poll_interval,
        }
    }

    /// The poll interval must be non-zero and strictly shorter than the timeout.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval.is_zero() || self.poll_interval >= self.timeout {
            return Err(ConfigError::Watchdog {
                poll: self.poll_interval,
                timeout: self.timeout,
            });
        }
        Ok(())
    }
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TIMEOUT, Self::DEFAULT_POLL_INTERVAL)
    }
}

/// Normalizer settings.
///
/// ```toml
/// [normalizer]
/// codes = "rtde"
/// event_capacity = 50
///
/// [normalizer.overrides.machine_state]
/// "5" = "POWER_ON"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
    /// Name of the code table preset.
    pub codes: String,
    /// Per-field code overrides applied on top of the preset.
    pub overrides: BTreeMap<CodeField, BTreeMap<String, String>>,
    /// Maximum number of events kept in the record.
    pub event_capacity: usize,
}

impl NormalizerConfig {
    pub const DEFAULT_EVENT_CAPACITY: usize = 50;

    /// Resolve the preset and apply overrides.
    pub fn code_tables(&self) -> Result<CodeTables, ConfigError> {
        let mut tables = CodeTables::preset(&self.codes)
            .ok_or_else(|| ConfigError::UnknownCodeTable(self.codes.clone()))?;

        for (field, entries) in &self.overrides {
            for (code, label) in entries {
                let code: i64 = code.trim().parse().map_err(|_| ConfigError::InvalidCode {
                    field: *field,
                    code: code.clone(),
                })?;
                tables.table_mut(*field).insert(code, label.clone());
            }
        }

        Ok(tables)
    }

    /// Build a normalizer from these settings.
    pub fn build(&self) -> Result<Normalizer, ConfigError> {
        Ok(Normalizer::new(self.code_tables()?).with_event_capacity(self.event_capacity))
    }
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            codes: CodeTables::RTDE.to_string(),
            overrides: BTreeMap::new(),
            event_capacity: Self::DEFAULT_EVENT_CAPACITY,
        }
    }
}

/// What to do with payloads that arrive out of order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OrderingPolicy {
    /// Apply every payload in arrival order.
    #[default]
    Arrival,
    /// Drop payloads whose `seq` is not greater than the last applied one.
    DropStale,
}

/// Everything the monitor needs apart from the transport.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub watchdog: WatchdogConfig,
    pub normalizer: NormalizerConfig,
    pub ordering: OrderingPolicy,
}

impl MonitorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.watchdog.validate()?;
        self.normalizer.code_tables().map(|_| ())
    }
}
