//! Layered configuration for the `cellwatch` binary.
//!
//! Sources, lowest precedence first: built-in defaults, an optional TOML
//! file, `CELLWATCH_*` environment variables and command-line flags.
//! Nested keys use a double underscore in the environment, so
//! `CELLWATCH_WATCHDOG__TIMEOUT=10s` sets `watchdog.timeout`.

use std::path::Path;

use anyhow::{Context, Result};
use cellwatch_core::{
    MonitorConfig, NormalizerConfig, OrderingPolicy, WatchdogConfig, DEFAULT_TOPIC,
};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

const ENV_PREFIX: &str = "CELLWATCH";

pub const DEFAULT_MQTT_URL: &str = "wss://broker.emqx.io:8084/mqtt";
pub const DEFAULT_NATS_URL: &str = "nats://localhost:4222";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Mqtt,
    Nats,
    /// Newline-delimited JSON replayed from a file, `-` for stdin.
    File,
    /// Newline-delimited JSON read from a TCP peer.
    Tcp,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Mqtt => "mqtt",
            TransportKind::Nats => "nats",
            TransportKind::File => "file",
            TransportKind::Tcp => "tcp",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportSettings {
    pub kind: TransportKind,
    /// Broker URL, file path or `host:port`, depending on `kind`.
    pub url: Option<String>,
    pub topic: String,
    pub client_id: Option<String>,
    /// Delay between replayed lines for `file` sources.
    pub pace: Option<String>,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            kind: TransportKind::default(),
            url: None,
            topic: DEFAULT_TOPIC.to_string(),
            client_id: None,
            pace: None,
        }
    }
}

impl TransportSettings {
    /// The configured URL, or the default for brokers. File and TCP
    /// sources have no default.
    pub fn endpoint(&self) -> Option<&str> {
        match (&self.url, self.kind) {
            (Some(url), _) => Some(url.as_str()),
            (None, TransportKind::Mqtt) => Some(DEFAULT_MQTT_URL),
            (None, TransportKind::Nats) => Some(DEFAULT_NATS_URL),
            (None, TransportKind::File | TransportKind::Tcp) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub transport: TransportSettings,
    pub watchdog: WatchdogConfig,
    pub normalizer: NormalizerConfig,
    pub ordering: OrderingPolicy,
}

impl Settings {
    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            watchdog: self.watchdog,
            normalizer: self.normalizer.clone(),
            ordering: self.ordering,
        }
    }
}

/// Load settings from every source. `overrides` are dotted keys set from
/// command-line flags.
pub fn load(path: Option<&Path>, overrides: &[(&str, String)]) -> Result<Settings> {
    load_with_env(path, environment(), overrides)
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

fn load_with_env(
    path: Option<&Path>,
    env: Environment,
    overrides: &[(&str, String)],
) -> Result<Settings> {
    let mut builder = Config::builder();
    if let Some(path) = path {
        builder = builder.add_source(File::from(path));
    }
    builder = builder.add_source(env);
    for (key, value) in overrides {
        builder = builder
            .set_override(*key, value.as_str())
            .with_context(|| format!("invalid override for {key}"))?;
    }

    let settings: Settings = builder
        .build()
        .context("failed to read configuration")?
        .try_deserialize()
        .context("invalid configuration")?;

    settings.monitor_config().validate()?;
    if settings.transport.endpoint().is_none() {
        anyhow::bail!(
            "transport.url is required for {} sources",
            settings.transport.kind.as_str()
        );
    }
    Ok(settings)
}
