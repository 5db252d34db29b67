use std::path::PathBuf;

use anyhow::{Context, Result};
use cellwatch_adapters::StreamTransport;
use cellwatch_core::{parse_duration, Monitor, Transport};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod export;
mod settings;

use settings::{TransportKind, TransportSettings};

#[derive(Parser, Debug)]
#[command(name = "cellwatch")]
#[command(about = "Connectivity watchdog and telemetry normalizer for UR robot cells")]
#[command(version)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Subscribe through an MQTT broker (mqtt://host:port)
    #[arg(short, long, conflicts_with_all = ["nats", "file", "connect"])]
    broker: Option<String>,

    /// Subscribe through a NATS server (nats://host:port)
    #[arg(long, conflicts_with_all = ["broker", "file", "connect"])]
    nats: Option<String>,

    /// Replay newline-delimited JSON from a file ("-" reads stdin)
    #[arg(short, long, conflicts_with_all = ["broker", "nats", "connect"])]
    file: Option<PathBuf>,

    /// Read newline-delimited JSON from a TCP peer (host:port)
    #[arg(long, conflicts_with_all = ["broker", "nats", "file"])]
    connect: Option<String>,

    /// Topic or subject carrying the telemetry
    #[arg(short, long)]
    topic: Option<String>,

    /// Silence after which the robot is reported offline (e.g. "6s")
    #[arg(long)]
    timeout: Option<String>,

    /// How often the silence check runs (e.g. "1s", "500ms")
    #[arg(long)]
    poll: Option<String>,

    /// Numeric code table preset ("rtde" or "dashboard-v1")
    #[arg(long)]
    codes: Option<String>,

    /// Delay between lines when replaying a file
    #[arg(long, requires = "file")]
    pace: Option<String>,

    /// Drop payloads whose sequence number does not advance
    #[arg(long)]
    drop_stale: bool,

    /// Print every published snapshot as a JSON line on stdout
    #[arg(short, long)]
    print: bool,

    /// Write the final snapshot to this JSON file on exit
    #[arg(short, long)]
    export: Option<PathBuf>,
}

impl Args {
    /// Dotted configuration keys set by flags.
    fn overrides(&self) -> Vec<(&'static str, String)> {
        let mut overrides = Vec::new();

        let source = if let Some(url) = &self.broker {
            Some((TransportKind::Mqtt, url.clone()))
        } else if let Some(url) = &self.nats {
            Some((TransportKind::Nats, url.clone()))
        } else if let Some(path) = &self.file {
            Some((TransportKind::File, path.display().to_string()))
        } else {
            self.connect.clone().map(|addr| (TransportKind::Tcp, addr))
        };
        if let Some((kind, url)) = source {
            overrides.push(("transport.kind", kind.as_str().to_string()));
            overrides.push(("transport.url", url));
        }

        let optional = [
            ("transport.topic", &self.topic),
            ("transport.pace", &self.pace),
            ("watchdog.timeout", &self.timeout),
            ("watchdog.poll_interval", &self.poll),
            ("normalizer.codes", &self.codes),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                overrides.push((key, value.clone()));
            }
        }

        if self.drop_stale {
            overrides.push(("ordering", "drop-stale".to_string()));
        }
        overrides
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing();

    let settings = settings::load(args.config.as_deref(), &args.overrides())?;
    let monitor = Monitor::new(&settings.monitor_config(), &settings.transport.topic)
        .context("invalid monitor configuration")?;
    let transport = connect(&settings.transport).await?;
    let source = transport.description().to_string();
    info!(
        source = %source,
        topic = monitor.topic(),
        codes = %settings.normalizer.codes,
        "starting monitor"
    );

    let handle = monitor.start(transport);
    let mut reader = handle.reader();
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = &mut shutdown => {
                if let Err(e) = result {
                    warn!(error = %e, "failed to listen for ctrl-c");
                }
                info!("shutting down");
                break;
            }
            changed = reader.changed() => {
                if !changed {
                    info!("transport finished");
                    break;
                }
                if args.print {
                    export::print_line(&reader.snapshot())?;
                }
            }
        }
    }

    handle.stop().await;

    if let Some(path) = &args.export {
        export::write_snapshot(path, &reader.snapshot(), &source)?;
        info!(path = %path.display(), "exported final snapshot");
    }
    Ok(())
}

/// Install the global subscriber. Logs go to stderr so `--print` output on
/// stdout stays machine-readable.
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn connect(settings: &TransportSettings) -> Result<Box<dyn Transport>> {
    let endpoint = settings
        .endpoint()
        .context("no transport url configured")?;

    let transport: Box<dyn Transport> = match settings.kind {
        TransportKind::Mqtt => connect_mqtt(endpoint, settings.client_id.as_deref())?,
        TransportKind::Nats => connect_nats(endpoint, settings.client_id.as_deref()).await?,
        TransportKind::File if endpoint == "-" => Box::new(StreamTransport::stdin()),
        TransportKind::File => {
            let pace = settings.pace.as_deref().map(parse_duration).transpose()?;
            let transport = StreamTransport::open_file(endpoint, pace)
                .await
                .with_context(|| format!("failed to open {endpoint}"))?;
            Box::new(transport)
        }
        TransportKind::Tcp => {
            let transport = StreamTransport::connect_tcp(endpoint)
                .await
                .with_context(|| format!("failed to connect to {endpoint}"))?;
            Box::new(transport)
        }
    };
    Ok(transport)
}

#[cfg(feature = "mqtt")]
fn connect_mqtt(url: &str, client_id: Option<&str>) -> Result<Box<dyn Transport>> {
    let mut builder = cellwatch_adapters::MqttTransport::builder().url(url);
    if let Some(id) = client_id {
        builder = builder.client_id(id);
    }
    Ok(Box::new(builder.build()?))
}

#[cfg(not(feature = "mqtt"))]
fn connect_mqtt(_url: &str, _client_id: Option<&str>) -> Result<Box<dyn Transport>> {
    anyhow::bail!("cellwatch was built without the `mqtt` feature")
}

#[cfg(feature = "nats")]
async fn connect_nats(url: &str, name: Option<&str>) -> Result<Box<dyn Transport>> {
    let mut builder = cellwatch_adapters::NatsTransport::builder().url(url);
    if let Some(name) = name {
        builder = builder.name(name);
    }
    Ok(Box::new(builder.build().await?))
}

#[cfg(not(feature = "nats"))]
async fn connect_nats(_url: &str, _name: Option<&str>) -> Result<Box<dyn Transport>> {
    anyhow::bail!("cellwatch was built without the `nats` feature")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("cellwatch").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_no_flags_no_overrides() {
        assert!(parse(&[]).overrides().is_empty());
    }

    #[test]
    fn test_broker_flag_sets_kind_and_url() {
        let overrides = parse(&["--broker", "mqtt://10.0.0.5:1883", "--timeout", "4s"]).overrides();

        assert!(overrides.contains(&("transport.kind", "mqtt".to_string())));
        assert!(overrides.contains(&("transport.url", "mqtt://10.0.0.5:1883".to_string())));
        assert!(overrides.contains(&("watchdog.timeout", "4s".to_string())));
    }

    #[test]
    fn test_file_replay_flags() {
        let overrides =
            parse(&["--file", "shift.jsonl", "--pace", "20ms", "--drop-stale"]).overrides();

        assert!(overrides.contains(&("transport.kind", "file".to_string())));
        assert!(overrides.contains(&("transport.url", "shift.jsonl".to_string())));
        assert!(overrides.contains(&("transport.pace", "20ms".to_string())));
        assert!(overrides.contains(&("ordering", "drop-stale".to_string())));
    }

    #[test]
    fn test_sources_conflict() {
        let result = Args::try_parse_from([
            "cellwatch",
            "--broker",
            "mqtt://localhost",
            "--connect",
            "localhost:9000",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_pace_requires_file() {
        assert!(Args::try_parse_from(["cellwatch", "--pace", "10ms"]).is_err());
    }

    #[tokio::test]
    async fn test_connect_replays_file() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{{\"robot_mode\": 7}}").unwrap();

        let settings = TransportSettings {
            kind: TransportKind::File,
            url: Some(file.path().display().to_string()),
            ..TransportSettings::default()
        };
        let transport = connect(&settings).await.unwrap();
        let handle = Monitor::builder().build().unwrap().start(transport);

        let mut reader = handle.reader();
        let snapshot = reader.wait_for(|s| s.stats.applied == 1).await;
        assert!(snapshot.is_some());
        handle.join().await;
    }

    #[tokio::test]
    async fn test_connect_missing_file_fails() {
        let settings = TransportSettings {
            kind: TransportKind::File,
            url: Some("/nonexistent/cellwatch.jsonl".to_string()),
            ..TransportSettings::default()
        };
        assert!(connect(&settings).await.is_err());
    }
}
