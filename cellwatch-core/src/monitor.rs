//! The monitor event loop.

use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::codes::CodeTables;
use crate::config::{MonitorConfig, OrderingPolicy, WatchdogConfig};
use crate::error::{ConfigError, IngestError, TransportError};
use crate::normalize::Normalizer;
use crate::store::{StoreReader, TelemetryStore};
use crate::transport::{Transport, TransportEvent};

/// Default topic the dashboard publisher uses.
pub const DEFAULT_TOPIC: &str = "salesianos/robot/iban/principal";

/// Ties a transport to a telemetry store.
///
/// The monitor task is the only writer of the store: transport events and
/// watchdog ticks are funnelled through a single `select!` loop, so every
/// update is applied atomically and in arrival order.
///
/// # Example
///
/// ```
/// use cellwatch_core::{ChannelTransport, Monitor};
///
/// # tokio_test::block_on(async {
/// let (feed, transport) = ChannelTransport::create("memory");
/// let handle = Monitor::builder()
///     .topic("cell/robot")
///     .build()
///     .unwrap()
///     .start(transport);
///
/// feed.connect().await;
/// feed.payload(br#"{"ctrl_temp": 38.5}"#.to_vec()).await;
///
/// let mut reader = handle.reader();
/// let snapshot = reader.wait_for(|s| s.liveness.is_online()).await.unwrap();
/// assert_eq!(snapshot.telemetry.system.controller_temp, Some(38.5));
/// handle.stop().await;
/// # });
/// ```
#[derive(Debug)]
pub struct Monitor {
    store: TelemetryStore,
    topic: String,
    poll_interval: Duration,
}

impl Monitor {
    pub fn builder() -> MonitorBuilder {
        MonitorBuilder::new()
    }

    /// A monitor with the given configuration.
    pub fn new(config: &MonitorConfig, topic: &str) -> Result<Self, ConfigError> {
        Self::builder().config(config.clone()).topic(topic).build()
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// A reader for the store, available before the monitor is started.
    pub fn reader(&self) -> StoreReader {
        self.store.reader()
    }

    /// Spawn the event loop on the current tokio runtime.
    ///
    /// The loop subscribes to the topic every time the transport reports
    /// `Connected`, and runs until the handle is stopped or dropped, or the
    /// transport is exhausted. The transport is always disconnected on exit.
    pub fn start<T>(mut self, transport: T) -> MonitorHandle
    where
        T: Transport + 'static,
    {
        let (stop_tx, stop_rx) = watch::channel(false);
        let reader = self.store.reader();
        let errors = self.store.take_errors();

        let task = tokio::spawn(run(
            self.store,
            transport,
            self.topic,
            self.poll_interval,
            stop_rx,
        ));

        MonitorHandle {
            reader,
            errors,
            stop_tx,
            task,
        }
    }
}

async fn run<T: Transport>(
    mut store: TelemetryStore,
    mut transport: T,
    topic: String,
    poll_interval: Duration,
    mut stop_rx: watch::Receiver<bool>,
) {
    info!(source = transport.description(), %topic, "monitor started");

    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    debug!("stop requested");
                    break;
                }
            }
            event = transport.next_event() => match event {
                Some(TransportEvent::Connected) => {
                    info!(source = transport.description(), "transport connected");
                    match transport.subscribe(&topic).await {
                        Ok(()) => info!(%topic, "subscribed"),
                        Err(error) => {
                            store.transport_error(error);
                        }
                    }
                }
                Some(TransportEvent::Message(payload)) => {
                    // Rejections are reported through the store's error channel.
                    let _ = store.ingest(&payload, Instant::now().into_std(), Utc::now());
                }
                Some(TransportEvent::Error(error)) => {
                    store.transport_error(error);
                }
                Some(TransportEvent::Closed) => {
                    store.transport_error(TransportError::Closed);
                    debug!("transport closed");
                    break;
                }
                None => {
                    if store.liveness().is_online() {
                        store.transport_error(TransportError::Closed);
                    }
                    debug!("transport exhausted");
                    break;
                }
            },
            _ = ticker.tick() => {
                store.tick(Instant::now().into_std());
            }
        }
    }

    if let Err(error) = transport.disconnect().await {
        warn!(%error, "disconnect failed");
    }
    info!(source = transport.description(), "monitor stopped");
    store.dispose();
}

/// Builder for a [`Monitor`].
#[derive(Debug, Default)]
pub struct MonitorBuilder {
    config: MonitorConfig,
    tables: Option<CodeTables>,
    topic: Option<String>,
}

impl MonitorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a full configuration. Later builder calls override it.
    pub fn config(mut self, config: MonitorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    /// Silence after which the source is declared offline (default 6s).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.watchdog.timeout = timeout;
        self
    }

    /// How often the watchdog checks for silence (default 1s).
    pub fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.config.watchdog.poll_interval = poll_interval;
        self
    }

    /// Use these tables instead of the configured preset and overrides.
    pub fn code_tables(mut self, tables: CodeTables) -> Self {
        self.tables = Some(tables);
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.config.normalizer.event_capacity = capacity;
        self
    }

    pub fn ordering(mut self, ordering: OrderingPolicy) -> Self {
        self.config.ordering = ordering;
        self
    }

    /// Validate the configuration and create the store.
    pub fn build(self) -> Result<Monitor, ConfigError> {
        let watchdog: WatchdogConfig = self.config.watchdog;
        watchdog.validate()?;

        let normalizer = match self.tables {
            Some(tables) => {
                Normalizer::new(tables).with_event_capacity(self.config.normalizer.event_capacity)
            }
            None => self.config.normalizer.build()?,
        };

        Ok(Monitor {
            store: TelemetryStore::new(normalizer, watchdog, self.config.ordering),
            topic: self.topic.unwrap_or_else(|| DEFAULT_TOPIC.to_string()),
            poll_interval: watchdog.poll_interval,
        })
    }
}

/// Handle to a running monitor.
///
/// Dropping the handle stops the monitor.
#[derive(Debug)]
pub struct MonitorHandle {
    reader: StoreReader,
    errors: Option<mpsc::Receiver<IngestError>>,
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    pub fn reader(&self) -> StoreReader {
        self.reader.clone()
    }

    /// The error channel. Can only be taken once.
    pub fn take_errors(&mut self) -> Option<mpsc::Receiver<IngestError>> {
        self.errors.take()
    }

    /// Whether the event loop has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the event loop and wait for the transport to be disconnected.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        if let Err(error) = self.task.await {
            warn!(%error, "monitor task failed");
        }
    }

    /// Wait for the event loop to exit on its own (transport exhausted).
    pub async fn join(self) {
        let MonitorHandle { stop_tx, task, .. } = self;
        if let Err(error) = task.await {
            warn!(%error, "monitor task failed");
        }
        drop(stop_tx);
    }
}
