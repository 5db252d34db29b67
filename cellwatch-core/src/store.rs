//! Telemetry store.
//!
//! Owns the canonical record, the watchdog and the ingest counters. There is
//! exactly one writer (the monitor task, or whoever owns the store); readers
//! get a [`StoreReader`] backed by a `watch` channel and never see a
//! half-applied update.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use cellwatch_types::{CanonicalTelemetry, Field, IngestStats, LinkStatus, Liveness, TelemetrySnapshot};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::config::{MonitorConfig, OrderingPolicy, WatchdogConfig};
use crate::error::{ConfigError, IngestError, TransportError};
use crate::normalize::Normalizer;
use crate::signals::{changed_fields, heartbeat};
use crate::watchdog::{Transition, Watchdog};

const ERROR_CHANNEL_CAPACITY: usize = 32;

/// Outcome of a successfully decoded payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ingested {
    /// Merged into the record.
    Applied,
    /// Dropped by the `drop-stale` ordering policy.
    Stale,
}

/// Shared slot holding the most recent error.
type LastError = Arc<Mutex<Option<IngestError>>>;

/// The single-writer telemetry store.
#[derive(Debug)]
pub struct TelemetryStore {
    normalizer: Normalizer,
    watchdog: Watchdog,
    ordering: OrderingPolicy,
    record: CanonicalTelemetry,
    liveness: Liveness,
    stats: IngestStats,
    last_sequence: Option<u64>,
    publisher: watch::Sender<TelemetrySnapshot>,
    errors: mpsc::Sender<IngestError>,
    error_receiver: Option<mpsc::Receiver<IngestError>>,
    last_error: LastError,
}

impl TelemetryStore {
    /// Create a store from validated configuration.
    pub fn init(config: &MonitorConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let normalizer = config.normalizer.build()?;
        Ok(Self::new(normalizer, config.watchdog, config.ordering))
    }

    /// Create a store from already-built parts. The record starts all-unknown
    /// and liveness starts OFFLINE.
    pub fn new(normalizer: Normalizer, watchdog: WatchdogConfig, ordering: OrderingPolicy) -> Self {
        let (publisher, _) = watch::channel(TelemetrySnapshot::default());
        let (errors, error_receiver) = mpsc::channel(ERROR_CHANNEL_CAPACITY);
        Self {
            normalizer,
            watchdog: Watchdog::new(watchdog),
            ordering,
            record: CanonicalTelemetry::new(),
            liveness: Liveness::default(),
            stats: IngestStats::default(),
            last_sequence: None,
            publisher,
            errors,
            error_receiver: Some(error_receiver),
            last_error: Arc::new(Mutex::new(None)),
        }
    }

    /// A read-only handle. Any number may be created.
    pub fn reader(&self) -> StoreReader {
        StoreReader {
            receiver: self.publisher.subscribe(),
            last_error: self.last_error.clone(),
        }
    }

    /// The error channel receiver. Can only be taken once.
    ///
    /// Errors are sent best effort: when nobody drains the channel, new
    /// errors are dropped once it is full. [`StoreReader::last_error`] always
    /// holds the latest one.
    pub fn take_errors(&mut self) -> Option<mpsc::Receiver<IngestError>> {
        self.error_receiver.take()
    }

    pub fn telemetry(&self) -> &CanonicalTelemetry {
        &self.record
    }

    pub fn liveness(&self) -> &Liveness {
        &self.liveness
    }

    pub fn stats(&self) -> IngestStats {
        self.stats
    }

    /// Decode and apply one raw payload.
    ///
    /// `now` drives the watchdog; `received_at` is the wall-clock arrival
    /// time used for display and as the fallback record timestamp.
    ///
    /// A payload that is not a JSON object leaves the record and liveness
    /// untouched and is reported on the error channel.
    pub fn ingest(
        &mut self,
        payload: &[u8],
        now: Instant,
        received_at: DateTime<Utc>,
    ) -> Result<Ingested, IngestError> {
        self.stats.received += 1;

        let raw: Value = match serde_json::from_slice(payload) {
            Ok(raw) => raw,
            Err(e) => return Err(self.reject(e.to_string())),
        };
        if !raw.is_object() {
            return Err(self.reject(format!("expected a JSON object, got {}", kind(&raw))));
        }

        let sequence = sequence(&raw);
        if self.ordering == OrderingPolicy::DropStale {
            if let (Some(seq), Some(last)) = (sequence, self.last_sequence) {
                if seq <= last {
                    self.stats.stale += 1;
                    debug!(seq, last, "dropping stale payload");
                    let transition = self.mark_alive(now, received_at);
                    self.publish_or_update(transition.is_some());
                    return Ok(Ingested::Stale);
                }
            }
        }

        let next = self.normalizer.normalize_at(&raw, &self.record, received_at);
        let changed = changed_fields(&self.record, &next);
        let heartbeat = heartbeat(&self.record, &next);
        self.record = next;
        if let Some(seq) = sequence {
            self.last_sequence = Some(self.last_sequence.map_or(seq, |last| last.max(seq)));
        }
        self.stats.applied += 1;
        self.mark_alive(now, received_at);

        debug!(changed = changed.len(), heartbeat, "payload applied");
        self.publish(changed, heartbeat);
        Ok(Ingested::Applied)
    }

    /// Watchdog silence check.
    pub fn tick(&mut self, now: Instant) -> Option<Transition> {
        let transition = self.watchdog.tick(now)?;
        self.liveness.status = transition.to;
        self.publish(BTreeSet::new(), false);
        Some(transition)
    }

    /// Record a connection-level failure: reported, and liveness goes OFFLINE
    /// immediately.
    pub fn transport_error(&mut self, error: TransportError) -> Option<Transition> {
        self.stats.transport_errors += 1;
        warn!(%error, "transport error");
        self.report(IngestError::Transport(error));

        let transition = self.watchdog.on_transport_error();
        if let Some(transition) = transition {
            self.liveness.status = transition.to;
        }
        self.publish_or_update(transition.is_some());
        transition
    }

    /// Back to the initial state: all-unknown record, OFFLINE, zeroed counters.
    pub fn reset(&mut self) {
        self.watchdog.reset();
        self.record = CanonicalTelemetry::new();
        self.liveness = Liveness::default();
        self.stats = IngestStats::default();
        self.last_sequence = None;
        *self.last_error.lock() = None;
        info!("store reset");
        self.publish(BTreeSet::new(), false);
    }

    /// Release the store. Readers keep the last snapshot and their
    /// `changed()` returns false from now on.
    pub fn dispose(self) {
        info!(
            received = self.stats.received,
            applied = self.stats.applied,
            "store disposed"
        );
    }

    fn mark_alive(&mut self, now: Instant, received_at: DateTime<Utc>) -> Option<Transition> {
        let transition = self.watchdog.on_message(now);
        self.liveness = Liveness {
            status: LinkStatus::Online,
            last_message_at: Some(received_at),
        };
        transition
    }

    fn reject(&mut self, reason: String) -> IngestError {
        self.stats.malformed += 1;
        warn!(%reason, "malformed payload");
        let error = IngestError::MalformedPayload(reason);
        self.report(error.clone());
        self.publish_or_update(false);
        error
    }

    fn report(&self, error: IngestError) {
        *self.last_error.lock() = Some(error.clone());
        if self.errors.try_send(error).is_err() {
            debug!("error channel full or closed, dropping error");
        }
    }

    fn publish(&self, changed: BTreeSet<Field>, heartbeat: bool) {
        self.publisher.send_replace(TelemetrySnapshot {
            telemetry: self.record.clone(),
            liveness: self.liveness.clone(),
            changed,
            heartbeat,
            stats: self.stats,
        });
    }

    /// Publish when liveness moved, otherwise refresh the counters without
    /// waking readers.
    fn publish_or_update(&self, notify: bool) {
        if notify {
            self.publish(BTreeSet::new(), false);
        } else {
            let stats = self.stats;
            self.publisher.send_if_modified(|snapshot| {
                snapshot.stats = stats;
                false
            });
        }
    }
}

fn sequence(raw: &Value) -> Option<u64> {
    ["seq", "sequence"]
        .iter()
        .find_map(|key| raw.get(key).and_then(Value::as_u64))
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Read-only view of a [`TelemetryStore`].
#[derive(Debug, Clone)]
pub struct StoreReader {
    receiver: watch::Receiver<TelemetrySnapshot>,
    last_error: LastError,
}

impl StoreReader {
    /// The latest published snapshot.
    pub fn snapshot(&self) -> TelemetrySnapshot {
        self.receiver.borrow().clone()
    }

    pub fn telemetry(&self) -> CanonicalTelemetry {
        self.receiver.borrow().telemetry.clone()
    }

    pub fn liveness(&self) -> Liveness {
        self.receiver.borrow().liveness.clone()
    }

    pub fn status(&self) -> LinkStatus {
        self.receiver.borrow().liveness.status
    }

    /// Wait for the next published snapshot. Returns false once the store
    /// has been disposed.
    pub async fn changed(&mut self) -> bool {
        self.receiver.changed().await.is_ok()
    }

    /// Wait until a snapshot satisfies `predicate`, checking the current one
    /// first. Returns `None` if the store is disposed before that happens.
    pub async fn wait_for(
        &mut self,
        predicate: impl FnMut(&TelemetrySnapshot) -> bool,
    ) -> Option<TelemetrySnapshot> {
        self.receiver
            .wait_for(predicate)
            .await
            .ok()
            .map(|snapshot| snapshot.clone())
    }

    /// The most recent malformed-payload or transport error.
    pub fn last_error(&self) -> Option<IngestError> {
        self.last_error.lock().clone()
    }
}
