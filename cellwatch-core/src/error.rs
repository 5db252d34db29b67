//! Error types for the ingest path.

use std::time::Duration;

use thiserror::Error;

use crate::codes::CodeField;

/// Errors reported on the store's error channel.
///
/// None of these abort ingestion: a malformed payload leaves the record
/// untouched and a transport error flips liveness to offline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IngestError {
    /// The payload did not parse as a JSON object.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// The transport reported a connection-level failure.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Connection-level failures reported by a transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Connecting to the broker failed or the connection dropped.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The broker rejected or failed a subscription.
    #[error("subscribe to {topic:?} failed: {reason}")]
    Subscribe { topic: String, reason: String },

    /// The transport has no more events to deliver.
    #[error("connection closed")]
    Closed,
}

/// Invalid monitor configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid duration {0:?}: expected a number with an ns, us, ms or s suffix")]
    Duration(String),

    #[error("watchdog poll interval {poll:?} must be non-zero and shorter than the timeout {timeout:?}")]
    Watchdog { poll: Duration, timeout: Duration },

    #[error("unknown code table {0:?} (available: rtde, dashboard-v1)")]
    UnknownCodeTable(String),

    #[error("invalid code {code:?} in {field} overrides: expected an integer")]
    InvalidCode { field: CodeField, code: String },
}
