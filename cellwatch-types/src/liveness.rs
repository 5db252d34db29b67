//! Data source liveness.

use std::fmt;

use chrono::{DateTime, Utc};

/// Whether the telemetry source is currently delivering messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "UPPERCASE"))]
pub enum LinkStatus {
    Online,
    #[default]
    Offline,
}

impl LinkStatus {
    pub fn is_online(&self) -> bool {
        matches!(self, LinkStatus::Online)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LinkStatus::Online => "ONLINE",
            LinkStatus::Offline => "OFFLINE",
        }
    }
}

impl fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Liveness of the data source as seen by consumers.
///
/// `last_message_at` is wall-clock time for display only; the watchdog that
/// drives `status` runs on a monotonic clock.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Liveness {
    pub status: LinkStatus,
    pub last_message_at: Option<DateTime<Utc>>,
}

impl Liveness {
    pub fn is_online(&self) -> bool {
        self.status.is_online()
    }
}
