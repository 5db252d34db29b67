//! Connectivity watchdog.
//!
//! Tracks whether the telemetry source is alive from message arrival times on
//! a monotonic clock. The caller supplies `now` on every call so the state
//! machine stays free of timers and can be driven deterministically.

use std::fmt;
use std::time::{Duration, Instant};

use cellwatch_types::LinkStatus;
use tracing::info;

use crate::config::WatchdogConfig;

/// Why liveness changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionReason {
    /// A message arrived.
    Message,
    /// No message for the given time.
    Silence(Duration),
    /// The transport reported an error.
    TransportError,
    /// The watchdog was reset.
    Reset,
}

impl fmt::Display for TransitionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransitionReason::Message => f.write_str("message received"),
            TransitionReason::Silence(elapsed) => write!(f, "silent for {elapsed:?}"),
            TransitionReason::TransportError => f.write_str("transport error"),
            TransitionReason::Reset => f.write_str("reset"),
        }
    }
}

/// A liveness flip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: LinkStatus,
    pub to: LinkStatus,
    pub reason: TransitionReason,
}

/// ONLINE/OFFLINE state machine.
#[derive(Debug, Clone)]
pub struct Watchdog {
    config: WatchdogConfig,
    status: LinkStatus,
    last_message_at: Option<Instant>,
}

impl Watchdog {
    /// Starts OFFLINE with no message seen.
    pub fn new(config: WatchdogConfig) -> Self {
        Self {
            config,
            status: LinkStatus::Offline,
            last_message_at: None,
        }
    }

    pub fn config(&self) -> &WatchdogConfig {
        &self.config
    }

    pub fn status(&self) -> LinkStatus {
        self.status
    }

    pub fn last_message_at(&self) -> Option<Instant> {
        self.last_message_at
    }

    /// Record a message arrival.
    pub fn on_message(&mut self, now: Instant) -> Option<Transition> {
        self.last_message_at = Some(now);
        self.set(LinkStatus::Online, TransitionReason::Message)
    }

    /// Silence check. Flips to OFFLINE once `timeout` has elapsed since the
    /// last message.
    pub fn tick(&mut self, now: Instant) -> Option<Transition> {
        if !self.status.is_online() {
            return None;
        }
        let last = self.last_message_at?;
        let elapsed = now.saturating_duration_since(last);
        if elapsed >= self.config.timeout {
            self.set(LinkStatus::Offline, TransitionReason::Silence(elapsed))
        } else {
            None
        }
    }

    /// Connection-level failure: OFFLINE without waiting for the timeout.
    pub fn on_transport_error(&mut self) -> Option<Transition> {
        self.set(LinkStatus::Offline, TransitionReason::TransportError)
    }

    /// Back to the initial state.
    pub fn reset(&mut self) -> Option<Transition> {
        self.last_message_at = None;
        self.set(LinkStatus::Offline, TransitionReason::Reset)
    }

    fn set(&mut self, to: LinkStatus, reason: TransitionReason) -> Option<Transition> {
        if self.status == to {
            return None;
        }
        let transition = Transition {
            from: self.status,
            to,
            reason,
        };
        self.status = to;
        info!(from = %transition.from, to = %transition.to, %reason, "liveness changed");
        Some(transition)
    }
}
