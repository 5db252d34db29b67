//! Snapshot - what consumers read after each update.

use std::collections::BTreeSet;

use crate::{CanonicalTelemetry, Liveness};

/// A canonical field group, used to report what changed on the last update.
///
/// Dashboards use this to flash the widgets whose value moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Field {
    Timestamp,
    ProgramName,
    ProgramId,
    ProgramCycles,
    RunState,
    OperationMode,
    MachineState,
    /// Power, controller temperature, voltage, CPU load and system TCP speed.
    SystemMetrics,
    Safety,
    TcpPose,
    TcpSpeed,
    TcpVelocity,
    Joints,
    DigitalIo,
    AnalogIo,
    Tool,
    Statistics,
    LastError,
    Events,
}

/// Counters for the ingest path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IngestStats {
    /// Payloads delivered by the transport.
    pub received: u64,
    /// Payloads merged into the record.
    pub applied: u64,
    /// Payloads that did not parse as a JSON object.
    pub malformed: u64,
    /// Payloads dropped by the ordering policy.
    pub stale: u64,
    /// Connection-level errors reported by the transport.
    pub transport_errors: u64,
}

/// A read-only view of the store.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TelemetrySnapshot {
    pub telemetry: CanonicalTelemetry,
    pub liveness: Liveness,
    /// Field groups that changed on the last applied payload.
    pub changed: BTreeSet<Field>,
    /// The last applied payload advanced the record timestamp.
    pub heartbeat: bool,
    pub stats: IngestStats,
}

impl TelemetrySnapshot {
    /// Whether a field group changed on the last applied payload.
    pub fn field_changed(&self, field: Field) -> bool {
        self.changed.contains(&field)
    }
}
