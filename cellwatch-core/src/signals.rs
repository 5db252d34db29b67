//! Signals derived from consecutive records, for dashboards.

use std::collections::BTreeSet;

use cellwatch_types::{CanonicalTelemetry, Field, SafetyState};

/// Field groups whose value differs between two records.
pub fn changed_fields(previous: &CanonicalTelemetry, next: &CanonicalTelemetry) -> BTreeSet<Field> {
    let checks = [
        (Field::Timestamp, previous.timestamp != next.timestamp),
        (Field::ProgramName, previous.program.name != next.program.name),
        (Field::ProgramId, previous.program.id != next.program.id),
        (Field::ProgramCycles, previous.program.cycles != next.program.cycles),
        (Field::RunState, previous.program.run_state != next.program.run_state),
        (
            Field::OperationMode,
            previous.system.operation_mode != next.system.operation_mode,
        ),
        (
            Field::MachineState,
            previous.system.machine_state != next.system.machine_state,
        ),
        (
            Field::SystemMetrics,
            previous.system.total_power != next.system.total_power
                || previous.system.controller_temp != next.system.controller_temp
                || previous.system.tcp_speed != next.system.tcp_speed
                || previous.system.main_voltage != next.system.main_voltage
                || previous.system.cpu_load != next.system.cpu_load,
        ),
        (Field::Safety, previous.safety != next.safety),
        (
            Field::TcpPose,
            previous.tcp.position != next.tcp.position
                || previous.tcp.orientation != next.tcp.orientation,
        ),
        (Field::TcpSpeed, previous.tcp.speed != next.tcp.speed),
        (Field::TcpVelocity, previous.tcp.velocity != next.tcp.velocity),
        (Field::Joints, previous.joints != next.joints),
        (Field::DigitalIo, previous.digital_io != next.digital_io),
        (Field::AnalogIo, previous.analog_io != next.analog_io),
        (Field::Tool, previous.tool != next.tool),
        (Field::Statistics, previous.statistics != next.statistics),
        (Field::LastError, previous.last_error != next.last_error),
        (Field::Events, previous.events != next.events),
    ];

    checks
        .into_iter()
        .filter_map(|(field, changed)| changed.then_some(field))
        .collect()
}

/// The record timestamp advanced.
pub fn heartbeat(previous: &CanonicalTelemetry, next: &CanonicalTelemetry) -> bool {
    next.timestamp.is_some() && next.timestamp != previous.timestamp
}

/// How a safety state should be presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SafetyIndicator {
    /// No safety state received yet.
    NotAvailable,
    Nominal,
    /// Reduced mode or an unrecognised state.
    Warning,
    /// The arm has been halted; dashboards blink this one.
    Stop,
}

impl SafetyIndicator {
    pub fn from_safety(safety: Option<&SafetyState>) -> Self {
        match safety {
            None => SafetyIndicator::NotAvailable,
            Some(SafetyState::Normal) => SafetyIndicator::Nominal,
            Some(state) if state.is_stopped() => SafetyIndicator::Stop,
            Some(_) => SafetyIndicator::Warning,
        }
    }

    pub fn blinks(&self) -> bool {
        matches!(self, SafetyIndicator::Stop)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SafetyIndicator::NotAvailable => "not_available",
            SafetyIndicator::Nominal => "nominal",
            SafetyIndicator::Warning => "warning",
            SafetyIndicator::Stop => "stop",
        }
    }
}
