//! The canonical telemetry record.

use chrono::{DateTime, Utc};

use crate::{
    MachineState, OperationMode, RunState, SafetyState, ANALOG_CHANNELS, DIGITAL_CHANNELS,
    JOINT_COUNT,
};

/// One value per joint, index 0 is the base joint.
pub type JointValues = [Option<f64>; JOINT_COUNT];

/// One bank of digital channels.
pub type DigitalBank = [Option<bool>; DIGITAL_CHANNELS];

/// One bank of analog channels.
pub type AnalogBank = [Option<f64>; ANALOG_CHANNELS];

/// The stable, normalized view of a robot cell.
///
/// Every field starts out as `None` ("unknown") and only ever holds finite
/// numbers. A record is never mutated in place by the ingest path: each
/// applied payload produces a new record derived from the previous one.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CanonicalTelemetry {
    /// When the record was last updated.
    pub timestamp: Option<DateTime<Utc>>,
    pub program: ProgramInfo,
    pub system: SystemInfo,
    pub safety: Option<SafetyState>,
    pub tcp: TcpState,
    pub joints: JointState,
    pub digital_io: DigitalIo,
    pub analog_io: AnalogIo,
    pub tool: ToolState,
    pub statistics: Statistics,
    /// Last error text reported by the controller.
    pub last_error: Option<String>,
    /// Most recent controller events, oldest first.
    pub events: Vec<EventEntry>,
}

impl CanonicalTelemetry {
    /// The all-unknown record a store starts from.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether at least one payload has been applied.
    pub fn has_data(&self) -> bool {
        self.timestamp.is_some()
    }
}

/// The robot program currently loaded.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProgramInfo {
    pub name: Option<String>,
    pub id: Option<i64>,
    /// Completed cycles since the program was started.
    pub cycles: Option<u64>,
    pub run_state: Option<RunState>,
}

/// Controller-level status and metrics.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SystemInfo {
    pub operation_mode: Option<OperationMode>,
    pub machine_state: Option<MachineState>,
    /// Total power draw in watts.
    pub total_power: Option<f64>,
    /// Controller cabinet temperature in °C.
    pub controller_temp: Option<f64>,
    pub tcp_speed: Option<f64>,
    /// Main supply voltage in volts.
    pub main_voltage: Option<f64>,
    /// Controller CPU load in percent.
    pub cpu_load: Option<f64>,
}

/// A cartesian vector.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// A rotation vector.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Orientation {
    pub rx: f64,
    pub ry: f64,
    pub rz: f64,
}

impl Orientation {
    pub fn new(rx: f64, ry: f64, rz: f64) -> Self {
        Self { rx, ry, rz }
    }
}

/// Tool Center Point pose and motion.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TcpState {
    pub position: Option<Vector3>,
    pub orientation: Option<Orientation>,
    pub speed: Option<f64>,
    pub velocity: Option<Vector3>,
}

/// Per-joint readings.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct JointState {
    /// Joint angles in radians.
    pub positions: JointValues,
    /// Joint temperatures in °C.
    pub temperatures: JointValues,
    /// Joint motor currents in amperes.
    pub currents: JointValues,
}

/// Controller digital I/O banks.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DigitalIo {
    pub inputs: DigitalBank,
    pub outputs: DigitalBank,
    pub configurable_inputs: DigitalBank,
    pub configurable_outputs: DigitalBank,
}

/// Controller analog I/O banks.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AnalogIo {
    pub inputs: AnalogBank,
    pub outputs: AnalogBank,
}

/// Tool flange electrical readings.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ToolState {
    /// Volts.
    pub voltage: Option<f64>,
    /// Milliamperes.
    pub current: Option<f64>,
    /// Watts. Derived from voltage and current when not reported.
    pub power: Option<f64>,
}

impl ToolState {
    /// Power in watts from volts and milliamperes.
    pub fn derive_power(voltage: f64, current_ma: f64) -> f64 {
        voltage * current_ma / 1000.0
    }
}

/// Operating statistics.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Statistics {
    /// Last cycle time in seconds.
    pub cycle_time: Option<f64>,
    /// Accumulated operating hours.
    pub uptime_hours: Option<f64>,
}

/// A single controller log line.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EventEntry {
    pub time: String,
    pub message: String,
}

impl EventEntry {
    pub fn new(time: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            time: time.into(),
            message: message.into(),
        }
    }
}
