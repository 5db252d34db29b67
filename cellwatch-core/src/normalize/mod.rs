//! Telemetry normalization.
//!
//! Maps one raw payload plus the previous canonical record onto the next
//! canonical record. Each field is resolved independently: the consolidated
//! path first, then the legacy paths in order, then the previous value.

mod payload;

use chrono::{DateTime, Utc};
use serde_json::Value;

use cellwatch_types::{
    AnalogBank, AnalogIo, CanonicalTelemetry, DigitalBank, DigitalIo, EventEntry, JointState,
    JointValues, MachineState, OperationMode, Orientation, ProgramInfo, RunState, SafetyState,
    Statistics, SystemInfo, TcpState, ToolState, Vector3, DIGITAL_CHANNELS,
};

use crate::codes::{CodeField, CodeTables};
use crate::config::NormalizerConfig;
use payload::{
    as_count, as_finite, as_flag, as_integer, as_state, as_text, as_triple, fixed_array, Payload,
    RawState,
};

const TIMESTAMP: &[&str] = &["timestamp", "ts"];

const PROGRAM_NAME: &[&str] = &["program.name", "programa.nombre"];
const PROGRAM_ID: &[&str] = &["program.id", "programa.id", "programa.status_id"];
const PROGRAM_CYCLES: &[&str] = &["program.cycles", "programa.ciclos", "telemetry.ciclos"];
/// Run state sources in precedence order. The dashboard `status_id` has its
/// own numbering, separate from RTDE `runtime_state`.
const RUN_STATE: &[(&[&str], CodeField)] = &[
    (&["program.run_state", "programa.estado"], CodeField::RunState),
    (&["programa.status_id"], CodeField::ProgramStatus),
    (&["runtime_state"], CodeField::RunState),
];

const OPERATION_MODE: &[&str] = &[
    "system.operation_mode",
    "sistema.modo_operacion",
    "estado.mode",
];
const MACHINE_STATE: &[&str] = &[
    "system.machine_state",
    "sistema.estado_maquina",
    "robot_mode",
];
const TOTAL_POWER: &[&str] = &[
    "system.total_power",
    "sistema.potencia_total",
    "telemetry.power",
    "robot_power",
];
const CONTROLLER_TEMP: &[&str] = &[
    "system.controller_temp",
    "sistema.temperatura_control",
    "telemetry.controller_temp",
    "ctrl_temp",
];
const SYSTEM_TCP_SPEED: &[&str] = &[
    "system.tcp_speed",
    "sistema.velocidad_tcp",
    "telemetry.speed",
];
const MAIN_VOLTAGE: &[&str] = &["system.main_voltage", "telemetry.main_voltage"];
const CPU_LOAD: &[&str] = &["system.cpu_load", "telemetry.cpu_load"];

const SAFETY: &[&str] = &["safety", "seguridad.safety", "estado.safety", "safety_mode"];

const TCP_POSE: &[&str] = &["actual_TCP_pose", "tcp_pose"];
const TCP_SPEED_VECTOR: &[&str] = &["actual_TCP_speed"];

const JOINT_POSITIONS: &[&str] = &["joints.positions", "actual_q"];
const JOINT_TEMPERATURES: &[&str] = &["joints.temperatures", "joint_temperatures"];
const JOINT_CURRENTS: &[&str] = &["joints.currents", "actual_current"];

const DIGITAL_INPUT_BITS: &[&str] = &["actual_digital_input_bits"];
const DIGITAL_OUTPUT_BITS: &[&str] = &["actual_digital_output_bits"];

const TOOL_VOLTAGE: &[&str] = &["tool.voltage", "herramienta.tension", "tool_output_voltage"];
const TOOL_CURRENT: &[&str] = &["tool.current", "herramienta.corriente", "tool_output_current"];
const TOOL_POWER: &[&str] = &["tool.power", "herramienta.potencia"];

const CYCLE_TIME: &[&str] = &[
    "statistics.cycle_time",
    "estadisticas.tiempo_ciclo",
    "cycle_time",
];
const UPTIME_HOURS: &[&str] = &[
    "statistics.uptime_hours",
    "estadisticas.horas_operacion",
    "uptime_hours",
];

const EVENTS: &[&str] = &["events", "eventos", "messages"];
const EVENT_TIME: &[&str] = &["time", "hora", "timestamp"];
const EVENT_MESSAGE: &[&str] = &["message", "msg", "text"];

/// An enum that can be resolved from a label or a numeric code.
trait CodedState: Sized + for<'s> From<&'s str> {
    const FIELD: CodeField;

    /// Value for a code missing from the table.
    fn unmapped(code: String) -> Self;
}

impl CodedState for SafetyState {
    const FIELD: CodeField = CodeField::Safety;

    fn unmapped(_code: String) -> Self {
        SafetyState::Unknown
    }
}

impl CodedState for MachineState {
    const FIELD: CodeField = CodeField::MachineState;

    fn unmapped(code: String) -> Self {
        MachineState::Other(code)
    }
}

impl CodedState for OperationMode {
    const FIELD: CodeField = CodeField::OperationMode;

    fn unmapped(code: String) -> Self {
        OperationMode::Other(code)
    }
}

impl CodedState for RunState {
    const FIELD: CodeField = CodeField::RunState;

    fn unmapped(code: String) -> Self {
        RunState::Other(code)
    }
}

/// Builds canonical records from raw payloads.
///
/// # Example
///
/// ```
/// use cellwatch_core::Normalizer;
/// use cellwatch_types::{CanonicalTelemetry, MachineState};
///
/// let normalizer = Normalizer::default();
/// let raw = serde_json::json!({"sistema": {"estado_maquina": 5}});
/// let record = normalizer.normalize(&raw, &CanonicalTelemetry::new());
/// assert_eq!(record.system.machine_state, Some(MachineState::PowerOn));
/// ```
#[derive(Debug, Clone)]
pub struct Normalizer {
    tables: CodeTables,
    event_capacity: usize,
}

impl Normalizer {
    pub fn new(tables: CodeTables) -> Self {
        Self {
            tables,
            event_capacity: NormalizerConfig::DEFAULT_EVENT_CAPACITY,
        }
    }

    /// Maximum number of events kept; older entries are dropped first.
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    pub fn tables(&self) -> &CodeTables {
        &self.tables
    }

    pub fn event_capacity(&self) -> usize {
        self.event_capacity
    }

    /// Merge `raw` onto `previous`.
    ///
    /// A payload that is not a JSON object yields `previous` unchanged.
    pub fn normalize(&self, raw: &Value, previous: &CanonicalTelemetry) -> CanonicalTelemetry {
        self.merge(raw, previous, None)
    }

    /// Like [`normalize`](Self::normalize), stamping the record with
    /// `received_at` when the payload carries no timestamp of its own.
    pub fn normalize_at(
        &self,
        raw: &Value,
        previous: &CanonicalTelemetry,
        received_at: DateTime<Utc>,
    ) -> CanonicalTelemetry {
        self.merge(raw, previous, Some(received_at))
    }

    fn merge(
        &self,
        raw: &Value,
        previous: &CanonicalTelemetry,
        received_at: Option<DateTime<Utc>>,
    ) -> CanonicalTelemetry {
        let Some(root) = raw.as_object() else {
            return previous.clone();
        };
        let payload = Payload::new(root);

        let timestamp = payload
            .first(TIMESTAMP, parse_timestamp)
            .or(received_at)
            .or(previous.timestamp);
        let event_time = timestamp
            .map(|t| t.format("%H:%M:%S").to_string())
            .unwrap_or_default();

        CanonicalTelemetry {
            timestamp,
            program: self.program(&payload, &previous.program),
            system: self.system(&payload, &previous.system),
            safety: self
                .state(&payload, SAFETY)
                .or_else(|| previous.safety.clone()),
            tcp: tcp(&payload, &previous.tcp),
            joints: joints(&payload, &previous.joints),
            digital_io: digital_io(&payload, &previous.digital_io),
            analog_io: analog_io(&payload, &previous.analog_io),
            tool: tool(&payload, &previous.tool),
            statistics: Statistics {
                cycle_time: payload
                    .number(CYCLE_TIME)
                    .or(previous.statistics.cycle_time),
                uptime_hours: payload
                    .number(UPTIME_HOURS)
                    .or(previous.statistics.uptime_hours),
            },
            last_error: last_error(&payload, previous.last_error.as_ref()),
            events: self.events(&payload, &previous.events, &event_time),
        }
    }

    fn state<S: CodedState>(&self, payload: &Payload<'_>, paths: &[&str]) -> Option<S> {
        self.state_in(payload, paths, S::FIELD)
    }

    /// Like [`state`](Self::state), translating codes through `field`'s table.
    fn state_in<S: CodedState>(
        &self,
        payload: &Payload<'_>,
        paths: &[&str],
        field: CodeField,
    ) -> Option<S> {
        payload.first(paths, as_state).map(|raw| match raw {
            RawState::Label(label) => S::from(label),
            RawState::Code(code) => match self.tables.lookup(field, code) {
                Some(label) => S::from(label),
                None => S::unmapped(code.to_string()),
            },
            RawState::Number(n) => S::unmapped(n.to_string()),
        })
    }

    fn program(&self, payload: &Payload<'_>, previous: &ProgramInfo) -> ProgramInfo {
        ProgramInfo {
            name: payload
                .text(PROGRAM_NAME)
                .or_else(|| previous.name.clone()),
            id: payload.first(PROGRAM_ID, as_integer).or(previous.id),
            cycles: payload.first(PROGRAM_CYCLES, as_count).or(previous.cycles),
            run_state: RUN_STATE
                .iter()
                .find_map(|(paths, field)| self.state_in(payload, paths, *field))
                .or_else(|| previous.run_state.clone()),
        }
    }

    fn system(&self, payload: &Payload<'_>, previous: &SystemInfo) -> SystemInfo {
        SystemInfo {
            operation_mode: self
                .state(payload, OPERATION_MODE)
                .or_else(|| previous.operation_mode.clone()),
            machine_state: self
                .state(payload, MACHINE_STATE)
                .or_else(|| previous.machine_state.clone()),
            total_power: payload.number(TOTAL_POWER).or(previous.total_power),
            controller_temp: payload
                .number(CONTROLLER_TEMP)
                .or(previous.controller_temp),
            tcp_speed: payload.number(SYSTEM_TCP_SPEED).or(previous.tcp_speed),
            main_voltage: payload.number(MAIN_VOLTAGE).or(previous.main_voltage),
            cpu_load: payload.number(CPU_LOAD).or(previous.cpu_load),
        }
    }

    fn events(&self, payload: &Payload<'_>, previous: &[EventEntry], now: &str) -> Vec<EventEntry> {
        let incoming: Vec<EventEntry> = payload
            .first(EVENTS, Value::as_array)
            .map(|items| items.iter().filter_map(|item| event(item, now)).collect())
            .unwrap_or_default();

        if incoming.is_empty() && previous.len() <= self.event_capacity {
            return previous.to_vec();
        }

        let mut events = previous.to_vec();
        for entry in incoming {
            if events.last() != Some(&entry) {
                events.push(entry);
            }
        }
        if events.len() > self.event_capacity {
            let excess = events.len() - self.event_capacity;
            events.drain(..excess);
        }
        events
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(CodeTables::default())
    }
}

/// RFC 3339 string or epoch milliseconds.
fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .map(|t| t.with_timezone(&Utc)),
        Value::Number(_) => DateTime::<Utc>::from_timestamp_millis(as_integer(value)?),
        _ => None,
    }
}

fn vector(value: &Value) -> Option<Vector3> {
    as_triple(value, ["x", "y", "z"]).map(|[x, y, z]| Vector3::new(x, y, z))
}

fn orientation(value: &Value) -> Option<Orientation> {
    as_triple(value, ["rx", "ry", "rz"]).map(|[rx, ry, rz]| Orientation::new(rx, ry, rz))
}

/// Six finite numbers: position followed by rotation vector.
fn as_pose(value: &Value) -> Option<(Vector3, Orientation)> {
    let items = value.as_array()?;
    let mut values = [0.0; 6];
    for (slot, item) in values.iter_mut().zip(items) {
        *slot = as_finite(item)?;
    }
    (items.len() >= 6).then(|| {
        (
            Vector3::new(values[0], values[1], values[2]),
            Orientation::new(values[3], values[4], values[5]),
        )
    })
}

fn tcp(payload: &Payload<'_>, previous: &TcpState) -> TcpState {
    let pose = payload.first(TCP_POSE, as_pose);
    TcpState {
        position: payload
            .first(&["tcp.position"], vector)
            .or(pose.map(|(position, _)| position))
            .or(previous.position),
        orientation: payload
            .first(&["tcp.orientation"], orientation)
            .or(pose.map(|(_, orientation)| orientation))
            .or(previous.orientation),
        speed: payload.number(&["tcp.speed"]).or(previous.speed),
        velocity: payload
            .first(&["tcp.velocity"], vector)
            .or_else(|| payload.first(TCP_SPEED_VECTOR, vector))
            .or(previous.velocity),
    }
}

fn joint_values(
    payload: &Payload<'_>,
    paths: &[&str],
    scalar_suffix: &str,
    previous: &JointValues,
) -> JointValues {
    if let Some(values) = payload.first(paths, |v| fixed_array(v, as_finite)) {
        return values;
    }
    let mut values = *previous;
    for (i, slot) in values.iter_mut().enumerate() {
        let key = format!("j{}_{}", i + 1, scalar_suffix);
        if let Some(value) = payload.number(&[key.as_str()]) {
            *slot = Some(value);
        }
    }
    values
}

fn joints(payload: &Payload<'_>, previous: &JointState) -> JointState {
    JointState {
        positions: joint_values(payload, JOINT_POSITIONS, "ang", &previous.positions),
        temperatures: joint_values(payload, JOINT_TEMPERATURES, "temp", &previous.temperatures),
        currents: joint_values(payload, JOINT_CURRENTS, "current", &previous.currents),
    }
}

fn digital_bank(
    payload: &Payload<'_>,
    path: &str,
    bits: Option<u64>,
    offset: usize,
    previous: &DigitalBank,
) -> DigitalBank {
    payload
        .first(&[path], |v| fixed_array(v, as_flag))
        .or_else(|| bits.map(|bits| std::array::from_fn(|i| Some((bits >> (offset + i)) & 1 == 1))))
        .unwrap_or(*previous)
}

fn digital_io(payload: &Payload<'_>, previous: &DigitalIo) -> DigitalIo {
    let inputs = payload.first(DIGITAL_INPUT_BITS, as_count);
    let outputs = payload.first(DIGITAL_OUTPUT_BITS, as_count);
    DigitalIo {
        inputs: digital_bank(payload, "digital_io.inputs", inputs, 0, &previous.inputs),
        outputs: digital_bank(payload, "digital_io.outputs", outputs, 0, &previous.outputs),
        configurable_inputs: digital_bank(
            payload,
            "digital_io.configurable_inputs",
            inputs,
            DIGITAL_CHANNELS,
            &previous.configurable_inputs,
        ),
        configurable_outputs: digital_bank(
            payload,
            "digital_io.configurable_outputs",
            outputs,
            DIGITAL_CHANNELS,
            &previous.configurable_outputs,
        ),
    }
}

fn analog_io(payload: &Payload<'_>, previous: &AnalogIo) -> AnalogIo {
    let bank = |paths: &[&str], previous: &AnalogBank| {
        payload
            .first(paths, |v| fixed_array(v, as_finite))
            .unwrap_or(*previous)
    };
    AnalogIo {
        inputs: bank(&["analog_io.inputs", "analog_io.ai"], &previous.inputs),
        outputs: bank(&["analog_io.outputs", "analog_io.ao"], &previous.outputs),
    }
}

fn tool(payload: &Payload<'_>, previous: &ToolState) -> ToolState {
    let voltage = payload.number(TOOL_VOLTAGE);
    let current = payload.number(TOOL_CURRENT);
    let merged_voltage = voltage.or(previous.voltage);
    let merged_current = current.or(previous.current);

    let power = payload
        .number(TOOL_POWER)
        .or_else(|| {
            if voltage.is_none() && current.is_none() {
                return None;
            }
            merged_voltage
                .zip(merged_current)
                .map(|(v, ma)| ToolState::derive_power(v, ma))
                .filter(|p| p.is_finite())
        })
        .or(previous.power);

    ToolState {
        voltage: merged_voltage,
        current: merged_current,
        power,
    }
}

/// An explicitly empty string clears the error.
fn last_error(payload: &Payload<'_>, previous: Option<&String>) -> Option<String> {
    match payload.get("last_error") {
        Some(Value::String(s)) if s.trim().is_empty() => None,
        Some(value) => as_text(value).or_else(|| previous.cloned()),
        None => previous.cloned(),
    }
}

fn event(value: &Value, now: &str) -> Option<EventEntry> {
    match value {
        Value::String(_) => as_text(value).map(|message| EventEntry::new(now, message)),
        Value::Object(map) => {
            let item = Payload::new(map);
            let message = item.text(EVENT_MESSAGE)?;
            let time = item.text(EVENT_TIME).unwrap_or_else(|| now.to_string());
            Some(EventEntry::new(time, message))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellwatch_types::{JOINT_COUNT, ANALOG_CHANNELS};
    use chrono::TimeZone;
    use serde_json::json;

    fn normalize(raw: Value) -> CanonicalTelemetry {
        Normalizer::default().normalize(&raw, &CanonicalTelemetry::new())
    }

    #[test]
    fn merge_by_presence() {
        let normalizer = Normalizer::default();
        let first = normalizer.normalize(
            &json!({"sistema": {"modo_operacion": "REMOTE", "potencia_total": 410.0}}),
            &CanonicalTelemetry::new(),
        );
        let second = normalizer.normalize(&json!({"sistema": {"estado_maquina": 5}}), &first);

        assert_eq!(second.system.operation_mode, Some(OperationMode::Remote));
        assert_eq!(second.system.machine_state, Some(MachineState::PowerOn));
        assert_eq!(second.system.total_power, Some(410.0));
    }

    #[test]
    fn null_counts_as_absent() {
        let normalizer = Normalizer::default();
        let first = normalize(json!({"programa": {"nombre": "pick_place"}}));
        let second = normalizer.normalize(&json!({"programa": {"nombre": null}}), &first);
        assert_eq!(second.program.name.as_deref(), Some("pick_place"));
    }

    #[test]
    fn consolidated_path_beats_legacy() {
        let record = normalize(json!({
            "system": {"total_power": 100.0},
            "sistema": {"potencia_total": 200.0},
            "robot_power": 300.0
        }));
        assert_eq!(record.system.total_power, Some(100.0));

        let record = normalize(json!({"telemetry": {"power": 250.0}, "robot_power": 300.0}));
        assert_eq!(record.system.total_power, Some(250.0));
    }

    #[test]
    fn invalid_values_fall_through_to_previous() {
        let normalizer = Normalizer::default();
        let first = normalize(json!({"ctrl_temp": 38.5}));
        let second = normalizer.normalize(&json!({"ctrl_temp": "hot"}), &first);
        assert_eq!(second.system.controller_temp, Some(38.5));

        let third = normalizer.normalize(&json!({"ctrl_temp": "NaN"}), &second);
        assert_eq!(third.system.controller_temp, Some(38.5));
    }

    #[test]
    fn codes_translate_through_tables() {
        let record = normalize(json!({"safety_mode": 3, "runtime_state": 2, "robot_mode": 7}));
        assert_eq!(record.safety, Some(SafetyState::ProtectiveStop));
        assert_eq!(record.program.run_state, Some(RunState::Playing));
        assert_eq!(record.system.machine_state, Some(MachineState::Running));

        let v1 = Normalizer::new(CodeTables::dashboard_v1());
        let record = v1.normalize(
            &json!({"safety_mode": 3, "robot_mode": 7}),
            &CanonicalTelemetry::new(),
        );
        assert_eq!(record.safety, Some(SafetyState::EmergencyStop));
        assert_eq!(
            record.system.machine_state,
            Some(MachineState::Other("7".to_string()))
        );
    }

    #[test]
    fn unknown_codes_fall_back() {
        let record = normalize(json!({"safety_mode": 42, "robot_mode": 99, "estado": {"mode": 2.5}}));
        assert_eq!(record.safety, Some(SafetyState::Unknown));
        assert_eq!(
            record.system.machine_state,
            Some(MachineState::Other("99".to_string()))
        );
        assert_eq!(
            record.system.operation_mode,
            Some(OperationMode::Other("2.5".to_string()))
        );
    }

    /// Resolve `code` through the given field's table via one numeric path
    /// and return the canonical label.
    fn resolved(normalizer: &Normalizer, field: CodeField, code: i64) -> Option<String> {
        let raw = match field {
            CodeField::Safety => json!({"safety_mode": code}),
            CodeField::MachineState => json!({"robot_mode": code}),
            CodeField::OperationMode => json!({"system": {"operation_mode": code}}),
            CodeField::RunState => json!({"runtime_state": code}),
            CodeField::ProgramStatus => json!({"programa": {"status_id": code}}),
        };
        let record = normalizer.normalize(&raw, &CanonicalTelemetry::new());
        match field {
            CodeField::Safety => record.safety.map(String::from),
            CodeField::MachineState => record.system.machine_state.map(String::from),
            CodeField::OperationMode => record.system.operation_mode.map(String::from),
            CodeField::RunState | CodeField::ProgramStatus => {
                record.program.run_state.map(String::from)
            }
        }
    }

    fn canonical(field: CodeField, label: &str) -> String {
        match field {
            CodeField::Safety => SafetyState::from_label(label).into(),
            CodeField::MachineState => MachineState::from_label(label).into(),
            CodeField::OperationMode => OperationMode::from_label(label).into(),
            CodeField::RunState | CodeField::ProgramStatus => RunState::from_label(label).into(),
        }
    }

    #[test]
    fn every_table_entry_resolves_to_its_label() {
        for preset in CodeTables::PRESETS {
            let normalizer = Normalizer::new(CodeTables::preset(preset).unwrap());
            for field in CodeField::ALL {
                let table = normalizer.tables().table(field);
                assert!(!table.is_empty(), "{preset}/{field} is empty");
                for (code, label) in table.iter() {
                    assert_eq!(
                        resolved(&normalizer, field, code),
                        Some(canonical(field, label)),
                        "{preset}/{field} code {code}"
                    );
                }
            }
        }
    }

    #[test]
    fn canonical_labels_round_trip() {
        let normalizer = Normalizer::default();
        for state in SafetyState::ALL {
            let record = normalizer.normalize(&json!({"safety": state.as_str()}), &CanonicalTelemetry::new());
            assert_eq!(record.safety.as_ref(), Some(state));
        }
        for state in MachineState::ALL {
            let raw = json!({"system": {"machine_state": state.as_str()}});
            let record = normalizer.normalize(&raw, &CanonicalTelemetry::new());
            assert_eq!(record.system.machine_state.as_ref(), Some(state));
        }
        for mode in OperationMode::ALL {
            let raw = json!({"system": {"operation_mode": mode.as_str()}});
            let record = normalizer.normalize(&raw, &CanonicalTelemetry::new());
            assert_eq!(record.system.operation_mode.as_ref(), Some(mode));
        }
        for state in RunState::ALL {
            let raw = json!({"program": {"run_state": state.as_str()}});
            let record = normalizer.normalize(&raw, &CanonicalTelemetry::new());
            assert_eq!(record.program.run_state.as_ref(), Some(state));
        }
    }

    #[test]
    fn dashboard_status_id_uses_its_own_numbering() {
        let record = normalize(json!({"programa": {"status_id": 1}}));
        assert_eq!(record.program.run_state, Some(RunState::Playing));

        let record = normalize(json!({"programa": {"status_id": 3}}));
        assert_eq!(record.program.run_state, Some(RunState::Other("ERROR".to_string())));

        let record = normalize(json!({"programa": {"status_id": 4}}));
        assert_eq!(record.program.run_state, Some(RunState::Paused));

        // RTDE numbering still applies to runtime_state.
        let record = normalize(json!({"runtime_state": 1}));
        assert_eq!(record.program.run_state, Some(RunState::Stopped));

        let record = normalize(json!({"programa": {"estado": "PAUSED", "status_id": 1}}));
        assert_eq!(record.program.run_state, Some(RunState::Paused));
    }

    #[test]
    fn labels_pass_through() {
        let record = normalize(json!({
            "estado": {"safety": "protective stop", "mode": "automatic"},
            "programa": {"estado": "RUNNING", "status_id": 3}
        }));
        assert_eq!(record.safety, Some(SafetyState::ProtectiveStop));
        assert_eq!(record.system.operation_mode, Some(OperationMode::Auto));
        assert_eq!(record.program.run_state, Some(RunState::Playing));
        assert_eq!(record.program.id, Some(3));

        let record = normalize(json!({"sistema": {"estado_maquina": "DOCKED"}}));
        assert_eq!(
            record.system.machine_state,
            Some(MachineState::Other("DOCKED".to_string()))
        );
    }

    #[test]
    fn fixed_arity_arrays() {
        let record = normalize(json!({
            "joints": {"positions": [0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8]},
            "actual_current": [1.0, 2.0],
            "analog_io": {"ai": [0.5, 1.5, 2.5]},
            "digital_io": {"inputs": [true, false, 1]}
        }));
        assert_eq!(record.joints.positions.len(), JOINT_COUNT);
        assert_eq!(record.joints.positions[5], Some(0.6));
        assert_eq!(record.joints.currents, [Some(1.0), Some(2.0), None, None, None, None]);
        assert_eq!(record.analog_io.inputs.len(), ANALOG_CHANNELS);
        assert_eq!(record.analog_io.inputs, [Some(0.5), Some(1.5)]);
        assert_eq!(record.digital_io.inputs[..3], [Some(true), Some(false), Some(true)]);
        assert_eq!(record.digital_io.inputs[3], None);
    }

    #[test]
    fn per_joint_scalars_when_array_absent() {
        let normalizer = Normalizer::default();
        let first = normalize(json!({"j1_temp": 31.0, "j2_temp": "32.5"}));
        assert_eq!(first.joints.temperatures[0], Some(31.0));
        assert_eq!(first.joints.temperatures[1], Some(32.5));

        let second = normalizer.normalize(&json!({"j6_ang": 1.57}), &first);
        assert_eq!(second.joints.temperatures[0], Some(31.0));
        assert_eq!(second.joints.positions[5], Some(1.57));
    }

    #[test]
    fn no_nan_leaks() {
        let record = normalize(json!({
            "joints": {"temperatures": ["NaN", "Infinity", 30.0]},
            "tool": {"voltage": "-inf"},
            "cycle_time": "nan"
        }));
        assert_eq!(record.joints.temperatures[..3], [None, None, Some(30.0)]);
        assert_eq!(record.tool.voltage, None);
        assert_eq!(record.statistics.cycle_time, None);
    }

    #[test]
    fn rtde_bitmasks_fill_digital_banks() {
        let record = normalize(json!({
            "actual_digital_input_bits": 0b1_0000_0101u64,
            "actual_digital_output_bits": 2
        }));
        assert_eq!(record.digital_io.inputs[0], Some(true));
        assert_eq!(record.digital_io.inputs[1], Some(false));
        assert_eq!(record.digital_io.inputs[2], Some(true));
        assert_eq!(record.digital_io.configurable_inputs[0], Some(true));
        assert_eq!(record.digital_io.outputs[1], Some(true));
        assert_eq!(record.digital_io.configurable_outputs[7], Some(false));
    }

    #[test]
    fn tcp_from_objects_and_pose_arrays() {
        let record = normalize(json!({
            "tcp": {
                "position": {"x": 0.4, "y": -0.1, "z": 0.3},
                "orientation": [0.0, 3.14, 0.0],
                "speed": 0.25
            }
        }));
        assert_eq!(record.tcp.position, Some(Vector3::new(0.4, -0.1, 0.3)));
        assert_eq!(record.tcp.orientation, Some(Orientation::new(0.0, 3.14, 0.0)));
        assert_eq!(record.tcp.speed, Some(0.25));

        let record = normalize(json!({
            "actual_TCP_pose": [0.1, 0.2, 0.3, 1.0, 2.0, 3.0],
            "actual_TCP_speed": [0.01, 0.02, 0.03, 0.0, 0.0, 0.0]
        }));
        assert_eq!(record.tcp.position, Some(Vector3::new(0.1, 0.2, 0.3)));
        assert_eq!(record.tcp.orientation, Some(Orientation::new(1.0, 2.0, 3.0)));
        assert_eq!(record.tcp.velocity, Some(Vector3::new(0.01, 0.02, 0.03)));
    }

    #[test]
    fn partial_vectors_are_absent() {
        let record = normalize(json!({
            "tcp": {"position": {"x": 0.4, "y": -0.1}},
            "actual_TCP_pose": [0.1, 0.2, 0.3]
        }));
        assert_eq!(record.tcp.position, None);
        assert_eq!(record.tcp.orientation, None);
    }

    #[test]
    fn tool_power_derived_only_when_touched() {
        let normalizer = Normalizer::default();
        let first = normalize(json!({"herramienta": {"tension": 24.0, "corriente": 500.0}}));
        assert_eq!(first.tool.power, Some(12.0));

        let second = normalizer.normalize(&json!({"herramienta": {"corriente": 250.0}}), &first);
        assert_eq!(second.tool.power, Some(6.0));

        let third = normalizer.normalize(&json!({"tool": {"power": 9.5}}), &second);
        assert_eq!(third.tool.power, Some(9.5));

        let fourth = normalizer.normalize(&json!({"ctrl_temp": 40.0}), &third);
        assert_eq!(fourth.tool.power, Some(9.5));

        let lone = normalize(json!({"tool": {"voltage": 24.0}}));
        assert_eq!(lone.tool.power, None);
    }

    #[test]
    fn last_error_clears_on_empty_string() {
        let normalizer = Normalizer::default();
        let first = normalize(json!({"last_error": "C204A3 joint overcurrent"}));
        assert_eq!(first.last_error.as_deref(), Some("C204A3 joint overcurrent"));

        let kept = normalizer.normalize(&json!({"ctrl_temp": 40.0}), &first);
        assert_eq!(kept.last_error, first.last_error);

        let cleared = normalizer.normalize(&json!({"last_error": ""}), &kept);
        assert_eq!(cleared.last_error, None);
    }

    #[test]
    fn events_append_skip_duplicates_and_cap() {
        let normalizer = Normalizer::default().with_event_capacity(3);
        let first = normalizer.normalize(
            &json!({"eventos": [{"hora": "10:00:01", "msg": "Programa iniciado"}]}),
            &CanonicalTelemetry::new(),
        );
        let second = normalizer.normalize(
            &json!({"eventos": [{"hora": "10:00:01", "msg": "Programa iniciado"}]}),
            &first,
        );
        assert_eq!(second.events.len(), 1);

        let third = normalizer.normalize(
            &json!({"events": [
                {"time": "10:00:02", "message": "a"},
                {"time": "10:00:03", "message": "b"},
                {"time": "10:00:04", "message": "c"}
            ]}),
            &second,
        );
        assert_eq!(third.events.len(), 3);
        assert_eq!(third.events[0], EventEntry::new("10:00:02", "a"));
        assert_eq!(third.events[2], EventEntry::new("10:00:04", "c"));
    }

    #[test]
    fn string_events_use_receive_time() {
        let normalizer = Normalizer::default();
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 15).unwrap();
        let record = normalizer.normalize_at(
            &json!({"messages": ["Protective stop cleared", ""]}),
            &CanonicalTelemetry::new(),
            at,
        );
        assert_eq!(
            record.events,
            vec![EventEntry::new("08:30:15", "Protective stop cleared")]
        );
    }

    #[test]
    fn timestamp_resolution() {
        let normalizer = Normalizer::default();
        let received = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();

        let record = normalizer.normalize_at(
            &json!({"timestamp": "2024-05-01T07:59:58Z"}),
            &CanonicalTelemetry::new(),
            received,
        );
        assert_eq!(
            record.timestamp,
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 7, 59, 58).unwrap())
        );

        let record = normalizer.normalize_at(&json!({"ts": 1714550400000i64}), &record, received);
        assert_eq!(record.timestamp, Some(received));

        let record = normalizer.normalize_at(&json!({}), &CanonicalTelemetry::new(), received);
        assert_eq!(record.timestamp, Some(received));

        let record = normalizer.normalize(&json!({"ctrl_temp": 1.0}), &record);
        assert_eq!(record.timestamp, Some(received));
    }

    #[test]
    fn non_objects_leave_record_unchanged() {
        let normalizer = Normalizer::default();
        let previous = normalize(json!({"ctrl_temp": 40.0}));
        for raw in [json!([1, 2]), json!("text"), json!(12), Value::Null] {
            assert_eq!(normalizer.normalize(&raw, &previous), previous);
        }
    }

    #[test]
    fn simulator_payload() {
        let record = normalize(json!({
            "programa": {"nombre": "paletizado_v2", "status_id": 1, "estado": "PLAYING"},
            "sistema": {
                "modo_operacion": "AUTO",
                "estado_maquina": "RUNNING",
                "potencia_total": 512.3,
                "temperatura_control": 41.2,
                "velocidad_tcp": 0.35
            },
            "estadisticas": {"tiempo_ciclo": 12.4, "horas_operacion": 1532.7},
            "seguridad": {"safety": "NORMAL"},
            "telemetry": {"main_voltage": 48.1, "cpu_load": 23.0, "ciclos": 1200},
            "joints": {"positions": [0.0, -1.57, 1.57, 0.0, 1.57, 0.0]}
        }));

        assert_eq!(record.program.name.as_deref(), Some("paletizado_v2"));
        assert_eq!(record.program.id, Some(1));
        assert_eq!(record.program.cycles, Some(1200));
        assert_eq!(record.program.run_state, Some(RunState::Playing));
        assert_eq!(record.system.operation_mode, Some(OperationMode::Auto));
        assert_eq!(record.system.machine_state, Some(MachineState::Running));
        assert_eq!(record.system.main_voltage, Some(48.1));
        assert_eq!(record.system.cpu_load, Some(23.0));
        assert_eq!(record.statistics.uptime_hours, Some(1532.7));
        assert_eq!(record.safety, Some(SafetyState::Normal));
        assert_eq!(record.joints.positions[1], Some(-1.57));
    }
}
