//! Numeric code tables.
//!
//! Controllers report enum-valued fields as integers whose meaning differs
//! between firmware and dashboard versions. A [`CodeTables`] value holds one
//! versioned set of translations; the normalizer looks codes up here and
//! never hard-codes a mapping itself.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// The enum-valued fields that accept numeric codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeField {
    Safety,
    MachineState,
    OperationMode,
    RunState,
    /// Dashboard program status (`programa.status_id`), resolved to a run state.
    ProgramStatus,
}

impl CodeField {
    pub const ALL: [CodeField; 5] = [
        CodeField::Safety,
        CodeField::MachineState,
        CodeField::OperationMode,
        CodeField::RunState,
        CodeField::ProgramStatus,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CodeField::Safety => "safety",
            CodeField::MachineState => "machine_state",
            CodeField::OperationMode => "operation_mode",
            CodeField::RunState => "run_state",
            CodeField::ProgramStatus => "program_status",
        }
    }
}

impl fmt::Display for CodeField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Code to label translations for one field.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CodeTable {
    entries: BTreeMap<i64, String>,
}

impl CodeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs(pairs: &[(i64, &str)]) -> Self {
        Self {
            entries: pairs
                .iter()
                .map(|(code, label)| (*code, (*label).to_string()))
                .collect(),
        }
    }

    /// Add or replace a translation.
    pub fn insert(&mut self, code: i64, label: impl Into<String>) {
        self.entries.insert(code, label.into());
    }

    pub fn get(&self, code: i64) -> Option<&str> {
        self.entries.get(&code).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (i64, &str)> {
        self.entries.iter().map(|(code, label)| (*code, label.as_str()))
    }
}

/// A named, versioned set of code tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeTables {
    version: String,
    safety: CodeTable,
    machine_state: CodeTable,
    operation_mode: CodeTable,
    run_state: CodeTable,
    program_status: CodeTable,
}

/// Dashboard program status numbering, shared by every preset.
const PROGRAM_STATUS: &[(i64, &str)] = &[
    (0, "STOPPED"),
    (1, "PLAYING"),
    (2, "STOPPED"),
    (3, "ERROR"),
    (4, "PAUSED"),
];

impl CodeTables {
    pub const RTDE: &'static str = "rtde";
    pub const DASHBOARD_V1: &'static str = "dashboard-v1";
    pub const PRESETS: [&'static str; 2] = [Self::RTDE, Self::DASHBOARD_V1];

    /// Empty tables: every numeric code falls back to its unmapped value.
    pub fn empty(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            safety: CodeTable::new(),
            machine_state: CodeTable::new(),
            operation_mode: CodeTable::new(),
            run_state: CodeTable::new(),
            program_status: CodeTable::new(),
        }
    }

    /// Universal Robots RTDE numbering (`safety_mode`, `robot_mode`,
    /// `runtime_state`).
    pub fn rtde() -> Self {
        Self {
            version: Self::RTDE.to_string(),
            safety: CodeTable::from_pairs(&[
                (1, "NORMAL"),
                (2, "REDUCED"),
                (3, "PROTECTIVE_STOP"),
                (4, "RECOVERY"),
                (5, "SAFEGUARD_STOP"),
                (6, "SYSTEM_EMERGENCY_STOP"),
                (7, "ROBOT_EMERGENCY_STOP"),
                (8, "VIOLATION"),
                (9, "FAULT"),
            ]),
            machine_state: CodeTable::from_pairs(&[
                (-1, "NO_CONTROLLER"),
                (0, "DISCONNECTED"),
                (1, "CONFIRM_SAFETY"),
                (2, "BOOTING"),
                (3, "POWER_OFF"),
                (4, "POWER_ON"),
                // IDLE: powered, brakes engaged
                (5, "POWER_ON"),
                (6, "BACKDRIVE"),
                (7, "RUNNING"),
                (8, "UPDATING_FIRMWARE"),
            ]),
            operation_mode: CodeTable::from_pairs(&[
                (0, "MANUAL"),
                (1, "AUTO"),
                (2, "REMOTE"),
                (3, "TEACH"),
            ]),
            run_state: CodeTable::from_pairs(&[
                (0, "STOPPING"),
                (1, "STOPPED"),
                (2, "PLAYING"),
                (3, "PAUSING"),
                (4, "PAUSED"),
                (5, "RESUMING"),
            ]),
            program_status: CodeTable::from_pairs(PROGRAM_STATUS),
        }
    }

    /// Numbering used by the first dashboard payload format (`status_id`,
    /// small contiguous machine and safety codes).
    pub fn dashboard_v1() -> Self {
        Self {
            version: Self::DASHBOARD_V1.to_string(),
            safety: CodeTable::from_pairs(&[
                (0, "NORMAL"),
                (1, "REDUCED"),
                (2, "PROTECTIVE_STOP"),
                (3, "EMERGENCY_STOP"),
                (4, "VIOLATION"),
                (5, "FAULT"),
            ]),
            machine_state: CodeTable::from_pairs(&[
                (0, "POWER_OFF"),
                (1, "POWER_ON"),
                (2, "BOOTING"),
                (3, "RUNNING"),
                (4, "EMERGENCY_STOP"),
            ]),
            operation_mode: CodeTable::from_pairs(&[
                (0, "MANUAL"),
                (1, "AUTO"),
                (2, "REMOTE"),
                (3, "TEACH"),
            ]),
            run_state: CodeTable::from_pairs(PROGRAM_STATUS),
            program_status: CodeTable::from_pairs(PROGRAM_STATUS),
        }
    }

    /// Look a preset up by name.
    pub fn preset(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            Self::RTDE => Some(Self::rtde()),
            Self::DASHBOARD_V1 | "dashboard_v1" => Some(Self::dashboard_v1()),
            _ => None,
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn table(&self, field: CodeField) -> &CodeTable {
        match field {
            CodeField::Safety => &self.safety,
            CodeField::MachineState => &self.machine_state,
            CodeField::OperationMode => &self.operation_mode,
            CodeField::RunState => &self.run_state,
            CodeField::ProgramStatus => &self.program_status,
        }
    }

    pub fn table_mut(&mut self, field: CodeField) -> &mut CodeTable {
        match field {
            CodeField::Safety => &mut self.safety,
            CodeField::MachineState => &mut self.machine_state,
            CodeField::OperationMode => &mut self.operation_mode,
            CodeField::RunState => &mut self.run_state,
            CodeField::ProgramStatus => &mut self.program_status,
        }
    }

    /// Builder-style override of a single code.
    pub fn with_code(mut self, field: CodeField, code: i64, label: impl Into<String>) -> Self {
        self.table_mut(field).insert(code, label);
        self
    }

    pub fn lookup(&self, field: CodeField, code: i64) -> Option<&str> {
        self.table(field).get(code)
    }
}

impl Default for CodeTables {
    fn default() -> Self {
        Self::rtde()
    }
}
