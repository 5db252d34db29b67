//! Enumerated robot states.
//!
//! Each enum has a fixed set of canonical labels plus an `Other` arm. Labels
//! are matched case-insensitively, with spaces and hyphens read as
//! underscores, and a handful of controller-specific synonyms fold onto the
//! canonical variant (e.g. `SYSTEM_EMERGENCY_STOP` is an `EmergencyStop`).

use std::fmt;

macro_rules! label_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $(
                $(#[$vmeta:meta])*
                $variant:ident => $label:literal $(| $alias:literal)*
            ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        #[cfg_attr(feature = "serde", serde(from = "String", into = "String"))]
        pub enum $name {
            $(
                $(#[$vmeta])*
                $variant,
            )+
            /// A label outside the canonical set, kept as received.
            Other(String),
        }

        impl $name {
            /// Every canonical variant, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// The canonical label (or the raw label for `Other`).
            pub fn as_str(&self) -> &str {
                match self {
                    $($name::$variant => $label,)+
                    $name::Other(label) => label,
                }
            }

            /// Resolve a label, falling back to `Other` with the trimmed input.
            pub fn from_label(label: &str) -> Self {
                let trimmed = label.trim();
                let key = trimmed.to_ascii_uppercase().replace([' ', '-'], "_");
                match key.as_str() {
                    $($label $(| $alias)* => $name::$variant,)+
                    _ => $name::Other(trimmed.to_string()),
                }
            }

            /// Returns false for the `Other` arm.
            pub fn is_canonical(&self) -> bool {
                !matches!(self, $name::Other(_))
            }
        }

        impl From<String> for $name {
            fn from(label: String) -> Self {
                Self::from_label(&label)
            }
        }

        impl From<&str> for $name {
            fn from(label: &str) -> Self {
                Self::from_label(label)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                match value {
                    $name::Other(label) => label,
                    known => known.as_str().to_string(),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

label_enum! {
    /// Execution state of the loaded robot program.
    pub enum RunState {
        Stopped => "STOPPED" | "STOPPING",
        Playing => "PLAYING" | "RUNNING" | "RESUMING",
        Paused => "PAUSED" | "PAUSING",
    }
}

label_enum! {
    /// Controller operation mode.
    pub enum OperationMode {
        Manual => "MANUAL",
        Auto => "AUTO" | "AUTOMATIC",
        Remote => "REMOTE",
        Teach => "TEACH",
    }
}

label_enum! {
    /// Power/boot state of the robot arm.
    pub enum MachineState {
        PowerOn => "POWER_ON",
        PowerOff => "POWER_OFF",
        Booting => "BOOTING",
        Running => "RUNNING",
        EmergencyStop => "EMERGENCY_STOP",
    }
}

label_enum! {
    /// Safety subsystem state.
    ///
    /// `Unknown` is what an unmapped numeric safety code resolves to.
    pub enum SafetyState {
        Normal => "NORMAL",
        Reduced => "REDUCED",
        ProtectiveStop => "PROTECTIVE_STOP" | "SAFEGUARD_STOP",
        EmergencyStop => "EMERGENCY_STOP" | "SYSTEM_EMERGENCY_STOP" | "ROBOT_EMERGENCY_STOP",
        Violation => "VIOLATION",
        Fault => "FAULT",
        Unknown => "UNKNOWN",
    }
}

impl SafetyState {
    /// True for states where the arm has been halted by the safety system.
    pub fn is_stopped(&self) -> bool {
        matches!(
            self,
            SafetyState::ProtectiveStop
                | SafetyState::EmergencyStop
                | SafetyState::Violation
                | SafetyState::Fault
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_labels_round_trip() {
        for state in SafetyState::ALL {
            assert_eq!(&SafetyState::from_label(state.as_str()), state);
        }
        for state in MachineState::ALL {
            assert_eq!(&MachineState::from_label(state.as_str()), state);
        }
        for mode in OperationMode::ALL {
            assert_eq!(&OperationMode::from_label(mode.as_str()), mode);
        }
        for run in RunState::ALL {
            assert_eq!(&RunState::from_label(run.as_str()), run);
        }
    }

    #[test]
    fn labels_are_case_and_separator_insensitive() {
        assert_eq!(MachineState::from_label(" power-on "), MachineState::PowerOn);
        assert_eq!(SafetyState::from_label("protective stop"), SafetyState::ProtectiveStop);
    }

    #[test]
    fn aliases_fold_onto_canonical_variant() {
        assert_eq!(
            SafetyState::from_label("SYSTEM_EMERGENCY_STOP"),
            SafetyState::EmergencyStop
        );
        assert_eq!(RunState::from_label("RUNNING"), RunState::Playing);
    }

    #[test]
    fn unknown_label_is_kept_verbatim() {
        let state = MachineState::from_label(" DETENIDO ");
        assert_eq!(state, MachineState::Other("DETENIDO".to_string()));
        assert_eq!(state.as_str(), "DETENIDO");
        assert!(!state.is_canonical());
        assert_eq!(String::from(state), "DETENIDO");
    }

    #[test]
    fn stopped_safety_states() {
        assert!(SafetyState::EmergencyStop.is_stopped());
        assert!(SafetyState::Fault.is_stopped());
        assert!(!SafetyState::Normal.is_stopped());
        assert!(!SafetyState::Reduced.is_stopped());
        assert!(!SafetyState::Unknown.is_stopped());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn serializes_as_label() {
        let json = serde_json::to_string(&SafetyState::ProtectiveStop).unwrap();
        assert_eq!(json, "\"PROTECTIVE_STOP\"");

        let other: OperationMode = serde_json::from_str("\"MANUAL_HIGH_SPEED\"").unwrap();
        assert_eq!(other, OperationMode::Other("MANUAL_HIGH_SPEED".to_string()));
        assert_eq!(serde_json::to_string(&other).unwrap(), "\"MANUAL_HIGH_SPEED\"");
    }
}
