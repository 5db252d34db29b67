//! # cellwatch-types
//!
//! Core types for robot cell telemetry. This crate defines the canonical,
//! stable-shaped record that every upstream payload variant is normalized
//! into, the liveness state of the data source, and the snapshot type that
//! consumers read.
//!
//! ## Design Goals
//!
//! - **Null means unknown**: every field is an `Option`; nothing is zero-filled
//! - **Fixed arity by type**: joint, digital and analog channels are arrays,
//!   so a record can never hold 5 joints or 9 digital inputs
//! - **Drift tolerant enums**: state enums keep unrecognised labels verbatim
//!   in an `Other` arm instead of dropping them
//! - **Optional serialization**: enable the `serde` feature as needed
//!
//! ## Example
//!
//! ```rust
//! use cellwatch_types::{CanonicalTelemetry, MachineState, JOINT_COUNT};
//!
//! let mut record = CanonicalTelemetry::default();
//! assert!(record.timestamp.is_none());
//! assert_eq!(record.joints.positions.len(), JOINT_COUNT);
//!
//! record.system.machine_state = Some(MachineState::from_label("power_on"));
//! assert_eq!(record.system.machine_state, Some(MachineState::PowerOn));
//! ```

mod liveness;
mod snapshot;
mod states;
mod telemetry;

pub use liveness::*;
pub use snapshot::*;
pub use states::*;
pub use telemetry::*;

/// Number of robot joints (UR arms are 6-axis).
pub const JOINT_COUNT: usize = 6;

/// Number of channels in each digital I/O bank.
pub const DIGITAL_CHANNELS: usize = 8;

/// Number of channels in each analog I/O bank.
pub const ANALOG_CHANNELS: usize = 2;
