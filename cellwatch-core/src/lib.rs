//! # cellwatch-core
//!
//! Telemetry normalization and connectivity watchdog for Universal Robots
//! work cells.
//!
//! Raw JSON payloads from a robot controller (or a dashboard simulator) are
//! merged into a [`CanonicalTelemetry`](cellwatch_types::CanonicalTelemetry)
//! record with a stable shape, and a watchdog tracks whether the source is
//! still delivering.
//!
//! ## Quick Start
//!
//! ```
//! use std::time::Duration;
//! use cellwatch_core::{ChannelTransport, Monitor};
//!
//! # tokio_test::block_on(async {
//! let (feed, transport) = ChannelTransport::create("embedded");
//! let handle = Monitor::builder()
//!     .topic("salesianos/robot/iban/principal")
//!     .timeout(Duration::from_secs(6))
//!     .build()
//!     .unwrap()
//!     .start(transport);
//!
//! feed.payload(br#"{"sistema": {"estado_maquina": 5}}"#.to_vec()).await;
//!
//! let mut reader = handle.reader();
//! let snapshot = reader.wait_for(|s| s.stats.applied == 1).await.unwrap();
//! println!("machine state: {:?}", snapshot.telemetry.system.machine_state);
//! handle.stop().await;
//! # });
//! ```
//!
//! ## Layers
//!
//! - [`Normalizer`]: pure `raw + previous -> next` merge, driven by
//!   versioned [`CodeTables`].
//! - [`Watchdog`]: ONLINE/OFFLINE state machine on a monotonic clock.
//! - [`TelemetryStore`]: single-writer owner of the record, publishing
//!   snapshots to any number of [`StoreReader`]s.
//! - [`Monitor`]: spawns the event loop that feeds a store from a
//!   [`Transport`].

mod codes;
mod config;
mod error;
mod monitor;
mod normalize;
mod signals;
mod store;
mod transport;
mod watchdog;

pub use codes::{CodeField, CodeTable, CodeTables};
pub use config::{parse_duration, MonitorConfig, NormalizerConfig, OrderingPolicy, WatchdogConfig};
pub use error::{ConfigError, IngestError, TransportError};
pub use monitor::{Monitor, MonitorBuilder, MonitorHandle, DEFAULT_TOPIC};
pub use normalize::Normalizer;
pub use signals::{changed_fields, heartbeat, SafetyIndicator};
pub use store::{Ingested, StoreReader, TelemetryStore};
pub use transport::{ChannelFeed, ChannelTransport, Transport, TransportEvent};
pub use watchdog::{Transition, TransitionReason, Watchdog};

// Re-export the data model so downstream crates need only one dependency.
pub use cellwatch_types as types;
