//! # cellwatch-adapters
//!
//! Transports that feed a [`cellwatch_core::Monitor`].
//!
//! ## Supported Transports
//!
//! | Transport | Feature Flag | Source |
//! |-----------|--------------|--------|
//! | MQTT      | `mqtt` (default) | broker topic over TCP, TLS or WebSocket, via `rumqttc` |
//! | NATS      | `nats`       | core NATS subject |
//! | Stream    | always       | newline-delimited JSON from a file, TCP peer or stdin |
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! cellwatch-adapters = { version = "0.1", features = ["nats"] }
//! ```
//!
//! ```
//! use std::io::Cursor;
//! use cellwatch_adapters::StreamTransport;
//! use cellwatch_core::Monitor;
//!
//! # tokio_test::block_on(async {
//! let recorded = b"{\"robot_mode\": 7, \"safety_mode\": 1}\n";
//! let transport = StreamTransport::spawn(Cursor::new(recorded.to_vec()), "recording");
//! let handle = Monitor::builder().build().unwrap().start(transport);
//!
//! let mut reader = handle.reader();
//! let snapshot = reader.wait_for(|s| s.stats.applied == 1).await.unwrap();
//! assert!(snapshot.telemetry.safety.is_some());
//! handle.join().await;
//! # });
//! ```

mod error;
pub mod stream;

#[cfg(feature = "mqtt")]
pub mod mqtt;

#[cfg(feature = "nats")]
pub mod nats;

pub use error::AdapterError;
pub use stream::StreamTransport;

#[cfg(feature = "mqtt")]
pub use mqtt::MqttTransport;

#[cfg(feature = "nats")]
pub use nats::NatsTransport;
