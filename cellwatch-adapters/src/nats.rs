//! NATS transport.
//!
//! Core NATS subjects carry the same JSON payloads as the MQTT topic. The
//! client reconnects and restores subscriptions on its own, so
//! [`subscribe`](Transport::subscribe) is idempotent per subject.
//!
//! ## Example
//!
//! ```rust,no_run
//! use cellwatch_adapters::nats::NatsTransport;
//! use cellwatch_core::Monitor;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = NatsTransport::builder()
//!         .url("nats://localhost:4222")
//!         .build()
//!         .await?;
//!
//!     let handle = Monitor::builder().topic("cell.robot.telemetry").build()?.start(transport);
//!     handle.stop().await;
//!     Ok(())
//! }
//! ```

use async_nats::{ConnectOptions, Event};
use async_trait::async_trait;
use cellwatch_core::{Transport, TransportError, TransportEvent};
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::AdapterError;

const CHANNEL_CAPACITY: usize = 256;

/// NATS transport.
pub struct NatsTransport {
    client: async_nats::Client,
    sender: mpsc::Sender<TransportEvent>,
    receiver: mpsc::Receiver<TransportEvent>,
    subscription: Option<(String, JoinHandle<()>)>,
    description: String,
}

impl NatsTransport {
    /// Create a new builder for configuring the transport.
    pub fn builder() -> NatsTransportBuilder {
        NatsTransportBuilder::default()
    }
}

impl std::fmt::Debug for NatsTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NatsTransport")
            .field("description", &self.description)
            .field("subject", &self.subscription.as_ref().map(|(s, _)| s))
            .finish()
    }
}

#[async_trait]
impl Transport for NatsTransport {
    async fn subscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        if let Some((subject, _)) = &self.subscription {
            if subject == topic {
                return Ok(());
            }
        }
        if let Some((_, forwarder)) = self.subscription.take() {
            forwarder.abort();
        }

        let mut subscriber = self
            .client
            .subscribe(topic.to_string())
            .await
            .map_err(|e| TransportError::Subscribe {
                topic: topic.to_string(),
                reason: e.to_string(),
            })?;

        let tx = self.sender.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(message) = subscriber.next().await {
                let event = TransportEvent::Message(message.payload.to_vec());
                if tx.send(event).await.is_err() {
                    break;
                }
            }
        });
        self.subscription = Some((topic.to_string(), forwarder));
        Ok(())
    }

    async fn next_event(&mut self) -> Option<TransportEvent> {
        self.receiver.recv().await
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        if let Some((_, forwarder)) = self.subscription.take() {
            forwarder.abort();
        }
        self.receiver.close();
        self.client
            .flush()
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))
    }

    fn description(&self) -> &str {
        &self.description
    }
}

fn map_event(event: Event) -> Option<TransportEvent> {
    match event {
        Event::Connected => Some(TransportEvent::Connected),
        Event::Disconnected => Some(TransportEvent::Error(TransportError::Connection(
            "disconnected from server".to_string(),
        ))),
        Event::ClientError(e) => Some(TransportEvent::Error(TransportError::Connection(
            e.to_string(),
        ))),
        other => {
            debug!(event = %other, "nats event");
            None
        }
    }
}

/// Builder for [`NatsTransport`].
#[derive(Debug, Default)]
pub struct NatsTransportBuilder {
    url: Option<String>,
    credentials: Option<String>,
    name: Option<String>,
}

impl NatsTransportBuilder {
    /// Set the NATS server URL (default: "nats://localhost:4222").
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Set the path to a credentials file for authentication.
    pub fn credentials_file(mut self, path: impl Into<String>) -> Self {
        self.credentials = Some(path.into());
        self
    }

    /// Connection name reported to the server.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Connect to the server.
    pub async fn build(self) -> Result<NatsTransport, AdapterError> {
        let url = self
            .url
            .unwrap_or_else(|| "nats://localhost:4222".to_string());

        let (sender, receiver) = mpsc::channel(CHANNEL_CAPACITY);
        let callback_tx = sender.clone();

        let mut options = ConnectOptions::new().event_callback(move |event| {
            let tx = callback_tx.clone();
            async move {
                if let Some(event) = map_event(event) {
                    let _ = tx.send(event).await;
                }
            }
        });
        if let Some(name) = self.name {
            options = options.name(name);
        }
        if let Some(creds) = self.credentials {
            options = options
                .credentials_file(&creds)
                .await
                .map_err(|e| AdapterError::Auth(e.to_string()))?;
        }

        let client = options
            .connect(&url)
            .await
            .map_err(|e| AdapterError::Connection(e.to_string()))?;

        // The callback may also report the initial connection; subscribe is
        // idempotent, so a duplicate is harmless.
        let _ = sender.try_send(TransportEvent::Connected);

        Ok(NatsTransport {
            client,
            sender,
            receiver,
            subscription: None,
            description: url,
        })
    }
}
