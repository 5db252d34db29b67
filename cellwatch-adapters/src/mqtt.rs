//! MQTT transport.
//!
//! Connects to an MQTT 3.1.1 broker with `rumqttc`, over plain TCP, TLS
//! (`mqtts://`) or WebSockets (`ws://`, `wss://`). The client event loop
//! runs in a background task that forwards connection acknowledgements,
//! publishes and errors into a channel. After a connection error the loop
//! waits `reconnect_delay` and polls again, which makes `rumqttc`
//! reconnect; every successful `CONNACK` surfaces as
//! [`TransportEvent::Connected`] so the monitor can resubscribe.
//!
//! ## Example
//!
//! ```rust,no_run
//! use cellwatch_adapters::mqtt::MqttTransport;
//! use cellwatch_core::Monitor;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = MqttTransport::builder()
//!         .url("wss://broker.emqx.io:8084/mqtt")
//!         .build()?;
//!
//!     let handle = Monitor::builder().build()?.start(transport);
//!     let mut reader = handle.reader();
//!     while reader.changed().await {
//!         println!("{}", reader.status());
//!     }
//!     Ok(())
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cellwatch_core::{Transport, TransportError, TransportEvent};
use parking_lot::Mutex;
use rumqttc::{
    AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS, SubscribeReasonCode,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::AdapterError;

const CHANNEL_CAPACITY: usize = 256;
const MAX_PACKET_SIZE: usize = 256 * 1024;

/// MQTT transport.
pub struct MqttTransport {
    client: AsyncClient,
    receiver: mpsc::Receiver<TransportEvent>,
    pump: JoinHandle<()>,
    topics: Arc<Mutex<Vec<String>>>,
    description: String,
}

impl MqttTransport {
    /// Create a new builder for configuring the transport.
    pub fn builder() -> MqttTransportBuilder {
        MqttTransportBuilder::default()
    }
}

impl std::fmt::Debug for MqttTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttTransport")
            .field("description", &self.description)
            .field("topics", &*self.topics.lock())
            .finish()
    }
}

#[async_trait]
impl Transport for MqttTransport {
    async fn subscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        self.client
            .subscribe(topic, QoS::AtMostOnce)
            .await
            .map_err(|e| TransportError::Subscribe {
                topic: topic.to_string(),
                reason: e.to_string(),
            })?;
        let mut topics = self.topics.lock();
        if !topics.iter().any(|t| t == topic) {
            topics.push(topic.to_string());
        }
        Ok(())
    }

    async fn next_event(&mut self) -> Option<TransportEvent> {
        self.receiver.recv().await
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        let topics = std::mem::take(&mut *self.topics.lock());
        for topic in topics {
            if let Err(e) = self.client.unsubscribe(&topic).await {
                debug!(%topic, error = %e, "unsubscribe failed");
            }
        }
        let result = self
            .client
            .disconnect()
            .await
            .map_err(|e| TransportError::Connection(e.to_string()));

        // Let the event loop flush the DISCONNECT before tearing it down.
        self.receiver.close();
        if tokio::time::timeout(Duration::from_secs(1), &mut self.pump)
            .await
            .is_err()
        {
            self.pump.abort();
        }
        result
    }

    fn description(&self) -> &str {
        &self.description
    }
}

async fn pump(
    mut eventloop: EventLoop,
    tx: mpsc::Sender<TransportEvent>,
    topics: Arc<Mutex<Vec<String>>>,
    reconnect_delay: Duration,
) {
    loop {
        let event = match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => TransportEvent::Connected,
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                TransportEvent::Message(publish.payload.to_vec())
            }
            Ok(Event::Incoming(Packet::SubAck(ack)))
                if ack
                    .return_codes
                    .iter()
                    .any(|code| matches!(code, SubscribeReasonCode::Failure)) =>
            {
                TransportEvent::Error(TransportError::Subscribe {
                    topic: topics.lock().join(","),
                    reason: "rejected by broker".to_string(),
                })
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => break,
            Ok(_) => continue,
            Err(e) => {
                warn!(error = %e, "mqtt connection error");
                let event = TransportEvent::Error(TransportError::Connection(e.to_string()));
                if tx.send(event).await.is_err() {
                    break;
                }
                tokio::time::sleep(reconnect_delay).await;
                continue;
            }
        };
        if tx.send(event).await.is_err() {
            // Receiver dropped
            break;
        }
    }
    debug!("mqtt event loop stopped");
}

/// Builder for [`MqttTransport`].
#[derive(Debug)]
pub struct MqttTransportBuilder {
    url: Option<String>,
    client_id: Option<String>,
    credentials: Option<(String, String)>,
    keep_alive: Duration,
    reconnect_delay: Duration,
}

impl Default for MqttTransportBuilder {
    fn default() -> Self {
        Self {
            url: None,
            client_id: None,
            credentials: None,
            keep_alive: Duration::from_secs(30),
            reconnect_delay: Duration::from_secs(1),
        }
    }
}

impl MqttTransportBuilder {
    /// Set the broker URL (default: "mqtt://localhost:1883").
    ///
    /// Accepts `mqtt://`, `tcp://`, `mqtts://`, `ssl://`, `ws://` and
    /// `wss://` URLs, or a bare `host:port`. WebSocket URLs keep their path.
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Set the client id (default: "cellwatch-<pid>").
    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Authenticate with a username and password.
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some((username.into(), password.into()));
        self
    }

    pub fn keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    /// Wait between reconnection attempts (default: 1s).
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Build the transport and start its event loop.
    ///
    /// Must be called from within a tokio runtime. The connection itself is
    /// established in the background; failures arrive as events.
    pub fn build(self) -> Result<MqttTransport, AdapterError> {
        let url = self
            .url
            .unwrap_or_else(|| "mqtt://localhost:1883".to_string());
        let broker = parse_broker_url(&url)?;
        let client_id = self
            .client_id
            .unwrap_or_else(|| format!("cellwatch-{}", std::process::id()));

        let mut options = MqttOptions::new(client_id, broker.host.clone(), broker.port);
        options
            .set_transport(broker.wire())
            .set_keep_alive(self.keep_alive)
            .set_clean_session(true)
            .set_max_packet_size(MAX_PACKET_SIZE, MAX_PACKET_SIZE);
        if let Some((username, password)) = self.credentials {
            options.set_credentials(username, password);
        }

        let (client, eventloop) = AsyncClient::new(options, CHANNEL_CAPACITY);
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let topics = Arc::new(Mutex::new(Vec::new()));
        let pump = tokio::spawn(pump(eventloop, tx, topics.clone(), self.reconnect_delay));

        Ok(MqttTransport {
            client,
            receiver: rx,
            pump,
            topics,
            description: broker.description(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scheme {
    Tcp,
    Tls,
    Ws,
    Wss,
}

impl Scheme {
    fn default_port(self) -> u16 {
        match self {
            Scheme::Tcp => 1883,
            Scheme::Tls => 8883,
            Scheme::Ws => 80,
            Scheme::Wss => 443,
        }
    }
}

/// Where and how to reach the broker.
///
/// For WebSocket schemes `rumqttc` expects the whole URL as the host.
#[derive(Debug, PartialEq, Eq)]
struct BrokerAddress {
    scheme: Scheme,
    host: String,
    port: u16,
}

impl BrokerAddress {
    fn wire(&self) -> rumqttc::Transport {
        match self.scheme {
            Scheme::Tcp => rumqttc::Transport::Tcp,
            Scheme::Tls => rumqttc::Transport::tls_with_default_config(),
            Scheme::Ws => rumqttc::Transport::Ws,
            Scheme::Wss => rumqttc::Transport::wss_with_default_config(),
        }
    }

    fn description(&self) -> String {
        match self.scheme {
            Scheme::Tcp => format!("mqtt://{}:{}", self.host, self.port),
            Scheme::Tls => format!("mqtts://{}:{}", self.host, self.port),
            Scheme::Ws | Scheme::Wss => self.host.clone(),
        }
    }
}

fn parse_broker_url(url: &str) -> Result<BrokerAddress, AdapterError> {
    let trimmed = url.trim();
    let (scheme, rest) = match trimmed.split_once("://") {
        Some(("mqtt" | "tcp", rest)) => (Scheme::Tcp, rest),
        Some(("mqtts" | "ssl", rest)) => (Scheme::Tls, rest),
        Some(("ws", rest)) => (Scheme::Ws, rest),
        Some(("wss", rest)) => (Scheme::Wss, rest),
        Some(_) => return Err(AdapterError::InvalidUrl(url.to_string())),
        None => (Scheme::Tcp, trimmed),
    };

    let authority = rest.split('/').next().unwrap_or_default();
    let (host, port) = match authority.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse()
                .map_err(|_| AdapterError::InvalidUrl(url.to_string()))?;
            (host, port)
        }
        None => (authority, scheme.default_port()),
    };

    if host.is_empty() {
        return Err(AdapterError::InvalidUrl(url.to_string()));
    }
    let host = match scheme {
        Scheme::Ws | Scheme::Wss => trimmed.to_string(),
        Scheme::Tcp | Scheme::Tls => host.to_string(),
    };
    Ok(BrokerAddress { scheme, host, port })
}
