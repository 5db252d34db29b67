//! Transport abstraction for receiving raw telemetry payloads.
//!
//! A transport delivers connection events and payload bytes from a broker,
//! a socket or an in-memory channel. Concrete broker clients live in
//! `cellwatch-adapters`; this module holds the trait and the channel
//! transport used for embedding and tests.

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::error::TransportError;

/// Something that happened on the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The connection was (re-)established. Subscriptions must be renewed.
    Connected,
    /// A raw payload arrived on the subscribed topic.
    Message(Vec<u8>),
    /// A connection-level failure. The transport may still reconnect.
    Error(TransportError),
    /// The connection was closed for good.
    Closed,
}

/// Trait for receiving telemetry from a broker or stream.
///
/// `next_event` must be cancel-safe: the monitor polls it inside
/// `tokio::select!`. Implementations typically forward events from a
/// background task through an mpsc channel.
///
/// # Example
///
/// ```
/// use cellwatch_core::{ChannelTransport, Transport, TransportEvent};
///
/// # tokio_test::block_on(async {
/// let (feed, mut transport) = ChannelTransport::create("memory");
/// feed.connect().await;
/// assert_eq!(transport.next_event().await, Some(TransportEvent::Connected));
/// transport.subscribe("cell/robot").await.unwrap();
/// assert_eq!(feed.subscriptions(), vec!["cell/robot".to_string()]);
/// # });
/// ```
#[async_trait]
pub trait Transport: Send + Debug {
    /// Subscribe to a topic on the current connection.
    async fn subscribe(&mut self, topic: &str) -> Result<(), TransportError>;

    /// Wait for the next event. `None` means the transport is exhausted.
    async fn next_event(&mut self) -> Option<TransportEvent>;

    /// Unsubscribe and release the connection.
    async fn disconnect(&mut self) -> Result<(), TransportError>;

    /// Human-readable description of the endpoint, for logs.
    fn description(&self) -> &str;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Box<T> {
    async fn subscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        (**self).subscribe(topic).await
    }

    async fn next_event(&mut self) -> Option<TransportEvent> {
        (**self).next_event().await
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        (**self).disconnect().await
    }

    fn description(&self) -> &str {
        (**self).description()
    }
}

/// The sending side of a [`ChannelTransport`].
#[derive(Debug, Clone)]
pub struct ChannelFeed {
    sender: mpsc::Sender<TransportEvent>,
    subscriptions: Arc<Mutex<Vec<String>>>,
}

impl ChannelFeed {
    /// Push an event. Returns false once the transport has been dropped or
    /// disconnected.
    pub async fn send(&self, event: TransportEvent) -> bool {
        self.sender.send(event).await.is_ok()
    }

    pub async fn connect(&self) -> bool {
        self.send(TransportEvent::Connected).await
    }

    pub async fn payload(&self, bytes: impl Into<Vec<u8>>) -> bool {
        self.send(TransportEvent::Message(bytes.into())).await
    }

    pub async fn error(&self, error: TransportError) -> bool {
        self.send(TransportEvent::Error(error)).await
    }

    pub async fn close(&self) -> bool {
        self.send(TransportEvent::Closed).await
    }

    /// Topics the consumer subscribed to, in order. Re-subscriptions repeat.
    pub fn subscriptions(&self) -> Vec<String> {
        self.subscriptions.lock().clone()
    }
}

/// An in-memory transport fed through a [`ChannelFeed`].
///
/// Useful for embedding the monitor behind an existing client, or for
/// driving it from tests.
#[derive(Debug)]
pub struct ChannelTransport {
    receiver: mpsc::Receiver<TransportEvent>,
    subscriptions: Arc<Mutex<Vec<String>>>,
    description: String,
}

impl ChannelTransport {
    const CAPACITY: usize = 64;

    /// Create a feed/transport pair.
    pub fn create(source_description: &str) -> (ChannelFeed, Self) {
        let (sender, receiver) = mpsc::channel(Self::CAPACITY);
        let subscriptions = Arc::new(Mutex::new(Vec::new()));
        let feed = ChannelFeed {
            sender,
            subscriptions: subscriptions.clone(),
        };
        let transport = Self {
            receiver,
            subscriptions,
            description: format!("channel: {}", source_description),
        };
        (feed, transport)
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn subscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        self.subscriptions.lock().push(topic.to_string());
        Ok(())
    }

    async fn next_event(&mut self) -> Option<TransportEvent> {
        self.receiver.recv().await
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        self.receiver.close();
        Ok(())
    }

    fn description(&self) -> &str {
        &self.description
    }
}
