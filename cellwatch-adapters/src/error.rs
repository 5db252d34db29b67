//! Error types for adapters.

use thiserror::Error;

/// Errors that can occur while setting up a transport.
///
/// Failures after setup are delivered as
/// [`TransportEvent::Error`](cellwatch_core::TransportEvent::Error) instead.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// The broker URL could not be parsed.
    #[error("Invalid broker URL {0:?}")]
    InvalidUrl(String),

    /// Connection failed.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Authentication failed.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Opening a file or socket failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
