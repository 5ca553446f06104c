use std::{fmt::Display, future::Future, io, pin::Pin};

use crate::EmailMessage;

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Boxed future type for transport operations, enabling object safety.
pub type TransportFuture<'a> = Pin<Box<dyn Future<Output = TransportResult<()>> + Send + 'a>>;

/// Errors that can occur while a transport delivers a message.
#[derive(Debug)]
pub enum TransportError {
    /// An I/O error occurred.
    Io(io::Error),
    /// The transport could not reach its destination.
    Connection(String),
    /// The destination refused the message.
    Rejected(String),
    /// The message could not be turned into something the transport can send.
    Message(String),
}

impl Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::Io(e) => write!(f, "I/O error: {e}"),
            TransportError::Connection(msg) => write!(f, "Connection error: {msg}"),
            TransportError::Rejected(msg) => write!(f, "Delivery rejected: {msg}"),
            TransportError::Message(msg) => write!(f, "Message error: {msg}"),
        }
    }
}

impl std::error::Error for TransportError {}

impl From<io::Error> for TransportError {
    fn from(e: io::Error) -> Self {
        TransportError::Io(e)
    }
}

/// Trait for the mail transports the gatekeeper hands messages to.
///
/// A transport is built once and shared across deliveries, so
/// [`deliver_now`](Self::deliver_now) may be called concurrently.
pub trait Transport: Send + Sync {
    /// Delivers the message immediately.
    fn deliver_now<'a>(&'a self, message: &'a EmailMessage) -> TransportFuture<'a>;

    /// Returns the name of this transport.
    fn name(&self) -> &str;
}
