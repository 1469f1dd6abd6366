use std::io;
use std::time::Duration;

use relay_protocol::MessageType;
use thiserror::Error;

/// Reasons a connection is turned away before it ever reaches the registry.
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("no handshake within {0:?}")]
    Timeout(Duration),
    #[error("connection closed before handshake")]
    Closed,
    #[error("malformed handshake frame: {0}")]
    Malformed(#[source] io::Error),
    #[error("expected handshake, received {0} record")]
    UnexpectedRecord(MessageType),
    #[error("invalid username {name:?}: {reason}")]
    InvalidName { name: String, reason: &'static str },
}

// recipient local, logged and never reported back to the sender
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("outbound queue for {0} is full")]
    QueueFull(String),
    #[error("connection for {0} is closed")]
    Closed(String),
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("unable to bind {addr}: {source}")]
    Bind { addr: String, #[source] source: io::Error },
    #[error(transparent)]
    Handshake(#[from] HandshakeError),
    #[error(transparent)]
    Io(#[from] io::Error),
}
