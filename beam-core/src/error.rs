//! Error types for the transfer engine
//!
//! Registry errors (`DuplicateConnection`, `SenderNotFound`) are returned
//! synchronously to the caller that triggered them and are never retried
//! here. Mid-transfer I/O errors terminate that transfer only. `Timeout` is
//! a first-class recoverable outcome, not an exceptional path.

use std::io;
use std::time::Duration;

/// Errors surfaced by registration, claiming, relaying, and waiting
#[derive(Debug)]
pub enum TransferError {
    /// A live sender is already registered under this connection id
    DuplicateConnection(String),
    /// No pending sender exists under this connection id
    SenderNotFound(String),
    /// No receiver claimed the sender within the wait duration
    Timeout {
        /// How long the uploader waited before giving up
        waited: Duration,
    },
    /// Requested wait duration exceeds the server-configured ceiling
    WaitTooLong {
        requested: Duration,
        max: Duration,
    },
    /// I/O failure reading from the sender's stream
    Read(io::Error),
    /// I/O failure writing to the receiver's sink
    Write(io::Error),
    /// The receiver disconnected before the transfer finished
    Cancelled,
    /// The sender's stream was already closed or consumed
    AlreadyClosed,
    /// The transfer ended with an error observed via the event bus
    Failed(String),
}

impl std::fmt::Display for TransferError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateConnection(id) => {
                write!(f, "connection id {id:?} already in use, please use another")
            }
            Self::SenderNotFound(id) => write!(f, "no sender found for connection id {id:?}"),
            Self::Timeout { waited } => write!(
                f,
                "timed out after {}s waiting for a receiver",
                waited.as_secs()
            ),
            Self::WaitTooLong { requested, max } => write!(
                f,
                "invalid wait duration {}s, must be <= {}s",
                requested.as_secs(),
                max.as_secs()
            ),
            Self::Read(e) => write!(f, "read error: {e}"),
            Self::Write(e) => write!(f, "write error: {e}"),
            Self::Cancelled => write!(f, "receiver disconnected"),
            Self::AlreadyClosed => write!(f, "stream already closed"),
            Self::Failed(msg) => write!(f, "transfer failed: {msg}"),
        }
    }
}

impl std::error::Error for TransferError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Read(e) | Self::Write(e) => Some(e),
            _ => None,
        }
    }
}
