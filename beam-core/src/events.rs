//! Typed notification fan-out for transfer lifecycle and progress
//!
//! Events are ephemeral: they are dispatched synchronously to subscribers at
//! the point of emission and never persisted. Subscribers are registered
//! against either the manager (every event) or a specific sender record
//! (that connection's events only). A slow subscriber stalls the emitting
//! transfer, so handlers must stay cheap and non-blocking.

use std::sync::Arc;

/// Kind tag for a transfer event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// A sender registered successfully
    SenderCreated,
    /// A registration collided with a live sender
    SenderCreationFailed,
    /// A receiver claimed an unknown or expired connection id
    SenderNotFound,
    /// A receiver connected
    ReceiverCreated,
    /// A receiver claimed the sender and streaming is about to begin
    TransferStarted,
    /// Cumulative progress update (`bytes` attribute)
    TransferBytesUpdate,
    /// The transfer aborted; terminal
    TransferError,
    /// The transfer completed; terminal (`bytes` attribute)
    TransferFinished,
}

impl EventKind {
    /// String representation used in logs and progress output
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SenderCreated => "sender_created",
            Self::SenderCreationFailed => "sender_creation_failed",
            Self::SenderNotFound => "sender_not_found",
            Self::ReceiverCreated => "receiver_created",
            Self::TransferStarted => "transfer_started",
            Self::TransferBytesUpdate => "transfer_bytes_update",
            Self::TransferError => "transfer_error",
            Self::TransferFinished => "transfer_finished",
        }
    }

    /// True for the two terminal kinds
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::TransferFinished | Self::TransferError)
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One notification: kind, free-form message, ordered key/value attributes
#[derive(Debug, Clone)]
pub struct Event {
    pub kind: EventKind,
    pub message: String,
    attrs: Vec<(&'static str, String)>,
}

impl Event {
    pub fn new(kind: EventKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            attrs: Vec::new(),
        }
    }

    /// Append an attribute, builder style
    #[must_use]
    pub fn attr(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.attrs.push((key, value.into()));
        self
    }

    /// Look up the first attribute with the given key
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    /// All attributes in insertion order
    pub fn attrs(&self) -> &[(&'static str, String)] {
        &self.attrs
    }
}

/// Callback invoked synchronously for each event
pub type EventHandler = Arc<dyn Fn(&Event) + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_as_str() {
        assert_eq!(EventKind::SenderCreated.as_str(), "sender_created");
        assert_eq!(EventKind::SenderNotFound.as_str(), "sender_not_found");
        assert_eq!(EventKind::TransferFinished.as_str(), "transfer_finished");
        assert_eq!(format!("{}", EventKind::TransferStarted), "transfer_started");
    }

    #[test]
    fn test_kind_is_terminal() {
        assert!(EventKind::TransferFinished.is_terminal());
        assert!(EventKind::TransferError.is_terminal());
        assert!(!EventKind::TransferStarted.is_terminal());
        assert!(!EventKind::TransferBytesUpdate.is_terminal());
    }

    #[test]
    fn test_event_attrs_ordered() {
        let event = Event::new(EventKind::TransferBytesUpdate, "transferred")
            .attr("bytes", "256")
            .attr("connection_id", "abc");

        assert_eq!(event.get("bytes"), Some("256"));
        assert_eq!(event.get("connection_id"), Some("abc"));
        assert_eq!(event.get("missing"), None);

        let keys: Vec<&str> = event.attrs().iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec!["bytes", "connection_id"]);
    }

    #[test]
    fn test_event_duplicate_key_returns_first() {
        let event = Event::new(EventKind::TransferError, "err")
            .attr("bytes", "1")
            .attr("bytes", "2");
        assert_eq!(event.get("bytes"), Some("1"));
    }
}
