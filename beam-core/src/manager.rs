//! Connection registry pairing uploaders with downloaders by id
//!
//! The registry maps connection identifier to sender record behind a single
//! mutex scoped to map mutation only. Streaming never happens under this
//! lock, so independent connection identifiers never contend with each
//! other. Claiming removes the entry atomically, which makes a second
//! concurrent claim for the same id a deterministic `SenderNotFound`
//! instead of a wait on a stale record.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::DEFAULT_MAX_WAIT;
use crate::error::TransferError;
use crate::events::{Event, EventHandler, EventKind};
use crate::sender::{ByteStream, Sender};

/// Thread-safe registry of pending senders plus manager-wide subscribers
pub struct TransferManager {
    senders: Mutex<HashMap<String, Arc<Sender>>>,
    handlers: Mutex<Vec<EventHandler>>,
    max_wait: Duration,
}

impl TransferManager {
    /// Create a registry with the given ceiling on uploader wait durations
    pub fn new(max_wait: Duration) -> Self {
        Self {
            senders: Mutex::new(HashMap::new()),
            handlers: Mutex::new(Vec::new()),
            max_wait,
        }
    }

    /// The server-configured wait ceiling
    pub fn max_wait(&self) -> Duration {
        self.max_wait
    }

    /// Reject wait durations above the ceiling before any registration
    pub fn check_wait(&self, requested: Duration) -> Result<(), TransferError> {
        if requested > self.max_wait {
            return Err(TransferError::WaitTooLong {
                requested,
                max: self.max_wait,
            });
        }
        Ok(())
    }

    /// Register a handler that receives every event, manager-wide
    pub fn subscribe(&self, handler: EventHandler) {
        self.handlers
            .lock()
            .expect("transfer manager handler lock poisoned")
            .push(handler);
    }

    /// Register a new sender under `connection_id`
    ///
    /// Fails with `DuplicateConnection` if a live sender already holds the
    /// id, leaving the existing registration intact.
    pub fn new_sender(
        &self,
        connection_id: &str,
        stream: ByteStream,
    ) -> Result<Arc<Sender>, TransferError> {
        self.new_sender_with_subscribers(connection_id, stream, Vec::new())
    }

    /// Register a new sender with scoped subscribers attached up front
    ///
    /// The subscribers are installed before the record becomes visible in
    /// the registry, so a receiver claiming immediately after registration
    /// cannot emit events they would miss.
    pub fn new_sender_with_subscribers(
        &self,
        connection_id: &str,
        stream: ByteStream,
        subscribers: Vec<EventHandler>,
    ) -> Result<Arc<Sender>, TransferError> {
        let sender = Arc::new(Sender::new(connection_id.to_string(), stream));
        for handler in subscribers {
            sender.subscribe(handler);
        }

        {
            let mut senders = self
                .senders
                .lock()
                .expect("transfer manager registry lock poisoned");
            if senders.contains_key(connection_id) {
                drop(senders);
                self.notify(
                    &Event::new(
                        EventKind::SenderCreationFailed,
                        format!("connection id {connection_id:?} already in use"),
                    )
                    .attr("connection_id", connection_id),
                );
                return Err(TransferError::DuplicateConnection(connection_id.to_string()));
            }
            senders.insert(connection_id.to_string(), Arc::clone(&sender));
        }

        self.notify_sender(
            &sender,
            Event::new(EventKind::SenderCreated, "sender created")
                .attr("connection_id", connection_id),
        );
        Ok(sender)
    }

    /// Atomically look up and claim the sender registered under `connection_id`
    ///
    /// On hit the entry is removed from the registry, so a concurrent second
    /// claim gets `SenderNotFound`. On miss this fails immediately; it never
    /// waits for a sender to arrive.
    pub fn claim(&self, connection_id: &str) -> Result<Arc<Sender>, TransferError> {
        let claimed = self
            .senders
            .lock()
            .expect("transfer manager registry lock poisoned")
            .remove(connection_id);

        match claimed {
            Some(sender) => Ok(sender),
            None => {
                self.notify(
                    &Event::new(EventKind::SenderNotFound, "sender not found")
                        .attr("connection_id", connection_id),
                );
                Err(TransferError::SenderNotFound(connection_id.to_string()))
            }
        }
    }

    /// Remove a registry entry; double removal is a no-op
    pub fn remove(&self, connection_id: &str) -> Option<Arc<Sender>> {
        self.senders
            .lock()
            .expect("transfer manager registry lock poisoned")
            .remove(connection_id)
    }

    /// Remove an unclaimed sender and release its stream (timeout cleanup)
    ///
    /// Returns `false` when the id was already claimed or removed, in which
    /// case nothing is touched: the record now belongs to the relay.
    pub async fn expire(&self, connection_id: &str) -> bool {
        let Some(sender) = self.remove(connection_id) else {
            return false;
        };
        sender.discard_stream().await;
        self.close_reported(&sender);
        true
    }

    /// Number of currently pending senders
    pub fn pending_count(&self) -> usize {
        self.senders
            .lock()
            .expect("transfer manager registry lock poisoned")
            .len()
    }

    /// Whether a sender is currently registered under `connection_id`
    pub fn is_pending(&self, connection_id: &str) -> bool {
        self.senders
            .lock()
            .expect("transfer manager registry lock poisoned")
            .contains_key(connection_id)
    }

    /// Dispatch an event to manager-wide subscribers only
    pub fn notify(&self, event: &Event) {
        let handlers = self
            .handlers
            .lock()
            .expect("transfer manager handler lock poisoned")
            .clone();
        for handler in &handlers {
            handler(event);
        }
    }

    /// Dispatch to the record's scoped subscribers, then manager-wide
    ///
    /// The manager-wide copy carries a `connection_id` attribute so global
    /// subscribers can tell connections apart.
    pub fn notify_sender(&self, sender: &Sender, event: Event) {
        sender.dispatch(&event);
        let tagged = if event.get("connection_id").is_some() {
            event
        } else {
            event.attr("connection_id", sender.connection_id())
        };
        self.notify(&tagged);
    }

    /// Close a record, reporting (not failing on) a double close
    pub(crate) fn close_reported(&self, sender: &Sender) {
        if let Err(err) = sender.close() {
            self.notify(
                &Event::new(EventKind::TransferError, err.to_string())
                    .attr("connection_id", sender.connection_id()),
            );
        }
    }
}

impl Default for TransferManager {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_WAIT)
    }
}
