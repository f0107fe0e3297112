//! Sender record: one pending or active upload
//!
//! A `Sender` owns the uploader's byte stream until the relay drains it (or
//! the wait deadline discards it). The stream lives inside an async mutex
//! that doubles as the per-record transfer lock, so only one relay
//! invocation can ever be reading it. The registry's map lock is never held
//! while this lock is.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::io::AsyncRead;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard};

use crate::error::TransferError;
use crate::events::{Event, EventHandler};

/// The uploader's readable byte stream, exclusively owned by its record
pub type ByteStream = Box<dyn AsyncRead + Send + Unpin>;

/// Registry entry for one pending/active upload
pub struct Sender {
    connection_id: String,
    /// Transfer lock and stream ownership in one: the drain loop takes the
    /// stream out, so a later lock holder finds `None` and must surface a
    /// terminal error rather than silently succeed.
    stream: AsyncMutex<Option<ByteStream>>,
    closed: AtomicBool,
    subscribers: Mutex<Vec<EventHandler>>,
}

impl Sender {
    pub(crate) fn new(connection_id: String, stream: ByteStream) -> Self {
        Self {
            connection_id,
            stream: AsyncMutex::new(Some(stream)),
            closed: AtomicBool::new(false),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// The caller-supplied connection identifier
    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    /// Register a handler scoped to this record's events
    ///
    /// Handlers fire in registration order and are never removed; they live
    /// as long as the record does.
    pub fn subscribe(&self, handler: EventHandler) {
        self.subscribers
            .lock()
            .expect("sender subscriber lock poisoned")
            .push(handler);
    }

    /// Acquire the per-record transfer lock
    ///
    /// A second concurrent relay for the same record blocks here; once it
    /// acquires the guard the stream has already been taken, so the `None`
    /// it finds is its signal to fail with `AlreadyClosed`.
    pub async fn lock_for_transfer(&self) -> MutexGuard<'_, Option<ByteStream>> {
        self.stream.lock().await
    }

    /// Mark the record closed exactly once
    ///
    /// A repeated call reports `AlreadyClosed`; callers forward that to the
    /// event bus and discard it rather than treating it as fatal.
    pub fn close(&self) -> Result<(), TransferError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(TransferError::AlreadyClosed);
        }
        Ok(())
    }

    /// Whether the record has been closed
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Drop the owned stream without draining it (timeout cleanup path)
    pub(crate) async fn discard_stream(&self) {
        self.stream.lock().await.take();
    }

    /// Invoke this record's scoped subscribers, in registration order
    pub(crate) fn dispatch(&self, event: &Event) {
        let handlers = self
            .subscribers
            .lock()
            .expect("sender subscriber lock poisoned")
            .clone();
        for handler in &handlers {
            handler(event);
        }
    }
}

impl std::fmt::Debug for Sender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sender")
            .field("connection_id", &self.connection_id)
            .field("closed", &self.is_closed())
            .finish()
    }
}
