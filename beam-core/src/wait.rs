//! Uploader-side wait: a deadline raced against the transfer lifecycle
//!
//! After registering, the uploader blocks on a select between the wait
//! deadline and `TransferStarted`. Once a receiver has claimed the record
//! the deadline no longer applies: an active transfer is never abandoned
//! mid-stream. A deadline that fires with the record still unclaimed
//! removes it from the registry and closes its stream, so the id becomes
//! immediately reusable and nothing leaks.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::error::TransferError;
use crate::events::{Event, EventHandler, EventKind};
use crate::manager::TransferManager;
use crate::sender::{ByteStream, Sender};

/// Lifecycle observations forwarded out of the event bus
enum WaitEvent {
    Started,
    Finished(u64),
    Failed(String),
}

/// Receiving half of a scoped subscription, consumed by the wait
pub struct Waiter {
    rx: mpsc::UnboundedReceiver<WaitEvent>,
}

impl Waiter {
    /// Build the scoped event handler and the waiter that consumes it
    ///
    /// Pass the handler to `new_sender_with_subscribers` so it is attached
    /// before the record becomes claimable.
    pub fn handler() -> (EventHandler, Waiter) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handler: EventHandler = Arc::new(move |event: &Event| {
            let msg = match event.kind {
                EventKind::TransferStarted => WaitEvent::Started,
                EventKind::TransferFinished => WaitEvent::Finished(
                    event
                        .get("bytes")
                        .and_then(|b| b.parse().ok())
                        .unwrap_or(0),
                ),
                EventKind::TransferError => WaitEvent::Failed(event.message.clone()),
                _ => return,
            };
            let _ = tx.send(msg);
        });
        (handler, Waiter { rx })
    }

    /// Block until a receiver claims the sender or the deadline elapses
    ///
    /// Returns the final byte count on success, `Timeout` if no receiver
    /// arrived in time (with the stale record cleaned up), or `Failed` if
    /// the relay ended with an error.
    pub async fn wait_for_receiver(
        mut self,
        manager: &TransferManager,
        sender: &Sender,
        wait: Duration,
    ) -> Result<u64, TransferError> {
        let deadline = tokio::time::sleep(wait);
        tokio::pin!(deadline);

        tokio::select! {
            _ = &mut deadline => {
                // Claim race at the deadline: if the record is gone, a
                // receiver has it and the transfer must run to completion.
                if manager.expire(sender.connection_id()).await {
                    return Err(TransferError::Timeout { waited: wait });
                }
            }
            msg = self.rx.recv() => match msg {
                Some(WaitEvent::Started) => {}
                Some(WaitEvent::Finished(bytes)) => return Ok(bytes),
                Some(WaitEvent::Failed(message)) => return Err(TransferError::Failed(message)),
                None => return Err(TransferError::Failed(
                    "transfer ended without a terminal event".to_string(),
                )),
            }
        }

        // Claimed: wait for the terminal event with no further deadline
        loop {
            match self.rx.recv().await {
                Some(WaitEvent::Finished(bytes)) => return Ok(bytes),
                Some(WaitEvent::Failed(message)) => return Err(TransferError::Failed(message)),
                Some(WaitEvent::Started) => continue,
                None => {
                    return Err(TransferError::Failed(
                        "transfer ended without a terminal event".to_string(),
                    ));
                }
            }
        }
    }
}

/// Register a sender and block until it is drained or the wait elapses
///
/// The uploader-facing entry point: validates `wait` against the ceiling
/// before any registration, attaches the wait subscription atomically with
/// the registration, then waits.
pub async fn register_and_wait(
    manager: &TransferManager,
    connection_id: &str,
    stream: ByteStream,
    wait: Duration,
) -> Result<u64, TransferError> {
    manager.check_wait(wait)?;
    let (handler, waiter) = Waiter::handler();
    let sender = manager.new_sender_with_subscribers(connection_id, stream, vec![handler])?;
    waiter.wait_for_receiver(manager, &sender, wait).await
}
