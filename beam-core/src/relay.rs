//! The streaming copy loop from a claimed sender to a receiver sink
//!
//! Bytes are moved in small fixed-size chunks with an immediate flush after
//! every write, so the receiver sees progress without waiting for
//! end-of-stream. The receiver's cancellation signal is raced against every
//! read via `tokio::select!`, so the loop never blocks indefinitely on a
//! sender once the receiver has disconnected.

use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::oneshot;

use crate::error::TransferError;
use crate::events::{Event, EventKind};
use crate::manager::TransferManager;
use crate::sender::Sender;

/// Chunk size for the relay loop
///
/// Small on purpose: end-to-end latency and responsive progress reporting
/// matter more here than throughput-optimal buffers.
pub const CHUNK_SIZE: usize = 256;

/// Claim the sender registered under `connection_id` and drain it into `sink`
///
/// The caller-visible `SenderNotFound` means no uploader is currently
/// waiting under this id. `cancel` should resolve when the receiver's own
/// request lifecycle ends; dropping its sender half counts as cancellation.
pub async fn start_transfer<W>(
    manager: &TransferManager,
    connection_id: &str,
    sink: &mut W,
    cancel: oneshot::Receiver<()>,
) -> Result<u64, TransferError>
where
    W: AsyncWrite + Unpin,
{
    let sender = manager.claim(connection_id)?;
    relay(manager, &sender, sink, cancel).await
}

/// Drain an already-claimed sender into `sink`
///
/// Emits `TransferStarted`, a `TransferBytesUpdate` per chunk with the
/// cumulative count, and exactly one terminal `TransferFinished` or
/// `TransferError`. On any exit path the sender's stream is dropped, the
/// record closed, and the registry entry removed.
pub async fn relay<W>(
    manager: &TransferManager,
    sender: &Sender,
    sink: &mut W,
    mut cancel: oneshot::Receiver<()>,
) -> Result<u64, TransferError>
where
    W: AsyncWrite + Unpin,
{
    // Transfer lock held for the whole drain; the stream is taken out so a
    // later lock holder finds it gone.
    let mut guard = sender.lock_for_transfer().await;
    let Some(mut stream) = guard.take() else {
        return Err(fail(manager, sender, TransferError::AlreadyClosed));
    };

    manager.notify_sender(
        sender,
        Event::new(EventKind::TransferStarted, "transfer started"),
    );

    let mut buf = [0u8; CHUNK_SIZE];
    let mut transferred: u64 = 0;

    loop {
        // A dropped cancel sender counts as cancellation too: the receiver's
        // request context is gone either way.
        let read = tokio::select! {
            _ = &mut cancel => None,
            res = stream.read(&mut buf) => Some(res),
        };

        let n = match read {
            None => return Err(fail(manager, sender, TransferError::Cancelled)),
            Some(Ok(0)) => break,
            Some(Ok(n)) => n,
            Some(Err(e)) => return Err(fail(manager, sender, TransferError::Read(e))),
        };

        if let Err(e) = sink.write_all(&buf[..n]).await {
            return Err(fail(manager, sender, TransferError::Write(e)));
        }
        if let Err(e) = sink.flush().await {
            return Err(fail(manager, sender, TransferError::Write(e)));
        }

        transferred += n as u64;
        manager.notify_sender(
            sender,
            Event::new(
                EventKind::TransferBytesUpdate,
                format!("written {transferred} bytes"),
            )
            .attr("bytes", transferred.to_string()),
        );
    }

    if let Err(e) = sink.flush().await {
        return Err(fail(manager, sender, TransferError::Write(e)));
    }

    drop(stream);
    manager.close_reported(sender);
    manager.remove(sender.connection_id());
    manager.notify_sender(
        sender,
        Event::new(
            EventKind::TransferFinished,
            format!("transferred {transferred} bytes"),
        )
        .attr("bytes", transferred.to_string()),
    );

    Ok(transferred)
}

/// Terminal-error cleanup: emit `TransferError`, close, deregister
fn fail(manager: &TransferManager, sender: &Sender, err: TransferError) -> TransferError {
    manager.notify_sender(
        sender,
        Event::new(EventKind::TransferError, err.to_string()),
    );
    manager.close_reported(sender);
    manager.remove(sender.connection_id());
    err
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sender::ByteStream;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, duplex};

    fn make_stream(data: Vec<u8>) -> ByteStream {
        Box::new(std::io::Cursor::new(data))
    }

    /// Collect every (kind, bytes attr) pair seen manager-wide
    fn collect_events(manager: &TransferManager) -> Arc<Mutex<Vec<(EventKind, Option<u64>)>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        manager.subscribe(Arc::new(move |event: &Event| {
            let bytes = event.get("bytes").and_then(|b| b.parse().ok());
            sink.lock().unwrap().push((event.kind, bytes));
        }));
        seen
    }

    #[tokio::test]
    async fn test_transfer_byte_fidelity() {
        let manager = TransferManager::default();
        let payload: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        manager.new_sender("abc", make_stream(payload.clone())).unwrap();

        let (mut sink, mut out) = duplex(64 * 1024);
        let reader = tokio::spawn(async move {
            let mut received = Vec::new();
            out.read_to_end(&mut received).await.unwrap();
            received
        });

        let (_cancel_tx, cancel_rx) = oneshot::channel();
        let transferred = start_transfer(&manager, "abc", &mut sink, cancel_rx)
            .await
            .unwrap();
        drop(sink);

        assert_eq!(transferred, payload.len() as u64);
        assert_eq!(reader.await.unwrap(), payload);
        assert_eq!(manager.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_event_ordering_and_progress_counts() {
        let manager = TransferManager::default();
        let seen = collect_events(&manager);

        const N: usize = 1024 * 1024;
        manager.new_sender("abc", make_stream(vec![0xAB; N])).unwrap();

        let (mut sink, mut out) = duplex(64 * 1024);
        let reader = tokio::spawn(async move {
            let mut received = Vec::new();
            out.read_to_end(&mut received).await.unwrap();
            received.len()
        });

        let (_cancel_tx, cancel_rx) = oneshot::channel();
        let transferred = start_transfer(&manager, "abc", &mut sink, cancel_rx)
            .await
            .unwrap();
        drop(sink);

        assert_eq!(transferred, N as u64);
        assert_eq!(reader.await.unwrap(), N);

        let events = seen.lock().unwrap();
        let updates: Vec<u64> = events
            .iter()
            .filter(|(k, _)| *k == EventKind::TransferBytesUpdate)
            .map(|(_, b)| b.unwrap())
            .collect();

        // Cursor reads fill the whole 256-byte chunk, so one update per chunk
        assert_eq!(updates.len(), N / CHUNK_SIZE);
        // Strictly increasing, ending at N
        assert!(updates.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(*updates.last().unwrap(), N as u64);

        // Started before the first update, exactly one terminal event
        let kinds: Vec<EventKind> = events.iter().map(|(k, _)| *k).collect();
        let started_at = kinds
            .iter()
            .position(|k| *k == EventKind::TransferStarted)
            .unwrap();
        let first_update = kinds
            .iter()
            .position(|k| *k == EventKind::TransferBytesUpdate)
            .unwrap();
        assert!(started_at < first_update);

        let finished: Vec<&(EventKind, Option<u64>)> = events
            .iter()
            .filter(|(k, _)| k.is_terminal())
            .collect();
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].0, EventKind::TransferFinished);
        assert_eq!(finished[0].1, Some(N as u64));
    }

    #[tokio::test]
    async fn test_empty_payload() {
        let manager = TransferManager::default();
        let seen = collect_events(&manager);
        manager.new_sender("abc", make_stream(Vec::new())).unwrap();

        let (mut sink, _out) = duplex(1024);
        let (_cancel_tx, cancel_rx) = oneshot::channel();
        let transferred = start_transfer(&manager, "abc", &mut sink, cancel_rx)
            .await
            .unwrap();

        assert_eq!(transferred, 0);
        let events = seen.lock().unwrap();
        assert!(
            events
                .iter()
                .any(|(k, b)| *k == EventKind::TransferFinished && *b == Some(0))
        );
    }

    #[tokio::test]
    async fn test_unknown_id_fails_without_blocking() {
        let manager = TransferManager::default();
        let seen = collect_events(&manager);

        let (mut sink, _out) = duplex(1024);
        let (_cancel_tx, cancel_rx) = oneshot::channel();
        let err = start_transfer(&manager, "y", &mut sink, cancel_rx)
            .await
            .unwrap_err();

        assert!(matches!(err, TransferError::SenderNotFound(id) if id == "y"));
        assert_eq!(
            seen.lock().unwrap().first().map(|(k, _)| *k),
            Some(EventKind::SenderNotFound)
        );
    }

    #[tokio::test]
    async fn test_cancellation_mid_transfer() {
        let manager = TransferManager::default();
        let seen = collect_events(&manager);

        // A source that never reaches EOF: the far write half stays open
        let (mut src_w, src_r) = duplex(64 * 1024);
        manager.new_sender("abc", Box::new(src_r)).unwrap();

        let (mut sink, mut out) = duplex(64 * 1024);
        let reader = tokio::spawn(async move {
            let mut received = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                match out.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => received.extend_from_slice(&buf[..n]),
                }
            }
            received.len()
        });

        let (cancel_tx, cancel_rx) = oneshot::channel();
        let relay_task = {
            let manager = Arc::new(manager);
            let m = Arc::clone(&manager);
            let task = tokio::spawn(async move {
                let err = start_transfer(&m, "abc", &mut sink, cancel_rx)
                    .await
                    .unwrap_err();
                assert!(matches!(err, TransferError::Cancelled));
            });
            (manager, task)
        };
        let (manager, task) = relay_task;

        // Feed some bytes, let them flow, then disconnect the receiver
        use tokio::io::AsyncWriteExt;
        src_w.write_all(&[0x42; 10_000]).await.unwrap();
        src_w.flush().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        cancel_tx.send(()).unwrap();

        task.await.unwrap();
        drop(src_w);
        assert!(reader.await.unwrap() <= 10_000);

        // Terminal error emitted, id removed
        let events = seen.lock().unwrap();
        assert!(events.iter().any(|(k, _)| *k == EventKind::TransferError));
        assert_eq!(manager.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_dropped_cancel_sender_counts_as_cancellation() {
        let manager = TransferManager::default();

        let (_src_w, src_r) = duplex(1024);
        manager.new_sender("abc", Box::new(src_r)).unwrap();

        let (mut sink, _out) = duplex(1024);
        let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
        drop(cancel_tx);

        let err = start_transfer(&manager, "abc", &mut sink, cancel_rx)
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::Cancelled));
    }

    #[tokio::test]
    async fn test_relay_on_consumed_stream_fails() {
        let manager = TransferManager::default();
        manager.new_sender("abc", make_stream(b"data".to_vec())).unwrap();

        let sender = manager.claim("abc").unwrap();
        sender.lock_for_transfer().await.take();

        let (mut sink, _out) = duplex(1024);
        let (_cancel_tx, cancel_rx) = oneshot::channel();
        let err = relay(&manager, &sender, &mut sink, cancel_rx)
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::AlreadyClosed));
    }

    #[tokio::test]
    async fn test_read_error_terminates_transfer() {
        struct FailingRead;
        impl tokio::io::AsyncRead for FailingRead {
            fn poll_read(
                self: std::pin::Pin<&mut Self>,
                _cx: &mut std::task::Context<'_>,
                _buf: &mut tokio::io::ReadBuf<'_>,
            ) -> std::task::Poll<std::io::Result<()>> {
                std::task::Poll::Ready(Err(std::io::Error::other("stream torn")))
            }
        }

        let manager = TransferManager::default();
        let seen = collect_events(&manager);
        manager.new_sender("abc", Box::new(FailingRead)).unwrap();

        let (mut sink, _out) = duplex(1024);
        let (_cancel_tx, cancel_rx) = oneshot::channel();
        let err = start_transfer(&manager, "abc", &mut sink, cancel_rx)
            .await
            .unwrap_err();

        assert!(matches!(err, TransferError::Read(_)));
        let events = seen.lock().unwrap();
        let terminals: Vec<EventKind> = events
            .iter()
            .filter(|(k, _)| k.is_terminal())
            .map(|(k, _)| *k)
            .collect();
        assert_eq!(terminals, vec![EventKind::TransferError]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_transfers_are_independent() {
        let manager = Arc::new(TransferManager::default());

        let payload_a = vec![0xAA; 100_000];
        let payload_b = vec![0xBB; 50_000];
        manager.new_sender("a", make_stream(payload_a.clone())).unwrap();
        manager.new_sender("b", make_stream(payload_b.clone())).unwrap();

        let mut tasks = Vec::new();
        for (id, expected) in [("a", payload_a), ("b", payload_b)] {
            let manager = Arc::clone(&manager);
            tasks.push(tokio::spawn(async move {
                let (mut sink, mut out) = duplex(64 * 1024);
                let reader = tokio::spawn(async move {
                    let mut received = Vec::new();
                    out.read_to_end(&mut received).await.unwrap();
                    received
                });
                let (_cancel_tx, cancel_rx) = oneshot::channel();
                start_transfer(&manager, id, &mut sink, cancel_rx)
                    .await
                    .unwrap();
                drop(sink);
                assert_eq!(reader.await.unwrap(), expected);
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(manager.pending_count(), 0);
    }
}
