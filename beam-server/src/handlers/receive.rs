//! Downloader endpoint: GET /receive/{connection_id}

use std::pin::Pin;
use std::task::{Context, Poll};

use actix_web::{HttpResponse, get, rt, web};
use futures_util::Stream;
use tokio::sync::oneshot;
use tokio_util::io::ReaderStream;

use beam_core::{Event, EventKind, TransferManager, relay};

use crate::constants::RELAY_BUFFER_SIZE;

/// Claim the pending sender under this id and stream its bytes out
///
/// A miss is an immediate client error - claiming never waits for an
/// uploader to arrive. On a hit the relay runs against one half of a
/// duplex pipe while the other half becomes the response body; dropping
/// the body (client disconnect) fires the relay's cancellation signal.
#[get("/receive/{connection_id}")]
pub async fn receive(
    path: web::Path<String>,
    manager: web::Data<TransferManager>,
) -> HttpResponse {
    let connection_id = path.into_inner();

    log::info!("receiver active: connection_id={connection_id}");
    manager.notify(
        &Event::new(EventKind::ReceiverCreated, "receiver connected")
            .attr("connection_id", connection_id.clone()),
    );

    let sender = match manager.claim(&connection_id) {
        Ok(sender) => sender,
        Err(err) => return HttpResponse::BadRequest().body(err.to_string()),
    };

    let (cancel_tx, cancel_rx) = oneshot::channel();
    let (mut sink, source) = tokio::io::duplex(RELAY_BUFFER_SIZE);

    let manager = manager.into_inner();
    rt::spawn(async move {
        if let Err(err) = relay(&manager, &sender, &mut sink, cancel_rx).await {
            log::warn!(
                "relay aborted: connection_id={} err={err}",
                sender.connection_id()
            );
        }
    });

    HttpResponse::Ok()
        .content_type("application/octet-stream")
        .streaming(CancelOnDrop::new(ReaderStream::new(source), cancel_tx))
}

/// Response body wrapper that fires a cancellation signal when dropped
///
/// actix drops the body stream when the client disconnects; the oneshot
/// send unblocks the relay's read loop so it aborts within one read cycle
/// instead of pushing bytes at a dead connection.
struct CancelOnDrop<S> {
    inner: S,
    cancel: Option<oneshot::Sender<()>>,
}

impl<S> CancelOnDrop<S> {
    fn new(inner: S, cancel: oneshot::Sender<()>) -> Self {
        Self {
            inner,
            cancel: Some(cancel),
        }
    }
}

impl<S: Stream + Unpin> Stream for CancelOnDrop<S> {
    type Item = S::Item;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

impl<S> Drop for CancelOnDrop<S> {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn test_cancel_fires_on_drop() {
        let (cancel_tx, mut cancel_rx) = oneshot::channel();
        let body = CancelOnDrop::new(futures_util::stream::empty::<u8>(), cancel_tx);

        assert!(cancel_rx.try_recv().is_err());
        drop(body);
        assert!(cancel_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_delegates_to_inner_stream() {
        let (cancel_tx, _cancel_rx) = oneshot::channel();
        let mut body = CancelOnDrop::new(futures_util::stream::iter(vec![1u8, 2, 3]), cancel_tx);

        let mut seen = Vec::new();
        while let Some(item) = body.next().await {
            seen.push(item);
        }
        assert_eq!(seen, vec![1, 2, 3]);
    }
}
