//! Uploader endpoint: POST /send/{connection_id}?wait=<duration>

use std::io;
use std::sync::Arc;

use actix_web::{HttpResponse, post, rt, web};
use bytes::Bytes;
use futures_util::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::{ReceiverStream, UnboundedReceiverStream};
use tokio_util::io::StreamReader;

use beam_core::sender::ByteStream;
use beam_core::{DEFAULT_WAIT, Event, EventHandler, EventKind, TransferManager, Waiter};

use crate::constants::{BODY_CHANNEL_DEPTH, MSG_BAD_WAIT};
use crate::duration::parse_wait;

#[derive(Debug, Deserialize)]
pub struct SendQuery {
    wait: Option<String>,
}

/// Register the request body as a pending sender and stream progress lines
/// back until the transfer finishes, errors, or times out waiting for a
/// receiver.
#[post("/send/{connection_id}")]
pub async fn send(
    path: web::Path<String>,
    query: web::Query<SendQuery>,
    payload: web::Payload,
    manager: web::Data<TransferManager>,
) -> HttpResponse {
    let connection_id = path.into_inner();

    let wait = match parse_wait(query.wait.as_deref()) {
        Ok(Some(duration)) => duration,
        Ok(None) => DEFAULT_WAIT,
        Err(()) => return HttpResponse::BadRequest().body(MSG_BAD_WAIT),
    };
    if let Err(err) = manager.check_wait(wait) {
        return HttpResponse::BadRequest().body(err.to_string());
    }

    // Bridge the (non-Send) actix payload into a Send byte stream the
    // registry can own: a local pump task feeds a channel, and the record
    // reads from the channel's StreamReader side.
    let (body_tx, body_rx) = mpsc::channel::<io::Result<Bytes>>(BODY_CHANNEL_DEPTH);
    rt::spawn(pump_payload(payload, body_tx));
    let stream: ByteStream = Box::new(StreamReader::new(ReceiverStream::new(body_rx)));

    // Progress lines flowing back to the uploader as the relay reports
    // cumulative byte counts.
    let (line_tx, line_rx) = mpsc::unbounded_channel::<io::Result<Bytes>>();
    let progress_tx = line_tx.clone();
    let progress: EventHandler = Arc::new(move |event: &Event| {
        if event.kind == EventKind::TransferBytesUpdate {
            let _ = progress_tx.send(Ok(Bytes::from(format!("\r{}", event.message))));
        }
    });

    let (wait_handler, waiter) = Waiter::handler();
    let sender = match manager.new_sender_with_subscribers(
        &connection_id,
        stream,
        vec![wait_handler, progress],
    ) {
        Ok(sender) => sender,
        Err(err) => return HttpResponse::BadRequest().body(err.to_string()),
    };

    log::info!(
        "sender active: connection_id={connection_id} wait={}s",
        wait.as_secs()
    );
    let _ = line_tx.send(Ok(Bytes::from(format!(
        "waiting for receiver (timeout {}s)\n",
        wait.as_secs()
    ))));

    let manager = manager.into_inner();
    rt::spawn(async move {
        let line = match waiter.wait_for_receiver(&manager, &sender, wait).await {
            Ok(bytes) => format!("\rtransfer complete: {bytes} bytes\n"),
            Err(err) => format!("\r{err}\n"),
        };
        let _ = line_tx.send(Ok(Bytes::from(line)));
        // line_tx and the record drop here; once the progress subscriber
        // goes with the record, the response body ends.
    });

    HttpResponse::Ok()
        .content_type("text/plain; charset=utf-8")
        .streaming(UnboundedReceiverStream::new(line_rx))
}

/// Forward request body chunks into the bridge channel
///
/// Stops when the body ends, errors, or the core side drops the stream
/// (timeout or receiver disconnect) - the channel send failing is how
/// backpressure and cancellation reach the uploader's request.
async fn pump_payload(mut payload: web::Payload, tx: mpsc::Sender<io::Result<Bytes>>) {
    while let Some(chunk) = payload.next().await {
        let chunk = chunk.map_err(io::Error::other);
        let failed = chunk.is_err();
        if tx.send(chunk).await.is_err() || failed {
            break;
        }
    }
}
