//! Beam relay server binary

mod args;
mod constants;
mod duration;
mod handlers;
mod routes;

use std::process;
use std::sync::Arc;

use actix_web::{App, HttpServer, web};
use clap::Parser;

use beam_core::{Event, EventKind, TransferManager};

use crate::args::Args;
use crate::constants::{MSG_BAD_WAIT, MSG_BANNER, MSG_LISTENING};
use crate::duration::parse_wait;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(if args.debug {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .init();

    let max_wait = match parse_wait(Some(&args.max_wait)) {
        Ok(Some(duration)) => duration,
        _ => {
            eprintln!("--max-wait: {MSG_BAD_WAIT}");
            process::exit(1);
        }
    };

    println!("{}{}", MSG_BANNER, env!("CARGO_PKG_VERSION"));

    let manager = web::Data::new(TransferManager::new(max_wait));
    manager.subscribe(Arc::new(log_event));

    println!("{}{}:{}", MSG_LISTENING, args.bind, args.port);

    HttpServer::new({
        let manager = manager.clone();
        move || {
            App::new()
                .app_data(manager.clone())
                .configure(routes::configure)
        }
    })
    .bind((args.bind, args.port))?
    .run()
    .await
}

/// Map engine events onto log levels; per-chunk byte updates only show
/// under `--debug`.
fn log_event(event: &Event) {
    let attrs = event
        .attrs()
        .iter()
        .map(|(key, value)| format!(" {key}={value}"))
        .collect::<String>();

    match event.kind {
        EventKind::TransferStarted | EventKind::TransferFinished => {
            log::info!("{}{attrs}", event.message);
        }
        EventKind::TransferError | EventKind::SenderCreationFailed | EventKind::SenderNotFound => {
            log::warn!("{}{attrs}", event.message);
        }
        _ => log::debug!("{}{attrs}", event.message),
    }
}
