//! Beam Core Library
//!
//! In-memory rendezvous engine for point-to-point transfers: an uploader
//! registers a byte stream under a connection id, a downloader claims the
//! same id, and the relay streams the bytes across without persisting them.

pub mod error;
pub mod events;
pub mod manager;
pub mod relay;
pub mod sender;
pub mod wait;

pub use error::TransferError;
pub use events::{Event, EventHandler, EventKind};
pub use manager::TransferManager;
pub use relay::{CHUNK_SIZE, relay, start_transfer};
pub use sender::{ByteStream, Sender};
pub use wait::{Waiter, register_and_wait};

use std::time::Duration;

/// Default wait duration for an uploader with no `wait` parameter
pub const DEFAULT_WAIT: Duration = Duration::from_secs(30);

/// Default server-wide ceiling on the uploader wait duration
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(120);
