//! Server messages and tuning constants

/// Default port to listen on
pub const DEFAULT_PORT: u16 = 3000;

/// Startup banner, printed ahead of the version number
pub const MSG_BANNER: &str = r"
 ____  _____    _    __  __
| __ )| ____|  / \  |  \/  |
|  _ \|  _|   / _ \ | |\/| |
| |_) | |___ / ___ \| |  | |
|____/|_____/_/   \_\_|  |_|

Beam Relay Server v";

/// Printed before the listen address once the server is up
pub const MSG_LISTENING: &str = "HTTP server listening on ";

/// Client error for an unparseable `wait` query parameter
pub const MSG_BAD_WAIT: &str = "bad wait time, must be a duration like 30s, 5m or 1h";

/// Capacity of the duplex pipe between the relay and the receiver's
/// response body. Large enough that the 256-byte relay chunks never stall
/// on a briefly slow client.
pub const RELAY_BUFFER_SIZE: usize = 64 * 1024;

/// Depth of the channel bridging the uploader's request body into the
/// registry's byte stream. Small: backpressure should reach the uploader.
pub const BODY_CHANNEL_DEPTH: usize = 8;
