//! Configuration constants for the huddle server.

use std::env;

/// Default TCP port for the relay.
pub const DEFAULT_PORT: u16 = 3000;

/// Buffer size for a single socket read.
pub const PACKET_BUFFER_SIZE: usize = 4096;

/// Cap on the per-connection reassembly buffer. A client exceeding this
/// is disconnected to prevent memory exhaustion.
pub const MAX_BUFFER_SIZE: usize = 65536;

/// Capacity of the broadcast channel fanning events out to handlers.
pub const BROADCAST_CHANNEL_CAPACITY: usize = 1000;

/// Maximum allowed display name length in bytes.
pub const MAX_DISPLAY_NAME_LEN: usize = 32;

/// Maximum allowed voice channel name length in bytes.
pub const MAX_CHANNEL_NAME_LEN: usize = 64;

/// Maximum allowed chat message length in bytes. The broadcast form
/// adds a sender entry and timestamp to the client's message, so the
/// inbound bound must leave room for both within the u16 frame length.
pub const MAX_CHAT_MESSAGE_LEN: usize = 4096;

/// Maximum allowed negotiation payload length in bytes. Relayed forms
/// add a sender entry; session descriptions run a few KiB at most.
pub const MAX_SIGNAL_PAYLOAD_LEN: usize = 32768;

/// Returns the listen port from the `HUDDLE_PORT` env var or default.
#[must_use]
pub fn port() -> u16 {
    env::var("HUDDLE_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_PORT)
}
