//! Wire protocol for the huddle relay.
//!
//! Every frame is `[packet_id: u8][payload_len: u16][payload...]` with
//! big-endian integers. Signaling payloads (SDP offers/answers, ICE
//! candidates) are opaque byte blobs occupying the tail of the frame;
//! the relay never inspects them.

pub mod error;
pub(crate) mod io;
pub mod packet;
pub mod packet_id;

pub use error::ProtocolError;
pub use packet::{Packet, UserEntry};
