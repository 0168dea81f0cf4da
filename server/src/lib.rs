//! Presence and WebRTC signaling relay.
//!
//! Clients connect over TCP, announce a display name, exchange chat
//! messages broadcast to everyone, and negotiate peer-to-peer audio
//! sessions grouped into named voice channels. The server never touches
//! media; it brokers opaque negotiation payloads between members of the
//! same channel and keeps every client's view of membership consistent
//! under join/leave/disconnect churn.

pub mod broadcast;
pub mod config;
pub mod error;
pub mod handler;
pub mod presence;
pub mod server;
pub mod state;
pub mod voice;

pub use error::ServerError;
pub use server::RelayServer;
pub use state::{ClientId, RelayState, SignalKind};
