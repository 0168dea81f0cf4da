//! Error types for the huddle server.

use thiserror::Error;

use crate::state::ClientId;

/// Errors that can occur in the server.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] huddle_protocol::ProtocolError),

    #[error("unknown client: {0}")]
    UnknownClient(ClientId),
}
