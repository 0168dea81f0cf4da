use std::fmt;

/// Errors produced while decoding a frame.
///
/// `PacketTooShort` and `IncompletePayload` mean more bytes are needed;
/// a stream reader keeps accumulating on those and treats everything
/// else as a corrupt frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    PacketTooShort { expected: usize, got: usize },
    IncompletePayload { expected: usize, got: usize },
    UnknownPacketId(u8),
    InvalidUtf8,
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PacketTooShort { expected, got } => {
                write!(f, "packet too short: need {expected} bytes, have {got}")
            }
            Self::IncompletePayload { expected, got } => {
                write!(f, "incomplete payload: need {expected} bytes, have {got}")
            }
            Self::UnknownPacketId(id) => write!(f, "unknown packet id 0x{id:02x}"),
            Self::InvalidUtf8 => f.write_str("string field is not valid UTF-8"),
        }
    }
}

impl std::error::Error for ProtocolError {}
