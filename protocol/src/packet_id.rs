use crate::error::ProtocolError;

/// Declares the id byte for every packet type along with the fallible
/// conversion back from the wire.
macro_rules! packet_ids {
    ($($name:ident = $val:expr),* $(,)?) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub(crate) enum PacketId { $($name = $val,)* }

        impl PacketId {
            pub(crate) const fn as_u8(self) -> u8 { self as u8 }

            // Variant paths resolved here, outside the trait impl, where
            // `Error` cannot collide with the `TryFrom` associated type.
            const fn from_u8(value: u8) -> Option<Self> {
                match value {
                    $($val => Some(PacketId::$name),)*
                    _ => None,
                }
            }
        }

        impl TryFrom<u8> for PacketId {
            type Error = ProtocolError;

            fn try_from(value: u8) -> Result<Self, ProtocolError> {
                PacketId::from_u8(value).ok_or(ProtocolError::UnknownPacketId(value))
            }
        }
    };
}

packet_ids! {
    // Requests (0x01-0x1F)
    Join = 0x01,
    ChatMessage = 0x02,
    JoinVoiceChannel = 0x03,
    LeaveVoiceChannel = 0x04,
    WebrtcOffer = 0x05,
    WebrtcAnswer = 0x06,
    WebrtcIceCandidate = 0x07,
    Ping = 0x08,

    // Events (0x40-0x5F)
    UserJoined = 0x41,
    UserDisconnected = 0x42,
    UserList = 0x43,
    ChatBroadcast = 0x44,
    UserJoinedVoice = 0x45,
    UserLeftVoice = 0x46,
    VoiceUserList = 0x47,
    OfferRelayed = 0x48,
    AnswerRelayed = 0x49,
    IceCandidateRelayed = 0x4A,
    Error = 0x4B,
    Pong = 0x4C,
}
