use crate::error::ProtocolError;
use crate::io::{Reader, Writer};
use crate::packet_id::PacketId;

/// One entry of a presence or voice-channel membership list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserEntry {
    pub id: u64,
    pub display_name: String,
}

impl UserEntry {
    #[must_use]
    pub fn new(id: u64, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
        }
    }

    fn write(&self, w: &mut Writer) {
        w.write_u64(self.id);
        w.write_string(&self.display_name);
    }

    fn read(r: &mut Reader) -> Result<Self, ProtocolError> {
        Ok(Self {
            id: r.read_u64()?,
            display_name: r.read_string()?,
        })
    }
}

/// Protocol packet types for client-server communication.
///
/// Requests flow client to server, events flow server to client.
/// The `payload` fields of the WebRTC variants are opaque negotiation
/// blobs; the server forwards them without inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Packet {
    // Requests
    Join {
        display_name: String,
    },
    ChatMessage {
        message: String,
    },
    JoinVoiceChannel {
        channel: String,
    },
    LeaveVoiceChannel,
    WebrtcOffer {
        target_id: u64,
        payload: Vec<u8>,
    },
    WebrtcAnswer {
        target_id: u64,
        payload: Vec<u8>,
    },
    WebrtcIceCandidate {
        target_id: u64,
        payload: Vec<u8>,
    },
    Ping {
        nonce: u64,
    },

    // Events
    UserJoined {
        user: UserEntry,
    },
    UserDisconnected {
        user: UserEntry,
    },
    UserList {
        users: Vec<UserEntry>,
    },
    ChatBroadcast {
        sender: UserEntry,
        timestamp: u64,
        message: String,
    },
    UserJoinedVoice {
        user: UserEntry,
    },
    UserLeftVoice {
        user: UserEntry,
    },
    VoiceUserList {
        channel: String,
        members: Vec<UserEntry>,
    },
    OfferRelayed {
        sender: UserEntry,
        payload: Vec<u8>,
    },
    AnswerRelayed {
        sender_id: u64,
        payload: Vec<u8>,
    },
    IceCandidateRelayed {
        sender_id: u64,
        payload: Vec<u8>,
    },
    Error {
        message: String,
    },
    Pong {
        nonce: u64,
    },
}

fn write_entries(w: &mut Writer, entries: &[UserEntry]) {
    w.write_u16(entries.len().try_into().expect("too many users"));
    for e in entries {
        e.write(w);
    }
}

fn read_entries(r: &mut Reader) -> Result<Vec<UserEntry>, ProtocolError> {
    let count = r.read_u16()? as usize;
    let mut entries = Vec::with_capacity(count);
    for _ in 0..count {
        entries.push(UserEntry::read(r)?);
    }
    Ok(entries)
}

impl Packet {
    /// Encode packet to wire format.
    ///
    /// Format: `[packet_id: u8][payload_len: u16][payload...]`
    ///
    /// # Panics
    /// Panics if the payload exceeds 65535 bytes or a user list exceeds
    /// 65535 entries.
    #[must_use]
    #[allow(clippy::too_many_lines)]
    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.write_u8(self.id());

        let len_pos = w.reserve_u16();
        let payload_start = w.position();

        match self {
            Self::Join { display_name } => w.write_string(display_name),
            Self::ChatMessage { message } => w.write_string(message),
            Self::JoinVoiceChannel { channel } => w.write_string(channel),
            Self::LeaveVoiceChannel => {}
            Self::WebrtcOffer { target_id, payload }
            | Self::WebrtcAnswer { target_id, payload }
            | Self::WebrtcIceCandidate { target_id, payload } => {
                w.write_u64(*target_id);
                w.write_bytes(payload);
            }
            Self::Ping { nonce } | Self::Pong { nonce } => w.write_u64(*nonce),
            Self::UserJoined { user }
            | Self::UserDisconnected { user }
            | Self::UserJoinedVoice { user }
            | Self::UserLeftVoice { user } => user.write(&mut w),
            Self::UserList { users } => write_entries(&mut w, users),
            Self::ChatBroadcast {
                sender,
                timestamp,
                message,
            } => {
                sender.write(&mut w);
                w.write_u64(*timestamp);
                w.write_string(message);
            }
            Self::VoiceUserList { channel, members } => {
                w.write_string(channel);
                write_entries(&mut w, members);
            }
            Self::OfferRelayed { sender, payload } => {
                sender.write(&mut w);
                w.write_bytes(payload);
            }
            Self::AnswerRelayed { sender_id, payload }
            | Self::IceCandidateRelayed { sender_id, payload } => {
                w.write_u64(*sender_id);
                w.write_bytes(payload);
            }
            Self::Error { message } => w.write_string(message),
        }

        w.write_u16_at(
            len_pos,
            (w.position() - payload_start)
                .try_into()
                .expect("payload too large"),
        );
        w.into_vec()
    }

    /// Decode packet from wire format.
    ///
    /// Returns the decoded packet and the number of bytes consumed from
    /// the buffer, allowing packets to be peeled off a stream buffer.
    ///
    /// # Errors
    /// Returns an error if the buffer is incomplete or contains invalid
    /// data.
    pub fn decode(buf: &[u8]) -> Result<(Self, usize), ProtocolError> {
        let mut header = Reader::new(buf);
        let packet_id = PacketId::try_from(header.read_u8()?)?;
        let payload_len = header.read_u16()? as usize;
        let remaining = header.remaining();

        if remaining.len() < payload_len {
            return Err(ProtocolError::IncompletePayload {
                expected: payload_len,
                got: remaining.len(),
            });
        }

        let mut r = Reader::new(&remaining[..payload_len]);

        let packet = match packet_id {
            PacketId::Join => Self::Join {
                display_name: r.read_string()?,
            },
            PacketId::ChatMessage => Self::ChatMessage {
                message: r.read_string()?,
            },
            PacketId::JoinVoiceChannel => Self::JoinVoiceChannel {
                channel: r.read_string()?,
            },
            PacketId::LeaveVoiceChannel => Self::LeaveVoiceChannel,
            PacketId::WebrtcOffer => Self::WebrtcOffer {
                target_id: r.read_u64()?,
                payload: r.remaining().to_vec(),
            },
            PacketId::WebrtcAnswer => Self::WebrtcAnswer {
                target_id: r.read_u64()?,
                payload: r.remaining().to_vec(),
            },
            PacketId::WebrtcIceCandidate => Self::WebrtcIceCandidate {
                target_id: r.read_u64()?,
                payload: r.remaining().to_vec(),
            },
            PacketId::Ping => Self::Ping {
                nonce: r.read_u64()?,
            },
            PacketId::UserJoined => Self::UserJoined {
                user: UserEntry::read(&mut r)?,
            },
            PacketId::UserDisconnected => Self::UserDisconnected {
                user: UserEntry::read(&mut r)?,
            },
            PacketId::UserList => Self::UserList {
                users: read_entries(&mut r)?,
            },
            PacketId::ChatBroadcast => Self::ChatBroadcast {
                sender: UserEntry::read(&mut r)?,
                timestamp: r.read_u64()?,
                message: r.read_string()?,
            },
            PacketId::UserJoinedVoice => Self::UserJoinedVoice {
                user: UserEntry::read(&mut r)?,
            },
            PacketId::UserLeftVoice => Self::UserLeftVoice {
                user: UserEntry::read(&mut r)?,
            },
            PacketId::VoiceUserList => Self::VoiceUserList {
                channel: r.read_string()?,
                members: read_entries(&mut r)?,
            },
            PacketId::OfferRelayed => Self::OfferRelayed {
                sender: UserEntry::read(&mut r)?,
                payload: r.remaining().to_vec(),
            },
            PacketId::AnswerRelayed => Self::AnswerRelayed {
                sender_id: r.read_u64()?,
                payload: r.remaining().to_vec(),
            },
            PacketId::IceCandidateRelayed => Self::IceCandidateRelayed {
                sender_id: r.read_u64()?,
                payload: r.remaining().to_vec(),
            },
            PacketId::Error => Self::Error {
                message: r.read_string()?,
            },
            PacketId::Pong => Self::Pong {
                nonce: r.read_u64()?,
            },
        };

        Ok((packet, header.position() + payload_len))
    }

    /// Returns the packet type ID.
    #[must_use]
    pub fn id(&self) -> u8 {
        match self {
            Self::Join { .. } => PacketId::Join,
            Self::ChatMessage { .. } => PacketId::ChatMessage,
            Self::JoinVoiceChannel { .. } => PacketId::JoinVoiceChannel,
            Self::LeaveVoiceChannel => PacketId::LeaveVoiceChannel,
            Self::WebrtcOffer { .. } => PacketId::WebrtcOffer,
            Self::WebrtcAnswer { .. } => PacketId::WebrtcAnswer,
            Self::WebrtcIceCandidate { .. } => PacketId::WebrtcIceCandidate,
            Self::Ping { .. } => PacketId::Ping,
            Self::UserJoined { .. } => PacketId::UserJoined,
            Self::UserDisconnected { .. } => PacketId::UserDisconnected,
            Self::UserList { .. } => PacketId::UserList,
            Self::ChatBroadcast { .. } => PacketId::ChatBroadcast,
            Self::UserJoinedVoice { .. } => PacketId::UserJoinedVoice,
            Self::UserLeftVoice { .. } => PacketId::UserLeftVoice,
            Self::VoiceUserList { .. } => PacketId::VoiceUserList,
            Self::OfferRelayed { .. } => PacketId::OfferRelayed,
            Self::AnswerRelayed { .. } => PacketId::AnswerRelayed,
            Self::IceCandidateRelayed { .. } => PacketId::IceCandidateRelayed,
            Self::Error { .. } => PacketId::Error,
            Self::Pong { .. } => PacketId::Pong,
        }
        .as_u8()
    }
}
