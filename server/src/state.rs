use huddle_protocol::{Packet, UserEntry};
use tracing::debug;

use crate::broadcast::Recipients;
use crate::error::ServerError;
use crate::presence::PresenceRegistry;
use crate::voice::VoiceChannelTable;

/// Transport-assigned connection identifier. Monotonic, never reused
/// within a process lifetime.
pub type ClientId = u64;

/// Display name used for clients that never announced one.
const ANONYMOUS: &str = "anonymous";

/// Kind of negotiation message being relayed between peers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignalKind {
    Offer,
    Answer,
    IceCandidate,
}

/// One outbound event produced by a state operation. Effects are
/// ordered; handlers publish them in sequence so that, for example,
/// the leave notice of a channel switch always precedes the join
/// notice.
#[derive(Clone, Debug)]
pub struct Outgoing {
    pub recipients: Recipients,
    pub packet: Packet,
}

impl Outgoing {
    fn new(recipients: Recipients, packet: Packet) -> Self {
        Self { recipients, packet }
    }
}

/// Shared relay state: the presence registry plus the voice channel
/// table. All sessions funnel mutations through one `RwLock` around
/// this struct, and every operation is synchronous, so the multi-step
/// invariants (one channel per client, channel members always
/// registered) hold atomically with respect to concurrent sessions.
#[derive(Debug, Default)]
pub struct RelayState {
    registry: PresenceRegistry,
    channels: VoiceChannelTable,
}

impl RelayState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new connection before any join message arrives.
    pub fn connect(&mut self, id: ClientId) {
        self.registry.connect(id);
    }

    fn entry(&self, id: ClientId) -> UserEntry {
        UserEntry::new(
            id,
            self.registry.display_name(id).unwrap_or(ANONYMOUS),
        )
    }

    /// Presence join: records the display name, announces the newcomer
    /// to everyone else, then sends the full membership snapshot to all
    /// clients including the joiner. A duplicate join overwrites the
    /// name and re-broadcasts.
    ///
    /// # Errors
    /// `UnknownClient` if the connection is not registered.
    pub fn join(
        &mut self,
        id: ClientId,
        display_name: String,
    ) -> Result<Vec<Outgoing>, ServerError> {
        if !self.registry.join(id, display_name) {
            return Err(ServerError::UnknownClient(id));
        }

        Ok(vec![
            Outgoing::new(
                Recipients::AllExcept(id),
                Packet::UserJoined {
                    user: self.entry(id),
                },
            ),
            Outgoing::new(
                Recipients::All,
                Packet::UserList {
                    users: self.registry.snapshot(),
                },
            ),
        ])
    }

    /// Chat fan-out: stamps the sender's display name and the given
    /// timestamp, broadcasts to all clients including the sender.
    ///
    /// # Errors
    /// `UnknownClient` if the connection is not registered.
    pub fn chat(
        &mut self,
        id: ClientId,
        message: String,
        timestamp: u64,
    ) -> Result<Vec<Outgoing>, ServerError> {
        if !self.registry.contains(id) {
            return Err(ServerError::UnknownClient(id));
        }

        Ok(vec![Outgoing::new(
            Recipients::All,
            Packet::ChatBroadcast {
                sender: self.entry(id),
                timestamp,
                message,
            },
        )])
    }

    /// Moves the client into the named channel, implicitly leaving any
    /// prior channel first. Leave side effects fire before join side
    /// effects. Rejoining the current channel re-announces membership
    /// to the other members without touching the member set. Clients
    /// that never announced a display name are turned away with an
    /// error, so every channel member is addressable by name.
    ///
    /// # Errors
    /// `UnknownClient` if the connection is not registered.
    pub fn join_channel(
        &mut self,
        id: ClientId,
        channel: &str,
    ) -> Result<Vec<Outgoing>, ServerError> {
        if !self.registry.contains(id) {
            return Err(ServerError::UnknownClient(id));
        }

        if self.registry.display_name(id).is_none() {
            debug!("client {} tried to enter channel {} before joining", id, channel);
            return Ok(vec![Outgoing::new(
                Recipients::One(id),
                Packet::Error {
                    message: "join with a display name before entering a voice channel"
                        .to_string(),
                },
            )]);
        }

        if self.channels.channel_of(id) == Some(channel) {
            debug!("client {} rejoined current channel {}", id, channel);
            let peers = self.channels.members_except(channel, id);
            if peers.is_empty() {
                return Ok(vec![]);
            }
            return Ok(vec![Outgoing::new(
                Recipients::Many(peers),
                Packet::UserJoinedVoice {
                    user: self.entry(id),
                },
            )]);
        }

        let mut out = Vec::new();

        if let Some(old) = self.channels.remove(id) {
            let remaining = self.channels.members(&old);
            if !remaining.is_empty() {
                out.push(Outgoing::new(
                    Recipients::Many(remaining),
                    Packet::UserLeftVoice {
                        user: self.entry(id),
                    },
                ));
            }
        }

        let peers = self.channels.members(channel);
        self.channels.insert(id, channel);

        if !peers.is_empty() {
            out.push(Outgoing::new(
                Recipients::Many(peers),
                Packet::UserJoinedVoice {
                    user: self.entry(id),
                },
            ));
        }

        debug!("client {} joined voice channel {}", id, channel);
        Ok(out)
    }

    /// Explicit channel leave. No-op for a client in no channel.
    pub fn leave_channel(&mut self, id: ClientId) -> Vec<Outgoing> {
        let Some(channel) = self.channels.remove(id) else {
            return vec![];
        };

        debug!("client {} left voice channel {}", id, channel);

        let remaining = self.channels.members(&channel);
        if remaining.is_empty() {
            return vec![];
        }
        vec![Outgoing::new(
            Recipients::Many(remaining),
            Packet::UserLeftVoice {
                user: self.entry(id),
            },
        )]
    }

    /// Forwards an opaque negotiation payload from sender to target.
    ///
    /// Offers are gated on both parties sharing a voice channel; a
    /// mismatch produces an error back to the sender and nothing to
    /// the target. Answers and candidates follow a previously
    /// authorized offer, so they are forwarded without a channel
    /// re-check, but only to targets that have announced a display
    /// name. A target that vanished or never joined drops the message
    /// silently for every kind; negotiation racing a peer's departure
    /// is not an error.
    pub fn relay_signal(
        &mut self,
        sender: ClientId,
        target: ClientId,
        kind: SignalKind,
        payload: Vec<u8>,
    ) -> Vec<Outgoing> {
        if self.registry.display_name(target).is_none() {
            debug!("dropped {:?} from {} to unavailable target {}", kind, sender, target);
            return vec![];
        }

        match kind {
            SignalKind::Offer => {
                let shared = self
                    .channels
                    .channel_of(sender)
                    .is_some_and(|channel| self.channels.channel_of(target) == Some(channel));

                if shared {
                    vec![Outgoing::new(
                        Recipients::One(target),
                        Packet::OfferRelayed {
                            sender: self.entry(sender),
                            payload,
                        },
                    )]
                } else {
                    debug!("rejected offer from {} to {} across channel boundary", sender, target);
                    vec![Outgoing::new(
                        Recipients::One(sender),
                        Packet::Error {
                            message: "cannot establish connection with a user not in the same voice channel".to_string(),
                        },
                    )]
                }
            }
            SignalKind::Answer => vec![Outgoing::new(
                Recipients::One(target),
                Packet::AnswerRelayed {
                    sender_id: sender,
                    payload,
                },
            )],
            SignalKind::IceCandidate => vec![Outgoing::new(
                Recipients::One(target),
                Packet::IceCandidateRelayed {
                    sender_id: sender,
                    payload,
                },
            )],
        }
    }

    /// Composite disconnect cleanup, run exactly once per connection:
    /// leave the voice channel first (so a half-removed client is never
    /// addressable), then drop the registry entry. Survivors of a still
    /// populated channel get the leave notice plus a fresh membership
    /// snapshot. Idempotent; safe for clients that never joined.
    pub fn disconnect_cleanup(&mut self, id: ClientId) -> Vec<Outgoing> {
        let mut out = Vec::new();

        if let Some(channel) = self.channels.remove(id) {
            let survivors = self.channels.members(&channel);
            if !survivors.is_empty() {
                let members = survivors.iter().map(|m| self.entry(*m)).collect();
                out.push(Outgoing::new(
                    Recipients::Many(survivors.clone()),
                    Packet::UserLeftVoice {
                        user: self.entry(id),
                    },
                ));
                out.push(Outgoing::new(
                    Recipients::Many(survivors),
                    Packet::VoiceUserList {
                        channel,
                        members,
                    },
                ));
            }
        }

        let removed = self.registry.remove(id);
        if let Some(member) = removed {
            if let Some(display_name) = member.display_name {
                out.push(Outgoing::new(
                    Recipients::All,
                    Packet::UserDisconnected {
                        user: UserEntry::new(id, display_name),
                    },
                ));
                out.push(Outgoing::new(
                    Recipients::All,
                    Packet::UserList {
                        users: self.registry.snapshot(),
                    },
                ));
            }
        }

        out
    }

    #[cfg(test)]
    fn assert_invariants(&self) {
        self.channels.assert_consistent();
        for channel in ["lobby", "music", "general", "x"] {
            for id in self.channels.members(channel) {
                assert!(
                    self.registry.contains(id),
                    "channel member {id} missing from registry"
                );
            }
        }
    }
}
