use huddle_protocol::Packet;

use crate::state::ClientId;

/// Delivery filter attached to every broadcast frame. Each connection
/// handler applies the filter against its own client id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Recipients {
    All,
    AllExcept(ClientId),
    One(ClientId),
    Many(Vec<ClientId>),
}

impl Recipients {
    #[must_use]
    pub fn includes(&self, id: ClientId) -> bool {
        match self {
            Recipients::All => true,
            Recipients::AllExcept(excluded) => *excluded != id,
            Recipients::One(target) => *target == id,
            Recipients::Many(targets) => targets.contains(&id),
        }
    }
}

/// Pre-encoded frame published on the broadcast channel.
#[derive(Clone, Debug)]
pub struct BroadcastMessage {
    recipients: Recipients,
    frame: Vec<u8>,
}

impl BroadcastMessage {
    #[must_use]
    pub fn new(recipients: Recipients, packet: &Packet) -> Self {
        Self {
            recipients,
            frame: packet.encode(),
        }
    }

    #[must_use]
    pub fn should_send_to(&self, id: ClientId) -> bool {
        self.recipients.includes(id)
    }

    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.frame
    }
}
