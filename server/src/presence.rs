use std::collections::HashMap;

use huddle_protocol::UserEntry;

use crate::state::ClientId;

/// A connected client. The display name stays unset until the client
/// announces itself with a join request.
#[derive(Clone, Debug)]
pub struct Member {
    pub display_name: Option<String>,
}

/// Canonical set of connected clients and their display names.
///
/// Client ids come from a monotonic counter, so ascending id order is
/// registry insertion order; snapshots use it to keep the list stable
/// across repeated broadcasts.
#[derive(Debug, Default)]
pub struct PresenceRegistry {
    members: HashMap<ClientId, Member>,
}

impl PresenceRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a freshly connected client with no display name yet.
    pub fn connect(&mut self, id: ClientId) {
        self.members.insert(id, Member { display_name: None });
    }

    /// Sets the display name for a connected client. A repeated join
    /// simply overwrites the name.
    ///
    /// Returns `false` if the client is not connected.
    pub fn join(&mut self, id: ClientId, display_name: String) -> bool {
        match self.members.get_mut(&id) {
            Some(member) => {
                member.display_name = Some(display_name);
                true
            }
            None => false,
        }
    }

    /// Removes a client. Idempotent; returns the removed entry if the
    /// client was still present.
    pub fn remove(&mut self, id: ClientId) -> Option<Member> {
        self.members.remove(&id)
    }

    #[must_use]
    pub fn contains(&self, id: ClientId) -> bool {
        self.members.contains_key(&id)
    }

    /// Display name of a client that has joined, if any.
    #[must_use]
    pub fn display_name(&self, id: ClientId) -> Option<&str> {
        self.members.get(&id)?.display_name.as_deref()
    }

    /// Ordered membership snapshot for `UserList` payloads. Clients
    /// that never joined are excluded.
    #[must_use]
    pub fn snapshot(&self) -> Vec<UserEntry> {
        let mut users: Vec<UserEntry> = self
            .members
            .iter()
            .filter_map(|(id, member)| {
                member
                    .display_name
                    .as_ref()
                    .map(|name| UserEntry::new(*id, name.clone()))
            })
            .collect();
        users.sort_by_key(|u| u.id);
        users
    }
}
