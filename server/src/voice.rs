use std::collections::{BTreeSet, HashMap};

use crate::state::ClientId;

/// Named voice channels and their member sets, with a reverse index
/// from client id to current channel.
///
/// The reverse index is the authority for the at-most-one-channel rule:
/// `insert` refuses a client that is still indexed elsewhere, so every
/// client id appears in at most one member set at any instant. Channels
/// are created on first join and dropped the moment they empty.
#[derive(Debug, Default)]
pub struct VoiceChannelTable {
    channels: HashMap<String, BTreeSet<ClientId>>,
    membership: HashMap<ClientId, String>,
}

impl VoiceChannelTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Channel the client currently belongs to, if any.
    #[must_use]
    pub fn channel_of(&self, id: ClientId) -> Option<&str> {
        self.membership.get(&id).map(String::as_str)
    }

    #[must_use]
    pub fn channel_exists(&self, channel: &str) -> bool {
        self.channels.contains_key(channel)
    }

    /// Members of a channel in ascending id order. Empty if the channel
    /// does not exist.
    #[must_use]
    pub fn members(&self, channel: &str) -> Vec<ClientId> {
        self.channels
            .get(channel)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Members of a channel excluding one client.
    #[must_use]
    pub fn members_except(&self, channel: &str, excluded: ClientId) -> Vec<ClientId> {
        self.channels
            .get(channel)
            .map(|set| set.iter().copied().filter(|id| *id != excluded).collect())
            .unwrap_or_default()
    }

    /// Adds the client to a channel, creating it if absent.
    ///
    /// The caller must have removed the client from any prior channel
    /// first; a still-indexed client is left untouched and `false` is
    /// returned.
    pub fn insert(&mut self, id: ClientId, channel: &str) -> bool {
        if self.membership.contains_key(&id) {
            return false;
        }
        self.channels
            .entry(channel.to_string())
            .or_default()
            .insert(id);
        self.membership.insert(id, channel.to_string());
        true
    }

    /// Removes the client from its channel, deleting the channel if it
    /// becomes empty. Returns the channel name the client was in.
    pub fn remove(&mut self, id: ClientId) -> Option<String> {
        let channel = self.membership.remove(&id)?;
        if let Some(set) = self.channels.get_mut(&channel) {
            set.remove(&id);
            if set.is_empty() {
                self.channels.remove(&channel);
            }
        }
        Some(channel)
    }

    /// Checks that the member sets and the reverse index agree and that
    /// no empty channel lingers.
    #[cfg(test)]
    pub fn assert_consistent(&self) {
        for (channel, set) in &self.channels {
            assert!(!set.is_empty(), "empty channel {channel:?} not cleaned up");
            for id in set {
                assert_eq!(
                    self.membership.get(id).map(String::as_str),
                    Some(channel.as_str()),
                    "member {id} of {channel:?} missing from reverse index"
                );
            }
        }
        for (id, channel) in &self.membership {
            assert!(
                self.channels
                    .get(channel)
                    .is_some_and(|set| set.contains(id)),
                "indexed client {id} absent from channel {channel:?}"
            );
        }
    }
}
