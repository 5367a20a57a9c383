//! Known peers: which sockets belong to whom, and their published keys.

use std::collections::{BTreeSet, HashMap};

use tracing::debug;

use super::transport::SocketId;
use crate::crypto::keys::validate_public_key;
use crate::error::CryptoResult;
use crate::message::MemberKey;

/// Registry of connected peers and their public keys.
#[derive(Debug, Default)]
pub struct PeerRegistry {
    sockets: HashMap<SocketId, String>,
    users: HashMap<String, BTreeSet<SocketId>>,
    keys: HashMap<String, String>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `socket_id` belongs to `user_id`.
    pub fn connect(&mut self, socket_id: &str, user_id: &str) {
        if let Some(previous) = self.sockets.insert(socket_id.to_string(), user_id.to_string()) {
            if previous != user_id {
                self.forget_socket(&previous, socket_id);
            }
        }
        self.users
            .entry(user_id.to_string())
            .or_default()
            .insert(socket_id.to_string());
    }

    /// Drop a socket. When it was the user's last one, the user's key goes
    /// too. Returns the user the socket belonged to.
    pub fn disconnect(&mut self, socket_id: &str) -> Option<String> {
        let user_id = self.sockets.remove(socket_id)?;
        self.forget_socket(&user_id, socket_id);
        debug!(socket = socket_id, user = %user_id, "Peer disconnected");
        Some(user_id)
    }

    fn forget_socket(&mut self, user_id: &str, socket_id: &str) {
        let now_empty = match self.users.get_mut(user_id) {
            Some(sockets) => {
                sockets.remove(socket_id);
                sockets.is_empty()
            }
            None => false,
        };
        if now_empty {
            self.users.remove(user_id);
            self.keys.remove(user_id);
        }
    }

    /// Store a user's published key. Returns whether it changed.
    pub fn publish_key(&mut self, user_id: &str, public_key: &str) -> CryptoResult<bool> {
        validate_public_key(public_key)?;
        let public_key = public_key.trim();
        let changed = self.keys.get(user_id).map(String::as_str) != Some(public_key);
        if changed {
            self.keys.insert(user_id.to_string(), public_key.to_string());
            debug!(user = user_id, "Stored published key");
        }
        Ok(changed)
    }

    pub fn public_key_of(&self, user_id: &str) -> Option<&str> {
        self.keys.get(user_id).map(String::as_str)
    }

    pub fn sockets_of(&self, user_id: &str) -> Vec<&str> {
        self.users
            .get(user_id)
            .map(|sockets| sockets.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn user_of(&self, socket_id: &str) -> Option<&str> {
        self.sockets.get(socket_id).map(String::as_str)
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.users.contains_key(user_id)
    }

    /// Keys for a group send. Members with no published key are included
    /// with an empty key so the group codec reports them as skipped.
    pub fn member_keys<S: AsRef<str>>(&self, user_ids: &[S]) -> Vec<MemberKey> {
        user_ids
            .iter()
            .map(|id| {
                let id = id.as_ref();
                MemberKey::new(id, self.public_key_of(id).unwrap_or_default())
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::KeyPair;

    #[test]
    fn connect_and_lookup() {
        let mut registry = PeerRegistry::new();
        registry.connect("s1", "alice");
        registry.connect("s2", "alice");

        assert!(registry.is_online("alice"));
        assert_eq!(registry.sockets_of("alice"), vec!["s1", "s2"]);
        assert_eq!(registry.user_of("s2"), Some("alice"));
    }

    #[test]
    fn last_disconnect_removes_key() {
        let mut registry = PeerRegistry::new();
        let key = KeyPair::degraded().public_key;
        registry.connect("s1", "alice");
        registry.connect("s2", "alice");
        registry.publish_key("alice", &key).unwrap();

        assert_eq!(registry.disconnect("s1").as_deref(), Some("alice"));
        assert_eq!(registry.public_key_of("alice"), Some(key.as_str()));

        registry.disconnect("s2");
        assert!(!registry.is_online("alice"));
        assert!(registry.public_key_of("alice").is_none());
        assert!(registry.disconnect("s2").is_none());
    }

    #[test]
    fn socket_reassigned_to_other_user() {
        let mut registry = PeerRegistry::new();
        registry.connect("s1", "alice");
        registry.connect("s1", "bob");

        assert!(!registry.is_online("alice"));
        assert_eq!(registry.user_of("s1"), Some("bob"));
    }

    #[test]
    fn publish_reports_change() {
        let mut registry = PeerRegistry::new();
        let key = KeyPair::degraded().public_key;

        assert!(registry.publish_key("alice", &key).unwrap());
        assert!(!registry.publish_key("alice", &key).unwrap());
        assert!(registry.publish_key("alice", "not base64!").is_err());
    }

    #[test]
    fn member_keys_include_unknown_members() {
        let mut registry = PeerRegistry::new();
        let key = KeyPair::degraded().public_key;
        registry.publish_key("alice", &key).unwrap();

        let members = registry.member_keys(&["alice", "ghost"]);
        assert_eq!(members[0].public_key, key);
        assert_eq!(members[1].user_id, "ghost");
        assert!(members[1].public_key.is_empty());
    }
}
