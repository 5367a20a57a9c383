//! Frames exchanged through the relay and the seams around them.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::crypto::keys::KeyPair;
use crate::message::Payload;

/// Relay-assigned connection id.
pub type SocketId = String;

/// Where the relay should deliver a frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "to", rename_all = "snake_case")]
pub enum RouteTarget {
    /// Every socket of one user.
    Partner { user_id: String },
    /// Every socket joined to a group.
    Group { group_id: String },
    /// One specific connection.
    Socket { socket_id: SocketId },
    /// Everyone except the sender.
    Broadcast,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum FrameBody {
    /// Publication of the sender's public key.
    KeyExchange { public_key: String },
    Payload(Payload),
}

/// One unit of traffic through the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Frame {
    /// Sending user.
    pub from: String,
    /// Sending connection.
    pub socket_id: SocketId,
    pub target: RouteTarget,
    pub body: FrameBody,
}

impl Frame {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).context("Failed to encode frame")
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to decode frame")
    }
}

/// Outbound side of a relay connection.
pub trait Transport: Send + Sync {
    /// Connection id assigned to this side.
    fn socket_id(&self) -> &str;

    /// Hand a frame to the relay. Delivery is not confirmed.
    fn send(&self, frame: Frame) -> Result<()>;
}

/// Who the local user is.
pub trait IdentityProvider: Send + Sync {
    fn user_id(&self) -> String;

    /// Current key pair, if one has been generated.
    fn key_pair(&self) -> Option<KeyPair>;
}

/// Fixed identity, for tools and tests.
#[derive(Debug, Clone)]
pub struct StaticIdentity {
    pub user_id: String,
    pub key_pair: Option<KeyPair>,
}

impl StaticIdentity {
    pub fn new(user_id: impl Into<String>, key_pair: KeyPair) -> Self {
        Self {
            user_id: user_id.into(),
            key_pair: Some(key_pair),
        }
    }
}

impl IdentityProvider for StaticIdentity {
    fn user_id(&self) -> String {
        self.user_id.clone()
    }

    fn key_pair(&self) -> Option<KeyPair> {
        self.key_pair.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_json_shape() {
        let frame = Frame {
            from: "alice".into(),
            socket_id: "s1".into(),
            target: RouteTarget::Partner {
                user_id: "bob".into(),
            },
            body: FrameBody::KeyExchange {
                public_key: "AAAA".into(),
            },
        };

        let json = frame.to_json().unwrap();
        assert!(json.contains(r#""target":{"to":"partner","user_id":"bob"}"#));
        assert!(json.contains(r#""type":"key_exchange""#));
        assert_eq!(Frame::from_json(&json).unwrap(), frame);
    }

    #[test]
    fn broadcast_frame_roundtrip() {
        let frame = Frame {
            from: "alice".into(),
            socket_id: "s1".into(),
            target: RouteTarget::Broadcast,
            body: FrameBody::Payload(Payload::Plain("hi".into())),
        };
        assert_eq!(Frame::from_json(&frame.to_json().unwrap()).unwrap(), frame);
    }

    #[test]
    fn malformed_frame_is_error() {
        assert!(Frame::from_json(r#"{"from":"alice"}"#).is_err());
    }

    #[test]
    fn static_identity_reports_pair() {
        let pair = KeyPair::degraded();
        let identity = StaticIdentity::new("alice", pair.clone());
        assert_eq!(identity.user_id(), "alice");
        assert_eq!(identity.key_pair().map(|p| p.public_key), Some(pair.public_key));
    }
}
