//! Client-side frame handling: key exchange, sending and opening payloads.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::registry::PeerRegistry;
use super::transport::{Frame, FrameBody, IdentityProvider, RouteTarget, Transport};
use crate::crypto::keys::KeyPair;
use crate::error::{CryptoError, ErrorKind};
use crate::identity::{EncryptionSession, FallbackPolicy};
use crate::message::{
    encrypt_for_group, open_payload, GroupEncryption, OpenContext, Payload, PendingQueue,
    RenderedMessage,
};

/// Identity backed by an [`EncryptionSession`].
pub struct SessionIdentity {
    user_id: String,
    session: Arc<EncryptionSession>,
}

impl SessionIdentity {
    pub fn new(user_id: impl Into<String>, session: Arc<EncryptionSession>) -> Self {
        Self {
            user_id: user_id.into(),
            session,
        }
    }
}

impl IdentityProvider for SessionIdentity {
    fn user_id(&self) -> String {
        self.user_id.clone()
    }

    fn key_pair(&self) -> Option<KeyPair> {
        self.session.key_pair()
    }
}

/// Outcome of a text send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    /// Held until the key exchange with the partner completes.
    Queued(Uuid),
}

/// Something the user should see after a frame was handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A peer published its key.
    KeyExchanged {
        user_id: String,
        /// Set when the peer is the partner and a shared key now exists.
        fingerprint: Option<String>,
        /// Queued sends that went out as a result.
        flushed: usize,
    },
    Message {
        from: String,
        rendered: RenderedMessage,
    },
}

/// Handles traffic for one local user over one transport.
pub struct FrameHandler {
    identity: Arc<dyn IdentityProvider>,
    session: Arc<EncryptionSession>,
    transport: Arc<dyn Transport>,
    partner_id: Option<String>,
    policy: FallbackPolicy,
    pending: PendingQueue,
}

impl FrameHandler {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        session: Arc<EncryptionSession>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            identity,
            session,
            transport,
            partner_id: None,
            policy: FallbackPolicy::default(),
            pending: PendingQueue::new(),
        }
    }

    pub fn with_policy(mut self, policy: FallbackPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Treat `user_id` as the pairing partner.
    pub fn pair_with(&mut self, user_id: &str) {
        self.partner_id = Some(user_id.to_string());
    }

    pub fn pending(&self) -> &PendingQueue {
        &self.pending
    }

    /// Withdraw a queued send before it goes out.
    pub fn cancel_pending(&mut self, id: Uuid) -> bool {
        self.pending.cancel(id)
    }

    /// Wipe the session keys. Queued sends are dropped with them.
    pub fn clear_keys(&mut self) -> Result<()> {
        self.session.clear_keys().context("Failed to clear keys")?;
        let dropped = self.pending.clear_all();
        if dropped > 0 {
            warn!(dropped, "Discarded queued messages with the keys");
        }
        Ok(())
    }

    /// Forget a relay connection that went away. Returns its user.
    ///
    /// The user's published key is dropped with their last socket. An
    /// established pairing is kept in the session.
    pub fn on_disconnect(&self, registry: &mut PeerRegistry, socket_id: &str) -> Option<String> {
        let user_id = registry.disconnect(socket_id)?;
        if !registry.is_online(&user_id) {
            debug!(user = %user_id, "Peer went offline");
            if self.partner_id.as_deref() == Some(user_id.as_str()) {
                info!(partner = %user_id, "Partner disconnected");
            }
        }
        Some(user_id)
    }

    /// Publish the own public key to everyone connected.
    pub fn announce(&self) -> Result<()> {
        self.publish_key(RouteTarget::Broadcast)
    }

    fn publish_key(&self, target: RouteTarget) -> Result<()> {
        let key_pair = self
            .identity
            .key_pair()
            .ok_or_else(|| anyhow!("No key pair to announce"))?;
        self.send_frame(
            target,
            FrameBody::KeyExchange {
                public_key: key_pair.public_key,
            },
        )
    }

    /// Encrypt and send text to the partner, or queue it until the key
    /// exchange completes.
    pub fn send_text(&mut self, partner_id: &str, text: &str) -> Result<SendOutcome> {
        match self.session.seal_text(text, self.policy) {
            Ok(payload) => {
                self.send_frame(partner_route(partner_id), FrameBody::Payload(payload))?;
                Ok(SendOutcome::Sent)
            }
            Err(e) if e.kind() == ErrorKind::KeyUnavailable => {
                let id = self.pending.enqueue(partner_id, text);
                info!(partner = partner_id, "No shared key yet, message queued");
                Ok(SendOutcome::Queued(id))
            }
            Err(e) => Err(e).context("Failed to encrypt message"),
        }
    }

    /// Encrypt and send a file to the partner.
    pub fn send_file(
        &self,
        partner_id: &str,
        bytes: &[u8],
        file_name: &str,
        file_type: &str,
    ) -> Result<()> {
        let payload = self
            .session
            .seal_file(bytes, file_name, file_type)
            .context("Failed to encrypt file")?;
        self.send_frame(partner_route(partner_id), FrameBody::Payload(payload))
    }

    /// Encrypt once for the listed members and send to the group.
    pub fn send_group<S: AsRef<str>>(
        &self,
        registry: &PeerRegistry,
        group_id: &str,
        member_ids: &[S],
        text: &str,
    ) -> Result<GroupEncryption> {
        let members = registry.member_keys(member_ids);
        let encryption = encrypt_for_group(text, &members, &self.identity.user_id(), group_id)
            .context("Failed to encrypt group message")?;

        self.send_frame(
            RouteTarget::Group {
                group_id: group_id.to_string(),
            },
            FrameBody::Payload(Payload::Group(encryption.message.clone())),
        )?;
        Ok(encryption)
    }

    /// Process one inbound frame.
    pub fn handle(&mut self, registry: &mut PeerRegistry, frame: Frame) -> Result<Inbound> {
        registry.connect(&frame.socket_id, &frame.from);

        match frame.body {
            FrameBody::KeyExchange { public_key } => {
                self.on_key_exchange(registry, &frame.from, &frame.socket_id, &public_key)
            }
            FrameBody::Payload(payload) => {
                let keys = self.session.snapshot();
                let key_pair = self.identity.key_pair();
                let user_id = self.identity.user_id();
                let ctx = OpenContext {
                    user_id: &user_id,
                    shared_key: keys.shared_key.as_ref(),
                    key_pair: key_pair.as_ref(),
                };
                Ok(Inbound::Message {
                    from: frame.from,
                    rendered: open_payload(&payload, &ctx),
                })
            }
        }
    }

    fn on_key_exchange(
        &mut self,
        registry: &mut PeerRegistry,
        from: &str,
        socket_id: &str,
        public_key: &str,
    ) -> Result<Inbound> {
        let changed = registry
            .publish_key(from, public_key)
            .with_context(|| format!("Rejected key from {}", from))?;

        let mut fingerprint = None;
        if self.partner_id.as_deref() == Some(from) {
            self.session
                .set_partner_public_key(public_key)
                .context("Failed to store partner key")?;
            fingerprint = self.session.shared_key().map(|k| k.fingerprint().to_string());
        }

        // answer a new key once so late joiners learn ours too
        if changed && self.identity.key_pair().is_some() {
            let reply = RouteTarget::Socket {
                socket_id: socket_id.to_string(),
            };
            if let Err(e) = self.publish_key(reply) {
                warn!(user = from, socket = socket_id, error = %e, "Could not answer key exchange");
            }
        }

        let flushed = if fingerprint.is_some() {
            self.flush_pending(from)?
        } else {
            0
        };

        debug!(user = from, changed, "Handled key exchange");
        Ok(Inbound::KeyExchanged {
            user_id: from.to_string(),
            fingerprint,
            flushed,
        })
    }

    /// Send everything queued for the partner. On a transport error the
    /// unsent messages go back to the front of the queue.
    fn flush_pending(&mut self, partner_id: &str) -> Result<usize> {
        let mut queued = self.pending.drain(partner_id).into_iter();
        let mut sent = 0;

        while let Some(send) = queued.next() {
            match self.session.seal_text(&send.text, FallbackPolicy::Refuse) {
                Ok(payload) => {
                    let target = partner_route(partner_id);
                    if let Err(e) = self.send_frame(target, FrameBody::Payload(payload)) {
                        let mut unsent = vec![send];
                        unsent.extend(queued);
                        let held = unsent.len();
                        self.pending.restore(unsent);
                        warn!(partner = partner_id, sent, held, "Flush interrupted");
                        return Err(e).context("Failed to send queued message");
                    }
                    sent += 1;
                }
                Err(CryptoError::KeyUnavailable(_)) => {
                    let mut unsent = vec![send];
                    unsent.extend(queued);
                    self.pending.restore(unsent);
                    break;
                }
                Err(e) => {
                    warn!(
                        id = %send.id,
                        error = %e,
                        "Dropping queued message that failed to encrypt"
                    );
                }
            }
        }

        if sent > 0 {
            info!(partner = partner_id, sent, "Flushed queued messages");
        }
        Ok(sent)
    }

    fn send_frame(&self, target: RouteTarget, body: FrameBody) -> Result<()> {
        self.transport.send(Frame {
            from: self.identity.user_id(),
            socket_id: self.transport.socket_id().to_string(),
            target,
            body,
        })
    }
}

fn partner_route(partner_id: &str) -> RouteTarget {
    RouteTarget::Partner {
        user_id: partner_id.to_string(),
    }
}
