//! The current pairing's key material.
//!
//! Keys live in one immutable snapshot. Readers clone the `Arc`; writers
//! build the next snapshot and swap it in under the write lock, so nobody
//! ever observes a key pair from one pairing next to a shared key from
//! another.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::keystore::KeyStore;
use crate::crypto::keys::{validate_public_key, KeyPair};
use crate::crypto::shared::{derive_shared_key, SharedKey};
use crate::error::{CryptoError, CryptoResult};
use crate::message::{
    encrypt_file_for_partner, encrypt_for_partner, open_payload, OpenContext, Payload,
    RenderedMessage,
};

/// Snapshot of everything needed to encrypt for the partner.
#[derive(Debug, Clone, Default)]
pub struct SessionKeys {
    pub key_pair: Option<KeyPair>,
    pub partner_public_key: Option<String>,
    pub shared_key: Option<SharedKey>,
}

impl SessionKeys {
    /// Recompute the shared key from the two public keys.
    fn rederive(mut self) -> CryptoResult<Self> {
        self.shared_key = match (&self.key_pair, &self.partner_public_key) {
            (Some(pair), Some(partner)) => Some(derive_shared_key(&pair.public_key, partner)?),
            _ => None,
        };
        Ok(self)
    }

    pub fn is_paired(&self) -> bool {
        self.shared_key.is_some()
    }
}

/// What to do when text must be sent before a shared key exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FallbackPolicy {
    /// Fail with [`CryptoError::KeyUnavailable`].
    #[default]
    Refuse,
    /// Send as an explicitly marked [`Payload::Plain`].
    AllowPlaintext,
}

/// Key material for one device, optionally persisted.
pub struct EncryptionSession {
    keys: RwLock<Arc<SessionKeys>>,
    store: Option<Mutex<KeyStore>>,
}

impl EncryptionSession {
    /// A session held only in memory.
    pub fn new() -> Self {
        Self {
            keys: RwLock::new(Arc::new(SessionKeys::default())),
            store: None,
        }
    }

    /// A session backed by `store`, starting from what it holds.
    pub fn with_store(store: KeyStore) -> CryptoResult<Self> {
        let keys = store.load()?.rederive()?;
        debug!(paired = keys.is_paired(), "Loaded session keys");
        Ok(Self {
            keys: RwLock::new(Arc::new(keys)),
            store: Some(Mutex::new(store)),
        })
    }

    /// Current keys. The snapshot does not change after it is returned.
    pub fn snapshot(&self) -> Arc<SessionKeys> {
        Arc::clone(&*self.keys.read())
    }

    pub fn key_pair(&self) -> Option<KeyPair> {
        self.snapshot().key_pair.clone()
    }

    pub fn shared_key(&self) -> Option<SharedKey> {
        self.snapshot().shared_key.clone()
    }

    pub fn partner_public_key(&self) -> Option<String> {
        self.snapshot().partner_public_key.clone()
    }

    /// Install a new own key pair. Any cached shared key is re-derived.
    pub fn set_key_pair(&self, key_pair: KeyPair) -> CryptoResult<()> {
        let mode = key_pair.mode;
        self.update(|keys| SessionKeys {
            key_pair: Some(key_pair),
            ..keys.clone()
        })?;
        info!(?mode, "Installed key pair");
        Ok(())
    }

    /// Record the partner's published key and derive the shared key.
    pub fn set_partner_public_key(&self, public_key: &str) -> CryptoResult<()> {
        validate_public_key(public_key)?;
        let next = self.update(|keys| SessionKeys {
            partner_public_key: Some(public_key.trim().to_string()),
            ..keys.clone()
        })?;
        match &next.shared_key {
            Some(shared) => info!(fingerprint = shared.fingerprint(), "Pairing established"),
            None => debug!("Partner key stored, waiting for own key pair"),
        }
        Ok(())
    }

    /// Forget the partner. The own key pair is kept.
    pub fn clear_partner(&self) -> CryptoResult<()> {
        self.update(|keys| SessionKeys {
            key_pair: keys.key_pair.clone(),
            ..SessionKeys::default()
        })?;
        Ok(())
    }

    /// Wipe all key material from memory and storage.
    pub fn clear_keys(&self) -> CryptoResult<()> {
        let mut guard = self.keys.write();
        if let Some(store) = &self.store {
            store.lock().clear()?;
        }
        *guard = Arc::new(SessionKeys::default());
        info!("Cleared all key material");
        Ok(())
    }

    /// Encrypt text for the partner.
    pub fn seal_text(&self, text: &str, policy: FallbackPolicy) -> CryptoResult<Payload> {
        let keys = self.snapshot();
        match encrypt_for_partner(text, keys.shared_key.as_ref()) {
            Ok(message) => Ok(Payload::Encrypted(message)),
            Err(CryptoError::KeyUnavailable(reason))
                if policy == FallbackPolicy::AllowPlaintext =>
            {
                warn!(reason = %reason, "Sending message UNENCRYPTED");
                Ok(Payload::Plain(text.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    /// Encrypt a file for the partner. There is no plaintext fallback.
    pub fn seal_file(
        &self,
        bytes: &[u8],
        file_name: &str,
        file_type: &str,
    ) -> CryptoResult<Payload> {
        let keys = self.snapshot();
        let shared = keys.shared_key.as_ref().ok_or_else(|| {
            CryptoError::KeyUnavailable("no shared key for this pairing yet".into())
        })?;
        let file = encrypt_file_for_partner(bytes, file_name, file_type, shared.as_str())?;
        Ok(Payload::EncryptedFile(file))
    }

    /// Open a received payload with the current keys.
    pub fn open(&self, payload: &Payload, user_id: &str) -> RenderedMessage {
        let keys = self.snapshot();
        let ctx = OpenContext {
            user_id,
            shared_key: keys.shared_key.as_ref(),
            key_pair: keys.key_pair.as_ref(),
        };
        open_payload(payload, &ctx)
    }

    fn update(
        &self,
        change: impl FnOnce(&SessionKeys) -> SessionKeys,
    ) -> CryptoResult<Arc<SessionKeys>> {
        let mut guard = self.keys.write();
        let next = Arc::new(change(&guard).rederive()?);
        if let Some(store) = &self.store {
            store.lock().save(&next)?;
        }
        *guard = Arc::clone(&next);
        Ok(next)
    }
}

impl Default for EncryptionSession {
    fn default() -> Self {
        Self::new()
    }
}
