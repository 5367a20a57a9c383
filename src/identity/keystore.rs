//! Local persistence of key material under fixed names.

use std::fs;
use std::path::Path;

use crate::crypto::keys::KeyPair;
use crate::crypto::shared::SharedKey;
use crate::error::CryptoResult;
use crate::storage::Database;

use super::session::SessionKeys;

/// Storage name of the own key pair.
pub const KEY_PAIR: &str = "pairlock.key_pair";
/// Storage name of the partner's public key.
pub const PARTNER_PUBLIC_KEY: &str = "pairlock.partner_public_key";
/// Storage name of the derived shared key.
pub const SHARED_KEY: &str = "pairlock.shared_key";

/// Key material persisted on this device. Nothing here is ever sent to
/// the relay.
pub struct KeyStore {
    db: Database,
}

impl KeyStore {
    /// Open the store at `path`, creating parent directories.
    pub fn open(path: &Path) -> CryptoResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(Self {
            db: Database::open(path)?,
        })
    }

    pub fn in_memory() -> CryptoResult<Self> {
        Ok(Self {
            db: Database::open_in_memory()?,
        })
    }

    /// Load whatever was persisted. Missing entries stay `None`.
    pub fn load(&self) -> CryptoResult<SessionKeys> {
        let key_pair = match self.db.get(KEY_PAIR)? {
            Some(json) => Some(serde_json::from_str::<KeyPair>(&json)?),
            None => None,
        };
        let partner_public_key = self.db.get(PARTNER_PUBLIC_KEY)?;
        let shared_key = match self.db.get(SHARED_KEY)? {
            Some(json) => Some(serde_json::from_str::<SharedKey>(&json)?),
            None => None,
        };

        Ok(SessionKeys {
            key_pair,
            partner_public_key,
            shared_key,
        })
    }

    /// Replace all three entries in one transaction.
    pub fn save(&mut self, keys: &SessionKeys) -> CryptoResult<()> {
        let key_pair = keys.key_pair.as_ref().map(serde_json::to_string).transpose()?;
        let shared_key = keys.shared_key.as_ref().map(serde_json::to_string).transpose()?;

        self.db.apply(&[
            (KEY_PAIR, key_pair),
            (PARTNER_PUBLIC_KEY, keys.partner_public_key.clone()),
            (SHARED_KEY, shared_key),
        ])?;
        Ok(())
    }

    /// Remove all key material together.
    pub fn clear(&mut self) -> CryptoResult<()> {
        self.db
            .apply(&[(KEY_PAIR, None), (PARTNER_PUBLIC_KEY, None), (SHARED_KEY, None)])?;
        Ok(())
    }
}
