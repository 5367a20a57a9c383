//! Shared key derivation for a pairing.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{CryptoError, CryptoResult};

/// Symmetric key shared by the two sides of a pairing, as lowercase hex.
///
/// Each peer computes it locally; it is never transmitted.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SharedKey(String);

impl SharedKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short prefix, safe to show to users for comparing out of band.
    pub fn fingerprint(&self) -> &str {
        self.0.get(..16).unwrap_or(&self.0)
    }
}

impl std::fmt::Debug for SharedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SharedKey({}…)", self.fingerprint())
    }
}

/// Derive the pairing key from both public keys.
///
/// The keys are sorted before hashing, so both peers get the same value
/// regardless of argument order.
pub fn derive_shared_key(
    own_public_key: &str,
    partner_public_key: &str,
) -> CryptoResult<SharedKey> {
    if own_public_key.is_empty() || partner_public_key.is_empty() {
        return Err(CryptoError::KeyUnavailable(
            "both public keys are needed to derive a shared key".into(),
        ));
    }

    let (first, second) = if own_public_key <= partner_public_key {
        (own_public_key, partner_public_key)
    } else {
        (partner_public_key, own_public_key)
    };

    let digest = Sha256::new()
        .chain_update(first.as_bytes())
        .chain_update(second.as_bytes())
        .finalize();
    Ok(SharedKey(hex::encode(digest)))
}
