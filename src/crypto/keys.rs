//! Key pair generation.
//!
//! The strong path produces an RSA key pair exported as base64 DER
//! (SubjectPublicKeyInfo / PKCS#8). When the provider fails, generation
//! falls back to a degraded pair of random strings; the pair's [`KeyMode`]
//! records which path was taken.

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey};
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{CryptoError, CryptoResult};

/// Minimum decoded length of a usable public key.
pub const MIN_PUBLIC_KEY_LEN: usize = 32;

const DEGRADED_KEY_LEN: usize = 32;

/// Which generation path produced a key pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyMode {
    /// RSA-2048, SHA-256.
    Standard,
    /// RSA-4096, SHA-512, for elevated-trust roles.
    Enhanced,
    /// Random strings standing in for a key pair. No asymmetric security.
    Degraded,
}

/// OAEP hash associated with a key pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OaepHash {
    Sha256,
    Sha512,
}

/// Parameters handed to a [`KeyProvider`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeySpec {
    pub modulus_bits: usize,
    pub hash: OaepHash,
}

impl KeySpec {
    pub const STANDARD: KeySpec = KeySpec {
        modulus_bits: 2048,
        hash: OaepHash::Sha256,
    };

    pub const ENHANCED: KeySpec = KeySpec {
        modulus_bits: 4096,
        hash: OaepHash::Sha512,
    };
}

/// Base64-encoded key material as returned by a provider.
#[derive(Clone)]
pub struct ExportedKeys {
    pub public_key: String,
    pub private_key: String,
}

/// Source of asymmetric key material.
pub trait KeyProvider: Send + Sync + 'static {
    fn generate(&self, spec: KeySpec) -> CryptoResult<ExportedKeys>;
}

/// Generates RSA keys with the `rsa` crate and the OS RNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct RsaKeyProvider;

impl KeyProvider for RsaKeyProvider {
    fn generate(&self, spec: KeySpec) -> CryptoResult<ExportedKeys> {
        let private = RsaPrivateKey::new(&mut OsRng, spec.modulus_bits)
            .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;
        let public = RsaPublicKey::from(&private);

        let public_der = public
            .to_public_key_der()
            .map_err(|e| CryptoError::KeyGeneration(format!("export public key: {}", e)))?;
        let private_der = private
            .to_pkcs8_der()
            .map_err(|e| CryptoError::KeyGeneration(format!("export private key: {}", e)))?;

        Ok(ExportedKeys {
            public_key: BASE64.encode(public_der.as_bytes()),
            private_key: BASE64.encode(private_der.as_bytes()),
        })
    }
}

/// A peer's key pair.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyPair {
    pub public_key: String,
    pub private_key: String,
    pub mode: KeyMode,
    pub hash: OaepHash,
    pub modulus_bits: Option<usize>,
    pub created_at: DateTime<Utc>,
}

impl KeyPair {
    fn from_exported(keys: ExportedKeys, spec: KeySpec, mode: KeyMode) -> Self {
        Self {
            public_key: keys.public_key,
            private_key: keys.private_key,
            mode,
            hash: spec.hash,
            modulus_bits: Some(spec.modulus_bits),
            created_at: Utc::now(),
        }
    }

    /// Two independent random strings labelled as a key pair.
    pub fn degraded() -> Self {
        Self {
            public_key: random_base64(DEGRADED_KEY_LEN),
            private_key: random_base64(DEGRADED_KEY_LEN),
            mode: KeyMode::Degraded,
            hash: OaepHash::Sha256,
            modulus_bits: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.mode == KeyMode::Degraded
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &self.public_key)
            .field("private_key", &"[REDACTED]")
            .field("mode", &self.mode)
            .field("hash", &self.hash)
            .field("modulus_bits", &self.modulus_bits)
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Produces key pairs, falling back when the provider fails.
#[derive(Clone)]
pub struct KeyPairGenerator {
    provider: Arc<dyn KeyProvider>,
}

impl KeyPairGenerator {
    pub fn new(provider: impl KeyProvider) -> Self {
        Self {
            provider: Arc::new(provider),
        }
    }

    /// Generate a standard key pair.
    ///
    /// Never fails: if the provider errors, the result is a degraded pair
    /// and a warning is logged.
    pub async fn generate_key_pair(&self) -> KeyPair {
        match self.run(KeySpec::STANDARD).await {
            Ok(keys) => {
                debug!("Generated RSA-{} key pair", KeySpec::STANDARD.modulus_bits);
                KeyPair::from_exported(keys, KeySpec::STANDARD, KeyMode::Standard)
            }
            Err(e) => {
                warn!(error = %e, "Key provider unavailable, using DEGRADED random key pair");
                KeyPair::degraded()
            }
        }
    }

    /// Generate an enhanced key pair for elevated-trust roles.
    ///
    /// On failure this falls back to [`generate_key_pair`](Self::generate_key_pair),
    /// so check [`KeyPair::mode`] for the tier actually obtained.
    pub async fn generate_enhanced_key_pair(&self) -> KeyPair {
        match self.run(KeySpec::ENHANCED).await {
            Ok(keys) => {
                debug!("Generated RSA-{} key pair", KeySpec::ENHANCED.modulus_bits);
                KeyPair::from_exported(keys, KeySpec::ENHANCED, KeyMode::Enhanced)
            }
            Err(e) => {
                warn!(error = %e, "Enhanced key generation failed, falling back to standard tier");
                self.generate_key_pair().await
            }
        }
    }

    async fn run(&self, spec: KeySpec) -> CryptoResult<ExportedKeys> {
        let provider = Arc::clone(&self.provider);
        tokio::task::spawn_blocking(move || provider.generate(spec))
            .await
            .map_err(|e| CryptoError::KeyGeneration(format!("key generation task failed: {}", e)))?
    }
}

impl Default for KeyPairGenerator {
    fn default() -> Self {
        Self::new(RsaKeyProvider)
    }
}

/// Generate a standard key pair with the default RSA provider.
pub async fn generate_key_pair() -> KeyPair {
    KeyPairGenerator::default().generate_key_pair().await
}

/// Check that a peer's published key is usable as wrap material.
///
/// Key material must be non-empty base64 of at least
/// [`MIN_PUBLIC_KEY_LEN`] bytes.
pub fn validate_public_key(public_key: &str) -> CryptoResult<()> {
    let trimmed = public_key.trim();
    if trimmed.is_empty() {
        return Err(CryptoError::InvalidPublicKey("empty".into()));
    }
    let bytes = BASE64
        .decode(trimmed)
        .map_err(|e| CryptoError::InvalidPublicKey(format!("not base64: {}", e)))?;
    if bytes.len() < MIN_PUBLIC_KEY_LEN {
        return Err(CryptoError::InvalidPublicKey(format!(
            "expected at least {} bytes, got {}",
            MIN_PUBLIC_KEY_LEN,
            bytes.len()
        )));
    }
    Ok(())
}

fn random_base64(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    BASE64.encode(bytes)
}
