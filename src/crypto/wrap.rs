//! Key wrapping: encrypt a per-message key under a recipient's key material.
//!
//! The recipient's published key string (or a pairing's shared key) is used
//! as a passphrase for AES-256-CBC, in the OpenSSL `enc -md sha256` layout:
//! `"Salted__" || salt(8) || ciphertext`, base64 encoded.
//!
//! This is not asymmetric encryption. Anyone holding the key string can
//! unwrap, so the scheme is only as private as that string.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

use super::cipher::{self, Iv, MessageKey, BLOCK_LEN, IV_LEN};
use crate::error::{CipherFormatError, CryptoError, CryptoResult, UnwrapError};

const SALT_MAGIC: &[u8; 8] = b"Salted__";
const SALT_LEN: usize = 8;
const DIGEST_LEN: usize = 32;

/// A message key together with the digest of the content it encrypted.
///
/// The digest covers `key || iv || ciphertext`, so any change to the IV or
/// the ciphertext is caught before decryption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedKey {
    pub key: MessageKey,
    pub digest: [u8; DIGEST_LEN],
}

impl SealedKey {
    /// Bind `key` to the IV and ciphertext it produced.
    pub fn bind(key: MessageKey, iv: &Iv, ciphertext: &[u8]) -> Self {
        let digest = content_digest(&key, iv, ciphertext);
        Self { key, digest }
    }

    /// Check that `iv` and `ciphertext` are the ones this key was bound to.
    pub fn verify(&self, iv: &Iv, ciphertext: &[u8]) -> Result<(), CipherFormatError> {
        let actual = content_digest(&self.key, iv, ciphertext);
        let diff = actual
            .iter()
            .zip(self.digest.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b));
        if diff != 0 {
            return Err(CipherFormatError::DigestMismatch);
        }
        Ok(())
    }

    fn to_token(&self) -> String {
        format!("{}:{}", self.key.to_base64(), hex::encode(self.digest))
    }

    fn from_token(token: &str) -> Result<Self, UnwrapError> {
        let (key, digest) = token.split_once(':').ok_or(UnwrapError::MalformedKey)?;
        let key = MessageKey::from_base64(key).map_err(|_| UnwrapError::MalformedKey)?;
        let digest: [u8; DIGEST_LEN] = hex::decode(digest)
            .ok()
            .and_then(|bytes| bytes.try_into().ok())
            .ok_or(UnwrapError::MalformedKey)?;
        Ok(Self { key, digest })
    }
}

/// SHA-256 over `key || iv || ciphertext`.
pub fn content_digest(key: &MessageKey, iv: &Iv, ciphertext: &[u8]) -> [u8; DIGEST_LEN] {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hasher.update(iv.as_bytes());
    hasher.update(ciphertext);
    hasher.finalize().into()
}

/// Wrap a sealed key under `key_material`.
pub fn wrap(sealed: &SealedKey, key_material: &str) -> CryptoResult<String> {
    if key_material.trim().is_empty() {
        return Err(CryptoError::KeyUnavailable(
            "no key material to wrap the message key with".into(),
        ));
    }

    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    let (key, iv) = derive_key_iv(key_material.as_bytes(), &salt);

    let ciphertext = cipher::encrypt_with(sealed.to_token().as_bytes(), &key, &iv);

    let mut out = Vec::with_capacity(SALT_MAGIC.len() + SALT_LEN + ciphertext.len());
    out.extend_from_slice(SALT_MAGIC);
    out.extend_from_slice(&salt);
    out.extend_from_slice(&ciphertext);
    Ok(BASE64.encode(out))
}

/// Unwrap a key produced by [`wrap`].
pub fn unwrap(wrapped: &str, key_material: &str) -> Result<SealedKey, UnwrapError> {
    if key_material.trim().is_empty() {
        return Err(UnwrapError::MissingKeyMaterial);
    }

    let data = BASE64
        .decode(wrapped)
        .map_err(|e| UnwrapError::CorruptEncoding(e.to_string()))?;

    let header = SALT_MAGIC.len() + SALT_LEN;
    if data.len() < header + BLOCK_LEN {
        return Err(UnwrapError::CorruptEncoding(format!(
            "too short: {} bytes",
            data.len()
        )));
    }
    if &data[..SALT_MAGIC.len()] != SALT_MAGIC {
        return Err(UnwrapError::CorruptEncoding("missing salt header".into()));
    }

    let mut salt = [0u8; SALT_LEN];
    salt.copy_from_slice(&data[SALT_MAGIC.len()..header]);
    let ciphertext = &data[header..];
    if ciphertext.len() % BLOCK_LEN != 0 {
        return Err(UnwrapError::CorruptEncoding(format!(
            "ciphertext length {} is not a multiple of {}",
            ciphertext.len(),
            BLOCK_LEN
        )));
    }

    let (key, iv) = derive_key_iv(key_material.as_bytes(), &salt);
    let token = cipher::open_text(ciphertext, &key, &iv).map_err(|e| match e {
        CipherFormatError::InvalidUtf8 => UnwrapError::NotUtf8,
        CipherFormatError::Parse { reason, .. } => UnwrapError::CorruptEncoding(reason),
        _ => UnwrapError::WrongKey,
    })?;

    SealedKey::from_token(&token)
}

/// `EVP_BytesToKey` with SHA-256 and one round: enough output for an
/// AES-256 key followed by a 16-byte IV.
fn derive_key_iv(passphrase: &[u8], salt: &[u8; SALT_LEN]) -> (MessageKey, Iv) {
    let first: [u8; 32] = Sha256::new()
        .chain_update(passphrase)
        .chain_update(salt)
        .finalize()
        .into();
    let second: [u8; 32] = Sha256::new()
        .chain_update(first)
        .chain_update(passphrase)
        .chain_update(salt)
        .finalize()
        .into();

    let mut iv = [0u8; IV_LEN];
    iv.copy_from_slice(&second[..IV_LEN]);
    (MessageKey::from_array(first), Iv::from_array(iv))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::cipher::seal;

    fn sealed_key() -> (SealedKey, Iv, Vec<u8>) {
        let sealed = seal(b"payload");
        let key = SealedKey::bind(sealed.key.clone(), &sealed.iv, &sealed.ciphertext);
        (key, sealed.iv, sealed.ciphertext)
    }

    #[test]
    fn wrap_unwrap_roundtrip() {
        let (key, _, _) = sealed_key();
        let wrapped = wrap(&key, "recipient-public-key").unwrap();

        let unwrapped = unwrap(&wrapped, "recipient-public-key").unwrap();
        assert_eq!(unwrapped, key);
    }

    #[test]
    fn wrapped_output_has_openssl_header() {
        let (key, _, _) = sealed_key();
        let wrapped = wrap(&key, "material").unwrap();

        let raw = BASE64.decode(wrapped).unwrap();
        assert_eq!(&raw[..8], b"Salted__");
    }

    #[test]
    fn wrapping_is_salted() {
        let (key, _, _) = sealed_key();
        let a = wrap(&key, "material").unwrap();
        let b = wrap(&key, "material").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn wrong_material_is_a_key_mismatch() {
        let (key, _, _) = sealed_key();
        let wrapped = wrap(&key, "alice").unwrap();

        let err = unwrap(&wrapped, "mallory").unwrap_err();
        assert!(matches!(
            err,
            UnwrapError::WrongKey | UnwrapError::NotUtf8 | UnwrapError::MalformedKey
        ));
    }

    #[test]
    fn missing_material_is_reported() {
        let (key, _, _) = sealed_key();
        let wrapped = wrap(&key, "alice").unwrap();

        assert_eq!(unwrap(&wrapped, "").unwrap_err(), UnwrapError::MissingKeyMaterial);
        assert!(matches!(wrap(&key, "  "), Err(CryptoError::KeyUnavailable(_))));
    }

    #[test]
    fn corrupted_encoding_is_reported() {
        assert!(matches!(
            unwrap("%%%not-base64%%%", "alice"),
            Err(UnwrapError::CorruptEncoding(_))
        ));

        let no_header = BASE64.encode([7u8; 48]);
        assert!(matches!(
            unwrap(&no_header, "alice"),
            Err(UnwrapError::CorruptEncoding(_))
        ));

        let (key, _, _) = sealed_key();
        let mut raw = BASE64.decode(wrap(&key, "alice").unwrap()).unwrap();
        raw.pop();
        assert!(matches!(
            unwrap(&BASE64.encode(raw), "alice"),
            Err(UnwrapError::CorruptEncoding(_))
        ));
    }

    #[test]
    fn verify_detects_changed_iv_and_ciphertext() {
        let (key, iv, mut ciphertext) = sealed_key();
        assert!(key.verify(&iv, &ciphertext).is_ok());

        let mut iv_bytes = *iv.as_bytes();
        iv_bytes[0] ^= 0x01;
        let other_iv = Iv::from_bytes(&iv_bytes).unwrap();
        assert_eq!(
            key.verify(&other_iv, &ciphertext),
            Err(CipherFormatError::DigestMismatch)
        );

        ciphertext[3] ^= 0x80;
        assert_eq!(
            key.verify(&iv, &ciphertext),
            Err(CipherFormatError::DigestMismatch)
        );
    }

    #[test]
    fn token_parser_rejects_garbage() {
        assert_eq!(SealedKey::from_token("no-separator"), Err(UnwrapError::MalformedKey));
        assert_eq!(SealedKey::from_token("abc:def"), Err(UnwrapError::MalformedKey));
    }
}
