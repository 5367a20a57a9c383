//! Two-party message encryption under a pairing's shared key.

use tracing::debug;

use super::pipeline::{decode_text, open_content, seal_content};
use super::types::EncryptedMessage;
use crate::crypto::shared::SharedKey;
use crate::crypto::wrap;
use crate::error::{CryptoError, CryptoResult};

/// Encrypt `plaintext` for the partner of a pairing.
///
/// Returns [`CryptoError::KeyUnavailable`] when no shared key exists yet;
/// whether to queue or fall back is the caller's decision.
pub fn encrypt_for_partner(
    plaintext: &str,
    shared_key: Option<&SharedKey>,
) -> CryptoResult<EncryptedMessage> {
    let shared_key = shared_key.ok_or_else(|| {
        CryptoError::KeyUnavailable("no shared key for this pairing yet".into())
    })?;

    let sealed = seal_content(plaintext.as_bytes());
    let encrypted_key = wrap::wrap(&sealed.key, shared_key.as_str())?;

    debug!(
        bytes = plaintext.len(),
        key = shared_key.fingerprint(),
        "Encrypted message for partner"
    );

    Ok(EncryptedMessage {
        encrypted_content: sealed.encrypted_content,
        encrypted_key,
        iv: sealed.iv,
    })
}

/// Decrypt a message from the partner of a pairing.
///
/// Stages fail with distinct errors: [`CryptoError::Structural`] for a
/// malformed envelope, [`CryptoError::KeyUnwrap`] for a key mismatch,
/// [`CryptoError::CorruptCiphertext`] for damaged content and
/// [`CryptoError::ContentDecode`] for undecodable text.
pub fn decrypt_from_partner(
    message: &EncryptedMessage,
    shared_key: Option<&SharedKey>,
) -> CryptoResult<String> {
    message.validate()?;

    let shared_key = shared_key.ok_or_else(|| {
        CryptoError::KeyUnavailable("no shared key for this pairing yet".into())
    })?;

    let key = wrap::unwrap(&message.encrypted_key, shared_key.as_str())?;
    let plaintext = open_content(&message.encrypted_content, &message.iv, &key)?;

    debug!(bytes = plaintext.len(), "Decrypted message from partner");
    decode_text(plaintext)
}
