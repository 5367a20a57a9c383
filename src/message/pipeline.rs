//! Seal/open stages shared by the message, file and group codecs.

use tracing::warn;

use crate::crypto::cipher::{self, Iv};
use crate::crypto::wrap::SealedKey;
use crate::error::{CipherFormatError, CryptoError, CryptoResult};

/// Ciphertext and IV ready for an envelope, plus the key still to be wrapped.
pub(crate) struct SealedContent {
    pub encrypted_content: String,
    pub iv: String,
    pub key: SealedKey,
}

pub(crate) fn seal_content(plaintext: &[u8]) -> SealedContent {
    let sealed = cipher::seal(plaintext);
    let encrypted_content = sealed.ciphertext_base64();
    let iv = sealed.iv.to_base64();
    let key = SealedKey::bind(sealed.key.clone(), &sealed.iv, &sealed.ciphertext);
    SealedContent {
        encrypted_content,
        iv,
        key,
    }
}

/// Check the content digest, then decrypt.
pub(crate) fn open_content(
    encrypted_content: &str,
    iv: &str,
    key: &SealedKey,
) -> CryptoResult<Vec<u8>> {
    let ciphertext = cipher::decode_ciphertext("encryptedContent", encrypted_content)?;
    let iv = Iv::from_base64(iv)?;
    key.verify(&iv, &ciphertext)?;
    Ok(cipher::open(&ciphertext, &key.key, &iv)?)
}

/// Decode decrypted bytes as text.
///
/// Falls back to Latin-1 when the bytes are not UTF-8, but only if the
/// result has no control characters other than tab, CR and LF.
pub(crate) fn decode_text(bytes: Vec<u8>) -> CryptoResult<String> {
    match String::from_utf8(bytes) {
        Ok(text) => Ok(text),
        Err(e) => {
            let latin1: String = e.as_bytes().iter().map(|&b| b as char).collect();
            let printable = latin1
                .chars()
                .all(|c| !c.is_control() || matches!(c, '\t' | '\n' | '\r'));
            if printable {
                warn!("Decrypted text is not UTF-8, decoded as Latin-1");
                Ok(latin1)
            } else {
                Err(CryptoError::ContentDecode(
                    CipherFormatError::InvalidUtf8.to_string(),
                ))
            }
        }
    }
}
