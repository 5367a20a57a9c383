//! AES-256-CBC symmetric encryption with a fresh key and IV per message.

use aes::Aes256;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::CipherFormatError;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// Message key length in bytes (AES-256).
pub const KEY_LEN: usize = 32;
/// IV length in bytes (one AES block).
pub const IV_LEN: usize = 16;
/// AES block length in bytes.
pub const BLOCK_LEN: usize = 16;

/// A per-message symmetric key. Zeroed on drop.
#[derive(Clone, PartialEq, Eq)]
pub struct MessageKey([u8; KEY_LEN]);

impl MessageKey {
    /// Draw a fresh random key from the OS.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub(crate) fn from_array(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CipherFormatError> {
        let bytes: [u8; KEY_LEN] = bytes.try_into().map_err(|_| {
            CipherFormatError::parse(
                "key",
                format!("expected {} bytes, got {}", KEY_LEN, bytes.len()),
            )
        })?;
        Ok(Self(bytes))
    }

    pub fn from_base64(encoded: &str) -> Result<Self, CipherFormatError> {
        let bytes = BASE64
            .decode(encoded)
            .map_err(|e| CipherFormatError::parse("key", e))?;
        Self::from_bytes(&bytes)
    }

    pub fn to_base64(&self) -> String {
        BASE64.encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl Drop for MessageKey {
    fn drop(&mut self) {
        self.0.iter_mut().for_each(|b| *b = 0);
    }
}

impl std::fmt::Debug for MessageKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MessageKey([REDACTED])")
    }
}

/// A CBC initialization vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Iv([u8; IV_LEN]);

impl Iv {
    /// Draw a fresh random IV from the OS.
    pub fn generate() -> Self {
        let mut bytes = [0u8; IV_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub(crate) fn from_array(bytes: [u8; IV_LEN]) -> Self {
        Self(bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CipherFormatError> {
        let bytes: [u8; IV_LEN] = bytes.try_into().map_err(|_| {
            CipherFormatError::parse(
                "iv",
                format!("expected {} bytes, got {}", IV_LEN, bytes.len()),
            )
        })?;
        Ok(Self(bytes))
    }

    pub fn from_base64(encoded: &str) -> Result<Self, CipherFormatError> {
        let bytes = BASE64
            .decode(encoded)
            .map_err(|e| CipherFormatError::parse("iv", e))?;
        Self::from_bytes(&bytes)
    }

    pub fn to_base64(&self) -> String {
        BASE64.encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; IV_LEN] {
        &self.0
    }
}

/// Output of [`seal`]: the ciphertext plus the key and IV that produced it.
#[derive(Debug)]
pub struct Sealed {
    pub key: MessageKey,
    pub iv: Iv,
    pub ciphertext: Vec<u8>,
}

impl Sealed {
    pub fn ciphertext_base64(&self) -> String {
        BASE64.encode(&self.ciphertext)
    }
}

/// Encrypt `plaintext` under a freshly generated key and IV.
///
/// A key/IV pair is never reused: every call draws new ones.
pub fn seal(plaintext: &[u8]) -> Sealed {
    let key = MessageKey::generate();
    let iv = Iv::generate();
    let ciphertext = encrypt_with(plaintext, &key, &iv);
    Sealed {
        key,
        iv,
        ciphertext,
    }
}

/// Encrypt with an explicit key and IV (PKCS#7 padding).
pub(crate) fn encrypt_with(plaintext: &[u8], key: &MessageKey, iv: &Iv) -> Vec<u8> {
    Aes256CbcEnc::new(&key.0.into(), &iv.0.into()).encrypt_padded_vec_mut::<Pkcs7>(plaintext)
}

/// Decrypt a ciphertext produced by [`seal`].
pub fn open(ciphertext: &[u8], key: &MessageKey, iv: &Iv) -> Result<Vec<u8>, CipherFormatError> {
    check_block_length("ciphertext", ciphertext)?;
    Aes256CbcDec::new(&key.0.into(), &iv.0.into())
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| CipherFormatError::Padding)
}

/// Decrypt and require the result to be UTF-8 text.
pub fn open_text(
    ciphertext: &[u8],
    key: &MessageKey,
    iv: &Iv,
) -> Result<String, CipherFormatError> {
    let plaintext = open(ciphertext, key, iv)?;
    String::from_utf8(plaintext).map_err(|_| CipherFormatError::InvalidUtf8)
}

/// Decode a base64 ciphertext field and check it is whole AES blocks.
pub fn decode_ciphertext(field: &'static str, encoded: &str) -> Result<Vec<u8>, CipherFormatError> {
    let bytes = BASE64
        .decode(encoded)
        .map_err(|e| CipherFormatError::parse(field, e))?;
    check_block_length(field, &bytes)?;
    Ok(bytes)
}

fn check_block_length(field: &'static str, bytes: &[u8]) -> Result<(), CipherFormatError> {
    if bytes.is_empty() || bytes.len() % BLOCK_LEN != 0 {
        return Err(CipherFormatError::parse(
            field,
            format!("length {} is not a positive multiple of {}", bytes.len(), BLOCK_LEN),
        ));
    }
    Ok(())
}
