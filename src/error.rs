//! Error types for the encryption core.

use thiserror::Error;

/// Failure while parsing or decrypting a symmetric ciphertext.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CipherFormatError {
    /// An encoded field could not be parsed (bad base64 or wrong length).
    #[error("cannot parse {field}: {reason}")]
    Parse { field: &'static str, reason: String },

    /// The block cipher ran but the padding of the result is invalid.
    #[error("invalid padding after decryption")]
    Padding,

    /// Decryption succeeded but the output is not UTF-8.
    #[error("decrypted output is not valid UTF-8")]
    InvalidUtf8,

    /// The content digest bound into the message key does not match.
    #[error("content digest mismatch")]
    DigestMismatch,
}

impl CipherFormatError {
    pub(crate) fn parse(field: &'static str, reason: impl ToString) -> Self {
        Self::Parse {
            field,
            reason: reason.to_string(),
        }
    }
}

/// Failure while unwrapping a wrapped message key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnwrapError {
    #[error("no key material to unwrap with")]
    MissingKeyMaterial,

    #[error("wrapped key is corrupted: {0}")]
    CorruptEncoding(String),

    #[error("wrapped key did not decrypt (likely wrong key)")]
    WrongKey,

    #[error("unwrapped key is not valid UTF-8 (likely wrong key)")]
    NotUtf8,

    #[error("unwrapped data is not a message key (likely wrong key)")]
    MalformedKey,
}

/// Coarse classification of a [`CryptoError`], used for placeholders and
/// diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Structural,
    KeyUnavailable,
    NotARecipient,
    KeyUnwrap,
    CorruptCiphertext,
    ContentDecode,
    Encryption,
    KeyGeneration,
    Storage,
}

/// Errors of the encryption core.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("not a valid encrypted message: {0}")]
    Structural(String),

    #[error("encryption key unavailable: {0}")]
    KeyUnavailable(String),

    #[error("user {user_id} is not a recipient of this message")]
    NotARecipient { user_id: String },

    #[error("key unwrap failed: {0}")]
    KeyUnwrap(#[from] UnwrapError),

    #[error("ciphertext is corrupted: {0}")]
    CorruptCiphertext(#[from] CipherFormatError),

    #[error("message contains malformed data: {0}")]
    ContentDecode(String),

    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CryptoError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CryptoError::Structural(_) | CryptoError::Serialization(_) => ErrorKind::Structural,
            CryptoError::KeyUnavailable(_) => ErrorKind::KeyUnavailable,
            CryptoError::NotARecipient { .. } => ErrorKind::NotARecipient,
            CryptoError::KeyUnwrap(_) => ErrorKind::KeyUnwrap,
            CryptoError::CorruptCiphertext(_) => ErrorKind::CorruptCiphertext,
            CryptoError::ContentDecode(_) => ErrorKind::ContentDecode,
            CryptoError::Encryption(_) | CryptoError::InvalidPublicKey(_) => ErrorKind::Encryption,
            CryptoError::KeyGeneration(_) => ErrorKind::KeyGeneration,
            CryptoError::Storage(_) | CryptoError::Io(_) => ErrorKind::Storage,
        }
    }
}

pub type CryptoResult<T> = Result<T, CryptoError>;
