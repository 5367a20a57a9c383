//! pairlock - end-to-end encryption core for paired and group chat
//!
//! Messages are sealed with a fresh AES-256-CBC key, and that key is
//! wrapped for the recipients. Only ciphertext and wrapped keys leave the
//! device.

pub mod cli;
pub mod crypto;
pub mod error;
pub mod identity;
pub mod message;
pub mod network;
pub mod storage;

// Re-export commonly used types
pub use crypto::{derive_shared_key, KeyMode, KeyPair, KeyPairGenerator, SharedKey};
pub use error::{CryptoError, CryptoResult, ErrorKind};
pub use identity::{EncryptionSession, FallbackPolicy, KeyStore};
pub use message::{
    decrypt_file_from_partner, decrypt_from_group, decrypt_from_partner, encrypt_file_for_partner,
    encrypt_for_group, encrypt_for_partner, EncryptedFile, EncryptedMessage, GroupEncryptedMessage,
    Payload, RenderedMessage,
};
pub use network::{FrameHandler, PeerRegistry, Transport};
pub use storage::Database;
