//! Cryptography - key pairs, symmetric cipher, key wrapping and shared keys.

pub mod cipher;
pub mod keys;
pub mod shared;
pub mod wrap;

pub use cipher::{seal, Iv, MessageKey, Sealed};
pub use keys::{
    generate_key_pair, validate_public_key, KeyMode, KeyPair, KeyPairGenerator, KeyProvider,
    KeySpec, OaepHash, RsaKeyProvider,
};
pub use shared::{derive_shared_key, SharedKey};
pub use wrap::SealedKey;
