//! Identity management - session keys, their storage and invites.

mod invite;
mod keystore;
mod session;

pub use invite::{InviteCode, InviteType, CODE_LEN};
pub use keystore::{KeyStore, KEY_PAIR, PARTNER_PUBLIC_KEY, SHARED_KEY};
pub use session::{EncryptionSession, FallbackPolicy, SessionKeys};
