//! Envelopes and codecs for two-party, file and group messages.

mod direct;
mod file;
mod group;
mod payload;
mod pipeline;
mod queue;
mod types;

pub use direct::{decrypt_from_partner, encrypt_for_partner};
pub use file::{decrypt_file_from_partner, encrypt_file_for_partner, DecryptedFile};
pub use group::{
    decrypt_from_group, encrypt_for_group, GroupEncryption, SkippedMember, INITIAL_KEY_VERSION,
};
pub use payload::{
    open_payload, open_raw, placeholder_for, Diagnostics, OpenContext, Payload, RenderedMessage,
};
pub use queue::{PendingQueue, PendingSend};
pub use types::{
    is_valid_encrypted_file, is_valid_encrypted_message, is_valid_group_encrypted_message,
    EncryptedFile, EncryptedMessage, GroupEncryptedMessage, MemberKey,
};
