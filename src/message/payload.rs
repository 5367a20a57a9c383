//! Tagged chat payloads and their rendering for display.
//!
//! Whether a payload is encrypted is decided when it is built and carried
//! in the `kind` tag, so receivers match on it instead of probing.

use serde::{Deserialize, Serialize};

use super::direct::decrypt_from_partner;
use super::file::{decrypt_file_from_partner, DecryptedFile};
use super::group::decrypt_from_group;
use super::types::{EncryptedFile, EncryptedMessage, GroupEncryptedMessage};
use crate::crypto::keys::KeyPair;
use crate::crypto::shared::SharedKey;
use crate::error::{CryptoError, CryptoResult, ErrorKind};

/// Longest envelope excerpt kept in diagnostics.
pub const DIAGNOSTIC_EXCERPT_LEN: usize = 256;

/// A chat payload as it travels over the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "body", rename_all = "snake_case")]
pub enum Payload {
    /// Unencrypted text. Only produced under an explicit plaintext fallback.
    Plain(String),
    Encrypted(EncryptedMessage),
    EncryptedFile(EncryptedFile),
    Group(GroupEncryptedMessage),
}

impl Payload {
    pub fn is_encrypted(&self) -> bool {
        !matches!(self, Payload::Plain(_))
    }

    pub fn to_json(&self) -> CryptoResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> CryptoResult<Self> {
        serde_json::from_str(json).map_err(|e| CryptoError::Structural(e.to_string()))
    }
}

/// Keys available to the receiving side.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenContext<'a> {
    pub user_id: &'a str,
    pub shared_key: Option<&'a SharedKey>,
    pub key_pair: Option<&'a KeyPair>,
}

/// What went wrong while opening a payload, kept for a debug view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostics {
    pub kind: ErrorKind,
    pub error: String,
    /// Start of the original envelope.
    pub envelope: String,
}

/// A payload ready for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderedMessage {
    /// Decrypted text.
    Text(String),
    /// Text that was sent without encryption.
    Unencrypted(String),
    File(DecryptedFile),
    /// Placeholder shown instead of content that could not be opened.
    Undecryptable {
        placeholder: &'static str,
        diagnostics: Diagnostics,
    },
}

impl RenderedMessage {
    /// Text to show in a conversation view.
    pub fn display_text(&self) -> String {
        match self {
            RenderedMessage::Text(text) => text.clone(),
            RenderedMessage::Unencrypted(text) => format!("[unencrypted] {}", text),
            RenderedMessage::File(file) => {
                format!("[file] {} ({}, {} bytes)", file.file_name, file.file_type, file.len())
            }
            RenderedMessage::Undecryptable { placeholder, .. } => format!("[{}]", placeholder),
        }
    }

    pub fn is_undecryptable(&self) -> bool {
        matches!(self, RenderedMessage::Undecryptable { .. })
    }
}

/// User-visible placeholder for an error kind.
pub fn placeholder_for(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::Structural => "not a valid encrypted message",
        ErrorKind::KeyUnavailable => "waiting for encryption setup",
        ErrorKind::NotARecipient => "this message was not encrypted for you",
        ErrorKind::ContentDecode => "message contains malformed data",
        _ => "message could not be decrypted",
    }
}

/// Open a payload. Never fails: errors become a placeholder.
pub fn open_payload(payload: &Payload, ctx: &OpenContext<'_>) -> RenderedMessage {
    let result = match payload {
        Payload::Plain(text) => return RenderedMessage::Unencrypted(text.clone()),
        Payload::Encrypted(message) => {
            decrypt_from_partner(message, ctx.shared_key).map(RenderedMessage::Text)
        }
        Payload::EncryptedFile(file) => match ctx.shared_key {
            Some(key) => decrypt_file_from_partner(file, key.as_str()).map(RenderedMessage::File),
            None => file.validate().and(Err(CryptoError::KeyUnavailable(
                "no shared key for this pairing yet".into(),
            ))),
        },
        Payload::Group(message) => match ctx.key_pair {
            Some(pair) => decrypt_from_group(message, pair, ctx.user_id).map(RenderedMessage::Text),
            None => Err(CryptoError::KeyUnavailable("no key pair loaded".into())),
        },
    };

    result.unwrap_or_else(|e| undecryptable(&e, &envelope_excerpt(payload)))
}

/// Parse and open a raw payload received from the transport.
pub fn open_raw(raw: &str, ctx: &OpenContext<'_>) -> RenderedMessage {
    match Payload::from_json(raw) {
        Ok(payload) => open_payload(&payload, ctx),
        Err(e) => undecryptable(&e, raw),
    }
}

fn undecryptable(error: &CryptoError, envelope: &str) -> RenderedMessage {
    let kind = error.kind();
    tracing::warn!(?kind, error = %error, "Showing placeholder for undecryptable payload");
    RenderedMessage::Undecryptable {
        placeholder: placeholder_for(kind),
        diagnostics: Diagnostics {
            kind,
            error: error.to_string(),
            envelope: truncate(envelope, DIAGNOSTIC_EXCERPT_LEN),
        },
    }
}

fn envelope_excerpt(payload: &Payload) -> String {
    serde_json::to_string(payload).unwrap_or_else(|_| format!("{:?}", payload))
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}
