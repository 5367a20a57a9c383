//! Envelope types and structural validation.

use std::collections::BTreeMap;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::crypto::cipher::{BLOCK_LEN, IV_LEN};
use crate::error::{CryptoError, CryptoResult};

/// Two-party encrypted message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedMessage {
    pub encrypted_content: String,
    pub encrypted_key: String,
    pub iv: String,
}

impl EncryptedMessage {
    /// Reject the envelope unless all cipher fields are present and decodable.
    pub fn validate(&self) -> CryptoResult<()> {
        check_cipher_fields(&self.encrypted_content, &self.encrypted_key, &self.iv)
    }

    pub fn from_json(json: &str) -> CryptoResult<Self> {
        parse_checked(json, is_valid_encrypted_message, "encrypted message")
    }
}

/// Two-party encrypted file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedFile {
    pub encrypted_content: String,
    pub encrypted_key: String,
    pub iv: String,
    pub file_name: String,
    pub file_type: String,
    /// Length of the original file in bytes, before any encoding.
    pub file_size: u64,
}

impl EncryptedFile {
    pub fn validate(&self) -> CryptoResult<()> {
        if self.file_name.is_empty() {
            return Err(CryptoError::Structural("fileName is empty".into()));
        }
        check_cipher_fields(&self.encrypted_content, &self.encrypted_key, &self.iv)
    }

    pub fn from_json(json: &str) -> CryptoResult<Self> {
        parse_checked(json, is_valid_encrypted_file, "encrypted file")
    }
}

/// One payload encrypted for several group members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupEncryptedMessage {
    pub group_id: String,
    pub sender_id: String,
    pub encrypted_content: String,
    /// Wrapped message key per member user id.
    pub encrypted_keys: BTreeMap<String, String>,
    pub iv: String,
    pub key_version: u32,
    /// Unix milliseconds.
    pub timestamp: i64,
    pub message_id: String,
}

impl GroupEncryptedMessage {
    pub fn validate(&self) -> CryptoResult<()> {
        if self.group_id.is_empty() || self.sender_id.is_empty() || self.message_id.is_empty() {
            return Err(CryptoError::Structural(
                "groupId, senderId and messageId are required".into(),
            ));
        }
        if self.encrypted_keys.is_empty() {
            return Err(CryptoError::Structural("encryptedKeys is empty".into()));
        }
        check_content_and_iv(&self.encrypted_content, &self.iv)
    }

    pub fn from_json(json: &str) -> CryptoResult<Self> {
        parse_checked(json, is_valid_group_encrypted_message, "group message")
    }
}

/// A group member's published key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberKey {
    pub user_id: String,
    pub public_key: String,
}

impl MemberKey {
    pub fn new(user_id: impl Into<String>, public_key: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            public_key: public_key.into(),
        }
    }
}

/// Field presence and type check for an [`EncryptedMessage`]. No crypto.
pub fn is_valid_encrypted_message(value: &Value) -> bool {
    has_strings(value, &["encryptedContent", "encryptedKey", "iv"])
}

/// Field presence and type check for an [`EncryptedFile`]. No crypto.
pub fn is_valid_encrypted_file(value: &Value) -> bool {
    is_valid_encrypted_message(value)
        && has_strings(value, &["fileName"])
        && value.get("fileType").map_or(false, Value::is_string)
        && value.get("fileSize").map_or(false, Value::is_u64)
}

/// Field presence and type check for a [`GroupEncryptedMessage`]. No crypto.
pub fn is_valid_group_encrypted_message(value: &Value) -> bool {
    let keys_ok = value
        .get("encryptedKeys")
        .and_then(Value::as_object)
        .map_or(false, |keys| {
            !keys.is_empty() && keys.values().all(|k| k.as_str().map_or(false, |s| !s.is_empty()))
        });

    keys_ok
        && has_strings(
            value,
            &["groupId", "senderId", "encryptedContent", "iv", "messageId"],
        )
        && value.get("keyVersion").map_or(false, Value::is_u64)
        && value.get("timestamp").map_or(false, Value::is_i64)
}

fn has_strings(value: &Value, fields: &[&str]) -> bool {
    fields.iter().all(|field| {
        value
            .get(*field)
            .and_then(Value::as_str)
            .map_or(false, |s| !s.is_empty())
    })
}

fn parse_checked<T: serde::de::DeserializeOwned>(
    json: &str,
    predicate: fn(&Value) -> bool,
    what: &str,
) -> CryptoResult<T> {
    let value: Value = serde_json::from_str(json)
        .map_err(|e| CryptoError::Structural(format!("{} is not JSON: {}", what, e)))?;
    if !predicate(&value) {
        return Err(CryptoError::Structural(format!(
            "{} is missing required fields",
            what
        )));
    }
    serde_json::from_value(value).map_err(|e| CryptoError::Structural(e.to_string()))
}

fn check_cipher_fields(content: &str, key: &str, iv: &str) -> CryptoResult<()> {
    if key.is_empty() {
        return Err(CryptoError::Structural("encryptedKey is empty".into()));
    }
    BASE64
        .decode(key)
        .map_err(|e| CryptoError::Structural(format!("encryptedKey is not base64: {}", e)))?;
    check_content_and_iv(content, iv)
}

fn check_content_and_iv(content: &str, iv: &str) -> CryptoResult<()> {
    if content.is_empty() {
        return Err(CryptoError::Structural("encryptedContent is empty".into()));
    }
    if iv.is_empty() {
        return Err(CryptoError::Structural("iv is empty".into()));
    }

    let content = BASE64
        .decode(content)
        .map_err(|e| CryptoError::Structural(format!("encryptedContent is not base64: {}", e)))?;
    if content.len() % BLOCK_LEN != 0 {
        return Err(CryptoError::Structural(format!(
            "encryptedContent is {} bytes, not whole blocks",
            content.len()
        )));
    }

    let iv = BASE64
        .decode(iv)
        .map_err(|e| CryptoError::Structural(format!("iv is not base64: {}", e)))?;
    if iv.len() != IV_LEN {
        return Err(CryptoError::Structural(format!(
            "iv is {} bytes, expected {}",
            iv.len(),
            IV_LEN
        )));
    }
    Ok(())
}
