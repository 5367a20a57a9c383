//! Group encryption: one ciphertext, one wrapped key per member.

use std::collections::BTreeMap;

use chrono::Utc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::pipeline::{decode_text, open_content, seal_content};
use super::types::{GroupEncryptedMessage, MemberKey};
use crate::crypto::keys::{validate_public_key, KeyPair};
use crate::crypto::wrap;
use crate::error::{CryptoError, CryptoResult};

/// Key version stamped on new group messages.
pub const INITIAL_KEY_VERSION: u32 = 1;

/// A member left out of a group message, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedMember {
    pub user_id: String,
    pub reason: String,
}

/// Result of [`encrypt_for_group`].
#[derive(Debug, Clone)]
pub struct GroupEncryption {
    pub message: GroupEncryptedMessage,
    /// Members whose key could not be wrapped. They cannot decrypt.
    pub skipped: Vec<SkippedMember>,
}

impl GroupEncryption {
    pub fn recipient_count(&self) -> usize {
        self.message.encrypted_keys.len()
    }
}

/// Encrypt `plaintext` once and wrap its key for every member.
///
/// A member whose key is malformed is skipped and reported; the message is
/// still produced for everyone else. Fails only when no member could be
/// wrapped.
pub fn encrypt_for_group(
    plaintext: &str,
    members: &[MemberKey],
    sender_id: &str,
    group_id: &str,
) -> CryptoResult<GroupEncryption> {
    if members.is_empty() {
        return Err(CryptoError::Encryption(format!("group {} has no members", group_id)));
    }

    let sealed = seal_content(plaintext.as_bytes());
    let mut encrypted_keys = BTreeMap::new();
    let mut skipped = Vec::new();

    for member in members {
        if encrypted_keys.contains_key(&member.user_id) {
            warn!(
                user = %member.user_id,
                group = group_id,
                "Duplicate group member, keeping first key"
            );
            continue;
        }

        let wrapped = validate_public_key(&member.public_key)
            .and_then(|_| wrap::wrap(&sealed.key, &member.public_key));
        match wrapped {
            Ok(wrapped) => {
                encrypted_keys.insert(member.user_id.clone(), wrapped);
            }
            Err(e) => {
                warn!(
                    user = %member.user_id,
                    group = group_id,
                    error = %e,
                    "Skipping group member"
                );
                skipped.push(SkippedMember {
                    user_id: member.user_id.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }

    if encrypted_keys.is_empty() {
        return Err(CryptoError::Encryption(format!(
            "no member of group {} has a usable key",
            group_id
        )));
    }

    debug!(
        group = group_id,
        recipients = encrypted_keys.len(),
        skipped = skipped.len(),
        "Encrypted group message"
    );

    Ok(GroupEncryption {
        message: GroupEncryptedMessage {
            group_id: group_id.to_string(),
            sender_id: sender_id.to_string(),
            encrypted_content: sealed.encrypted_content,
            encrypted_keys,
            iv: sealed.iv,
            key_version: INITIAL_KEY_VERSION,
            timestamp: Utc::now().timestamp_millis(),
            message_id: Uuid::new_v4().to_string(),
        },
        skipped,
    })
}

/// Decrypt a group message as `own_user_id`.
///
/// Keys are wrapped under each member's published key, so the unwrap uses
/// `own_keys.public_key`.
pub fn decrypt_from_group(
    message: &GroupEncryptedMessage,
    own_keys: &KeyPair,
    own_user_id: &str,
) -> CryptoResult<String> {
    message.validate()?;

    let wrapped = message
        .encrypted_keys
        .get(own_user_id)
        .ok_or_else(|| CryptoError::NotARecipient {
            user_id: own_user_id.to_string(),
        })?;

    let key = wrap::unwrap(wrapped, &own_keys.public_key)?;
    let plaintext = open_content(&message.encrypted_content, &message.iv, &key)?;

    debug!(group = %message.group_id, message = %message.message_id, "Decrypted group message");
    decode_text(plaintext)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn members(n: usize) -> Vec<(String, KeyPair)> {
        (0..n)
            .map(|i| (format!("user-{}", i), KeyPair::degraded()))
            .collect()
    }

    fn member_keys(members: &[(String, KeyPair)]) -> Vec<MemberKey> {
        members
            .iter()
            .map(|(id, kp)| MemberKey::new(id.clone(), kp.public_key.clone()))
            .collect()
    }

    #[test]
    fn every_member_decrypts() {
        let group = members(3);
        let result =
            encrypt_for_group("status update", &member_keys(&group), "user-0", "g1").unwrap();

        assert_eq!(result.recipient_count(), 3);
        assert!(result.skipped.is_empty());
        for (id, kp) in &group {
            assert_eq!(decrypt_from_group(&result.message, kp, id).unwrap(), "status update");
        }
    }

    #[test]
    fn outsider_is_not_a_recipient() {
        let group = members(3);
        let result =
            encrypt_for_group("status update", &member_keys(&group), "user-0", "g1").unwrap();

        let outsider = KeyPair::degraded();
        let err = decrypt_from_group(&result.message, &outsider, "user-99").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotARecipient);
    }

    #[test]
    fn malformed_member_key_is_skipped() {
        let group = members(3);
        let mut keys = member_keys(&group);
        keys.push(MemberKey::new("broken", "not a key!"));

        let result = encrypt_for_group("hi all", &keys, "user-0", "g1").unwrap();

        assert_eq!(result.recipient_count(), 3);
        assert_eq!(result.skipped.len(), 1);
        assert_eq!(result.skipped[0].user_id, "broken");
        for (id, kp) in &group {
            assert_eq!(decrypt_from_group(&result.message, kp, id).unwrap(), "hi all");
        }

        let err = decrypt_from_group(&result.message, &KeyPair::degraded(), "broken").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotARecipient);
    }

    #[test]
    fn all_members_malformed_fails() {
        let keys = vec![MemberKey::new("a", ""), MemberKey::new("b", "%%%")];
        let err = encrypt_for_group("hi", &keys, "a", "g1").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Encryption);
    }

    #[test]
    fn empty_group_fails() {
        assert!(encrypt_for_group("hi", &[], "a", "g1").is_err());
    }

    #[test]
    fn member_with_wrong_key_pair_gets_key_unwrap() {
        let group = members(2);
        let result = encrypt_for_group("hi", &member_keys(&group), "user-0", "g1").unwrap();

        let impostor = KeyPair::degraded();
        let err = decrypt_from_group(&result.message, &impostor, "user-1").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::KeyUnwrap);
    }

    #[test]
    fn duplicate_members_keep_first() {
        let group = members(1);
        let mut keys = member_keys(&group);
        keys.push(MemberKey::new("user-0", KeyPair::degraded().public_key));

        let result = encrypt_for_group("hi", &keys, "user-0", "g1").unwrap();
        assert_eq!(result.recipient_count(), 1);
        assert_eq!(decrypt_from_group(&result.message, &group[0].1, "user-0").unwrap(), "hi");
    }

    #[test]
    fn envelope_metadata() {
        let group = members(2);
        let a = encrypt_for_group("x", &member_keys(&group), "user-0", "g1").unwrap();
        let b = encrypt_for_group("x", &member_keys(&group), "user-0", "g1").unwrap();

        assert_eq!(a.message.group_id, "g1");
        assert_eq!(a.message.sender_id, "user-0");
        assert_eq!(a.message.key_version, INITIAL_KEY_VERSION);
        assert_ne!(a.message.message_id, b.message.message_id);
        assert!(Uuid::parse_str(&a.message.message_id).is_ok());
    }

    #[test]
    fn tampered_group_content_is_corrupt() {
        let group = members(1);
        let mut result =
            encrypt_for_group("hello group", &member_keys(&group), "user-0", "g1").unwrap();
        result.message.iv = crate::crypto::Iv::generate().to_base64();

        let err = decrypt_from_group(&result.message, &group[0].1, "user-0").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CorruptCiphertext);
    }
}
