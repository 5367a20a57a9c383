//! Integration tests for pairlock.
//!
//! End-to-end flows with real RSA key pairs.

use pairlock::crypto::{derive_shared_key, generate_key_pair, KeyMode, KeyPair};
use pairlock::error::ErrorKind;
use pairlock::message::{
    decrypt_file_from_partner, decrypt_from_group, decrypt_from_partner, encrypt_file_for_partner,
    encrypt_for_group, encrypt_for_partner, is_valid_encrypted_message,
    is_valid_group_encrypted_message, EncryptedMessage, GroupEncryptedMessage, MemberKey,
};

/// Test: two peers pair up, a third party cannot read their traffic.
#[tokio::test]
async fn paired_peers_and_an_eavesdropper() {
    let a = generate_key_pair().await;
    let b = generate_key_pair().await;
    let c = generate_key_pair().await;
    assert_eq!(a.mode, KeyMode::Standard);

    // Both sides derive the same key independently
    let s_a = derive_shared_key(&a.public_key, &b.public_key).unwrap();
    let s_b = derive_shared_key(&b.public_key, &a.public_key).unwrap();
    assert_eq!(s_a, s_b);

    let envelope = encrypt_for_partner("hello", Some(&s_a)).unwrap();
    assert_eq!(decrypt_from_partner(&envelope, Some(&s_b)).unwrap(), "hello");

    let s_c = derive_shared_key(&c.public_key, &a.public_key).unwrap();
    let err = decrypt_from_partner(&envelope, Some(&s_c)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::KeyUnwrap);
}

/// Test: envelope survives JSON transport and passes the shape check.
#[tokio::test]
async fn envelope_through_json() {
    let a = KeyPair::degraded();
    let b = KeyPair::degraded();
    let shared = derive_shared_key(&a.public_key, &b.public_key).unwrap();

    let envelope = encrypt_for_partner("über 漢字 🎉", Some(&shared)).unwrap();
    let json = serde_json::to_string(&envelope).unwrap();

    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert!(is_valid_encrypted_message(&value));

    let parsed = EncryptedMessage::from_json(&json).unwrap();
    assert_eq!(decrypt_from_partner(&parsed, Some(&shared)).unwrap(), "über 漢字 🎉");
}

/// Test: three members read a group message, an outsider cannot.
#[tokio::test]
async fn group_of_three_and_an_outsider() {
    let mut members = Vec::new();
    for name in ["alice", "bob", "carol"] {
        members.push((name, generate_key_pair().await));
    }
    let outsider = generate_key_pair().await;

    let keys: Vec<MemberKey> = members
        .iter()
        .map(|(name, pair)| MemberKey::new(*name, pair.public_key.clone()))
        .collect();
    let encryption = encrypt_for_group("status update", &keys, "alice", "team").unwrap();
    assert_eq!(encryption.message.encrypted_keys.len(), 3);
    assert!(encryption.skipped.is_empty());

    let json = serde_json::to_string(&encryption.message).unwrap();
    assert!(is_valid_group_encrypted_message(&serde_json::from_str(&json).unwrap()));
    let message = GroupEncryptedMessage::from_json(&json).unwrap();

    for (name, pair) in &members {
        assert_eq!(decrypt_from_group(&message, pair, name).unwrap(), "status update");
    }

    let err = decrypt_from_group(&message, &outsider, "dave").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotARecipient);
}

/// Test: a broken member key does not block the rest of the group.
#[tokio::test]
async fn group_with_one_broken_key() {
    let bob = KeyPair::degraded();
    let carol = KeyPair::degraded();
    let keys = vec![
        MemberKey::new("bob", bob.public_key.clone()),
        MemberKey::new("mallory", "definitely not a key"),
        MemberKey::new("carol", carol.public_key.clone()),
    ];

    let encryption = encrypt_for_group("still works", &keys, "alice", "team").unwrap();
    assert_eq!(encryption.recipient_count(), 2);
    assert_eq!(encryption.skipped.len(), 1);
    assert_eq!(encryption.skipped[0].user_id, "mallory");

    assert_eq!(decrypt_from_group(&encryption.message, &bob, "bob").unwrap(), "still works");
    assert_eq!(decrypt_from_group(&encryption.message, &carol, "carol").unwrap(), "still works");
}

/// Test: a file keeps its bytes, name, type and size.
#[tokio::test]
async fn file_between_partners() {
    let a = KeyPair::degraded();
    let b = KeyPair::degraded();
    let shared = derive_shared_key(&a.public_key, &b.public_key).unwrap();

    let data: Vec<u8> = (0..=255u8).cycle().take(70_000).collect();
    let file =
        encrypt_file_for_partner(&data, "scan.pdf", "application/pdf", shared.as_str()).unwrap();
    assert_eq!(file.file_size, 70_000);

    let json = serde_json::to_string(&file).unwrap();
    let parsed = serde_json::from_str(&json).unwrap();
    let decrypted = decrypt_file_from_partner(&parsed, shared.as_str()).unwrap();

    assert_eq!(decrypted.bytes, data);
    assert_eq!(decrypted.file_name, "scan.pdf");
    assert_eq!(decrypted.file_type, "application/pdf");
}

/// Test: a message of over a megabyte round trips.
#[tokio::test]
async fn large_message_round_trip() {
    let shared =
        derive_shared_key(&KeyPair::degraded().public_key, &KeyPair::degraded().public_key)
            .unwrap();
    let text = "lorem ipsum ".repeat(100_000);

    let envelope = encrypt_for_partner(&text, Some(&shared)).unwrap();
    assert_eq!(decrypt_from_partner(&envelope, Some(&shared)).unwrap(), text);
}
