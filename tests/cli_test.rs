//! CLI command tests against temporary data directories.

use std::fs;

use tempfile::TempDir;

use pairlock::cli::{self, CliContext};
use pairlock::crypto::KeyMode;
use pairlock::message::RenderedMessage;

fn context(dir: &TempDir) -> CliContext {
    CliContext::new(dir.path(), false)
}

/// Test: two users pair through the CLI and exchange a message and a file.
#[tokio::test]
async fn pair_encrypt_decrypt() {
    let a_dir = TempDir::new().unwrap();
    let b_dir = TempDir::new().unwrap();
    let a = context(&a_dir);
    let b = context(&b_dir);

    let a_pair = cli::handle_keygen(&a, false).await.unwrap();
    assert_eq!(a_pair.mode, KeyMode::Standard);
    cli::handle_keygen(&b, false).await.unwrap();
    assert!(a.db_path().exists());

    let a_key = cli::handle_show_key(&a).unwrap();
    let b_key = cli::handle_show_key(&b).unwrap();
    assert_eq!(a_key, a_pair.public_key);

    let a_fp = cli::handle_pair(&a, &b_key).unwrap();
    let b_fp = cli::handle_pair(&b, &a_key).unwrap();
    assert_eq!(a_fp, b_fp);

    let envelope = cli::handle_encrypt(&a, "hello from a").unwrap();
    assert_eq!(
        cli::handle_decrypt(&b, &envelope).unwrap(),
        RenderedMessage::Text("hello from a".into())
    );

    let source = a_dir.path().join("notes.txt");
    fs::write(&source, b"line one\nline two\n").unwrap();
    let file_envelope = cli::handle_encrypt_file(&a, &source, None).unwrap();
    let envelope_path = b_dir.path().join("notes.envelope.json");
    fs::write(&envelope_path, file_envelope).unwrap();

    let out = b_dir.path().join("out").join("notes.txt");
    let file = cli::handle_decrypt_file(&b, &envelope_path, &out).unwrap();
    assert_eq!(file.file_type, "text/plain");
    assert_eq!(fs::read(&out).unwrap(), b"line one\nline two\n");
}

/// Test: encrypting without a pairing refuses unless plaintext is allowed.
#[tokio::test]
async fn encrypt_before_pairing() {
    let dir = TempDir::new().unwrap();
    let strict = context(&dir);
    assert!(cli::handle_encrypt(&strict, "hi").is_err());
    assert!(cli::handle_show_key(&strict).is_err());

    let relaxed = CliContext::new(dir.path(), true);
    let payload = cli::handle_encrypt(&relaxed, "hi").unwrap();
    assert!(payload.contains(r#""kind":"plain""#));
    assert_eq!(
        cli::handle_decrypt(&strict, &payload).unwrap().display_text(),
        "[unencrypted] hi"
    );
}

/// Test: group encrypt with public keys, decrypt with the stored pair.
#[tokio::test]
async fn group_encrypt_and_decrypt() {
    let dir = TempDir::new().unwrap();
    let ctx = context(&dir);
    let pair = cli::handle_keygen(&ctx, false).await.unwrap();

    let members = vec![
        format!("bob={}", pair.public_key),
        "ghost=".to_string(),
    ];
    let encryption = cli::handle_group_encrypt("team", "alice", &members, "status update").unwrap();
    assert_eq!(encryption.recipient_count(), 1);
    assert_eq!(encryption.skipped[0].user_id, "ghost");

    let json = serde_json::to_string(&encryption.message).unwrap();
    assert_eq!(
        cli::handle_group_decrypt(&ctx, &json, "bob").unwrap(),
        RenderedMessage::Text("status update".into())
    );
    assert!(cli::handle_group_decrypt(&ctx, &json, "carol")
        .unwrap()
        .is_undecryptable());
}

/// Test: status reflects keys, and clear-keys wipes them.
#[tokio::test]
async fn status_and_clear() {
    let dir = TempDir::new().unwrap();
    let ctx = context(&dir);

    let status = cli::handle_status(&ctx).unwrap();
    assert_eq!(status.key_mode, None);
    assert!(!status.paired);

    let pair = cli::handle_keygen(&ctx, false).await.unwrap();
    let partner = pairlock::crypto::KeyPair::degraded();
    cli::handle_pair(&ctx, &partner.public_key).unwrap();

    let status = cli::handle_status(&ctx).unwrap();
    assert_eq!(status.key_mode, Some(pair.mode));
    assert!(status.paired);

    cli::handle_clear_keys(&ctx).unwrap();
    let status = cli::handle_status(&ctx).unwrap();
    assert_eq!(status.key_mode, None);
    assert!(status.fingerprint.is_none());
}

/// Test: garbage input is rejected, not decrypted.
#[tokio::test]
async fn decrypt_garbage() {
    let dir = TempDir::new().unwrap();
    let ctx = context(&dir);
    assert!(cli::handle_decrypt(&ctx, "not json").is_err());

    let rendered = cli::handle_decrypt(
        &ctx,
        r#"{"encryptedContent":"AAAA","encryptedKey":"AAAA","iv":"AAAA"}"#,
    )
    .unwrap();
    // right shape, but the fields are not cipher material
    match rendered {
        RenderedMessage::Undecryptable { placeholder, .. } => {
            assert_eq!(placeholder, "not a valid encrypted message")
        }
        other => panic!("unexpected {:?}", other),
    }
}
