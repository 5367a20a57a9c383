//! CLI command implementations.

use std::fmt;
use std::fs;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use serde_json::Value;
use tracing::{info, warn};

use super::CliContext;
use crate::crypto::{KeyMode, KeyPair, KeyPairGenerator};
use crate::message::{
    decrypt_file_from_partner, encrypt_for_group, is_valid_encrypted_file,
    is_valid_encrypted_message, is_valid_group_encrypted_message, open_payload, DecryptedFile,
    EncryptedFile, EncryptedMessage, GroupEncryptedMessage, GroupEncryption, MemberKey,
    OpenContext, Payload, RenderedMessage,
};

/// Generate and store a new key pair, replacing any existing one.
pub async fn handle_keygen(ctx: &CliContext, enhanced: bool) -> Result<KeyPair> {
    let generator = KeyPairGenerator::default();
    let key_pair = if enhanced {
        generator.generate_enhanced_key_pair().await
    } else {
        generator.generate_key_pair().await
    };

    if key_pair.is_degraded() {
        warn!("Key pair is DEGRADED: random strings, not an RSA pair");
    }
    ctx.session()?.set_key_pair(key_pair.clone())?;
    info!(mode = ?key_pair.mode, "Stored new key pair");
    Ok(key_pair)
}

/// The own public key, for sharing with a partner.
pub fn handle_show_key(ctx: &CliContext) -> Result<String> {
    ctx.session()?
        .key_pair()
        .map(|pair| pair.public_key)
        .ok_or_else(|| anyhow!("No key pair yet, run `pairlock keygen` first"))
}

/// Record the partner's public key. Returns the shared key fingerprint.
pub fn handle_pair(ctx: &CliContext, partner_public_key: &str) -> Result<String> {
    let session = ctx.session()?;
    session
        .set_partner_public_key(partner_public_key)
        .context("Partner key rejected")?;

    session
        .shared_key()
        .map(|key| key.fingerprint().to_string())
        .ok_or_else(|| {
            anyhow!("Partner key stored, but no own key pair yet; run `pairlock keygen`")
        })
}

/// Encrypt text for the partner. Returns the payload as JSON.
pub fn handle_encrypt(ctx: &CliContext, text: &str) -> Result<String> {
    let payload = ctx
        .session()?
        .seal_text(text, ctx.policy)
        .context("Cannot encrypt; pair with a partner first")?;
    Ok(payload.to_json()?)
}

/// Decrypt a payload, or a bare envelope, received from the partner.
pub fn handle_decrypt(ctx: &CliContext, envelope: &str) -> Result<RenderedMessage> {
    let payload = parse_envelope(envelope)?;
    Ok(ctx.session()?.open(&payload, ""))
}

/// Encrypt a file for the partner. Returns the payload as JSON.
pub fn handle_encrypt_file(ctx: &CliContext, path: &Path, mime: Option<&str>) -> Result<String> {
    let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow!("{} has no usable file name", path.display()))?;
    let file_type = mime.unwrap_or_else(|| guess_mime(path));

    let payload = ctx
        .session()?
        .seal_file(&bytes, file_name, file_type)
        .context("Cannot encrypt file; pair with a partner first")?;
    Ok(payload.to_json()?)
}

/// Decrypt a file envelope read from `envelope_path` and write it to `out`.
pub fn handle_decrypt_file(
    ctx: &CliContext,
    envelope_path: &Path,
    out: &Path,
) -> Result<DecryptedFile> {
    let raw = fs::read_to_string(envelope_path)
        .with_context(|| format!("Failed to read {}", envelope_path.display()))?;
    let file = match parse_envelope(&raw)? {
        Payload::EncryptedFile(file) => file,
        _ => bail!("{} is not a file envelope", envelope_path.display()),
    };

    let shared = ctx
        .session()?
        .shared_key()
        .ok_or_else(|| anyhow!("No shared key; pair with a partner first"))?;
    let decrypted = decrypt_file_from_partner(&file, shared.as_str())?;
    decrypted.save_to(out)?;
    Ok(decrypted)
}

/// Encrypt text for a set of `user=public_key` members.
pub fn handle_group_encrypt(
    group_id: &str,
    sender_id: &str,
    members: &[String],
    text: &str,
) -> Result<GroupEncryption> {
    let members = members
        .iter()
        .map(|spec| parse_member(spec))
        .collect::<Result<Vec<_>>>()?;
    Ok(encrypt_for_group(text, &members, sender_id, group_id)?)
}

/// Decrypt a group envelope as `user_id` with the stored key pair.
pub fn handle_group_decrypt(
    ctx: &CliContext,
    envelope: &str,
    user_id: &str,
) -> Result<RenderedMessage> {
    let payload = parse_envelope(envelope)?;
    if !matches!(payload, Payload::Group(_)) {
        bail!("Not a group envelope");
    }

    let session = ctx.session()?;
    let keys = session.snapshot();
    let open = OpenContext {
        user_id,
        shared_key: None,
        key_pair: keys.key_pair.as_ref(),
    };
    Ok(open_payload(&payload, &open))
}

/// Remove all stored key material.
pub fn handle_clear_keys(ctx: &CliContext) -> Result<()> {
    ctx.session()?.clear_keys()?;
    Ok(())
}

/// Summary of the local key state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub key_mode: Option<KeyMode>,
    pub paired: bool,
    pub fingerprint: Option<String>,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.key_mode {
            Some(mode) => writeln!(f, "Key pair:    {:?}", mode)?,
            None => writeln!(f, "Key pair:    none")?,
        }
        match &self.fingerprint {
            Some(fp) => write!(f, "Pairing:     established ({})", fp),
            None => write!(f, "Pairing:     none"),
        }
    }
}

pub fn handle_status(ctx: &CliContext) -> Result<Status> {
    let keys = ctx.session()?.snapshot();
    Ok(Status {
        key_mode: keys.key_pair.as_ref().map(|pair| pair.mode),
        paired: keys.is_paired(),
        fingerprint: keys.shared_key.as_ref().map(|k| k.fingerprint().to_string()),
    })
}

/// Accept either a tagged payload or a bare envelope.
fn parse_envelope(raw: &str) -> Result<Payload> {
    if let Ok(payload) = Payload::from_json(raw) {
        return Ok(payload);
    }

    let value: Value = serde_json::from_str(raw).context("Envelope is not JSON")?;
    let payload = if is_valid_group_encrypted_message(&value) {
        Payload::Group(GroupEncryptedMessage::from_json(raw)?)
    } else if is_valid_encrypted_file(&value) {
        Payload::EncryptedFile(EncryptedFile::from_json(raw)?)
    } else if is_valid_encrypted_message(&value) {
        Payload::Encrypted(EncryptedMessage::from_json(raw)?)
    } else {
        bail!("Not a valid encrypted message");
    };
    Ok(payload)
}

fn parse_member(spec: &str) -> Result<MemberKey> {
    let (user, key) = spec
        .split_once('=')
        .ok_or_else(|| anyhow!("Member `{}` must look like USER=PUBLIC_KEY", spec))?;
    if user.is_empty() {
        bail!("Member `{}` has no user id", spec);
    }
    Ok(MemberKey::new(user, key))
}

fn guess_mime(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "txt" => "text/plain",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "pdf" => "application/pdf",
        "mp4" => "video/mp4",
        "json" => "application/json",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn member_spec_parsing() {
        // base64 keys may end in '=' so only the first one splits
        let member = parse_member("bob=QUJD==").unwrap();
        assert_eq!(member.user_id, "bob");
        assert_eq!(member.public_key, "QUJD==");

        assert!(parse_member("bob").is_err());
        assert!(parse_member("=key").is_err());
    }

    #[test]
    fn mime_from_extension() {
        assert_eq!(guess_mime(Path::new("a/photo.PNG")), "image/png");
        assert_eq!(guess_mime(Path::new("notes")), "application/octet-stream");
    }

    #[test]
    fn garbage_envelope_is_rejected() {
        assert!(parse_envelope("not json").is_err());
        assert!(parse_envelope(r#"{"hello":"world"}"#).is_err());
    }

    #[test]
    fn status_display() {
        let status = Status {
            key_mode: Some(KeyMode::Standard),
            paired: true,
            fingerprint: Some("0123456789abcdef".into()),
        };
        let text = status.to_string();
        assert!(text.contains("Standard"));
        assert!(text.contains("0123456789abcdef"));
    }
}
