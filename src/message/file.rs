//! File encryption: binary payloads through the text cipher pipeline.
//!
//! Bytes are base64 encoded before sealing and decoded after opening, so
//! files share the message key-wrap and staged error handling.

use std::fs;
use std::io::Cursor;
use std::path::Path;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use tracing::debug;

use super::pipeline::{open_content, seal_content};
use super::types::EncryptedFile;
use crate::crypto::wrap;
use crate::error::{CryptoError, CryptoResult};

/// A decrypted file, ready to render or save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptedFile {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub file_type: String,
}

impl DecryptedFile {
    /// In-memory stream over the file contents.
    pub fn reader(&self) -> Cursor<&[u8]> {
        Cursor::new(self.bytes.as_slice())
    }

    /// Write the contents to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> CryptoResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, &self.bytes)?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Encrypt a file for a partner.
///
/// `recipient_key` is the key material the message key is wrapped under:
/// the pairing's shared key in the two-party flow.
pub fn encrypt_file_for_partner(
    bytes: &[u8],
    file_name: &str,
    file_type: &str,
    recipient_key: &str,
) -> CryptoResult<EncryptedFile> {
    if file_name.is_empty() {
        return Err(CryptoError::Encryption("file name is required".into()));
    }

    let encoded = BASE64.encode(bytes);
    let sealed = seal_content(encoded.as_bytes());
    let encrypted_key = wrap::wrap(&sealed.key, recipient_key)?;

    debug!(
        file = file_name,
        size = bytes.len(),
        "Encrypted file for partner"
    );

    Ok(EncryptedFile {
        encrypted_content: sealed.encrypted_content,
        encrypted_key,
        iv: sealed.iv,
        file_name: file_name.to_string(),
        file_type: file_type.to_string(),
        file_size: bytes.len() as u64,
    })
}

/// Decrypt a file from a partner.
pub fn decrypt_file_from_partner(
    file: &EncryptedFile,
    key_material: &str,
) -> CryptoResult<DecryptedFile> {
    file.validate()?;

    let key = wrap::unwrap(&file.encrypted_key, key_material)?;
    let opened = open_content(&file.encrypted_content, &file.iv, &key)?;

    let encoded = String::from_utf8(opened)
        .map_err(|_| CryptoError::ContentDecode("file payload is not base64 text".into()))?;
    let bytes = BASE64
        .decode(encoded.trim())
        .map_err(|e| CryptoError::ContentDecode(format!("file payload is not base64: {}", e)))?;

    if bytes.len() as u64 != file.file_size {
        return Err(CryptoError::ContentDecode(format!(
            "file is {} bytes, envelope says {}",
            bytes.len(),
            file.file_size
        )));
    }

    debug!(file = %file.file_name, size = bytes.len(), "Decrypted file from partner");

    Ok(DecryptedFile {
        bytes,
        file_name: file.file_name.clone(),
        file_type: file.file_type.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::io::Read;
    use tempfile::tempdir;

    const KEY: &str = "3f1c0b9a7e6d5c4b3a29181706f5e4d3c2b1a09f8e7d6c5b4a39281706f5e4d3";

    fn binary_blob(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 % 256) as u8).collect()
    }

    #[test]
    fn roundtrip_preserves_bytes_and_size() {
        let data = binary_blob(10_000);
        let file = encrypt_file_for_partner(&data, "photo.png", "image/png", KEY).unwrap();
        assert_eq!(file.file_size, 10_000);

        let decrypted = decrypt_file_from_partner(&file, KEY).unwrap();
        assert_eq!(decrypted.bytes, data);
        assert_eq!(decrypted.file_name, "photo.png");
        assert_eq!(decrypted.file_type, "image/png");
    }

    #[test]
    fn size_is_pre_encoding_length() {
        let data = binary_blob(1000);
        let file = encrypt_file_for_partner(&data, "clip.mp4", "video/mp4", KEY).unwrap();

        // base64 inflates, the recorded size must not
        assert_eq!(file.file_size, 1000);
        assert!(BASE64.decode(&file.encrypted_content).unwrap().len() > 1000);
    }

    #[test]
    fn empty_file_roundtrip() {
        let file =
            encrypt_file_for_partner(&[], "empty.bin", "application/octet-stream", KEY).unwrap();
        let decrypted = decrypt_file_from_partner(&file, KEY).unwrap();
        assert!(decrypted.is_empty());
    }

    #[test]
    fn size_mismatch_is_content_decode() {
        let mut file = encrypt_file_for_partner(b"abc", "a.txt", "text/plain", KEY).unwrap();
        file.file_size = 4;
        let err = decrypt_file_from_partner(&file, KEY).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ContentDecode);
    }

    #[test]
    fn wrong_key_is_key_unwrap() {
        let file = encrypt_file_for_partner(b"abc", "a.txt", "text/plain", KEY).unwrap();
        let err = decrypt_file_from_partner(&file, "some-other-key").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::KeyUnwrap);
    }

    #[test]
    fn reader_and_save() {
        let data = binary_blob(512);
        let file =
            encrypt_file_for_partner(&data, "blob.bin", "application/octet-stream", KEY).unwrap();
        let decrypted = decrypt_file_from_partner(&file, KEY).unwrap();

        let mut streamed = Vec::new();
        decrypted.reader().read_to_end(&mut streamed).unwrap();
        assert_eq!(streamed, data);

        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("blob.bin");
        decrypted.save_to(&path).unwrap();
        assert_eq!(fs::read(&path).unwrap(), data);
    }

    #[test]
    fn missing_file_name_is_rejected() {
        assert!(encrypt_file_for_partner(b"abc", "", "text/plain", KEY).is_err());
    }
}
