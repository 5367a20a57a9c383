//! Command-line front end over the local key store.

mod commands;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

pub use commands::*;

use crate::identity::{EncryptionSession, FallbackPolicy, KeyStore};

/// Database file inside the data directory.
pub const DB_FILE: &str = "pairlock.db";

/// Settings shared by every command.
#[derive(Debug, Clone)]
pub struct CliContext {
    pub data_dir: PathBuf,
    pub policy: FallbackPolicy,
}

impl CliContext {
    pub fn new(data_dir: impl Into<PathBuf>, allow_plaintext: bool) -> Self {
        Self {
            data_dir: data_dir.into(),
            policy: if allow_plaintext {
                FallbackPolicy::AllowPlaintext
            } else {
                FallbackPolicy::Refuse
            },
        }
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(DB_FILE)
    }

    /// Open the persisted session in the data directory.
    pub fn session(&self) -> Result<EncryptionSession> {
        let store = KeyStore::open(&self.db_path())
            .with_context(|| format!("Failed to open key store in {}", self.data_dir.display()))?;
        EncryptionSession::with_store(store).context("Failed to load keys")
    }
}

/// Expand a leading `~` to the home directory.
pub fn expand_home(path: &Path) -> Result<PathBuf> {
    match path.strip_prefix("~") {
        Ok(rest) => {
            let home = dirs::home_dir().context("Could not find home directory")?;
            Ok(home.join(rest))
        }
        Err(_) => Ok(path.to_path_buf()),
    }
}
