//! Invite codes gating who may start a key exchange.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};

/// Length of generated invite codes.
pub const CODE_LEN: usize = 10;

/// What accepting an invite leads to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InviteType {
    Friend,
    Group,
}

/// An invite issued by a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteCode {
    pub code: String,
    pub created_by: String,
    pub expires_at: DateTime<Utc>,
    pub max_uses: u32,
    pub current_uses: u32,
    #[serde(rename = "type")]
    pub invite_type: InviteType,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl InviteCode {
    /// Issue a fresh invite valid for `ttl`.
    pub fn issue(created_by: &str, invite_type: InviteType, ttl: Duration, max_uses: u32) -> Self {
        let code = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(CODE_LEN)
            .map(char::from)
            .collect::<String>()
            .to_uppercase();

        Self {
            code,
            created_by: created_by.to_string(),
            expires_at: Utc::now() + ttl,
            max_uses,
            current_uses: 0,
            invite_type,
            metadata: BTreeMap::new(),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn has_uses_remaining(&self) -> bool {
        self.current_uses < self.max_uses
    }

    /// Consume one use.
    pub fn redeem(&mut self, now: DateTime<Utc>) -> Result<(), &'static str> {
        if self.is_expired(now) {
            return Err("Invite has expired");
        }
        if !self.has_uses_remaining() {
            return Err("Invite has no uses left");
        }
        self.current_uses += 1;
        Ok(())
    }
}
