//! Queue for sends waiting on key exchange.
//!
//! When no shared key exists yet, text is held here per partner instead of
//! going out unencrypted, and drained once the exchange completes.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// A message waiting for encryption setup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSend {
    pub id: Uuid,
    pub partner_id: String,
    pub text: String,
    pub queued_at: DateTime<Utc>,
}

/// Per-partner queues of pending sends.
#[derive(Debug, Default)]
pub struct PendingQueue {
    pending: HashMap<String, VecDeque<PendingSend>>,
}

impl PendingQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold `text` for `partner_id`. Returns the id of the queued send.
    pub fn enqueue(&mut self, partner_id: &str, text: impl Into<String>) -> Uuid {
        let send = PendingSend {
            id: Uuid::new_v4(),
            partner_id: partner_id.to_string(),
            text: text.into(),
            queued_at: Utc::now(),
        };
        let id = send.id;
        self.pending
            .entry(partner_id.to_string())
            .or_default()
            .push_back(send);
        id
    }

    /// Remove and return everything queued for a partner, oldest first.
    pub fn drain(&mut self, partner_id: &str) -> Vec<PendingSend> {
        self.pending
            .remove(partner_id)
            .map(Vec::from)
            .unwrap_or_default()
    }

    /// Put sends back at the front of their partners' queues, keeping
    /// their ids and order.
    pub fn restore(&mut self, sends: Vec<PendingSend>) {
        for send in sends.into_iter().rev() {
            self.pending
                .entry(send.partner_id.clone())
                .or_default()
                .push_front(send);
        }
    }

    pub fn pending_count(&self, partner_id: &str) -> usize {
        self.pending.get(partner_id).map_or(0, VecDeque::len)
    }

    pub fn total_pending(&self) -> usize {
        self.pending.values().map(VecDeque::len).sum()
    }

    /// Drop a single pending send. Returns whether it was found.
    pub fn cancel(&mut self, id: Uuid) -> bool {
        for queue in self.pending.values_mut() {
            if let Some(pos) = queue.iter().position(|s| s.id == id) {
                queue.remove(pos);
                return true;
            }
        }
        false
    }

    /// Drop everything. Returns how many sends were discarded.
    pub fn clear_all(&mut self) -> usize {
        let dropped = self.total_pending();
        self.pending.clear();
        dropped
    }
}
