//! Chat room entity definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A two-party room opened by an accepted request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRoom {
    #[serde(skip)]
    pub id: i64,
    pub public_id: String,
    pub request_id: String,
    pub participants: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl ChatRoom {
    pub fn has_participant(&self, identity: &str) -> bool {
        self.participants.iter().any(|participant| participant == identity)
    }
}
