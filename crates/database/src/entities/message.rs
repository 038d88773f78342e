//! Message entity definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A persisted room message. `seq` is globally increasing and orders a room's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub seq: i64,
    pub public_id: String,
    pub room_id: String,
    pub sender_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}
