//! Seen marker entity definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The furthest message a participant has acknowledged in a room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeenMarker {
    pub room_id: String,
    pub identity: String,
    pub last_seen_seq: i64,
    pub last_seen_message_id: String,
    pub updated_at: DateTime<Utc>,
}
