//! Results returned by the chat services.

use serde::Serialize;

use parley_database::{ChatMessage, ChatRequest, ChatRoom, SeenMarker};

/// Outcome of resolving a request. `room` is only set when it was accepted.
#[derive(Debug, Clone, Serialize)]
pub struct Resolution {
    pub request: ChatRequest,
    pub room: Option<ChatRoom>,
}

impl Resolution {
    pub fn room_id(&self) -> Option<&str> {
        self.room.as_ref().map(|room| room.public_id.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryPage {
    pub messages: Vec<ChatMessage>,
    /// Pass back as `since` to continue; absent once the history is exhausted.
    pub next_cursor: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SeenState {
    pub marker: Option<SeenMarker>,
    pub unread: i64,
}
