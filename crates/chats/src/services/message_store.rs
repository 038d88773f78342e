//! Message persistence, cursor-paged history and seen markers.

use parley_auth::Identity;
use parley_config::RealtimeConfig;
use parley_database::{
    ChatMessage, DatabaseError, MessageRepository, RoomRepository, SeenMarker, SeenRepository,
};
use sqlx::SqlitePool;
use tracing::debug;

use crate::types::{ChatError, ChatResult, HistoryPage, HistoryQuery, SeenState};

const DEFAULT_PAGE_SIZE: u32 = 50;

/// Bounds applied to message content and history pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreLimits {
    pub max_content_chars: usize,
    pub default_page_size: u32,
    pub max_page_size: u32,
}

impl Default for StoreLimits {
    fn default() -> Self {
        Self {
            max_content_chars: 4_000,
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: 200,
        }
    }
}

impl From<&RealtimeConfig> for StoreLimits {
    fn from(config: &RealtimeConfig) -> Self {
        let max_page_size = config.history_page_limit.max(1);
        Self {
            max_content_chars: config.max_message_chars,
            default_page_size: DEFAULT_PAGE_SIZE.min(max_page_size),
            max_page_size,
        }
    }
}

#[derive(Clone)]
pub struct MessageStore {
    messages: MessageRepository,
    rooms: RoomRepository,
    seen: SeenRepository,
    limits: StoreLimits,
}

impl MessageStore {
    pub fn new(pool: SqlitePool, limits: StoreLimits) -> Self {
        Self {
            messages: MessageRepository::new(pool.clone()),
            rooms: RoomRepository::new(pool.clone()),
            seen: SeenRepository::new(pool),
            limits,
        }
    }

    fn validate_content(&self, content: &str) -> ChatResult<()> {
        if content.trim().is_empty() {
            return Err(ChatError::EmptyContent);
        }
        if content.chars().count() > self.limits.max_content_chars {
            return Err(ChatError::ContentTooLong {
                max: self.limits.max_content_chars,
            });
        }
        Ok(())
    }

    async fn ensure_participant(&self, room_id: &str, identity: &Identity) -> ChatResult<()> {
        if self.rooms.is_participant(room_id, identity.as_str()).await? {
            Ok(())
        } else {
            Err(ChatError::NotParticipant {
                room: room_id.to_owned(),
            })
        }
    }

    /// Persist a message from `sender`. Content is stored exactly as sent.
    pub async fn append(&self, room_id: &str, sender: &Identity, content: &str) -> ChatResult<ChatMessage> {
        self.ensure_participant(room_id, sender).await?;
        self.validate_content(content)?;

        match self.messages.create(room_id, sender.as_str(), content).await {
            Ok(message) => Ok(message),
            Err(DatabaseError::NotFound(_)) => Err(ChatError::NotParticipant {
                room: room_id.to_owned(),
            }),
            Err(error) => Err(error.into()),
        }
    }

    /// Messages strictly after `since`, oldest first.
    pub async fn history(&self, room_id: &str, query: HistoryQuery) -> ChatResult<HistoryPage> {
        let limit = query
            .limit
            .unwrap_or(self.limits.default_page_size)
            .clamp(1, self.limits.max_page_size);
        let since = query.since.unwrap_or(0).max(0);

        let mut messages = self
            .messages
            .list_after(room_id, since, i64::from(limit) + 1)
            .await?;

        let next_cursor = if messages.len() > limit as usize {
            messages.truncate(limit as usize);
            messages.last().map(|message| message.seq)
        } else {
            None
        };

        debug!(room_id, since, limit, returned = messages.len(), "history page served");
        Ok(HistoryPage {
            messages,
            next_cursor,
        })
    }

    /// Advance `identity`'s marker to `message_id`. Older messages leave the
    /// marker where it is.
    pub async fn mark_seen(&self, room_id: &str, identity: &Identity, message_id: &str) -> ChatResult<SeenMarker> {
        self.ensure_participant(room_id, identity).await?;

        let message = self
            .messages
            .find_in_room(room_id, message_id)
            .await?
            .ok_or_else(|| ChatError::MessageNotFound {
                id: message_id.to_owned(),
            })?;

        Ok(self.seen.advance(identity.as_str(), &message).await?)
    }

    pub async fn seen_state(&self, room_id: &str, identity: &Identity) -> ChatResult<SeenState> {
        self.ensure_participant(room_id, identity).await?;

        let marker = self.seen.find(room_id, identity.as_str()).await?;
        let after = marker.as_ref().map_or(0, |marker| marker.last_seen_seq);
        let unread = self
            .messages
            .count_unread(room_id, identity.as_str(), after)
            .await?;

        Ok(SeenState { marker, unread })
    }
}
