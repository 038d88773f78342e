//! Repository for message data access operations.

use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use crate::entities::ChatMessage;
use crate::types::{DatabaseError, DatabaseResult};

const MESSAGE_SELECT: &str = "SELECT m.seq, m.public_id, r.public_id AS room_public_id, m.sender_id, m.content, m.created_at
     FROM messages m
     JOIN chat_rooms r ON r.id = m.room_id";

#[derive(Clone)]
pub struct MessageRepository {
    pool: SqlitePool,
}

fn message_from_row(row: &SqliteRow) -> DatabaseResult<ChatMessage> {
    Ok(ChatMessage {
        seq: row.try_get("seq")?,
        public_id: row.try_get("public_id")?,
        room_id: row.try_get("room_public_id")?,
        sender_id: row.try_get("sender_id")?,
        content: row.try_get("content")?,
        created_at: row.try_get("created_at")?,
    })
}

impl MessageRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Append a message. The insert only matches when `sender_id` participates
    /// in the room, otherwise [`DatabaseError::NotFound`] is returned.
    pub async fn create(
        &self,
        room_public_id: &str,
        sender_id: &str,
        content: &str,
    ) -> DatabaseResult<ChatMessage> {
        let public_id = cuid2::create_id();
        let now = Utc::now();

        let result = sqlx::query(
            "INSERT INTO messages (public_id, room_id, sender_id, content, created_at)
             SELECT ?, r.id, ?, ?, ?
             FROM chat_rooms r
             JOIN room_participants p ON p.room_id = r.id AND p.identity = ?
             WHERE r.public_id = ?",
        )
        .bind(&public_id)
        .bind(sender_id)
        .bind(content)
        .bind(now)
        .bind(sender_id)
        .bind(room_public_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!(
                "room {room_public_id} with participant {sender_id}"
            )));
        }

        let seq = result.last_insert_rowid();
        debug!(room = room_public_id, seq, "message stored");

        Ok(ChatMessage {
            seq,
            public_id,
            room_id: room_public_id.to_owned(),
            sender_id: sender_id.to_owned(),
            content: content.to_owned(),
            created_at: now,
        })
    }

    /// Messages in the room with `seq > after_seq`, in sequence order.
    pub async fn list_after(
        &self,
        room_public_id: &str,
        after_seq: i64,
        limit: i64,
    ) -> DatabaseResult<Vec<ChatMessage>> {
        let rows = sqlx::query(&format!(
            "{MESSAGE_SELECT} WHERE r.public_id = ? AND m.seq > ? ORDER BY m.seq ASC LIMIT ?"
        ))
        .bind(room_public_id)
        .bind(after_seq)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(message_from_row).collect()
    }

    pub async fn find_in_room(
        &self,
        room_public_id: &str,
        message_public_id: &str,
    ) -> DatabaseResult<Option<ChatMessage>> {
        let row = sqlx::query(&format!(
            "{MESSAGE_SELECT} WHERE r.public_id = ? AND m.public_id = ?"
        ))
        .bind(room_public_id)
        .bind(message_public_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(message_from_row).transpose()
    }

    /// Messages from other participants newer than `after_seq`.
    pub async fn count_unread(
        &self,
        room_public_id: &str,
        identity: &str,
        after_seq: i64,
    ) -> DatabaseResult<i64> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM messages m
             JOIN chat_rooms r ON r.id = m.room_id
             WHERE r.public_id = ? AND m.seq > ? AND m.sender_id <> ?",
        )
        .bind(room_public_id)
        .bind(after_seq)
        .bind(identity)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }
}
