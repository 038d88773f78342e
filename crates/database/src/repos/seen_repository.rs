//! Repository for per-participant seen markers.

use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::entities::{ChatMessage, SeenMarker};
use crate::types::{DatabaseError, DatabaseResult};

#[derive(Clone)]
pub struct SeenRepository {
    pool: SqlitePool,
}

fn marker_from_row(row: &SqliteRow) -> DatabaseResult<SeenMarker> {
    Ok(SeenMarker {
        room_id: row.try_get("room_public_id")?,
        identity: row.try_get("identity")?,
        last_seen_seq: row.try_get("last_seen_seq")?,
        last_seen_message_id: row.try_get("last_seen_message_id")?,
        updated_at: row.try_get("updated_at")?,
    })
}

impl SeenRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Move the marker forward to `message`. A marker never moves backwards;
    /// an older message leaves it untouched. Returns the stored marker.
    pub async fn advance(&self, identity: &str, message: &ChatMessage) -> DatabaseResult<SeenMarker> {
        sqlx::query(
            "INSERT INTO seen_markers (room_id, identity, last_seen_seq, last_seen_message_id, updated_at)
             SELECT r.id, ?, ?, ?, ? FROM chat_rooms r WHERE r.public_id = ?
             ON CONFLICT (room_id, identity) DO UPDATE SET
                 last_seen_seq = excluded.last_seen_seq,
                 last_seen_message_id = excluded.last_seen_message_id,
                 updated_at = excluded.updated_at
             WHERE excluded.last_seen_seq > seen_markers.last_seen_seq",
        )
        .bind(identity)
        .bind(message.seq)
        .bind(&message.public_id)
        .bind(Utc::now())
        .bind(&message.room_id)
        .execute(&self.pool)
        .await?;

        self.find(&message.room_id, identity)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("room {}", message.room_id)))
    }

    pub async fn find(&self, room_public_id: &str, identity: &str) -> DatabaseResult<Option<SeenMarker>> {
        let row = sqlx::query(
            "SELECT r.public_id AS room_public_id, s.identity, s.last_seen_seq,
                    s.last_seen_message_id, s.updated_at
             FROM seen_markers s
             JOIN chat_rooms r ON r.id = s.room_id
             WHERE r.public_id = ? AND s.identity = ?",
        )
        .bind(room_public_id)
        .bind(identity)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(marker_from_row).transpose()
    }
}
