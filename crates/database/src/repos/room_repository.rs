//! Repository for chat rooms and their participants.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};

use crate::entities::{ChatRequest, ChatRoom};
use crate::types::DatabaseResult;

const ROOM_SELECT: &str = "SELECT r.id, r.public_id, r.created_at, q.public_id AS request_public_id, p.identity
     FROM chat_rooms r
     JOIN chat_requests q ON q.id = r.request_id
     JOIN room_participants p ON p.room_id = r.id";

#[derive(Clone)]
pub struct RoomRepository {
    pool: SqlitePool,
}

/// Fold one row per participant into rooms. Rows must arrive grouped by room.
fn rooms_from_rows(rows: &[SqliteRow]) -> DatabaseResult<Vec<ChatRoom>> {
    let mut rooms: Vec<ChatRoom> = Vec::new();

    for row in rows {
        let id: i64 = row.try_get("id")?;
        let identity: String = row.try_get("identity")?;

        match rooms.last_mut() {
            Some(room) if room.id == id => room.participants.push(identity),
            _ => rooms.push(ChatRoom {
                id,
                public_id: row.try_get("public_id")?,
                request_id: row.try_get("request_public_id")?,
                participants: vec![identity],
                created_at: row.try_get("created_at")?,
            }),
        }
    }

    Ok(rooms)
}

/// Open the room for an accepted request. Runs on the caller's transaction.
pub(crate) async fn insert_room(
    conn: &mut SqliteConnection,
    request: &ChatRequest,
    now: DateTime<Utc>,
) -> DatabaseResult<ChatRoom> {
    let public_id = cuid2::create_id();

    let result = sqlx::query("INSERT INTO chat_rooms (public_id, request_id, created_at) VALUES (?, ?, ?)")
        .bind(&public_id)
        .bind(request.id)
        .bind(now)
        .execute(&mut *conn)
        .await?;
    let room_id = result.last_insert_rowid();

    let mut participants = vec![request.sender_id.clone(), request.receiver_id.clone()];
    participants.sort();

    for identity in &participants {
        sqlx::query("INSERT INTO room_participants (room_id, identity) VALUES (?, ?)")
            .bind(room_id)
            .bind(identity)
            .execute(&mut *conn)
            .await?;
    }

    Ok(ChatRoom {
        id: room_id,
        public_id,
        request_id: request.public_id.clone(),
        participants,
        created_at: now,
    })
}

impl RoomRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn find_by_public_id(&self, public_id: &str) -> DatabaseResult<Option<ChatRoom>> {
        let rows = sqlx::query(&format!("{ROOM_SELECT} WHERE r.public_id = ? ORDER BY p.identity"))
            .bind(public_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rooms_from_rows(&rows)?.into_iter().next())
    }

    pub async fn find_by_request(&self, request_public_id: &str) -> DatabaseResult<Option<ChatRoom>> {
        let rows = sqlx::query(&format!("{ROOM_SELECT} WHERE q.public_id = ? ORDER BY p.identity"))
            .bind(request_public_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rooms_from_rows(&rows)?.into_iter().next())
    }

    /// Rooms `identity` participates in, newest first.
    pub async fn list_for_identity(&self, identity: &str) -> DatabaseResult<Vec<ChatRoom>> {
        let rows = sqlx::query(&format!(
            "{ROOM_SELECT}
             WHERE r.id IN (SELECT room_id FROM room_participants WHERE identity = ?)
             ORDER BY r.id DESC, p.identity"
        ))
        .bind(identity)
        .fetch_all(&self.pool)
        .await?;

        rooms_from_rows(&rows)
    }

    pub async fn is_participant(&self, room_public_id: &str, identity: &str) -> DatabaseResult<bool> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM room_participants p
             JOIN chat_rooms r ON r.id = p.room_id
             WHERE r.public_id = ? AND p.identity = ?",
        )
        .bind(room_public_id)
        .bind(identity)
        .fetch_one(&self.pool)
        .await?;

        Ok(count > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::RequestStatus;
    use crate::repos::RequestRepository;
    use crate::test_support::migrated_pool;

    async fn open_room(requests: &RequestRepository, sender: &str, receiver: &str) -> ChatRoom {
        let request = requests.create(sender, receiver).await.unwrap();
        requests
            .resolve(&request, RequestStatus::Accepted)
            .await
            .unwrap()
            .room
            .unwrap()
    }

    #[tokio::test]
    async fn room_lookups_return_both_participants() {
        let (pool, _dir) = migrated_pool().await;
        let requests = RequestRepository::new(pool.clone());
        let rooms = RoomRepository::new(pool);

        let opened = open_room(&requests, "u2", "u1").await;

        let found = rooms.find_by_public_id(&opened.public_id).await.unwrap().unwrap();
        assert_eq!(found.public_id, opened.public_id);
        assert_eq!(found.request_id, opened.request_id);
        assert_eq!(found.participants, vec!["u1".to_string(), "u2".to_string()]);

        let by_request = rooms.find_by_request(&opened.request_id).await.unwrap().unwrap();
        assert_eq!(by_request.public_id, opened.public_id);

        assert!(rooms.find_by_public_id("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn membership_checks_are_per_room() {
        let (pool, _dir) = migrated_pool().await;
        let requests = RequestRepository::new(pool.clone());
        let rooms = RoomRepository::new(pool);

        let room = open_room(&requests, "u1", "u2").await;

        assert!(rooms.is_participant(&room.public_id, "u1").await.unwrap());
        assert!(rooms.is_participant(&room.public_id, "u2").await.unwrap());
        assert!(!rooms.is_participant(&room.public_id, "u3").await.unwrap());
        assert!(!rooms.is_participant("missing", "u1").await.unwrap());
    }

    #[tokio::test]
    async fn listing_returns_rooms_newest_first() {
        let (pool, _dir) = migrated_pool().await;
        let requests = RequestRepository::new(pool.clone());
        let rooms = RoomRepository::new(pool);

        let older = open_room(&requests, "u1", "u2").await;
        let newer = open_room(&requests, "u3", "u1").await;
        open_room(&requests, "u2", "u3").await;

        let listed = rooms.list_for_identity("u1").await.unwrap();
        let ids: Vec<&str> = listed.iter().map(|room| room.public_id.as_str()).collect();
        assert_eq!(ids, vec![newer.public_id.as_str(), older.public_id.as_str()]);
        assert!(listed.iter().all(|room| room.participants.len() == 2));
    }
}
