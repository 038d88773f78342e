//! Repository for chat request data access operations.

use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::info;

use crate::entities::{ChatRequest, ChatRoom, RequestStatus};
use crate::repos::room_repository::insert_room;
use crate::types::{DatabaseError, DatabaseResult};

const REQUEST_COLUMNS: &str =
    "id, public_id, sender_id, receiver_id, status, created_at, resolved_at";

/// Outcome of a successful resolution.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub request: ChatRequest,
    pub room: Option<ChatRoom>,
}

#[derive(Clone)]
pub struct RequestRepository {
    pool: SqlitePool,
}

fn request_from_row(row: &SqliteRow) -> DatabaseResult<ChatRequest> {
    let status: String = row.try_get("status")?;

    Ok(ChatRequest {
        id: row.try_get("id")?,
        public_id: row.try_get("public_id")?,
        sender_id: row.try_get("sender_id")?,
        receiver_id: row.try_get("receiver_id")?,
        status: RequestStatus::try_from(status.as_str()).map_err(DatabaseError::InternalError)?,
        created_at: row.try_get("created_at")?,
        resolved_at: row.try_get("resolved_at")?,
    })
}

impl RequestRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a pending request. A second pending request for the same
    /// ordered pair fails with [`DatabaseError::Duplicate`].
    pub async fn create(&self, sender_id: &str, receiver_id: &str) -> DatabaseResult<ChatRequest> {
        let public_id = cuid2::create_id();
        let now = Utc::now();

        let result = sqlx::query(
            "INSERT INTO chat_requests (public_id, sender_id, receiver_id, status, created_at)
             VALUES (?, ?, ?, 'pending', ?)",
        )
        .bind(&public_id)
        .bind(sender_id)
        .bind(receiver_id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        info!(
            request_id = %public_id,
            sender = sender_id,
            receiver = receiver_id,
            "chat request recorded"
        );

        Ok(ChatRequest {
            id: result.last_insert_rowid(),
            public_id,
            sender_id: sender_id.to_owned(),
            receiver_id: receiver_id.to_owned(),
            status: RequestStatus::Pending,
            created_at: now,
            resolved_at: None,
        })
    }

    pub async fn find_by_public_id(&self, public_id: &str) -> DatabaseResult<Option<ChatRequest>> {
        let row = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS} FROM chat_requests WHERE public_id = ?"
        ))
        .bind(public_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(request_from_row).transpose()
    }

    pub async fn find_pending_between(
        &self,
        sender_id: &str,
        receiver_id: &str,
    ) -> DatabaseResult<Option<ChatRequest>> {
        let row = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS} FROM chat_requests
             WHERE sender_id = ? AND receiver_id = ? AND status = 'pending'"
        ))
        .bind(sender_id)
        .bind(receiver_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(request_from_row).transpose()
    }

    /// Pending requests addressed to `receiver_id`, oldest first.
    pub async fn list_pending_for_receiver(&self, receiver_id: &str) -> DatabaseResult<Vec<ChatRequest>> {
        let rows = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS} FROM chat_requests
             WHERE receiver_id = ? AND status = 'pending' ORDER BY id ASC"
        ))
        .bind(receiver_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(request_from_row).collect()
    }

    pub async fn list_pending_from_sender(&self, sender_id: &str) -> DatabaseResult<Vec<ChatRequest>> {
        let rows = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS} FROM chat_requests
             WHERE sender_id = ? AND status = 'pending' ORDER BY id ASC"
        ))
        .bind(sender_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(request_from_row).collect()
    }

    /// Move a pending request to a terminal status. Accepting opens the
    /// request's room in the same transaction, so either both land or neither.
    ///
    /// Fails with [`DatabaseError::Conflict`] when the request is no longer pending.
    pub async fn resolve(&self, request: &ChatRequest, status: RequestStatus) -> DatabaseResult<Resolved> {
        if !status.is_terminal() {
            return Err(DatabaseError::InternalError(
                "a request can only be resolved to accepted or rejected".into(),
            ));
        }

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE chat_requests SET status = ?, resolved_at = ?
             WHERE id = ? AND status = 'pending'",
        )
        .bind(status.as_str())
        .bind(now)
        .bind(request.id)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(DatabaseError::Conflict(format!(
                "request {} is no longer pending",
                request.public_id
            )));
        }

        let room = if status == RequestStatus::Accepted {
            Some(insert_room(&mut tx, request, now).await?)
        } else {
            None
        };

        tx.commit().await?;

        info!(request_id = %request.public_id, %status, "chat request resolved");

        Ok(Resolved {
            request: ChatRequest {
                status,
                resolved_at: Some(now),
                ..request.clone()
            },
            room,
        })
    }
}
