//! Parley Database Crate
//!
//! Connection management, migrations and repositories for chat requests,
//! rooms, messages and seen markers.

use parley_config::DatabaseConfig;
use sqlx::SqlitePool;

pub mod connection;
pub mod entities;
pub mod migrations;
pub mod repos;
pub mod types;

pub use connection::prepare_database;
pub use migrations::run_migrations;

pub use repos::{MessageRepository, RequestRepository, Resolved, RoomRepository, SeenRepository};

pub use entities::{ChatMessage, ChatRequest, ChatRoom, RequestStatus, SeenMarker};

pub use types::{DatabaseError, DatabaseResult};

/// Open the pool and apply pending migrations.
pub async fn initialize_database(config: &DatabaseConfig) -> DatabaseResult<SqlitePool> {
    let pool = prepare_database(config)
        .await
        .map_err(|e| DatabaseError::ConnectionError(format!("{e:#}")))?;

    run_migrations(&pool)
        .await
        .map_err(|e| DatabaseError::MigrationError(format!("{e:#}")))?;

    Ok(pool)
}
