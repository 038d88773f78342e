//! Error types for the chat system.

use parley_database::DatabaseError;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

pub type ChatResult<T> = Result<T, ChatError>;

/// Coarse classification every boundary maps onto its own status or close code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Unauthenticated,
    Forbidden,
    NotFound,
    Conflict,
    Validation,
    Transient,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Unauthenticated => "unauthenticated",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Validation => "validation",
            ErrorKind::Transient => "transient",
            ErrorKind::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Invalid target: {reason}")]
    InvalidTarget { reason: String },

    #[error("A pending request to {receiver} already exists")]
    DuplicatePending { receiver: String },

    #[error("Chat request not found: {id}")]
    RequestNotFound { id: String },

    #[error("Chat request {id} has already been resolved")]
    AlreadyResolved { id: String },

    #[error("Room not found: {id}")]
    RoomNotFound { id: String },

    #[error("Message not found: {id}")]
    MessageNotFound { id: String },

    #[error("Not a participant of room {room}")]
    NotParticipant { room: String },

    #[error("Access denied: {reason}")]
    Forbidden { reason: String },

    #[error("Message content must not be empty")]
    EmptyContent,

    #[error("Message content exceeds {max} characters")]
    ContentTooLong { max: usize },

    #[error("Storage unavailable: {message}")]
    Unavailable { message: String },

    #[error("Internal server error: {message}")]
    Internal { message: String },
}

impl ChatError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ChatError::InvalidTarget { .. }
            | ChatError::EmptyContent
            | ChatError::ContentTooLong { .. } => ErrorKind::Validation,
            ChatError::DuplicatePending { .. } | ChatError::AlreadyResolved { .. } => {
                ErrorKind::Conflict
            }
            ChatError::RequestNotFound { .. }
            | ChatError::RoomNotFound { .. }
            | ChatError::MessageNotFound { .. } => ErrorKind::NotFound,
            ChatError::NotParticipant { .. } | ChatError::Forbidden { .. } => ErrorKind::Forbidden,
            ChatError::Unavailable { .. } => ErrorKind::Transient,
            ChatError::Internal { .. } => ErrorKind::Internal,
        }
    }

    pub fn forbidden(reason: impl Into<String>) -> Self {
        Self::Forbidden {
            reason: reason.into(),
        }
    }

    pub fn invalid_target(reason: impl Into<String>) -> Self {
        Self::InvalidTarget {
            reason: reason.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl From<DatabaseError> for ChatError {
    fn from(error: DatabaseError) -> Self {
        match error {
            DatabaseError::Unavailable(message) => ChatError::Unavailable { message },
            other => ChatError::internal(other.to_string()),
        }
    }
}
