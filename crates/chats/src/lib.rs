//! # Parley Chats Crate
//!
//! Business rules for two-party chat: the request ledger that negotiates a
//! room, the room directory that gates access, and the message store that
//! persists and pages history.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use parley_chats::{Decision, RequestLedger};
//!
//! let ledger = RequestLedger::new(pool);
//! let request = ledger.submit(&alice, &bob).await?;
//! let resolution = ledger.resolve(&request.public_id, &bob, Decision::Accept).await?;
//! ```

pub mod services;
pub mod types;

pub use parley_database::{ChatMessage, ChatRequest, ChatRoom, RequestStatus, SeenMarker};
pub use services::{MessageStore, RequestLedger, RoomDirectory, StoreLimits};
pub use types::{
    ChatError, ChatResult, Decision, ErrorKind, HistoryPage, HistoryQuery, Resolution, SeenState,
};
