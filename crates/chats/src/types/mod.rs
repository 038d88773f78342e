//! Shared types for the chat services.

pub mod errors;
pub mod requests;
pub mod responses;

pub use errors::{ChatError, ChatResult, ErrorKind};
pub use requests::{Decision, HistoryQuery};
pub use responses::{HistoryPage, Resolution, SeenState};

pub type RequestId = String;
pub type RoomId = String;
pub type MessageId = String;
