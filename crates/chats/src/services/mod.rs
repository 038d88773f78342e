//! Business logic services for the chat system.
//!
//! Services own the rules (who may resolve a request, who may post into a
//! room, how history is paged) and delegate storage to the repositories in
//! `parley-database`.

pub mod message_store;
pub mod request_ledger;
pub mod room_directory;

pub use message_store::{MessageStore, StoreLimits};
pub use request_ledger::RequestLedger;
pub use room_directory::RoomDirectory;
