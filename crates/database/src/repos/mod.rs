//! Database repository implementations

pub mod message_repository;
pub mod request_repository;
pub mod room_repository;
pub mod seen_repository;

pub use message_repository::MessageRepository;
pub use request_repository::{RequestRepository, Resolved};
pub use room_repository::RoomRepository;
pub use seen_repository::SeenRepository;
