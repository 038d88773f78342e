//! Row types returned by the repository layer

pub mod message;
pub mod request;
pub mod room;
pub mod seen;

pub use message::ChatMessage;
pub use request::{ChatRequest, RequestStatus};
pub use room::ChatRoom;
pub use seen::SeenMarker;
