//! Room lookups and the participant gate every room operation goes through.

use parley_auth::Identity;
use parley_database::{ChatRoom, RoomRepository};
use sqlx::SqlitePool;

use crate::types::{ChatError, ChatResult};

#[derive(Clone)]
pub struct RoomDirectory {
    rooms: RoomRepository,
}

impl RoomDirectory {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            rooms: RoomRepository::new(pool),
        }
    }

    pub async fn is_participant(&self, room_id: &str, identity: &Identity) -> ChatResult<bool> {
        Ok(self.rooms.is_participant(room_id, identity.as_str()).await?)
    }

    pub async fn get(&self, room_id: &str) -> ChatResult<ChatRoom> {
        self.rooms
            .find_by_public_id(room_id)
            .await?
            .ok_or_else(|| ChatError::RoomNotFound {
                id: room_id.to_owned(),
            })
    }

    pub async fn find_by_request(&self, request_id: &str) -> ChatResult<Option<ChatRoom>> {
        Ok(self.rooms.find_by_request(request_id).await?)
    }

    pub async fn list_for(&self, identity: &Identity) -> ChatResult<Vec<ChatRoom>> {
        Ok(self.rooms.list_for_identity(identity.as_str()).await?)
    }

    /// The room, provided `identity` is one of its two participants.
    /// Unknown rooms are `RoomNotFound`; outsiders get `NotParticipant`.
    pub async fn require_participant(&self, room_id: &str, identity: &Identity) -> ChatResult<ChatRoom> {
        let room = self.get(room_id).await?;
        if !room.has_participant(identity.as_str()) {
            return Err(ChatError::NotParticipant {
                room: room_id.to_owned(),
            });
        }
        Ok(room)
    }
}
