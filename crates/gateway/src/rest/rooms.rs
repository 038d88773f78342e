//! Room, history and seen-marker REST endpoints

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Extension, Json, Router,
};
use axum_extra::extract::WithRejection;
use parley_auth::Identity;
use parley_chats::{ChatMessage, ChatRoom, HistoryQuery, SeenMarker};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::error::{ErrorResponse, GatewayError, GatewayResult};
use crate::state::GatewayState;

#[derive(Debug, Serialize, ToSchema)]
pub struct RoomResponse {
    pub id: String,
    pub request_id: String,
    pub participants: Vec<String>,
    pub created_at: String,
}

impl From<ChatRoom> for RoomResponse {
    fn from(room: ChatRoom) -> Self {
        Self {
            id: room.public_id,
            request_id: room.request_id,
            participants: room.participants,
            created_at: room.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    pub id: String,
    pub seq: i64,
    pub room_id: String,
    pub sender: String,
    pub content: String,
    pub created_at: String,
}

impl From<ChatMessage> for MessageResponse {
    fn from(message: ChatMessage) -> Self {
        Self {
            id: message.public_id,
            seq: message.seq,
            room_id: message.room_id,
            sender: message.sender_id,
            content: message.content,
            created_at: message.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HistoryResponse {
    pub messages: Vec<MessageResponse>,
    pub next_cursor: Option<i64>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct HistoryParams {
    /// Return messages with `seq` greater than this cursor.
    pub since: Option<i64>,
    /// Page size, capped by the server.
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct MarkSeenBody {
    pub message_id: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SeenMarkerResponse {
    pub room_id: String,
    pub identity: String,
    pub last_seen_message_id: String,
    pub last_seen_seq: i64,
    pub updated_at: String,
}

impl From<SeenMarker> for SeenMarkerResponse {
    fn from(marker: SeenMarker) -> Self {
        Self {
            room_id: marker.room_id,
            identity: marker.identity,
            last_seen_message_id: marker.last_seen_message_id,
            last_seen_seq: marker.last_seen_seq,
            updated_at: marker.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SeenStateResponse {
    pub marker: Option<SeenMarkerResponse>,
    pub unread: i64,
}

pub fn create_room_routes() -> Router<Arc<GatewayState>> {
    Router::new()
        .route("/rooms", get(list_rooms))
        .route("/rooms/:room_id", get(get_room))
        .route("/rooms/:room_id/messages", get(list_messages))
        .route("/rooms/:room_id/seen", get(get_seen_state).post(mark_seen))
}

#[utoipa::path(
    get,
    path = "/api/chat/rooms",
    tag = "rooms",
    responses(
        (status = 200, description = "Rooms the caller participates in", body = Vec<RoomResponse>),
        (status = 401, description = "Unauthenticated", body = ErrorResponse)
    )
)]
pub async fn list_rooms(
    State(state): State<Arc<GatewayState>>,
    Extension(identity): Extension<Identity>,
) -> GatewayResult<Json<Vec<RoomResponse>>> {
    let rooms = state.rooms.list_for(&identity).await?;
    Ok(Json(rooms.into_iter().map(Into::into).collect()))
}

#[utoipa::path(
    get,
    path = "/api/chat/rooms/{room_id}",
    tag = "rooms",
    params(("room_id" = String, Path, description = "Room id")),
    responses(
        (status = 200, description = "Room detail", body = RoomResponse),
        (status = 403, description = "Caller is not a participant", body = ErrorResponse),
        (status = 404, description = "Unknown room", body = ErrorResponse)
    )
)]
pub async fn get_room(
    Path(room_id): Path<String>,
    State(state): State<Arc<GatewayState>>,
    Extension(identity): Extension<Identity>,
) -> GatewayResult<Json<RoomResponse>> {
    let room = state.rooms.require_participant(&room_id, &identity).await?;
    Ok(Json(room.into()))
}

#[utoipa::path(
    get,
    path = "/api/chat/rooms/{room_id}/messages",
    tag = "rooms",
    params(("room_id" = String, Path, description = "Room id"), HistoryParams),
    responses(
        (status = 200, description = "A page of history, oldest first", body = HistoryResponse),
        (status = 403, description = "Caller is not a participant", body = ErrorResponse),
        (status = 404, description = "Unknown room", body = ErrorResponse)
    )
)]
pub async fn list_messages(
    Path(room_id): Path<String>,
    State(state): State<Arc<GatewayState>>,
    Extension(identity): Extension<Identity>,
    WithRejection(Query(params), _): WithRejection<Query<HistoryParams>, GatewayError>,
) -> GatewayResult<Json<HistoryResponse>> {
    state.rooms.require_participant(&room_id, &identity).await?;

    let page = state
        .messages
        .history(
            &room_id,
            HistoryQuery {
                since: params.since,
                limit: params.limit,
            },
        )
        .await?;

    Ok(Json(HistoryResponse {
        messages: page.messages.into_iter().map(Into::into).collect(),
        next_cursor: page.next_cursor,
    }))
}

#[utoipa::path(
    post,
    path = "/api/chat/rooms/{room_id}/seen",
    tag = "rooms",
    params(("room_id" = String, Path, description = "Room id")),
    request_body = MarkSeenBody,
    responses(
        (status = 200, description = "The caller's marker after the update", body = SeenMarkerResponse),
        (status = 403, description = "Caller is not a participant", body = ErrorResponse),
        (status = 404, description = "Unknown room or message", body = ErrorResponse)
    )
)]
pub async fn mark_seen(
    Path(room_id): Path<String>,
    State(state): State<Arc<GatewayState>>,
    Extension(identity): Extension<Identity>,
    WithRejection(Json(body), _): WithRejection<Json<MarkSeenBody>, GatewayError>,
) -> GatewayResult<Json<SeenMarkerResponse>> {
    state.rooms.require_participant(&room_id, &identity).await?;
    let marker = state
        .messages
        .mark_seen(&room_id, &identity, &body.message_id)
        .await?;
    Ok(Json(marker.into()))
}

#[utoipa::path(
    get,
    path = "/api/chat/rooms/{room_id}/seen",
    tag = "rooms",
    params(("room_id" = String, Path, description = "Room id")),
    responses(
        (status = 200, description = "The caller's marker and unread count", body = SeenStateResponse),
        (status = 403, description = "Caller is not a participant", body = ErrorResponse),
        (status = 404, description = "Unknown room", body = ErrorResponse)
    )
)]
pub async fn get_seen_state(
    Path(room_id): Path<String>,
    State(state): State<Arc<GatewayState>>,
    Extension(identity): Extension<Identity>,
) -> GatewayResult<Json<SeenStateResponse>> {
    state.rooms.require_participant(&room_id, &identity).await?;
    let seen = state.messages.seen_state(&room_id, &identity).await?;
    Ok(Json(SeenStateResponse {
        marker: seen.marker.map(Into::into),
        unread: seen.unread,
    }))
}
