//! Live room channel: `GET /ws/chat/:room_id`.
//!
//! Credentials and room membership are checked before the handshake, so a
//! refused attempt gets a plain HTTP error and never touches the hub.

pub mod frames;
pub mod hub;
pub mod relay;

use std::sync::Arc;

use axum::{
    extract::{Path, State, WebSocketUpgrade},
    http::{HeaderMap, Uri},
    response::Response,
    routing::get,
    Router,
};
use tracing::debug;

use crate::error::GatewayResult;
use crate::middleware::authenticate;
use crate::state::GatewayState;

pub use frames::{close_code, CloseReason, InboundFrame, MessageFrame, OutboundFrame};
pub use hub::{ConnectionHub, ConnectionId, HubError, Membership, Outbound, ECHO_TO_SENDER};

pub fn create_websocket_routes() -> Router<Arc<GatewayState>> {
    Router::new().route("/ws/chat/:room_id", get(room_socket_handler))
}

pub async fn room_socket_handler(
    Path(room_id): Path<String>,
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    uri: Uri,
    ws: WebSocketUpgrade,
) -> GatewayResult<Response> {
    let session = authenticate(&state, &headers, &uri)?;
    state.rooms.require_participant(&room_id, &session.identity).await?;

    debug!(room_id = %room_id, identity = %session.identity, "upgrading live connection");

    Ok(ws.on_upgrade(move |socket| relay::serve(socket, state, room_id, session)))
}
