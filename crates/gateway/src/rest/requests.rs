//! Chat request REST endpoints

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use axum_extra::extract::WithRejection;
use parley_auth::Identity;
use parley_chats::{ChatRequest, Decision, RequestStatus};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::{ErrorResponse, GatewayError, GatewayResult};
use crate::state::GatewayState;

#[derive(Debug, Serialize, ToSchema)]
pub struct ChatRequestResponse {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    /// `pending`, `accepted` or `rejected`.
    pub status: String,
    pub created_at: String,
    pub resolved_at: Option<String>,
}

impl From<ChatRequest> for ChatRequestResponse {
    fn from(request: ChatRequest) -> Self {
        Self {
            id: request.public_id,
            sender_id: request.sender_id,
            receiver_id: request.receiver_id,
            status: request.status.to_string(),
            created_at: request.created_at.to_rfc3339(),
            resolved_at: request.resolved_at.map(|dt| dt.to_rfc3339()),
        }
    }
}

/// A single request as seen by one of its parties.
#[derive(Debug, Serialize, ToSchema)]
pub struct RequestDetailResponse {
    #[serde(flatten)]
    pub request: ChatRequestResponse,
    /// The room opened by accepting the request.
    pub room_id: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SubmitRequestBody {
    pub receiver_id: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RespondRequestBody {
    /// `accept` or `reject`.
    pub action: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RespondResponse {
    pub request: ChatRequestResponse,
    /// Set when the request was accepted.
    pub room_id: Option<String>,
}

pub fn create_request_routes() -> Router<Arc<GatewayState>> {
    Router::new()
        .route("/requests", get(list_incoming_requests).post(submit_request))
        .route("/requests/outgoing", get(list_outgoing_requests))
        .route("/requests/:request_id", get(get_request))
        .route("/requests/:request_id/respond", post(respond_to_request))
}

#[utoipa::path(
    post,
    path = "/api/chat/requests",
    tag = "requests",
    request_body = SubmitRequestBody,
    responses(
        (status = 201, description = "Request recorded", body = ChatRequestResponse),
        (status = 400, description = "Invalid receiver", body = ErrorResponse),
        (status = 401, description = "Unauthenticated", body = ErrorResponse),
        (status = 409, description = "A pending request already exists", body = ErrorResponse)
    )
)]
pub async fn submit_request(
    State(state): State<Arc<GatewayState>>,
    Extension(identity): Extension<Identity>,
    WithRejection(Json(body), _): WithRejection<Json<SubmitRequestBody>, GatewayError>,
) -> GatewayResult<(StatusCode, Json<ChatRequestResponse>)> {
    let receiver = Identity::new(body.receiver_id.trim());
    let request = state.requests.submit(&identity, &receiver).await?;
    Ok((StatusCode::CREATED, Json(request.into())))
}

#[utoipa::path(
    get,
    path = "/api/chat/requests",
    tag = "requests",
    responses(
        (status = 200, description = "Pending requests addressed to the caller", body = Vec<ChatRequestResponse>),
        (status = 401, description = "Unauthenticated", body = ErrorResponse)
    )
)]
pub async fn list_incoming_requests(
    State(state): State<Arc<GatewayState>>,
    Extension(identity): Extension<Identity>,
) -> GatewayResult<Json<Vec<ChatRequestResponse>>> {
    let requests = state.requests.list_pending(&identity).await?;
    Ok(Json(requests.into_iter().map(Into::into).collect()))
}

#[utoipa::path(
    get,
    path = "/api/chat/requests/outgoing",
    tag = "requests",
    responses(
        (status = 200, description = "Pending requests the caller sent", body = Vec<ChatRequestResponse>),
        (status = 401, description = "Unauthenticated", body = ErrorResponse)
    )
)]
pub async fn list_outgoing_requests(
    State(state): State<Arc<GatewayState>>,
    Extension(identity): Extension<Identity>,
) -> GatewayResult<Json<Vec<ChatRequestResponse>>> {
    let requests = state.requests.list_outgoing(&identity).await?;
    Ok(Json(requests.into_iter().map(Into::into).collect()))
}

#[utoipa::path(
    get,
    path = "/api/chat/requests/{request_id}",
    tag = "requests",
    params(("request_id" = String, Path, description = "Request id")),
    responses(
        (status = 200, description = "The request", body = RequestDetailResponse),
        (status = 403, description = "Caller is not a party to the request", body = ErrorResponse),
        (status = 404, description = "Unknown request", body = ErrorResponse)
    )
)]
pub async fn get_request(
    Path(request_id): Path<String>,
    State(state): State<Arc<GatewayState>>,
    Extension(identity): Extension<Identity>,
) -> GatewayResult<Json<RequestDetailResponse>> {
    let request = state.requests.get(&request_id, &identity).await?;

    let room_id = match request.status {
        RequestStatus::Accepted => state
            .rooms
            .find_by_request(&request.public_id)
            .await?
            .map(|room| room.public_id),
        _ => None,
    };

    Ok(Json(RequestDetailResponse {
        request: request.into(),
        room_id,
    }))
}

#[utoipa::path(
    post,
    path = "/api/chat/requests/{request_id}/respond",
    tag = "requests",
    params(("request_id" = String, Path, description = "Request id")),
    request_body = RespondRequestBody,
    responses(
        (status = 200, description = "Request resolved", body = RespondResponse),
        (status = 400, description = "Unknown action", body = ErrorResponse),
        (status = 403, description = "Only the receiver may respond", body = ErrorResponse),
        (status = 404, description = "Unknown request", body = ErrorResponse),
        (status = 409, description = "Already resolved", body = ErrorResponse)
    )
)]
pub async fn respond_to_request(
    Path(request_id): Path<String>,
    State(state): State<Arc<GatewayState>>,
    Extension(identity): Extension<Identity>,
    WithRejection(Json(body), _): WithRejection<Json<RespondRequestBody>, GatewayError>,
) -> GatewayResult<Json<RespondResponse>> {
    let decision: Decision = body
        .action
        .trim()
        .to_ascii_lowercase()
        .parse()
        .map_err(GatewayError::InvalidRequest)?;

    let resolution = state.requests.resolve(&request_id, &identity, decision).await?;
    let room_id = resolution.room_id().map(str::to_owned);

    Ok(Json(RespondResponse {
        request: resolution.request.into(),
        room_id,
    }))
}
