//! # Parley Gateway Crate
//!
//! HTTP REST and live websocket surface for Parley. Handlers authenticate
//! the caller, then hand off to the chat services.
//!
//! ## Architecture
//!
//! - **REST**: request ledger, rooms, history and seen markers under `/api/chat`
//! - **WebSocket**: one live channel per room at `/ws/chat/:room_id`
//! - **State**: services plus the connection hub shared by every handler
//! - **Middleware**: authentication, CORS and request logging
//!
//! ## Usage
//!
//! ```rust,ignore
//! use parley_gateway::{create_router, GatewayState};
//!
//! let state = GatewayState::new(pool, verifier, &config.auth, &config.realtime);
//! let app = create_router(state);
//!
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:8080").await?;
//! axum::serve(listener, app).await?;
//! ```

pub mod error;
pub mod middleware;
pub mod rest;
pub mod state;
pub mod websocket;

pub use error::{ErrorResponse, GatewayError, GatewayResult};
pub use middleware::auth_middleware;
pub use state::{GatewayState, LiveSettings};
pub use websocket::ConnectionHub;

use std::sync::Arc;

use axum::{middleware as axum_middleware, Router};
#[cfg(debug_assertions)]
use utoipa::OpenApi;
#[cfg(debug_assertions)]
use utoipa_swagger_ui::SwaggerUi;

/// Create the main application router with all routes
pub fn create_router(state: GatewayState) -> Router {
    let arc_state = Arc::new(state);

    #[allow(unused_mut)]
    let mut router = Router::new()
        .merge(rest::create_rest_routes(arc_state.clone()))
        .merge(websocket::create_websocket_routes())
        .with_state(arc_state)
        .layer(middleware::create_cors_middleware())
        .layer(axum_middleware::from_fn(middleware::logging_middleware));

    // Swagger UI only in debug builds
    #[cfg(debug_assertions)]
    {
        router = router.merge(
            SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()),
        );
    }

    router
}

#[cfg(debug_assertions)]
#[derive(OpenApi)]
#[openapi(
    paths(
        rest::health::health_check,
        rest::requests::submit_request,
        rest::requests::list_incoming_requests,
        rest::requests::list_outgoing_requests,
        rest::requests::get_request,
        rest::requests::respond_to_request,
        rest::rooms::list_rooms,
        rest::rooms::get_room,
        rest::rooms::list_messages,
        rest::rooms::mark_seen,
        rest::rooms::get_seen_state,
    ),
    components(
        schemas(
            error::ErrorResponse,
            rest::health::HealthResponse,
            rest::requests::ChatRequestResponse,
            rest::requests::RequestDetailResponse,
            rest::requests::SubmitRequestBody,
            rest::requests::RespondRequestBody,
            rest::requests::RespondResponse,
            rest::rooms::RoomResponse,
            rest::rooms::MessageResponse,
            rest::rooms::HistoryResponse,
            rest::rooms::MarkSeenBody,
            rest::rooms::SeenMarkerResponse,
            rest::rooms::SeenStateResponse,
        )
    ),
    tags(
        (name = "health", description = "Liveness"),
        (name = "requests", description = "Chat requests between two identities"),
        (name = "rooms", description = "Rooms, history and seen markers"),
    )
)]
struct ApiDoc;
