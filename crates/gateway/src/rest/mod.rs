//! REST API endpoints for the gateway

pub mod health;
pub mod requests;
pub mod rooms;

use std::sync::Arc;

use axum::{middleware as axum_middleware, routing::get, Router};

use crate::middleware::auth_middleware;
use crate::state::GatewayState;

/// Create all REST API routes. Everything except `/health` requires a session.
pub fn create_rest_routes(state: Arc<GatewayState>) -> Router<Arc<GatewayState>> {
    let protected = Router::new()
        .merge(requests::create_request_routes())
        .merge(rooms::create_room_routes())
        .route_layer(axum_middleware::from_fn_with_state(state, auth_middleware));

    Router::new()
        .route("/health", get(health::health_check))
        .nest("/api/chat", protected)
}
