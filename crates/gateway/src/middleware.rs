//! Middleware for authentication, logging and CORS

use std::sync::Arc;

use axum::{
    extract::{Query, Request, State},
    http::{header, HeaderMap, Method, Uri},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use parley_auth::Session;
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};
use tracing::debug;

use crate::error::{GatewayError, GatewayResult};
use crate::state::GatewayState;

#[derive(Debug, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// Find the presented credential: the session cookie, then an
/// `Authorization: Bearer` header, then a `token` query parameter for
/// browser websocket clients that cannot set headers.
pub fn extract_credential(headers: &HeaderMap, uri: &Uri, cookie_name: &str) -> Option<String> {
    let from_cookie = CookieJar::from_headers(headers)
        .get(cookie_name)
        .map(|cookie| cookie.value().to_owned());

    let from_header = || {
        headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(|token| token.trim().to_owned())
    };

    let from_query = || {
        Query::<TokenQuery>::try_from_uri(uri)
            .ok()
            .and_then(|Query(query)| query.token)
    };

    from_cookie
        .filter(|token| !token.is_empty())
        .or_else(|| from_header().filter(|token| !token.is_empty()))
        .or_else(|| from_query().filter(|token| !token.is_empty()))
}

/// Verify the request's credential and return its session.
pub fn authenticate(state: &GatewayState, headers: &HeaderMap, uri: &Uri) -> GatewayResult<Session> {
    let token = extract_credential(headers, uri, &state.cookie_name)
        .ok_or_else(|| GatewayError::Unauthenticated("missing credential".to_string()))?;

    let session = state.verifier.verify_session(&token).map_err(|error| {
        debug!(?error, "credential rejected");
        GatewayError::from(error)
    })?;

    Ok(session)
}

/// Rejects unauthenticated requests and stores the caller's `Identity`
/// and `Session` in the request extensions.
pub async fn auth_middleware(
    State(state): State<Arc<GatewayState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, GatewayError> {
    let session = authenticate(&state, request.headers(), request.uri())?;

    request.extensions_mut().insert(session.identity.clone());
    request.extensions_mut().insert(session);

    Ok(next.run(request).await)
}

pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().path().to_owned();

    let start = std::time::Instant::now();
    let response = next.run(request).await;
    let duration = start.elapsed();

    tracing::info!(
        method = %method,
        uri = %uri,
        status = %response.status(),
        duration_ms = duration.as_millis() as u64,
        "Request completed"
    );

    response
}

pub fn create_cors_middleware() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::ACCEPT, header::CONTENT_TYPE])
}
