use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::Response,
};

use crate::{error::AppError, state::AppState};

pub const API_KEY_HEADER: &str = "x-api-key";
const AUTHORIZATION_SCHEME: &str = "Api-Key ";

/// Key from `X-API-Key`, falling back to `Authorization: Api-Key <key>`.
pub fn extract_api_key(headers: &HeaderMap) -> Option<&str> {
    let direct = headers
        .get(API_KEY_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|k| !k.is_empty());
    if direct.is_some() {
        return direct;
    }

    headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix(AUTHORIZATION_SCHEME))
        .map(str::trim)
        .filter(|k| !k.is_empty())
}

// ============================================================================
// API Key Middleware
// ============================================================================

pub async fn api_key_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let key = extract_api_key(req.headers()).ok_or_else(|| {
        AppError::AuthorizationError("Authentication credentials were not provided.".to_string())
    })?;

    if !state.auth.accepts(key) {
        tracing::warn!(path = %req.uri().path(), "rejected request with unknown API key");
        return Err(AppError::AuthorizationError("Invalid API key.".to_string()));
    }

    Ok(next.run(req).await)
}
