use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use chrono::Utc;

use crate::{
    error::AppError,
    models::{
        device::Device,
        user::{Session, User},
    },
    repositories::{device as device_repo, session as session_repo, user as user_repo},
    state::AppState,
    utils::cookies::{extract_cookie_value, SESSION_COOKIE_NAME},
};

/// Admin routes: requires a live `session` cookie. Inserts the [`User`] and
/// [`Session`] as request extensions.
pub async fn require_admin(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let (user, session) = authenticate_admin(request.headers(), &state).await?;
    request.extensions_mut().insert(user);
    request.extensions_mut().insert(session);
    Ok(next.run(request).await)
}

/// Device routes: requires `Authorization: Bearer <device token>`. Inserts
/// the [`Device`] as a request extension.
pub async fn require_device(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_bearer(request.headers())
        .ok_or_else(|| AppError::Unauthorized("Missing device token".into()))?;
    let device = authenticate_device(&state, &token)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid device token".into()))?;
    request.extensions_mut().insert(device);
    Ok(next.run(request).await)
}

pub async fn authenticate_admin(
    headers: &HeaderMap,
    state: &AppState,
) -> Result<(User, Session), AppError> {
    let token = headers
        .get(header::COOKIE)
        .and_then(|value| value.to_str().ok())
        .and_then(|raw| extract_cookie_value(raw, SESSION_COOKIE_NAME))
        .filter(|token| !token.is_empty())
        .ok_or_else(|| AppError::Unauthorized("Not authenticated".into()))?;

    let session = session_repo::find_valid_session(&state.pool, &token, Utc::now())
        .await?
        .ok_or_else(|| AppError::Unauthorized("Session expired".into()))?;

    let user = user_repo::find_by_id(&state.pool, session.user_id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Not authenticated".into()))?;

    Ok((user, session))
}

pub async fn authenticate_device(state: &AppState, token: &str) -> Result<Option<Device>, AppError> {
    if token.is_empty() {
        return Ok(None);
    }
    Ok(device_repo::find_device_by_token(&state.pool, token).await?)
}

/// Token from a `token` query parameter, falling back to the bearer header.
pub fn device_token(query_token: Option<&str>, headers: &HeaderMap) -> Option<String> {
    query_token
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .or_else(|| extract_bearer(headers))
}

pub fn extract_bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_bearer_token)
        .map(str::to_string)
}

fn parse_bearer_token(header: &str) -> Option<&str> {
    let (scheme, rest) = header.trim().split_once(' ')?;
    if scheme.eq_ignore_ascii_case("bearer") {
        let token = rest.trim();
        (!token.is_empty()).then_some(token)
    } else {
        None
    }
}
