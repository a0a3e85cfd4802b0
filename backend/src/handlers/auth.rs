use axum::{
    extract::{Extension, State},
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde_json::json;
use validator::Validate;

use crate::{
    error::AppError,
    models::user::{
        ChangePasswordRequest, LoginRequest, LoginResponse, Session, SetupRequest, SetupStatus,
        User,
    },
    repositories::{session as session_repo, user as user_repo},
    state::AppState,
    utils::{
        cookies::{build_clear_cookie, build_session_cookie, CookieOptions},
        generate_token,
        password::{ensure_password_matches, hash_password},
    },
};

const INVALID_CREDENTIALS: &str = "Invalid username or password";

pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Response, AppError> {
    let user = user_repo::find_by_username(&state.pool, payload.username.trim())
        .await?
        .ok_or_else(|| AppError::Unauthorized(INVALID_CREDENTIALS.into()))?;

    ensure_password_matches(&payload.password, &user.password_hash, INVALID_CREDENTIALS)?;

    let cookie = start_session(&state, &user).await?;
    tracing::info!(user_id = %user.id, username = %user.username, "admin logged in");

    let body = Json(LoginResponse {
        success: true,
        user,
    });
    Ok(with_cookie(body.into_response(), &cookie))
}

pub async fn logout(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> Result<Response, AppError> {
    session_repo::delete_session(&state.pool, session.id).await?;
    let cookie = build_clear_cookie(cookie_options(&state));
    Ok(with_cookie(
        Json(json!({ "success": true })).into_response(),
        &cookie,
    ))
}

pub async fn me(Extension(user): Extension<User>) -> Json<User> {
    Json(user)
}

/// Verifies the current password and signs out every other session.
pub async fn change_password(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Extension(session): Extension<Session>,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    payload.validate()?;
    ensure_password_matches(
        &payload.current_password,
        &user.password_hash,
        "Current password is incorrect",
    )?;
    if payload.current_password == payload.new_password {
        return Err(AppError::BadRequest(
            "New password must differ from the current password".into(),
        ));
    }

    let new_hash = hash_password(&payload.new_password)?;
    user_repo::update_password(&state.pool, user.id, &new_hash).await?;
    let revoked = session_repo::delete_other_sessions(&state.pool, user.id, session.id).await?;
    tracing::info!(user_id = %user.id, revoked_sessions = revoked, "password changed");

    Ok(Json(json!({ "success": true })))
}

pub async fn setup_status(State(state): State<AppState>) -> Result<Json<SetupStatus>, AppError> {
    let users = user_repo::count_users(&state.pool).await?;
    Ok(Json(SetupStatus {
        setup_needed: users == 0,
    }))
}

/// Creates the first admin and logs them in. Refused once any user exists.
pub async fn setup_create_user(
    State(state): State<AppState>,
    Json(payload): Json<SetupRequest>,
) -> Result<Response, AppError> {
    if user_repo::count_users(&state.pool).await? > 0 {
        return Err(AppError::Forbidden("Setup has already been completed".into()));
    }
    payload.validate()?;

    let password_hash = hash_password(&payload.password)?;
    let user = user_repo::create_first_user(
        &state.pool,
        payload.username.trim(),
        &password_hash,
        Utc::now(),
    )
    .await?
    .ok_or_else(|| AppError::Forbidden("Setup has already been completed".into()))?;
    tracing::info!(user_id = %user.id, username = %user.username, "initial admin created");

    let cookie = start_session(&state, &user).await?;
    let body = Json(LoginResponse {
        success: true,
        user,
    });
    Ok(with_cookie(body.into_response(), &cookie))
}

async fn start_session(state: &AppState, user: &User) -> Result<String, AppError> {
    let token = generate_token();
    let now = Utc::now();
    let ttl = state.config.session_ttl();
    session_repo::create_session(&state.pool, user.id, &token, now + ttl, now).await?;
    Ok(build_session_cookie(&token, ttl, cookie_options(state)))
}

fn cookie_options(state: &AppState) -> CookieOptions {
    CookieOptions {
        secure: state.config.cookie_secure,
    }
}

fn with_cookie(mut response: Response, cookie: &str) -> Response {
    if let Ok(value) = HeaderValue::from_str(cookie) {
        response.headers_mut().append(header::SET_COOKIE, value);
    }
    response
}
