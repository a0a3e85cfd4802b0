use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use validator::Validate;

use crate::{
    error::AppError,
    models::user::{CreateUser, User},
    repositories::user as user_repo,
    state::AppState,
    utils::password::hash_password,
};

pub async fn list_users(State(state): State<AppState>) -> Result<Json<Vec<User>>, AppError> {
    Ok(Json(user_repo::list_users(&state.pool).await?))
}

pub async fn create_user(
    State(state): State<AppState>,
    Json(payload): Json<CreateUser>,
) -> Result<(StatusCode, Json<User>), AppError> {
    payload.validate()?;
    let username = payload.username.trim();
    if user_repo::find_by_username(&state.pool, username)
        .await?
        .is_some()
    {
        return Err(AppError::Conflict("Username already exists".into()));
    }

    let password_hash = hash_password(&payload.password)?;
    let user = user_repo::create_user(&state.pool, username, &password_hash, Utc::now()).await?;
    tracing::info!(user_id = %user.id, username = %user.username, "admin user created");
    Ok((StatusCode::CREATED, Json(user)))
}
