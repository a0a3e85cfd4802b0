use axum::{
    extract::{Extension, State},
    Json,
};

use crate::{
    error::AppError,
    models::user::{NotificationPrefs, UpdateNotificationPrefs, User},
    repositories::user as user_repo,
    state::AppState,
};

pub async fn get_prefs(Extension(user): Extension<User>) -> Json<NotificationPrefs> {
    Json(NotificationPrefs::from(&user))
}

pub async fn update_prefs(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Json(payload): Json<UpdateNotificationPrefs>,
) -> Result<Json<NotificationPrefs>, AppError> {
    let current = NotificationPrefs::from(&user);
    let prefs = NotificationPrefs {
        notify_new_requests: payload
            .notify_new_requests
            .unwrap_or(current.notify_new_requests),
        notify_device_status: payload
            .notify_device_status
            .unwrap_or(current.notify_device_status),
    };
    let updated = user_repo::update_notification_prefs(&state.pool, user.id, prefs)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;
    Ok(Json(NotificationPrefs::from(&updated)))
}
