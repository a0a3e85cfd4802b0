use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde_json::{json, Value};
use validator::Validate;

use crate::{
    error::AppError,
    models::device::{CreateDevicePayload, DeviceResponse, DeviceWithToken},
    repositories::device as device_repo,
    state::AppState,
    types::DeviceId,
    utils::generate_token,
};

pub async fn list_devices(
    State(state): State<AppState>,
) -> Result<Json<Vec<DeviceResponse>>, AppError> {
    let devices = device_repo::list_devices(&state.pool).await?;
    let connected = state.hub.connected_devices().await;
    Ok(Json(
        devices
            .into_iter()
            .map(|device| {
                let is_connected = connected.contains(&device.id);
                DeviceResponse::new(device, is_connected)
            })
            .collect(),
    ))
}

pub async fn create_device(
    State(state): State<AppState>,
    Json(payload): Json<CreateDevicePayload>,
) -> Result<(StatusCode, Json<DeviceWithToken>), AppError> {
    payload.validate()?;
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest("Device name is required".into()));
    }

    let token = generate_token();
    let device = device_repo::create_device(&state.pool, name, &token, Utc::now()).await?;
    tracing::info!(device_id = %device.id, name = %device.name, "device created");

    Ok((
        StatusCode::CREATED,
        Json(DeviceWithToken {
            token: device.token.clone(),
            device: DeviceResponse::new(device, false),
        }),
    ))
}

pub async fn delete_device(
    State(state): State<AppState>,
    Path(id): Path<DeviceId>,
) -> Result<Json<Value>, AppError> {
    if !device_repo::delete_device(&state.pool, id).await? {
        return Err(AppError::NotFound("Device not found".into()));
    }
    state.hub.disconnect_device(id).await?;
    tracing::info!(device_id = %id, "device deleted");
    Ok(Json(json!({ "success": true, "id": id })))
}

/// Mints a new bearer token. Sessions opened with the old one are closed.
pub async fn regenerate_token(
    State(state): State<AppState>,
    Path(id): Path<DeviceId>,
) -> Result<Json<DeviceWithToken>, AppError> {
    let token = generate_token();
    let device = device_repo::rotate_token(&state.pool, id, &token)
        .await?
        .ok_or_else(|| AppError::NotFound("Device not found".into()))?;
    state.hub.disconnect_device(id).await?;
    tracing::info!(device_id = %id, "device token rotated");

    Ok(Json(DeviceWithToken {
        token: device.token.clone(),
        device: DeviceResponse::new(device, false),
    }))
}
