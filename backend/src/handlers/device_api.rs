//! Endpoints called by the browser agent with its device bearer token.

use axum::{
    extract::{Extension, Query, State},
    http::{HeaderMap, StatusCode},
    response::Html,
    Json,
};
use chrono::Utc;
use navguard_policy::{compile, suggest_pattern, PatternRecord, PatternSnapshot};
use serde::Deserialize;
use serde_json::{json, Value};
use validator::Validate;

use crate::{
    error::AppError,
    middleware::auth::{authenticate_device, device_token},
    models::{
        access_request::{AccessRequest, CreateAccessRequestPayload},
        device::{Device, DeviceStatus, HeartbeatResponse},
    },
    repositories::{access_request as request_repo, pattern as pattern_repo},
    services::notifier::NotificationEvent,
    state::AppState,
};

const UNINSTALL_PAGE: &str = "<!DOCTYPE html>\
<html><head><meta charset=\"utf-8\"><title>navguard</title></head>\
<body><h1>Extension removed</h1>\
<p>The navguard extension has been uninstalled from this browser.</p></body></html>";

/// Enabled, unexpired patterns for the calling device.
pub async fn get_patterns(
    State(state): State<AppState>,
    Extension(device): Extension<Device>,
) -> Result<Json<PatternSnapshot>, AppError> {
    let patterns = pattern_repo::list_live_for_device(&state.pool, device.id, Utc::now()).await?;
    Ok(Json(PatternSnapshot::new(
        patterns.into_iter().map(PatternRecord::from).collect(),
    )))
}

pub async fn create_request(
    State(state): State<AppState>,
    Extension(device): Extension<Device>,
    Json(payload): Json<CreateAccessRequestPayload>,
) -> Result<(StatusCode, Json<AccessRequest>), AppError> {
    payload.validate()?;
    let url = payload.url.trim();

    let suggested = payload
        .suggested_pattern
        .as_deref()
        .map(str::trim)
        .filter(|pattern| !pattern.is_empty())
        .map(str::to_string)
        .or_else(|| suggest_pattern(url))
        .ok_or_else(|| AppError::BadRequest("Cannot derive a pattern from the URL".into()))?;
    compile(&suggested)?;

    let request =
        request_repo::create_request(&state.pool, device.id, url, &suggested, Utc::now()).await?;
    tracing::info!(
        device_id = %device.id,
        request_id = %request.id,
        url = %request.url,
        "access requested"
    );

    state.notifications.notify(NotificationEvent::NewRequest {
        device_name: device.name,
        url: request.url.clone(),
    });

    Ok((StatusCode::CREATED, Json(request)))
}

pub async fn heartbeat(
    State(state): State<AppState>,
    Extension(device): Extension<Device>,
) -> Result<Json<HeartbeatResponse>, AppError> {
    let status = state
        .liveness
        .record_heartbeat(device.id)
        .await?
        .unwrap_or(DeviceStatus::Uninstalled);
    Ok(Json(HeartbeatResponse {
        success: true,
        status,
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct UninstallQuery {
    pub token: Option<String>,
}

/// Opened by the browser as the extension's uninstall URL.
pub async fn uninstall_page(
    State(state): State<AppState>,
    Query(query): Query<UninstallQuery>,
    headers: HeaderMap,
) -> Html<&'static str> {
    process_uninstall(&state, device_token(query.token.as_deref(), &headers)).await;
    Html(UNINSTALL_PAGE)
}

pub async fn uninstall(
    State(state): State<AppState>,
    Query(query): Query<UninstallQuery>,
    headers: HeaderMap,
) -> Json<Value> {
    process_uninstall(&state, device_token(query.token.as_deref(), &headers)).await;
    Json(json!({ "success": true }))
}

/// Never fails: unknown tokens and store errors are only logged.
async fn process_uninstall(state: &AppState, token: Option<String>) {
    let Some(token) = token else {
        tracing::debug!("uninstall without a token");
        return;
    };

    let device = match authenticate_device(state, &token).await {
        Ok(Some(device)) => device,
        Ok(None) => {
            tracing::debug!("uninstall with an unknown token");
            return;
        }
        Err(err) => {
            tracing::warn!(error = ?err, "uninstall lookup failed");
            return;
        }
    };

    match state.liveness.mark_uninstalled(device.id).await {
        Ok(true) => {
            if let Err(err) = state.hub.disconnect_device(device.id).await {
                tracing::warn!(device_id = %device.id, error = %err, "failed to close sessions");
            }
        }
        Ok(false) => {}
        Err(err) => tracing::warn!(device_id = %device.id, error = %err, "uninstall failed"),
    }
}
