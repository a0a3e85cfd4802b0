use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use navguard_policy::compile;
use serde_json::{json, Value};
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        expiry::ExpiryChoice,
        pattern::{
            CreatePatternPayload, NewPattern, Pattern, PatternListItem, PatternListQuery,
            UpdatePatternPayload,
        },
    },
    repositories::{device as device_repo, pattern as pattern_repo},
    state::AppState,
    types::PatternId,
};

/// Deny patterns first, then newest; optionally narrowed to one device.
pub async fn list_patterns(
    State(state): State<AppState>,
    Query(query): Query<PatternListQuery>,
) -> Result<Json<Vec<PatternListItem>>, AppError> {
    let patterns = pattern_repo::list_patterns(&state.pool, query.device_id).await?;
    Ok(Json(patterns))
}

pub async fn create_pattern(
    State(state): State<AppState>,
    Json(payload): Json<CreatePatternPayload>,
) -> Result<(StatusCode, Json<Pattern>), AppError> {
    payload.validate()?;
    let pattern = normalize_pattern(&payload.pattern)?;
    let expiry = ExpiryChoice::parse(payload.duration.as_deref(), payload.custom_minutes)?;

    device_repo::find_device(&state.pool, payload.device_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Device not found".into()))?;

    let now = Utc::now();
    let new_pattern = NewPattern {
        device_id: payload.device_id,
        pattern,
        kind: payload.kind,
        expires_at: expiry.expires_at(now)?,
    };
    let created = pattern_repo::insert_pattern(&state.pool, &new_pattern, now).await?;
    tracing::info!(
        pattern_id = %created.id,
        device_id = %created.device_id,
        kind = %created.kind,
        pattern = %created.pattern,
        "pattern created"
    );

    state.publish_patterns(created.device_id);
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn update_pattern(
    State(state): State<AppState>,
    Path(id): Path<PatternId>,
    Json(payload): Json<UpdatePatternPayload>,
) -> Result<Json<Pattern>, AppError> {
    payload.validate()?;
    let pattern = normalize_pattern(&payload.pattern)?;
    let expiry = ExpiryChoice::parse(payload.duration.as_deref(), payload.custom_minutes)?;

    let updated = pattern_repo::update_pattern(
        &state.pool,
        id,
        &pattern,
        payload.kind,
        expiry.expires_at(Utc::now())?,
    )
    .await?
    .ok_or_else(|| AppError::NotFound("Pattern not found".into()))?;

    state.publish_patterns(updated.device_id);
    Ok(Json(updated))
}

pub async fn delete_pattern(
    State(state): State<AppState>,
    Path(id): Path<PatternId>,
) -> Result<Json<Value>, AppError> {
    let device_id = pattern_repo::delete_pattern(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Pattern not found".into()))?;

    state.publish_patterns(device_id);
    Ok(Json(json!({ "success": true, "id": id })))
}

pub async fn toggle_pattern(
    State(state): State<AppState>,
    Path(id): Path<PatternId>,
) -> Result<Json<Pattern>, AppError> {
    let toggled = pattern_repo::toggle_pattern(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Pattern not found".into()))?;

    state.publish_patterns(toggled.device_id);
    Ok(Json(toggled))
}

/// Trims and checks that the pattern compiles before it is stored.
pub(crate) fn normalize_pattern(raw: &str) -> Result<String, AppError> {
    let matcher = compile(raw)?;
    Ok(matcher.as_str().to_string())
}
