use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Utc;
use navguard_policy::PatternKind;
use serde::Serialize;

use crate::{
    error::AppError,
    models::{
        access_request::{AccessRequest, ApproveRequestPayload, RequestListQuery, RequestStatus},
        expiry::ExpiryChoice,
        pattern::{NewPattern, Pattern},
    },
    repositories::access_request as request_repo,
    state::AppState,
    types::RequestId,
};

use super::patterns::normalize_pattern;

#[derive(Debug, Serialize)]
pub struct ApproveResponse {
    pub request: AccessRequest,
    pub pattern: Pattern,
}

pub async fn list_requests(
    State(state): State<AppState>,
    Query(query): Query<RequestListQuery>,
) -> Result<Json<Vec<AccessRequest>>, AppError> {
    let status = parse_status_filter(query.status.as_deref())?;
    let requests = request_repo::list_requests(&state.pool, status).await?;
    Ok(Json(requests))
}

/// Grants the request: creates the pattern (allow unless stated otherwise)
/// and resolves the request in one transaction, then pushes the new set.
pub async fn approve_request(
    State(state): State<AppState>,
    Path(id): Path<RequestId>,
    payload: Option<Json<ApproveRequestPayload>>,
) -> Result<Json<ApproveResponse>, AppError> {
    let payload = payload.map(|Json(payload)| payload).unwrap_or_default();
    let expiry = ExpiryChoice::parse(payload.duration.as_deref(), payload.custom_minutes)?;
    let kind = payload.kind.unwrap_or(PatternKind::Allow);
    let now = Utc::now();
    let expires_at = expiry.expires_at(now)?;

    let (request, pattern) = request_repo::approve_request(&state.pool, id, now, |request| {
        let raw = payload
            .pattern
            .as_deref()
            .map(str::trim)
            .filter(|pattern| !pattern.is_empty())
            .unwrap_or(&request.suggested_pattern);
        Ok(NewPattern {
            device_id: request.device_id,
            pattern: normalize_pattern(raw)?,
            kind,
            expires_at,
        })
    })
    .await?;

    tracing::info!(
        request_id = %request.id,
        device_id = %request.device_id,
        pattern_id = %pattern.id,
        pattern = %pattern.pattern,
        expires_at = ?pattern.expires_at,
        "access request approved"
    );

    state.publish_patterns(request.device_id);
    Ok(Json(ApproveResponse { request, pattern }))
}

pub async fn deny_request(
    State(state): State<AppState>,
    Path(id): Path<RequestId>,
) -> Result<Json<AccessRequest>, AppError> {
    let request = request_repo::deny_request(&state.pool, id, Utc::now()).await?;
    tracing::info!(request_id = %request.id, device_id = %request.device_id, "access request denied");
    Ok(Json(request))
}

fn parse_status_filter(raw: Option<&str>) -> Result<Option<RequestStatus>, AppError> {
    match raw.map(str::trim).unwrap_or("") {
        "" | "all" => Ok(None),
        "pending" => Ok(Some(RequestStatus::Pending)),
        "approved" => Ok(Some(RequestStatus::Approved)),
        "denied" => Ok(Some(RequestStatus::Denied)),
        other => Err(AppError::BadRequest(format!("Unknown status `{}`", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_filter_accepts_known_values() {
        assert_eq!(parse_status_filter(None).unwrap(), None);
        assert_eq!(parse_status_filter(Some("all")).unwrap(), None);
        assert_eq!(
            parse_status_filter(Some("pending")).unwrap(),
            Some(RequestStatus::Pending)
        );
        assert!(parse_status_filter(Some("rejected")).is_err());
    }
}
