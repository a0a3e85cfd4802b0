//! API error type. Every handler returns `Result<_, AppError>`; the response
//! body is always `{error, code, details?}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    /// Duplicate usernames and resolving a request that is no longer pending.
    #[error("{0}")]
    Conflict(String),
    #[error("validation failed: {}", .0.join(", "))]
    Validation(Vec<String>),
    #[error(transparent)]
    InternalServerError(anyhow::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Conflict(_) => "CONFLICT",
            AppError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();
        let (error, details) = match self {
            AppError::InternalServerError(err) => {
                // Store and hub faults are logged, never echoed to the caller.
                tracing::error!(error = ?err, "internal server error");
                ("Internal server error".to_string(), None)
            }
            AppError::Validation(errors) => (
                "Validation failed".to_string(),
                Some(json!({ "errors": errors })),
            ),
            AppError::BadRequest(msg)
            | AppError::Unauthorized(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg)
            | AppError::Conflict(msg) => (msg, None),
        };

        (status, Json(ErrorResponse { error, code, details })).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::InternalServerError(err)
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => AppError::NotFound("Resource not found".into()),
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                AppError::Conflict("Resource already exists".into())
            }
            other => AppError::InternalServerError(other.into()),
        }
    }
}

impl From<navguard_policy::PatternError> for AppError {
    fn from(err: navguard_policy::PatternError) -> Self {
        AppError::BadRequest(format!("Invalid pattern: {}", err))
    }
}

impl From<crate::hub::HubError> for AppError {
    fn from(err: crate::hub::HubError) -> Self {
        AppError::InternalServerError(err.into())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut messages: Vec<String> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| errs.iter().map(move |e| format!("{}: {}", field, e.code)))
            .collect();
        messages.sort();
        AppError::Validation(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body(error: AppError) -> (StatusCode, Value) {
        let response = error.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn client_errors_echo_their_message() {
        let cases = [
            (AppError::BadRequest("Invalid duration".into()), 400, "BAD_REQUEST"),
            (AppError::Unauthorized("Invalid device token".into()), 401, "UNAUTHORIZED"),
            (AppError::Forbidden("Setup already completed".into()), 403, "FORBIDDEN"),
            (AppError::NotFound("Device not found".into()), 404, "NOT_FOUND"),
            (AppError::Conflict("Request already resolved".into()), 409, "CONFLICT"),
        ];
        for (error, status, code) in cases {
            let message = error.to_string();
            let (actual, json) = body(error).await;
            assert_eq!(actual.as_u16(), status);
            assert_eq!(json["code"], code);
            assert_eq!(json["error"], message);
            assert!(json.get("details").is_none());
        }
    }

    #[tokio::test]
    async fn validation_lists_field_errors_in_details() {
        let (status, json) = body(AppError::Validation(vec!["name: length".into()])).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["code"], "VALIDATION_ERROR");
        assert_eq!(json["details"]["errors"][0], "name: length");
    }

    #[tokio::test]
    async fn empty_pattern_is_a_bad_request() {
        let err = navguard_policy::compile("  ").unwrap_err();
        let (status, json) = body(AppError::from(err)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "Invalid pattern: pattern is empty");
    }

    #[test]
    fn missing_rows_are_not_found() {
        assert!(matches!(
            AppError::from(sqlx::Error::RowNotFound),
            AppError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn internal_errors_hide_their_cause() {
        let (status, json) = body(AppError::InternalServerError(anyhow::anyhow!(
            "database is locked"
        )))
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["error"], "Internal server error");
        assert_eq!(json["code"], "INTERNAL_SERVER_ERROR");
    }
}
