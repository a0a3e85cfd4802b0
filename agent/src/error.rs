use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("agent is not configured: run `navguard-agent configure` first")]
    NotConfigured,
    #[error("invalid server url: {0}")]
    InvalidServerUrl(#[from] url::ParseError),
    #[error("server request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server answered {status}: {message}")]
    Server { status: u16, message: String },
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("state file error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed json: {0}")]
    Json(#[from] serde_json::Error),
}

pub type AgentResult<T> = Result<T, AgentError>;

impl IntoResponse for AgentError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            AgentError::NotConfigured => (StatusCode::SERVICE_UNAVAILABLE, "NOT_CONFIGURED"),
            AgentError::InvalidServerUrl(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            AgentError::Server { status, .. } if *status < 500 => {
                (StatusCode::BAD_REQUEST, "SERVER_REJECTED")
            }
            AgentError::Http(_) | AgentError::Server { .. } | AgentError::WebSocket(_) => {
                (StatusCode::BAD_GATEWAY, "SERVER_UNAVAILABLE")
            }
            AgentError::Io(_) | AgentError::Json(_) => {
                tracing::error!(error = %self, "local agent failure");
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            }
        };
        (status, Json(json!({ "error": self.to_string(), "code": code }))).into_response()
    }
}
