use axum::{
    extract::{ws::WebSocket, Query, State, WebSocketUpgrade},
    http::HeaderMap,
    response::Response,
};
use serde::Deserialize;

use crate::{
    error::AppError,
    hub::session::{self, SessionSettings},
    middleware::auth::{authenticate_device, device_token},
    models::device::Device,
    state::AppState,
};

#[derive(Debug, Default, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

/// `GET /api/ws?token=`: authenticates the device, then hands the socket to
/// the hub.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let token = device_token(query.token.as_deref(), &headers)
        .ok_or_else(|| AppError::Unauthorized("Missing device token".into()))?;
    let device = authenticate_device(&state, &token)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid device token".into()))?;

    let max_message_bytes = state.config.ws_max_message_bytes;
    Ok(ws
        .max_message_size(max_message_bytes)
        .on_upgrade(move |socket| serve_device(socket, device, state)))
}

async fn serve_device(socket: WebSocket, device: Device, state: AppState) {
    let (key, outbound) = match state.hub.register(device.id).await {
        Ok(registered) => registered,
        Err(err) => {
            tracing::error!(device_id = %device.id, error = %err, "session registration failed");
            return;
        }
    };

    if let Err(err) = state.liveness.record_heartbeat(device.id).await {
        tracing::warn!(device_id = %device.id, error = %err, "failed to record connect");
    }
    // Initial snapshot so a reconnecting agent catches up immediately.
    state.publish_patterns(device.id);

    session::run(
        socket,
        device.id,
        outbound,
        SessionSettings::from(&state.config),
        &state.liveness,
    )
    .await;

    if let Err(err) = state.hub.unregister(key).await {
        tracing::warn!(device_id = %device.id, error = %err, "session unregister failed");
    }
}
