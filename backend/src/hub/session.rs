//! Per-connection pumps for a device WebSocket session.
//!
//! The writer drains the session's outbound queue and keeps the connection
//! alive with pings; the reader enforces the pong deadline and feeds pongs to
//! the liveness tracker. Whichever finishes first tears the other down.

use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{close_code, CloseFrame, Message, Utf8Bytes, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::config::Config;
use crate::services::liveness::LivenessTracker;
use crate::types::DeviceId;

#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    pub ping_interval: Duration,
    pub pong_wait: Duration,
    pub write_wait: Duration,
}

impl From<&Config> for SessionSettings {
    fn from(config: &Config) -> Self {
        Self {
            ping_interval: config.ws_ping_interval,
            pong_wait: config.ws_pong_wait,
            write_wait: config.ws_write_wait,
        }
    }
}

#[derive(Debug, Error)]
enum PumpError {
    #[error("write timed out after {0:?}")]
    WriteTimeout(Duration),
    #[error("transport error: {0}")]
    Transport(#[from] axum::Error),
    #[error("no pong within {0:?}")]
    ReadDeadline(Duration),
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The hub closed the outbound queue.
    QueueClosed,
    /// The peer closed the connection or the transport failed.
    PeerGone,
    TimedOut,
}

/// Runs both pumps until either ends.
pub async fn run(
    socket: WebSocket,
    device_id: DeviceId,
    outbound: mpsc::Receiver<Utf8Bytes>,
    settings: SessionSettings,
    liveness: &LivenessTracker,
) -> SessionEnd {
    let (sink, stream) = socket.split();

    let end = tokio::select! {
        result = write_pump(sink, outbound, settings) => result,
        result = read_pump(stream, device_id, settings.pong_wait, liveness) => result,
    };

    match end {
        Ok(end) => {
            tracing::debug!(device_id = %device_id, ?end, "session ended");
            end
        }
        Err(err) => {
            tracing::info!(device_id = %device_id, error = %err, "session torn down");
            match err {
                PumpError::WriteTimeout(_) | PumpError::ReadDeadline(_) => SessionEnd::TimedOut,
                PumpError::Transport(_) => SessionEnd::PeerGone,
            }
        }
    }
}

async fn write_pump(
    mut sink: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<Utf8Bytes>,
    settings: SessionSettings,
) -> Result<SessionEnd, PumpError> {
    let mut ticker = tokio::time::interval_at(
        Instant::now() + settings.ping_interval,
        settings.ping_interval,
    );

    loop {
        tokio::select! {
            next = outbound.recv() => match next {
                Some(text) => write(&mut sink, Message::Text(text), settings.write_wait).await?,
                None => {
                    let frame = CloseFrame {
                        code: close_code::NORMAL,
                        reason: Utf8Bytes::from_static("session closed"),
                    };
                    // Best effort; the peer may already be gone.
                    let _ = write(&mut sink, Message::Close(Some(frame)), settings.write_wait).await;
                    return Ok(SessionEnd::QueueClosed);
                }
            },
            _ = ticker.tick() => {
                write(&mut sink, Message::Ping(Bytes::new()), settings.write_wait).await?;
            }
        }
    }
}

async fn write(
    sink: &mut SplitSink<WebSocket, Message>,
    message: Message,
    write_wait: Duration,
) -> Result<(), PumpError> {
    match tokio::time::timeout(write_wait, sink.send(message)).await {
        Ok(result) => result.map_err(PumpError::from),
        Err(_) => Err(PumpError::WriteTimeout(write_wait)),
    }
}

async fn read_pump(
    mut stream: SplitStream<WebSocket>,
    device_id: DeviceId,
    pong_wait: Duration,
    liveness: &LivenessTracker,
) -> Result<SessionEnd, PumpError> {
    let mut deadline = Instant::now() + pong_wait;

    loop {
        let next = tokio::time::timeout_at(deadline, stream.next())
            .await
            .map_err(|_| PumpError::ReadDeadline(pong_wait))?;

        match next {
            None => return Ok(SessionEnd::PeerGone),
            Some(Err(err)) => return Err(PumpError::Transport(err)),
            Some(Ok(Message::Pong(_))) => {
                deadline = Instant::now() + pong_wait;
                if let Err(err) = liveness.record_heartbeat(device_id).await {
                    tracing::warn!(device_id = %device_id, error = %err, "failed to record pong");
                }
            }
            Some(Ok(Message::Close(_))) => return Ok(SessionEnd::PeerGone),
            // Pings are answered by the transport; application messages are ignored.
            Some(Ok(Message::Ping(_) | Message::Text(_) | Message::Binary(_))) => {}
        }
    }
}
