//! Keeps the local cache converged with the server.
//!
//! Three timers run side by side: reconnect (opens the live channel whenever
//! it is down), poll and heartbeat. The last two only act while the live
//! channel is down, since the channel's own keepalive already reports
//! liveness and every push carries the full set.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::StreamExt;
use navguard_policy::PushMessage;
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use crate::cache::PolicyCache;
use crate::client::ApiClient;
use crate::error::{AgentError, AgentResult};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, Copy)]
pub struct SyncIntervals {
    pub reconnect: Duration,
    pub poll: Duration,
    pub heartbeat: Duration,
}

impl Default for SyncIntervals {
    fn default() -> Self {
        Self {
            reconnect: Duration::from_secs(5),
            poll: Duration::from_secs(30),
            heartbeat: Duration::from_secs(60),
        }
    }
}

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct SyncEngine {
    client: ApiClient,
    cache: Arc<PolicyCache>,
    intervals: SyncIntervals,
    state: watch::Sender<ConnectionState>,
    /// Reader task of the current live connection, if any.
    connection: Mutex<Option<JoinHandle<()>>>,
    generation: AtomicU64,
}

impl SyncEngine {
    pub fn new(client: ApiClient, cache: Arc<PolicyCache>, intervals: SyncIntervals) -> Arc<Self> {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Arc::new(Self {
            client,
            cache,
            intervals,
            state,
            connection: Mutex::new(None),
            generation: AtomicU64::new(0),
        })
    }

    pub fn cache(&self) -> &Arc<PolicyCache> {
        &self.cache
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.connection_state() == ConnectionState::Connected
    }

    /// Opens the live channel, tearing down any existing one first.
    pub async fn connect(self: &Arc<Self>) -> AgentResult<()> {
        let mut slot = self.connection.lock().await;
        if let Some(previous) = slot.take() {
            previous.abort();
        }
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.send_replace(ConnectionState::Connecting);

        let socket = match self.open_socket().await {
            Ok(socket) => socket,
            Err(err) => {
                self.state.send_replace(ConnectionState::Disconnected);
                return Err(err);
            }
        };
        self.state.send_replace(ConnectionState::Connected);
        tracing::info!("live channel connected");

        let engine = Arc::clone(self);
        *slot = Some(tokio::spawn(async move {
            engine.read_loop(socket).await;
            engine.connection_lost(generation).await;
        }));
        Ok(())
    }

    async fn open_socket(&self) -> AgentResult<Socket> {
        let url = self.client.ws_url()?;
        match tokio::time::timeout(CONNECT_TIMEOUT, connect_async(url.as_str())).await {
            Ok(Ok((socket, _response))) => Ok(socket),
            Ok(Err(err)) => Err(AgentError::WebSocket(err)),
            Err(_) => Err(AgentError::WebSocket(
                tokio_tungstenite::tungstenite::Error::Io(std::io::ErrorKind::TimedOut.into()),
            )),
        }
    }

    async fn read_loop(&self, mut socket: Socket) {
        // Reading also flushes the automatic replies to server pings.
        while let Some(frame) = socket.next().await {
            match frame {
                Ok(Message::Text(text)) => self.on_text(&text).await,
                Ok(Message::Close(frame)) => {
                    tracing::info!(?frame, "server closed the live channel");
                    return;
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(error = %err, "live channel failed");
                    return;
                }
            }
        }
    }

    async fn on_text(&self, text: &str) {
        match serde_json::from_str::<PushMessage>(text) {
            Ok(PushMessage::PatternsUpdated(snapshot)) => {
                let count = snapshot.patterns.len();
                if let Err(err) = self.cache.replace(snapshot, Utc::now()).await {
                    tracing::warn!(error = %err, "failed to persist pushed patterns");
                }
                tracing::debug!(patterns = count, "applied pushed patterns");
            }
            Err(err) => tracing::warn!(error = %err, "ignoring unrecognized push message"),
        }
    }

    /// Marks the channel down unless a newer connection has replaced it.
    async fn connection_lost(&self, generation: u64) {
        let _slot = self.connection.lock().await;
        if self.generation.load(Ordering::SeqCst) == generation {
            self.state.send_replace(ConnectionState::Disconnected);
        }
    }

    pub async fn disconnect(&self) {
        let mut slot = self.connection.lock().await;
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(task) = slot.take() {
            task.abort();
        }
        self.state.send_replace(ConnectionState::Disconnected);
    }

    /// Pulls the full set over HTTP. Returns `false` without a request while
    /// the live channel is up.
    pub async fn poll_once(&self) -> AgentResult<bool> {
        if self.is_connected() {
            return Ok(false);
        }
        let snapshot = self.client.fetch_patterns().await?;
        self.cache.replace(snapshot, Utc::now()).await?;
        Ok(true)
    }

    /// Reports liveness over HTTP, only while the live channel is down.
    pub async fn heartbeat_once(&self) -> AgentResult<bool> {
        if self.is_connected() {
            return Ok(false);
        }
        let ack = self.client.heartbeat().await?;
        tracing::debug!(status = %ack.status, "heartbeat acknowledged");
        self.cache.record_heartbeat(Utc::now()).await?;
        Ok(true)
    }

    /// Runs all timers until `shutdown` flips to `true`, then closes the
    /// live channel. Errors are logged and retried on the next tick.
    pub async fn run(self: Arc<Self>, shutdown: watch::Receiver<bool>) {
        let reconnect = every(self.intervals.reconnect, shutdown.clone(), || {
            let engine = Arc::clone(&self);
            async move {
                if engine.connection_state() != ConnectionState::Disconnected {
                    return;
                }
                if let Err(err) = engine.connect().await {
                    tracing::debug!(error = %err, "connect attempt failed");
                }
            }
        });
        let poll = every(self.intervals.poll, shutdown.clone(), || {
            let engine = Arc::clone(&self);
            async move {
                if let Err(err) = engine.poll_once().await {
                    tracing::warn!(error = %err, "pattern poll failed");
                }
            }
        });
        let heartbeat = every(self.intervals.heartbeat, shutdown, || {
            let engine = Arc::clone(&self);
            async move {
                if let Err(err) = engine.heartbeat_once().await {
                    tracing::warn!(error = %err, "heartbeat failed");
                }
            }
        });

        tokio::join!(reconnect, poll, heartbeat);
        self.disconnect().await;
        tracing::info!("sync engine stopped");
    }
}

/// Runs `action` now and then every `period` until shutdown.
async fn every<F, Fut>(period: Duration, mut shutdown: watch::Receiver<bool>, mut action: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        if *shutdown.borrow() {
            return;
        }
        tokio::select! {
            _ = ticker.tick() => action().await,
            changed = shutdown.changed() => {
                if changed.is_err() {
                    return;
                }
            }
        }
    }
}
