//! In-memory fan-out of pattern updates to connected devices.
//!
//! A device may hold any number of live sessions. Registration changes are
//! serialized through a single actor task; sends only take the read lock, so
//! many pushes can proceed concurrently.

pub mod session;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use axum::extract::ws::Utf8Bytes;
use navguard_policy::PushMessage;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::task::JoinHandle;

use crate::types::DeviceId;

#[derive(Debug, Error)]
pub enum HubError {
    #[error("connection hub has shut down")]
    Closed,
    #[error("failed to encode push message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Identifies one live session of one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub device_id: DeviceId,
    pub session: u64,
}

type Sessions = HashMap<DeviceId, HashMap<u64, mpsc::Sender<Utf8Bytes>>>;

enum Command {
    Register {
        device_id: DeviceId,
        outbound: mpsc::Sender<Utf8Bytes>,
        ack: oneshot::Sender<SessionKey>,
    },
    Unregister {
        key: SessionKey,
        ack: oneshot::Sender<()>,
    },
    DisconnectDevice {
        device_id: DeviceId,
        ack: oneshot::Sender<usize>,
    },
}

#[derive(Clone)]
pub struct Hub {
    sessions: Arc<RwLock<Sessions>>,
    commands: mpsc::Sender<Command>,
    queue_capacity: usize,
}

impl Hub {
    /// Starts the registration actor. The actor stops once every `Hub` clone
    /// has been dropped.
    pub fn spawn(queue_capacity: usize) -> (Self, JoinHandle<()>) {
        let sessions: Arc<RwLock<Sessions>> = Arc::default();
        let (commands, rx) = mpsc::channel(64);
        let task = tokio::spawn(run_actor(sessions.clone(), rx));
        (
            Self {
                sessions,
                commands,
                queue_capacity: queue_capacity.max(1),
            },
            task,
        )
    }

    /// Adds a session for `device_id` and returns the receiving end of its
    /// bounded outbound queue.
    pub async fn register(
        &self,
        device_id: DeviceId,
    ) -> Result<(SessionKey, mpsc::Receiver<Utf8Bytes>), HubError> {
        let (outbound, rx) = mpsc::channel(self.queue_capacity);
        let (ack, done) = oneshot::channel();
        self.commands
            .send(Command::Register {
                device_id,
                outbound,
                ack,
            })
            .await
            .map_err(|_| HubError::Closed)?;
        let key = done.await.map_err(|_| HubError::Closed)?;
        Ok((key, rx))
    }

    /// Removes the session and closes its outbound queue. Unknown keys are ignored.
    pub async fn unregister(&self, key: SessionKey) -> Result<(), HubError> {
        let (ack, done) = oneshot::channel();
        self.commands
            .send(Command::Unregister { key, ack })
            .await
            .map_err(|_| HubError::Closed)?;
        done.await.map_err(|_| HubError::Closed)
    }

    /// Closes every session of the device; their writers send a close frame.
    pub async fn disconnect_device(&self, device_id: DeviceId) -> Result<usize, HubError> {
        let (ack, done) = oneshot::channel();
        self.commands
            .send(Command::DisconnectDevice { device_id, ack })
            .await
            .map_err(|_| HubError::Closed)?;
        done.await.map_err(|_| HubError::Closed)
    }

    /// Serializes once and enqueues to every session of the device without
    /// waiting. A session whose queue is full misses this message. Returns
    /// the number of sessions it was queued for.
    pub async fn send_to_device(
        &self,
        device_id: DeviceId,
        message: &PushMessage,
    ) -> Result<usize, HubError> {
        let text = Utf8Bytes::from(message.to_json()?);
        Ok(self.send_text(device_id, text).await)
    }

    pub async fn send_text(&self, device_id: DeviceId, text: Utf8Bytes) -> usize {
        let sessions = self.sessions.read().await;
        let Some(device_sessions) = sessions.get(&device_id) else {
            return 0;
        };

        let mut delivered = 0;
        for (session, outbound) in device_sessions {
            match outbound.try_send(text.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(
                        device_id = %device_id,
                        session,
                        "outbound queue full, dropping message"
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    tracing::debug!(device_id = %device_id, session, "session writer gone");
                }
            }
        }
        delivered
    }

    pub async fn connected_device_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_device_connected(&self, device_id: DeviceId) -> bool {
        self.sessions.read().await.contains_key(&device_id)
    }

    pub async fn connected_devices(&self) -> HashSet<DeviceId> {
        self.sessions.read().await.keys().copied().collect()
    }

    pub async fn session_count(&self, device_id: DeviceId) -> usize {
        self.sessions
            .read()
            .await
            .get(&device_id)
            .map_or(0, HashMap::len)
    }
}

async fn run_actor(sessions: Arc<RwLock<Sessions>>, mut commands: mpsc::Receiver<Command>) {
    let mut next_session: u64 = 0;
    while let Some(command) = commands.recv().await {
        match command {
            Command::Register {
                device_id,
                outbound,
                ack,
            } => {
                next_session += 1;
                let key = SessionKey {
                    device_id,
                    session: next_session,
                };
                sessions
                    .write()
                    .await
                    .entry(device_id)
                    .or_default()
                    .insert(key.session, outbound);
                tracing::info!(device_id = %device_id, session = key.session, "session registered");
                let _ = ack.send(key);
            }
            Command::Unregister { key, ack } => {
                let mut guard = sessions.write().await;
                if let Some(device_sessions) = guard.get_mut(&key.device_id) {
                    if device_sessions.remove(&key.session).is_some() {
                        tracing::info!(
                            device_id = %key.device_id,
                            session = key.session,
                            "session unregistered"
                        );
                    }
                    if device_sessions.is_empty() {
                        guard.remove(&key.device_id);
                    }
                }
                drop(guard);
                let _ = ack.send(());
            }
            Command::DisconnectDevice { device_id, ack } => {
                let removed = sessions
                    .write()
                    .await
                    .remove(&device_id)
                    .map_or(0, |device_sessions| device_sessions.len());
                if removed > 0 {
                    tracing::info!(device_id = %device_id, sessions = removed, "device disconnected");
                }
                let _ = ack.send(removed);
            }
        }
    }
    tracing::debug!("hub actor stopped");
}
