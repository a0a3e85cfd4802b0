//! Device liveness: `active ⇄ inactive → uninstalled`.
//!
//! Heartbeats arrive from three places (the HTTP heartbeat endpoint, every
//! WebSocket pong, and every session registration). A periodic sweep marks
//! devices inactive once they have been silent for longer than the threshold.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::db::connection::DbPool;
use crate::models::device::DeviceStatus;
use crate::repositories::device as device_repo;
use crate::services::notifier::{NotificationEvent, NotificationSender};
use crate::types::DeviceId;

#[derive(Debug, Clone)]
pub struct LivenessTracker {
    pool: DbPool,
    notifications: NotificationSender,
    threshold: Duration,
}

impl LivenessTracker {
    pub fn new(pool: DbPool, notifications: NotificationSender, threshold: Duration) -> Self {
        Self {
            pool,
            notifications,
            threshold,
        }
    }

    /// Returns the resulting status, or `None` for uninstalled devices, which
    /// stay uninstalled.
    pub async fn record_heartbeat(
        &self,
        device_id: DeviceId,
    ) -> Result<Option<DeviceStatus>, sqlx::Error> {
        device_repo::touch_device(&self.pool, device_id, Utc::now()).await
    }

    /// Marks idle devices inactive and notifies once per device. Returns the
    /// names of devices that transitioned in this pass.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<Vec<String>, sqlx::Error> {
        let threshold = chrono::Duration::from_std(self.threshold)
            .unwrap_or_else(|_| chrono::Duration::seconds(120));
        let names = device_repo::mark_idle_inactive(&self.pool, now - threshold).await?;
        for name in &names {
            tracing::info!(device = %name, "device went inactive");
            self.notifications.notify(NotificationEvent::DeviceStatus {
                device_name: name.clone(),
                status: DeviceStatus::Inactive,
            });
        }
        Ok(names)
    }

    /// Idempotent. Notifies only on the call that performs the transition and
    /// returns whether it did.
    pub async fn mark_uninstalled(&self, device_id: DeviceId) -> Result<bool, sqlx::Error> {
        match device_repo::mark_uninstalled(&self.pool, device_id).await? {
            Some(name) => {
                tracing::info!(device = %name, device_id = %device_id, "device uninstalled");
                self.notifications.notify(NotificationEvent::DeviceStatus {
                    device_name: name,
                    status: DeviceStatus::Uninstalled,
                });
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Runs [`sweep`](Self::sweep) immediately and then every `every` until
    /// `shutdown` flips to `true`.
    pub fn spawn_sweeper(&self, every: Duration, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let tracker = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(err) = tracker.sweep(Utc::now()).await {
                            tracing::error!(error = %err, "liveness sweep failed");
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            tracing::debug!("liveness sweeper stopped");
                            return;
                        }
                    }
                }
            }
        })
    }
}
