//! Admin notifications for new access requests and device status changes.
//!
//! Request handlers and the liveness sweeper only enqueue a
//! [`NotificationEvent`]; a dispatcher task resolves recipients from their
//! preferences and hands each one to a [`Notifier`]. Delivery failures are
//! logged and never surface to the code that raised the event.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::db::connection::DbPool;
use crate::models::{device::DeviceStatus, user::User};
use crate::repositories::user as user_repo;

const URL_DISPLAY_LIMIT: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationEvent {
    NewRequest { device_name: String, url: String },
    DeviceStatus { device_name: String, status: DeviceStatus },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub url: String,
    pub tag: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
}

impl NotificationEvent {
    pub fn to_notification(&self, public_base_url: Option<&str>) -> Notification {
        let link = |fragment: &str| {
            let base = public_base_url.unwrap_or("").trim_end_matches('/');
            format!("{}/admin/#{}", base, fragment)
        };
        match self {
            NotificationEvent::NewRequest { device_name, url } => Notification {
                title: "New Access Request".into(),
                body: format!("{} is requesting access to {}", device_name, truncate_url(url)),
                url: link("requests"),
                tag: "new-request".into(),
                kind: "new_request",
            },
            NotificationEvent::DeviceStatus {
                device_name,
                status,
            } => {
                let body = match status {
                    DeviceStatus::Inactive => format!("{} has gone inactive (no heartbeat)", device_name),
                    DeviceStatus::Uninstalled => format!("{} extension has been uninstalled", device_name),
                    DeviceStatus::Active => {
                        format!("{} status changed to {}", device_name, status.as_str())
                    }
                };
                Notification {
                    title: "Device Status Change".into(),
                    body,
                    url: link("devices"),
                    tag: format!("device-status-{}", device_name),
                    kind: "device_status",
                }
            }
        }
    }
}

fn truncate_url(url: &str) -> String {
    if url.chars().count() <= URL_DISPLAY_LIMIT {
        return url.to_string();
    }
    let mut truncated: String = url.chars().take(URL_DISPLAY_LIMIT - 3).collect();
    truncated.push_str("...");
    truncated
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, recipient: &User, notification: &Notification) -> anyhow::Result<()>;
}

/// Writes notifications to the log. Used when no webhook is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn deliver(&self, recipient: &User, notification: &Notification) -> anyhow::Result<()> {
        tracing::info!(
            recipient = %recipient.username,
            kind = notification.kind,
            title = %notification.title,
            body = %notification.body,
            "notification"
        );
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct WebhookBody<'a> {
    recipient: &'a str,
    #[serde(flatten)]
    notification: &'a Notification,
}

/// POSTs each notification as JSON to a fixed endpoint.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    endpoint: String,
}

impl WebhookNotifier {
    pub fn new(endpoint: impl Into<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn deliver(&self, recipient: &User, notification: &Notification) -> anyhow::Result<()> {
        self.client
            .post(&self.endpoint)
            .json(&WebhookBody {
                recipient: &recipient.username,
                notification,
            })
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Enqueue side of the dispatcher. Cheap to clone.
#[derive(Debug, Clone)]
pub struct NotificationSender {
    tx: mpsc::Sender<NotificationEvent>,
}

impl NotificationSender {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<NotificationEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Never blocks; a full or closed queue drops the event with a warning.
    pub fn notify(&self, event: NotificationEvent) {
        if let Err(err) = self.tx.try_send(event) {
            tracing::warn!(error = %err, "dropping notification event");
        }
    }
}

pub fn spawn_dispatcher(
    pool: DbPool,
    notifier: Arc<dyn Notifier>,
    public_base_url: Option<String>,
    mut events: mpsc::Receiver<NotificationEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let recipients = match &event {
                NotificationEvent::NewRequest { .. } => {
                    user_repo::new_request_recipients(&pool).await
                }
                NotificationEvent::DeviceStatus { .. } => {
                    user_repo::device_status_recipients(&pool).await
                }
            };
            let recipients = match recipients {
                Ok(users) => users,
                Err(err) => {
                    tracing::error!(error = %err, "failed to load notification recipients");
                    continue;
                }
            };

            let notification = event.to_notification(public_base_url.as_deref());
            for recipient in &recipients {
                if let Err(err) = notifier.deliver(recipient, &notification).await {
                    tracing::warn!(
                        recipient = %recipient.username,
                        kind = notification.kind,
                        error = %err,
                        "notification delivery failed"
                    );
                }
            }
        }
        tracing::debug!("notification dispatcher stopped");
    })
}
