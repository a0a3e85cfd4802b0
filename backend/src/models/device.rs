//! Enrolled devices and the payloads that manage them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::types::DeviceId;

/// Liveness state of a device.
///
/// `active` and `inactive` alternate with heartbeats and sweeps; `uninstalled`
/// is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Active,
    Inactive,
    Uninstalled,
}

impl DeviceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DeviceStatus::Active => "active",
            DeviceStatus::Inactive => "inactive",
            DeviceStatus::Uninstalled => "uninstalled",
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct Device {
    pub id: DeviceId,
    pub name: String,
    /// Bearer secret presented by the agent. Never serialized except right
    /// after creation or rotation.
    pub token: String,
    pub status: DeviceStatus,
    pub last_seen: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeviceResponse {
    pub id: DeviceId,
    pub name: String,
    pub status: DeviceStatus,
    pub last_seen: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    /// Whether the device currently holds at least one live WebSocket session.
    pub connected: bool,
}

impl DeviceResponse {
    pub fn new(device: Device, connected: bool) -> Self {
        Self {
            id: device.id,
            name: device.name,
            status: device.status,
            last_seen: device.last_seen,
            created_at: device.created_at,
            connected,
        }
    }
}

/// Returned once, when a token is minted.
#[derive(Debug, Serialize)]
pub struct DeviceWithToken {
    #[serde(flatten)]
    pub device: DeviceResponse,
    pub token: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateDevicePayload {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct HeartbeatResponse {
    pub success: bool,
    pub status: DeviceStatus,
}
