use chrono::{DateTime, Utc};
use navguard_policy::PatternKind;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::types::{DeviceId, RequestId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Approved,
    Denied,
}

impl RequestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Denied => "denied",
        }
    }
}

/// A device's request for access to a blocked URL.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct AccessRequest {
    pub id: RequestId,
    pub device_id: DeviceId,
    pub device_name: String,
    pub url: String,
    pub suggested_pattern: String,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateAccessRequestPayload {
    #[validate(
        length(min = 1, max = 2048),
        custom(function = "crate::validation::rules::validate_http_url")
    )]
    pub url: String,
    #[serde(default)]
    pub suggested_pattern: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RequestListQuery {
    /// `pending`, `approved`, `denied`; empty or `all` lists everything.
    pub status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ApproveRequestPayload {
    /// Falls back to the request's suggested pattern when absent.
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<PatternKind>,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub custom_minutes: Option<i64>,
}
