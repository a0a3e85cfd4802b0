use chrono::{DateTime, Utc};
use navguard_policy::{PatternKind, PatternRecord};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::types::{DeviceId, PatternId};

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Pattern {
    pub id: PatternId,
    pub device_id: DeviceId,
    pub pattern: String,
    #[sqlx(try_from = "String")]
    #[serde(rename = "type")]
    pub kind: PatternKind,
    pub enabled: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<Pattern> for PatternRecord {
    fn from(pattern: Pattern) -> Self {
        PatternRecord {
            id: pattern.id.get(),
            device_id: pattern.device_id.get(),
            pattern: pattern.pattern,
            kind: pattern.kind,
            enabled: pattern.enabled,
            expires_at: pattern.expires_at,
            created_at: pattern.created_at,
        }
    }
}

/// Admin listing row: the pattern plus its device's display name.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PatternListItem {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub pattern: Pattern,
    pub device_name: String,
}

/// Fields shared by pattern creation, pattern edits and request approval.
#[derive(Debug, Clone)]
pub struct NewPattern {
    pub device_id: DeviceId,
    pub pattern: String,
    pub kind: PatternKind,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreatePatternPayload {
    pub device_id: DeviceId,
    #[validate(length(min = 1, max = 2048))]
    pub pattern: String,
    #[serde(rename = "type")]
    pub kind: PatternKind,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub custom_minutes: Option<i64>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdatePatternPayload {
    #[validate(length(min = 1, max = 2048))]
    pub pattern: String,
    #[serde(rename = "type")]
    pub kind: PatternKind,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub custom_minutes: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PatternListQuery {
    pub device_id: Option<DeviceId>,
}
