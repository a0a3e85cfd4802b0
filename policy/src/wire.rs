//! Messages exchanged between the server and devices.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::policy::PatternKind;

/// A pattern as delivered to a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternRecord {
    pub id: i64,
    pub device_id: i64,
    pub pattern: String,
    #[serde(rename = "type")]
    pub kind: PatternKind,
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl PatternRecord {
    /// Enabled and not yet expired at `now`.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.enabled && self.expires_at.map_or(true, |expires_at| expires_at > now)
    }
}

/// The full set of live patterns for one device. Always delivered wholesale.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternSnapshot {
    pub patterns: Vec<PatternRecord>,
}

impl PatternSnapshot {
    pub fn new(patterns: Vec<PatternRecord>) -> Self {
        Self { patterns }
    }

    pub fn of_kind(&self, kind: PatternKind) -> impl Iterator<Item = &PatternRecord> {
        self.patterns.iter().filter(move |record| record.kind == kind)
    }
}

/// Server → device push. Only one message type is defined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum PushMessage {
    PatternsUpdated(PatternSnapshot),
}

impl PushMessage {
    pub fn patterns_updated(patterns: Vec<PatternRecord>) -> Self {
        Self::PatternsUpdated(PatternSnapshot::new(patterns))
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
