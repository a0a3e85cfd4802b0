//! The agent's last-known policy plus its persisted configuration.
//!
//! Every sync replaces the pattern lists wholesale. There is no version
//! check: whichever snapshot arrives last wins, whether it came from a push
//! or a poll.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use navguard_policy::{Decision, PatternKind, PatternRecord, PatternSnapshot, Policy};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};

use crate::error::AgentResult;

/// Contents of the state file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default)]
    pub allow: Vec<PatternRecord>,
    #[serde(default)]
    pub deny: Vec<PatternRecord>,
    #[serde(default)]
    pub last_sync: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_heartbeat: Option<DateTime<Utc>>,
}

impl StoredState {
    pub fn is_configured(&self) -> bool {
        self.server_url.is_some() && self.token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStatus {
    pub configured: bool,
    pub allow_patterns: usize,
    pub deny_patterns: usize,
    pub last_sync: Option<DateTime<Utc>>,
    pub last_heartbeat: Option<DateTime<Utc>>,
}

struct Inner {
    state: StoredState,
    policy: Policy,
}

impl Inner {
    fn new(state: StoredState) -> Self {
        let policy = compile_policy(&state);
        Self { state, policy }
    }
}

fn compile_policy(state: &StoredState) -> Policy {
    let records: Vec<PatternRecord> = state.allow.iter().chain(&state.deny).cloned().collect();
    Policy::from_records(&records)
}

pub struct PolicyCache {
    path: Option<PathBuf>,
    inner: RwLock<Inner>,
    /// Held across update + write so the file always ends up matching memory.
    persist: Mutex<()>,
}

impl PolicyCache {
    /// A cache that is never written to disk.
    pub fn in_memory(state: StoredState) -> Self {
        Self {
            path: None,
            inner: RwLock::new(Inner::new(state)),
            persist: Mutex::new(()),
        }
    }

    /// Loads the state file; a missing file yields an empty, unconfigured cache.
    pub async fn load(path: impl Into<PathBuf>) -> AgentResult<Self> {
        let path = path.into();
        let state = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(err) if err.kind() == ErrorKind::NotFound => StoredState::default(),
            Err(err) => return Err(err.into()),
        };
        Ok(Self {
            path: Some(path),
            inner: RwLock::new(Inner::new(state)),
            persist: Mutex::new(()),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Swaps in the snapshot's allow and deny lists. The in-memory policy is
    /// replaced even when writing the state file fails.
    pub async fn replace(&self, snapshot: PatternSnapshot, received_at: DateTime<Utc>) -> AgentResult<()> {
        let (allow, deny): (Vec<_>, Vec<_>) = snapshot
            .patterns
            .into_iter()
            .partition(|record| record.kind == PatternKind::Allow);
        tracing::debug!(allow = allow.len(), deny = deny.len(), "replacing cached patterns");
        self.update(|state| {
            state.allow = allow;
            state.deny = deny;
            state.last_sync = Some(received_at);
        })
        .await
    }

    pub async fn record_heartbeat(&self, at: DateTime<Utc>) -> AgentResult<()> {
        self.update(|state| state.last_heartbeat = Some(at)).await
    }

    /// Stores new credentials. Cached patterns belong to the previous device
    /// and are dropped.
    pub async fn configure(&self, server_url: String, token: String) -> AgentResult<()> {
        self.update(|state| {
            *state = StoredState {
                server_url: Some(server_url),
                token: Some(token),
                ..StoredState::default()
            };
        })
        .await
    }

    /// Never fails. An unconfigured agent allows everything.
    pub async fn decide(&self, url: &str, now: DateTime<Utc>) -> Decision {
        let inner = self.inner.read().await;
        if !inner.state.is_configured() {
            return Decision::Allow;
        }
        inner.policy.evaluate(url, now)
    }

    pub async fn state(&self) -> StoredState {
        self.inner.read().await.state.clone()
    }

    pub async fn status(&self) -> CacheStatus {
        let inner = self.inner.read().await;
        CacheStatus {
            configured: inner.state.is_configured(),
            allow_patterns: inner.state.allow.len(),
            deny_patterns: inner.state.deny.len(),
            last_sync: inner.state.last_sync,
            last_heartbeat: inner.state.last_heartbeat,
        }
    }

    async fn update(&self, apply: impl FnOnce(&mut StoredState)) -> AgentResult<()> {
        let _persist = self.persist.lock().await;
        let bytes = {
            let mut inner = self.inner.write().await;
            apply(&mut inner.state);
            inner.policy = compile_policy(&inner.state);
            match &self.path {
                Some(_) => Some(serde_json::to_vec_pretty(&inner.state)?),
                None => None,
            }
        };
        if let (Some(path), Some(bytes)) = (&self.path, bytes) {
            write_atomically(path, &bytes).await?;
        }
        Ok(())
    }
}

async fn write_atomically(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await
}
