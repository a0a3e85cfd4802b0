//! Pushes a device's full live pattern set to its connected sessions.
//!
//! Every push re-reads the store, so a dropped or reordered message is healed
//! by the next one.

use chrono::Utc;
use navguard_policy::{PatternRecord, PushMessage};

use crate::db::connection::DbPool;
use crate::hub::Hub;
use crate::repositories::pattern as pattern_repo;
use crate::types::DeviceId;

/// Returns the number of sessions the snapshot was queued for.
pub async fn publish_patterns(pool: &DbPool, hub: &Hub, device_id: DeviceId) -> anyhow::Result<usize> {
    let patterns = pattern_repo::list_live_for_device(pool, device_id, Utc::now()).await?;
    let records: Vec<PatternRecord> = patterns.into_iter().map(PatternRecord::from).collect();
    let count = records.len();
    let delivered = hub
        .send_to_device(device_id, &PushMessage::patterns_updated(records))
        .await?;
    tracing::debug!(device_id = %device_id, patterns = count, sessions = delivered, "published patterns");
    Ok(delivered)
}

/// Fire-and-forget variant used after mutations; failures are logged.
pub fn spawn_publish(pool: DbPool, hub: Hub, device_id: DeviceId) {
    tokio::spawn(async move {
        if let Err(err) = publish_patterns(&pool, &hub, device_id).await {
            tracing::warn!(device_id = %device_id, error = %err, "pattern publish failed");
        }
    });
}
