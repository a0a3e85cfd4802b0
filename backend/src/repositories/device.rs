//! Device rows, including the status transitions driven by liveness signals.

use chrono::{DateTime, Utc};

use crate::db::connection::DbPool;
use crate::models::device::{Device, DeviceStatus};
use crate::types::DeviceId;

const SELECT_COLUMNS: &str = "id, name, token, status, last_seen, created_at";

/// New devices start active and freshly seen.
pub async fn create_device(
    pool: &DbPool,
    name: &str,
    token: &str,
    now: DateTime<Utc>,
) -> Result<Device, sqlx::Error> {
    let query = format!(
        "INSERT INTO devices (name, token, status, last_seen, created_at) \
         VALUES (?, ?, ?, ?, ?) RETURNING {}",
        SELECT_COLUMNS
    );
    sqlx::query_as::<_, Device>(&query)
        .bind(name)
        .bind(token)
        .bind(DeviceStatus::Active)
        .bind(now)
        .bind(now)
        .fetch_one(pool)
        .await
}

pub async fn list_devices(pool: &DbPool) -> Result<Vec<Device>, sqlx::Error> {
    let query = format!("SELECT {} FROM devices ORDER BY name ASC, id ASC", SELECT_COLUMNS);
    sqlx::query_as::<_, Device>(&query).fetch_all(pool).await
}

pub async fn find_device(pool: &DbPool, id: DeviceId) -> Result<Option<Device>, sqlx::Error> {
    let query = format!("SELECT {} FROM devices WHERE id = ?", SELECT_COLUMNS);
    sqlx::query_as::<_, Device>(&query)
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn find_device_by_token(
    pool: &DbPool,
    token: &str,
) -> Result<Option<Device>, sqlx::Error> {
    let query = format!("SELECT {} FROM devices WHERE token = ?", SELECT_COLUMNS);
    sqlx::query_as::<_, Device>(&query)
        .bind(token)
        .fetch_optional(pool)
        .await
}

/// Patterns and requests go with it.
pub async fn delete_device(pool: &DbPool, id: DeviceId) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM devices WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Replaces the bearer token; the old one stops authenticating immediately.
pub async fn rotate_token(
    pool: &DbPool,
    id: DeviceId,
    token: &str,
) -> Result<Option<Device>, sqlx::Error> {
    let query = format!(
        "UPDATE devices SET token = ? WHERE id = ? RETURNING {}",
        SELECT_COLUMNS
    );
    sqlx::query_as::<_, Device>(&query)
        .bind(token)
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Marks the device active and seen at `now`. Uninstalled devices are left
/// untouched and yield `None`.
pub async fn touch_device(
    pool: &DbPool,
    id: DeviceId,
    now: DateTime<Utc>,
) -> Result<Option<DeviceStatus>, sqlx::Error> {
    sqlx::query_scalar::<_, DeviceStatus>(
        "UPDATE devices SET status = ?, last_seen = ? \
         WHERE id = ? AND status != ? RETURNING status",
    )
    .bind(DeviceStatus::Active)
    .bind(now)
    .bind(id)
    .bind(DeviceStatus::Uninstalled)
    .fetch_optional(pool)
    .await
}

/// Flips every active device not seen since `cutoff` to inactive and returns
/// the names of exactly those devices. A device already inactive is not
/// reported again.
pub async fn mark_idle_inactive(
    pool: &DbPool,
    cutoff: DateTime<Utc>,
) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>(
        "UPDATE devices SET status = ? \
         WHERE status = ? AND (last_seen IS NULL OR last_seen < ?) RETURNING name",
    )
    .bind(DeviceStatus::Inactive)
    .bind(DeviceStatus::Active)
    .bind(cutoff)
    .fetch_all(pool)
    .await
}

/// Returns the device name only when this call performed the transition.
pub async fn mark_uninstalled(pool: &DbPool, id: DeviceId) -> Result<Option<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>(
        "UPDATE devices SET status = ? WHERE id = ? AND status != ? RETURNING name",
    )
    .bind(DeviceStatus::Uninstalled)
    .bind(id)
    .bind(DeviceStatus::Uninstalled)
    .fetch_optional(pool)
    .await
}
