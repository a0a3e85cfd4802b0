//! Pattern rows. Expiry is applied when reading; expired rows are kept.

use chrono::{DateTime, Utc};
use navguard_policy::PatternKind;
use sqlx::{QueryBuilder, Sqlite};

use crate::db::connection::DbPool;
use crate::models::pattern::{NewPattern, Pattern, PatternListItem};
use crate::repositories::common::push_clause;
use crate::types::{DeviceId, PatternId};

const SELECT_COLUMNS: &str = "id, device_id, pattern, kind, enabled, expires_at, created_at";
const JOINED_COLUMNS: &str = "p.id, p.device_id, p.pattern, p.kind, p.enabled, p.expires_at, \
                              p.created_at, d.name AS device_name";
// Deny rules first, then newest.
const ORDER_BY: &str = "ORDER BY CASE kind WHEN 'deny' THEN 0 ELSE 1 END, created_at DESC, id DESC";

/// Enabled patterns for `device_id` that have not expired at `now`.
pub async fn list_live_for_device(
    pool: &DbPool,
    device_id: DeviceId,
    now: DateTime<Utc>,
) -> Result<Vec<Pattern>, sqlx::Error> {
    let query = format!(
        "SELECT {} FROM patterns \
         WHERE device_id = ? AND enabled = 1 AND (expires_at IS NULL OR expires_at > ?) {}",
        SELECT_COLUMNS, ORDER_BY
    );
    sqlx::query_as::<_, Pattern>(&query)
        .bind(device_id)
        .bind(now)
        .fetch_all(pool)
        .await
}

pub async fn list_patterns(
    pool: &DbPool,
    device_id: Option<DeviceId>,
) -> Result<Vec<PatternListItem>, sqlx::Error> {
    let mut builder = QueryBuilder::<Sqlite>::new(format!(
        "SELECT {} FROM patterns p JOIN devices d ON d.id = p.device_id",
        JOINED_COLUMNS
    ));
    let mut has_clause = false;
    if let Some(device_id) = device_id {
        push_clause(&mut builder, &mut has_clause);
        builder.push("p.device_id = ").push_bind(device_id);
    }
    builder.push(
        " ORDER BY CASE p.kind WHEN 'deny' THEN 0 ELSE 1 END, p.created_at DESC, p.id DESC",
    );
    builder
        .build_query_as::<PatternListItem>()
        .fetch_all(pool)
        .await
}

pub async fn find_pattern(pool: &DbPool, id: PatternId) -> Result<Option<Pattern>, sqlx::Error> {
    let query = format!("SELECT {} FROM patterns WHERE id = ?", SELECT_COLUMNS);
    sqlx::query_as::<_, Pattern>(&query)
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Inserts an enabled pattern. Accepts a transaction so approvals can create
/// the pattern atomically with the request transition.
pub async fn insert_pattern<'e, E>(
    executor: E,
    new: &NewPattern,
    now: DateTime<Utc>,
) -> Result<Pattern, sqlx::Error>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let query = format!(
        "INSERT INTO patterns (device_id, pattern, kind, enabled, expires_at, created_at) \
         VALUES (?, ?, ?, 1, ?, ?) RETURNING {}",
        SELECT_COLUMNS
    );
    sqlx::query_as::<_, Pattern>(&query)
        .bind(new.device_id)
        .bind(&new.pattern)
        .bind(new.kind.as_str())
        .bind(new.expires_at)
        .bind(now)
        .fetch_one(executor)
        .await
}

/// Replaces text, type and expiry in place.
pub async fn update_pattern(
    pool: &DbPool,
    id: PatternId,
    pattern: &str,
    kind: PatternKind,
    expires_at: Option<DateTime<Utc>>,
) -> Result<Option<Pattern>, sqlx::Error> {
    let query = format!(
        "UPDATE patterns SET pattern = ?, kind = ?, expires_at = ? WHERE id = ? RETURNING {}",
        SELECT_COLUMNS
    );
    sqlx::query_as::<_, Pattern>(&query)
        .bind(pattern)
        .bind(kind.as_str())
        .bind(expires_at)
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Returns the owning device when a row was deleted.
pub async fn delete_pattern(pool: &DbPool, id: PatternId) -> Result<Option<DeviceId>, sqlx::Error> {
    sqlx::query_scalar::<_, DeviceId>("DELETE FROM patterns WHERE id = ? RETURNING device_id")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn toggle_pattern(pool: &DbPool, id: PatternId) -> Result<Option<Pattern>, sqlx::Error> {
    let query = format!(
        "UPDATE patterns SET enabled = CASE enabled WHEN 0 THEN 1 ELSE 0 END \
         WHERE id = ? RETURNING {}",
        SELECT_COLUMNS
    );
    sqlx::query_as::<_, Pattern>(&query)
        .bind(id)
        .fetch_optional(pool)
        .await
}
