//! Access request rows and their pending → approved/denied transitions.

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite};

use crate::db::connection::DbPool;
use crate::error::AppError;
use crate::models::access_request::{AccessRequest, RequestStatus};
use crate::models::pattern::{NewPattern, Pattern};
use crate::repositories::{
    common::push_clause,
    pattern::insert_pattern,
    transaction::{begin_transaction, commit_transaction},
};
use crate::types::{DeviceId, RequestId};

const SELECT_JOINED: &str = "SELECT r.id, r.device_id, d.name AS device_name, r.url, \
                             r.suggested_pattern, r.status, r.created_at, r.resolved_at \
                             FROM access_requests r JOIN devices d ON d.id = r.device_id";

pub async fn create_request(
    pool: &DbPool,
    device_id: DeviceId,
    url: &str,
    suggested_pattern: &str,
    now: DateTime<Utc>,
) -> Result<AccessRequest, sqlx::Error> {
    let id = sqlx::query_scalar::<_, RequestId>(
        "INSERT INTO access_requests (device_id, url, suggested_pattern, status, created_at) \
         VALUES (?, ?, ?, ?, ?) RETURNING id",
    )
    .bind(device_id)
    .bind(url)
    .bind(suggested_pattern)
    .bind(RequestStatus::Pending)
    .bind(now)
    .fetch_one(pool)
    .await?;

    find_request(pool, id)
        .await?
        .ok_or(sqlx::Error::RowNotFound)
}

pub async fn find_request<'e, E>(executor: E, id: RequestId) -> Result<Option<AccessRequest>, sqlx::Error>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let query = format!("{} WHERE r.id = ?", SELECT_JOINED);
    sqlx::query_as::<_, AccessRequest>(&query)
        .bind(id)
        .fetch_optional(executor)
        .await
}

/// Newest first; `None` lists every status.
pub async fn list_requests(
    pool: &DbPool,
    status: Option<RequestStatus>,
) -> Result<Vec<AccessRequest>, sqlx::Error> {
    let mut builder = QueryBuilder::<Sqlite>::new(SELECT_JOINED);
    let mut has_clause = false;
    if let Some(status) = status {
        push_clause(&mut builder, &mut has_clause);
        builder.push("r.status = ").push_bind(status);
    }
    builder.push(" ORDER BY r.created_at DESC, r.id DESC");
    builder
        .build_query_as::<AccessRequest>()
        .fetch_all(pool)
        .await
}

/// Approves a pending request and creates the granted pattern in one
/// transaction. `grant` derives the pattern from the stored request.
pub async fn approve_request<F>(
    pool: &DbPool,
    id: RequestId,
    now: DateTime<Utc>,
    grant: F,
) -> Result<(AccessRequest, Pattern), AppError>
where
    F: FnOnce(&AccessRequest) -> Result<NewPattern, AppError>,
{
    let mut tx = begin_transaction(pool).await?;

    let request = find_request(&mut *tx, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Request not found".into()))?;
    ensure_pending(&request)?;
    let new_pattern = grant(&request)?;

    let resolved = resolve(&mut *tx, id, RequestStatus::Approved, now).await?;
    if !resolved {
        return Err(AppError::Conflict("Request has already been resolved".into()));
    }
    let pattern = insert_pattern(&mut *tx, &new_pattern, now).await?;
    let request = find_request(&mut *tx, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Request not found".into()))?;

    commit_transaction(tx).await?;
    Ok((request, pattern))
}

pub async fn deny_request(
    pool: &DbPool,
    id: RequestId,
    now: DateTime<Utc>,
) -> Result<AccessRequest, AppError> {
    if !resolve(pool, id, RequestStatus::Denied, now).await? {
        let request = find_request(pool, id)
            .await?
            .ok_or_else(|| AppError::NotFound("Request not found".into()))?;
        ensure_pending(&request)?;
    }
    find_request(pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Request not found".into()))
}

fn ensure_pending(request: &AccessRequest) -> Result<(), AppError> {
    if request.status == RequestStatus::Pending {
        Ok(())
    } else {
        Err(AppError::Conflict(format!(
            "Request has already been {}",
            request.status.as_str()
        )))
    }
}

/// Only a pending request moves; returns whether this call moved it.
async fn resolve<'e, E>(
    executor: E,
    id: RequestId,
    status: RequestStatus,
    now: DateTime<Utc>,
) -> Result<bool, sqlx::Error>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        "UPDATE access_requests SET status = ?, resolved_at = ? WHERE id = ? AND status = ?",
    )
    .bind(status)
    .bind(now)
    .bind(id)
    .bind(RequestStatus::Pending)
    .execute(executor)
    .await?;
    Ok(result.rows_affected() == 1)
}
