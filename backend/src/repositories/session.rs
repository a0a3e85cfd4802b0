//! Admin login sessions, keyed by the `session` cookie token.

use chrono::{DateTime, Utc};

use crate::db::connection::DbPool;
use crate::models::user::Session;
use crate::types::{SessionId, UserId};

const SELECT_COLUMNS: &str = "id, user_id, token, expires_at, created_at";

pub async fn create_session(
    pool: &DbPool,
    user_id: UserId,
    token: &str,
    expires_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<Session, sqlx::Error> {
    let query = format!(
        "INSERT INTO sessions (user_id, token, expires_at, created_at) \
         VALUES (?, ?, ?, ?) RETURNING {}",
        SELECT_COLUMNS
    );
    sqlx::query_as::<_, Session>(&query)
        .bind(user_id)
        .bind(token)
        .bind(expires_at)
        .bind(now)
        .fetch_one(pool)
        .await
}

/// Expired sessions are treated as absent.
pub async fn find_valid_session(
    pool: &DbPool,
    token: &str,
    now: DateTime<Utc>,
) -> Result<Option<Session>, sqlx::Error> {
    let query = format!(
        "SELECT {} FROM sessions WHERE token = ? AND expires_at > ?",
        SELECT_COLUMNS
    );
    sqlx::query_as::<_, Session>(&query)
        .bind(token)
        .bind(now)
        .fetch_optional(pool)
        .await
}

pub async fn delete_session(pool: &DbPool, id: SessionId) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM sessions WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Signs the user out everywhere except `keep`.
pub async fn delete_other_sessions(
    pool: &DbPool,
    user_id: UserId,
    keep: SessionId,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM sessions WHERE user_id = ? AND id != ?")
        .bind(user_id)
        .bind(keep)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

pub async fn cleanup_expired_sessions(
    pool: &DbPool,
    now: DateTime<Utc>,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
        .bind(now)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
