use chrono::{DateTime, Utc};

use crate::db::connection::DbPool;
use crate::models::user::{NotificationPrefs, User};
use crate::types::UserId;

const SELECT_COLUMNS: &str =
    "id, username, password_hash, notify_new_requests, notify_device_status, created_at";

pub async fn count_users(pool: &DbPool) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
        .fetch_one(pool)
        .await
}

pub async fn create_user(
    pool: &DbPool,
    username: &str,
    password_hash: &str,
    now: DateTime<Utc>,
) -> Result<User, sqlx::Error> {
    let query = format!(
        "INSERT INTO users (username, password_hash, created_at) VALUES (?, ?, ?) RETURNING {}",
        SELECT_COLUMNS
    );
    sqlx::query_as::<_, User>(&query)
        .bind(username)
        .bind(password_hash)
        .bind(now)
        .fetch_one(pool)
        .await
}

/// Creates the first account, or nothing if any account already exists.
pub async fn create_first_user(
    pool: &DbPool,
    username: &str,
    password_hash: &str,
    now: DateTime<Utc>,
) -> Result<Option<User>, sqlx::Error> {
    let query = format!(
        "INSERT INTO users (username, password_hash, created_at) \
         SELECT ?, ?, ? WHERE NOT EXISTS (SELECT 1 FROM users) RETURNING {}",
        SELECT_COLUMNS
    );
    sqlx::query_as::<_, User>(&query)
        .bind(username)
        .bind(password_hash)
        .bind(now)
        .fetch_optional(pool)
        .await
}

pub async fn find_by_username(pool: &DbPool, username: &str) -> Result<Option<User>, sqlx::Error> {
    let query = format!("SELECT {} FROM users WHERE username = ?", SELECT_COLUMNS);
    sqlx::query_as::<_, User>(&query)
        .bind(username)
        .fetch_optional(pool)
        .await
}

pub async fn find_by_id(pool: &DbPool, id: UserId) -> Result<Option<User>, sqlx::Error> {
    let query = format!("SELECT {} FROM users WHERE id = ?", SELECT_COLUMNS);
    sqlx::query_as::<_, User>(&query)
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn list_users(pool: &DbPool) -> Result<Vec<User>, sqlx::Error> {
    let query = format!("SELECT {} FROM users ORDER BY username ASC", SELECT_COLUMNS);
    sqlx::query_as::<_, User>(&query).fetch_all(pool).await
}

pub async fn update_password(
    pool: &DbPool,
    id: UserId,
    password_hash: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE users SET password_hash = ? WHERE id = ?")
        .bind(password_hash)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn update_notification_prefs(
    pool: &DbPool,
    id: UserId,
    prefs: NotificationPrefs,
) -> Result<Option<User>, sqlx::Error> {
    let query = format!(
        "UPDATE users SET notify_new_requests = ?, notify_device_status = ? \
         WHERE id = ? RETURNING {}",
        SELECT_COLUMNS
    );
    sqlx::query_as::<_, User>(&query)
        .bind(prefs.notify_new_requests)
        .bind(prefs.notify_device_status)
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Users opted in to new-request notifications.
pub async fn new_request_recipients(pool: &DbPool) -> Result<Vec<User>, sqlx::Error> {
    let query = format!(
        "SELECT {} FROM users WHERE notify_new_requests = 1",
        SELECT_COLUMNS
    );
    sqlx::query_as::<_, User>(&query).fetch_all(pool).await
}

/// Users opted in to device status notifications.
pub async fn device_status_recipients(pool: &DbPool) -> Result<Vec<User>, sqlx::Error> {
    let query = format!(
        "SELECT {} FROM users WHERE notify_device_status = 1",
        SELECT_COLUMNS
    );
    sqlx::query_as::<_, User>(&query).fetch_all(pool).await
}
