//! Admin accounts, sessions, and authentication payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::types::{SessionId, UserId};

#[derive(Debug, Clone, Serialize, FromRow)]
/// Database representation of an admin account.
pub struct User {
    pub id: UserId,
    /// Immutable username used for login.
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Receives a notification whenever a device files an access request.
    pub notify_new_requests: bool,
    /// Receives a notification whenever a device goes inactive or is uninstalled.
    pub notify_device_status: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
/// A logged-in admin browser, identified by the `session` cookie.
pub struct Session {
    pub id: SessionId,
    pub user_id: UserId,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
/// Credentials submitted by an admin attempting to authenticate.
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub success: bool,
    pub user: User,
}

#[derive(Debug, Deserialize, Validate)]
/// Payload submitted when an admin changes their password.
pub struct ChangePasswordRequest {
    /// Existing password that will be verified before applying the change.
    pub current_password: String,
    #[validate(length(min = 8))]
    pub new_password: String,
    #[validate(must_match(other = "new_password"))]
    pub confirm_password: String,
}

#[derive(Debug, Deserialize, Validate)]
/// Payload for creating an additional admin account.
pub struct CreateUser {
    #[validate(custom(function = "crate::validation::rules::validate_username"))]
    pub username: String,
    #[validate(length(min = 8))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
/// First-run account creation, only accepted while no users exist.
pub struct SetupRequest {
    #[validate(custom(function = "crate::validation::rules::validate_username"))]
    pub username: String,
    #[validate(length(min = 8))]
    pub password: String,
    #[validate(must_match(other = "password"))]
    pub confirm_password: String,
}

#[derive(Debug, Serialize)]
pub struct SetupStatus {
    pub setup_needed: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationPrefs {
    pub notify_new_requests: bool,
    pub notify_device_status: bool,
}

impl From<&User> for NotificationPrefs {
    fn from(user: &User) -> Self {
        Self {
            notify_new_requests: user.notify_new_requests,
            notify_device_status: user.notify_device_status,
        }
    }
}

/// Partial update; omitted flags keep their current value.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateNotificationPrefs {
    pub notify_new_requests: Option<bool>,
    pub notify_device_status: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setup_request_requires_matching_confirmation() {
        let payload = SetupRequest {
            username: "admin".into(),
            password: "long-enough".into(),
            confirm_password: "different".into(),
        };
        let errors = payload.validate().expect_err("mismatch rejected");
        assert!(errors.field_errors().contains_key("confirm_password"));
    }

    #[test]
    fn setup_request_rejects_short_passwords() {
        let payload = SetupRequest {
            username: "admin".into(),
            password: "short".into(),
            confirm_password: "short".into(),
        };
        let errors = payload.validate().expect_err("short password rejected");
        assert!(errors.field_errors().contains_key("password"));
    }

    #[test]
    fn user_serialization_omits_password_hash() {
        let user = User {
            id: UserId::new(1),
            username: "admin".into(),
            password_hash: "secret".into(),
            notify_new_requests: true,
            notify_device_status: false,
            created_at: Utc::now(),
        };
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["username"], "admin");
    }
}
