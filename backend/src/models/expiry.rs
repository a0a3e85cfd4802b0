//! Expiry vocabulary accepted when patterns are created or approved.

use chrono::{DateTime, Duration, Utc};

use crate::error::AppError;

/// Longest custom grant, one year.
pub const MAX_CUSTOM_MINUTES: i64 = 365 * 24 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryChoice {
    FifteenMinutes,
    ThirtyMinutes,
    OneHour,
    EightHours,
    OneDay,
    OneWeek,
    CustomMinutes(i64),
    Permanent,
}

impl ExpiryChoice {
    /// An absent or empty duration means permanent; `custom` needs
    /// `custom_minutes` between 1 and [`MAX_CUSTOM_MINUTES`].
    pub fn parse(duration: Option<&str>, custom_minutes: Option<i64>) -> Result<Self, AppError> {
        let choice = match duration.map(str::trim).unwrap_or("") {
            "" | "permanent" => ExpiryChoice::Permanent,
            "15m" => ExpiryChoice::FifteenMinutes,
            "30m" => ExpiryChoice::ThirtyMinutes,
            "1h" => ExpiryChoice::OneHour,
            "8h" => ExpiryChoice::EightHours,
            "24h" => ExpiryChoice::OneDay,
            "1w" => ExpiryChoice::OneWeek,
            "custom" => match custom_minutes {
                Some(minutes) if (1..=MAX_CUSTOM_MINUTES).contains(&minutes) => {
                    ExpiryChoice::CustomMinutes(minutes)
                }
                _ => {
                    return Err(AppError::BadRequest(format!(
                        "custom_minutes must be between 1 and {}",
                        MAX_CUSTOM_MINUTES
                    )))
                }
            },
            other => {
                return Err(AppError::BadRequest(format!(
                    "Unsupported duration `{}`",
                    other
                )))
            }
        };
        Ok(choice)
    }

    /// `None` for permanent grants and for custom lengths out of range.
    pub fn duration(self) -> Option<Duration> {
        match self {
            ExpiryChoice::FifteenMinutes => Some(Duration::minutes(15)),
            ExpiryChoice::ThirtyMinutes => Some(Duration::minutes(30)),
            ExpiryChoice::OneHour => Some(Duration::hours(1)),
            ExpiryChoice::EightHours => Some(Duration::hours(8)),
            ExpiryChoice::OneDay => Some(Duration::hours(24)),
            ExpiryChoice::OneWeek => Some(Duration::weeks(1)),
            ExpiryChoice::CustomMinutes(minutes) => Duration::try_minutes(minutes),
            ExpiryChoice::Permanent => None,
        }
    }

    /// Absolute expiry for a grant starting at `now`; `Ok(None)` never expires.
    pub fn expires_at(self, now: DateTime<Utc>) -> Result<Option<DateTime<Utc>>, AppError> {
        if self == ExpiryChoice::Permanent {
            return Ok(None);
        }
        self.duration()
            .and_then(|duration| now.checked_add_signed(duration))
            .map(Some)
            .ok_or_else(|| AppError::BadRequest("Expiry is out of range".into()))
    }
}
