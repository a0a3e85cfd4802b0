//! Typed ID wrappers for compile-time type safety.
//!
//! Rows are keyed by SQLite integer primary keys; these newtypes keep a device
//! id from being passed where a pattern id is expected.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Macro to generate typed ID wrappers with common trait implementations.
macro_rules! typed_id {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
            sqlx::Type,
        )]
        #[serde(transparent)]
        #[sqlx(transparent)]
        pub struct $name(i64);

        impl $name {
            pub const fn new(raw: i64) -> Self {
                Self(raw)
            }

            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse().map(Self)
            }
        }

        impl From<i64> for $name {
            fn from(raw: i64) -> Self {
                Self(raw)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

typed_id!(DeviceId, "Unique identifier for an enrolled device.");
typed_id!(PatternId, "Unique identifier for a URL pattern.");
typed_id!(RequestId, "Unique identifier for an access request.");
typed_id!(UserId, "Unique identifier for an admin user.");
typed_id!(SessionId, "Unique identifier for an admin session.");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_parse_and_display() {
        let id: DeviceId = " 42 ".parse().expect("parse id");
        assert_eq!(id.get(), 42);
        assert_eq!(id.to_string(), "42");
        assert!("abc".parse::<PatternId>().is_err());
    }

    #[test]
    fn ids_serialize_as_plain_integers() {
        let json = serde_json::to_string(&RequestId::new(7)).unwrap();
        assert_eq!(json, "7");
        let id: UserId = serde_json::from_str("9").unwrap();
        assert_eq!(id, UserId::new(9));
    }
}
