use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::pattern::{compile, MatchTarget, Matcher};
use crate::wire::PatternRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternKind {
    Allow,
    Deny,
}

#[derive(Debug, Error)]
#[error("unknown pattern type `{0}`")]
pub struct UnknownPatternKind(pub String);

impl PatternKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PatternKind::Allow => "allow",
            PatternKind::Deny => "deny",
        }
    }
}

impl fmt::Display for PatternKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PatternKind {
    type Err = UnknownPatternKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "allow" => Ok(PatternKind::Allow),
            "deny" => Ok(PatternKind::Deny),
            other => Err(UnknownPatternKind(other.to_string())),
        }
    }
}

impl TryFrom<String> for PatternKind {
    type Error = UnknownPatternKind;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Allow,
    Block,
}

#[derive(Debug, Clone)]
struct Entry {
    matcher: Matcher,
    expires_at: Option<DateTime<Utc>>,
}

/// A set of compiled patterns of one kind.
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    entries: Vec<Entry>,
}

impl PatternSet {
    /// Compiles every pattern; entries that fail to compile are skipped.
    pub fn compile<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let entries = patterns
            .into_iter()
            .filter_map(|pattern| compile_logged(pattern.as_ref()))
            .map(|matcher| Entry {
                matcher,
                expires_at: None,
            })
            .collect();
        Self { entries }
    }

    fn from_records<'a>(records: impl Iterator<Item = &'a PatternRecord>) -> Self {
        let entries = records
            .filter(|record| record.enabled)
            .filter_map(|record| {
                compile_logged(&record.pattern).map(|matcher| Entry {
                    matcher,
                    expires_at: record.expires_at,
                })
            })
            .collect();
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    fn live(&self, now: DateTime<Utc>) -> impl Iterator<Item = &Matcher> {
        self.entries
            .iter()
            .filter(move |entry| entry.expires_at.map_or(true, |at| at > now))
            .map(|entry| &entry.matcher)
    }

    pub fn matches(&self, target: &MatchTarget, now: DateTime<Utc>) -> bool {
        self.live(now).any(|matcher| matcher.matches_target(target))
    }

    fn has_live(&self, now: DateTime<Utc>) -> bool {
        self.live(now).next().is_some()
    }
}

fn compile_logged(pattern: &str) -> Option<Matcher> {
    match compile(pattern) {
        Ok(matcher) => Some(matcher),
        Err(err) => {
            tracing::warn!(pattern, error = %err, "skipping uncompilable pattern");
            None
        }
    }
}

/// Allow and deny sets for one device.
///
/// Evaluation order is a contract: a deny match blocks unconditionally; when
/// any allow pattern exists the URL must match one of them; with no allow
/// patterns at all everything not denied is allowed.
#[derive(Debug, Clone, Default)]
pub struct Policy {
    allow: PatternSet,
    deny: PatternSet,
}

impl Policy {
    pub fn new(allow: PatternSet, deny: PatternSet) -> Self {
        Self { allow, deny }
    }

    pub fn from_records(records: &[PatternRecord]) -> Self {
        Self {
            allow: PatternSet::from_records(
                records.iter().filter(|r| r.kind == PatternKind::Allow),
            ),
            deny: PatternSet::from_records(records.iter().filter(|r| r.kind == PatternKind::Deny)),
        }
    }

    pub fn allow(&self) -> &PatternSet {
        &self.allow
    }

    pub fn deny(&self) -> &PatternSet {
        &self.deny
    }

    /// URLs outside http(s), or that do not parse, are never subject to blocking.
    pub fn evaluate(&self, url: &str, now: DateTime<Utc>) -> Decision {
        match in_scope(url).as_ref().and_then(MatchTarget::from_url) {
            Some(target) => self.decide(&target, now),
            None => Decision::Allow,
        }
    }

    pub fn decide(&self, target: &MatchTarget, now: DateTime<Utc>) -> Decision {
        if self.deny.matches(target, now) {
            return Decision::Block;
        }
        if self.allow.has_live(now) && !self.allow.matches(target, now) {
            return Decision::Block;
        }
        Decision::Allow
    }
}

/// Parses `url` and keeps it only when its scheme is subject to policy.
pub fn in_scope(url: &str) -> Option<Url> {
    Url::parse(url)
        .ok()
        .filter(|parsed| matches!(parsed.scheme(), "http" | "https"))
}
