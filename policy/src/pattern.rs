//! Glob patterns over `host + path + query`.
//!
//! A pattern such as `*.example.com/*` is translated into an anchored,
//! case-insensitive regular expression. The translation is shared by the
//! server (answering policy queries) and the agent (blocking offline), so both
//! sides agree on what a pattern covers.

use regex::{Regex, RegexBuilder};
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum PatternError {
    #[error("pattern is empty")]
    Empty,
    #[error("pattern `{pattern}` could not be compiled: {source}")]
    Invalid {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// A compiled pattern.
#[derive(Debug, Clone)]
pub struct Matcher {
    source: String,
    regex: Regex,
}

/// The strings a URL is matched against: `host + path + query`, and the bare
/// host on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchTarget {
    pub full: String,
    pub host: String,
}

impl MatchTarget {
    /// Returns `None` for URLs without a host (`mailto:`, `data:`...).
    pub fn from_url(url: &Url) -> Option<Self> {
        let host = url.host_str()?.to_string();
        let mut full = format!("{}{}", host, url.path());
        if let Some(query) = url.query() {
            full.push('?');
            full.push_str(query);
        }
        Some(Self { full, host })
    }
}

pub fn compile(pattern: &str) -> Result<Matcher, PatternError> {
    let pattern = pattern.trim();
    if pattern.is_empty() {
        return Err(PatternError::Empty);
    }

    let expression = to_expression(pattern);
    let regex = RegexBuilder::new(&expression)
        .case_insensitive(true)
        .build()
        .map_err(|source| PatternError::Invalid {
            pattern: pattern.to_string(),
            source,
        })?;

    Ok(Matcher {
        source: pattern.to_string(),
        regex,
    })
}

impl Matcher {
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Full-string match against an already assembled candidate.
    pub fn matches(&self, candidate: &str) -> bool {
        self.regex.is_match(candidate)
    }

    pub fn matches_target(&self, target: &MatchTarget) -> bool {
        self.matches(&target.full) || self.matches(&target.host)
    }

    /// Unparseable URLs never match.
    pub fn matches_url(&self, url: &str) -> bool {
        Url::parse(url)
            .ok()
            .as_ref()
            .and_then(MatchTarget::from_url)
            .is_some_and(|target| self.matches_target(&target))
    }
}

fn to_expression(pattern: &str) -> String {
    // `host/*` covers the bare prefix as well as anything below it.
    if let Some(prefix) = pattern.strip_suffix("/*") {
        return format!("^{}(?:/.*)?$", translate(prefix));
    }
    // A lone trailing `*` is greedy across `/`; `**` is handled by `translate`.
    if let Some(prefix) = pattern
        .strip_suffix('*')
        .filter(|prefix| !prefix.ends_with('*'))
    {
        return format!("^{}.*$", translate(prefix));
    }
    format!("^{}$", translate(pattern))
}

fn translate(glob: &str) -> String {
    let mut out = String::with_capacity(glob.len() * 2);
    let mut literal = String::new();
    let mut chars = glob.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '*' {
            literal.push(c);
            continue;
        }
        out.push_str(&regex::escape(&literal));
        literal.clear();
        if chars.peek() == Some(&'*') {
            chars.next();
            out.push_str(".*");
        } else {
            out.push_str("[^/]*");
        }
    }
    out.push_str(&regex::escape(&literal));
    out
}
