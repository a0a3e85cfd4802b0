//! Navigation verdicts, including where a blocked navigation is sent.

use chrono::{DateTime, Utc};
use navguard_policy::{suggest_pattern, Decision};
use serde::Serialize;
use url::Url;

use crate::cache::PolicyCache;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verdict {
    pub url: String,
    pub decision: Decision,
    /// Local blocked page for this navigation. Set only for blocks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect: Option<String>,
}

/// Evaluates `url` against the cached policy. Never fails: with nothing
/// cached or no configuration, navigation is allowed.
pub async fn evaluate(cache: &PolicyCache, blocked_page: &Url, url: &str, now: DateTime<Utc>) -> Verdict {
    let decision = cache.decide(url, now).await;
    let redirect = match decision {
        Decision::Block => Some(blocked_redirect(blocked_page, url)),
        Decision::Allow => None,
    };
    if decision == Decision::Block {
        tracing::info!(url, "navigation blocked");
    }
    Verdict {
        url: url.to_string(),
        decision,
        redirect,
    }
}

/// `<blocked_page>?url=<original>&pattern=<suggestion>`.
pub fn blocked_redirect(blocked_page: &Url, url: &str) -> String {
    let mut target = blocked_page.clone();
    {
        let mut query = target.query_pairs_mut();
        query.clear().append_pair("url", url);
        if let Some(pattern) = suggest_pattern(url) {
            query.append_pair("pattern", &pattern);
        }
    }
    target.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::StoredState;
    use navguard_policy::{PatternKind, PatternRecord, PatternSnapshot};

    fn blocked_page() -> Url {
        Url::parse("http://127.0.0.1:7878/blocked").unwrap()
    }

    #[test]
    fn redirect_carries_url_and_suggestion() {
        let redirect = blocked_redirect(&blocked_page(), "https://www.bad.com/a?b=c");
        let parsed = Url::parse(&redirect).unwrap();
        let pairs: Vec<(String, String)> = parsed.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("url".to_string(), "https://www.bad.com/a?b=c".to_string()),
                ("pattern".to_string(), "www.bad.com/*".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn blocks_carry_a_redirect_and_allows_do_not() {
        let cache = PolicyCache::in_memory(StoredState {
            server_url: Some("http://guard.local".into()),
            token: Some("t".into()),
            ..StoredState::default()
        });
        cache
            .replace(
                PatternSnapshot::new(vec![PatternRecord {
                    id: 1,
                    device_id: 1,
                    pattern: "bad.com/*".into(),
                    kind: PatternKind::Deny,
                    enabled: true,
                    expires_at: None,
                    created_at: Utc::now(),
                }]),
                Utc::now(),
            )
            .await
            .unwrap();

        let blocked = evaluate(&cache, &blocked_page(), "http://bad.com/x", Utc::now()).await;
        assert_eq!(blocked.decision, Decision::Block);
        assert!(blocked.redirect.unwrap().starts_with("http://127.0.0.1:7878/blocked?url="));

        let allowed = evaluate(&cache, &blocked_page(), "http://good.com", Utc::now()).await;
        assert_eq!(allowed.decision, Decision::Allow);
        assert!(allowed.redirect.is_none());

        let internal = evaluate(&cache, &blocked_page(), "chrome://settings", Utc::now()).await;
        assert_eq!(internal.decision, Decision::Allow);
    }
}
