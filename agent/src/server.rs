//! Local HTTP surface consulted by the browser on each navigation.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    response::Html,
    routing::{get, post},
    Form, Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
    cache::CacheStatus,
    error::AgentError,
    evaluate::{evaluate, Verdict},
    sync::{ConnectionState, SyncEngine},
};

#[derive(Clone)]
pub struct LocalState {
    pub engine: Arc<SyncEngine>,
    pub blocked_page: Url,
}

pub fn router(state: LocalState) -> Router {
    Router::new()
        .route("/check", get(check))
        .route("/blocked", get(blocked))
        .route("/request-access", post(request_access))
        .route("/status", get(status))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct CheckQuery {
    pub url: String,
}

async fn check(State(state): State<LocalState>, Query(query): Query<CheckQuery>) -> Json<Verdict> {
    Json(evaluate(state.engine.cache(), &state.blocked_page, &query.url, Utc::now()).await)
}

#[derive(Debug, Deserialize)]
pub struct BlockedQuery {
    #[serde(default)]
    pub url: String,
    pub pattern: Option<String>,
}

async fn blocked(Query(query): Query<BlockedQuery>) -> Html<String> {
    let pattern = query
        .pattern
        .or_else(|| navguard_policy::suggest_pattern(&query.url))
        .unwrap_or_default();
    Html(format!(
        "<!DOCTYPE html>\
<html><head><meta charset=\"utf-8\"><title>Blocked</title></head><body>\
<h1>This page is blocked</h1>\
<p><code>{url}</code></p>\
<form method=\"post\" action=\"/request-access\">\
<input type=\"hidden\" name=\"url\" value=\"{url}\">\
<label>Pattern <input type=\"text\" name=\"pattern\" value=\"{pattern}\"></label>\
<button type=\"submit\">Request access</button>\
</form></body></html>",
        url = escape_html(&query.url),
        pattern = escape_html(&pattern),
    ))
}

#[derive(Debug, Deserialize)]
pub struct RequestAccessForm {
    pub url: String,
    #[serde(default)]
    pub pattern: Option<String>,
}

async fn request_access(
    State(state): State<LocalState>,
    Form(form): Form<RequestAccessForm>,
) -> Result<Html<String>, AgentError> {
    let pattern = form
        .pattern
        .as_deref()
        .map(str::trim)
        .filter(|pattern| !pattern.is_empty());
    let filed = state
        .engine
        .client()
        .request_access(&form.url, pattern)
        .await?;
    tracing::info!(request_id = filed.id, url = %filed.url, "access request filed");
    Ok(Html(format!(
        "<!DOCTYPE html>\
<html><head><meta charset=\"utf-8\"><title>Request sent</title></head><body>\
<h1>Request sent</h1>\
<p>Access to <code>{}</code> was requested as <code>{}</code>. \
You can retry the page once it has been approved.</p></body></html>",
        escape_html(&filed.url),
        escape_html(&filed.suggested_pattern),
    )))
}

#[derive(Debug, Serialize)]
pub struct AgentStatus {
    pub connection: ConnectionState,
    #[serde(flatten)]
    pub cache: CacheStatus,
}

async fn status(State(state): State<LocalState>) -> Json<AgentStatus> {
    Json(AgentStatus {
        connection: state.engine.connection_state(),
        cache: state.engine.cache().status().await,
    })
}

/// Escapes text for element content and double- or single-quoted attribute
/// values. Not suitable for unquoted attributes, scripts or styles.
fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_markup_in_urls() {
        assert_eq!(
            escape_html("http://x.example/?q=\"<script>\"&a=1"),
            "http://x.example/?q=&quot;&lt;script&gt;&quot;&amp;a=1"
        );
    }

    #[test]
    fn quoted_attributes_cannot_be_broken_out_of() {
        let hostile = "x\" onmouseover='alert(1)' data-a=\"";
        let escaped = escape_html(hostile);
        assert!(!escaped.contains('"'));
        assert!(!escaped.contains('\''));
        assert_eq!(
            escaped,
            "x&quot; onmouseover=&#39;alert(1)&#39; data-a=&quot;"
        );
    }
}
