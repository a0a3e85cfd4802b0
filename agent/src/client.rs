//! Stateless calls to the server's device API.

use std::time::Duration;

use navguard_policy::PatternSnapshot;
use reqwest::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{AgentError, AgentResult};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Deserialize)]
pub struct HeartbeatAck {
    pub success: bool,
    pub status: String,
}

#[derive(Debug, Serialize)]
struct NewAccessRequest<'a> {
    url: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    suggested_pattern: Option<&'a str>,
}

/// The filed request as echoed by the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FiledRequest {
    pub id: i64,
    pub url: String,
    pub suggested_pattern: String,
    pub status: String,
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base: Url,
    token: String,
}

impl ApiClient {
    pub fn new(server_url: &str, token: impl Into<String>) -> AgentResult<Self> {
        let mut base = Url::parse(server_url)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            base,
            token: token.into(),
        })
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    fn endpoint(&self, path: &str) -> AgentResult<Url> {
        Ok(self.base.join(path)?)
    }

    /// `ws(s)://<server>/api/ws?token=<token>`.
    pub fn ws_url(&self) -> AgentResult<Url> {
        let mut url = self.endpoint("api/ws")?;
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme)
            .map_err(|_| AgentError::InvalidServerUrl(url::ParseError::RelativeUrlWithoutBase))?;
        url.query_pairs_mut().clear().append_pair("token", &self.token);
        Ok(url)
    }

    pub async fn fetch_patterns(&self) -> AgentResult<PatternSnapshot> {
        let response = self
            .http
            .get(self.endpoint("api/patterns")?)
            .bearer_auth(&self.token)
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    pub async fn heartbeat(&self) -> AgentResult<HeartbeatAck> {
        let response = self
            .http
            .post(self.endpoint("api/heartbeat")?)
            .bearer_auth(&self.token)
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    pub async fn request_access(
        &self,
        url: &str,
        suggested_pattern: Option<&str>,
    ) -> AgentResult<FiledRequest> {
        let response = self
            .http
            .post(self.endpoint("api/requests")?)
            .bearer_auth(&self.token)
            .json(&NewAccessRequest {
                url,
                suggested_pattern,
            })
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    /// Reports removal. The server answers success for any token.
    pub async fn uninstall(&self) -> AgentResult<()> {
        let response = self
            .http
            .post(self.endpoint("api/uninstall")?)
            .bearer_auth(&self.token)
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }
}

async fn check(response: Response) -> AgentResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response
        .json::<serde_json::Value>()
        .await
        .ok()
        .and_then(|body| body.get("error").and_then(|e| e.as_str()).map(str::to_string))
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_string());
    if status == StatusCode::UNAUTHORIZED {
        tracing::warn!("server rejected the device token");
    }
    Err(AgentError::Server {
        status: status.as_u16(),
        message,
    })
}
