use anyhow::{anyhow, bail, Context};
use std::{env, net::SocketAddr, str::FromStr, time::Duration};

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub session_ttl_hours: u64,
    pub cookie_secure: bool,
    pub cors_allow_origins: Vec<String>,
    /// Keepalive ping period for device WebSocket sessions.
    pub ws_ping_interval: Duration,
    /// How long a session may stay silent (no pong) before it is torn down.
    pub ws_pong_wait: Duration,
    pub ws_write_wait: Duration,
    pub ws_max_message_bytes: usize,
    pub ws_outbound_queue: usize,
    /// A device not seen for this long is marked inactive by the sweeper.
    pub liveness_threshold: Duration,
    pub liveness_sweep_interval: Duration,
    pub notify_webhook_url: Option<String>,
    pub public_base_url: Option<String>,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:./navguard.db".to_string());

        let bind_addr = parse_env("BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 8080)))?;
        let session_ttl_hours = parse_env("SESSION_TTL_HOURS", 24u64)?;
        let cookie_secure = parse_bool_env("COOKIE_SECURE", false)?;

        let cors_allow_origins = env::var("CORS_ALLOW_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|origin| !origin.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let config = Config {
            database_url,
            bind_addr,
            session_ttl_hours,
            cookie_secure,
            cors_allow_origins,
            ws_ping_interval: Duration::from_secs(parse_env("WS_PING_INTERVAL_SECONDS", 54)?),
            ws_pong_wait: Duration::from_secs(parse_env("WS_PONG_WAIT_SECONDS", 60)?),
            ws_write_wait: Duration::from_secs(parse_env("WS_WRITE_WAIT_SECONDS", 10)?),
            ws_max_message_bytes: parse_env("WS_MAX_MESSAGE_BYTES", 512)?,
            ws_outbound_queue: parse_env("WS_OUTBOUND_QUEUE", 256)?,
            liveness_threshold: Duration::from_secs(parse_env(
                "LIVENESS_THRESHOLD_SECONDS",
                120,
            )?),
            liveness_sweep_interval: Duration::from_secs(parse_env(
                "LIVENESS_SWEEP_SECONDS",
                60,
            )?),
            notify_webhook_url: optional_env("NOTIFY_WEBHOOK_URL"),
            public_base_url: optional_env("PUBLIC_BASE_URL"),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.ws_ping_interval.is_zero() {
            bail!("WS_PING_INTERVAL_SECONDS must be greater than zero");
        }
        if self.ws_pong_wait <= self.ws_ping_interval {
            bail!(
                "WS_PONG_WAIT_SECONDS ({}s) must exceed WS_PING_INTERVAL_SECONDS ({}s)",
                self.ws_pong_wait.as_secs(),
                self.ws_ping_interval.as_secs()
            );
        }
        // A device that answers every ping must never look idle to the sweeper.
        if self.liveness_threshold <= self.ws_ping_interval {
            bail!(
                "LIVENESS_THRESHOLD_SECONDS ({}s) must exceed WS_PING_INTERVAL_SECONDS ({}s)",
                self.liveness_threshold.as_secs(),
                self.ws_ping_interval.as_secs()
            );
        }
        if self.liveness_sweep_interval.is_zero() {
            bail!("LIVENESS_SWEEP_SECONDS must be greater than zero");
        }
        if self.ws_outbound_queue == 0 {
            bail!("WS_OUTBOUND_QUEUE must be greater than zero");
        }
        if self.session_ttl_hours == 0 {
            bail!("SESSION_TTL_HOURS must be greater than zero");
        }
        if let Some(url) = &self.notify_webhook_url {
            url::Url::parse(url).with_context(|| format!("Invalid NOTIFY_WEBHOOK_URL: {}", url))?;
        }
        Ok(())
    }

    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.session_ttl_hours as i64)
    }
}

fn optional_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_env<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match optional_env(key) {
        Some(raw) => raw
            .parse()
            .map_err(|e| anyhow!("Invalid {} value `{}`: {}", key, raw, e)),
        None => Ok(default),
    }
}

fn parse_bool_env(key: &str, default: bool) -> anyhow::Result<bool> {
    match optional_env(key).map(|raw| raw.to_ascii_lowercase()) {
        None => Ok(default),
        Some(raw) => match raw.as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(anyhow!("Invalid {} value `{}`", key, raw)),
        },
    }
}
