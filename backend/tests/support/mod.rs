#![allow(dead_code)]
use std::{net::SocketAddr, str::FromStr, time::Duration};

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, Response},
    Router,
};
use chrono::Utc;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tokio::sync::mpsc;

use navguard_backend::{
    build_router,
    config::Config,
    db::connection::{run_migrations, DbPool},
    hub::Hub,
    models::{device::Device, user::User},
    repositories::{device as device_repo, session as session_repo, user as user_repo},
    services::{
        liveness::LivenessTracker,
        notifier::{NotificationEvent, NotificationSender},
    },
    state::AppState,
    utils::{generate_token, password::hash_password},
};

pub const ADMIN_PASSWORD: &str = "correct-horse-battery";

pub fn test_config() -> Config {
    Config {
        database_url: "sqlite::memory:".into(),
        bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
        session_ttl_hours: 24,
        cookie_secure: false,
        cors_allow_origins: Vec::new(),
        ws_ping_interval: Duration::from_secs(54),
        ws_pong_wait: Duration::from_secs(60),
        ws_write_wait: Duration::from_secs(10),
        ws_max_message_bytes: 512,
        ws_outbound_queue: 16,
        liveness_threshold: Duration::from_secs(120),
        liveness_sweep_interval: Duration::from_secs(60),
        notify_webhook_url: None,
        public_base_url: None,
    }
}

/// A private in-memory database. One connection keeps it alive for the
/// lifetime of the pool.
pub async fn test_pool() -> DbPool {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .expect("sqlite options")
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .expect("connect in-memory sqlite");
    run_migrations(&pool).await.expect("run migrations");
    pool
}

pub struct TestApp {
    pub state: AppState,
    pub router: Router,
    pub events: mpsc::Receiver<NotificationEvent>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_pool(test_pool().await).await
    }

    pub async fn with_pool(pool: DbPool) -> Self {
        Self::with_parts(pool, test_config()).await
    }

    pub async fn with_config(config: Config) -> Self {
        Self::with_parts(test_pool().await, config).await
    }

    async fn with_parts(pool: DbPool, config: Config) -> Self {
        let (notifications, events) = NotificationSender::channel(32);
        let (hub, _hub_task) = Hub::spawn(config.ws_outbound_queue);
        let liveness =
            LivenessTracker::new(pool.clone(), notifications.clone(), config.liveness_threshold);
        let state = AppState::new(pool, config, hub, liveness, notifications);
        let router = build_router(state.clone());
        Self {
            state,
            router,
            events,
        }
    }

    pub fn pool(&self) -> &DbPool {
        &self.state.pool
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        use tower::ServiceExt;
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible")
    }

    /// Drains queued notification events without waiting.
    pub fn drain_events(&mut self) -> Vec<NotificationEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}

pub async fn seed_device(pool: &DbPool, name: &str) -> Device {
    device_repo::create_device(pool, name, &generate_token(), Utc::now())
        .await
        .expect("create device")
}

pub async fn seed_user(pool: &DbPool, username: &str) -> User {
    let hash = hash_password(ADMIN_PASSWORD).expect("hash password");
    user_repo::create_user(pool, username, &hash, Utc::now())
        .await
        .expect("create user")
}

/// Returns a `Cookie` header value carrying a fresh session for `user`.
pub async fn seed_session(pool: &DbPool, user: &User) -> String {
    let token = generate_token();
    let now = Utc::now();
    session_repo::create_session(pool, user.id, &token, now + chrono::Duration::hours(1), now)
        .await
        .expect("create session");
    format!("session={}", token)
}

pub fn device_request(method: &str, uri: &str, device: &Device, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", device.token));
    with_body(builder, body)
}

pub fn admin_request(method: &str, uri: &str, cookie: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::COOKIE, cookie);
    with_body(builder, body)
}

pub fn with_body(builder: axum::http::request::Builder, body: Option<Value>) -> Request<Body> {
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("build request"),
        None => builder.body(Body::empty()).expect("build request"),
    }
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = to_bytes(response.into_body(), 1024 * 64)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("parse json")
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = to_bytes(response.into_body(), 1024 * 64)
        .await
        .expect("read body");
    String::from_utf8_lossy(&bytes).into_owned()
}
