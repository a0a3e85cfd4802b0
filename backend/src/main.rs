use std::sync::Arc;

use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use navguard_backend::{
    build_router,
    config::Config,
    db::connection::{create_pool, run_migrations, DbPool},
    hub::Hub,
    services::{
        liveness::LivenessTracker,
        notifier::{spawn_dispatcher, LogNotifier, NotificationSender, Notifier, WebhookNotifier},
    },
    state::AppState,
};

const NOTIFICATION_QUEUE: usize = 256;

fn mask_url(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(parsed) => format!("{}://{}/***", parsed.scheme(), parsed.host_str().unwrap_or("")),
        Err(_) => "<invalid>".into(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "navguard_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load()?;
    tracing::info!(
        database_url = %config.database_url,
        bind_addr = %config.bind_addr,
        session_ttl_hours = config.session_ttl_hours,
        ws_ping_interval = ?config.ws_ping_interval,
        ws_pong_wait = ?config.ws_pong_wait,
        liveness_threshold = ?config.liveness_threshold,
        notify_webhook = %config.notify_webhook_url.as_deref().map(mask_url).unwrap_or_else(|| "<log>".into()),
        "Loaded configuration from environment/.env"
    );

    let pool: DbPool = create_pool(&config.database_url).await?;
    run_migrations(&pool).await?;

    let notifier: Arc<dyn Notifier> = match &config.notify_webhook_url {
        Some(endpoint) => Arc::new(WebhookNotifier::new(endpoint.clone())?),
        None => Arc::new(LogNotifier),
    };
    let (notifications, events) = NotificationSender::channel(NOTIFICATION_QUEUE);
    let dispatcher = spawn_dispatcher(
        pool.clone(),
        notifier,
        config.public_base_url.clone(),
        events,
    );

    let (hub, hub_task) = Hub::spawn(config.ws_outbound_queue);
    let liveness = LivenessTracker::new(
        pool.clone(),
        notifications.clone(),
        config.liveness_threshold,
    );
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = liveness.spawn_sweeper(config.liveness_sweep_interval, shutdown_rx);

    let addr = config.bind_addr;
    let state = AppState::new(pool, config, hub, liveness, notifications);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Server listening on {}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    if let Err(err) = sweeper.await {
        tracing::warn!(error = %err, "liveness sweeper exited abnormally");
    }
    // Upgraded WebSocket sessions are not covered by graceful shutdown.
    hub_task.abort();
    dispatcher.abort();
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
