use chrono::Utc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use navguard_backend::{
    config::Config,
    db::connection::{create_pool, run_migrations},
    repositories::session as session_repo,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "session_cleanup=info,navguard_backend=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load()?;
    let pool = create_pool(&config.database_url).await?;
    run_migrations(&pool).await?;

    let deleted = session_repo::cleanup_expired_sessions(&pool, Utc::now()).await?;
    if deleted > 0 {
        tracing::info!("Deleted {} expired sessions", deleted);
    }

    sqlx::query("VACUUM").execute(&pool).await?;

    Ok(())
}
