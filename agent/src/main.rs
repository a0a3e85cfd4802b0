use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use url::Url;

use navguard_agent::{
    cache::PolicyCache,
    client::ApiClient,
    config::{Cli, Command, RunArgs},
    server::{router, LocalState},
    sync::SyncEngine,
};
use navguard_policy::suggest_pattern;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "navguard_agent=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let cache = Arc::new(
        PolicyCache::load(&cli.state_file)
            .await
            .with_context(|| format!("loading {}", cli.state_file.display()))?,
    );

    match &cli.command {
        Command::Run(args) => run(&cli, args, cache).await,
        Command::Configure => configure(&cli, &cache).await,
        Command::Check { url } => {
            let decision = cache.decide(url, Utc::now()).await;
            println!("{}", serde_json::to_string(&decision)?.trim_matches('"'));
            Ok(())
        }
        Command::Request { url, pattern } => {
            let client = client_for(&cli, &cache).await?;
            let pattern = pattern.clone().or_else(|| suggest_pattern(url));
            let filed = client.request_access(url, pattern.as_deref()).await?;
            println!("{}", serde_json::to_string_pretty(&filed)?);
            Ok(())
        }
        Command::Uninstall => {
            let client = client_for(&cli, &cache).await?;
            client.uninstall().await?;
            println!("uninstall reported");
            Ok(())
        }
    }
}

async fn client_for(cli: &Cli, cache: &PolicyCache) -> anyhow::Result<ApiClient> {
    let (server_url, token) = cli.credentials(&cache.state().await)?;
    Ok(ApiClient::new(&server_url, token)?)
}

async fn configure(cli: &Cli, cache: &PolicyCache) -> anyhow::Result<()> {
    let (Some(server_url), Some(token)) = (cli.server_url.clone(), cli.token.clone()) else {
        anyhow::bail!("configure needs both --server-url and --token");
    };
    // Reject unusable addresses before they are persisted.
    ApiClient::new(&server_url, token.clone())?;
    cache.configure(server_url.clone(), token).await?;
    println!("configured for {}", server_url);
    Ok(())
}

async fn run(cli: &Cli, args: &RunArgs, cache: Arc<PolicyCache>) -> anyhow::Result<()> {
    let stored = cache.state().await;
    let (server_url, token) = cli.credentials(&stored)?;
    if stored.server_url.as_deref() != Some(server_url.as_str())
        || stored.token.as_deref() != Some(token.as_str())
    {
        cache.configure(server_url.clone(), token.clone()).await?;
    }
    let client = ApiClient::new(&server_url, token)?;
    let engine = SyncEngine::new(client, cache, args.intervals());

    let listener = tokio::net::TcpListener::bind(args.listen).await?;
    let addr = listener.local_addr()?;
    let blocked_page = Url::parse(&format!("http://{}/blocked", addr))?;
    tracing::info!(%addr, server = %server_url, "agent listening");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sync = tokio::spawn(Arc::clone(&engine).run(shutdown_rx.clone()));
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    let mut server_shutdown = shutdown_rx;
    axum::serve(listener, router(LocalState { engine, blocked_page }))
        .with_graceful_shutdown(async move {
            let _ = server_shutdown.wait_for(|stop| *stop).await;
        })
        .await?;
    sync.await?;
    Ok(())
}
