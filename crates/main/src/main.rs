//! 主应用程序入口
//!
//! 加载配置、准备存储并启动 Axum Web API 服务。

use std::sync::Arc;

use anyhow::Context;
use application::{InMemoryIdentityDirectory, InMemoryMatchRepository, InMemoryMessageRepository};
use config::AppConfig;
use tracing_subscriber::EnvFilter;
use web_api::{router, AppState, Repositories};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志，默认 info
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::load().context("failed to load configuration")?;
    let repositories = build_repositories(&config).await?;

    let state = AppState::new(repositories, &config);
    let app = router(state);

    let address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {address}"))?;

    tracing::info!(address = %address, "pawpair server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn build_repositories(config: &AppConfig) -> anyhow::Result<Repositories> {
    if config.database.is_memory() {
        tracing::warn!("using in-memory storage, data is lost on restart");
        return Ok(Repositories {
            matches: Arc::new(InMemoryMatchRepository::new()),
            messages: Arc::new(InMemoryMessageRepository::new()),
            identities: Arc::new(InMemoryIdentityDirectory::new()),
        });
    }

    tracing::info!(
        database = config.database.url.split('@').next_back().unwrap_or("unknown"),
        "connecting to database"
    );
    let storage = infrastructure::connect_storage(&config.database).await?;
    Ok(Repositories {
        matches: storage.match_repository,
        messages: storage.message_repository,
        identities: storage.identity_directory,
    })
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
