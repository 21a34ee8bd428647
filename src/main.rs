use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use jib_gateway::Config;
use jib_gateway::gateway::{GatewayState, router};
use jib_gateway::git::ProcessExecutor;
use jib_gateway::github::{EnvFileTokenSource, GitHubClient};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "jib_gateway=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load_or_default().context("Failed to load configuration")?;
    let addr = config.listen_addr()?;

    let api = GitHubClient::new(
        config.github.api_base.clone(),
        Duration::from_secs(config.github.request_timeout_secs),
    )
    .context("Failed to build GitHub client")?;
    let tokens = EnvFileTokenSource::new(
        config.github.token_env.clone(),
        config.github.token_file.clone(),
    );
    let executor = ProcessExecutor::new(Duration::from_secs(config.git.timeout_seconds));

    let state = GatewayState::from_config(
        &config,
        Arc::new(api),
        Arc::new(tokens),
        Arc::new(executor),
    )?;
    let app = router(Arc::new(state));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("jib gateway listening on http://{}", addr);

    axum::serve(listener, app).await.context("HTTP server error")?;

    Ok(())
}
