use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use coach_proxy::config::{Args, ProxyConfig};
use coach_proxy::logging::setup_logging;
use coach_proxy::routes;
use coach_proxy::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let args = Args::parse();
    let config = ProxyConfig::try_from(args).context("failed to load configuration")?;

    let state = Arc::new(AppState::from_config(&config).context("failed to build HTTP client")?);

    let app = routes::create_router().with_state(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    info!(addr = %config.bind_addr, "coach proxy listening");
    info!(upstream = %config.completion.url, model = %config.completion.model, "forwarding to completion API");
    info!(
        max = config.rate_limit_max,
        window_ms = config.rate_limit_window.as_millis() as u64,
        strategy = ?config.rate_limit_strategy,
        "rate limit configured"
    );

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
