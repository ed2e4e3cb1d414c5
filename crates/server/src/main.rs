mod bootstrap;
mod health;
mod relay;

use anyhow::Result;
use exempt_core::config::{AppConfig, LoadOptions};

fn init_logging(config: &AppConfig) {
    use exempt_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // `.env` first so file values feed the config layers like real env vars.
    let dotenv_path = exempt_core::env_file::load_dotenv();
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);
    if let Some(path) = dotenv_path {
        tracing::debug!(event_name = "system.server.dotenv", path = %path.display(), "loaded .env");
    }

    let app = bootstrap::bootstrap_with_config(config)?;
    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        route = relay::RELAY_ROUTE,
        "exempt-server listening"
    );

    axum::serve(listener, app.router()).with_graceful_shutdown(wait_for_shutdown()).await?;

    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "exempt-server stopping"
    );

    Ok(())
}

async fn wait_for_shutdown() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(
            event_name = "system.server.signal_error",
            correlation_id = "shutdown",
            error = %error,
            "failed to listen for shutdown signal"
        );
    }
}
