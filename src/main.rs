use anyhow::{Context, Result};
use clap::Parser;
use content_activator::{config, server};
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing::info;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))
        .with_context(|| format!("failed to load {}", args.config.display()))?;
    cfg.ensure_dirs()?;

    let state = server::AppState::from_config(&cfg)?;
    let app = server::router(state, cfg.app.rate_limit_per_minute);

    let listener = TcpListener::bind(&cfg.app.bind)
        .await
        .with_context(|| format!("failed to bind {}", cfg.app.bind))?;
    info!(
        bind = %cfg.app.bind,
        platform = cfg.marketing.platform.as_str(),
        log = %cfg.activation_log_path().display(),
        "content activator listening"
    );
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown requested");
    }
}
