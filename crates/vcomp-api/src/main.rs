//! Axum API server binary.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vcomp_api::{create_router, ApiConfig, AppState};
use vcomp_media::{check_ffmpeg, check_ffprobe, FfmpegGateway};
use vcomp_scheduler::{JobScheduler, SchedulerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Colored output for dev, JSON for production.
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("vcomp=info,tower_http=info"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(true).with_target(true))
            .with(env_filter)
            .init();
    }

    info!("Starting vcomp-api");

    check_ffmpeg().context("ffmpeg is required on PATH")?;
    if check_ffprobe().is_err() {
        warn!("ffprobe not found in PATH; renders will fail");
    }

    let config = ApiConfig::from_env();
    let scheduler_config = SchedulerConfig::from_env();
    info!(
        host = %config.host,
        port = config.port,
        max_concurrent_jobs = scheduler_config.max_concurrent_jobs,
        output_dir = %scheduler_config.output_dir.display(),
        "Configuration loaded"
    );

    let gateway = Arc::new(FfmpegGateway::new(
        scheduler_config.work_dir.clone(),
        scheduler_config.output_dir.clone(),
    ));
    let scheduler = JobScheduler::start(scheduler_config, gateway);

    let app = create_router(AppState::new(config.clone(), scheduler));

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("invalid bind address")?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("failed to bind")?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to install CTRL+C handler: {}", e);
        return;
    }
    info!("Received shutdown signal");
}
