use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use meter_reader::api::{create_router, AppState};
use meter_reader::config::Config;
use meter_reader::drive::{DriveClient, FileStore};
use meter_reader::limiter::RateLimiter;
use meter_reader::pipeline::ReadingPipeline;
use meter_reader::vision::prompts::meter_reading_prompt;
use meter_reader::vision::VisionProvider;

#[derive(Parser)]
#[command(name = "meter-reader")]
#[command(about = "Reads electricity meter photos with a vision-language model")]
struct Args {
    /// Bind host (overrides METER_HOST)
    #[arg(long)]
    host: Option<String>,

    /// Bind port (overrides METER_PORT)
    #[arg(long)]
    port: Option<u16>,

    /// Directory of staged meter photos (overrides LOCAL_IMAGE_DIR)
    #[arg(long)]
    image_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "meter_reader=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = Config::from_env();
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(dir) = args.image_dir {
        config.images.local_dir = Some(dir);
    }

    match &config.images.local_dir {
        Some(dir) => {
            tokio::fs::create_dir_all(dir).await?;
            tracing::info!("Using local image directory {}", dir.display());
        }
        None => tracing::warn!(
            "LOCAL_IMAGE_DIR is not set; batch routes will report a configuration error"
        ),
    }

    tracing::info!("Initializing vision provider: {}...", config.vision.model);
    let vision = VisionProvider::new(&config.vision)?;
    if !vision.is_available() {
        tracing::warn!("Vision model unavailable - every reading will be reported as Unreadable");
    }

    let limiter = Arc::new(RateLimiter::new(&config.rate_limit));
    tracing::info!(
        "Rate limit: {} requests per {}s window",
        limiter.max_requests(),
        limiter.window().as_secs()
    );

    let prompt = meter_reading_prompt(config.vision.prompt.as_deref()).to_string();
    let pipeline = ReadingPipeline::new(limiter, Arc::new(vision.clone()), prompt);

    let drive: Option<Arc<dyn FileStore>> = match DriveClient::from_config(&config.drive).await {
        Ok(client) => Some(Arc::new(client)),
        Err(e) => {
            tracing::warn!("Google Drive unavailable - /drive/sync disabled: {}", e);
            None
        }
    };

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = AppState::new(config, pipeline, vision.kind(), drive);
    let app = create_router(state);

    tracing::info!("Meter Reader starting on http://{}", addr);
    tracing::info!("  Health check: http://{}/health", addr);
    tracing::info!("  API docs:     http://{}/docs", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, finishing in-flight requests...");
}
