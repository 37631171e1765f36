//! syncforge - music-synchronized video production service.

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use syncforge::analysis::MediaAnalyzer;
use syncforge::api::{self, AppState};
use syncforge::config::AppConfig;
use syncforge::database;
use syncforge::database::repositories::{
    ChunkRepository, GenerationRepository, JobRepository, SqlxChunkRepository,
    SqlxGenerationRepository, SqlxJobRepository, SqlxSystemConfigRepository,
    SystemConfigRepository,
};
use syncforge::logging::init_logging;
use syncforge::media::{FfmpegRunner, MediaRunner};
use syncforge::pipeline::{ChunkedProducer, PipelineDeps};
use syncforge::scheduler::{Scheduler, SchedulerConfig};
use syncforge::storage::{AssetFetcher, HttpAssetFetcher, HttpObjectStorage, ObjectStorage};
use syncforge::synthesis::{MotionControlClient, SynthesisClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let log_dir = std::env::var("LOG_DIR").unwrap_or_else(|_| "logs".to_string());
    let _guard = init_logging(&log_dir)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!("Starting syncforge v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::from_env()?;

    info!("Connecting to database: {}", config.database_url);
    let pool = database::create_pool(&config.database_url).await?;

    let http = reqwest::Client::builder()
        .user_agent(concat!("syncforge/", env!("CARGO_PKG_VERSION")))
        .build()?;

    let fetcher: Arc<dyn AssetFetcher> = Arc::new(HttpAssetFetcher::new(http.clone()));
    let media: Arc<dyn MediaRunner> = Arc::new(FfmpegRunner::new());
    let storage: Arc<dyn ObjectStorage> = Arc::new(HttpObjectStorage::new(
        http.clone(),
        &config.storage_base_url,
        &config.storage_bucket,
        &config.storage_service_credential,
    ));
    let synthesis: Arc<dyn SynthesisClient> = Arc::new(MotionControlClient::new(
        http.clone(),
        &config.synth_api_base,
        &config.synth_model_id,
        &config.synth_endpoint,
        &config.synth_api_key,
        config.synth_webhook_url.clone(),
    ));

    let jobs: Arc<dyn JobRepository> = Arc::new(SqlxJobRepository::new(pool.clone()));
    let chunks: Arc<dyn ChunkRepository> = Arc::new(SqlxChunkRepository::new(pool.clone()));
    let generations: Arc<dyn GenerationRepository> =
        Arc::new(SqlxGenerationRepository::new(pool.clone()));
    let system_config: Arc<dyn SystemConfigRepository> =
        Arc::new(SqlxSystemConfigRepository::new(pool.clone()));

    let deps = PipelineDeps {
        fetcher: fetcher.clone(),
        media: media.clone(),
        storage: storage.clone(),
        synthesis,
        jobs: jobs.clone(),
        chunks,
        generations: generations.clone(),
    };

    let producer = Arc::new(ChunkedProducer::new(deps.clone()));
    let scheduler = Arc::new(Scheduler::new(
        deps,
        system_config,
        producer,
        SchedulerConfig::default(),
    ));

    let analyzer = Arc::new(MediaAnalyzer::new(
        fetcher.clone(),
        media.clone(),
        jobs,
        generations,
    ));

    let shutdown = CancellationToken::new();
    let scheduler_handle = scheduler.spawn(shutdown.clone());

    let state = AppState {
        start_time: Instant::now(),
        analyzer,
        fetcher,
        media,
        storage,
        webhook_shared_secret: config.webhook_shared_secret.clone(),
        cors_origins: config.cors_origins.clone(),
    };

    let api_shutdown = shutdown.clone();
    let bind_address = config.api_bind_address.clone();
    let api_port = config.api_port;
    let api_handle = tokio::spawn(async move {
        if let Err(e) = api::serve(state, &bind_address, api_port, api_shutdown).await {
            error!("API server failed: {}", e);
        }
    });

    info!("syncforge started");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received SIGINT, shutting down");
        }
        _ = wait_for_sigterm() => {
            info!("Received SIGTERM, shutting down");
        }
    }

    shutdown.cancel();
    let _ = scheduler_handle.await;
    let _ = api_handle.await;

    info!("syncforge shutdown complete");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_sigterm() {
    use tokio::signal::unix::{SignalKind, signal};
    let mut sigterm = signal(SignalKind::terminate()).expect("Failed to register SIGTERM handler");
    sigterm.recv().await;
}

#[cfg(not(unix))]
async fn wait_for_sigterm() {
    std::future::pending::<()>().await;
}
