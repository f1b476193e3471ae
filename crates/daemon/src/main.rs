use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use reeld::db::Database;
use reeld::jobs::processor::RunProcessor;
use reeld::jobs::RunManager;
use reeld::{AppConfig, GenerationRun, RunDeps};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Arc::new(AppConfig::load()?);

    let db_path = config.server.db_path.clone();
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::create_dir_all(&config.work_dir)?;
    let db = Arc::new(Database::new(&db_path)?);
    info!("Database initialized at {:?}", db_path);

    let runs = Arc::new(RunManager::new(db));
    let generation = Arc::new(GenerationRun::new(config.clone(), RunDeps::production(&config)?));

    let shutdown = CancellationToken::new();
    let processor = RunProcessor::new(
        runs.clone(),
        generation,
        Duration::from_secs(config.server.poll_interval_secs.max(1)),
    );
    let processor_shutdown = shutdown.clone();
    let processor_handle = tokio::spawn(async move {
        processor.run(processor_shutdown).await;
    });

    let app = reeld::api::app(runs.clone());

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!("Starting reeld on {}", config.server.bind);

    let shutdown_runs = runs.clone();
    let shutdown_signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for ctrl-c: {}", e);
            }
            info!("Shutting down, cancelling in-flight runs");
            shutdown_runs.cancel_all();
            shutdown_signal.cancel();
        })
        .await?;

    if let Err(e) = processor_handle.await {
        tracing::error!("Run processor panicked: {}", e);
    }
    Ok(())
}
