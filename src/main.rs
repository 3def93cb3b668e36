//! Task Engine RS binary entry point

use task_engine_rs::{config::EngineConfig, engine::Engine};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");

    info!("Starting Task Engine RS");

    // Load configuration
    let config = EngineConfig::load()?;
    config.validate()?;

    info!(
        "Initialized with {}..{} workers, max queue size: {}",
        config.min_workers, config.max_workers, config.max_queue_size
    );

    let engine = Engine::new(config)?;
    engine.start().await?;

    tokio::signal::ctrl_c().await?;
    info!("Received Ctrl-C, shutting down");

    engine.shutdown().await?;
    Ok(())
}
