use spotbot_backend::config;
use spotbot_backend::module::scheduled::ScheduledTaskManager;
use spotbot_frontend::{DeliverySender, MessageSink, TelegramSink};

use anyhow::Result;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| config::DEFAULT_CONFIG_PATH.to_string());
    let config = config::read_config(&config_path)?;

    // Initialize logging
    let _logging_guard = spotbot_backend::logging::init_logging(&config.logging, &config.log_level)?;

    tracing::info!("Spotbot starting...");

    let sink = Arc::new(TelegramSink::new(&config.telegram)?);
    tracing::info!("Notifications go to {}", sink.target());
    let sender = Arc::new(DeliverySender::new(sink, config.delivery.clone()));

    let cancel = CancellationToken::new();
    let mut task_manager = ScheduledTaskManager::from_config(config, sender, cancel.clone())?;
    task_manager.start_all();
    tracing::info!("All scheduled tasks started successfully");

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received, stopping...");

    cancel.cancel();
    task_manager.shutdown().await;

    Ok(())
}
