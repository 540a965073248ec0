use ledger_chat::{api::start_server, AppConfig, ChatService};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Defaults, config file, then .env / environment
    let config = AppConfig::load()?;

    if config.gemini_api_key.is_empty() {
        warn!("GEMINI_API_KEY not set; chat requests will fail until it is configured");
    }

    info!("Ledger Chat - API Server");
    info!("Port: {}", config.api_port);

    let service = Arc::new(ChatService::from_config(&config)?);

    info!("Chat service initialized");
    info!("Starting API server...");

    start_server(service, config.api_port).await?;

    Ok(())
}
