use relay_rs::api::ApiServer;
use relay_rs::config::Config;
use relay_rs::dispatch::Mailer;
use relay_rs::scanner::{Scanner, VirusTotalClient};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting relay-rs");

    // Load configuration: optional config.toml as base, environment on top
    let config = if std::path::Path::new("config.toml").exists() {
        Config::from_file("config.toml")?
    } else {
        Config::from_env()?
    };

    info!("Configuration loaded");
    info!("  Listening on: {}", config.server.listen_addr);
    info!("  SMTP relay: {}:{} (secure: {})", config.smtp.host, config.smtp.port, config.smtp.secure);
    info!("  Sender address: {}", config.smtp.sender);
    info!("  Diagnostic mode: {}", config.server.diagnostic_mode);
    info!("  Scanning enabled: {}", config.scanner.enabled);

    tokio::fs::create_dir_all(&config.server.upload_dir).await?;

    let config = Arc::new(config);
    let mailer = Arc::new(Mailer::new(&config));

    // Scanning runs only when enabled and a credential is present
    let scanner: Option<Arc<dyn Scanner>> = match (config.scanner.enabled, &config.scanner.api_key)
    {
        (true, Some(key)) => Some(Arc::new(VirusTotalClient::new(
            config.scanner.api_url.clone(),
            key.clone(),
        ))),
        (true, None) => {
            info!("Scanning enabled but no credential configured; scans are skipped");
            None
        }
        _ => None,
    };

    let server = ApiServer::new(Arc::clone(&config), mailer, scanner);
    server.run().await?;

    Ok(())
}
