use anyhow::Context;

use verify_bot::bot::Bot;
use verify_bot::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    // RUST_LOG wins; LOG_LEVEL is the plain fallback.
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        tracing_subscriber::EnvFilter::new(level.to_lowercase())
    });
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    let config = Config::from_env().context("Invalid configuration")?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        panel = %config.provision.base_url,
        delivery = %config.mail.delivery,
        allowed_suffix = %config.allowed_email_suffix,
        "Starting verify-bot"
    );

    Bot::from_config(&config)?.run().await?;

    tracing::info!("Shut down cleanly");
    Ok(())
}
