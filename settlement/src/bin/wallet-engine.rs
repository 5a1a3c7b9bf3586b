//! Wallet engine binary

use prometheus::{Encoder, TextEncoder};
use settlement::{Config, StaticConfigStore, WalletEngine};
use std::sync::Arc;

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::INFO.into());

    if std::env::var("WALLET_LOG_JSON").as_deref() == Ok("1") {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn load_config() -> settlement::Result<Config> {
    match std::env::args().nth(1).or_else(|| std::env::var("WALLET_CONFIG").ok()) {
        Some(path) => Config::from_file(path)?.with_env_overrides(),
        None => Config::from_env(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    tracing::info!("Starting wallet engine");

    let config = load_config()?;
    config.policy.validate()?;
    let store = Arc::new(StaticConfigStore::new(config.policy.clone()));

    let engine = WalletEngine::open(config, store).await?;
    tracing::info!(
        service = %engine.config().ledger.service_name,
        policy_version = engine.config().policy.version,
        "Wallet engine ready"
    );

    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down wallet engine");
    engine.shutdown().await?;

    let mut families = engine.ledger().metrics().registry().gather();
    families.extend(engine.metrics().registry().gather());
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&families, &mut buffer)?;
    tracing::info!(metrics = %String::from_utf8_lossy(&buffer), "Final metrics");

    Ok(())
}
