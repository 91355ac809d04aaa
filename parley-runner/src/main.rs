use anyhow::Result;
use parley_api::run as run_api;
use parley_core::{AppContext, Config, PgStore};
use std::time::Duration;
use tokio;
use tracing;
use tracing_subscriber;

const OTP_SWEEP_INTERVAL: Duration = Duration::from_secs(10 * 60);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Starting Parley server");

    // Load configuration
    let config = Config::from_env();
    let ctx = AppContext::new(config).await?;

    tracing::info!("Application context initialized");

    // Expired one-time codes accumulate until a login consumes them; sweep
    // them out periodically.
    let sweeper_store = PgStore::new(ctx.db_pool.clone());
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(OTP_SWEEP_INTERVAL).await;
            match sweeper_store.purge_expired_otps().await {
                Ok(0) => {}
                Ok(purged) => tracing::debug!("Purged {} expired OTP sessions", purged),
                Err(e) => tracing::error!("OTP sweep failed: {}", e),
            }
        }
    });

    // API server runs in main task
    tracing::info!("Starting API server");
    run_api(ctx).await?;

    Ok(())
}
