use std::{sync::Arc, time::Duration};

use tokio::signal;
use tracing_subscriber::EnvFilter;

use booking::{
    config::AppConfig, db, state::AppState, store::PgStore, time::SystemClock, workers::Sweeper,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "sweeper",
        database_url = %config.redacted_database_url(),
        pool_size = 1,
        interval_secs = config.sweep_interval_secs,
        "loaded booking configuration"
    );
    let pool = db::init_pool_with_size(&config.database_url, 1)?;
    let interval = Duration::from_secs(config.sweep_interval_secs.max(1));

    let state = AppState::from_store(config, PgStore::new(pool))?;
    let sweeper = Sweeper::new(state.service.clone(), Arc::new(SystemClock), interval);

    tokio::select! {
        _ = sweeper.run() => {}
        _ = signal::ctrl_c() => {
            tracing::info!("sweeper received shutdown signal");
        }
    }

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
