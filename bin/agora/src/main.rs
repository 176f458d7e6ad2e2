//! # Agora Binary
//!
//! Runs the rank scheduler against the configured database until Ctrl-C.
//! `agora seed` fills the database with demo accounts and posts instead.

mod seed;

use std::sync::Arc;

use agora_core::{RankScheduler, RankingEngine};
use agora_db_sqlite::SqliteStore;
use anyhow::{bail, Context};
use configs::Settings;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Settings first, since they carry the log filter
    let settings = Settings::load().context("loading settings")?;
    init_tracing(&settings);

    info!("starting agora v{}", env!("CARGO_PKG_VERSION"));

    // 2. Storage
    let store = Arc::new(
        SqliteStore::new(&settings.database.url, settings.database.max_connections)
            .await
            .context("opening database")?,
    );

    let command = std::env::args().nth(1);
    match command.as_deref() {
        None | Some("run") => run(store.clone(), &settings).await?,
        Some("seed") => seed::run(store.clone(), &settings).await?,
        Some(other) => bail!("unknown command {other:?}; expected `run` or `seed`"),
    }

    store.close().await;
    Ok(())
}

fn init_tracing(settings: &Settings) {
    // RUST_LOG wins over the configured filter.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.log.filter));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if settings.log.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(store: Arc<SqliteStore>, settings: &Settings) -> anyhow::Result<()> {
    let engine = Arc::new(RankingEngine::new(store, settings.ranking.params()));
    let scheduler = RankScheduler::new(engine, settings.ranking.interval());

    scheduler.start().await.context("starting rank scheduler")?;
    info!(
        interval_secs = settings.ranking.interval_secs,
        "rank scheduler running; press Ctrl-C to stop"
    );

    tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;

    info!("shutting down");
    scheduler.stop().await.context("stopping rank scheduler")?;
    Ok(())
}
