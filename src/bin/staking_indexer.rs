//! Staking indexer runtime
//!
//! Reads decoded staking events from a JSONL file and folds them into the
//! configured entity store.
//!
//! Usage:
//!   cargo run --bin staking_indexer
//!   cargo run --bin staking_indexer -- --backend memory

use dotenv::dotenv;
use log::{error, info, warn};
use staking_indexer::config::{BackendType, IndexerConfig};
use staking_indexer::error::IndexerError;
use staking_indexer::indexer::{
    pump_events, start_ingestion, EntityStore, IngestionSummary, JsonlEventSource, MemoryStore,
    SqliteEntityStore, StakingIndexer,
};
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize environment and logging
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    info!("🚀 Staking Indexer");
    info!("   └─ Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = IndexerConfig::from_env()?;
    let args: Vec<String> = std::env::args().collect();
    config.apply_args(&args)?;

    info!("✅ Configuration loaded");
    info!("   ├─ Backend: {}", config.backend.as_str());
    info!("   ├─ Events: {}", config.events_path.display());
    info!("   ├─ Channel buffer: {} events", config.channel_buffer);
    info!("   ├─ Progress interval: {}ms", config.progress_interval_ms);
    info!("   └─ canWithdraw clock: {}", config.can_withdraw_clock.as_str());

    match config.backend {
        BackendType::Sqlite => {
            info!("🔧 Opening database: {}", config.db_path.display());
            let store = SqliteEntityStore::new(&config.db_path)?;
            let mut indexer = StakingIndexer::new(store).with_clock(config.can_withdraw_clock);

            let summary = run(&mut indexer, &config).await?;
            report(&summary);
            info!("   └─ Records stored: {}", indexer.store().record_count()?);
        }
        BackendType::Memory => {
            let store = match &config.snapshot_path {
                Some(path) => {
                    info!("📂 Loading snapshot: {}", path.display());
                    MemoryStore::load_snapshot(path)?
                }
                None => MemoryStore::new(),
            };
            let mut indexer = StakingIndexer::new(store).with_clock(config.can_withdraw_clock);

            let summary = run(&mut indexer, &config).await?;
            report(&summary);
            info!("   └─ Records stored: {}", indexer.store().record_count());

            if let Some(path) = &config.snapshot_path {
                indexer.store().save_snapshot(path)?;
                info!("💾 Snapshot saved: {}", path.display());
            }
        }
    }

    Ok(())
}

async fn run<S: EntityStore>(
    indexer: &mut StakingIndexer<S>,
    config: &IndexerConfig,
) -> Result<IngestionSummary, IndexerError> {
    let source = JsonlEventSource::open(&config.events_path).await?;
    let (tx, rx) = mpsc::channel(config.channel_buffer);
    let pump = tokio::spawn(pump_events(source, tx));

    let outcome = tokio::select! {
        result = start_ingestion(rx, &mut *indexer, config.progress_interval_ms) => Some(result),
        _ = tokio::signal::ctrl_c() => None,
    };

    let Some(result) = outcome else {
        warn!("⚠️  Interrupted, stopping after last committed event");
        pump.abort();
        let stats = indexer.stats();
        return Ok(IngestionSummary {
            processed: stats.events_applied,
            duplicates: stats.duplicates_rejected,
        });
    };
    let summary = result?;

    match pump.await {
        Ok(Ok(forwarded)) => info!("   Source forwarded {} events", forwarded),
        Ok(Err(e)) => {
            error!("❌ Event source failed: {}", e);
            return Err(e);
        }
        Err(e) => {
            error!("❌ Event source task panicked: {}", e);
            return Err(IndexerError::ChannelClosed);
        }
    }

    Ok(summary)
}

fn report(summary: &IngestionSummary) {
    info!("📊 Summary");
    info!("   ├─ Events applied: {}", summary.processed);
    info!("   ├─ Duplicates skipped: {}", summary.duplicates);
}
