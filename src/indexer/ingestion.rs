//! Ingestion loop - single sequential consumer of the event channel

use super::engine::StakingIndexer;
use super::store::EntityStore;
use super::types::StakingEvent;
use crate::error::Result;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::time::{interval, Duration, MissedTickBehavior};

/// Outcome of one ingestion run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestionSummary {
    pub processed: u64,
    pub duplicates: u64,
}

/// Apply events from `rx` until every sender is dropped.
///
/// Events are applied strictly one at a time, in channel order. A re-delivered
/// event (duplicate record id) is logged and skipped; any other error stops
/// the loop and is returned, leaving the store at the last committed event.
///
/// Arguments:
/// - `rx`: Receiver end of the event channel
/// - `indexer`: The indexer owning the entity store
/// - `progress_interval_ms`: How often to log throughput (milliseconds)
pub async fn start_ingestion<S: EntityStore>(
    mut rx: mpsc::Receiver<StakingEvent>,
    indexer: &mut StakingIndexer<S>,
    progress_interval_ms: u64,
) -> Result<IngestionSummary> {
    log::info!("🚀 Starting staking event ingestion");
    log::info!("   ├─ Store backend: {}", indexer.store().backend_type());
    log::info!("   ├─ canWithdraw clock: {}", indexer.clock().as_str());
    log::info!("   └─ Progress interval: {}ms", progress_interval_ms);

    let mut progress_timer = interval(Duration::from_millis(progress_interval_ms.max(1)));
    progress_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // First tick fires immediately
    progress_timer.tick().await;

    let mut summary = IngestionSummary::default();
    let mut window_count = 0u64;
    let mut window_start = Instant::now();

    loop {
        tokio::select! {
            received = rx.recv() => {
                let Some(event) = received else {
                    break;
                };

                match indexer.process_event(&event) {
                    Ok(_) => {
                        summary.processed += 1;
                        window_count += 1;
                    }
                    Err(e) if e.is_duplicate() => {
                        summary.duplicates += 1;
                        log::warn!("⚠️  Skipping re-delivered event: {}", e);
                    }
                    Err(e) => {
                        log::error!(
                            "❌ Ingestion stopped at block {} log {}: {}",
                            event.envelope.block_number,
                            event.envelope.log_index,
                            e
                        );
                        return Err(e);
                    }
                }
            }

            _ = progress_timer.tick() => {
                let elapsed = window_start.elapsed().as_secs_f64();
                if window_count > 0 && elapsed > 0.0 {
                    log::info!(
                        "📊 Ingestion rate: {:.1} events/sec (total: {}, duplicates: {}, queued: {})",
                        window_count as f64 / elapsed,
                        summary.processed,
                        summary.duplicates,
                        rx.len()
                    );
                }
                window_count = 0;
                window_start = Instant::now();
            }
        }
    }

    log::info!(
        "✅ Ingestion complete: {} events applied, {} duplicates skipped",
        summary.processed,
        summary.duplicates
    );
    Ok(summary)
}
