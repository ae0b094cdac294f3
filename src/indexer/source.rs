//! Upstream event sources
//!
//! Sources deliver already-decoded events in stream order by
//! `(block_number, log_index)`. They may re-deliver events under
//! at-least-once delivery; the engine skips those and refuses any unseen
//! event that sorts before the last applied one.

use super::types::StakingEvent;
use crate::error::{IndexerError, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::sync::mpsc;

#[async_trait]
pub trait EventSource: Send {
    /// Next event, or `None` once the source is exhausted.
    async fn next_event(&mut self) -> Result<Option<StakingEvent>>;
}

/// Reads one JSON-encoded `StakingEvent` per line
pub struct JsonlEventSource {
    path: PathBuf,
    lines: Lines<BufReader<File>>,
    line_number: u64,
}

impl JsonlEventSource {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).await?;

        log::info!("📖 Reading events from: {}", path.display());
        Ok(Self {
            path,
            lines: BufReader::new(file).lines(),
            line_number: 0,
        })
    }
}

#[async_trait]
impl EventSource for JsonlEventSource {
    async fn next_event(&mut self) -> Result<Option<StakingEvent>> {
        while let Some(line) = self.lines.next_line().await? {
            self.line_number += 1;
            if line.trim().is_empty() {
                continue;
            }

            let event = StakingEvent::from_jsonl(line.trim()).map_err(|e| {
                log::error!("❌ {}:{}: {}", self.path.display(), self.line_number, e);
                e
            })?;
            return Ok(Some(event));
        }
        Ok(None)
    }
}

/// In-memory source, mainly for tests and replays
pub struct VecEventSource {
    events: VecDeque<StakingEvent>,
}

impl VecEventSource {
    pub fn new(events: Vec<StakingEvent>) -> Self {
        Self { events: events.into() }
    }
}

#[async_trait]
impl EventSource for VecEventSource {
    async fn next_event(&mut self) -> Result<Option<StakingEvent>> {
        Ok(self.events.pop_front())
    }
}

/// Drain `source` into `tx` until the source is exhausted.
///
/// Returns the number of events forwarded. Stops with `ChannelClosed` if the
/// consumer went away.
pub async fn pump_events<S: EventSource>(mut source: S, tx: mpsc::Sender<StakingEvent>) -> Result<u64> {
    let mut forwarded = 0u64;
    while let Some(event) = source.next_event().await? {
        tx.send(event).await.map_err(|_| IndexerError::ChannelClosed)?;
        forwarded += 1;
    }

    log::info!("✅ Event source exhausted after {} events", forwarded);
    Ok(forwarded)
}
