//! Staking indexer engine
//!
//! Applies decoded events one at a time against an `EntityStore`.
//!
//! ## Flow
//!
//! ```text
//! StakingEvent
//!     ↓
//! RecordId::derive()          (tx hash ++ log index)
//!     ↓
//! EntityStore::record_exists() ── yes ──→ IndexerError::DuplicateRecord
//!     ↓ no
//! (block, log) < last applied ── yes ──→ IndexerError::OrderingViolation
//!     ↓ no
//! Repository (unit of work)
//!     ↓
//! handlers::apply()           (resolve → mutate → save, stage record)
//!     ↓
//! EntityStore::commit(ChangeSet)   (all-or-nothing)
//! ```
//!
//! The duplicate check runs before any handler so a re-delivered event never
//! reaches the arithmetic. The store enforces the same rule again at commit.
//! Ordering is checked after it, so a re-delivered batch is skipped as
//! duplicates while an unseen event that sorts before the last applied one
//! is refused.

use super::eligibility::EligibilityClock;
use super::handlers::{self, EventContext};
use super::records::RecordId;
use super::repository::Repository;
use super::store::EntityStore;
use super::types::StakingEvent;
use crate::error::{IndexerError, Result};
use std::collections::BTreeMap;

/// Running counters for one indexer instance
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexerStats {
    pub events_applied: u64,
    pub duplicates_rejected: u64,
    pub entity_writes: u64,
    pub by_kind: BTreeMap<&'static str, u64>,
}

impl IndexerStats {
    pub fn applied(&self, kind: &str) -> u64 {
        self.by_kind.get(kind).copied().unwrap_or(0)
    }
}

pub struct StakingIndexer<S: EntityStore> {
    store: S,

    /// Clock `can_withdraw` is evaluated against
    clock: EligibilityClock,

    stats: IndexerStats,

    /// `(block_number, log_index)` of the last applied event
    last_applied: Option<(u64, u32)>,

    /// Timestamp function (for testing with mock time)
    now_fn: Box<dyn Fn() -> i64 + Send + Sync>,
}

impl<S: EntityStore> StakingIndexer<S> {
    /// Create an indexer that evaluates eligibility against system time.
    pub fn new(store: S) -> Self {
        Self::new_with_timestamp_fn(store, Box::new(|| chrono::Utc::now().timestamp()))
    }

    /// Create an indexer with a custom wall-clock source
    ///
    /// # Arguments
    ///
    /// * `store` - Backing entity store
    /// * `now_fn` - Function returning Unix timestamp (for testing)
    pub fn new_with_timestamp_fn(store: S, now_fn: Box<dyn Fn() -> i64 + Send + Sync>) -> Self {
        Self {
            store,
            clock: EligibilityClock::default(),
            stats: IndexerStats::default(),
            last_applied: None,
            now_fn,
        }
    }

    pub fn with_clock(mut self, clock: EligibilityClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn clock(&self) -> EligibilityClock {
        self.clock
    }

    /// Apply one event as a single atomic unit of work.
    ///
    /// Returns the id of the event record that was written.
    ///
    /// # Errors
    ///
    /// * `DuplicateRecord` if this event was already applied; no state changes
    /// * `OrderingViolation` if a new event sorts before the last applied one
    /// * `InvalidIdentity` if the envelope's transaction hash is malformed
    /// * any store error, after which nothing of this event is visible
    pub fn process_event(&mut self, event: &StakingEvent) -> Result<RecordId> {
        let record_id = RecordId::derive(&event.envelope)?;

        if self.store.record_exists(&record_id)? {
            self.stats.duplicates_rejected = self.stats.duplicates_rejected.saturating_add(1);
            return Err(IndexerError::DuplicateRecord {
                kind: event.kind(),
                id: record_id.to_string(),
            });
        }

        let key = event.envelope.order_key();
        if let Some(previous) = self.last_applied {
            if key < previous {
                return Err(IndexerError::OrderingViolation {
                    previous: format!("block {} log {}", previous.0, previous.1),
                    current: format!("block {} log {}", key.0, key.1),
                });
            }
        }

        let ctx = EventContext {
            envelope: &event.envelope,
            record_id: record_id.clone(),
            reference_time: self
                .clock
                .reference_time((self.now_fn)(), event.envelope.block_timestamp),
        };

        let mut repo = Repository::new(&self.store);
        handlers::apply(&mut repo, &ctx, event)?;
        let changes = repo.into_changes();
        let writes = changes.write_count() as u64;

        if let Err(e) = self.store.commit(changes) {
            if e.is_duplicate() {
                self.stats.duplicates_rejected = self.stats.duplicates_rejected.saturating_add(1);
            }
            return Err(e);
        }

        self.last_applied = Some(key);
        self.stats.events_applied = self.stats.events_applied.saturating_add(1);
        self.stats.entity_writes = self.stats.entity_writes.saturating_add(writes);
        *self.stats.by_kind.entry(event.kind()).or_insert(0) += 1;

        log::debug!(
            "Applied {} {} (block {}, {} writes)",
            event.kind(),
            record_id,
            event.envelope.block_number,
            writes
        );

        Ok(record_id)
    }

    pub fn stats(&self) -> &IndexerStats {
        &self.stats
    }

    pub fn store(&self) -> &S {
        &self.store
    }

}
