//! # Staking Event Aggregation Engine
//!
//! Folds an ordered stream of decoded staking-contract events into queryable
//! aggregates:
//! - `Contract` summary per contract address
//! - `User` cumulative counters per staker
//! - `StakePosition` per (user, stake timestamp)
//! - `DailyStat` per UTC day, with deduplicated participant counts
//! - one immutable `EventRecord` per event
//!
//! ## Architecture
//!
//! ```text
//! events.jsonl ──→ JsonlEventSource ──→ mpsc channel
//!                                            ↓
//!                                start_ingestion (single consumer)
//!                                            ↓
//!                   StakingIndexer::process_event (duplicate, then order)
//!                                            ↓
//!                   Repository (get-or-create, staged ChangeSet)
//!                                            ↓
//!                   handlers ── positions / daily / eligibility
//!                                            ↓
//!                   EntityStore::commit (SQLite or memory)
//! ```
//!
//! **Key Principle:** every event is one atomic unit of work. Either all of
//! its aggregate updates and its record become visible, or none do.
//!
//! ## Module Organization
//!
//! - `amount` - Arbitrary-precision amounts and their serde form
//! - `types` - Addresses, envelope, typed event payloads
//! - `entities` - Mutable aggregates
//! - `records` - Record identity and immutable event records
//! - `store` - Entity store trait and change sets
//! - `memory_store` / `sqlite_store` - Store backends
//! - `repository` - Get-or-create resolution
//! - `positions` - Stake position lifecycle
//! - `daily` - Day buckets and participant dedup
//! - `eligibility` - `can_withdraw` and its clock policy
//! - `handlers` - One transition per event kind
//! - `engine` - Per-event orchestration
//! - `source` - Upstream event sources
//! - `ingestion` - Channel consumer loop

pub mod amount;
pub mod types;
pub mod entities;
pub mod records;
pub mod store;
pub mod memory_store;
pub mod sqlite_store;
pub mod repository;
pub mod positions;
pub mod daily;
pub mod eligibility;
pub mod handlers;
pub mod engine;
pub mod source;
pub mod ingestion;

// Re-export commonly used types
pub use amount::Amount;
pub use types::{Address, EventEnvelope, EventPayload, StakingEvent};
pub use entities::{Contract, DailyStat, ParticipantCategory, PositionId, StakePosition, User};
pub use records::{EventRecord, RecordId};
pub use store::{ChangeSet, EntityStore};
pub use memory_store::MemoryStore;
pub use sqlite_store::SqliteEntityStore;
pub use eligibility::EligibilityClock;
pub use engine::{IndexerStats, StakingIndexer};
pub use source::{pump_events, EventSource, JsonlEventSource, VecEventSource};
pub use ingestion::{start_ingestion, IngestionSummary};
