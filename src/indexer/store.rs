//! Entity store interface
//!
//! Stores are keyed persistence layers. Reads are per natural key; writes
//! arrive as one `ChangeSet` per processed event and must be applied
//! atomically:
//! - aggregates are upserted by natural key
//! - event records are create-if-absent; an existing id rejects the whole
//!   change set with `IndexerError::DuplicateRecord`
//! - daily participants are insert-only; a change set carries just the
//!   members first admitted by its event

use super::entities::{Contract, DailyStat, ParticipantCategory, PositionId, StakePosition, User};
use super::records::{EventRecord, RecordId};
use super::types::Address;
use crate::error::Result;
use std::collections::{BTreeMap, BTreeSet};

pub trait EntityStore: Send {
    fn load_contract(&self, id: &Address) -> Result<Option<Contract>>;

    fn load_user(&self, id: &Address) -> Result<Option<User>>;

    fn load_position(&self, id: &PositionId) -> Result<Option<StakePosition>>;

    fn load_daily_stat(&self, day: i64) -> Result<Option<DailyStat>>;

    fn load_record(&self, id: &RecordId) -> Result<Option<EventRecord>>;

    fn record_exists(&self, id: &RecordId) -> Result<bool>;

    /// Whether `address` was already counted for `(day, category)`.
    fn is_participant(&self, day: i64, category: ParticipantCategory, address: &Address) -> Result<bool>;

    /// Apply every staged write of one event, or none of them.
    fn commit(&mut self, changes: ChangeSet) -> Result<()>;

    /// Get backend type for logging
    fn backend_type(&self) -> &'static str;
}

/// Writes staged by one handler invocation
///
/// Aggregates are keyed so the last staged version of each entity wins.
#[derive(Debug, Default, Clone)]
pub struct ChangeSet {
    pub contracts: BTreeMap<Address, Contract>,
    pub users: BTreeMap<Address, User>,
    pub positions: BTreeMap<PositionId, StakePosition>,
    pub daily_stats: BTreeMap<i64, DailyStat>,
    /// Newly admitted `(day, category, address)` members
    pub participants: BTreeSet<(i64, ParticipantCategory, Address)>,
    pub records: Vec<EventRecord>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
            && self.users.is_empty()
            && self.positions.is_empty()
            && self.daily_stats.is_empty()
            && self.participants.is_empty()
            && self.records.is_empty()
    }

    /// Number of entity and record writes staged.
    pub fn write_count(&self) -> usize {
        self.contracts.len()
            + self.users.len()
            + self.positions.len()
            + self.daily_stats.len()
            + self.participants.len()
            + self.records.len()
    }
}
