//! In-memory entity store with JSON snapshot persistence

use super::entities::{Contract, DailyStat, ParticipantCategory, PositionId, StakePosition, User};
use super::records::{EventRecord, RecordId};
use super::store::{ChangeSet, EntityStore};
use super::types::Address;
use crate::error::{IndexerError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs;
use std::path::Path;

#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    contracts: BTreeMap<Address, Contract>,
    users: BTreeMap<Address, User>,
    positions: BTreeMap<PositionId, StakePosition>,
    daily_stats: BTreeMap<i64, DailyStat>,
    participants: BTreeSet<(i64, ParticipantCategory, Address)>,
    records: BTreeMap<RecordId, EventRecord>,
}

/// Snapshot of the store for persistence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub contracts: Vec<Contract>,
    pub users: Vec<User>,
    pub positions: Vec<StakePosition>,
    pub daily_stats: Vec<DailyStat>,
    #[serde(default)]
    pub participants: Vec<(i64, ParticipantCategory, Address)>,
    pub records: Vec<EventRecord>,
    pub timestamp: i64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    pub fn positions_for(&self, user: &Address) -> Vec<&StakePosition> {
        self.positions
            .values()
            .filter(|p| p.user() == user)
            .collect()
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            contracts: self.contracts.values().cloned().collect(),
            users: self.users.values().cloned().collect(),
            positions: self.positions.values().cloned().collect(),
            daily_stats: self.daily_stats.values().cloned().collect(),
            participants: self.participants.iter().cloned().collect(),
            records: self.records.values().cloned().collect(),
            timestamp: chrono::Utc::now().timestamp(),
        }
    }

    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        Self {
            contracts: snapshot.contracts.into_iter().map(|c| (c.id.clone(), c)).collect(),
            users: snapshot.users.into_iter().map(|u| (u.id.clone(), u)).collect(),
            positions: snapshot.positions.into_iter().map(|p| (p.id.clone(), p)).collect(),
            daily_stats: snapshot.daily_stats.into_iter().map(|d| (d.day, d)).collect(),
            participants: snapshot.participants.into_iter().collect(),
            records: snapshot.records.into_iter().map(|r| (r.id.clone(), r)).collect(),
        }
    }

    /// Save store snapshot to JSON file
    pub fn save_snapshot(&self, file_path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.snapshot())?;
        fs::write(file_path.as_ref(), json)?;

        log::debug!(
            "Saved {} records to {}",
            self.records.len(),
            file_path.as_ref().display()
        );
        Ok(())
    }

    /// Load store snapshot from JSON file, or an empty store if none exists
    pub fn load_snapshot(file_path: impl AsRef<Path>) -> Result<Self> {
        let path = file_path.as_ref();
        if !path.exists() {
            log::info!("No existing snapshot file found: {}", path.display());
            return Ok(Self::new());
        }

        let json = fs::read_to_string(path)?;
        let snapshot: StoreSnapshot = serde_json::from_str(&json)?;

        log::info!("Loaded {} records from {}", snapshot.records.len(), path.display());
        Ok(Self::from_snapshot(snapshot))
    }
}

impl EntityStore for MemoryStore {
    fn load_contract(&self, id: &Address) -> Result<Option<Contract>> {
        Ok(self.contracts.get(id).cloned())
    }

    fn load_user(&self, id: &Address) -> Result<Option<User>> {
        Ok(self.users.get(id).cloned())
    }

    fn load_position(&self, id: &PositionId) -> Result<Option<StakePosition>> {
        Ok(self.positions.get(id).cloned())
    }

    fn load_daily_stat(&self, day: i64) -> Result<Option<DailyStat>> {
        Ok(self.daily_stats.get(&day).cloned())
    }

    fn load_record(&self, id: &RecordId) -> Result<Option<EventRecord>> {
        Ok(self.records.get(id).cloned())
    }

    fn record_exists(&self, id: &RecordId) -> Result<bool> {
        Ok(self.records.contains_key(id))
    }

    fn is_participant(&self, day: i64, category: ParticipantCategory, address: &Address) -> Result<bool> {
        Ok(self.participants.contains(&(day, category, address.clone())))
    }

    fn commit(&mut self, changes: ChangeSet) -> Result<()> {
        // Validate every record before touching state so a collision leaves
        // the store exactly as it was.
        let mut staged = HashSet::new();
        for record in &changes.records {
            if self.records.contains_key(&record.id) || !staged.insert(record.id.clone()) {
                return Err(IndexerError::DuplicateRecord {
                    kind: record.kind(),
                    id: record.id.to_string(),
                });
            }
        }

        self.contracts.extend(changes.contracts);
        self.users.extend(changes.users);
        self.positions.extend(changes.positions);
        self.daily_stats.extend(changes.daily_stats);
        self.participants.extend(changes.participants);
        for record in changes.records {
            self.records.insert(record.id.clone(), record);
        }

        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "Memory"
    }
}
