//! Get-or-create resolution of aggregates from natural keys
//!
//! A `Repository` is the unit of work for one event. Every entity read goes
//! through `resolve_*` and every write through `save_*`; nothing reaches the
//! store until the engine commits the staged `ChangeSet`. Staged versions
//! shadow the store, so a second resolve in the same event observes the
//! first one's writes.

use super::daily::{bucket_for, date_label};
use super::entities::{Contract, DailyStat, ParticipantCategory, PositionId, StakePosition, User};
use super::records::EventRecord;
use super::store::{ChangeSet, EntityStore};
use super::types::Address;
use crate::error::Result;

/// An entity together with whether this resolve created it.
#[derive(Debug, Clone)]
pub struct Resolved<T> {
    pub entity: T,
    pub created: bool,
}

pub struct Repository<'a, S: EntityStore + ?Sized> {
    store: &'a S,
    changes: ChangeSet,
}

impl<'a, S: EntityStore + ?Sized> Repository<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            changes: ChangeSet::default(),
        }
    }

    pub fn resolve_contract(&mut self, address: &Address) -> Result<Contract> {
        if let Some(contract) = self.changes.contracts.get(address) {
            return Ok(contract.clone());
        }
        if let Some(contract) = self.store.load_contract(address)? {
            return Ok(contract);
        }

        log::debug!("Creating contract {}", address);
        let contract = Contract::new(address.clone());
        self.changes.contracts.insert(address.clone(), contract.clone());
        Ok(contract)
    }

    pub fn resolve_user(&mut self, address: &Address) -> Result<User> {
        if let Some(user) = self.changes.users.get(address) {
            return Ok(user.clone());
        }
        if let Some(user) = self.store.load_user(address)? {
            return Ok(user);
        }

        log::debug!("Creating user {}", address);
        let user = User::new(address.clone());
        self.changes.users.insert(address.clone(), user.clone());
        Ok(user)
    }

    /// Resolve the position for `(user, timestamp)`, creating it (and its
    /// owning user) on first reference.
    pub fn resolve_position(&mut self, user: &Address, timestamp: i64) -> Result<Resolved<StakePosition>> {
        let id = PositionId::new(user.clone(), timestamp);
        if let Some(position) = self.changes.positions.get(&id) {
            return Ok(Resolved {
                entity: position.clone(),
                created: false,
            });
        }
        if let Some(position) = self.store.load_position(&id)? {
            return Ok(Resolved {
                entity: position,
                created: false,
            });
        }

        // Owner must exist before a position references it
        self.resolve_user(user)?;

        log::debug!("Creating stake position {}", id);
        let position = StakePosition::new(id.clone());
        self.changes.positions.insert(id, position.clone());
        Ok(Resolved {
            entity: position,
            created: true,
        })
    }

    /// Resolve the rollup for the UTC day containing `timestamp`.
    pub fn resolve_daily_stat(&mut self, timestamp: i64) -> Result<DailyStat> {
        let day = bucket_for(timestamp);
        if let Some(stat) = self.changes.daily_stats.get(&day) {
            return Ok(stat.clone());
        }
        if let Some(stat) = self.store.load_daily_stat(day)? {
            return Ok(stat);
        }

        log::debug!("Creating daily stat for day {}", day);
        let stat = DailyStat::new(day, date_label(day));
        self.changes.daily_stats.insert(day, stat.clone());
        Ok(stat)
    }

    /// Stage `address` as a member of `(day, category)`.
    ///
    /// Returns false when it is already a member, either staged by this unit
    /// or committed earlier.
    pub fn admit_participant(&mut self, day: i64, category: ParticipantCategory, address: &Address) -> Result<bool> {
        let key = (day, category, address.clone());
        if self.changes.participants.contains(&key) {
            return Ok(false);
        }
        if self.store.is_participant(day, category, address)? {
            return Ok(false);
        }

        self.changes.participants.insert(key);
        Ok(true)
    }

    pub fn save_contract(&mut self, contract: Contract) {
        self.changes.contracts.insert(contract.id.clone(), contract);
    }

    pub fn save_user(&mut self, user: User) {
        self.changes.users.insert(user.id.clone(), user);
    }

    pub fn save_position(&mut self, position: StakePosition) {
        self.changes.positions.insert(position.id.clone(), position);
    }

    pub fn save_daily_stat(&mut self, stat: DailyStat) {
        self.changes.daily_stats.insert(stat.day, stat);
    }

    /// Stage an immutable event record.
    pub fn record(&mut self, record: EventRecord) {
        self.changes.records.push(record);
    }

    pub fn into_changes(self) -> ChangeSet {
        self.changes
    }
}
