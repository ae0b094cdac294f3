//! SQLite entity store
//!
//! Tables:
//! - `contracts`, `users`, `stake_positions`, `daily_stats` - UPSERT on natural key
//! - `daily_participants` - insert-only membership per (day, category, address),
//!   queried by point lookup
//! - `event_records` - INSERT OR IGNORE; an ignored insert is a duplicate
//!
//! Amount columns are decimal TEXT so precision is never lost.

use super::amount::{parse_amount, Amount};
use super::entities::{Contract, DailyStat, ParticipantCategory, PositionId, StakePosition, User};
use super::records::{EventRecord, RecordId};
use super::store::{ChangeSet, EntityStore};
use super::types::{Address, EventPayload};
use crate::error::{IndexerError, Result};
use crate::sqlite_pragma::apply_optimized_pragmas;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use std::path::Path;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS contracts (
    id                          TEXT PRIMARY KEY,
    staking_token               TEXT NOT NULL,
    initial_apr                 TEXT NOT NULL,
    min_lock_duration           INTEGER NOT NULL,
    apr_reduction_per_thousand  TEXT NOT NULL,
    emergency_withdraw_penalty  TEXT NOT NULL,
    total_staked                TEXT NOT NULL,
    current_reward_rate         TEXT NOT NULL,
    last_update_timestamp       INTEGER NOT NULL,
    total_users                 INTEGER NOT NULL,
    paused                      INTEGER NOT NULL,
    owner                       TEXT NOT NULL,
    total_rewards_distributed   TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS users (
    id                      TEXT PRIMARY KEY,
    staked_amount           TEXT NOT NULL,
    total_staked            TEXT NOT NULL,
    total_withdrawn         TEXT NOT NULL,
    total_rewards_claimed   TEXT NOT NULL,
    last_stake_timestamp    INTEGER NOT NULL,
    stake_count             INTEGER NOT NULL,
    withdrawal_count        INTEGER NOT NULL,
    rewards_claim_count     INTEGER NOT NULL,
    pending_rewards         TEXT NOT NULL,
    can_withdraw            INTEGER NOT NULL,
    first_staked_at         INTEGER NOT NULL,
    last_action_at          INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS stake_positions (
    id                      TEXT PRIMARY KEY,
    user                    TEXT NOT NULL,
    amount                  TEXT NOT NULL,
    timestamp               INTEGER NOT NULL,
    last_update_timestamp   INTEGER NOT NULL,
    unlock_time             INTEGER NOT NULL,
    is_active               INTEGER NOT NULL,
    withdrawn_amount        TEXT NOT NULL,
    rewards_claimed         TEXT NOT NULL,
    pending_rewards         TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_positions_user ON stake_positions(user, timestamp);

CREATE TABLE IF NOT EXISTS daily_stats (
    day                     INTEGER PRIMARY KEY,
    date                    TEXT NOT NULL,
    daily_staked_amount     TEXT NOT NULL,
    daily_withdrawn_amount  TEXT NOT NULL,
    daily_rewards_claimed   TEXT NOT NULL,
    unique_stakers          INTEGER NOT NULL,
    unique_withdrawers      INTEGER NOT NULL,
    unique_reward_claimers  INTEGER NOT NULL,
    end_of_day_total_staked TEXT NOT NULL,
    end_of_day_reward_rate  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS daily_participants (
    day         INTEGER NOT NULL,
    category    TEXT NOT NULL,
    address     TEXT NOT NULL,
    PRIMARY KEY (day, category, address)
);

CREATE TABLE IF NOT EXISTS event_records (
    id                  TEXT PRIMARY KEY,
    kind                TEXT NOT NULL,
    contract            TEXT NOT NULL,
    block_number        INTEGER NOT NULL,
    block_timestamp     INTEGER NOT NULL,
    transaction_hash    TEXT NOT NULL,
    staker              TEXT,
    position_user       TEXT,
    position_timestamp  INTEGER,
    payload_json        TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_records_kind ON event_records(kind, block_number);
CREATE INDEX IF NOT EXISTS idx_records_staker ON event_records(staker, block_number);
"#;

pub struct SqliteEntityStore {
    conn: Connection,
}

impl SqliteEntityStore {
    /// Open (or create) the database file and ensure the schema exists.
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        if let Some(parent) = db_path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(db_path.as_ref())?;
        apply_optimized_pragmas(&conn)?;
        conn.execute_batch(SCHEMA)?;

        log::info!("✅ SQLite entity store initialized: {}", db_path.as_ref().display());
        Ok(Self { conn })
    }

    /// Store backed by a private in-memory database.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    pub fn record_count(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM event_records", [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }

    pub fn positions_for(&self, user: &Address) -> Result<Vec<StakePosition>> {
        let mut stmt = self.conn.prepare(
            "SELECT user, amount, timestamp, last_update_timestamp, unlock_time, is_active,
                    withdrawn_amount, rewards_claimed, pending_rewards
             FROM stake_positions WHERE user = ?1 ORDER BY timestamp",
        )?;
        let rows = stmt.query_map(params![user.as_str()], position_from_row)?;

        let mut positions = Vec::new();
        for position in rows {
            positions.push(position?);
        }
        Ok(positions)
    }

    fn insert_record(tx: &Transaction<'_>, record: &EventRecord) -> Result<()> {
        let payload_json = serde_json::to_string(&record.payload)?;
        let inserted = tx.execute(
            "INSERT OR IGNORE INTO event_records
             (id, kind, contract, block_number, block_timestamp, transaction_hash,
              staker, position_user, position_timestamp, payload_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                record.id.as_str(),
                record.kind(),
                record.contract.as_str(),
                sql_int("event_records.block_number", record.block_number)?,
                record.block_timestamp,
                record.transaction_hash,
                record.staker.as_ref().map(|s| s.as_str()),
                record.position.as_ref().map(|p| p.user.as_str()),
                record.position.as_ref().map(|p| p.timestamp),
                payload_json,
            ],
        )?;

        if inserted == 0 {
            return Err(IndexerError::DuplicateRecord {
                kind: record.kind(),
                id: record.id.to_string(),
            });
        }
        Ok(())
    }

    fn upsert_contract(tx: &Transaction<'_>, c: &Contract) -> Result<()> {
        tx.execute(
            r#"
            INSERT INTO contracts (
                id, staking_token, initial_apr, min_lock_duration, apr_reduction_per_thousand,
                emergency_withdraw_penalty, total_staked, current_reward_rate,
                last_update_timestamp, total_users, paused, owner, total_rewards_distributed
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            ON CONFLICT(id) DO UPDATE SET
                staking_token = excluded.staking_token,
                initial_apr = excluded.initial_apr,
                min_lock_duration = excluded.min_lock_duration,
                apr_reduction_per_thousand = excluded.apr_reduction_per_thousand,
                emergency_withdraw_penalty = excluded.emergency_withdraw_penalty,
                total_staked = excluded.total_staked,
                current_reward_rate = excluded.current_reward_rate,
                last_update_timestamp = excluded.last_update_timestamp,
                total_users = excluded.total_users,
                paused = excluded.paused,
                owner = excluded.owner,
                total_rewards_distributed = excluded.total_rewards_distributed
            "#,
            params![
                c.id.as_str(),
                c.staking_token.as_str(),
                c.initial_apr.to_string(),
                c.min_lock_duration,
                c.apr_reduction_per_thousand.to_string(),
                c.emergency_withdraw_penalty.to_string(),
                c.total_staked.to_string(),
                c.current_reward_rate.to_string(),
                c.last_update_timestamp,
                sql_int("contracts.total_users", c.total_users)?,
                c.paused,
                c.owner.as_str(),
                c.total_rewards_distributed.to_string(),
            ],
        )?;
        Ok(())
    }

    fn upsert_user(tx: &Transaction<'_>, u: &User) -> Result<()> {
        tx.execute(
            r#"
            INSERT INTO users (
                id, staked_amount, total_staked, total_withdrawn, total_rewards_claimed,
                last_stake_timestamp, stake_count, withdrawal_count, rewards_claim_count,
                pending_rewards, can_withdraw, first_staked_at, last_action_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            ON CONFLICT(id) DO UPDATE SET
                staked_amount = excluded.staked_amount,
                total_staked = excluded.total_staked,
                total_withdrawn = excluded.total_withdrawn,
                total_rewards_claimed = excluded.total_rewards_claimed,
                last_stake_timestamp = excluded.last_stake_timestamp,
                stake_count = excluded.stake_count,
                withdrawal_count = excluded.withdrawal_count,
                rewards_claim_count = excluded.rewards_claim_count,
                pending_rewards = excluded.pending_rewards,
                can_withdraw = excluded.can_withdraw,
                first_staked_at = excluded.first_staked_at,
                last_action_at = excluded.last_action_at
            "#,
            params![
                u.id.as_str(),
                u.staked_amount.to_string(),
                u.total_staked.to_string(),
                u.total_withdrawn.to_string(),
                u.total_rewards_claimed.to_string(),
                u.last_stake_timestamp,
                sql_int("users.stake_count", u.stake_count)?,
                sql_int("users.withdrawal_count", u.withdrawal_count)?,
                sql_int("users.rewards_claim_count", u.rewards_claim_count)?,
                u.pending_rewards.to_string(),
                u.can_withdraw,
                u.first_staked_at,
                u.last_action_at,
            ],
        )?;
        Ok(())
    }

    fn upsert_position(tx: &Transaction<'_>, p: &StakePosition) -> Result<()> {
        tx.execute(
            r#"
            INSERT INTO stake_positions (
                id, user, amount, timestamp, last_update_timestamp, unlock_time,
                is_active, withdrawn_amount, rewards_claimed, pending_rewards
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(id) DO UPDATE SET
                amount = excluded.amount,
                last_update_timestamp = excluded.last_update_timestamp,
                unlock_time = excluded.unlock_time,
                is_active = excluded.is_active,
                withdrawn_amount = excluded.withdrawn_amount,
                rewards_claimed = excluded.rewards_claimed,
                pending_rewards = excluded.pending_rewards
            "#,
            params![
                p.id.to_string(),
                p.user().as_str(),
                p.amount.to_string(),
                p.timestamp,
                p.last_update_timestamp,
                p.unlock_time,
                p.is_active,
                p.withdrawn_amount.to_string(),
                p.rewards_claimed.to_string(),
                p.pending_rewards.to_string(),
            ],
        )?;
        Ok(())
    }

    fn upsert_daily_stat(tx: &Transaction<'_>, d: &DailyStat) -> Result<()> {
        tx.execute(
            r#"
            INSERT INTO daily_stats (
                day, date, daily_staked_amount, daily_withdrawn_amount, daily_rewards_claimed,
                unique_stakers, unique_withdrawers, unique_reward_claimers,
                end_of_day_total_staked, end_of_day_reward_rate
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(day) DO UPDATE SET
                daily_staked_amount = excluded.daily_staked_amount,
                daily_withdrawn_amount = excluded.daily_withdrawn_amount,
                daily_rewards_claimed = excluded.daily_rewards_claimed,
                unique_stakers = excluded.unique_stakers,
                unique_withdrawers = excluded.unique_withdrawers,
                unique_reward_claimers = excluded.unique_reward_claimers,
                end_of_day_total_staked = excluded.end_of_day_total_staked,
                end_of_day_reward_rate = excluded.end_of_day_reward_rate
            "#,
            params![
                d.day,
                d.date,
                d.daily_staked_amount.to_string(),
                d.daily_withdrawn_amount.to_string(),
                d.daily_rewards_claimed.to_string(),
                sql_int("daily_stats.unique_stakers", d.unique_stakers)?,
                sql_int("daily_stats.unique_withdrawers", d.unique_withdrawers)?,
                sql_int("daily_stats.unique_reward_claimers", d.unique_reward_claimers)?,
                d.end_of_day_total_staked.to_string(),
                d.end_of_day_reward_rate.to_string(),
            ],
        )?;
        Ok(())
    }

    fn insert_participant(
        tx: &Transaction<'_>,
        day: i64,
        category: ParticipantCategory,
        address: &Address,
    ) -> Result<()> {
        let mut stmt = tx.prepare_cached(
            "INSERT OR IGNORE INTO daily_participants (day, category, address) VALUES (?1, ?2, ?3)",
        )?;
        stmt.execute(params![day, category.as_str(), address.as_str()])?;
        Ok(())
    }
}

impl EntityStore for SqliteEntityStore {
    fn load_contract(&self, id: &Address) -> Result<Option<Contract>> {
        let contract = self
            .conn
            .query_row(
                "SELECT id, staking_token, initial_apr, min_lock_duration, apr_reduction_per_thousand,
                        emergency_withdraw_penalty, total_staked, current_reward_rate,
                        last_update_timestamp, total_users, paused, owner, total_rewards_distributed
                 FROM contracts WHERE id = ?1",
                params![id.as_str()],
                |row| {
                    Ok(Contract {
                        id: get_address(row, 0)?,
                        staking_token: get_address(row, 1)?,
                        initial_apr: get_amount(row, 2)?,
                        min_lock_duration: row.get(3)?,
                        apr_reduction_per_thousand: get_amount(row, 4)?,
                        emergency_withdraw_penalty: get_amount(row, 5)?,
                        total_staked: get_amount(row, 6)?,
                        current_reward_rate: get_amount(row, 7)?,
                        last_update_timestamp: row.get(8)?,
                        total_users: get_count(row, 9)?,
                        paused: row.get(10)?,
                        owner: get_address(row, 11)?,
                        total_rewards_distributed: get_amount(row, 12)?,
                    })
                },
            )
            .optional()?;
        Ok(contract)
    }

    fn load_user(&self, id: &Address) -> Result<Option<User>> {
        let user = self
            .conn
            .query_row(
                "SELECT id, staked_amount, total_staked, total_withdrawn, total_rewards_claimed,
                        last_stake_timestamp, stake_count, withdrawal_count, rewards_claim_count,
                        pending_rewards, can_withdraw, first_staked_at, last_action_at
                 FROM users WHERE id = ?1",
                params![id.as_str()],
                |row| {
                    Ok(User {
                        id: get_address(row, 0)?,
                        staked_amount: get_amount(row, 1)?,
                        total_staked: get_amount(row, 2)?,
                        total_withdrawn: get_amount(row, 3)?,
                        total_rewards_claimed: get_amount(row, 4)?,
                        last_stake_timestamp: row.get(5)?,
                        stake_count: get_count(row, 6)?,
                        withdrawal_count: get_count(row, 7)?,
                        rewards_claim_count: get_count(row, 8)?,
                        pending_rewards: get_amount(row, 9)?,
                        can_withdraw: row.get(10)?,
                        first_staked_at: row.get(11)?,
                        last_action_at: row.get(12)?,
                    })
                },
            )
            .optional()?;
        Ok(user)
    }

    fn load_position(&self, id: &PositionId) -> Result<Option<StakePosition>> {
        let position = self
            .conn
            .query_row(
                "SELECT user, amount, timestamp, last_update_timestamp, unlock_time, is_active,
                        withdrawn_amount, rewards_claimed, pending_rewards
                 FROM stake_positions WHERE id = ?1",
                params![id.to_string()],
                position_from_row,
            )
            .optional()?;
        Ok(position)
    }

    fn load_daily_stat(&self, day: i64) -> Result<Option<DailyStat>> {
        let stat = self
            .conn
            .query_row(
                "SELECT date, daily_staked_amount, daily_withdrawn_amount, daily_rewards_claimed,
                        unique_stakers, unique_withdrawers, unique_reward_claimers,
                        end_of_day_total_staked, end_of_day_reward_rate
                 FROM daily_stats WHERE day = ?1",
                params![day],
                |row| {
                    let mut stat = DailyStat::new(day, row.get(0)?);
                    stat.daily_staked_amount = get_amount(row, 1)?;
                    stat.daily_withdrawn_amount = get_amount(row, 2)?;
                    stat.daily_rewards_claimed = get_amount(row, 3)?;
                    stat.unique_stakers = get_count(row, 4)?;
                    stat.unique_withdrawers = get_count(row, 5)?;
                    stat.unique_reward_claimers = get_count(row, 6)?;
                    stat.end_of_day_total_staked = get_amount(row, 7)?;
                    stat.end_of_day_reward_rate = get_amount(row, 8)?;
                    Ok(stat)
                },
            )
            .optional()?;

        Ok(stat)
    }

    fn load_record(&self, id: &RecordId) -> Result<Option<EventRecord>> {
        let row = self
            .conn
            .query_row(
                "SELECT contract, block_number, block_timestamp, transaction_hash,
                        staker, position_user, position_timestamp, payload_json
                 FROM event_records WHERE id = ?1",
                params![id.as_str()],
                |row| {
                    let staker: Option<String> = row.get(4)?;
                    let position_user: Option<String> = row.get(5)?;
                    let position_timestamp: Option<i64> = row.get(6)?;
                    Ok((
                        get_address(row, 0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, String>(3)?,
                        staker,
                        position_user.zip(position_timestamp),
                        row.get::<_, String>(7)?,
                    ))
                },
            )
            .optional()?;

        let Some((contract, block_number, block_timestamp, transaction_hash, staker, position, payload_json)) = row
        else {
            return Ok(None);
        };

        let payload: EventPayload = serde_json::from_str(&payload_json)?;
        let block_number = u64::try_from(block_number).map_err(|_| IndexerError::OutOfRange {
            column: "event_records.block_number",
            value: block_number.to_string(),
        })?;
        let staker = staker.map(|s| Address::parse(&s)).transpose()?;
        let position = match position {
            Some((user, timestamp)) => Some(PositionId::new(Address::parse(&user)?, timestamp)),
            None => None,
        };

        Ok(Some(EventRecord {
            id: id.clone(),
            contract,
            block_number,
            block_timestamp,
            transaction_hash,
            staker,
            position,
            payload,
        }))
    }

    fn record_exists(&self, id: &RecordId) -> Result<bool> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT 1 FROM event_records WHERE id = ?1")?;
        Ok(stmt.exists(params![id.as_str()])?)
    }

    fn is_participant(&self, day: i64, category: ParticipantCategory, address: &Address) -> Result<bool> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT 1 FROM daily_participants WHERE day = ?1 AND category = ?2 AND address = ?3",
        )?;
        Ok(stmt.exists(params![day, category.as_str(), address.as_str()])?)
    }

    fn commit(&mut self, changes: ChangeSet) -> Result<()> {
        let tx = self.conn.transaction()?;

        // Records first: a duplicate aborts before any aggregate is touched,
        // and dropping the transaction rolls back whatever was written.
        for record in &changes.records {
            Self::insert_record(&tx, record)?;
        }
        for contract in changes.contracts.values() {
            Self::upsert_contract(&tx, contract)?;
        }
        for user in changes.users.values() {
            Self::upsert_user(&tx, user)?;
        }
        for position in changes.positions.values() {
            Self::upsert_position(&tx, position)?;
        }
        for stat in changes.daily_stats.values() {
            Self::upsert_daily_stat(&tx, stat)?;
        }
        for (day, category, address) in &changes.participants {
            Self::insert_participant(&tx, *day, *category, address)?;
        }

        tx.commit()?;
        log::debug!("✅ Committed {} writes to SQLite", changes.write_count());
        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "SQLite"
    }
}

fn sql_int(column: &'static str, value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| IndexerError::OutOfRange {
        column,
        value: value.to_string(),
    })
}

fn conversion_error(idx: usize, err: IndexerError) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn get_amount(row: &Row<'_>, idx: usize) -> rusqlite::Result<Amount> {
    let raw: String = row.get(idx)?;
    parse_amount(&raw).map_err(|e| conversion_error(idx, e))
}

fn get_address(row: &Row<'_>, idx: usize) -> rusqlite::Result<Address> {
    let raw: String = row.get(idx)?;
    Address::parse(&raw).map_err(|e| conversion_error(idx, e))
}

fn get_count(row: &Row<'_>, idx: usize) -> rusqlite::Result<u64> {
    let raw: i64 = row.get(idx)?;
    u64::try_from(raw).map_err(|_| {
        conversion_error(
            idx,
            IndexerError::CorruptValue {
                column: "count",
                value: raw.to_string(),
            },
        )
    })
}

fn position_from_row(row: &Row<'_>) -> rusqlite::Result<StakePosition> {
    let user = get_address(row, 0)?;
    let timestamp: i64 = row.get(2)?;
    let mut position = StakePosition::new(PositionId::new(user, timestamp));
    position.amount = get_amount(row, 1)?;
    position.last_update_timestamp = row.get(3)?;
    position.unlock_time = row.get(4)?;
    position.is_active = row.get(5)?;
    position.withdrawn_amount = get_amount(row, 6)?;
    position.rewards_claimed = get_amount(row, 7)?;
    position.pending_rewards = get_amount(row, 8)?;
    Ok(position)
}
