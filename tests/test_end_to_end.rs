//! End-to-end aggregation scenarios against both store backends

use num_bigint::BigInt;
use num_traits::Zero;
use staking_indexer::indexer::types::{
    EmergencyWithdrawn, RewardRateUpdated, RewardsClaimed, Staked, StakingInitialized, TokenRecovered, Withdrawn,
};
use staking_indexer::indexer::{
    Address, EntityStore, EventEnvelope, EventPayload, MemoryStore, PositionId, SqliteEntityStore, StakingEvent,
    StakingIndexer,
};

fn addr(byte: u8) -> Address {
    Address::parse(&format!("0x{}", format!("{:02x}", byte).repeat(20))).unwrap()
}

fn contract() -> Address {
    addr(0xcc)
}

/// Builds events with increasing (block, log index) and unique tx hashes.
struct EventFeed {
    next: u32,
}

impl EventFeed {
    fn new() -> Self {
        Self { next: 0 }
    }

    fn at(&mut self, block_timestamp: i64, payload: EventPayload) -> StakingEvent {
        self.next += 1;
        StakingEvent {
            envelope: EventEnvelope {
                address: contract(),
                transaction_hash: format!("0x{:08x}", self.next),
                log_index: 0,
                block_number: self.next as u64,
                block_timestamp,
            },
            payload,
        }
    }
}

fn n(value: i64) -> BigInt {
    BigInt::from(value)
}

fn staked(user: Address, amount: i64, timestamp: i64, total: i64, rate: i64) -> EventPayload {
    EventPayload::Staked(Staked {
        user,
        amount: n(amount),
        timestamp,
        new_total_staked: n(total),
        current_reward_rate: n(rate),
    })
}

fn withdrawn(user: Address, amount: i64, timestamp: i64, total: i64, rate: i64, accrued: i64) -> EventPayload {
    EventPayload::Withdrawn(Withdrawn {
        user,
        amount: n(amount),
        timestamp,
        new_total_staked: n(total),
        current_reward_rate: n(rate),
        rewards_accrued: n(accrued),
    })
}

fn run_reference_scenario<S: EntityStore>(store: S) -> StakingIndexer<S> {
    let user = addr(0xa1);
    let mut feed = EventFeed::new();
    let events = vec![
        feed.at(
            0,
            EventPayload::StakingInitialized(StakingInitialized {
                staking_token: addr(0x70),
                initial_reward_rate: n(5),
                timestamp: 0,
            }),
        ),
        feed.at(10, staked(user.clone(), 100, 10, 100, 5)),
        feed.at(
            20,
            EventPayload::RewardRateUpdated(RewardRateUpdated {
                old_rate: n(5),
                new_rate: n(4),
                timestamp: 20,
                total_staked: n(100),
            }),
        ),
        feed.at(25, withdrawn(user.clone(), 40, 10, 60, 4, 2)),
        feed.at(
            30,
            EventPayload::RewardsClaimed(RewardsClaimed {
                user: user.clone(),
                amount: n(2),
                timestamp: 30,
                new_pending_rewards: n(0),
                total_staked: n(60),
            }),
        ),
    ];

    let mut indexer = StakingIndexer::new_with_timestamp_fn(store, Box::new(|| 1_000_000));
    for event in &events {
        indexer.process_event(event).unwrap();
    }
    indexer
}

fn assert_reference_outcome<S: EntityStore>(store: &S) {
    let user_id = addr(0xa1);

    let contract = store.load_contract(&contract()).unwrap().unwrap();
    assert_eq!(contract.total_staked, n(60));
    assert_eq!(contract.current_reward_rate, n(4));
    assert_eq!(contract.initial_apr, n(5));
    assert_eq!(contract.staking_token, addr(0x70));
    assert_eq!(contract.total_users, 1);
    assert_eq!(contract.total_rewards_distributed, n(2));
    assert_eq!(contract.last_update_timestamp, 30);

    let user = store.load_user(&user_id).unwrap().unwrap();
    assert_eq!(user.staked_amount, n(60));
    assert_eq!(user.total_staked, n(100));
    assert_eq!(user.total_withdrawn, n(40));
    assert_eq!(user.total_rewards_claimed, n(2));
    assert_eq!(user.stake_count, 1);
    assert_eq!(user.withdrawal_count, 1);
    assert_eq!(user.rewards_claim_count, 1);
    assert_eq!(user.first_staked_at, 10);
    assert_eq!(user.last_action_at, 30);

    let position = store.load_position(&PositionId::new(user_id.clone(), 10)).unwrap().unwrap();
    assert_eq!(position.amount, n(100));
    assert_eq!(position.withdrawn_amount, n(40));
    assert!(position.is_active);

    let day = store.load_daily_stat(0).unwrap().unwrap();
    assert_eq!(day.date, "1970-01-01");
    assert_eq!(day.daily_staked_amount, n(100));
    assert_eq!(day.daily_withdrawn_amount, n(40));
    assert_eq!(day.daily_rewards_claimed, n(2));
    assert_eq!(day.unique_stakers, 1);
    assert_eq!(day.unique_withdrawers, 1);
    assert_eq!(day.unique_reward_claimers, 1);
    assert_eq!(day.end_of_day_total_staked, n(60));
    assert_eq!(day.end_of_day_reward_rate, n(4));
}

#[test]
fn test_reference_scenario_memory() {
    let indexer = run_reference_scenario(MemoryStore::new());
    assert_reference_outcome(indexer.store());
    assert_eq!(indexer.store().record_count(), 5);
    assert_eq!(indexer.stats().events_applied, 5);
}

#[test]
fn test_reference_scenario_sqlite() {
    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir.path().join("staking.db");

    let indexer = run_reference_scenario(SqliteEntityStore::new(&db_path).unwrap());
    assert_reference_outcome(indexer.store());
    drop(indexer);

    // State survives reopening the database
    let reopened = SqliteEntityStore::new(&db_path).unwrap();
    assert_reference_outcome(&reopened);
    assert_eq!(reopened.record_count().unwrap(), 5);
}

#[test]
fn test_repeated_stakes_sum_and_count_user_once() {
    let user = addr(0xa2);
    let mut feed = EventFeed::new();
    let mut indexer = StakingIndexer::new(MemoryStore::new());

    let amounts = [5, 17, 250, 1];
    let mut total = 0;
    for (i, amount) in amounts.iter().enumerate() {
        total += amount;
        let ts = 100 + i as i64 * 1000;
        indexer
            .process_event(&feed.at(ts, staked(user.clone(), *amount, ts, total, 5)))
            .unwrap();
    }

    let stored = indexer.store().load_user(&user).unwrap().unwrap();
    assert_eq!(stored.staked_amount, n(total));
    assert_eq!(stored.stake_count, amounts.len() as u64);

    let contract = indexer.store().load_contract(&contract()).unwrap().unwrap();
    assert_eq!(contract.total_users, 1);
    assert_eq!(indexer.store().positions_for(&user).len(), amounts.len());
}

#[test]
fn test_full_withdrawal_at_stake_timestamp_closes_position() {
    let user = addr(0xa3);
    let mut feed = EventFeed::new();
    let mut indexer = StakingIndexer::new(MemoryStore::new());

    indexer.process_event(&feed.at(1000, staked(user.clone(), 100, 1000, 100, 5))).unwrap();
    indexer
        .process_event(&feed.at(1000, withdrawn(user.clone(), 100, 1000, 0, 5, 0)))
        .unwrap();

    let position = indexer
        .store()
        .load_position(&PositionId::new(user, 1000))
        .unwrap()
        .unwrap();
    assert!(!position.is_active);
    assert_eq!(position.withdrawn_amount, position.amount);
}

#[test]
fn test_withdrawal_without_stake_creates_overdrawn_position() {
    let user = addr(0xa4);
    let mut feed = EventFeed::new();
    let mut indexer = StakingIndexer::new(SqliteEntityStore::in_memory().unwrap());

    indexer.process_event(&feed.at(1000, staked(user.clone(), 50, 1000, 50, 5))).unwrap();
    indexer
        .process_event(&feed.at(2000, withdrawn(user.clone(), 30, 1500, 20, 5, 0)))
        .unwrap();

    let phantom = indexer
        .store()
        .load_position(&PositionId::new(user.clone(), 1500))
        .unwrap()
        .unwrap();
    assert!(phantom.amount.is_zero());
    assert_eq!(phantom.withdrawn_amount, n(30));

    // The real stake is untouched
    let staked_position = indexer
        .store()
        .load_position(&PositionId::new(user.clone(), 1000))
        .unwrap()
        .unwrap();
    assert!(staked_position.withdrawn_amount.is_zero());

    let stored = indexer.store().load_user(&user).unwrap().unwrap();
    assert_eq!(stored.staked_amount, n(20));
}

#[test]
fn test_withdrawal_before_any_stake_goes_negative() {
    let user = addr(0xa5);
    let mut feed = EventFeed::new();
    let mut indexer = StakingIndexer::new(MemoryStore::new());

    indexer.process_event(&feed.at(500, withdrawn(user.clone(), 30, 500, 0, 5, 0))).unwrap();

    let stored = indexer.store().load_user(&user).unwrap().unwrap();
    assert_eq!(stored.staked_amount, n(-30));
    assert!(!stored.has_staked());
}

#[test]
fn test_same_day_participants_counted_once() {
    let user = addr(0xa6);
    let other = addr(0xa7);
    let mut feed = EventFeed::new();
    let mut indexer = StakingIndexer::new(MemoryStore::new());

    let day = 19_000 * 86_400;
    indexer.process_event(&feed.at(day + 10, staked(user.clone(), 1, day + 10, 1, 5))).unwrap();
    indexer.process_event(&feed.at(day + 20, staked(user.clone(), 1, day + 20, 2, 5))).unwrap();
    indexer.process_event(&feed.at(day + 30, staked(other.clone(), 1, day + 30, 3, 5))).unwrap();
    // Next day starts a fresh set
    indexer
        .process_event(&feed.at(day + 86_400, staked(user.clone(), 1, day + 86_400, 4, 5)))
        .unwrap();

    let first = indexer.store().load_daily_stat(day).unwrap().unwrap();
    assert_eq!(first.unique_stakers, 2);
    assert_eq!(first.daily_staked_amount, n(3));

    let second = indexer.store().load_daily_stat(day + 86_400).unwrap().unwrap();
    assert_eq!(second.unique_stakers, 1);
}

#[test]
fn test_daily_membership_survives_reopening_sqlite() {
    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir.path().join("staking.db");
    let user = addr(0xa8);
    let day = 19_100 * 86_400;
    let mut feed = EventFeed::new();
    let first = feed.at(day + 10, staked(user.clone(), 1, day + 10, 1, 5));
    let second = feed.at(day + 20, staked(user.clone(), 1, day + 20, 2, 5));

    {
        let mut indexer = StakingIndexer::new(SqliteEntityStore::new(&db_path).unwrap());
        indexer.process_event(&first).unwrap();
    }

    let mut indexer = StakingIndexer::new(SqliteEntityStore::new(&db_path).unwrap());
    indexer.process_event(&second).unwrap();

    let stat = indexer.store().load_daily_stat(day).unwrap().unwrap();
    assert_eq!(stat.unique_stakers, 1);
    assert_eq!(stat.daily_staked_amount, n(2));
}

#[test]
fn test_emergency_withdrawal_zeroes_balance_and_pending() {
    let user = addr(0xa8);
    let mut feed = EventFeed::new();
    let mut indexer = StakingIndexer::new(SqliteEntityStore::in_memory().unwrap());

    indexer.process_event(&feed.at(100, staked(user.clone(), 80, 100, 80, 5))).unwrap();
    indexer
        .process_event(&feed.at(
            200,
            EventPayload::RewardsClaimed(RewardsClaimed {
                user: user.clone(),
                amount: n(1),
                timestamp: 200,
                new_pending_rewards: n(9),
                total_staked: n(80),
            }),
        ))
        .unwrap();
    indexer
        .process_event(&feed.at(
            300,
            EventPayload::EmergencyWithdrawn(EmergencyWithdrawn {
                user: user.clone(),
                amount: n(72),
                penalty: n(8),
                timestamp: 300,
                new_total_staked: n(0),
            }),
        ))
        .unwrap();

    let stored = indexer.store().load_user(&user).unwrap().unwrap();
    assert!(stored.staked_amount.is_zero());
    assert!(stored.pending_rewards.is_zero());
    assert_eq!(stored.total_withdrawn, n(72));

    let position = indexer
        .store()
        .load_position(&PositionId::new(user, 100))
        .unwrap()
        .unwrap();
    assert!(position.is_active);
    assert_eq!(position.amount, n(80));
}

#[test]
fn test_reapplied_event_rejected_on_both_stores() {
    fn check<S: EntityStore>(store: S) {
        let user = addr(0xa9);
        let mut feed = EventFeed::new();
        let mut indexer = StakingIndexer::new(store);
        let event = feed.at(100, staked(user.clone(), 10, 100, 10, 5));

        indexer.process_event(&event).unwrap();
        let err = indexer.process_event(&event).unwrap_err();
        assert!(err.is_duplicate());

        let stored = indexer.store().load_user(&user).unwrap().unwrap();
        assert_eq!(stored.staked_amount, n(10));
        assert_eq!(stored.stake_count, 1);
        let contract = indexer.store().load_contract(&contract()).unwrap().unwrap();
        assert_eq!(contract.total_users, 1);
    }

    check(MemoryStore::new());
    check(SqliteEntityStore::in_memory().unwrap());
}

#[test]
fn test_token_recovered_is_recorded_only() {
    let mut feed = EventFeed::new();
    let mut indexer = StakingIndexer::new(MemoryStore::new());
    let event = feed.at(
        100,
        EventPayload::TokenRecovered(TokenRecovered {
            token: addr(0x77),
            amount: n(12),
            timestamp: 100,
        }),
    );

    let id = indexer.process_event(&event).unwrap();

    let record = indexer.store().load_record(&id).unwrap().unwrap();
    assert_eq!(record.kind(), "TokenRecovered");
    assert_eq!(record.block_timestamp, 100);
    assert!(indexer.store().load_contract(&contract()).unwrap().is_none());
}

#[test]
fn test_pause_cycle_toggles_flag() {
    let mut feed = EventFeed::new();
    let mut indexer = StakingIndexer::new(SqliteEntityStore::in_memory().unwrap());

    indexer
        .process_event(&feed.at(100, EventPayload::StakingPaused { timestamp: 100 }))
        .unwrap();
    assert!(indexer.store().load_contract(&contract()).unwrap().unwrap().paused);

    indexer
        .process_event(&feed.at(200, EventPayload::StakingUnpaused { timestamp: 200 }))
        .unwrap();
    let stored = indexer.store().load_contract(&contract()).unwrap().unwrap();
    assert!(!stored.paused);
    assert_eq!(stored.last_update_timestamp, 0);
}
