//! Event handlers
//!
//! One transition per event kind. Every handler resolves the aggregates it
//! touches through the repository, stages the updated versions, and stages
//! exactly one immutable `EventRecord`. Nothing is written until the engine
//! commits the unit of work.
//!
//! Contract-level totals (`total_staked`, `current_reward_rate`) are taken
//! verbatim from the event rather than accumulated, so the contract summary
//! tracks on-chain state even if the indexer missed earlier events. User and
//! daily amounts are accumulated.

use super::daily::record_participant;
use super::eligibility::refresh_can_withdraw;
use super::entities::ParticipantCategory;
use super::positions::{apply_withdrawal, open_or_accumulate};
use super::records::{EventRecord, RecordId};
use super::repository::Repository;
use super::store::EntityStore;
use super::types::{
    EmergencyWithdrawn, EventEnvelope, EventPayload, RewardRateUpdated, RewardsClaimed, Staked, StakingEvent,
    StakingInitialized, TokenRecovered, Withdrawn,
};
use crate::error::Result;

/// Per-event inputs shared by all handlers
#[derive(Debug, Clone)]
pub struct EventContext<'e> {
    pub envelope: &'e EventEnvelope,
    pub record_id: RecordId,
    /// Time `can_withdraw` is evaluated against
    pub reference_time: i64,
}

impl<'e> EventContext<'e> {
    fn block_time(&self) -> i64 {
        self.envelope.block_timestamp
    }

    fn record(&self, payload: EventPayload) -> EventRecord {
        EventRecord::new(self.record_id.clone(), self.envelope, payload)
    }
}

/// Dispatch an event to its handler.
pub fn apply<S: EntityStore + ?Sized>(
    repo: &mut Repository<'_, S>,
    ctx: &EventContext<'_>,
    event: &StakingEvent,
) -> Result<()> {
    match &event.payload {
        EventPayload::Staked(e) => handle_staked(repo, ctx, e),
        EventPayload::Withdrawn(e) => handle_withdrawn(repo, ctx, e),
        EventPayload::RewardsClaimed(e) => handle_rewards_claimed(repo, ctx, e),
        EventPayload::EmergencyWithdrawn(e) => handle_emergency_withdrawn(repo, ctx, e),
        EventPayload::RewardRateUpdated(e) => handle_reward_rate_updated(repo, ctx, e),
        EventPayload::StakingInitialized(e) => handle_staking_initialized(repo, ctx, e),
        EventPayload::StakingPaused { timestamp } => handle_pause_change(repo, ctx, true, *timestamp),
        EventPayload::StakingUnpaused { timestamp } => handle_pause_change(repo, ctx, false, *timestamp),
        EventPayload::TokenRecovered(e) => handle_token_recovered(repo, ctx, e),
    }
}

pub fn handle_staked<S: EntityStore + ?Sized>(
    repo: &mut Repository<'_, S>,
    ctx: &EventContext<'_>,
    event: &Staked,
) -> Result<()> {
    let block_time = ctx.block_time();

    let mut contract = repo.resolve_contract(&ctx.envelope.address)?;
    contract.total_staked = event.new_total_staked.clone();
    contract.current_reward_rate = event.current_reward_rate.clone();
    contract.last_update_timestamp = block_time;

    let mut user = repo.resolve_user(&event.user)?;
    if !user.has_staked() {
        contract.total_users = contract.total_users.saturating_add(1);
        user.first_staked_at = block_time;
    }
    user.staked_amount += &event.amount;
    user.total_staked += &event.amount;
    user.last_stake_timestamp = event.timestamp;
    user.stake_count = user.stake_count.saturating_add(1);
    user.last_action_at = block_time;

    let position = open_or_accumulate(
        repo,
        &event.user,
        event.timestamp,
        &event.amount,
        contract.min_lock_duration,
        block_time,
    )?;

    let mut daily = repo.resolve_daily_stat(block_time)?;
    daily.daily_staked_amount += &event.amount;
    daily.end_of_day_total_staked = event.new_total_staked.clone();
    daily.end_of_day_reward_rate = event.current_reward_rate.clone();
    record_participant(repo, &mut daily, ParticipantCategory::Staker, &event.user)?;

    repo.save_contract(contract);
    repo.save_user(user);
    repo.save_daily_stat(daily);
    repo.record(
        ctx.record(EventPayload::Staked(event.clone()))
            .with_staker(event.user.clone())
            .with_position(position.id),
    );
    Ok(())
}

pub fn handle_withdrawn<S: EntityStore + ?Sized>(
    repo: &mut Repository<'_, S>,
    ctx: &EventContext<'_>,
    event: &Withdrawn,
) -> Result<()> {
    let block_time = ctx.block_time();

    let mut contract = repo.resolve_contract(&ctx.envelope.address)?;
    contract.total_staked = event.new_total_staked.clone();
    contract.current_reward_rate = event.current_reward_rate.clone();
    contract.last_update_timestamp = block_time;

    let mut user = repo.resolve_user(&event.user)?;
    user.staked_amount -= &event.amount;
    user.total_withdrawn += &event.amount;
    user.withdrawal_count = user.withdrawal_count.saturating_add(1);
    user.last_action_at = block_time;
    refresh_can_withdraw(&mut user, contract.min_lock_duration, ctx.reference_time);

    let position = apply_withdrawal(repo, &event.user, event.timestamp, &event.amount, block_time)?;

    let mut daily = repo.resolve_daily_stat(block_time)?;
    daily.daily_withdrawn_amount += &event.amount;
    daily.end_of_day_total_staked = event.new_total_staked.clone();
    daily.end_of_day_reward_rate = event.current_reward_rate.clone();
    record_participant(repo, &mut daily, ParticipantCategory::Withdrawer, &event.user)?;

    repo.save_contract(contract);
    repo.save_user(user);
    repo.save_daily_stat(daily);
    repo.record(
        ctx.record(EventPayload::Withdrawn(event.clone()))
            .with_staker(event.user.clone())
            .with_position(position.id),
    );
    Ok(())
}

pub fn handle_rewards_claimed<S: EntityStore + ?Sized>(
    repo: &mut Repository<'_, S>,
    ctx: &EventContext<'_>,
    event: &RewardsClaimed,
) -> Result<()> {
    let block_time = ctx.block_time();

    let mut contract = repo.resolve_contract(&ctx.envelope.address)?;
    contract.total_rewards_distributed += &event.amount;
    contract.last_update_timestamp = block_time;

    let mut user = repo.resolve_user(&event.user)?;
    user.total_rewards_claimed += &event.amount;
    user.pending_rewards = event.new_pending_rewards.clone();
    user.rewards_claim_count = user.rewards_claim_count.saturating_add(1);
    user.last_action_at = block_time;

    // Claims do not move the end-of-day snapshot
    let mut daily = repo.resolve_daily_stat(block_time)?;
    daily.daily_rewards_claimed += &event.amount;
    record_participant(repo, &mut daily, ParticipantCategory::RewardClaimer, &event.user)?;

    repo.save_contract(contract);
    repo.save_user(user);
    repo.save_daily_stat(daily);
    repo.record(ctx.record(EventPayload::RewardsClaimed(event.clone())).with_staker(event.user.clone()));
    Ok(())
}

/// Emergency exit zeroes the user's balance but leaves their positions open.
pub fn handle_emergency_withdrawn<S: EntityStore + ?Sized>(
    repo: &mut Repository<'_, S>,
    ctx: &EventContext<'_>,
    event: &EmergencyWithdrawn,
) -> Result<()> {
    let block_time = ctx.block_time();

    let mut contract = repo.resolve_contract(&ctx.envelope.address)?;
    contract.total_staked = event.new_total_staked.clone();
    contract.last_update_timestamp = block_time;

    let mut user = repo.resolve_user(&event.user)?;
    user.staked_amount = Default::default();
    user.total_withdrawn += &event.amount;
    user.pending_rewards = Default::default();
    user.last_action_at = block_time;

    let mut daily = repo.resolve_daily_stat(block_time)?;
    daily.daily_withdrawn_amount += &event.amount;
    daily.end_of_day_total_staked = event.new_total_staked.clone();

    repo.save_contract(contract);
    repo.save_user(user);
    repo.save_daily_stat(daily);
    repo.record(ctx.record(EventPayload::EmergencyWithdrawn(event.clone())).with_staker(event.user.clone()));
    Ok(())
}

pub fn handle_reward_rate_updated<S: EntityStore + ?Sized>(
    repo: &mut Repository<'_, S>,
    ctx: &EventContext<'_>,
    event: &RewardRateUpdated,
) -> Result<()> {
    let block_time = ctx.block_time();

    let mut contract = repo.resolve_contract(&ctx.envelope.address)?;
    contract.current_reward_rate = event.new_rate.clone();
    contract.last_update_timestamp = block_time;

    let mut daily = repo.resolve_daily_stat(block_time)?;
    daily.end_of_day_reward_rate = event.new_rate.clone();
    daily.end_of_day_total_staked = event.total_staked.clone();

    repo.save_contract(contract);
    repo.save_daily_stat(daily);
    repo.record(ctx.record(EventPayload::RewardRateUpdated(event.clone())));
    Ok(())
}

pub fn handle_staking_initialized<S: EntityStore + ?Sized>(
    repo: &mut Repository<'_, S>,
    ctx: &EventContext<'_>,
    event: &StakingInitialized,
) -> Result<()> {
    let mut contract = repo.resolve_contract(&ctx.envelope.address)?;
    if !contract.staking_token.is_zero() {
        log::warn!(
            "⚠️  Contract {} re-initialized: staking token {} -> {}",
            contract.id,
            contract.staking_token,
            event.staking_token
        );
    }

    contract.staking_token = event.staking_token.clone();
    contract.initial_apr = event.initial_reward_rate.clone();
    contract.current_reward_rate = event.initial_reward_rate.clone();
    contract.last_update_timestamp = ctx.block_time();

    repo.save_contract(contract);
    repo.record(ctx.record(EventPayload::StakingInitialized(event.clone())));
    Ok(())
}

/// Pause and unpause only flip the flag; `last_update_timestamp` is untouched.
pub fn handle_pause_change<S: EntityStore + ?Sized>(
    repo: &mut Repository<'_, S>,
    ctx: &EventContext<'_>,
    paused: bool,
    timestamp: i64,
) -> Result<()> {
    let mut contract = repo.resolve_contract(&ctx.envelope.address)?;
    contract.paused = paused;
    repo.save_contract(contract);

    let payload = if paused {
        EventPayload::StakingPaused { timestamp }
    } else {
        EventPayload::StakingUnpaused { timestamp }
    };
    repo.record(ctx.record(payload));
    Ok(())
}

/// Informational only: no aggregate changes.
pub fn handle_token_recovered<S: EntityStore + ?Sized>(
    repo: &mut Repository<'_, S>,
    ctx: &EventContext<'_>,
    event: &TokenRecovered,
) -> Result<()> {
    repo.record(ctx.record(EventPayload::TokenRecovered(event.clone())));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::memory_store::MemoryStore;
    use crate::indexer::types::Address;
    use num_bigint::BigInt;
    use num_traits::Zero;

    fn addr(byte: u8) -> Address {
        Address::parse(&format!("0x{}", format!("{:02x}", byte).repeat(20))).unwrap()
    }

    fn envelope(log_index: u32, block_timestamp: i64) -> EventEnvelope {
        EventEnvelope {
            address: addr(0xcc),
            transaction_hash: "0xaa".to_string(),
            log_index,
            block_number: 1,
            block_timestamp,
        }
    }

    fn ctx(envelope: &EventEnvelope) -> EventContext<'_> {
        EventContext {
            envelope,
            record_id: RecordId::derive(envelope).unwrap(),
            reference_time: envelope.block_timestamp,
        }
    }

    fn staked(user: Address, amount: i64, timestamp: i64) -> Staked {
        Staked {
            user,
            amount: BigInt::from(amount),
            timestamp,
            new_total_staked: BigInt::from(amount),
            current_reward_rate: BigInt::from(5),
        }
    }

    #[test]
    fn test_staked_updates_every_aggregate() {
        let store = MemoryStore::new();
        let mut repo = Repository::new(&store);
        let env = envelope(0, 1000);

        handle_staked(&mut repo, &ctx(&env), &staked(addr(1), 100, 1000)).unwrap();
        let changes = repo.into_changes();

        let contract = &changes.contracts[&addr(0xcc)];
        assert_eq!(contract.total_staked, BigInt::from(100));
        assert_eq!(contract.total_users, 1);
        assert_eq!(contract.last_update_timestamp, 1000);

        let user = &changes.users[&addr(1)];
        assert_eq!(user.staked_amount, BigInt::from(100));
        assert_eq!(user.stake_count, 1);
        assert_eq!(user.first_staked_at, 1000);
        assert_eq!(user.last_stake_timestamp, 1000);

        assert_eq!(changes.positions.len(), 1);
        let daily = &changes.daily_stats[&0];
        assert_eq!(daily.unique_stakers, 1);
        assert_eq!(daily.end_of_day_reward_rate, BigInt::from(5));

        assert_eq!(changes.records.len(), 1);
        assert_eq!(changes.records[0].staker, Some(addr(1)));
        assert!(changes.records[0].position.is_some());
    }

    #[test]
    fn test_second_stake_does_not_count_new_user() {
        let store = MemoryStore::new();
        let mut repo = Repository::new(&store);
        let first = envelope(0, 1000);
        let second = envelope(1, 2000);

        handle_staked(&mut repo, &ctx(&first), &staked(addr(1), 10, 1000)).unwrap();
        handle_staked(&mut repo, &ctx(&second), &staked(addr(1), 20, 2000)).unwrap();
        let changes = repo.into_changes();

        assert_eq!(changes.contracts[&addr(0xcc)].total_users, 1);
        assert_eq!(changes.users[&addr(1)].staked_amount, BigInt::from(30));
        assert_eq!(changes.users[&addr(1)].first_staked_at, 1000);
        assert_eq!(changes.daily_stats[&0].unique_stakers, 1);
    }

    #[test]
    fn test_emergency_withdrawal_resets_user_only() {
        let store = MemoryStore::new();
        let mut repo = Repository::new(&store);
        let stake_env = envelope(0, 1000);
        let exit_env = envelope(1, 1100);

        handle_staked(&mut repo, &ctx(&stake_env), &staked(addr(1), 100, 1000)).unwrap();
        let mut user = repo.resolve_user(&addr(1)).unwrap();
        user.pending_rewards = BigInt::from(7);
        repo.save_user(user);

        let exit = EmergencyWithdrawn {
            user: addr(1),
            amount: BigInt::from(90),
            penalty: BigInt::from(10),
            timestamp: 1100,
            new_total_staked: BigInt::zero(),
        };
        handle_emergency_withdrawn(&mut repo, &ctx(&exit_env), &exit).unwrap();
        let changes = repo.into_changes();

        let user = &changes.users[&addr(1)];
        assert!(user.staked_amount.is_zero());
        assert!(user.pending_rewards.is_zero());
        assert_eq!(user.total_withdrawn, BigInt::from(90));

        let position = changes.positions.values().next().unwrap();
        assert!(position.is_active);
        assert_eq!(changes.daily_stats[&0].unique_withdrawers, 0);
    }

    #[test]
    fn test_withdrawal_refreshes_eligibility() {
        let store = MemoryStore::new();
        let mut repo = Repository::new(&store);
        let stake_env = envelope(0, 1000);
        let withdraw_env = envelope(1, 1000);

        handle_staked(&mut repo, &ctx(&stake_env), &staked(addr(1), 100, 1000)).unwrap();
        let withdraw = Withdrawn {
            user: addr(1),
            amount: BigInt::from(100),
            timestamp: 1000,
            new_total_staked: BigInt::zero(),
            current_reward_rate: BigInt::from(5),
            rewards_accrued: BigInt::zero(),
        };
        handle_withdrawn(&mut repo, &ctx(&withdraw_env), &withdraw).unwrap();
        let changes = repo.into_changes();

        let user = &changes.users[&addr(1)];
        assert!(user.can_withdraw);
        assert_eq!(user.withdrawal_count, 1);
        assert!(user.staked_amount.is_zero());

        let position = changes.positions.values().next().unwrap();
        assert!(!position.is_active);
    }

    #[test]
    fn test_pause_leaves_update_timestamp() {
        let store = MemoryStore::new();
        let mut repo = Repository::new(&store);
        let env = envelope(0, 5000);

        handle_pause_change(&mut repo, &ctx(&env), true, 5000).unwrap();
        let changes = repo.into_changes();

        let contract = &changes.contracts[&addr(0xcc)];
        assert!(contract.paused);
        assert_eq!(contract.last_update_timestamp, 0);
        assert_eq!(changes.records[0].kind(), "StakingPaused");
    }

    #[test]
    fn test_token_recovered_only_records() {
        let store = MemoryStore::new();
        let mut repo = Repository::new(&store);
        let env = envelope(0, 5000);

        let recovered = TokenRecovered {
            token: addr(9),
            amount: BigInt::from(3),
            timestamp: 5000,
        };
        handle_token_recovered(&mut repo, &ctx(&env), &recovered).unwrap();
        let changes = repo.into_changes();

        assert!(changes.contracts.is_empty());
        assert!(changes.users.is_empty());
        assert!(changes.daily_stats.is_empty());
        assert_eq!(changes.records.len(), 1);
    }

    #[test]
    fn test_initialize_sets_token_and_rates() {
        let store = MemoryStore::new();
        let mut repo = Repository::new(&store);
        let env = envelope(0, 42);

        let init = StakingInitialized {
            staking_token: addr(7),
            initial_reward_rate: BigInt::from(5),
            timestamp: 42,
        };
        handle_staking_initialized(&mut repo, &ctx(&env), &init).unwrap();
        let contract = repo.resolve_contract(&addr(0xcc)).unwrap();

        assert_eq!(contract.staking_token, addr(7));
        assert_eq!(contract.initial_apr, BigInt::from(5));
        assert_eq!(contract.current_reward_rate, BigInt::from(5));
        assert_eq!(contract.last_update_timestamp, 42);
    }

    #[test]
    fn test_reinitialize_overwrites_token_and_still_records() {
        let store = MemoryStore::new();
        let mut repo = Repository::new(&store);
        let first_env = envelope(0, 42);
        let second_env = envelope(1, 900);

        let first = StakingInitialized {
            staking_token: addr(7),
            initial_reward_rate: BigInt::from(5),
            timestamp: 42,
        };
        let second = StakingInitialized {
            staking_token: addr(8),
            initial_reward_rate: BigInt::from(9),
            timestamp: 900,
        };
        handle_staking_initialized(&mut repo, &ctx(&first_env), &first).unwrap();
        handle_staking_initialized(&mut repo, &ctx(&second_env), &second).unwrap();
        let changes = repo.into_changes();

        let contract = &changes.contracts[&addr(0xcc)];
        assert_eq!(contract.staking_token, addr(8));
        assert_eq!(contract.initial_apr, BigInt::from(9));
        assert_eq!(contract.current_reward_rate, BigInt::from(9));
        assert_eq!(contract.last_update_timestamp, 900);
        assert_eq!(changes.records.len(), 2);
        assert!(changes.records.iter().all(|r| r.kind() == "StakingInitialized"));
    }

    #[test]
    fn test_repeated_same_day_claims_and_withdrawals_count_once() {
        let store = MemoryStore::new();
        let mut repo = Repository::new(&store);
        let stake_env = envelope(0, 1000);
        handle_staked(&mut repo, &ctx(&stake_env), &staked(addr(1), 100, 1000)).unwrap();

        for i in 1..=2u32 {
            let env = envelope(i, 1000 + i as i64);
            let claim = RewardsClaimed {
                user: addr(1),
                amount: BigInt::from(3),
                timestamp: 1000 + i as i64,
                new_pending_rewards: BigInt::zero(),
                total_staked: BigInt::from(100),
            };
            handle_rewards_claimed(&mut repo, &ctx(&env), &claim).unwrap();
        }
        for i in 3..=4u32 {
            let env = envelope(i, 1000 + i as i64);
            let withdraw = Withdrawn {
                user: addr(1),
                amount: BigInt::from(10),
                timestamp: 1000,
                new_total_staked: BigInt::from(80),
                current_reward_rate: BigInt::from(5),
                rewards_accrued: BigInt::zero(),
            };
            handle_withdrawn(&mut repo, &ctx(&env), &withdraw).unwrap();
        }
        let changes = repo.into_changes();

        let daily = &changes.daily_stats[&0];
        assert_eq!(daily.unique_reward_claimers, 1);
        assert_eq!(daily.unique_withdrawers, 1);
        assert_eq!(daily.unique_stakers, 1);
        assert_eq!(daily.daily_rewards_claimed, BigInt::from(6));
        assert_eq!(daily.daily_withdrawn_amount, BigInt::from(20));
        assert_eq!(changes.participants.len(), 3);
        assert_eq!(changes.users[&addr(1)].rewards_claim_count, 2);
        assert_eq!(changes.users[&addr(1)].withdrawal_count, 2);
    }
}
