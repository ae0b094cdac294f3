//! Mutable aggregates maintained by the engine
//!
//! Every entity has a zero-valued constructor; those constructors are called
//! only from the repository's get-or-create path.

use super::amount::{serde_amount, Amount};
use super::types::Address;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Contract-level summary, keyed by contract address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contract {
    pub id: Address,
    pub staking_token: Address,
    #[serde(with = "serde_amount")]
    pub initial_apr: Amount,
    pub min_lock_duration: i64,
    #[serde(with = "serde_amount")]
    pub apr_reduction_per_thousand: Amount,
    #[serde(with = "serde_amount")]
    pub emergency_withdraw_penalty: Amount,
    #[serde(with = "serde_amount")]
    pub total_staked: Amount,
    #[serde(with = "serde_amount")]
    pub current_reward_rate: Amount,
    pub last_update_timestamp: i64,
    pub total_users: u64,
    pub paused: bool,
    pub owner: Address,
    #[serde(with = "serde_amount")]
    pub total_rewards_distributed: Amount,
}

impl Contract {
    pub fn new(id: Address) -> Self {
        Self {
            id,
            staking_token: Address::zero(),
            initial_apr: Amount::default(),
            min_lock_duration: 0,
            apr_reduction_per_thousand: Amount::default(),
            emergency_withdraw_penalty: Amount::default(),
            total_staked: Amount::default(),
            current_reward_rate: Amount::default(),
            last_update_timestamp: 0,
            total_users: 0,
            paused: false,
            owner: Address::zero(),
            total_rewards_distributed: Amount::default(),
        }
    }
}

/// Per-user cumulative counters, keyed by user address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Address,
    #[serde(with = "serde_amount")]
    pub staked_amount: Amount,
    #[serde(with = "serde_amount")]
    pub total_staked: Amount,
    #[serde(with = "serde_amount")]
    pub total_withdrawn: Amount,
    #[serde(with = "serde_amount")]
    pub total_rewards_claimed: Amount,
    pub last_stake_timestamp: i64,
    pub stake_count: u64,
    pub withdrawal_count: u64,
    pub rewards_claim_count: u64,
    #[serde(with = "serde_amount")]
    pub pending_rewards: Amount,
    pub can_withdraw: bool,
    pub first_staked_at: i64,
    pub last_action_at: i64,
}

impl User {
    pub fn new(id: Address) -> Self {
        Self {
            id,
            staked_amount: Amount::default(),
            total_staked: Amount::default(),
            total_withdrawn: Amount::default(),
            total_rewards_claimed: Amount::default(),
            last_stake_timestamp: 0,
            stake_count: 0,
            withdrawal_count: 0,
            rewards_claim_count: 0,
            pending_rewards: Amount::default(),
            can_withdraw: false,
            first_staked_at: 0,
            last_action_at: 0,
        }
    }

    pub fn has_staked(&self) -> bool {
        self.first_staked_at != 0
    }
}

/// Natural key of a stake position: owner plus the stake's event timestamp
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PositionId {
    pub user: Address,
    pub timestamp: i64,
}

impl PositionId {
    pub fn new(user: Address, timestamp: i64) -> Self {
        Self { user, timestamp }
    }
}

impl fmt::Display for PositionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.user, self.timestamp)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakePosition {
    pub id: PositionId,
    #[serde(with = "serde_amount")]
    pub amount: Amount,
    pub timestamp: i64,
    pub last_update_timestamp: i64,
    pub unlock_time: i64,
    pub is_active: bool,
    #[serde(with = "serde_amount")]
    pub withdrawn_amount: Amount,
    #[serde(with = "serde_amount")]
    pub rewards_claimed: Amount,
    #[serde(with = "serde_amount")]
    pub pending_rewards: Amount,
}

impl StakePosition {
    pub fn new(id: PositionId) -> Self {
        let timestamp = id.timestamp;
        Self {
            id,
            amount: Amount::default(),
            timestamp,
            last_update_timestamp: timestamp,
            unlock_time: 0,
            is_active: true,
            withdrawn_amount: Amount::default(),
            rewards_claimed: Amount::default(),
            pending_rewards: Amount::default(),
        }
    }

    pub fn user(&self) -> &Address {
        &self.id.user
    }
}

/// Dedup category for daily participants
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ParticipantCategory {
    Staker,
    Withdrawer,
    RewardClaimer,
}

impl ParticipantCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParticipantCategory::Staker => "staker",
            ParticipantCategory::Withdrawer => "withdrawer",
            ParticipantCategory::RewardClaimer => "reward_claimer",
        }
    }

    pub fn all() -> [ParticipantCategory; 3] {
        [
            ParticipantCategory::Staker,
            ParticipantCategory::Withdrawer,
            ParticipantCategory::RewardClaimer,
        ]
    }
}

/// Per-UTC-day rollup, keyed by the day's start timestamp
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyStat {
    pub day: i64,
    /// `YYYY-MM-DD`
    pub date: String,
    #[serde(with = "serde_amount")]
    pub daily_staked_amount: Amount,
    #[serde(with = "serde_amount")]
    pub daily_withdrawn_amount: Amount,
    #[serde(with = "serde_amount")]
    pub daily_rewards_claimed: Amount,
    pub unique_stakers: u64,
    pub unique_withdrawers: u64,
    pub unique_reward_claimers: u64,
    #[serde(with = "serde_amount")]
    pub end_of_day_total_staked: Amount,
    #[serde(with = "serde_amount")]
    pub end_of_day_reward_rate: Amount,
}

impl DailyStat {
    pub fn new(day: i64, date: String) -> Self {
        Self {
            day,
            date,
            daily_staked_amount: Amount::default(),
            daily_withdrawn_amount: Amount::default(),
            daily_rewards_claimed: Amount::default(),
            unique_stakers: 0,
            unique_withdrawers: 0,
            unique_reward_claimers: 0,
            end_of_day_total_staked: Amount::default(),
            end_of_day_reward_rate: Amount::default(),
        }
    }

    pub fn unique_count(&self, category: ParticipantCategory) -> u64 {
        match category {
            ParticipantCategory::Staker => self.unique_stakers,
            ParticipantCategory::Withdrawer => self.unique_withdrawers,
            ParticipantCategory::RewardClaimer => self.unique_reward_claimers,
        }
    }

    pub(crate) fn unique_count_mut(&mut self, category: ParticipantCategory) -> &mut u64 {
        match category {
            ParticipantCategory::Staker => &mut self.unique_stakers,
            ParticipantCategory::Withdrawer => &mut self.unique_withdrawers,
            ParticipantCategory::RewardClaimer => &mut self.unique_reward_claimers,
        }
    }
}
