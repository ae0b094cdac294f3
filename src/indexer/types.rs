//! Decoded staking-contract events as delivered by the upstream source

use super::amount::{serde_amount, Amount};
use crate::error::{IndexerError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const ADDRESS_ZERO: &str = "0x0000000000000000000000000000000000000000";

/// A 20-byte account or contract address, always stored as lowercase `0x` hex.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let hex_part = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .ok_or_else(|| IndexerError::InvalidAddress(raw.to_string()))?;

        if hex_part.len() != 40 || !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(IndexerError::InvalidAddress(raw.to_string()));
        }

        Ok(Self(format!("0x{}", hex_part.to_ascii_lowercase())))
    }

    pub fn zero() -> Self {
        Self(ADDRESS_ZERO.to_string())
    }

    pub fn is_zero(&self) -> bool {
        self.0 == ADDRESS_ZERO
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Address {
    type Error = IndexerError;

    fn try_from(value: String) -> Result<Self> {
        Address::parse(&value)
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fields common to every emitted event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Emitting contract
    pub address: Address,
    pub transaction_hash: String,
    /// Emission index of the log inside its block
    pub log_index: u32,
    pub block_number: u64,
    pub block_timestamp: i64,
}

impl EventEnvelope {
    /// Position of this event in the stream's total order.
    pub fn order_key(&self) -> (u64, u32) {
        (self.block_number, self.log_index)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Staked {
    pub user: Address,
    #[serde(with = "serde_amount")]
    pub amount: Amount,
    pub timestamp: i64,
    #[serde(with = "serde_amount")]
    pub new_total_staked: Amount,
    #[serde(with = "serde_amount")]
    pub current_reward_rate: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Withdrawn {
    pub user: Address,
    #[serde(with = "serde_amount")]
    pub amount: Amount,
    pub timestamp: i64,
    #[serde(with = "serde_amount")]
    pub new_total_staked: Amount,
    #[serde(with = "serde_amount")]
    pub current_reward_rate: Amount,
    #[serde(with = "serde_amount")]
    pub rewards_accrued: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardsClaimed {
    pub user: Address,
    #[serde(with = "serde_amount")]
    pub amount: Amount,
    pub timestamp: i64,
    #[serde(with = "serde_amount")]
    pub new_pending_rewards: Amount,
    #[serde(with = "serde_amount")]
    pub total_staked: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyWithdrawn {
    pub user: Address,
    #[serde(with = "serde_amount")]
    pub amount: Amount,
    #[serde(with = "serde_amount")]
    pub penalty: Amount,
    pub timestamp: i64,
    #[serde(with = "serde_amount")]
    pub new_total_staked: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardRateUpdated {
    #[serde(with = "serde_amount")]
    pub old_rate: Amount,
    #[serde(with = "serde_amount")]
    pub new_rate: Amount,
    pub timestamp: i64,
    #[serde(with = "serde_amount")]
    pub total_staked: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakingInitialized {
    pub staking_token: Address,
    #[serde(with = "serde_amount")]
    pub initial_reward_rate: Amount,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecovered {
    pub token: Address,
    #[serde(with = "serde_amount")]
    pub amount: Amount,
    pub timestamp: i64,
}

/// Event payload, one variant per event kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum EventPayload {
    Staked(Staked),
    Withdrawn(Withdrawn),
    RewardsClaimed(RewardsClaimed),
    EmergencyWithdrawn(EmergencyWithdrawn),
    RewardRateUpdated(RewardRateUpdated),
    StakingInitialized(StakingInitialized),
    StakingPaused { timestamp: i64 },
    StakingUnpaused { timestamp: i64 },
    TokenRecovered(TokenRecovered),
}

impl EventPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            EventPayload::Staked(_) => "Staked",
            EventPayload::Withdrawn(_) => "Withdrawn",
            EventPayload::RewardsClaimed(_) => "RewardsClaimed",
            EventPayload::EmergencyWithdrawn(_) => "EmergencyWithdrawn",
            EventPayload::RewardRateUpdated(_) => "RewardRateUpdated",
            EventPayload::StakingInitialized(_) => "StakingInitialized",
            EventPayload::StakingPaused { .. } => "StakingPaused",
            EventPayload::StakingUnpaused { .. } => "StakingUnpaused",
            EventPayload::TokenRecovered(_) => "TokenRecovered",
        }
    }

    /// Timestamp argument carried by the event itself.
    pub fn timestamp(&self) -> i64 {
        match self {
            EventPayload::Staked(e) => e.timestamp,
            EventPayload::Withdrawn(e) => e.timestamp,
            EventPayload::RewardsClaimed(e) => e.timestamp,
            EventPayload::EmergencyWithdrawn(e) => e.timestamp,
            EventPayload::RewardRateUpdated(e) => e.timestamp,
            EventPayload::StakingInitialized(e) => e.timestamp,
            EventPayload::StakingPaused { timestamp } => *timestamp,
            EventPayload::StakingUnpaused { timestamp } => *timestamp,
            EventPayload::TokenRecovered(e) => e.timestamp,
        }
    }
}

/// A single decoded event: envelope plus typed payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakingEvent {
    pub envelope: EventEnvelope,
    pub payload: EventPayload,
}

impl StakingEvent {
    /// Parse a StakingEvent from a JSONL line
    pub fn from_jsonl(line: &str) -> Result<Self> {
        let event: StakingEvent = serde_json::from_str(line)?;
        Ok(event)
    }

    pub fn kind(&self) -> &'static str {
        self.payload.kind()
    }
}
