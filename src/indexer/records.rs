//! Immutable, append-only event records

use super::entities::PositionId;
use super::types::{Address, EventEnvelope, EventPayload};
use crate::error::{IndexerError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Per-emission record identity: transaction hash bytes followed by the
/// emission index as four little-endian bytes, hex encoded.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordId(String);

impl RecordId {
    pub fn derive(envelope: &EventEnvelope) -> Result<Self> {
        let raw = envelope.transaction_hash.trim();
        let hex_part = raw
            .strip_prefix("0x")
            .ok_or_else(|| IndexerError::InvalidIdentity(raw.to_string()))?;

        let mut bytes = hex::decode(hex_part)
            .map_err(|e| IndexerError::InvalidIdentity(format!("{}: {}", raw, e)))?;
        if bytes.is_empty() {
            return Err(IndexerError::InvalidIdentity(raw.to_string()));
        }

        let log_index = i32::try_from(envelope.log_index)
            .map_err(|_| IndexerError::InvalidIdentity(format!("log index {} out of range", envelope.log_index)))?;
        bytes.extend_from_slice(&log_index.to_le_bytes());

        Ok(Self(format!("0x{}", hex::encode(bytes))))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Write-once log entry for one processed event
///
/// Carries a snapshot of the payload plus back-references to the user and
/// position that were current when the event was processed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: RecordId,
    pub contract: Address,
    pub block_number: u64,
    pub block_timestamp: i64,
    pub transaction_hash: String,
    pub staker: Option<Address>,
    pub position: Option<PositionId>,
    pub payload: EventPayload,
}

impl EventRecord {
    pub fn new(id: RecordId, envelope: &EventEnvelope, payload: EventPayload) -> Self {
        Self {
            id,
            contract: envelope.address.clone(),
            block_number: envelope.block_number,
            block_timestamp: envelope.block_timestamp,
            transaction_hash: envelope.transaction_hash.clone(),
            staker: None,
            position: None,
            payload,
        }
    }

    pub fn with_staker(mut self, staker: Address) -> Self {
        self.staker = Some(staker);
        self
    }

    pub fn with_position(mut self, position: PositionId) -> Self {
        self.position = Some(position);
        self
    }

    pub fn kind(&self) -> &'static str {
        self.payload.kind()
    }
}
