//! Error types and result alias for the staking indexer.

/// The result type used throughout the indexer.
pub type Result<T> = std::result::Result<T, IndexerError>;

/// Errors surfaced by the aggregation engine and its stores.
#[derive(Debug, thiserror::Error)]
pub enum IndexerError {
    /// An immutable event record with this id was already written.
    ///
    /// Fatal for the event being processed: every staged change of that event
    /// is discarded so history is never overwritten.
    #[error("duplicate {kind} record: {id}")]
    DuplicateRecord {
        /// Event kind of the rejected record.
        kind: &'static str,
        /// The colliding record id.
        id: String,
    },

    /// The record identity could not be derived from the event envelope.
    #[error("invalid event identity: {0}")]
    InvalidIdentity(String),

    /// An address was not a 20-byte hex string.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// An amount was not a decimal integer.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// The upstream stream went backwards.
    #[error("events out of order: {current} received after {previous}")]
    OrderingViolation {
        /// `(block, log_index)` of the last accepted event.
        previous: String,
        /// `(block, log_index)` of the offending event.
        current: String,
    },

    /// A stored column could not be decoded.
    #[error("corrupt stored value in {column}: {value}")]
    CorruptValue {
        /// Column or field name.
        column: &'static str,
        /// The raw value that failed to parse.
        value: String,
    },

    /// A value does not fit the integer type of the column it is written to
    /// or read from.
    #[error("{column} value {value} is out of range")]
    OutOfRange {
        /// Column or field name.
        column: &'static str,
        /// The value that did not fit.
        value: String,
    },

    /// The event channel closed while a send was in flight.
    #[error("event channel closed")]
    ChannelClosed,

    /// A SQLite operation failed.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A filesystem operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl IndexerError {
    /// Returns true for a record-id collision.
    ///
    /// Re-delivered events end up here; callers that run under at-least-once
    /// delivery skip them instead of stopping.
    #[must_use]
    pub fn is_duplicate(&self) -> bool {
        matches!(self, IndexerError::DuplicateRecord { .. })
    }
}
