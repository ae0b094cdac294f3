//! Indexer configuration from environment variables

use crate::indexer::eligibility::EligibilityClock;
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    Sqlite,
    Memory,
}

impl BackendType {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "sqlite" => Some(BackendType::Sqlite),
            "memory" => Some(BackendType::Memory),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendType::Sqlite => "sqlite",
            BackendType::Memory => "memory",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidValue(msg) => write!(f, "Invalid configuration value: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Configuration for the indexer runtime
///
/// Loaded from environment variables with sensible defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexerConfig {
    /// Path to SQLite database file
    pub db_path: PathBuf,

    /// Decoded event stream (JSON Lines)
    pub events_path: PathBuf,

    pub backend: BackendType,

    /// JSON snapshot loaded and saved by the memory backend
    pub snapshot_path: Option<PathBuf>,

    /// Channel buffer size between source and ingestion (events)
    pub channel_buffer: usize,

    /// Throughput log interval in milliseconds
    pub progress_interval_ms: u64,

    pub can_withdraw_clock: EligibilityClock,
}

impl IndexerConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `STAKING_DB_PATH` (default: data/staking_indexer.db)
    /// - `STAKING_EVENTS_PATH` (default: events.jsonl)
    /// - `STAKING_STORE_BACKEND` (default: sqlite)
    /// - `STAKING_SNAPSHOT_PATH` (default: unset)
    /// - `STAKING_CHANNEL_BUFFER` (default: 10000)
    /// - `STAKING_PROGRESS_INTERVAL_MS` (default: 10000)
    /// - `CAN_WITHDRAW_CLOCK` (default: wall)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let backend = match lookup("STAKING_STORE_BACKEND") {
            Some(raw) => BackendType::from_str(&raw).ok_or_else(|| {
                ConfigError::InvalidValue(format!("STAKING_STORE_BACKEND must be sqlite or memory, got {}", raw))
            })?,
            None => BackendType::Sqlite,
        };

        let can_withdraw_clock = match lookup("CAN_WITHDRAW_CLOCK") {
            Some(raw) => EligibilityClock::from_str(&raw).ok_or_else(|| {
                ConfigError::InvalidValue(format!("CAN_WITHDRAW_CLOCK must be wall or block, got {}", raw))
            })?,
            None => EligibilityClock::WallClock,
        };

        let channel_buffer = parse_or(&lookup, "STAKING_CHANNEL_BUFFER", 10_000usize)?;
        if channel_buffer == 0 {
            return Err(ConfigError::InvalidValue(
                "STAKING_CHANNEL_BUFFER must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            db_path: lookup("STAKING_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data/staking_indexer.db")),

            events_path: lookup("STAKING_EVENTS_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("events.jsonl")),

            backend,

            snapshot_path: lookup("STAKING_SNAPSHOT_PATH")
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),

            channel_buffer,

            progress_interval_ms: parse_or(&lookup, "STAKING_PROGRESS_INTERVAL_MS", 10_000u64)?,

            can_withdraw_clock,
        })
    }

    /// `--backend sqlite|memory` on the command line overrides the environment.
    pub fn apply_args(&mut self, args: &[String]) -> Result<(), ConfigError> {
        if let Some(idx) = args.iter().position(|x| x == "--backend") {
            let raw = args
                .get(idx + 1)
                .ok_or_else(|| ConfigError::InvalidValue("--backend requires a value".to_string()))?;
            self.backend = BackendType::from_str(raw)
                .ok_or_else(|| ConfigError::InvalidValue(format!("unknown backend: {}", raw)))?;
        }
        Ok(())
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(format!("{} is not a valid number: {}", key, raw))),
        None => Ok(default),
    }
}
