//! Withdrawal eligibility (`User::can_withdraw`)
//!
//! This is the only derived field that depends on a clock outside the event
//! stream. With `EligibilityClock::WallClock` the flag is compared against the
//! processing time, so replaying the same events later can flip it; every
//! other field is a pure function of the ordered events. `BlockTime`
//! evaluates against the event's block time instead and is replay-stable.

use super::entities::User;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EligibilityClock {
    WallClock,
    BlockTime,
}

impl EligibilityClock {
    pub fn as_str(&self) -> &'static str {
        match self {
            EligibilityClock::WallClock => "wall",
            EligibilityClock::BlockTime => "block",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "wall" | "wallclock" => Some(EligibilityClock::WallClock),
            "block" | "blocktime" => Some(EligibilityClock::BlockTime),
            _ => None,
        }
    }

    /// Reference time for an event processed at wall-clock `now`.
    pub fn reference_time(&self, now: i64, block_timestamp: i64) -> i64 {
        match self {
            EligibilityClock::WallClock => now,
            EligibilityClock::BlockTime => block_timestamp,
        }
    }
}

impl Default for EligibilityClock {
    fn default() -> Self {
        EligibilityClock::WallClock
    }
}

/// Lock on the user's most recent stake has elapsed at `reference_time`.
pub fn lock_elapsed(last_stake_timestamp: i64, min_lock_duration: i64, reference_time: i64) -> bool {
    last_stake_timestamp.saturating_add(min_lock_duration) <= reference_time
}

pub fn refresh_can_withdraw(user: &mut User, min_lock_duration: i64, reference_time: i64) {
    user.can_withdraw = lock_elapsed(user.last_stake_timestamp, min_lock_duration, reference_time);
}
