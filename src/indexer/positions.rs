//! Stake position lifecycle
//!
//! Positions are bucketed by the exact stake timestamp. A withdrawal is
//! attributed to the position sharing the withdrawal event's own timestamp,
//! never to the oldest unlocked position. A withdrawal at a timestamp with no
//! prior stake therefore creates a fresh position with zero principal that is
//! already overdrawn.

use super::amount::Amount;
use super::entities::StakePosition;
use super::repository::{Repository, Resolved};
use super::store::EntityStore;
use super::types::Address;
use crate::error::Result;

/// Open the position for `(user, timestamp)` or add to it.
///
/// The unlock time is captured on the first stake into the position as
/// `timestamp + min_lock_duration`; later stakes at the same timestamp keep it.
pub fn open_or_accumulate<S: EntityStore + ?Sized>(
    repo: &mut Repository<'_, S>,
    user: &Address,
    timestamp: i64,
    principal_delta: &Amount,
    min_lock_duration: i64,
    updated_at: i64,
) -> Result<StakePosition> {
    let Resolved {
        entity: mut position,
        created,
    } = repo.resolve_position(user, timestamp)?;

    // A phantom position opened by a withdrawal has no unlock time yet
    if created || position.unlock_time == 0 {
        position.unlock_time = timestamp.saturating_add(min_lock_duration);
    }
    position.amount += principal_delta;
    position.last_update_timestamp = updated_at;

    repo.save_position(position.clone());
    Ok(position)
}

/// Attribute a withdrawal to the position at `(user, timestamp)`.
///
/// The position is closed once its withdrawn total equals its principal.
pub fn apply_withdrawal<S: EntityStore + ?Sized>(
    repo: &mut Repository<'_, S>,
    user: &Address,
    timestamp: i64,
    amount: &Amount,
    updated_at: i64,
) -> Result<StakePosition> {
    let Resolved {
        entity: mut position,
        created,
    } = repo.resolve_position(user, timestamp)?;

    if created {
        log::warn!(
            "⚠️  Withdrawal of {} by {} at {} has no matching stake; opened empty position",
            amount,
            user,
            timestamp
        );
    }

    position.withdrawn_amount += amount;
    position.last_update_timestamp = updated_at;
    if position.withdrawn_amount == position.amount {
        position.is_active = false;
    }

    repo.save_position(position.clone());
    Ok(position)
}
