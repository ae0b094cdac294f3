//! Daily bucketing and same-day participant dedup

use super::entities::{DailyStat, ParticipantCategory};
use super::repository::Repository;
use super::store::EntityStore;
use super::types::Address;
use crate::error::Result;
use chrono::DateTime;

pub const SECONDS_PER_DAY: i64 = 86_400;

/// Start of the UTC day containing `timestamp`.
///
/// The day holding `i64::MIN` starts below the representable range, so it
/// clamps to `i64::MIN`.
pub fn bucket_for(timestamp: i64) -> i64 {
    timestamp
        .div_euclid(SECONDS_PER_DAY)
        .checked_mul(SECONDS_PER_DAY)
        .unwrap_or(i64::MIN)
}

/// `YYYY-MM-DD` label for a day bucket.
pub fn date_label(day: i64) -> String {
    match DateTime::from_timestamp(day, 0) {
        Some(dt) => dt.format("%Y-%m-%d").to_string(),
        None => day.to_string(),
    }
}

/// Count `address` once per day and category.
///
/// Membership lives in the store, not on the stat; only a first appearance is
/// staged. Returns true when this is the address's first appearance in the
/// category for the stat's day.
pub fn record_participant<S: EntityStore + ?Sized>(
    repo: &mut Repository<'_, S>,
    stat: &mut DailyStat,
    category: ParticipantCategory,
    address: &Address,
) -> Result<bool> {
    if !repo.admit_participant(stat.day, category, address)? {
        return Ok(false);
    }

    let unique_count = stat.unique_count_mut(category);
    *unique_count = unique_count.saturating_add(1);
    Ok(true)
}
