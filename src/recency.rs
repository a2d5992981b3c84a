//! Recency window. Missing dates follow an explicit policy, never a hidden default.

use chrono::{DateTime, Duration, Utc};

use crate::config::MissingTimestampPolicy;
use crate::ingest::types::RawItem;

/// Effective publication time: the item's own, or `now` under `AssumeNow`.
/// `None` means the item has no usable date and must be dropped.
pub fn resolve_published(
    item: &RawItem,
    now: DateTime<Utc>,
    policy: MissingTimestampPolicy,
) -> Option<DateTime<Utc>> {
    match (item.published_at, policy) {
        (Some(ts), _) => Some(ts),
        (None, MissingTimestampPolicy::AssumeNow) => Some(now),
        (None, MissingTimestampPolicy::Drop) => None,
    }
}

/// Age clamped at zero; future-dated items count as brand new.
pub fn age(published: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (now - published).max(Duration::zero())
}

/// Inclusive: an item exactly `window_hours` old is still recent.
pub fn is_recent(
    item: &RawItem,
    now: DateTime<Utc>,
    window_hours: u32,
    policy: MissingTimestampPolicy,
) -> bool {
    resolve_published(item, now, policy)
        .map(|ts| age(ts, now) <= Duration::hours(i64::from(window_hours)))
        .unwrap_or(false)
}
