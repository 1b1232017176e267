//! Land defense status
//!
//! How actively a plot is being posted to. Purely informational: nothing in the
//! ownership rules reads it.

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use std::collections::HashSet;

use crate::content::ContentItem;

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DefenseStatus {
    pub last_post: Option<DateTime<Utc>>,
    pub post_count: usize,
    /// Distinct UTC days with at least one post
    pub active_days: usize,
    pub challenges_defended: u32,
    /// 1 (neglected) to 4 (busy)
    pub defense_strength: u8,
}

impl DefenseStatus {
    /// Status of a plot whose content is `items`, as of `now_ms`
    pub fn compute(items: &[ContentItem], now_ms: i64) -> Self {
        let last_ms = items.iter().map(|item| item.timestamp).max();
        let active_days = items
            .iter()
            .map(|item| item.timestamp.div_euclid(DAY_MS))
            .collect::<HashSet<_>>()
            .len();

        Self {
            last_post: last_ms.and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
            post_count: items.len(),
            active_days,
            challenges_defended: 0,
            defense_strength: strength(items.len(), last_ms, now_ms),
        }
    }
}

fn strength(post_count: usize, last_ms: Option<i64>, now_ms: i64) -> u8 {
    let Some(last) = last_ms else {
        return 1;
    };
    let idle_days = (now_ms - last).div_euclid(DAY_MS);
    if idle_days > 7 {
        1
    } else if idle_days > 3 {
        2
    } else if post_count > 10 {
        4
    } else {
        3
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{MediaKind, MediaRef};
    use crate::keys::LocationKey;

    const NOW: i64 = 100 * DAY_MS;

    fn posts(timestamps: &[i64]) -> Vec<ContentItem> {
        let key = LocationKey::parse("1,1").unwrap();
        timestamps
            .iter()
            .map(|&ts| {
                let media = MediaRef { kind: MediaKind::Image, url: "/a.png".into() };
                let mut item = ContentItem::new(key.clone(), "u1", media);
                item.timestamp = ts;
                item
            })
            .collect()
    }

    #[test]
    fn test_no_posts() {
        let status = DefenseStatus::compute(&[], NOW);
        assert_eq!(status.defense_strength, 1);
        assert_eq!(status.post_count, 0);
        assert_eq!(status.active_days, 0);
        assert!(status.last_post.is_none());
    }

    #[test]
    fn test_levels_by_idle_time() {
        assert_eq!(DefenseStatus::compute(&posts(&[NOW - 8 * DAY_MS]), NOW).defense_strength, 1);
        assert_eq!(DefenseStatus::compute(&posts(&[NOW - 4 * DAY_MS]), NOW).defense_strength, 2);
        assert_eq!(DefenseStatus::compute(&posts(&[NOW - DAY_MS]), NOW).defense_strength, 3);
        // Whole days only: seven and a half days idle still counts as seven
        assert_eq!(
            DefenseStatus::compute(&posts(&[NOW - 7 * DAY_MS - DAY_MS / 2]), NOW).defense_strength,
            2
        );
    }

    #[test]
    fn test_busy_plot() {
        let ts: Vec<i64> = (0..11).map(|i| NOW - i * 3_600_000).collect();
        let status = DefenseStatus::compute(&posts(&ts), NOW);
        assert_eq!(status.defense_strength, 4);
        assert_eq!(status.post_count, 11);
    }

    #[test]
    fn test_active_days_are_distinct() {
        let status = DefenseStatus::compute(
            &posts(&[NOW - 10, NOW - 20, NOW - DAY_MS - 10, NOW - 2 * DAY_MS - 10]),
            NOW,
        );
        assert_eq!(status.active_days, 3);
        assert_eq!(
            status.last_post.map(|t| t.timestamp_millis()),
            Some(NOW - 10)
        );
    }
}
