//! Presence store
//!
//! Who is checked in where. A user has at most one presence record; joining
//! again moves it. Records older than the configured TTL are dropped by
//! [`PresenceStore::sweep`], which also runs before every nearby lookup.

use chrono::Utc;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::error::{Result, SpaceError};
use crate::events::{EventBus, SpaceEvent};
use crate::geo::Coordinate;
use crate::proximity::{self, KeyedStore, Recency, SortOrder};

/// A user's last check-in
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceRecord {
    pub user_id: String,
    pub username: String,
    pub coordinate: Coordinate,
    /// Unix milliseconds
    pub timestamp: i64,
    #[serde(skip)]
    pub seq: u64,
}

impl Recency for PresenceRecord {
    fn timestamp_ms(&self) -> i64 {
        self.timestamp
    }

    fn seq(&self) -> u64 {
        self.seq
    }
}

/// Presence row as shown to other users
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NearbyUser {
    pub username: String,
    /// Whole metres
    pub distance: u64,
    pub last_seen: String,
}

pub struct PresenceStore {
    records: DashMap<String, PresenceRecord>,
    ttl: Duration,
    next_seq: AtomicU64,
    events: Arc<EventBus>,
}

impl PresenceStore {
    pub fn new(ttl: Duration, events: Arc<EventBus>) -> Self {
        Self {
            records: DashMap::new(),
            ttl,
            next_seq: AtomicU64::new(0),
            events,
        }
    }

    /// Check `user_id` in at `coordinate`, replacing any earlier record.
    ///
    /// `username` defaults to `User{user_id}`.
    pub fn join(&self, user_id: &str, username: Option<&str>, coordinate: Coordinate) -> Result<PresenceRecord> {
        self.join_at(user_id, username, coordinate, Utc::now().timestamp_millis())
    }

    pub fn join_at(
        &self,
        user_id: &str,
        username: Option<&str>,
        coordinate: Coordinate,
        timestamp_ms: i64,
    ) -> Result<PresenceRecord> {
        if user_id.is_empty() {
            return Err(SpaceError::InvalidInput("userId is required".into()));
        }
        coordinate.validate()?;

        let record = PresenceRecord {
            user_id: user_id.to_string(),
            username: username
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| format!("User{user_id}")),
            coordinate,
            timestamp: timestamp_ms,
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
        };
        self.records.insert(user_id.to_string(), record.clone());

        debug!(user = %user_id, lat = coordinate.latitude, lon = coordinate.longitude, "Presence joined");
        self.events.emit(SpaceEvent::PresenceJoined {
            user_id: user_id.to_string(),
        });
        Ok(record)
    }

    /// Remove `user_id`'s record. Returns whether one existed.
    pub fn leave(&self, user_id: &str) -> bool {
        let existed = self.records.remove(user_id).is_some();
        if existed {
            debug!(user = %user_id, "Presence left");
            self.events.emit(SpaceEvent::PresenceLeft {
                user_id: user_id.to_string(),
            });
        }
        existed
    }

    pub fn get(&self, user_id: &str) -> Option<PresenceRecord> {
        self.records.get(user_id).map(|r| r.value().clone())
    }

    /// Drop records older than the TTL. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Utc::now().timestamp_millis())
    }

    pub fn sweep_at(&self, now_ms: i64) -> usize {
        let cutoff = now_ms - self.ttl.as_millis() as i64;
        let before = self.records.len();
        self.records.retain(|_, record| record.timestamp > cutoff);
        let removed = before.saturating_sub(self.records.len());
        if removed > 0 {
            debug!(removed, "Expired presence records swept");
            self.events.emit(SpaceEvent::PresenceExpired { count: removed });
        }
        removed
    }

    /// Users within `radius_m` of `center`, closest first
    pub fn nearby(&self, center: &Coordinate, radius_m: f64) -> Result<Vec<NearbyUser>> {
        self.nearby_at(center, radius_m, Utc::now().timestamp_millis())
    }

    pub fn nearby_at(&self, center: &Coordinate, radius_m: f64, now_ms: i64) -> Result<Vec<NearbyUser>> {
        self.sweep_at(now_ms);
        let hits = proximity::nearby(center, radius_m, self, SortOrder::Distance)?;
        Ok(hits
            .into_iter()
            .map(|hit| NearbyUser {
                username: hit.item.username,
                distance: hit.distance_m.round() as u64,
                last_seen: time_ago(now_ms - hit.item.timestamp),
            })
            .collect())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl KeyedStore for PresenceStore {
    type Item = PresenceRecord;

    fn visit(&self, visitor: &mut dyn FnMut(&Coordinate, &[PresenceRecord])) {
        for entry in self.records.iter() {
            visitor(&entry.coordinate, std::slice::from_ref(entry.value()));
        }
    }
}

/// Human "last seen" label for an age in milliseconds
pub fn time_ago(age_ms: i64) -> String {
    let minutes = age_ms.max(0) / 60_000;
    if minutes < 1 {
        return "just now".to_string();
    }
    if minutes < 60 {
        return format!("{minutes}m ago");
    }
    let hours = minutes / 60;
    if hours < 24 {
        return format!("{hours}h ago");
    }
    format!("{}d ago", hours / 24)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::destination;

    const HOUR: Duration = Duration::from_secs(3600);
    const CENTER: Coordinate = Coordinate::new(40.7128, -74.0060);

    fn store() -> PresenceStore {
        PresenceStore::new(HOUR, Arc::new(EventBus::new()))
    }

    #[test]
    fn test_join_replaces_previous_record() {
        let store = store();
        store.join_at("1", None, CENTER, 0).unwrap();
        let moved = destination(&CENTER, 0.0, 5000.0);
        store.join_at("1", Some("alice"), moved, 10).unwrap();

        assert_eq!(store.len(), 1);
        let rec = store.get("1").unwrap();
        assert_eq!(rec.username, "alice");
        assert_eq!(rec.coordinate, moved);
    }

    #[test]
    fn test_default_username() {
        let store = store();
        let rec = store.join_at("42", None, CENTER, 0).unwrap();
        assert_eq!(rec.username, "User42");
    }

    #[test]
    fn test_leave() {
        let store = store();
        store.join_at("1", None, CENTER, 0).unwrap();
        assert!(store.leave("1"));
        assert!(!store.leave("1"));
        assert!(store.is_empty());
    }

    #[test]
    fn test_sweep_drops_stale_records() {
        let store = store();
        let now = 10 * 3_600_000;
        store.join_at("old", None, CENTER, now - 3_600_000).unwrap();
        store.join_at("fresh", None, CENTER, now - 60_000).unwrap();

        assert_eq!(store.sweep_at(now), 1);
        assert!(store.get("old").is_none());
        assert!(store.get("fresh").is_some());
    }

    #[test]
    fn test_sweep_emits_expired_count() {
        let bus = Arc::new(EventBus::new());
        let store = PresenceStore::new(HOUR, bus.clone());
        let now = 10 * 3_600_000;
        store.join_at("a", None, CENTER, now - 2 * 3_600_000).unwrap();
        store.join_at("b", None, CENTER, now - 3_600_000).unwrap();
        store.join_at("c", None, CENTER, now).unwrap();

        let mut receiver = bus.subscribe();
        assert_eq!(store.sweep_at(now), 2);
        assert!(matches!(
            receiver.try_recv().unwrap(),
            SpaceEvent::PresenceExpired { count: 2 }
        ));

        // Nothing left to expire: no event
        assert_eq!(store.sweep_at(now), 0);
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn test_nearby_filters_and_labels() {
        let store = store();
        let now = 5 * 3_600_000;
        store.join_at("a", Some("near"), destination(&CENTER, 10.0, 300.0), now - 5 * 60_000).unwrap();
        store.join_at("b", Some("close"), destination(&CENTER, 10.0, 50.0), now).unwrap();
        store.join_at("c", Some("away"), destination(&CENTER, 10.0, 3000.0), now).unwrap();

        let users = store.nearby_at(&CENTER, 2000.0, now).unwrap();
        assert_eq!(
            users,
            vec![
                NearbyUser { username: "close".into(), distance: 50, last_seen: "just now".into() },
                NearbyUser { username: "near".into(), distance: 300, last_seen: "5m ago".into() },
            ]
        );
    }

    #[test]
    fn test_rejects_bad_input() {
        let store = store();
        assert!(matches!(
            store.join_at("", None, CENTER, 0),
            Err(SpaceError::InvalidInput(_))
        ));
        assert!(matches!(
            store.join_at("1", None, Coordinate::new(0.0, 200.0), 0),
            Err(SpaceError::InvalidCoordinate(_))
        ));
    }

    #[test]
    fn test_time_ago() {
        assert_eq!(time_ago(0), "just now");
        assert_eq!(time_ago(59_999), "just now");
        assert_eq!(time_ago(60_000), "1m ago");
        assert_eq!(time_ago(59 * 60_000), "59m ago");
        assert_eq!(time_ago(3 * 3_600_000), "3h ago");
        assert_eq!(time_ago(50 * 3_600_000), "2d ago");
        assert_eq!(time_ago(-5), "just now");
    }
}
