//! Content store
//!
//! Posted media, grouped by the location key it was posted at. Lists only grow:
//! items are never edited or removed.

use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::error::{Result, SpaceError};
use crate::events::{EventBus, SpaceEvent};
use crate::geo::Coordinate;
use crate::keys::LocationKey;
use crate::proximity::{self, KeyedStore, Nearby, Recency, SortOrder};

/// Kind of posted media
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

/// Reference to uploaded media, as handed over by the upload layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaRef {
    #[serde(rename = "type")]
    pub kind: MediaKind,
    pub url: String,
}

/// A posted piece of media
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentItem {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MediaKind,
    pub url: String,
    /// Unix milliseconds
    pub timestamp: i64,
    pub user_id: String,
    pub key: LocationKey,
    #[serde(skip)]
    pub seq: u64,
}

impl ContentItem {
    /// A new item stamped with the current time; `seq` is assigned on append
    pub fn new(key: LocationKey, user_id: &str, media: MediaRef) -> Self {
        Self {
            id: uuid::Uuid::new_v4().simple().to_string(),
            kind: media.kind,
            url: media.url,
            timestamp: Utc::now().timestamp_millis(),
            user_id: user_id.to_string(),
            key,
            seq: 0,
        }
    }
}

impl Recency for ContentItem {
    fn timestamp_ms(&self) -> i64 {
        self.timestamp
    }

    fn seq(&self) -> u64 {
        self.seq
    }
}

/// Append-only content lists keyed by location
pub struct ContentStore {
    items: DashMap<LocationKey, Vec<ContentItem>>,
    next_seq: AtomicU64,
    events: Arc<EventBus>,
}

impl ContentStore {
    pub fn new(events: Arc<EventBus>) -> Self {
        Self {
            items: DashMap::new(),
            next_seq: AtomicU64::new(0),
            events,
        }
    }

    /// Append `item` to the list at `key`, returning the stored copy.
    ///
    /// The item's key is overwritten with `key` and it receives the next insertion
    /// sequence number while the list is locked, so per-key order and sequence
    /// order always agree.
    pub fn append(&self, key: &LocationKey, mut item: ContentItem) -> ContentItem {
        item.key = key.clone();
        {
            let mut list = self.items.entry(key.clone()).or_default();
            item.seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
            list.push(item.clone());
        }

        debug!(key = %key, id = %item.id, user = %item.user_id, "Content appended");
        self.events.emit(SpaceEvent::ContentPosted {
            key: key.clone(),
            id: item.id.clone(),
            user_id: item.user_id.clone(),
        });
        item
    }

    /// Create and append an item for `media` posted by `user_id`
    pub fn post(&self, key: &LocationKey, user_id: &str, media: MediaRef) -> Result<ContentItem> {
        if user_id.is_empty() {
            return Err(SpaceError::InvalidInput("userId is required".into()));
        }
        if media.url.is_empty() {
            return Err(SpaceError::InvalidInput("media url is required".into()));
        }
        Ok(self.append(key, ContentItem::new(key.clone(), user_id, media)))
    }

    /// Items at exactly `key`, in insertion order
    pub fn by_key(&self, key: &LocationKey) -> Vec<ContentItem> {
        self.items
            .get(key)
            .map(|list| list.value().clone())
            .unwrap_or_default()
    }

    /// Items at every key within `radius_m` of `center`, newest first
    pub fn within(&self, center: &Coordinate, radius_m: f64) -> Result<Vec<ContentItem>> {
        Ok(self
            .within_with_distance(center, radius_m)?
            .into_iter()
            .map(|hit| hit.item)
            .collect())
    }

    /// Like [`within`](Self::within) but keeps each item's distance from `center`
    pub fn within_with_distance(
        &self,
        center: &Coordinate,
        radius_m: f64,
    ) -> Result<Vec<Nearby<ContentItem>>> {
        proximity::nearby(center, radius_m, self, SortOrder::Recency)
    }

    /// Number of distinct keys with content
    pub fn key_count(&self) -> usize {
        self.items.len()
    }

    /// Total number of items across all keys
    pub fn item_count(&self) -> usize {
        self.items.iter().map(|list| list.len()).sum()
    }
}

impl KeyedStore for ContentStore {
    type Item = ContentItem;

    fn visit(&self, visitor: &mut dyn FnMut(&Coordinate, &[ContentItem])) {
        for entry in self.items.iter() {
            visitor(&entry.key().coordinate(), entry.value());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::destination;

    fn store() -> ContentStore {
        ContentStore::new(Arc::new(EventBus::new()))
    }

    fn image(url: &str) -> MediaRef {
        MediaRef {
            kind: MediaKind::Image,
            url: url.to_string(),
        }
    }

    fn item_at(key: &LocationKey, ts: i64, user: &str) -> ContentItem {
        let mut item = ContentItem::new(key.clone(), user, image("/a.jpg"));
        item.timestamp = ts;
        item
    }

    #[test]
    fn test_by_key_insertion_order() {
        let store = store();
        let key = LocationKey::parse("1,1").unwrap();
        store.append(&key, item_at(&key, 30, "a"));
        store.append(&key, item_at(&key, 10, "b"));
        store.append(&key, item_at(&key, 20, "c"));

        let users: Vec<_> = store.by_key(&key).into_iter().map(|i| i.user_id).collect();
        assert_eq!(users, vec!["a", "b", "c"]);
        assert!(store.by_key(&LocationKey::parse("1.0,1.0").unwrap()).is_empty());
    }

    #[test]
    fn test_within_radius_scenario() {
        let store = store();
        let center = Coordinate::new(40.7128, -74.0060);
        let near = LocationKey::of(&destination(&center, 30.0, 500.0)).unwrap();
        let far = LocationKey::of(&destination(&center, 30.0, 2500.0)).unwrap();
        store.append(&near, item_at(&near, 1, "near"));
        store.append(&far, item_at(&far, 2, "far"));

        let hits = store.within(&center, 2000.0).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].user_id, "near");
    }

    #[test]
    fn test_within_sorted_newest_first() {
        let store = store();
        let center = Coordinate::new(10.0, 10.0);
        let a = LocationKey::of(&destination(&center, 0.0, 100.0)).unwrap();
        let b = LocationKey::of(&destination(&center, 90.0, 900.0)).unwrap();
        store.append(&a, item_at(&a, 100, "old"));
        store.append(&b, item_at(&b, 300, "new"));
        store.append(&a, item_at(&a, 200, "mid"));
        store.append(&b, item_at(&b, 200, "mid-later"));

        let users: Vec<_> = store
            .within(&center, 1000.0)
            .unwrap()
            .into_iter()
            .map(|i| i.user_id)
            .collect();
        assert_eq!(users, vec!["new", "mid-later", "mid", "old"]);
    }

    #[test]
    fn test_post_validates() {
        let store = store();
        let key = LocationKey::parse("1,1").unwrap();
        assert!(matches!(
            store.post(&key, "", image("/x.png")),
            Err(SpaceError::InvalidInput(_))
        ));
        assert!(matches!(
            store.post(&key, "u1", image("")),
            Err(SpaceError::InvalidInput(_))
        ));

        let item = store.post(&key, "u1", image("/x.png")).unwrap();
        assert_eq!(item.key, key);
        assert_eq!(item.kind, MediaKind::Image);
        assert_eq!(store.item_count(), 1);
        assert_eq!(store.key_count(), 1);
    }

    #[test]
    fn test_append_emits_content_posted() {
        let bus = Arc::new(EventBus::new());
        let store = ContentStore::new(bus.clone());
        let mut receiver = bus.subscribe();
        let key = LocationKey::parse("3,4").unwrap();

        let item = store.post(&key, "u9", image("/p.jpg")).unwrap();
        match receiver.try_recv().unwrap() {
            SpaceEvent::ContentPosted { key: k, id, user_id } => {
                assert_eq!(k, key);
                assert_eq!(id, item.id);
                assert_eq!(user_id, "u9");
            }
            other => panic!("unexpected event {other:?}"),
        }

        assert!(store.post(&key, "", image("/p.jpg")).is_err());
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn test_seq_is_monotonic() {
        let store = store();
        let key = LocationKey::parse("1,1").unwrap();
        let a = store.append(&key, item_at(&key, 0, "a"));
        let b = store.append(&key, item_at(&key, 0, "b"));
        assert!(b.seq > a.seq);
    }
}
