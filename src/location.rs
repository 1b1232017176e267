//! Location store
//!
//! Maps [`LocationKey`] to its [`Location`] record. Records are created lazily on
//! first lookup with terrain attributes drawn once from a [`TerrainSource`]; the
//! price follows from those attributes and never changes afterwards.
//!
//! Backed by a `DashMap`, so every mutation of a key runs under that key's shard
//! write lock. The ownership rules in [`crate::ownership`] rely on this to make
//! their check-then-act sequences atomic.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::error::{Result, SpaceError};
use crate::events::{EventBus, SpaceEvent};
use crate::features::FeatureId;
use crate::keys::LocationKey;

/// Generated attributes of a plot, each in `[0, 100)`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Terrain {
    pub computational_draw: f64,
    pub horizontal_land: f64,
    pub virtual_height: f64,
}

impl Terrain {
    /// `draw*10 + land*5 + height*3`
    pub fn price(&self) -> f64 {
        self.computational_draw * 10.0 + self.horizontal_land * 5.0 + self.virtual_height * 3.0
    }
}

/// Source of terrain for newly discovered locations
pub trait TerrainSource: Send + Sync {
    fn sample(&self, key: &LocationKey) -> Terrain;
}

/// Uniformly random terrain
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomTerrain;

impl TerrainSource for RandomTerrain {
    fn sample(&self, _key: &LocationKey) -> Terrain {
        let mut rng = rand::thread_rng();
        Terrain {
            computational_draw: rng.gen_range(0.0..100.0),
            horizontal_land: rng.gen_range(0.0..100.0),
            virtual_height: rng.gen_range(0.0..100.0),
        }
    }
}

/// The same terrain for every location (deterministic tests)
#[derive(Debug, Clone, Copy)]
pub struct FixedTerrain(pub Terrain);

impl TerrainSource for FixedTerrain {
    fn sample(&self, _key: &LocationKey) -> Terrain {
        self.0
    }
}

/// Longest accepted land rules text, in characters
pub const MAX_RULES_LEN: usize = 2000;

/// Owner-editable settings of an owned plot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LandSettings {
    pub name: String,
    pub rules: String,
    pub allow_public_posts: bool,
    pub require_approval: bool,
}

impl LandSettings {
    /// Settings a plot starts with when bought
    pub fn for_key(key: &LocationKey) -> Self {
        Self {
            name: format!("Land {key}"),
            rules: String::new(),
            allow_public_posts: true,
            require_approval: false,
        }
    }
}

/// Partial change to [`LandSettings`]; `None` fields keep their current value
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LandSettingsUpdate {
    pub name: Option<String>,
    pub rules: Option<String>,
    pub allow_public_posts: Option<bool>,
    pub require_approval: Option<bool>,
}

impl LandSettingsUpdate {
    pub fn validate(&self) -> Result<()> {
        if let Some(name) = &self.name {
            if name.trim().is_empty() {
                return Err(SpaceError::InvalidInput("land name must not be blank".into()));
            }
        }
        if let Some(rules) = &self.rules {
            if rules.chars().count() > MAX_RULES_LEN {
                return Err(SpaceError::InvalidInput(format!(
                    "land rules exceed {MAX_RULES_LEN} characters"
                )));
            }
        }
        Ok(())
    }

    pub(crate) fn apply(self, settings: &mut LandSettings) {
        if let Some(name) = self.name {
            settings.name = name.trim().to_string();
        }
        if let Some(rules) = self.rules {
            settings.rules = rules;
        }
        if let Some(allow) = self.allow_public_posts {
            settings.allow_public_posts = allow;
        }
        if let Some(require) = self.require_approval {
            settings.require_approval = require;
        }
    }
}

/// A plot of virtual land
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub key: LocationKey,
    pub owner: Option<String>,
    pub price: f64,
    #[serde(flatten)]
    pub terrain: Terrain,
    /// Purchased features in purchase order, no duplicates
    pub features: Vec<FeatureId>,
    pub created_at: DateTime<Utc>,
    pub purchased_at: Option<DateTime<Utc>>,
    /// Present once the plot is owned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<LandSettings>,
}

impl Location {
    fn new(key: LocationKey, terrain: Terrain) -> Self {
        Self {
            key,
            owner: None,
            price: terrain.price(),
            terrain,
            features: Vec::new(),
            created_at: Utc::now(),
            purchased_at: None,
            settings: None,
        }
    }

    pub fn is_owned(&self) -> bool {
        self.owner.is_some()
    }

    pub fn has_feature(&self, feature: FeatureId) -> bool {
        self.features.contains(&feature)
    }
}

/// Concurrent map of locations
pub struct LocationStore {
    locations: DashMap<LocationKey, Location>,
    terrain: Box<dyn TerrainSource>,
    events: Arc<EventBus>,
}

impl LocationStore {
    pub fn new(terrain: Box<dyn TerrainSource>, events: Arc<EventBus>) -> Self {
        Self {
            locations: DashMap::new(),
            terrain,
            events,
        }
    }

    /// Snapshot of a location, if it has been created
    pub fn get(&self, key: &LocationKey) -> Option<Location> {
        self.locations.get(key).map(|loc| loc.value().clone())
    }

    /// Snapshot of a location, creating it first if needed.
    ///
    /// Idempotent: terrain is drawn only on the first call for a key.
    pub fn get_or_create(&self, key: &LocationKey) -> Location {
        if let Some(existing) = self.get(key) {
            return existing;
        }
        match self.locations.entry(key.clone()) {
            Entry::Occupied(occupied) => occupied.get().clone(),
            Entry::Vacant(vacant) => vacant.insert(self.create(key)).value().clone(),
        }
    }

    fn create(&self, key: &LocationKey) -> Location {
        let location = Location::new(key.clone(), self.terrain.sample(key));
        debug!(key = %key, price = location.price, "Location created");
        self.events.emit(SpaceEvent::LocationCreated {
            key: key.clone(),
            price: location.price,
        });
        location
    }

    /// Run `f` with exclusive access to the location, creating it first if needed.
    ///
    /// No other reader or writer observes the key until `f` returns.
    pub(crate) fn update_or_create<T>(
        &self,
        key: &LocationKey,
        f: impl FnOnce(&mut Location) -> Result<T>,
    ) -> Result<T> {
        match self.locations.entry(key.clone()) {
            Entry::Occupied(mut occupied) => f(occupied.get_mut()),
            Entry::Vacant(vacant) => {
                let mut entry = vacant.insert(self.create(key));
                f(entry.value_mut())
            }
        }
    }

    /// Run `f` with exclusive access to an existing location; `None` if absent
    pub(crate) fn update<T>(
        &self,
        key: &LocationKey,
        f: impl FnOnce(&mut Location) -> Result<T>,
    ) -> Option<Result<T>> {
        self.locations.get_mut(key).map(|mut loc| f(loc.value_mut()))
    }

    /// Every owned location, oldest purchase first
    pub fn owned(&self) -> Vec<Location> {
        let mut owned: Vec<Location> = self
            .locations
            .iter()
            .filter(|entry| entry.is_owned())
            .map(|entry| entry.value().clone())
            .collect();
        owned.sort_by(|a, b| a.purchased_at.cmp(&b.purchased_at));
        owned
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> LocationStore {
        LocationStore::new(Box::new(RandomTerrain), Arc::new(EventBus::new()))
    }

    #[test]
    fn test_price_formula() {
        let t = Terrain {
            computational_draw: 10.0,
            horizontal_land: 20.0,
            virtual_height: 30.0,
        };
        assert_eq!(t.price(), 100.0 + 100.0 + 90.0);
    }

    #[test]
    fn test_get_or_create_is_idempotent() {
        let store = store();
        let key = LocationKey::parse("40.0,-73.0").unwrap();
        assert!(store.get(&key).is_none());

        let first = store.get_or_create(&key);
        let second = store.get_or_create(&key);
        assert_eq!(first, second);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_new_location_defaults() {
        let store = store();
        let key = LocationKey::parse("1,2").unwrap();
        let loc = store.get_or_create(&key);
        assert!(loc.owner.is_none());
        assert!(loc.features.is_empty());
        for v in [
            loc.terrain.computational_draw,
            loc.terrain.horizontal_land,
            loc.terrain.virtual_height,
        ] {
            assert!((0.0..100.0).contains(&v));
        }
        assert_eq!(loc.price, loc.terrain.price());
    }

    #[test]
    fn test_update_missing_is_none() {
        let store = store();
        let key = LocationKey::parse("1,2").unwrap();
        assert!(store.update(&key, |_| Ok(())).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_settings_update_applies_only_given_fields() {
        let key = LocationKey::parse("1,2").unwrap();
        let mut settings = LandSettings::for_key(&key);
        assert_eq!(settings.name, "Land 1,2");
        assert!(settings.allow_public_posts);

        let update = LandSettingsUpdate {
            name: Some("  Harbor View ".into()),
            require_approval: Some(true),
            ..Default::default()
        };
        update.validate().unwrap();
        update.apply(&mut settings);
        assert_eq!(settings.name, "Harbor View");
        assert!(settings.require_approval);
        assert!(settings.allow_public_posts);
        assert!(settings.rules.is_empty());
    }

    #[test]
    fn test_settings_update_validation() {
        let blank = LandSettingsUpdate {
            name: Some("   ".into()),
            ..Default::default()
        };
        assert!(matches!(blank.validate(), Err(SpaceError::InvalidInput(_))));

        let long = LandSettingsUpdate {
            rules: Some("x".repeat(MAX_RULES_LEN + 1)),
            ..Default::default()
        };
        assert!(matches!(long.validate(), Err(SpaceError::InvalidInput(_))));
        assert!(LandSettingsUpdate::default().validate().is_ok());
    }

    #[test]
    fn test_serializes_camel_case() {
        let store = LocationStore::new(
            Box::new(FixedTerrain(Terrain {
                computational_draw: 1.0,
                horizontal_land: 2.0,
                virtual_height: 3.0,
            })),
            Arc::new(EventBus::new()),
        );
        let loc = store.get_or_create(&LocationKey::parse("1,2").unwrap());
        let json = serde_json::to_value(&loc).unwrap();
        assert_eq!(json["key"], "1,2");
        assert_eq!(json["computationalDraw"], 1.0);
        assert_eq!(json["price"], 29.0);
        assert!(json["owner"].is_null());
        assert!(json.get("settings").is_none());
    }
}
