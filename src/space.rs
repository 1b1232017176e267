//! SpaceCore: the opened store set
//!
//! Owns every store plus the ownership engine and the event bus they share. There
//! is no global state: each `SpaceCore` is independent, and after [`close`]
//! every call fails with [`SpaceError::Internal`].
//!
//! Coordinate-taking calls derive the key with [`LocationKey::of`]. Callers that
//! hold client text (the HTTP layer) use the `*_at_key` variants so the key text
//! is exactly what the client sent.
//!
//! [`close`]: SpaceCore::close

use chrono::Utc;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use crate::bounty::{BountyDraft, BountyEvent, BountyEventStore, BountySummary};
use crate::config::Config;
use crate::content::{ContentItem, ContentStore, MediaRef};
use crate::defense::DefenseStatus;
use crate::error::{Result, SpaceError};
use crate::events::EventBus;
use crate::geo::Coordinate;
use crate::keys::LocationKey;
use crate::location::{LandSettingsUpdate, Location, LocationStore, RandomTerrain, TerrainSource};
use crate::ownership::OwnershipEngine;
use crate::presence::{NearbyUser, PresenceRecord, PresenceStore};
use crate::profiles::{LoginUser, Profile, ProfileDraft, ProfileStore, ProfileSummary};
use crate::proximity::{self, Nearby, SortOrder};

/// Which store [`SpaceCore::query_nearby_entities`] searches
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Content,
    Presence,
    Event,
}

/// A nearby hit from one of the stores
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Entity {
    Content(Nearby<ContentItem>),
    Presence(Nearby<PresenceRecord>),
    Event(Nearby<BountyEvent>),
}

impl Entity {
    pub fn distance_m(&self) -> f64 {
        match self {
            Entity::Content(hit) => hit.distance_m,
            Entity::Presence(hit) => hit.distance_m,
            Entity::Event(hit) => hit.distance_m,
        }
    }
}

/// Store sizes, for health reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoreStats {
    pub locations: usize,
    pub owned_locations: usize,
    pub content_items: usize,
    pub present_users: usize,
    pub bounty_events: usize,
    pub profiles: usize,
}

pub struct SpaceCore {
    config: Config,
    events: Arc<EventBus>,
    locations: Arc<LocationStore>,
    ownership: OwnershipEngine,
    content: ContentStore,
    presence: PresenceStore,
    bounties: BountyEventStore,
    profiles: ProfileStore,
    closed: AtomicBool,
}

impl SpaceCore {
    /// Open a core with randomly generated terrain
    pub fn open(config: Config) -> Result<Self> {
        Self::with_terrain(config, Box::new(RandomTerrain))
    }

    /// Open a core drawing terrain from `terrain`
    pub fn with_terrain(config: Config, terrain: Box<dyn TerrainSource>) -> Result<Self> {
        config.validate()?;

        let events = Arc::new(EventBus::with_capacity(config.event_bus_capacity));
        let locations = Arc::new(LocationStore::new(terrain, events.clone()));
        let core = Self {
            ownership: OwnershipEngine::new(locations.clone(), events.clone()),
            content: ContentStore::new(events.clone()),
            presence: PresenceStore::new(config.presence_ttl(), events.clone()),
            bounties: BountyEventStore::new(events.clone()),
            profiles: ProfileStore::new(events.clone()),
            locations,
            events,
            config,
            closed: AtomicBool::new(false),
        };

        info!(
            radius_m = core.config.default_radius_m,
            presence_ttl_secs = core.config.presence_ttl_secs,
            "Space core opened"
        );
        Ok(core)
    }

    /// Stop serving; every later call fails. Idempotent.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            info!(
                locations = self.locations.len(),
                content = self.content.item_count(),
                "Space core closed"
            );
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(SpaceError::Internal("space core is closed".into()))
        } else {
            Ok(())
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn stats(&self) -> Result<CoreStats> {
        self.ensure_open()?;
        Ok(CoreStats {
            locations: self.locations.len(),
            owned_locations: self.locations.owned().len(),
            content_items: self.content.item_count(),
            present_users: self.presence.len(),
            bounty_events: self.bounties.len(),
            profiles: self.profiles.len(),
        })
    }

    fn key_for(lat: f64, lon: f64) -> Result<LocationKey> {
        LocationKey::of(&Coordinate::try_new(lat, lon)?)
    }

    fn radius_or_default(&self, radius_m: Option<f64>) -> f64 {
        radius_m.unwrap_or(self.config.default_radius_m)
    }

    // ---- locations ----

    /// The location at (lat, lon), created on first sight
    pub fn query_location(&self, lat: f64, lon: f64) -> Result<Location> {
        self.query_location_at_key(&Self::key_for(lat, lon)?)
    }

    pub fn query_location_at_key(&self, key: &LocationKey) -> Result<Location> {
        self.ensure_open()?;
        Ok(self.locations.get_or_create(key))
    }

    pub fn purchase_location(&self, lat: f64, lon: f64, actor: &str) -> Result<Location> {
        self.purchase_location_at_key(&Self::key_for(lat, lon)?, actor)
    }

    pub fn purchase_location_at_key(&self, key: &LocationKey, actor: &str) -> Result<Location> {
        self.ensure_open()?;
        self.ownership.purchase(key, actor)
    }

    pub fn purchase_feature(&self, lat: f64, lon: f64, feature_id: &str) -> Result<Location> {
        self.purchase_feature_at_key(&Self::key_for(lat, lon)?, feature_id)
    }

    pub fn purchase_feature_at_key(&self, key: &LocationKey, feature_id: &str) -> Result<Location> {
        self.ensure_open()?;
        self.ownership.purchase_feature(key, feature_id)
    }

    /// Buy the location at `key` and give it initial `settings`
    pub fn purchase_land_at_key(
        &self,
        key: &LocationKey,
        actor: &str,
        settings: LandSettingsUpdate,
    ) -> Result<Location> {
        self.ensure_open()?;
        self.ownership.purchase_with(key, actor, settings)
    }

    /// Change an owned plot's settings; only its owner may
    pub fn update_land_settings(
        &self,
        lat: f64,
        lon: f64,
        actor: &str,
        update: LandSettingsUpdate,
    ) -> Result<Location> {
        self.update_land_settings_at_key(&Self::key_for(lat, lon)?, actor, update)
    }

    pub fn update_land_settings_at_key(
        &self,
        key: &LocationKey,
        actor: &str,
        update: LandSettingsUpdate,
    ) -> Result<Location> {
        self.ensure_open()?;
        self.ownership.update_settings(key, actor, update)
    }

    /// Every owned location, oldest purchase first
    pub fn owned_locations(&self) -> Result<Vec<Location>> {
        self.ensure_open()?;
        Ok(self.locations.owned())
    }

    // ---- content ----

    pub fn post_content(&self, lat: f64, lon: f64, actor: &str, media: MediaRef) -> Result<ContentItem> {
        self.post_content_at_key(&Self::key_for(lat, lon)?, actor, media)
    }

    pub fn post_content_at_key(&self, key: &LocationKey, actor: &str, media: MediaRef) -> Result<ContentItem> {
        self.ensure_open()?;
        self.content.post(key, actor, media)
    }

    /// Content posted at exactly `key`, oldest first
    pub fn content_at_key(&self, key: &LocationKey) -> Result<Vec<ContentItem>> {
        self.ensure_open()?;
        Ok(self.content.by_key(key))
    }

    /// Content within `radius_m` (default from config), newest first
    pub fn query_nearby_content(&self, lat: f64, lon: f64, radius_m: Option<f64>) -> Result<Vec<ContentItem>> {
        self.ensure_open()?;
        let center = Coordinate::try_new(lat, lon)?;
        let radius = self.radius_or_default(radius_m);
        let items = self.content.within(&center, radius)?;
        debug!(lat, lon, radius, count = items.len(), "Nearby content query");
        Ok(items)
    }

    /// Like [`query_nearby_content`](Self::query_nearby_content) with distances
    pub fn explore(&self, lat: f64, lon: f64, radius_m: Option<f64>) -> Result<Vec<Nearby<ContentItem>>> {
        self.ensure_open()?;
        let center = Coordinate::try_new(lat, lon)?;
        self.content.within_with_distance(&center, self.radius_or_default(radius_m))
    }

    /// Hits from one store, closest first
    pub fn query_nearby_entities(
        &self,
        lat: f64,
        lon: f64,
        radius_m: f64,
        kind: EntityKind,
    ) -> Result<Vec<Entity>> {
        self.ensure_open()?;
        let center = Coordinate::try_new(lat, lon)?;
        let order = SortOrder::Distance;

        let entities: Vec<Entity> = match kind {
            EntityKind::Content => proximity::nearby(&center, radius_m, &self.content, order)?
                .into_iter()
                .map(Entity::Content)
                .collect(),
            EntityKind::Presence => {
                self.presence.sweep();
                proximity::nearby(&center, radius_m, &self.presence, order)?
                    .into_iter()
                    .map(Entity::Presence)
                    .collect()
            }
            EntityKind::Event => proximity::nearby(&center, radius_m, &self.bounties, order)?
                .into_iter()
                .map(Entity::Event)
                .collect(),
        };
        debug!(lat, lon, radius_m, ?kind, count = entities.len(), "Nearby entity query");
        Ok(entities)
    }

    // ---- presence ----

    pub fn join_presence(&self, lat: f64, lon: f64, user_id: &str, username: Option<&str>) -> Result<PresenceRecord> {
        self.ensure_open()?;
        self.presence.join(user_id, username, Coordinate::try_new(lat, lon)?)
    }

    /// Returns whether the user was present
    pub fn leave_presence(&self, user_id: &str) -> Result<bool> {
        self.ensure_open()?;
        Ok(self.presence.leave(user_id))
    }

    pub fn nearby_users(&self, lat: f64, lon: f64, radius_m: Option<f64>) -> Result<Vec<NearbyUser>> {
        self.ensure_open()?;
        let center = Coordinate::try_new(lat, lon)?;
        self.presence.nearby(&center, self.radius_or_default(radius_m))
    }

    /// Drop expired presence records; returns how many went
    pub fn sweep_presence(&self) -> Result<usize> {
        self.ensure_open()?;
        Ok(self.presence.sweep())
    }

    // ---- bounty events ----

    pub fn create_bounty(&self, draft: BountyDraft) -> Result<BountyEvent> {
        self.ensure_open()?;
        self.bounties.create(draft)
    }

    pub fn get_bounty(&self, id: u64) -> Result<BountyEvent> {
        self.ensure_open()?;
        self.bounties
            .get(id)
            .ok_or_else(|| SpaceError::NotFound(format!("event {id}")))
    }

    pub fn list_bounties(&self) -> Result<Vec<BountySummary>> {
        self.ensure_open()?;
        Ok(self.bounties.list().iter().map(BountySummary::from).collect())
    }

    pub fn nearby_bounties(&self, lat: f64, lon: f64, radius_m: Option<f64>) -> Result<Vec<Nearby<BountyEvent>>> {
        self.ensure_open()?;
        let center = Coordinate::try_new(lat, lon)?;
        self.bounties.nearby(&center, self.radius_or_default(radius_m))
    }

    // ---- profiles ----

    pub fn create_profile(&self, draft: ProfileDraft) -> Result<Profile> {
        self.ensure_open()?;
        self.profiles.create(draft)
    }

    pub fn get_profile(&self, username: &str) -> Result<Profile> {
        self.ensure_open()?;
        self.profiles
            .get(username)
            .ok_or_else(|| SpaceError::NotFound(format!("profile {username}")))
    }

    pub fn list_profiles(&self) -> Result<Vec<ProfileSummary>> {
        self.ensure_open()?;
        Ok(self.profiles.list())
    }

    pub fn login(&self, username: &str, password: &str) -> Result<LoginUser> {
        self.ensure_open()?;
        self.profiles.login(username, password)
    }

    // ---- defense ----

    pub fn defense_status(&self, key: &LocationKey) -> Result<DefenseStatus> {
        self.ensure_open()?;
        Ok(DefenseStatus::compute(
            &self.content.by_key(key),
            Utc::now().timestamp_millis(),
        ))
    }
}

impl Drop for SpaceCore {
    fn drop(&mut self) {
        self.close();
    }
}
