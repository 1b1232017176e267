//! Land ownership rules
//!
//! Each location moves through two states:
//!
//! ```text
//! Unowned --purchase(actor)--> Owned(actor) --purchase_feature(f)--> Owned(actor)
//!                                    |
//!                                    +--update_settings(actor)--> Owned(actor)
//! ```
//!
//! Only the owner may change a plot's [`LandSettings`]. There is no transfer, abandonment or reclamation transition. Every rule check
//! and the mutation it guards run inside one [`LocationStore`] update, i.e. under
//! the key's write lock, so concurrent purchases of one key cannot both succeed.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{Result, SpaceError};
use crate::events::{EventBus, SpaceEvent};
use crate::features::FeatureId;
use crate::keys::LocationKey;
use crate::location::{LandSettings, LandSettingsUpdate, Location, LocationStore};

/// Ownership state of a location
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OwnershipState {
    Unowned,
    Owned(String),
}

impl From<&Location> for OwnershipState {
    fn from(location: &Location) -> Self {
        match &location.owner {
            Some(owner) => OwnershipState::Owned(owner.clone()),
            None => OwnershipState::Unowned,
        }
    }
}

/// Applies purchase transitions to a [`LocationStore`]
pub struct OwnershipEngine {
    locations: Arc<LocationStore>,
    events: Arc<EventBus>,
}

impl OwnershipEngine {
    pub fn new(locations: Arc<LocationStore>, events: Arc<EventBus>) -> Self {
        Self { locations, events }
    }

    /// Current state of a key; locations never looked at are `Unowned`
    pub fn state(&self, key: &LocationKey) -> OwnershipState {
        self.locations
            .get(key)
            .map(|loc| OwnershipState::from(&loc))
            .unwrap_or(OwnershipState::Unowned)
    }

    /// Unowned -> Owned(actor).
    ///
    /// Creates the location if it does not exist yet. Fails with
    /// [`SpaceError::AlreadyOwned`] when someone (including `actor`) already owns it.
    pub fn purchase(&self, key: &LocationKey, actor: &str) -> Result<Location> {
        self.purchase_with(key, actor, LandSettingsUpdate::default())
    }

    /// [`purchase`](Self::purchase), starting the plot with `settings` applied
    /// over the defaults in the same locked step
    pub fn purchase_with(
        &self,
        key: &LocationKey,
        actor: &str,
        settings: LandSettingsUpdate,
    ) -> Result<Location> {
        if actor.is_empty() {
            return Err(SpaceError::InvalidInput("actor id is required".into()));
        }
        settings.validate()?;

        let location = self.locations.update_or_create(key, |loc| {
            if let Some(owner) = &loc.owner {
                return Err(SpaceError::AlreadyOwned {
                    owner: owner.clone(),
                });
            }
            let mut initial = LandSettings::for_key(key);
            settings.apply(&mut initial);
            loc.owner = Some(actor.to_string());
            loc.purchased_at = Some(Utc::now());
            loc.settings = Some(initial);
            Ok(loc.clone())
        });

        match &location {
            Ok(loc) => {
                info!(key = %key, owner = %actor, price = loc.price, "Location purchased");
                self.events.emit(SpaceEvent::LocationPurchased {
                    key: key.clone(),
                    owner: actor.to_string(),
                });
            }
            Err(e) if e.is_rule_violation() => {
                debug!(key = %key, actor = %actor, error = %e, "Purchase rejected")
            }
            Err(e) => warn!(key = %key, actor = %actor, error = %e, "Purchase failed"),
        }
        location
    }

    /// Owned -> Owned with `feature_id` added.
    ///
    /// The feature id is checked against the catalog first, then ownership, then
    /// duplicates.
    pub fn purchase_feature(&self, key: &LocationKey, feature_id: &str) -> Result<Location> {
        let feature: FeatureId = feature_id.parse()?;

        let location = self
            .locations
            .update(key, |loc| {
                if !loc.is_owned() {
                    return Err(SpaceError::RequiresOwnership);
                }
                if loc.has_feature(feature) {
                    return Err(SpaceError::AlreadyPurchased(feature.to_string()));
                }
                loc.features.push(feature);
                Ok(loc.clone())
            })
            .unwrap_or(Err(SpaceError::RequiresOwnership));

        match &location {
            Ok(_) => {
                info!(key = %key, feature = %feature, price = feature.price(), "Feature purchased");
                self.events.emit(SpaceEvent::FeaturePurchased {
                    key: key.clone(),
                    feature,
                });
            }
            Err(e) if e.is_rule_violation() => {
                debug!(key = %key, feature = %feature, error = %e, "Feature purchase rejected")
            }
            Err(e) => warn!(key = %key, feature = %feature, error = %e, "Feature purchase failed"),
        }
        location
    }

    /// Owned(actor) -> Owned(actor) with `update` applied to the settings.
    ///
    /// Fails with [`SpaceError::RequiresOwnership`] for unowned or never-seen keys
    /// and [`SpaceError::NotOwner`] when someone else owns the plot.
    pub fn update_settings(
        &self,
        key: &LocationKey,
        actor: &str,
        update: LandSettingsUpdate,
    ) -> Result<Location> {
        if actor.is_empty() {
            return Err(SpaceError::InvalidInput("actor id is required".into()));
        }
        update.validate()?;

        let location = self
            .locations
            .update(key, |loc| {
                match &loc.owner {
                    None => return Err(SpaceError::RequiresOwnership),
                    Some(owner) if owner != actor => {
                        return Err(SpaceError::NotOwner {
                            owner: owner.clone(),
                        })
                    }
                    Some(_) => {}
                }
                let settings = loc
                    .settings
                    .get_or_insert_with(|| LandSettings::for_key(key));
                update.apply(settings);
                Ok(loc.clone())
            })
            .unwrap_or(Err(SpaceError::RequiresOwnership));

        match &location {
            Ok(_) => {
                info!(key = %key, owner = %actor, "Land settings updated");
                self.events.emit(SpaceEvent::LandSettingsUpdated {
                    key: key.clone(),
                    owner: actor.to_string(),
                });
            }
            Err(e) if e.is_rule_violation() => {
                debug!(key = %key, actor = %actor, error = %e, "Settings update rejected")
            }
            Err(e) => warn!(key = %key, actor = %actor, error = %e, "Settings update failed"),
        }
        location
    }
}
