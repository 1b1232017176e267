//! ThySpace - location-based social backend
//!
//! Check in, post media, own virtual land, buy add-on features for it, host
//! bounty events and see who is nearby.
//!
//! ## Architecture
//!
//! ```text
//!            HttpServer (http, response)
//!                    |
//!                SpaceCore (space)
//!    +--------+------+-----+----------+----------+
//!    |        |            |          |          |
//! Ownership  Content   Presence    Bounty    Profiles
//!    |        |            |          |
//! Location    +-----> proximity <-----+
//!    |                     |
//!  keys ---------------> geo
//! ```
//!
//! - **Locations** are keyed by the exact `"lat,lon"` text they were addressed
//!   with. Terrain and price are drawn once, on first lookup.
//! - **Ownership** is a one-way transition per location, checked and applied
//!   under the key's lock. Features can only be bought for owned land.
//! - **Nearby queries** run one haversine radius filter over any store that
//!   implements [`proximity::KeyedStore`].
//! - Every store is in memory and belongs to one [`SpaceCore`]; nothing persists.
//!
//! ## Example
//!
//! ```
//! use thyspace::{Config, SpaceCore, SpaceError};
//!
//! let core = SpaceCore::open(Config::default()).unwrap();
//! core.purchase_location(40.0, -73.0, "u1").unwrap();
//! assert!(matches!(
//!     core.purchase_location(40.0, -73.0, "u2"),
//!     Err(SpaceError::AlreadyOwned { .. })
//! ));
//! ```

pub mod bounty;
pub mod config;
pub mod content;
pub mod defense;
pub mod error;
pub mod events;
pub mod features;
pub mod geo;
pub mod http;
pub mod keys;
pub mod location;
pub mod ownership;
pub mod presence;
pub mod profiles;
pub mod proximity;
pub mod response;
pub mod space;

// Re-exports
pub use config::Config;
pub use content::{ContentItem, MediaKind, MediaRef};
pub use error::{Result, SpaceError};
pub use events::{spawn_logging_listener, EventBus, SpaceEvent};
pub use features::FeatureId;
pub use geo::{distance_meters, Coordinate};
pub use http::HttpServer;
pub use keys::LocationKey;
pub use location::{
    FixedTerrain, LandSettings, LandSettingsUpdate, Location, RandomTerrain, Terrain, TerrainSource,
};
pub use ownership::{OwnershipEngine, OwnershipState};
pub use proximity::{Nearby, SortOrder};
pub use space::{CoreStats, Entity, EntityKind, SpaceCore};
