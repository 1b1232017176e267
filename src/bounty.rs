//! Bounty events
//!
//! Users host meetups at a coordinate, broadcast to everyone within a radius and
//! fund a bounty for attendees. Hosting has a cost that grows with reach and
//! duration; the store computes it when the event is created.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

use crate::error::{Result, SpaceError};
use crate::events::{EventBus, SpaceEvent};
use crate::geo::Coordinate;
use crate::proximity::{self, KeyedStore, Nearby, Recency, SortOrder};

/// Flat fee for hosting any event
pub const BASE_COST: u32 = 10;

/// Lifecycle of a bounty event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BountyStatus {
    Upcoming,
    Active,
    Completed,
}

/// What the host sends
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BountyDraft {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub time: String,
    /// Minutes
    pub duration: u32,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub bounty_amount: u32,
    /// Metres
    pub broadcast_radius: u32,
    #[serde(default)]
    pub creator_id: String,
    #[serde(default)]
    pub creator_name: String,
}

/// Hosting cost breakdown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Costs {
    pub base: u32,
    pub radius: u32,
    pub duration: u32,
    pub bounty: u32,
    pub total: u32,
}

impl Costs {
    /// Fails with [`SpaceError::InvalidInput`] when the total does not fit a `u32`
    pub fn compute(broadcast_radius_m: u32, duration_min: u32, bounty: u32) -> Result<Self> {
        let radius = (broadcast_radius_m / 100) * 2;
        let duration = (duration_min / 30) * 5;
        let total = BASE_COST
            .checked_add(radius)
            .and_then(|sum| sum.checked_add(duration))
            .and_then(|sum| sum.checked_add(bounty))
            .ok_or_else(|| SpaceError::InvalidInput("event cost is too large".into()))?;
        Ok(Self {
            base: BASE_COST,
            radius,
            duration,
            bounty,
            total,
        })
    }
}

/// Rough attendance guess: 10% of 50 people per square kilometre of reach
pub fn estimated_participants(broadcast_radius_m: u32) -> u32 {
    let km = broadcast_radius_m as f64 / 1000.0;
    (std::f64::consts::PI * km * km * 50.0 * 0.1).floor() as u32
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BountyEvent {
    pub id: u64,
    pub title: String,
    pub description: String,
    pub date: String,
    pub time: String,
    pub duration: u32,
    #[serde(flatten)]
    pub coordinate: Coordinate,
    pub bounty_amount: u32,
    pub broadcast_radius: u32,
    pub creator_id: String,
    pub creator_name: String,
    pub costs: Costs,
    pub estimated_participants: u32,
    pub current_participants: u32,
    pub participants: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub status: BountyStatus,
    pub total_payout: u32,
}

impl Recency for BountyEvent {
    fn timestamp_ms(&self) -> i64 {
        self.created_at.timestamp_millis()
    }

    fn seq(&self) -> u64 {
        self.id
    }
}

/// Short form used by the event list
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BountySummary {
    pub id: u64,
    pub title: String,
    pub description: String,
    pub date: String,
    pub time: String,
    pub creator_name: String,
    pub bounty_amount: u32,
    pub current_participants: u32,
    pub status: BountyStatus,
}

impl From<&BountyEvent> for BountySummary {
    fn from(event: &BountyEvent) -> Self {
        Self {
            id: event.id,
            title: event.title.clone(),
            description: event.description.clone(),
            date: event.date.clone(),
            time: event.time.clone(),
            creator_name: event.creator_name.clone(),
            bounty_amount: event.bounty_amount,
            current_participants: event.current_participants,
            status: event.status,
        }
    }
}

pub struct BountyEventStore {
    events: DashMap<u64, BountyEvent>,
    next_id: AtomicU64,
    bus: Arc<EventBus>,
}

impl BountyEventStore {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            events: DashMap::new(),
            next_id: AtomicU64::new(1),
            bus,
        }
    }

    /// Validate `draft` and store it as a new upcoming event
    pub fn create(&self, draft: BountyDraft) -> Result<BountyEvent> {
        if draft.title.trim().is_empty() {
            return Err(SpaceError::InvalidInput("title is required".into()));
        }
        if draft.broadcast_radius == 0 {
            return Err(SpaceError::InvalidInput("broadcastRadius must be positive".into()));
        }
        if draft.duration == 0 {
            return Err(SpaceError::InvalidInput("duration must be positive".into()));
        }
        let coordinate = Coordinate::try_new(draft.latitude, draft.longitude)?;
        let costs = Costs::compute(draft.broadcast_radius, draft.duration, draft.bounty_amount)?;

        let event = BountyEvent {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            costs,
            estimated_participants: estimated_participants(draft.broadcast_radius),
            title: draft.title,
            description: draft.description,
            date: draft.date,
            time: draft.time,
            duration: draft.duration,
            coordinate,
            bounty_amount: draft.bounty_amount,
            broadcast_radius: draft.broadcast_radius,
            creator_id: draft.creator_id,
            creator_name: draft.creator_name,
            current_participants: 0,
            participants: Vec::new(),
            created_at: Utc::now(),
            status: BountyStatus::Upcoming,
            total_payout: 0,
        };
        self.events.insert(event.id, event.clone());

        info!(
            id = event.id,
            title = %event.title,
            bounty = event.bounty_amount,
            cost = event.costs.total,
            "Bounty event created"
        );
        self.bus.emit(SpaceEvent::BountyCreated {
            id: event.id,
            title: event.title.clone(),
            bounty_amount: event.bounty_amount,
        });
        Ok(event)
    }

    pub fn get(&self, id: u64) -> Option<BountyEvent> {
        self.events.get(&id).map(|e| e.value().clone())
    }

    /// All events in creation order
    pub fn list(&self) -> Vec<BountyEvent> {
        let mut all: Vec<BountyEvent> = self.events.iter().map(|e| e.value().clone()).collect();
        all.sort_by_key(|e| e.id);
        all
    }

    /// Events located within `radius_m` of `center`, closest first
    pub fn nearby(&self, center: &Coordinate, radius_m: f64) -> Result<Vec<Nearby<BountyEvent>>> {
        proximity::nearby(center, radius_m, self, SortOrder::Distance)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl KeyedStore for BountyEventStore {
    type Item = BountyEvent;

    fn visit(&self, visitor: &mut dyn FnMut(&Coordinate, &[BountyEvent])) {
        for entry in self.events.iter() {
            visitor(&entry.coordinate, std::slice::from_ref(entry.value()));
        }
    }
}
