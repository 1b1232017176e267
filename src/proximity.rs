//! Radius queries over keyed stores
//!
//! One filter serves content, presence and bounty events: each store exposes its
//! items grouped by coordinate through [`KeyedStore`], and [`nearby`] keeps the
//! groups within the radius and orders the survivors.
//!
//! This is a linear scan over every distinct coordinate. At the scale these stores
//! run at that is microseconds; a geohash bucket index would be the next step if it
//! ever is not.

use serde::Serialize;
use std::cmp::Ordering;

use crate::error::Result;
use crate::geo::{distance_meters, Coordinate};

/// Items that can be ordered by recency
pub trait Recency {
    /// Creation time in Unix milliseconds
    fn timestamp_ms(&self) -> i64;
    /// Store-assigned insertion counter, used to break timestamp ties
    fn seq(&self) -> u64;
}

/// A store whose items are addressed by coordinate
pub trait KeyedStore {
    type Item: Clone + Recency;

    /// Call `visitor` once per coordinate with every item stored there.
    ///
    /// Each slice must be a consistent snapshot of its group.
    fn visit(&self, visitor: &mut dyn FnMut(&Coordinate, &[Self::Item]));
}

/// Result ordering for [`nearby`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    /// Closest first; equal distances keep insertion order
    #[default]
    Distance,
    /// Newest first; equal timestamps put the later insertion first
    Recency,
}

/// An item together with its distance from the query centre
#[derive(Debug, Clone, Serialize)]
pub struct Nearby<T> {
    #[serde(flatten)]
    pub item: T,
    #[serde(rename = "distance")]
    pub distance_m: f64,
}

/// Every item of `source` within `radius_m` metres of `center`, inclusive.
///
/// A non-positive (or NaN) radius yields an empty result. An out-of-range centre
/// is an [`InvalidCoordinate`](crate::SpaceError::InvalidCoordinate) error.
pub fn nearby<S: KeyedStore + ?Sized>(
    center: &Coordinate,
    radius_m: f64,
    source: &S,
    order: SortOrder,
) -> Result<Vec<Nearby<S::Item>>> {
    center.validate()?;
    if !(radius_m > 0.0) {
        return Ok(Vec::new());
    }

    let mut hits = Vec::new();
    source.visit(&mut |coord, items| {
        let distance_m = distance_meters(center, coord);
        if distance_m <= radius_m {
            hits.extend(items.iter().map(|item| Nearby {
                item: item.clone(),
                distance_m,
            }));
        }
    });

    sort(&mut hits, order);
    Ok(hits)
}

fn sort<T: Recency>(hits: &mut [Nearby<T>], order: SortOrder) {
    match order {
        SortOrder::Distance => hits.sort_by(|a, b| {
            a.distance_m
                .partial_cmp(&b.distance_m)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.item.seq().cmp(&b.item.seq()))
        }),
        SortOrder::Recency => hits.sort_by(|a, b| {
            b.item
                .timestamp_ms()
                .cmp(&a.item.timestamp_ms())
                .then_with(|| b.item.seq().cmp(&a.item.seq()))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SpaceError;
    use crate::geo::destination;

    #[derive(Debug, Clone, PartialEq)]
    struct Pin {
        name: &'static str,
        ts: i64,
        seq: u64,
    }

    impl Recency for Pin {
        fn timestamp_ms(&self) -> i64 {
            self.ts
        }
        fn seq(&self) -> u64 {
            self.seq
        }
    }

    struct Pins(Vec<(Coordinate, Pin)>);

    impl KeyedStore for Pins {
        type Item = Pin;

        fn visit(&self, visitor: &mut dyn FnMut(&Coordinate, &[Pin])) {
            for (coord, pin) in &self.0 {
                visitor(coord, std::slice::from_ref(pin));
            }
        }
    }

    const CENTER: Coordinate = Coordinate::new(40.7128, -74.0060);

    fn pins() -> Pins {
        Pins(vec![
            (destination(&CENTER, 90.0, 1200.0), Pin { name: "far", ts: 300, seq: 0 }),
            (destination(&CENTER, 0.0, 100.0), Pin { name: "near", ts: 100, seq: 1 }),
            (destination(&CENTER, 180.0, 2500.0), Pin { name: "outside", ts: 500, seq: 2 }),
            (destination(&CENTER, 270.0, 600.0), Pin { name: "mid", ts: 300, seq: 3 }),
        ])
    }

    fn names<T: Clone>(hits: &[Nearby<T>], f: impl Fn(&T) -> &'static str) -> Vec<&'static str> {
        hits.iter().map(|h| f(&h.item)).collect()
    }

    #[test]
    fn test_distance_order() {
        let hits = nearby(&CENTER, 2000.0, &pins(), SortOrder::Distance).unwrap();
        assert_eq!(names(&hits, |p: &Pin| p.name), vec!["near", "mid", "far"]);
        assert!((hits[0].distance_m - 100.0).abs() < 0.01);
    }

    #[test]
    fn test_recency_order_breaks_ties_by_insertion() {
        let hits = nearby(&CENTER, 2000.0, &pins(), SortOrder::Recency).unwrap();
        // "mid" and "far" share a timestamp; the later insertion comes first
        assert_eq!(names(&hits, |p: &Pin| p.name), vec!["mid", "far", "near"]);
    }

    #[test]
    fn test_non_positive_radius_is_empty() {
        for r in [0.0, -5.0, f64::NAN] {
            assert!(nearby(&CENTER, r, &pins(), SortOrder::Distance).unwrap().is_empty());
        }
    }

    #[test]
    fn test_invalid_center() {
        let bad = Coordinate::new(120.0, 0.0);
        assert!(matches!(
            nearby(&bad, 2000.0, &pins(), SortOrder::Distance),
            Err(SpaceError::InvalidCoordinate(_))
        ));
    }

    #[test]
    fn test_boundary_is_inclusive() {
        let r = 1000.0;
        let eps = 0.01;
        let store = Pins(vec![
            (destination(&CENTER, 45.0, r - eps), Pin { name: "inside", ts: 0, seq: 0 }),
            (destination(&CENTER, 45.0, r + eps), Pin { name: "beyond", ts: 0, seq: 1 }),
        ]);
        let hits = nearby(&CENTER, r, &store, SortOrder::Distance).unwrap();
        assert_eq!(names(&hits, |p: &Pin| p.name), vec!["inside"]);

        // A point sitting exactly on the measured radius is included
        let edge = destination(&CENTER, 45.0, r);
        let exact = distance_meters(&CENTER, &edge);
        let store = Pins(vec![(edge, Pin { name: "edge", ts: 0, seq: 0 })]);
        assert_eq!(nearby(&CENTER, exact, &store, SortOrder::Distance).unwrap().len(), 1);
    }
}
