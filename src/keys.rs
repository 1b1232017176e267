//! Location key definitions
//!
//! A location is identified by the literal `"lat,lon"` text it was addressed with.
//! Keys are exact-match: `"40.0,-73.0"` and `"40,-73"` name different plots even
//! though they parse to the same point, and two GPS fixes a centimetre apart are
//! unrelated locations. There is no grid or geohash quantization.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use crate::error::{Result, SpaceError};
use crate::geo::Coordinate;

/// Exact-match identity of a location
#[derive(Debug, Clone)]
pub struct LocationKey {
    text: String,
    coordinate: Coordinate,
}

impl LocationKey {
    /// Key for a coordinate, formatted with the shortest round-trip representation
    /// of each component (`40.0` becomes `"40"`).
    pub fn of(coordinate: &Coordinate) -> Result<Self> {
        coordinate.validate()?;
        Ok(Self {
            text: format!("{},{}", coordinate.latitude, coordinate.longitude),
            coordinate: *coordinate,
        })
    }

    /// Key from caller-supplied `"lat,lon"` text, kept verbatim.
    pub fn parse(text: &str) -> Result<Self> {
        let (lat, lon) = text
            .split_once(',')
            .ok_or_else(|| SpaceError::InvalidCoordinate(format!("malformed key: {text:?}")))?;
        let latitude = parse_component(lat, text)?;
        let longitude = parse_component(lon, text)?;
        let coordinate = Coordinate::try_new(latitude, longitude)?;
        Ok(Self {
            text: text.to_string(),
            coordinate,
        })
    }

    /// Key from separate latitude/longitude strings, as they arrive in a query string
    pub fn from_parts(lat: &str, lon: &str) -> Result<Self> {
        Self::parse(&format!("{lat},{lon}"))
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// The point this key was parsed from
    pub fn coordinate(&self) -> Coordinate {
        self.coordinate
    }
}

fn parse_component(part: &str, whole: &str) -> Result<f64> {
    // Whitespace would make two visually identical keys unequal
    if part.is_empty() || part.trim() != part {
        return Err(SpaceError::InvalidCoordinate(format!("malformed key: {whole:?}")));
    }
    part.parse::<f64>()
        .map_err(|_| SpaceError::InvalidCoordinate(format!("malformed key: {whole:?}")))
}

impl PartialEq for LocationKey {
    fn eq(&self, other: &Self) -> bool {
        self.text == other.text
    }
}

impl Eq for LocationKey {}

impl Hash for LocationKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.text.hash(state);
    }
}

impl fmt::Display for LocationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl FromStr for LocationKey {
    type Err = SpaceError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for LocationKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.text)
    }
}

impl<'de> Deserialize<'de> for LocationKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_keeps_text() {
        let key = LocationKey::parse("40.0,-73.0").unwrap();
        assert_eq!(key.as_str(), "40.0,-73.0");
        assert_eq!(key.coordinate(), Coordinate::new(40.0, -73.0));
    }

    #[test]
    fn test_exact_match_semantics() {
        let a = LocationKey::parse("40.0,-73.0").unwrap();
        let b = LocationKey::parse("40,-73").unwrap();
        assert_eq!(a.coordinate(), b.coordinate());
        assert_ne!(a, b);
    }

    #[test]
    fn test_of_is_deterministic() {
        let c = Coordinate::new(40.7128, -74.006);
        let a = LocationKey::of(&c).unwrap();
        let b = LocationKey::of(&c).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "40.7128,-74.006");
        assert_eq!(LocationKey::parse(a.as_str()).unwrap(), a);
    }

    #[test]
    fn test_rejects_malformed() {
        for bad in ["", "40.0", "40.0,", ",1", "a,b", "91,0", "0,181", " 40,1", "40,1,2"] {
            assert!(
                matches!(LocationKey::parse(bad), Err(SpaceError::InvalidCoordinate(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_serde_as_string() {
        let key = LocationKey::parse("1.5,2.5").unwrap();
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, "\"1.5,2.5\"");
        let back: LocationKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
    }
}
