//! Feature catalog
//!
//! Add-on capabilities a land owner can attach to an owned location. The catalog
//! is fixed at compile time; each feature can be bought at most once per location.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::SpaceError;

/// Purchasable feature identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureId {
    PremiumChat,
    MediaBoost,
    EventHosting,
    AnalyticsPro,
    CustomTheme,
    SecurityPlus,
}

/// Every feature in catalog order
pub const CATALOG: [FeatureId; 6] = [
    FeatureId::PremiumChat,
    FeatureId::MediaBoost,
    FeatureId::EventHosting,
    FeatureId::AnalyticsPro,
    FeatureId::CustomTheme,
    FeatureId::SecurityPlus,
];

impl FeatureId {
    /// Price in coins
    pub const fn price(self) -> u32 {
        match self {
            FeatureId::PremiumChat => 15,
            FeatureId::MediaBoost => 25,
            FeatureId::EventHosting => 50,
            FeatureId::AnalyticsPro => 20,
            FeatureId::CustomTheme => 30,
            FeatureId::SecurityPlus => 35,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            FeatureId::PremiumChat => "premium_chat",
            FeatureId::MediaBoost => "media_boost",
            FeatureId::EventHosting => "event_hosting",
            FeatureId::AnalyticsPro => "analytics_pro",
            FeatureId::CustomTheme => "custom_theme",
            FeatureId::SecurityPlus => "security_plus",
        }
    }
}

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeatureId {
    type Err = SpaceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CATALOG
            .iter()
            .copied()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| SpaceError::NoSuchFeature(s.to_string()))
    }
}

/// Catalog row as served to clients
#[derive(Debug, Clone, Serialize)]
pub struct CatalogEntry {
    pub id: FeatureId,
    pub price: u32,
}

pub fn catalog() -> Vec<CatalogEntry> {
    CATALOG
        .iter()
        .map(|&id| CatalogEntry { id, price: id.price() })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prices() {
        assert_eq!(FeatureId::PremiumChat.price(), 15);
        assert_eq!(FeatureId::MediaBoost.price(), 25);
        assert_eq!(FeatureId::EventHosting.price(), 50);
        assert_eq!(FeatureId::AnalyticsPro.price(), 20);
        assert_eq!(FeatureId::CustomTheme.price(), 30);
        assert_eq!(FeatureId::SecurityPlus.price(), 35);
    }

    #[test]
    fn test_parse() {
        for id in CATALOG {
            assert_eq!(id.as_str().parse::<FeatureId>().unwrap(), id);
        }
        assert!(matches!(
            "playlist".parse::<FeatureId>(),
            Err(SpaceError::NoSuchFeature(name)) if name == "playlist"
        ));
    }

    #[test]
    fn test_serde_matches_display() {
        for id in CATALOG {
            let json = serde_json::to_string(&id).unwrap();
            assert_eq!(json, format!("\"{}\"", id));
        }
    }
}
