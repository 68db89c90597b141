//! Market type taxonomy
//!
//! Wraps the `Sport` enum behind a tagged variant so downstream consumers
//! (event providers, probability models) address markets uniformly even
//! though sport is presently the only market family in scope.

use serde::{Deserialize, Serialize};

use super::Sport;

/// Universal market type discriminator
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MarketType {
    /// Sports markets
    #[serde(rename = "sport")]
    Sport {
        sport: Sport,
    },
}

impl MarketType {
    /// Create a sport market type
    pub fn sport(sport: Sport) -> Self {
        Self::Sport { sport }
    }

    /// Extract Sport if this is a sports market
    pub fn as_sport(&self) -> Option<Sport> {
        match self {
            Self::Sport { sport } => Some(*sport),
        }
    }

    /// Check if this is a sports market
    pub fn is_sport(&self) -> bool {
        matches!(self, Self::Sport { .. })
    }

    /// Get human-readable market type name
    pub fn type_name(&self) -> &str {
        match self {
            Self::Sport { .. } => "sport",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_market_type_sport_serialization() {
        let market_type = MarketType::sport(Sport::NBA);
        let json = serde_json::to_string(&market_type).unwrap();
        assert!(json.contains("\"type\":\"sport\""));
        // Sport enum serializes as UPPERCASE (NBA, NFL, etc.)
        assert!(json.contains("\"sport\":\"NBA\""));

        let deserialized: MarketType = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, market_type);
        assert_eq!(deserialized.as_sport(), Some(Sport::NBA));
    }

    #[test]
    fn test_market_type_helpers() {
        let sport_market = MarketType::sport(Sport::NFL);
        assert!(sport_market.is_sport());
        assert_eq!(sport_market.type_name(), "sport");
        assert_eq!(sport_market.as_sport(), Some(Sport::NFL));
    }
}
