use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Fill color for polygons that have no record for the selected date.
pub const NO_DATA_COLOR: &str = "#eeeeee";

/// Ordered air-quality risk tier derived from a rounded pollutant score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Moderate,
    High,
    Severe,
}

impl RiskLevel {
    pub const ALL: [RiskLevel; 4] = [
        RiskLevel::Low,
        RiskLevel::Moderate,
        RiskLevel::High,
        RiskLevel::Severe,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "Low",
            RiskLevel::Moderate => "Moderate",
            RiskLevel::High => "High",
            RiskLevel::Severe => "Severe",
        }
    }

    /// Choropleth fill color for this tier.
    pub fn color(&self) -> &'static str {
        match self {
            RiskLevel::Low => "#2ecc71",
            RiskLevel::Moderate => "#f1c40f",
            RiskLevel::High => "#e67e22",
            RiskLevel::Severe => "#e74c3c",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RiskLevel::ALL
            .into_iter()
            .find(|level| level.as_str() == s)
            .ok_or_else(|| anyhow::anyhow!("unknown risk level '{s}'"))
    }
}

/// Maps a rounded score onto a [`RiskLevel`].
///
/// Upper bounds are inclusive, so each boundary belongs to the lower band.
///
/// | Range          | Risk     |
/// |----------------|----------|
/// | <= 25          | Low      |
/// | 26 ..= 50      | Moderate |
/// | 51 ..= 75      | High     |
/// | > 75           | Severe   |
pub fn classify(score: i64) -> RiskLevel {
    match score {
        s if s <= 25 => RiskLevel::Low,
        s if s <= 50 => RiskLevel::Moderate,
        s if s <= 75 => RiskLevel::High,
        _ => RiskLevel::Severe,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_boundaries() {
        assert_eq!(classify(25), RiskLevel::Low);
        assert_eq!(classify(26), RiskLevel::Moderate);
        assert_eq!(classify(50), RiskLevel::Moderate);
        assert_eq!(classify(51), RiskLevel::High);
        assert_eq!(classify(75), RiskLevel::High);
        assert_eq!(classify(76), RiskLevel::Severe);
    }

    #[test]
    fn test_classify_extremes() {
        assert_eq!(classify(i64::MIN), RiskLevel::Low);
        assert_eq!(classify(-1), RiskLevel::Low);
        assert_eq!(classify(0), RiskLevel::Low);
        assert_eq!(classify(i64::MAX), RiskLevel::Severe);
    }

    #[test]
    fn test_classify_is_monotonic() {
        let mut previous = classify(-200);
        for score in -199..=300 {
            let current = classify(score);
            assert!(previous <= current, "tier dropped at score {score}");
            previous = current;
        }
    }

    #[test]
    fn test_risk_level_round_trips_through_str() {
        for level in RiskLevel::ALL {
            assert_eq!(level.as_str().parse::<RiskLevel>().unwrap(), level);
        }
        assert!("Extreme".parse::<RiskLevel>().is_err());
    }

    #[test]
    fn test_risk_level_serializes_as_name() {
        let json = serde_json::to_string(&RiskLevel::Moderate).unwrap();
        assert_eq!(json, "\"Moderate\"");
    }

    #[test]
    fn test_palette_is_distinct_from_no_data() {
        for level in RiskLevel::ALL {
            assert_ne!(level.color(), NO_DATA_COLOR);
        }
    }
}
