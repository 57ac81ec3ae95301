use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Bidding zones the predictor can serve.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[strum(ascii_case_insensitive)]
pub enum Region {
    DE,
    AT,
}

/// Geographic sample point for weather and irradiance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub latitude: f64,
    pub longitude: f64,
}

const DE_LOCATIONS: [GeoLocation; 6] = [
    GeoLocation { latitude: 48.4, longitude: 9.3 },
    GeoLocation { latitude: 49.7, longitude: 11.3 },
    GeoLocation { latitude: 51.3, longitude: 8.6 },
    GeoLocation { latitude: 52.8, longitude: 12.0 },
    GeoLocation { latitude: 53.8, longitude: 8.1 },
    GeoLocation { latitude: 54.1, longitude: 11.6 },
];

const AT_LOCATIONS: [GeoLocation; 5] = [
    GeoLocation { latitude: 48.36, longitude: 16.31 },
    GeoLocation { latitude: 48.27, longitude: 13.85 },
    GeoLocation { latitude: 47.32, longitude: 10.82 },
    GeoLocation { latitude: 47.00, longitude: 13.54 },
    GeoLocation { latitude: 47.11, longitude: 15.80 },
];

impl Region {
    /// Local market timezone; calendar features are derived in this zone.
    pub fn timezone(&self) -> Tz {
        match self {
            Self::DE => chrono_tz::Europe::Berlin,
            Self::AT => chrono_tz::Europe::Vienna,
        }
    }

    /// Points sampled for wind, temperature and irradiance.
    pub fn locations(&self) -> &'static [GeoLocation] {
        match self {
            Self::DE => &DE_LOCATIONS,
            Self::AT => &AT_LOCATIONS,
        }
    }

    /// Region code used by the SMARD chart data API.
    pub fn smard_code(&self) -> &'static str {
        match self {
            Self::DE => "DE",
            Self::AT => "AT",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_region_parse_and_display() {
        assert_eq!(Region::from_str("de").unwrap(), Region::DE);
        assert_eq!(Region::from_str("AT").unwrap(), Region::AT);
        assert!(Region::from_str("SE3").is_err());
        assert_eq!(Region::DE.to_string(), "DE");
    }

    #[test]
    fn test_region_locations() {
        assert_eq!(Region::DE.locations().len(), 6);
        assert_eq!(Region::AT.locations().len(), 5);
        assert_eq!(Region::AT.timezone(), chrono_tz::Europe::Vienna);
    }
}
