use serde::{Deserialize, Serialize};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use super::Category;

/// One computed tariff rate for one category at one instant.
///
/// Created once per scheduler tick per category and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TouRecord {
    pub category: Category,
    /// Rate rounded to two decimal places.
    pub rate: f64,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl TouRecord {
    pub fn new(category: Category, rate: f64, timestamp: OffsetDateTime) -> Self {
        Self {
            category,
            rate,
            timestamp,
        }
    }

    /// ISO-8601 (RFC 3339) rendering of the record timestamp.
    pub fn iso_timestamp(&self) -> Result<String, time::error::Format> {
        self.timestamp.format(&Rfc3339)
    }

    pub fn level(&self) -> RateLevel {
        RateLevel::classify(self.rate)
    }
}

/// Coarse rate status used by dashboards and alert logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateLevel {
    Low,
    Moderate,
    High,
}

impl RateLevel {
    pub const LOW_BELOW: f64 = 5.0;
    pub const MODERATE_BELOW: f64 = 10.0;

    pub fn classify(rate: f64) -> Self {
        if rate < Self::LOW_BELOW {
            RateLevel::Low
        } else if rate < Self::MODERATE_BELOW {
            RateLevel::Moderate
        } else {
            RateLevel::High
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RateLevel::Low => "low",
            RateLevel::Moderate => "moderate",
            RateLevel::High => "high",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn serializes_timestamp_as_rfc3339() {
        let rec = TouRecord::new(Category::NonDomestic, 9.87, datetime!(2024-05-01 14:00:00 UTC));
        let json = serde_json::to_value(&rec).unwrap();

        assert_eq!(json["category"], "NON_DOMESTIC");
        assert_eq!(json["rate"], 9.87);
        assert_eq!(json["timestamp"], "2024-05-01T14:00:00Z");
        assert_eq!(rec.iso_timestamp().unwrap(), "2024-05-01T14:00:00Z");
    }

    #[test]
    fn rate_level_band_edges() {
        assert_eq!(RateLevel::classify(4.99), RateLevel::Low);
        assert_eq!(RateLevel::classify(5.0), RateLevel::Moderate);
        assert_eq!(RateLevel::classify(9.99), RateLevel::Moderate);
        assert_eq!(RateLevel::classify(10.0), RateLevel::High);
    }
}
