//! Static time-of-use rate model: band tables, season/demand multipliers and surcharges.
//!
//! Built once at startup (defaults, optionally overridden from config) and shared
//! read-only behind an `Arc` afterwards.

use std::collections::HashMap;

use serde::Deserialize;
use time::{Month, Weekday};
use tou_client::Category;

/// A contiguous hour range `[start_hour, end_hour)` with its base rate and noise magnitude.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct RateBand {
    pub start_hour: u8,
    pub end_hour: u8,
    pub base_rate: f64,
    pub variation: f64,
}

impl RateBand {
    pub const fn new(start_hour: u8, end_hour: u8, base_rate: f64, variation: f64) -> Self {
        Self {
            start_hour,
            end_hour,
            base_rate,
            variation,
        }
    }

    pub fn contains(&self, hour: u8) -> bool {
        hour >= self.start_hour && hour < self.end_hour
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Season {
    Summer,
    Monsoon,
    Winter,
}

impl Season {
    /// April–June is summer, July–October monsoon, the rest winter.
    pub fn for_month(month: Month) -> Self {
        Self::from_month_index(u8::from(month) - 1)
    }

    /// Same mapping keyed by zero-indexed month (0 = January).
    pub fn from_month_index(month0: u8) -> Self {
        match month0 {
            3..=5 => Season::Summer,
            6..=9 => Season::Monsoon,
            _ => Season::Winter,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Season::Summer => "summer",
            Season::Monsoon => "monsoon",
            Season::Winter => "winter",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DemandPeriod {
    Weekday,
    Weekend,
}

impl DemandPeriod {
    pub fn for_weekday(day: Weekday) -> Self {
        match day {
            Weekday::Saturday | Weekday::Sunday => DemandPeriod::Weekend,
            _ => DemandPeriod::Weekday,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DemandPeriod::Weekday => "weekday",
            DemandPeriod::Weekend => "weekend",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct SeasonMultipliers {
    pub summer: f64,
    pub monsoon: f64,
    pub winter: f64,
}

impl SeasonMultipliers {
    pub fn get(&self, season: Season) -> f64 {
        match season {
            Season::Summer => self.summer,
            Season::Monsoon => self.monsoon,
            Season::Winter => self.winter,
        }
    }

    fn max(&self) -> f64 {
        self.summer.max(self.monsoon).max(self.winter)
    }
}

impl Default for SeasonMultipliers {
    fn default() -> Self {
        Self {
            summer: 1.15,
            monsoon: 1.0,
            winter: 0.9,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct DemandMultipliers {
    pub weekday: f64,
    pub weekend: f64,
}

impl DemandMultipliers {
    pub fn get(&self, period: DemandPeriod) -> f64 {
        match period {
            DemandPeriod::Weekday => self.weekday,
            DemandPeriod::Weekend => self.weekend,
        }
    }
}

impl Default for DemandMultipliers {
    fn default() -> Self {
        Self {
            weekday: 1.1,
            weekend: 0.95,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Surcharge {
    pub name: String,
    pub multiplier: f64,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum RateModelError {
    #[error("{category}: no bands configured")]
    NoBands { category: Category },
    #[error("{category}: bands must cover hours 0..24 without gaps or overlaps (problem at hour {hour})")]
    NotAPartition { category: Category, hour: u8 },
    #[error("{category}: band {start}-{end} has an invalid rate or variation")]
    InvalidBand { category: Category, start: u8, end: u8 },
    #[error("multiplier '{0}' must be finite and positive")]
    InvalidMultiplier(String),
}

/// All band and multiplier tables.
#[derive(Debug, Clone, PartialEq)]
pub struct RateModel {
    bands: HashMap<Category, Vec<RateBand>>,
    pub seasons: SeasonMultipliers,
    pub demand: DemandMultipliers,
    pub surcharges: Vec<Surcharge>,
}

impl Default for RateModel {
    fn default() -> Self {
        let mut bands = HashMap::new();
        bands.insert(
            Category::Domestic,
            vec![
                RateBand::new(0, 4, 3.0, 0.3),
                RateBand::new(4, 8, 4.5, 0.4),
                RateBand::new(8, 12, 6.5, 0.5),
                RateBand::new(12, 16, 7.0, 0.6),
                RateBand::new(16, 20, 8.0, 0.7),
                RateBand::new(20, 24, 5.2, 0.4),
            ],
        );
        bands.insert(Category::Industrial, vec![RateBand::new(0, 24, 7.75, 0.5)]);
        bands.insert(Category::NonDomestic, vec![RateBand::new(0, 24, 8.5, 0.6)]);

        Self {
            bands,
            seasons: SeasonMultipliers::default(),
            demand: DemandMultipliers::default(),
            surcharges: vec![
                Surcharge {
                    name: "ACCUMULATED_DEFICIT".to_string(),
                    multiplier: 1.08,
                },
                Surcharge {
                    name: "PENSION_TRUST".to_string(),
                    multiplier: 1.05,
                },
            ],
        }
    }
}

impl RateModel {
    /// Replace the band table of one category. Call `validate` afterwards.
    pub fn with_bands(mut self, category: Category, bands: Vec<RateBand>) -> Self {
        self.bands.insert(category, bands);
        self
    }

    pub fn bands(&self, category: Category) -> &[RateBand] {
        self.bands.get(&category).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The band covering `hour`, or `None` when the table has a hole there.
    pub fn band_for(&self, category: Category, hour: u8) -> Option<&RateBand> {
        self.bands(category).iter().find(|b| b.contains(hour))
    }

    /// Product of all surcharge multipliers.
    pub fn surcharge_factor(&self) -> f64 {
        self.surcharges.iter().map(|s| s.multiplier).product()
    }

    /// Largest combined multiplier any computation can apply.
    pub fn max_multiplier_product(&self) -> f64 {
        self.seasons.max() * self.demand.weekday.max(self.demand.weekend) * self.surcharge_factor()
    }

    pub fn validate(&self) -> Result<(), RateModelError> {
        for category in Category::ALL {
            let mut bands = self.bands(category).to_vec();
            if bands.is_empty() {
                return Err(RateModelError::NoBands { category });
            }
            bands.sort_by_key(|b| b.start_hour);

            let mut expected_start = 0u8;
            for b in &bands {
                if b.start_hour != expected_start || b.end_hour <= b.start_hour || b.end_hour > 24 {
                    return Err(RateModelError::NotAPartition {
                        category,
                        hour: expected_start,
                    });
                }
                let rate_ok = b.base_rate.is_finite() && b.base_rate > 0.0;
                let variation_ok = b.variation.is_finite() && b.variation >= 0.0;
                if !rate_ok || !variation_ok {
                    return Err(RateModelError::InvalidBand {
                        category,
                        start: b.start_hour,
                        end: b.end_hour,
                    });
                }
                expected_start = b.end_hour;
            }
            if expected_start != 24 {
                return Err(RateModelError::NotAPartition {
                    category,
                    hour: expected_start,
                });
            }
        }

        let named = [
            ("season.summer", self.seasons.summer),
            ("season.monsoon", self.seasons.monsoon),
            ("season.winter", self.seasons.winter),
            ("demand.weekday", self.demand.weekday),
            ("demand.weekend", self.demand.weekend),
        ];
        let surcharges = self.surcharges.iter().map(|s| (s.name.as_str(), s.multiplier));
        for (name, value) in named.into_iter().chain(surcharges) {
            if !value.is_finite() || value <= 0.0 {
                return Err(RateModelError::InvalidMultiplier(name.to_string()));
            }
        }

        Ok(())
    }
}
