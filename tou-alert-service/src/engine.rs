use std::sync::Arc;

use time::OffsetDateTime;
use tou_client::Category;

use crate::{
    tariff::{DemandPeriod, RateBand, RateModel, Season},
    variation::{gaussian_noise, RandomSource},
};

pub const DEFAULT_FALLBACK_RATE: f64 = 5.0;

/// Result of one rate computation plus the inputs that shaped it.
#[derive(Debug, Clone, PartialEq)]
pub struct RateComputation {
    pub category: Category,
    pub rate: f64,
    pub hour: u8,
    pub season: Season,
    pub demand: DemandPeriod,
    pub band: Option<RateBand>,
}

impl RateComputation {
    pub fn used_fallback(&self) -> bool {
        self.band.is_none()
    }
}

pub struct RateEngine {
    model: Arc<RateModel>,
    random: Arc<dyn RandomSource>,
    fallback_rate: f64,
}

impl RateEngine {
    pub fn new(model: Arc<RateModel>, random: Arc<dyn RandomSource>) -> Self {
        Self {
            model,
            random,
            fallback_rate: DEFAULT_FALLBACK_RATE,
        }
    }

    pub fn with_fallback_rate(mut self, fallback_rate: f64) -> Self {
        self.fallback_rate = fallback_rate;
        self
    }

    pub fn model(&self) -> &RateModel {
        &self.model
    }

    /// Tariff rate for `category` at local time `now`, rounded to cents.
    pub fn compute_rate(&self, category: Category, now: OffsetDateTime) -> f64 {
        self.compute(category, now).rate
    }

    pub fn compute(&self, category: Category, now: OffsetDateTime) -> RateComputation {
        let hour = now.hour();
        let season = Season::for_month(now.month());
        let demand = DemandPeriod::for_weekday(now.weekday());

        let Some(band) = self.model.band_for(category, hour).copied() else {
            tracing::warn!(
                %category,
                hour,
                fallback_rate = self.fallback_rate,
                "no rate band covers this hour, using fallback rate"
            );
            metrics::counter!("tou_rate_fallback_total", "category" => category.as_str()).increment(1);
            return RateComputation {
                category,
                rate: self.fallback_rate,
                hour,
                season,
                demand,
                band: None,
            };
        };

        let mut rate = band.base_rate + gaussian_noise(self.random.as_ref(), band.variation);
        rate *= self.model.seasons.get(season);
        rate *= self.model.demand.get(demand);
        rate *= self.model.surcharge_factor();

        RateComputation {
            category,
            rate: round_to_cents(rate),
            hour,
            season,
            demand,
            band: Some(band),
        }
    }
}

/// Round half-up to two decimals; negative or non-finite input becomes 0.
pub fn round_to_cents(rate: f64) -> f64 {
    if !rate.is_finite() || rate <= 0.0 {
        return 0.0;
    }
    (rate * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variation::{FixedRandom, SeededRandom};
    use time::macros::datetime;

    fn engine_with(random: impl RandomSource + 'static) -> RateEngine {
        RateEngine::new(Arc::new(RateModel::default()), Arc::new(random))
    }

    #[test]
    fn domestic_summer_weekday_afternoon_without_noise() {
        let engine = engine_with(FixedRandom::zero_noise());
        // Wednesday in May.
        let c = engine.compute(Category::Domestic, datetime!(2024-05-01 14:00:00 UTC));

        assert_eq!(c.season, Season::Summer);
        assert_eq!(c.demand, DemandPeriod::Weekday);
        assert_eq!(c.band.map(|b| b.base_rate), Some(7.0));
        // 7.0 × 1.15 × 1.1 × 1.08 × 1.05 = 10.0416…
        assert_eq!(c.rate, 10.04);
    }

    #[test]
    fn weekend_winter_industrial_without_noise() {
        let engine = engine_with(FixedRandom::zero_noise());
        // Saturday in January.
        let rate = engine.compute_rate(Category::Industrial, datetime!(2024-01-06 03:00:00 UTC));
        // 7.75 × 0.9 × 0.95 × 1.08 × 1.05 = 7.5141…
        assert_eq!(rate, 7.51);
    }

    #[test]
    fn uses_local_hour_of_offset_timestamp() {
        let engine = engine_with(FixedRandom::zero_noise());
        // 02:00 UTC is 07:30 at +05:30, which is the 4-8 band.
        let c = engine.compute(Category::Domestic, datetime!(2024-05-01 07:30:00 +05:30));
        assert_eq!(c.hour, 7);
        assert_eq!(c.band.map(|b| b.start_hour), Some(4));
    }

    #[test]
    fn missing_band_degrades_to_fallback() {
        let model = RateModel::default()
            .with_bands(Category::NonDomestic, vec![RateBand::new(0, 12, 8.5, 0.6)]);
        let engine = RateEngine::new(Arc::new(model), Arc::new(FixedRandom::zero_noise()));

        let c = engine.compute(Category::NonDomestic, datetime!(2024-05-01 18:00:00 UTC));
        assert!(c.used_fallback());
        assert_eq!(c.rate, DEFAULT_FALLBACK_RATE);
    }

    #[test]
    fn rates_stay_within_statistical_bounds_and_cents() {
        let engine = engine_with(SeededRandom::new(42));
        let model = RateModel::default();
        let max_product = model.max_multiplier_product();
        let days = [datetime!(2024-05-01 00:00:00 UTC), datetime!(2024-12-07 00:00:00 UTC)];

        for category in Category::ALL {
            for day in days {
                for hour in 0..24u8 {
                    let now = day.replace_hour(hour).unwrap();
                    let band = *model.band_for(category, hour).unwrap();
                    for _ in 0..10 {
                        let rate = engine.compute_rate(category, now);
                        let upper = (band.base_rate + 6.0 * band.variation) * max_product;
                        assert!(rate.is_finite());
                        assert!(rate >= 0.0 && rate <= upper, "{category} {hour}: {rate}");
                        let cents = rate * 100.0;
                        assert!((cents - cents.round()).abs() < 1e-6, "{rate} has more than 2 decimals");
                    }
                }
            }
        }
    }

    #[test]
    fn rounding_is_half_up_and_clamped() {
        assert_eq!(round_to_cents(10.125), 10.13);
        assert_eq!(round_to_cents(3.0049), 3.0);
        assert_eq!(round_to_cents(-0.4), 0.0);
        assert_eq!(round_to_cents(f64::NAN), 0.0);
    }
}
