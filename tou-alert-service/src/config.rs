use serde::Deserialize;
use std::{collections::HashMap, fs, time::Duration};
use time::UtcOffset;
use tou_client::Category;

use crate::{
    engine::DEFAULT_FALLBACK_RATE,
    scheduler::DEFAULT_THRESHOLD,
    tariff::{DemandMultipliers, RateBand, RateModel, RateModelError, SeasonMultipliers, Surcharge},
};

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
    #[error("invalid tariff tables: {0}")]
    RateModel(#[from] RateModelError),
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub uri: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    Pgwire,
    Ilp,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub kind: StoreKind,
    pub ilp_tcp_addr: Option<String>,
    #[serde(default = "default_append_timeout_ms")]
    pub append_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: StoreKind::default(),
            ilp_tcp_addr: None,
            append_timeout_ms: default_append_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ScheduleConfig {
    /// Minute of every hour at which ticks fire.
    #[serde(default)]
    pub minute: u8,
    /// Subset of categories to run; all when absent.
    pub categories: Option<Vec<Category>>,
    /// Offset of the tariff's wall clock from UTC.
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TariffConfig {
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    #[serde(default = "default_fallback_rate")]
    pub fallback_rate: f64,
    pub seed: Option<u64>,
    /// Band tables keyed by category name.
    pub bands: Option<HashMap<String, Vec<RateBand>>>,
    pub season_multipliers: Option<SeasonMultipliers>,
    pub demand_multipliers: Option<DemandMultipliers>,
    pub surcharges: Option<Vec<Surcharge>>,
}

impl Default for TariffConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            fallback_rate: default_fallback_rate(),
            seed: None,
            bands: None,
            season_multipliers: None,
            demand_multipliers: None,
            surcharges: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    pub api_base_url: String,
    #[serde(default)]
    pub api_key: String,
    pub from: String,
    #[serde(default = "default_subject")]
    pub subject: String,
    pub site_url: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotifyConfig {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            call_timeout_ms: default_call_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub tariff: TariffConfig,
    pub mail: MailConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    pub metrics: Option<MetricsConfig>,
}

fn default_max_connections() -> u32 {
    5
}

fn default_append_timeout_ms() -> u64 {
    5_000
}

fn default_threshold() -> f64 {
    DEFAULT_THRESHOLD
}

fn default_fallback_rate() -> f64 {
    DEFAULT_FALLBACK_RATE
}

fn default_subject() -> String {
    "High Tariff Rate Alert!".to_string()
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_concurrency() -> usize {
    4
}

fn default_call_timeout_ms() -> u64 {
    10_000
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        use std::env;

        let path = env::var("TOU_CONFIG").unwrap_or_else(|_| "tou-config.toml".to_string());
        let contents = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        let mut cfg = Self::from_toml_str(&contents)?;

        if let Ok(key) = env::var("TOU_MAIL_API_KEY") {
            cfg.mail.api_key = key;
        }
        Ok(cfg)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let cfg: AppConfig = toml::from_str(contents)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.schedule.minute > 59 {
            return Err(ConfigError::Invalid(format!(
                "schedule.minute must be 0..=59, got {}",
                self.schedule.minute
            )));
        }
        if self.store.kind == StoreKind::Ilp && self.store.ilp_tcp_addr.is_none() {
            return Err(ConfigError::Invalid(
                "store.ilp_tcp_addr is required when store.kind = \"ilp\"".to_string(),
            ));
        }
        if !self.tariff.threshold.is_finite() {
            return Err(ConfigError::Invalid("tariff.threshold must be finite".to_string()));
        }
        if !self.tariff.fallback_rate.is_finite() || self.tariff.fallback_rate < 0.0 {
            return Err(ConfigError::Invalid(
                "tariff.fallback_rate must be finite and non-negative".to_string(),
            ));
        }
        self.utc_offset()?;
        self.rate_model()?;
        Ok(())
    }

    pub fn utc_offset(&self) -> Result<UtcOffset, ConfigError> {
        UtcOffset::from_whole_seconds(self.schedule.utc_offset_minutes.saturating_mul(60))
            .map_err(|e| ConfigError::Invalid(format!("schedule.utc_offset_minutes: {e}")))
    }

    pub fn categories(&self) -> Vec<Category> {
        match &self.schedule.categories {
            Some(list) if !list.is_empty() => {
                let mut list = list.clone();
                list.sort();
                list.dedup();
                list
            }
            _ => Category::ALL.to_vec(),
        }
    }

    /// Default tables with any configured overrides applied, validated.
    pub fn rate_model(&self) -> Result<RateModel, ConfigError> {
        let mut model = RateModel::default();
        if let Some(bands) = &self.tariff.bands {
            for (name, bands) in bands {
                let category: Category = name
                    .parse()
                    .map_err(|e| ConfigError::Invalid(format!("tariff.bands: {e}")))?;
                model = model.with_bands(category, bands.clone());
            }
        }
        if let Some(seasons) = self.tariff.season_multipliers {
            model.seasons = seasons;
        }
        if let Some(demand) = self.tariff.demand_multipliers {
            model.demand = demand;
        }
        if let Some(surcharges) = &self.tariff.surcharges {
            model.surcharges = surcharges.clone();
        }
        model.validate()?;
        Ok(model)
    }

    pub fn append_timeout(&self) -> Duration {
        Duration::from_millis(self.store.append_timeout_ms)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.notify.call_timeout_ms)
    }
}
