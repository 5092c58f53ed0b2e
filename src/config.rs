use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::pricing::DEFAULT_MARKUP_PCT;
use crate::types::SubscriptionTier;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub pricing: PricingConfig,
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingConfig {
    #[serde(default = "default_markup_pct")]
    pub default_markup_pct: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingConfig {
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    #[serde(default)]
    pub weights: WeightsConfig,
    #[serde(default)]
    pub location: LocationConfig,
    #[serde(default)]
    pub value: ValueConfig,
    #[serde(default)]
    pub sector: SectorSignalConfig,
    #[serde(default)]
    pub keyword: KeywordSignalConfig,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct WeightsConfig {
    #[serde(default = "default_sector_weight")]
    pub sector: f64,
    #[serde(default = "default_location_weight")]
    pub location: f64,
    #[serde(default = "default_keyword_weight")]
    pub keyword: f64,
    #[serde(default = "default_value_weight")]
    pub value: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationConfig {
    #[serde(default = "default_uf_match_score")]
    pub uf_match: f64,
    #[serde(default = "default_municipality_match_score")]
    pub municipality_match: f64,
    #[serde(default = "default_location_baseline")]
    pub baseline: f64,
    /// Off by default: a municipality name match counts across states.
    #[serde(default)]
    pub municipality_requires_same_uf: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValueConfig {
    #[serde(default = "default_unknown_value_score")]
    pub unknown_value_score: f64,
    #[serde(default = "default_within_band_score")]
    pub within_band_score: f64,
    #[serde(default = "default_value_bands")]
    pub bands: Vec<ValueBand>,
}

/// Notices above `max_value` are a poor fit for organizations on `tier`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValueBand {
    pub tier: SubscriptionTier,
    pub max_value: Decimal,
    pub score_above: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SectorSignalMode {
    Placeholder,
    Classification,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum KeywordSignalMode {
    Placeholder,
    Overlap,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectorSignalConfig {
    #[serde(default = "default_sector_mode")]
    pub mode: SectorSignalMode,
    #[serde(default = "default_sector_placeholder")]
    pub placeholder: f64,
    #[serde(default = "default_sector_placeholder")]
    pub missing_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordSignalConfig {
    #[serde(default = "default_keyword_mode")]
    pub mode: KeywordSignalMode,
    #[serde(default = "default_keyword_placeholder")]
    pub placeholder: f64,
    #[serde(default = "default_keyword_placeholder")]
    pub missing_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    #[serde(default)]
    pub notices_url: String,
    #[serde(default)]
    pub organizations_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_base_secs")]
    pub backoff_base_secs: u64,
}

impl Config {
    pub fn default_path() -> PathBuf {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        home.join(".config/bid-oracle/config.toml")
    }

    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(|p| p.to_path_buf())
            .unwrap_or_else(Self::default_path);
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = fs::read_to_string(&path)
            .with_context(|| format!("failed reading config: {}", path.display()))?;
        let parsed: Self = toml::from_str(&data)
            .with_context(|| format!("failed parsing TOML config: {}", path.display()))?;
        parsed
            .validate()
            .with_context(|| format!("invalid config: {}", path.display()))?;
        Ok(parsed)
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.pricing.default_markup_pct < Decimal::ZERO {
            return Err(EngineError::invalid("pricing.default_markup_pct is negative"));
        }
        self.matching.validate()
    }

    pub fn write_template(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed creating config directory: {}", parent.display())
            })?;
        }
        fs::write(path, Self::default_template())
            .with_context(|| format!("failed writing config template: {}", path.display()))
    }

    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }

    pub fn default_template() -> String {
        let template = r#"[storage]
db_path = "~/.local/share/bid-oracle/opportunities.db"

[pricing]
default_markup_pct = 20.0

[matching]
threshold = 0.3

[matching.weights]
sector = 0.4
location = 0.3
keyword = 0.2
value = 0.1

[matching.location]
uf_match = 1.0
municipality_match = 0.8
baseline = 0.3
municipality_requires_same_uf = false

[matching.value]
unknown_value_score = 0.5
within_band_score = 0.8

[[matching.value.bands]]
tier = "free"
max_value = 100000.0
score_above = 0.3

[[matching.value.bands]]
tier = "basic"
max_value = 500000.0
score_above = 0.5

[matching.sector]
mode = "placeholder"
placeholder = 0.5
missing_score = 0.5

[matching.keyword]
mode = "placeholder"
placeholder = 0.6
missing_score = 0.6

[sources]
notices_url = ""
organizations_url = ""
timeout_secs = 12
connect_timeout_secs = 6
max_retries = 3
backoff_base_secs = 5
"#;
        template.to_string()
    }
}

impl MatchingConfig {
    pub fn validate(&self) -> EngineResult<()> {
        check_unit("matching.threshold", self.threshold)?;
        for (name, weight) in [
            ("sector", self.weights.sector),
            ("location", self.weights.location),
            ("keyword", self.weights.keyword),
            ("value", self.weights.value),
        ] {
            if !weight.is_finite() || weight < 0.0 {
                return Err(EngineError::invalid(format!(
                    "matching.weights.{name} must be a non-negative number"
                )));
            }
        }
        check_unit("matching.location.uf_match", self.location.uf_match)?;
        check_unit(
            "matching.location.municipality_match",
            self.location.municipality_match,
        )?;
        check_unit("matching.location.baseline", self.location.baseline)?;
        check_unit(
            "matching.value.unknown_value_score",
            self.value.unknown_value_score,
        )?;
        check_unit("matching.value.within_band_score", self.value.within_band_score)?;
        check_unit("matching.sector.placeholder", self.sector.placeholder)?;
        check_unit("matching.sector.missing_score", self.sector.missing_score)?;
        check_unit("matching.keyword.placeholder", self.keyword.placeholder)?;
        check_unit("matching.keyword.missing_score", self.keyword.missing_score)?;
        self.value.validate_bands()
    }
}

impl ValueConfig {
    pub fn band_for(&self, tier: SubscriptionTier) -> Option<&ValueBand> {
        self.bands.iter().find(|band| band.tier == tier)
    }

    /// Walking tiers upward, the value a tier absorbs may never shrink.
    /// A tier without a band absorbs any value.
    pub fn validate_bands(&self) -> EngineResult<()> {
        for band in &self.bands {
            check_unit("matching.value.bands.score_above", band.score_above)?;
            if band.max_value < Decimal::ZERO {
                return Err(EngineError::invalid(format!(
                    "value band for {} has negative max_value",
                    band.tier
                )));
            }
            if self.bands.iter().filter(|b| b.tier == band.tier).count() > 1 {
                return Err(EngineError::invalid(format!(
                    "duplicate value band for tier {}",
                    band.tier
                )));
            }
        }

        let mut previous: Option<(SubscriptionTier, Option<Decimal>)> = None;
        for tier in SubscriptionTier::ALL {
            let limit = self.band_for(tier).map(|band| band.max_value);
            if let Some((lower_tier, lower_limit)) = previous {
                let shrinks = match (lower_limit, limit) {
                    (None, Some(_)) => true,
                    (Some(lower), Some(upper)) => upper < lower,
                    _ => false,
                };
                if shrinks {
                    return Err(EngineError::invalid(format!(
                        "value band for {tier} absorbs less than {lower_tier}"
                    )));
                }
            }
            previous = Some((tier, limit));
        }
        Ok(())
    }
}

fn check_unit(name: &str, value: f64) -> EngineResult<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(EngineError::invalid(format!(
            "{name} must be within [0, 1], got {value}"
        )));
    }
    Ok(())
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            default_markup_pct: default_markup_pct(),
        }
    }
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            weights: WeightsConfig::default(),
            location: LocationConfig::default(),
            value: ValueConfig::default(),
            sector: SectorSignalConfig::default(),
            keyword: KeywordSignalConfig::default(),
        }
    }
}

impl Default for WeightsConfig {
    fn default() -> Self {
        Self {
            sector: default_sector_weight(),
            location: default_location_weight(),
            keyword: default_keyword_weight(),
            value: default_value_weight(),
        }
    }
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            uf_match: default_uf_match_score(),
            municipality_match: default_municipality_match_score(),
            baseline: default_location_baseline(),
            municipality_requires_same_uf: false,
        }
    }
}

impl Default for ValueConfig {
    fn default() -> Self {
        Self {
            unknown_value_score: default_unknown_value_score(),
            within_band_score: default_within_band_score(),
            bands: default_value_bands(),
        }
    }
}

impl Default for SectorSignalConfig {
    fn default() -> Self {
        Self {
            mode: default_sector_mode(),
            placeholder: default_sector_placeholder(),
            missing_score: default_sector_placeholder(),
        }
    }
}

impl Default for KeywordSignalConfig {
    fn default() -> Self {
        Self {
            mode: default_keyword_mode(),
            placeholder: default_keyword_placeholder(),
            missing_score: default_keyword_placeholder(),
        }
    }
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            notices_url: String::new(),
            organizations_url: String::new(),
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            max_retries: default_max_retries(),
            backoff_base_secs: default_backoff_base_secs(),
        }
    }
}

fn default_db_path() -> String {
    "~/.local/share/bid-oracle/opportunities.db".to_string()
}

fn default_markup_pct() -> Decimal {
    DEFAULT_MARKUP_PCT
}

fn default_threshold() -> f64 {
    0.3
}

fn default_sector_weight() -> f64 {
    0.4
}

fn default_location_weight() -> f64 {
    0.3
}

fn default_keyword_weight() -> f64 {
    0.2
}

fn default_value_weight() -> f64 {
    0.1
}

fn default_uf_match_score() -> f64 {
    1.0
}

fn default_municipality_match_score() -> f64 {
    0.8
}

fn default_location_baseline() -> f64 {
    0.3
}

fn default_unknown_value_score() -> f64 {
    0.5
}

fn default_within_band_score() -> f64 {
    0.8
}

fn default_value_bands() -> Vec<ValueBand> {
    vec![
        ValueBand {
            tier: SubscriptionTier::Free,
            max_value: dec!(100000),
            score_above: 0.3,
        },
        ValueBand {
            tier: SubscriptionTier::Basic,
            max_value: dec!(500000),
            score_above: 0.5,
        },
    ]
}

fn default_sector_mode() -> SectorSignalMode {
    SectorSignalMode::Placeholder
}

fn default_sector_placeholder() -> f64 {
    0.5
}

fn default_keyword_mode() -> KeywordSignalMode {
    KeywordSignalMode::Placeholder
}

fn default_keyword_placeholder() -> f64 {
    0.6
}

fn default_timeout_secs() -> u64 {
    12
}

fn default_connect_timeout_secs() -> u64 {
    6
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_base_secs() -> u64 {
    5
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn template_parses_to_defaults() {
        let parsed: Config = toml::from_str(&Config::default_template()).expect("template parses");
        parsed.validate().expect("template is valid");
        assert_eq!(parsed.pricing.default_markup_pct, dec!(20));
        assert_eq!(parsed.matching.value.bands, default_value_bands());
        assert_eq!(parsed.matching.weights, WeightsConfig::default());
        assert_eq!(parsed.matching.sector.mode, SectorSignalMode::Placeholder);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = Config::load(Some(&dir.path().join("absent.toml"))).expect("load");
        assert!((config.matching.threshold - 0.3).abs() < f64::EPSILON);
    }

    #[test]
    fn partial_file_keeps_remaining_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "[matching.location]\nmunicipality_requires_same_uf = true\n",
        )
        .expect("write");
        let config = Config::load(Some(&path)).expect("load");
        assert!(config.matching.location.municipality_requires_same_uf);
        assert!((config.matching.location.municipality_match - 0.8).abs() < f64::EPSILON);
        assert_eq!(config.matching.value.bands.len(), 2);
    }

    #[test]
    fn rejects_bands_where_higher_tier_absorbs_less() {
        let mut value = ValueConfig::default();
        value.bands[1].max_value = dec!(50000);
        assert!(value.validate_bands().is_err());

        let mut unbanded_free = ValueConfig::default();
        unbanded_free.bands.remove(0);
        assert!(unbanded_free.validate_bands().is_err());

        let mut extended = ValueConfig::default();
        extended.bands.push(ValueBand {
            tier: SubscriptionTier::Professional,
            max_value: dec!(2000000),
            score_above: 0.6,
        });
        assert!(extended.validate_bands().is_ok());

        let mut duplicated = ValueConfig::default();
        duplicated.bands[1].tier = SubscriptionTier::Free;
        assert!(duplicated.validate_bands().is_err());
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        let mut matching = MatchingConfig::default();
        matching.threshold = 1.5;
        assert!(matching.validate().is_err());
    }
}
