use std::sync::Arc;

use crate::config::{LocationConfig, MatchingConfig, ValueConfig, WeightsConfig};
use crate::error::{EngineError, EngineResult};
use crate::matching::signals::{keyword_signal, sector_signal};
use crate::matching::{MatchScore, ScoreComponents, SignalScorer};
use crate::types::{NoticeProfile, OrganizationProfile};

/// Weighted relevance of a notice for an organization. Holds no mutable state;
/// the same pair of profiles always yields the same score.
#[derive(Clone)]
pub struct RelevanceScorer {
    weights: WeightsConfig,
    location: LocationConfig,
    value: ValueConfig,
    sector: Arc<dyn SignalScorer>,
    keyword: Arc<dyn SignalScorer>,
}

impl RelevanceScorer {
    pub fn from_config(config: &MatchingConfig) -> Self {
        Self {
            weights: config.weights,
            location: config.location.clone(),
            value: config.value.clone(),
            sector: sector_signal(&config.sector),
            keyword: keyword_signal(&config.keyword),
        }
    }

    pub fn with_sector_signal(mut self, signal: Arc<dyn SignalScorer>) -> Self {
        self.sector = signal;
        self
    }

    pub fn with_keyword_signal(mut self, signal: Arc<dyn SignalScorer>) -> Self {
        self.keyword = signal;
        self
    }

    pub fn score(
        &self,
        notice: &NoticeProfile,
        organization: &OrganizationProfile,
    ) -> EngineResult<MatchScore> {
        notice.ensure_identified()?;
        organization.ensure_identified()?;

        let components = ScoreComponents {
            sector: checked_signal(self.sector.as_ref(), notice, organization)?,
            location: self.location_score(notice, organization),
            keyword: checked_signal(self.keyword.as_ref(), notice, organization)?,
            value: self.value_score(notice, organization),
        };
        let weighted = self.weights.sector * components.sector
            + self.weights.location * components.location
            + self.weights.keyword * components.keyword
            + self.weights.value * components.value;
        if !weighted.is_finite() {
            return Err(EngineError::invalid(format!(
                "weighted score for notice {} and organization {} is not a number",
                notice.id, organization.id
            )));
        }

        Ok(MatchScore {
            score: weighted.clamp(0.0, 1.0),
            components,
        })
    }

    pub fn location_score(&self, notice: &NoticeProfile, organization: &OrganizationProfile) -> f64 {
        let same_uf = same_place(&notice.uf, &organization.uf);
        if same_uf {
            return self.location.uf_match;
        }
        let same_municipality = same_place(&notice.municipality, &organization.municipality);
        if same_municipality && !self.location.municipality_requires_same_uf {
            return self.location.municipality_match;
        }
        self.location.baseline
    }

    pub fn value_score(&self, notice: &NoticeProfile, organization: &OrganizationProfile) -> f64 {
        let Some(value) = notice.estimated_value else {
            return self.value.unknown_value_score;
        };
        match self.value.band_for(organization.tier) {
            Some(band) if value > band.max_value => band.score_above,
            _ => self.value.within_band_score,
        }
    }
}

fn same_place(a: &str, b: &str) -> bool {
    let (a, b) = (a.trim(), b.trim());
    !a.is_empty() && a.to_lowercase() == b.to_lowercase()
}

fn checked_signal(
    signal: &dyn SignalScorer,
    notice: &NoticeProfile,
    organization: &OrganizationProfile,
) -> EngineResult<f64> {
    let value = signal.score(notice, organization)?;
    if !(0.0..=1.0).contains(&value) {
        return Err(EngineError::invalid(format!(
            "{} signal produced {value}, outside [0, 1]",
            signal.name()
        )));
    }
    Ok(value)
}
