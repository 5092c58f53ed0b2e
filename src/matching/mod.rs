pub mod scorer;
pub mod signals;

use serde::{Deserialize, Serialize};

use crate::error::EngineResult;
use crate::types::{NoticeProfile, OrganizationProfile};

/// Relevance of one notice for one organization, with the sub-scores behind it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct MatchScore {
    pub score: f64,
    pub components: ScoreComponents,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ScoreComponents {
    pub sector: f64,
    pub location: f64,
    pub keyword: f64,
    pub value: f64,
}

impl MatchScore {
    pub fn clears(&self, threshold: f64) -> bool {
        self.score >= threshold
    }
}

/// A pluggable sub-score. Implementations must be deterministic and return a
/// value within `[0, 1]`.
pub trait SignalScorer: Send + Sync {
    fn name(&self) -> &str;
    fn score(&self, notice: &NoticeProfile, organization: &OrganizationProfile) -> EngineResult<f64>;
}
