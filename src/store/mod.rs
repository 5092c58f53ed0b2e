pub mod memory;
pub mod migrations;
pub mod sqlite;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EngineResult;
use crate::opportunity::{Opportunity, OpportunityKey, OpportunityStatus, StatusUpdate};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    Created,
    Updated,
}

/// Persistence boundary for opportunities. The (organization, notice) pair is
/// unique and every method is atomic with respect to it.
pub trait OpportunityStore: Send + Sync {
    /// Creates the opportunity with status `new`, or only replaces its score
    /// when the pair already exists.
    fn upsert_score(
        &self,
        key: &OpportunityKey,
        score: f64,
        now: DateTime<Utc>,
    ) -> EngineResult<UpsertOutcome>;

    /// Replaces the score of an existing opportunity.
    fn set_score(&self, key: &OpportunityKey, score: f64, now: DateTime<Utc>) -> EngineResult<()>;

    fn get(&self, key: &OpportunityKey) -> EngineResult<Option<Opportunity>>;

    /// All opportunities, or only those in `statuses`, ordered by key.
    fn list(&self, statuses: Option<&[OpportunityStatus]>) -> EngineResult<Vec<Opportunity>>;

    fn update_status(
        &self,
        key: &OpportunityKey,
        update: &StatusUpdate,
        now: DateTime<Utc>,
    ) -> EngineResult<Opportunity>;
}
