use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{EngineError, EngineResult};
use crate::matching::scorer::RelevanceScorer;
use crate::opportunity::{BatchFailure, Opportunity, OpportunityKey, OpportunityStatus};
use crate::store::OpportunityStore;
use crate::types::{NoticeProfile, OrganizationProfile};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RefreshedScore {
    pub key: OpportunityKey,
    pub previous: f64,
    pub score: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RefreshReport {
    pub refreshed: Vec<RefreshedScore>,
    pub failures: Vec<BatchFailure>,
}

/// Profiles keyed by their identifier, the shape the sweep looks them up in.
pub fn index_by_id<T, F>(profiles: impl IntoIterator<Item = T>, id: F) -> BTreeMap<String, T>
where
    F: Fn(&T) -> &str,
{
    profiles
        .into_iter()
        .map(|profile| (id(&profile).to_string(), profile))
        .collect()
}

pub fn refresh_scores(
    store: &dyn OpportunityStore,
    scorer: &RelevanceScorer,
    notices: &BTreeMap<String, NoticeProfile>,
    organizations: &BTreeMap<String, OrganizationProfile>,
) -> EngineResult<RefreshReport> {
    refresh_scores_at(store, scorer, notices, organizations, Utc::now())
}

/// Re-scores every opportunity still under consideration. New scores are
/// written even below the threshold; nothing is retracted.
pub fn refresh_scores_at(
    store: &dyn OpportunityStore,
    scorer: &RelevanceScorer,
    notices: &BTreeMap<String, NoticeProfile>,
    organizations: &BTreeMap<String, OrganizationProfile>,
    now: DateTime<Utc>,
) -> EngineResult<RefreshReport> {
    let pending = store.list(Some(&OpportunityStatus::REFRESHABLE))?;
    let mut report = RefreshReport::default();

    for opportunity in pending {
        match refresh_one(store, scorer, notices, organizations, &opportunity, now) {
            Ok(score) => report.refreshed.push(RefreshedScore {
                key: opportunity.key(),
                previous: opportunity.match_score,
                score,
            }),
            Err(err) => {
                warn!(
                    organization_id = %opportunity.organization_id,
                    notice_id = %opportunity.notice_id,
                    error = %err,
                    "failed to refresh opportunity score"
                );
                report.failures.push(BatchFailure {
                    organization_id: opportunity.organization_id.clone(),
                    notice_id: opportunity.notice_id.clone(),
                    reason: err.to_string(),
                });
            }
        }
    }

    info!(
        refreshed = report.refreshed.len(),
        failures = report.failures.len(),
        "score refresh finished"
    );
    Ok(report)
}

fn refresh_one(
    store: &dyn OpportunityStore,
    scorer: &RelevanceScorer,
    notices: &BTreeMap<String, NoticeProfile>,
    organizations: &BTreeMap<String, OrganizationProfile>,
    opportunity: &Opportunity,
    now: DateTime<Utc>,
) -> EngineResult<f64> {
    let notice = notices
        .get(&opportunity.notice_id)
        .ok_or(EngineError::MissingProfileData {
            profile: "notice",
            field: "profile",
        })?;
    let organization = organizations
        .get(&opportunity.organization_id)
        .ok_or(EngineError::MissingProfileData {
            profile: "organization",
            field: "profile",
        })?;
    let result = scorer.score(notice, organization)?;
    store.set_score(&opportunity.key(), result.score, now)?;
    Ok(result.score)
}
