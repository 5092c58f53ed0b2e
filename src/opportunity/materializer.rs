use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::MatchingConfig;
use crate::error::{EngineError, EngineResult};
use crate::matching::scorer::RelevanceScorer;
use crate::opportunity::{BatchFailure, OpportunityKey};
use crate::store::{OpportunityStore, UpsertOutcome};
use crate::types::{NoticeProfile, OrganizationProfile};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MaterializeOutcome {
    pub organization_id: String,
    pub created: bool,
    pub score: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MaterializationReport {
    pub notice_id: String,
    pub outcomes: Vec<MaterializeOutcome>,
    pub below_threshold: usize,
    pub skipped_inactive: usize,
    pub failures: Vec<BatchFailure>,
}

impl MaterializationReport {
    pub fn success_count(&self) -> usize {
        self.outcomes.len()
    }

    pub fn created_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.created).count()
    }
}

/// Turns notices into opportunities for every organization whose relevance
/// clears the threshold.
pub struct Materializer {
    scorer: RelevanceScorer,
    store: Arc<dyn OpportunityStore>,
    threshold: f64,
}

impl Materializer {
    pub fn new(scorer: RelevanceScorer, store: Arc<dyn OpportunityStore>, threshold: f64) -> Self {
        Self {
            scorer,
            store,
            threshold,
        }
    }

    pub fn from_config(config: &MatchingConfig, store: Arc<dyn OpportunityStore>) -> Self {
        Self::new(RelevanceScorer::from_config(config), store, config.threshold)
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn materialize(
        &self,
        notice: &NoticeProfile,
        organizations: &[OrganizationProfile],
    ) -> MaterializationReport {
        self.materialize_at(notice, organizations, Utc::now())
    }

    pub fn materialize_at(
        &self,
        notice: &NoticeProfile,
        organizations: &[OrganizationProfile],
        now: DateTime<Utc>,
    ) -> MaterializationReport {
        let mut report = MaterializationReport {
            notice_id: notice.id.clone(),
            ..MaterializationReport::default()
        };

        for organization in organizations {
            if !organization.is_eligible_for_matching() {
                debug!(organization_id = %organization.id, "skipping inactive organization");
                report.skipped_inactive += 1;
                continue;
            }
            match self.materialize_one(notice, organization, now) {
                Ok(Some(outcome)) => report.outcomes.push(outcome),
                Ok(None) => report.below_threshold += 1,
                Err(err) => {
                    warn!(
                        organization_id = %organization.id,
                        notice_id = %notice.id,
                        error = %err,
                        "failed to materialize opportunity"
                    );
                    report.failures.push(BatchFailure {
                        organization_id: organization.id.clone(),
                        notice_id: notice.id.clone(),
                        reason: err.to_string(),
                    });
                }
            }
        }

        info!(
            notice_id = %notice.id,
            matched = report.success_count(),
            created = report.created_count(),
            below_threshold = report.below_threshold,
            failures = report.failures.len(),
            "notice materialized"
        );
        report
    }

    fn materialize_one(
        &self,
        notice: &NoticeProfile,
        organization: &OrganizationProfile,
        now: DateTime<Utc>,
    ) -> EngineResult<Option<MaterializeOutcome>> {
        let result = self.scorer.score(notice, organization)?;
        if !result.clears(self.threshold) {
            return Ok(None);
        }
        let key = OpportunityKey::new(&organization.id, &notice.id);
        let created = self.store.upsert_score(&key, result.score, now)? == UpsertOutcome::Created;
        if created {
            info!(
                organization_id = %organization.id,
                notice_id = %notice.id,
                score = result.score,
                "opportunity created"
            );
        }
        Ok(Some(MaterializeOutcome {
            organization_id: organization.id.clone(),
            created,
            score: result.score,
        }))
    }
}

/// Materializes several notices concurrently on blocking tasks that share one
/// store. Reports come back in the order of `notices`.
pub async fn materialize_notices(
    materializer: Arc<Materializer>,
    notices: Vec<NoticeProfile>,
    organizations: Arc<Vec<OrganizationProfile>>,
) -> EngineResult<Vec<MaterializationReport>> {
    let handles = notices
        .into_iter()
        .map(|notice| {
            let materializer = Arc::clone(&materializer);
            let organizations = Arc::clone(&organizations);
            tokio::task::spawn_blocking(move || materializer.materialize(&notice, &organizations))
        })
        .collect::<Vec<_>>();

    let mut reports = Vec::with_capacity(handles.len());
    for handle in handles {
        let report = handle
            .await
            .map_err(|e| EngineError::transient(format!("materialization task failed: {e}")))?;
        reports.push(report);
    }
    Ok(reports)
}
