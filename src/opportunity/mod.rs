pub mod materializer;
pub mod refresh;

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum OpportunityStatus {
    New,
    Reviewing,
    ProposalSent,
    Won,
    Lost,
    Withdrawn,
    Canceled,
}

impl OpportunityStatus {
    pub const ALL: [OpportunityStatus; 7] = [
        OpportunityStatus::New,
        OpportunityStatus::Reviewing,
        OpportunityStatus::ProposalSent,
        OpportunityStatus::Won,
        OpportunityStatus::Lost,
        OpportunityStatus::Withdrawn,
        OpportunityStatus::Canceled,
    ];

    /// Statuses the periodic sweep keeps scoring.
    pub const REFRESHABLE: [OpportunityStatus; 2] =
        [OpportunityStatus::New, OpportunityStatus::Reviewing];

    pub fn as_slug(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Reviewing => "reviewing",
            Self::ProposalSent => "proposal_sent",
            Self::Won => "won",
            Self::Lost => "lost",
            Self::Withdrawn => "withdrawn",
            Self::Canceled => "canceled",
        }
    }

    pub fn is_active(self) -> bool {
        matches!(self, Self::New | Self::Reviewing | Self::ProposalSent)
    }

    pub fn is_refreshable(self) -> bool {
        Self::REFRESHABLE.contains(&self)
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Won | Self::Lost | Self::Withdrawn | Self::Canceled
        )
    }

    pub fn can_transition_to(self, next: OpportunityStatus) -> bool {
        use OpportunityStatus::*;
        matches!(
            (self, next),
            (New, Reviewing)
                | (New, Canceled)
                | (Reviewing, Reviewing)
                | (Reviewing, ProposalSent)
                | (Reviewing, Canceled)
                | (ProposalSent, Won)
                | (ProposalSent, Lost)
                | (ProposalSent, Withdrawn)
                | (ProposalSent, Canceled)
        )
    }
}

impl Display for OpportunityStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_slug())
    }
}

#[derive(Debug, Error)]
#[error("unknown opportunity status: {0}")]
pub struct StatusParseError(pub String);

impl FromStr for OpportunityStatus {
    type Err = StatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|status| status.as_slug() == normalized)
            .ok_or_else(|| StatusParseError(s.to_string()))
    }
}

/// Unique pairing of an organization with a notice.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OpportunityKey {
    pub organization_id: String,
    pub notice_id: String,
}

impl OpportunityKey {
    pub fn new(organization_id: impl Into<String>, notice_id: impl Into<String>) -> Self {
        Self {
            organization_id: organization_id.into(),
            notice_id: notice_id.into(),
        }
    }
}

impl Display for OpportunityKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.organization_id, self.notice_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Opportunity {
    pub organization_id: String,
    pub notice_id: String,
    pub status: OpportunityStatus,
    pub match_score: f64,
    pub analyzed_at: Option<DateTime<Utc>>,
    pub responsible: Option<String>,
    pub justification: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Opportunity {
    pub fn new(key: &OpportunityKey, match_score: f64, now: DateTime<Utc>) -> Self {
        Self {
            organization_id: key.organization_id.clone(),
            notice_id: key.notice_id.clone(),
            status: OpportunityStatus::New,
            match_score,
            analyzed_at: None,
            responsible: None,
            justification: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn key(&self) -> OpportunityKey {
        OpportunityKey::new(&self.organization_id, &self.notice_id)
    }

    /// Moves the opportunity along its lifecycle. Entering `reviewing` stamps
    /// `analyzed_at`; responsible and justification only change when given.
    pub fn apply_status(&mut self, update: &StatusUpdate, now: DateTime<Utc>) -> EngineResult<()> {
        if !self.status.can_transition_to(update.status) {
            return Err(EngineError::invalid(format!(
                "opportunity {} cannot move from {} to {}",
                self.key(),
                self.status,
                update.status
            )));
        }
        self.status = update.status;
        if let Some(responsible) = &update.responsible {
            self.responsible = Some(responsible.clone());
        }
        if let Some(justification) = &update.justification {
            self.justification = Some(justification.clone());
        }
        if update.status == OpportunityStatus::Reviewing {
            self.analyzed_at = Some(now);
        }
        self.updated_at = now;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusUpdate {
    pub status: OpportunityStatus,
    #[serde(default)]
    pub responsible: Option<String>,
    #[serde(default)]
    pub justification: Option<String>,
}

impl StatusUpdate {
    pub fn to(status: OpportunityStatus) -> Self {
        Self {
            status,
            responsible: None,
            justification: None,
        }
    }
}

/// A unit of work that failed inside a batch; the rest of the batch went on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchFailure {
    pub organization_id: String,
    pub notice_id: String,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::*;

    fn opportunity() -> Opportunity {
        let created = Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap();
        Opportunity::new(&OpportunityKey::new("org-1", "n-1"), 0.62, created)
    }

    #[test]
    fn entering_review_stamps_analysis_time() {
        let mut opp = opportunity();
        let now = opp.created_at + Duration::hours(3);
        let update = StatusUpdate {
            status: OpportunityStatus::Reviewing,
            responsible: Some("ana".to_string()),
            justification: None,
        };
        opp.apply_status(&update, now).expect("transition");
        assert_eq!(opp.status, OpportunityStatus::Reviewing);
        assert_eq!(opp.analyzed_at, Some(now));
        assert_eq!(opp.responsible.as_deref(), Some("ana"));
        assert_eq!(opp.updated_at, now);
    }

    #[test]
    fn follows_lifecycle_to_terminal_states() {
        let mut opp = opportunity();
        let now = opp.created_at;
        for status in [
            OpportunityStatus::Reviewing,
            OpportunityStatus::ProposalSent,
            OpportunityStatus::Won,
        ] {
            opp.apply_status(&StatusUpdate::to(status), now).expect("transition");
        }
        assert!(opp.status.is_terminal());
        assert!(opp
            .apply_status(&StatusUpdate::to(OpportunityStatus::Reviewing), now)
            .is_err());
    }

    #[test]
    fn rejects_skipping_review() {
        let mut opp = opportunity();
        let err = opp
            .apply_status(&StatusUpdate::to(OpportunityStatus::ProposalSent), opp.created_at)
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)));
        assert_eq!(opp.status, OpportunityStatus::New);
    }

    #[test]
    fn keeps_existing_justification_when_not_supplied() {
        let mut opp = opportunity();
        let now = opp.created_at;
        opp.apply_status(
            &StatusUpdate {
                status: OpportunityStatus::Reviewing,
                responsible: None,
                justification: Some("fits our catalogue".to_string()),
            },
            now,
        )
        .expect("transition");
        opp.apply_status(&StatusUpdate::to(OpportunityStatus::Canceled), now)
            .expect("transition");
        assert_eq!(opp.justification.as_deref(), Some("fits our catalogue"));
    }

    #[test]
    fn status_classification() {
        assert!(OpportunityStatus::ProposalSent.is_active());
        assert!(!OpportunityStatus::ProposalSent.is_refreshable());
        assert!(OpportunityStatus::Reviewing.is_refreshable());
        assert_eq!(
            "proposal-sent".parse::<OpportunityStatus>().unwrap(),
            OpportunityStatus::ProposalSent
        );
    }
}
