use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionTier {
    Free,
    Basic,
    Professional,
    Enterprise,
}

impl SubscriptionTier {
    pub const ALL: [SubscriptionTier; 4] = [
        SubscriptionTier::Free,
        SubscriptionTier::Basic,
        SubscriptionTier::Professional,
        SubscriptionTier::Enterprise,
    ];

    pub fn as_slug(self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Basic => "basic",
            Self::Professional => "professional",
            Self::Enterprise => "enterprise",
        }
    }
}

impl fmt::Display for SubscriptionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_slug())
    }
}

#[derive(Debug, Error)]
#[error("unknown subscription tier: {0}")]
pub struct TierParseError(pub String);

impl FromStr for SubscriptionTier {
    type Err = TierParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "free" | "gratuito" => Ok(Self::Free),
            "basic" | "basico" => Ok(Self::Basic),
            "professional" | "profissional" => Ok(Self::Professional),
            "enterprise" | "empresarial" => Ok(Self::Enterprise),
            _ => Err(TierParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BillingStatus {
    #[default]
    Active,
    PastDue,
    Canceled,
    Suspended,
}

/// Notice metadata as handed over by the extraction collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NoticeProfile {
    pub id: String,
    #[serde(default)]
    pub number: String,
    #[serde(default)]
    pub agency: String,
    #[serde(default)]
    pub modality: Option<String>,
    #[serde(default)]
    pub classification_code: Option<String>,
    #[serde(default)]
    pub uf: String,
    #[serde(default)]
    pub municipality: String,
    #[serde(default)]
    pub estimated_value: Option<Decimal>,
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub opening_date: Option<NaiveDate>,
    #[serde(default)]
    pub closing_date: Option<NaiveDate>,
    #[serde(default)]
    pub extraction_confidence: Option<f64>,
}

impl NoticeProfile {
    pub fn new(id: impl Into<String>, uf: &str, municipality: &str) -> Self {
        Self {
            id: id.into(),
            number: String::new(),
            agency: String::new(),
            modality: None,
            classification_code: None,
            uf: uf.to_string(),
            municipality: municipality.to_string(),
            estimated_value: None,
            object: String::new(),
            opening_date: None,
            closing_date: None,
            extraction_confidence: None,
        }
    }

    pub fn with_classification(mut self, code: &str) -> Self {
        self.classification_code = Some(code.to_string());
        self
    }

    pub fn with_estimated_value(mut self, value: Decimal) -> Self {
        self.estimated_value = Some(value);
        self
    }

    pub fn with_object(mut self, object: &str) -> Self {
        self.object = object.to_string();
        self
    }

    pub fn with_closing_date(mut self, date: NaiveDate) -> Self {
        self.closing_date = Some(date);
        self
    }

    pub fn is_open(&self, today: NaiveDate) -> bool {
        match self.closing_date {
            Some(closing) => today <= closing,
            None => true,
        }
    }

    pub fn days_until_deadline(&self, today: NaiveDate) -> Option<i64> {
        self.closing_date
            .map(|closing| closing.signed_duration_since(today).num_days())
    }

    pub fn ensure_identified(&self) -> EngineResult<()> {
        if self.id.trim().is_empty() {
            return Err(EngineError::MissingProfileData {
                profile: "notice",
                field: "id",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrganizationProfile {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub primary_classification: Option<String>,
    #[serde(default)]
    pub secondary_classifications: Vec<String>,
    #[serde(default)]
    pub uf: String,
    #[serde(default)]
    pub municipality: String,
    pub tier: SubscriptionTier,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub billing_status: BillingStatus,
}

impl OrganizationProfile {
    pub fn new(id: impl Into<String>, tier: SubscriptionTier, uf: &str, municipality: &str) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            primary_classification: None,
            secondary_classifications: Vec::new(),
            uf: uf.to_string(),
            municipality: municipality.to_string(),
            tier,
            keywords: Vec::new(),
            active: true,
            billing_status: BillingStatus::Active,
        }
    }

    pub fn with_classifications(mut self, primary: &str, secondaries: &[&str]) -> Self {
        self.primary_classification = Some(primary.to_string());
        self.secondary_classifications = secondaries.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_keywords(mut self, keywords: &[&str]) -> Self {
        self.keywords = keywords.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_billing_status(mut self, status: BillingStatus) -> Self {
        self.billing_status = status;
        self
    }

    pub fn deactivated(mut self) -> Self {
        self.active = false;
        self
    }

    /// Primary code first, then secondaries, skipping blanks.
    pub fn classification_codes(&self) -> impl Iterator<Item = &str> {
        self.primary_classification
            .iter()
            .chain(self.secondary_classifications.iter())
            .map(|code| code.trim())
            .filter(|code| !code.is_empty())
    }

    pub fn is_billing_active(&self) -> bool {
        self.billing_status == BillingStatus::Active
    }

    pub fn can_access_features(&self) -> bool {
        match self.tier {
            SubscriptionTier::Free => self.is_billing_active(),
            _ => self.is_billing_active() && self.active,
        }
    }

    pub fn is_eligible_for_matching(&self) -> bool {
        self.active && self.is_billing_active()
    }

    pub fn ensure_identified(&self) -> EngineResult<()> {
        if self.id.trim().is_empty() {
            return Err(EngineError::MissingProfileData {
                profile: "organization",
                field: "id",
            });
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}
