use std::sync::Arc;

use crate::config::{KeywordSignalConfig, KeywordSignalMode, SectorSignalConfig, SectorSignalMode};
use crate::error::EngineResult;
use crate::matching::SignalScorer;
use crate::types::{NoticeProfile, OrganizationProfile};

/// Fixed score regardless of the profiles.
#[derive(Debug, Clone)]
pub struct ConstantSignal {
    name: &'static str,
    value: f64,
}

impl ConstantSignal {
    pub fn new(name: &'static str, value: f64) -> Self {
        Self { name, value }
    }
}

impl SignalScorer for ConstantSignal {
    fn name(&self) -> &str {
        self.name
    }

    fn score(&self, _notice: &NoticeProfile, _organization: &OrganizationProfile) -> EngineResult<f64> {
        Ok(self.value)
    }
}

/// Sector match over classification codes (CNAE). Codes are compared digit by
/// digit, so "4751-2/01" and "4751201" are the same activity.
#[derive(Debug, Clone)]
pub struct ClassificationSignal {
    missing_score: f64,
}

impl ClassificationSignal {
    pub fn new(missing_score: f64) -> Self {
        Self { missing_score }
    }
}

impl SignalScorer for ClassificationSignal {
    fn name(&self) -> &str {
        "classification"
    }

    fn score(&self, notice: &NoticeProfile, organization: &OrganizationProfile) -> EngineResult<f64> {
        let notice_code = notice
            .classification_code
            .as_deref()
            .map(digits)
            .unwrap_or_default();
        if notice_code.is_empty() {
            return Ok(self.missing_score);
        }
        let org_codes = organization
            .classification_codes()
            .map(digits)
            .filter(|code| !code.is_empty())
            .collect::<Vec<_>>();
        if org_codes.is_empty() {
            return Ok(self.missing_score);
        }
        let best = org_codes
            .iter()
            .map(|code| code_similarity(&notice_code, code))
            .fold(0.0_f64, f64::max);
        Ok(best)
    }
}

fn digits(code: &str) -> String {
    code.chars().filter(|c| c.is_ascii_digit()).collect()
}

fn code_similarity(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    let shared = a
        .chars()
        .zip(b.chars())
        .take_while(|(x, y)| x == y)
        .count();
    match shared {
        n if n >= 5 => 0.8,
        4 => 0.6,
        2 | 3 => 0.4,
        _ => 0.0,
    }
}

/// Share of the organization's interest keywords found in the notice object.
#[derive(Debug, Clone)]
pub struct KeywordOverlapSignal {
    missing_score: f64,
}

impl KeywordOverlapSignal {
    pub fn new(missing_score: f64) -> Self {
        Self { missing_score }
    }
}

impl SignalScorer for KeywordOverlapSignal {
    fn name(&self) -> &str {
        "keyword_overlap"
    }

    fn score(&self, notice: &NoticeProfile, organization: &OrganizationProfile) -> EngineResult<f64> {
        let text = notice.object.to_lowercase();
        let keywords = organization
            .keywords
            .iter()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect::<Vec<_>>();
        if text.trim().is_empty() || keywords.is_empty() {
            return Ok(self.missing_score);
        }
        let hits = keywords.iter().filter(|k| text.contains(k.as_str())).count();
        Ok(hits as f64 / keywords.len() as f64)
    }
}

pub fn sector_signal(config: &SectorSignalConfig) -> Arc<dyn SignalScorer> {
    match config.mode {
        SectorSignalMode::Placeholder => Arc::new(ConstantSignal::new("sector", config.placeholder)),
        SectorSignalMode::Classification => Arc::new(ClassificationSignal::new(config.missing_score)),
    }
}

pub fn keyword_signal(config: &KeywordSignalConfig) -> Arc<dyn SignalScorer> {
    match config.mode {
        KeywordSignalMode::Placeholder => Arc::new(ConstantSignal::new("keyword", config.placeholder)),
        KeywordSignalMode::Overlap => Arc::new(KeywordOverlapSignal::new(config.missing_score)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SubscriptionTier;

    fn org() -> OrganizationProfile {
        OrganizationProfile::new("org-1", SubscriptionTier::Basic, "MG", "Belo Horizonte")
    }

    #[test]
    fn classification_grades_by_shared_prefix() {
        let signal = ClassificationSignal::new(0.5);
        let org = org().with_classifications("4751-2/01", &["6201-5/01"]);
        let exact = NoticeProfile::new("n", "MG", "Contagem").with_classification("4751201");
        let class = NoticeProfile::new("n", "MG", "Contagem").with_classification("4751202");
        let group = NoticeProfile::new("n", "MG", "Contagem").with_classification("6201900");
        let division = NoticeProfile::new("n", "MG", "Contagem").with_classification("4711301");
        let unrelated = NoticeProfile::new("n", "MG", "Contagem").with_classification("8121400");

        assert_eq!(signal.score(&exact, &org).unwrap(), 1.0);
        assert_eq!(signal.score(&class, &org).unwrap(), 0.8);
        assert_eq!(signal.score(&group, &org).unwrap(), 0.6);
        assert_eq!(signal.score(&division, &org).unwrap(), 0.4);
        assert_eq!(signal.score(&unrelated, &org).unwrap(), 0.0);
    }

    #[test]
    fn classification_falls_back_when_codes_are_missing() {
        let signal = ClassificationSignal::new(0.5);
        let notice = NoticeProfile::new("n", "MG", "Contagem");
        assert_eq!(signal.score(&notice, &org()).unwrap(), 0.5);
        let coded = notice.with_classification("4751201");
        assert_eq!(signal.score(&coded, &org()).unwrap(), 0.5);
    }

    #[test]
    fn keyword_overlap_counts_case_insensitive_hits() {
        let signal = KeywordOverlapSignal::new(0.6);
        let org = org().with_keywords(&["Limpeza", "conservação", "jardinagem", "vigilância"]);
        let notice = NoticeProfile::new("n", "MG", "Contagem")
            .with_object("Contratação de serviços de LIMPEZA e conservação predial");
        assert_eq!(signal.score(&notice, &org).unwrap(), 0.5);

        let blank = NoticeProfile::new("n", "MG", "Contagem");
        assert_eq!(signal.score(&blank, &org).unwrap(), 0.6);
    }

    #[test]
    fn builds_placeholders_from_default_config() {
        let notice = NoticeProfile::new("n", "MG", "Contagem");
        let sector = sector_signal(&SectorSignalConfig::default());
        let keyword = keyword_signal(&KeywordSignalConfig::default());
        assert_eq!(sector.score(&notice, &org()).unwrap(), 0.5);
        assert_eq!(keyword.score(&notice, &org()).unwrap(), 0.6);
        assert_eq!(sector.name(), "sector");
    }
}
