use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::error::{EngineError, EngineResult};
use crate::sources::{parse_records, ProfileSource};
use crate::types::{NoticeProfile, OrganizationProfile};

/// Profiles exported to JSON files on disk.
#[derive(Debug, Clone)]
pub struct FileSource {
    notices_path: PathBuf,
    organizations_path: PathBuf,
}

impl FileSource {
    pub fn new(notices_path: impl Into<PathBuf>, organizations_path: impl Into<PathBuf>) -> Self {
        Self {
            notices_path: notices_path.into(),
            organizations_path: organizations_path.into(),
        }
    }
}

#[async_trait]
impl ProfileSource for FileSource {
    fn name(&self) -> &str {
        "file"
    }

    async fn fetch_notices(&self) -> EngineResult<Vec<NoticeProfile>> {
        read_records(&self.notices_path).await
    }

    async fn fetch_organizations(&self) -> EngineResult<Vec<OrganizationProfile>> {
        read_records(&self.organizations_path).await
    }
}

pub async fn read_records<T: DeserializeOwned>(path: &Path) -> EngineResult<Vec<T>> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| EngineError::transient(format!("failed reading {}: {e}", path.display())))?;
    let payload: Value = serde_json::from_str(&raw)
        .map_err(|e| EngineError::invalid(format!("invalid JSON in {}: {e}", path.display())))?;
    let records = parse_records(payload)?;
    debug!(path = %path.display(), count = records.len(), "profiles loaded");
    Ok(records)
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::sources::retry::{retry_with_backoff, RetryPolicy};

    #[tokio::test]
    async fn loads_both_profile_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let notices = dir.path().join("notices.json");
        let orgs = dir.path().join("organizations.json");
        fs::write(
            &notices,
            r#"{"items": [{"id": "n-7", "uf": "PR", "municipality": "Londrina", "estimated_value": 120000.5}]}"#,
        )
        .expect("write notices");
        fs::write(
            &orgs,
            r#"[{"id": "org-3", "tier": "basic", "uf": "PR", "billing_status": "suspended"}]"#,
        )
        .expect("write orgs");

        let source = FileSource::new(&notices, &orgs);
        let loaded = source.fetch_notices().await.expect("notices");
        assert_eq!(loaded[0].municipality, "Londrina");
        assert!(loaded[0].estimated_value.is_some());

        let organizations = source.fetch_organizations().await.expect("organizations");
        assert!(!organizations[0].is_eligible_for_matching());
    }

    #[tokio::test]
    async fn missing_file_is_transient() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = FileSource::new(dir.path().join("absent.json"), dir.path().join("absent.json"));
        let err = source.fetch_notices().await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn malformed_payload_is_invalid_and_not_retried() {
        let dir = tempfile::tempdir().expect("tempdir");
        let notices = dir.path().join("notices.json");
        fs::write(&notices, r#"{"data": [{"id": "n-1",]}"#).expect("write notices");
        let source = FileSource::new(&notices, &notices);
        let source = &source;

        let attempts = AtomicU32::new(0);
        let counter = &attempts;
        let policy = RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(1),
        };
        let err = retry_with_backoff(&policy, "fetch notices", || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            source.fetch_notices().await
        })
        .await
        .unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
