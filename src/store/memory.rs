use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use crate::error::{EngineError, EngineResult};
use crate::opportunity::{Opportunity, OpportunityKey, OpportunityStatus, StatusUpdate};
use crate::store::{OpportunityStore, UpsertOutcome};

#[derive(Debug, Default)]
pub struct MemoryStore {
    opportunities: Mutex<BTreeMap<OpportunityKey, Opportunity>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> EngineResult<MutexGuard<'_, BTreeMap<OpportunityKey, Opportunity>>> {
        self.opportunities
            .lock()
            .map_err(|_| EngineError::transient("opportunity store mutex poisoned"))
    }
}

impl OpportunityStore for MemoryStore {
    fn upsert_score(
        &self,
        key: &OpportunityKey,
        score: f64,
        now: DateTime<Utc>,
    ) -> EngineResult<UpsertOutcome> {
        let mut guard = self.lock()?;
        match guard.get_mut(key) {
            Some(existing) => {
                existing.match_score = score;
                existing.updated_at = now;
                Ok(UpsertOutcome::Updated)
            }
            None => {
                guard.insert(key.clone(), Opportunity::new(key, score, now));
                Ok(UpsertOutcome::Created)
            }
        }
    }

    fn set_score(&self, key: &OpportunityKey, score: f64, now: DateTime<Utc>) -> EngineResult<()> {
        let mut guard = self.lock()?;
        let existing = guard
            .get_mut(key)
            .ok_or_else(|| EngineError::NotFound(format!("opportunity {key}")))?;
        existing.match_score = score;
        existing.updated_at = now;
        Ok(())
    }

    fn get(&self, key: &OpportunityKey) -> EngineResult<Option<Opportunity>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn list(&self, statuses: Option<&[OpportunityStatus]>) -> EngineResult<Vec<Opportunity>> {
        let guard = self.lock()?;
        Ok(guard
            .values()
            .filter(|opp| statuses.map_or(true, |wanted| wanted.contains(&opp.status)))
            .cloned()
            .collect())
    }

    fn update_status(
        &self,
        key: &OpportunityKey,
        update: &StatusUpdate,
        now: DateTime<Utc>,
    ) -> EngineResult<Opportunity> {
        let mut guard = self.lock()?;
        let existing = guard
            .get_mut(key)
            .ok_or_else(|| EngineError::NotFound(format!("opportunity {key}")))?;
        existing.apply_status(update, now)?;
        Ok(existing.clone())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    #[test]
    fn upsert_creates_once_then_updates_score_only() {
        let store = MemoryStore::new();
        let key = OpportunityKey::new("org-1", "n-1");
        let now = Utc::now();
        assert_eq!(store.upsert_score(&key, 0.4, now).unwrap(), UpsertOutcome::Created);
        store
            .update_status(&key, &StatusUpdate::to(OpportunityStatus::Reviewing), now)
            .unwrap();
        assert_eq!(store.upsert_score(&key, 0.9, now).unwrap(), UpsertOutcome::Updated);

        let stored = store.get(&key).unwrap().expect("stored");
        assert_eq!(stored.match_score, 0.9);
        assert_eq!(stored.status, OpportunityStatus::Reviewing);
        assert_eq!(store.list(None).unwrap().len(), 1);
    }

    #[test]
    fn status_update_on_unknown_pair_is_not_found() {
        let store = MemoryStore::new();
        let err = store
            .update_status(
                &OpportunityKey::new("org-x", "n-x"),
                &StatusUpdate::to(OpportunityStatus::Reviewing),
                Utc::now(),
            )
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }
}
