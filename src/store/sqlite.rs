use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

use crate::error::{EngineError, EngineResult};
use crate::opportunity::{Opportunity, OpportunityKey, OpportunityStatus, StatusUpdate};
use crate::store::migrations::BASE_MIGRATION;
use crate::store::{OpportunityStore, UpsertOutcome};

const SELECT_COLUMNS: &str = "organization_id, notice_id, status, match_score, analyzed_at, \
                              responsible, justification, created_at, updated_at";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> EngineResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(EngineError::transient)?;
        }
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> EngineResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> EngineResult<Self> {
        conn.execute_batch(BASE_MIGRATION)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> EngineResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| EngineError::transient("sqlite connection mutex poisoned"))
    }
}

impl OpportunityStore for SqliteStore {
    fn upsert_score(
        &self,
        key: &OpportunityKey,
        score: f64,
        now: DateTime<Utc>,
    ) -> EngineResult<UpsertOutcome> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let stamp = now.to_rfc3339();
        let inserted = tx.execute(
            r#"
INSERT INTO opportunities(organization_id, notice_id, status, match_score, created_at, updated_at)
VALUES (?1, ?2, ?3, ?4, ?5, ?5)
ON CONFLICT(organization_id, notice_id) DO NOTHING
"#,
            params![
                key.organization_id,
                key.notice_id,
                OpportunityStatus::New.as_slug(),
                score,
                stamp
            ],
        )?;
        let outcome = if inserted == 1 {
            UpsertOutcome::Created
        } else {
            tx.execute(
                r#"
UPDATE opportunities SET match_score = ?3, updated_at = ?4
WHERE organization_id = ?1 AND notice_id = ?2
"#,
                params![key.organization_id, key.notice_id, score, stamp],
            )?;
            UpsertOutcome::Updated
        };
        tx.commit()?;
        Ok(outcome)
    }

    fn set_score(&self, key: &OpportunityKey, score: f64, now: DateTime<Utc>) -> EngineResult<()> {
        let conn = self.lock()?;
        let updated = conn.execute(
            r#"
UPDATE opportunities SET match_score = ?3, updated_at = ?4
WHERE organization_id = ?1 AND notice_id = ?2
"#,
            params![key.organization_id, key.notice_id, score, now.to_rfc3339()],
        )?;
        if updated == 0 {
            return Err(EngineError::NotFound(format!("opportunity {key}")));
        }
        Ok(())
    }

    fn get(&self, key: &OpportunityKey) -> EngineResult<Option<Opportunity>> {
        let conn = self.lock()?;
        select_one(&conn, key)
    }

    fn list(&self, statuses: Option<&[OpportunityStatus]>) -> EngineResult<Vec<Opportunity>> {
        let conn = self.lock()?;
        let rows = match statuses {
            Some([]) => Vec::new(),
            Some(statuses) => {
                let placeholders = vec!["?"; statuses.len()].join(", ");
                let sql = format!(
                    "SELECT {SELECT_COLUMNS} FROM opportunities WHERE status IN ({placeholders}) \
                     ORDER BY organization_id, notice_id"
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(
                        params_from_iter(statuses.iter().map(|s| s.as_slug())),
                        row_to_opportunity,
                    )?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                rows
            }
            None => {
                let sql = format!(
                    "SELECT {SELECT_COLUMNS} FROM opportunities ORDER BY organization_id, notice_id"
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map([], row_to_opportunity)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                rows
            }
        };
        Ok(rows)
    }

    fn update_status(
        &self,
        key: &OpportunityKey,
        update: &StatusUpdate,
        now: DateTime<Utc>,
    ) -> EngineResult<Opportunity> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let mut opportunity = select_one(&tx, key)?
            .ok_or_else(|| EngineError::NotFound(format!("opportunity {key}")))?;
        opportunity.apply_status(update, now)?;
        tx.execute(
            r#"
UPDATE opportunities
SET status = ?3, analyzed_at = ?4, responsible = ?5, justification = ?6, updated_at = ?7
WHERE organization_id = ?1 AND notice_id = ?2
"#,
            params![
                key.organization_id,
                key.notice_id,
                opportunity.status.as_slug(),
                opportunity.analyzed_at.map(|t| t.to_rfc3339()),
                opportunity.responsible,
                opportunity.justification,
                opportunity.updated_at.to_rfc3339()
            ],
        )?;
        tx.commit()?;
        Ok(opportunity)
    }
}

fn select_one(conn: &Connection, key: &OpportunityKey) -> EngineResult<Option<Opportunity>> {
    let sql = format!(
        "SELECT {SELECT_COLUMNS} FROM opportunities WHERE organization_id = ?1 AND notice_id = ?2"
    );
    let mut stmt = conn.prepare(&sql)?;
    let found = stmt
        .query_row(
            params![key.organization_id, key.notice_id],
            row_to_opportunity,
        )
        .optional()?;
    Ok(found)
}

fn row_to_opportunity(row: &rusqlite::Row<'_>) -> rusqlite::Result<Opportunity> {
    let status_raw: String = row.get(2)?;
    let status = status_raw
        .parse::<OpportunityStatus>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?;
    let analyzed_at = row
        .get::<_, Option<String>>(4)?
        .map(|raw| parse_timestamp(4, &raw))
        .transpose()?;
    Ok(Opportunity {
        organization_id: row.get(0)?,
        notice_id: row.get(1)?,
        status,
        match_score: row.get(3)?,
        analyzed_at,
        responsible: row.get(5)?,
        justification: row.get(6)?,
        created_at: parse_timestamp(7, &row.get::<_, String>(7)?)?,
        updated_at: parse_timestamp(8, &row.get::<_, String>(8)?)?,
    })
}

fn parse_timestamp(column: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(e)))
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::*;

    #[test]
    fn upsert_is_keyed_by_pair() {
        let store = SqliteStore::open_in_memory().expect("store");
        let now = Utc.with_ymd_and_hms(2024, 2, 10, 8, 30, 0).unwrap();
        let key = OpportunityKey::new("org-1", "n-1");
        let other = OpportunityKey::new("org-2", "n-1");

        assert_eq!(store.upsert_score(&key, 0.45, now).unwrap(), UpsertOutcome::Created);
        assert_eq!(store.upsert_score(&other, 0.31, now).unwrap(), UpsertOutcome::Created);
        let later = now + Duration::minutes(5);
        assert_eq!(store.upsert_score(&key, 0.72, later).unwrap(), UpsertOutcome::Updated);

        let stored = store.get(&key).unwrap().expect("stored");
        assert_eq!(stored.match_score, 0.72);
        assert_eq!(stored.status, OpportunityStatus::New);
        assert_eq!(stored.created_at, now);
        assert_eq!(stored.updated_at, later);
        assert_eq!(store.list(None).unwrap().len(), 2);
    }

    #[test]
    fn status_round_trips_through_sqlite() {
        let store = SqliteStore::open_in_memory().expect("store");
        let now = Utc.with_ymd_and_hms(2024, 2, 10, 8, 30, 0).unwrap();
        let key = OpportunityKey::new("org-1", "n-1");
        store.upsert_score(&key, 0.5, now).unwrap();

        let review = StatusUpdate {
            status: OpportunityStatus::Reviewing,
            responsible: Some("joao".to_string()),
            justification: None,
        };
        let updated = store.update_status(&key, &review, now).unwrap();
        assert_eq!(updated.analyzed_at, Some(now));

        let reviewing = store
            .list(Some(&[OpportunityStatus::Reviewing]))
            .unwrap();
        assert_eq!(reviewing.len(), 1);
        assert_eq!(reviewing[0].responsible.as_deref(), Some("joao"));
        assert!(store.list(Some(&[OpportunityStatus::New])).unwrap().is_empty());
        assert!(store.list(Some(&[])).unwrap().is_empty());
    }

    #[test]
    fn rejected_transition_leaves_row_untouched() {
        let store = SqliteStore::open_in_memory().expect("store");
        let now = Utc::now();
        let key = OpportunityKey::new("org-1", "n-1");
        store.upsert_score(&key, 0.5, now).unwrap();
        assert!(store
            .update_status(&key, &StatusUpdate::to(OpportunityStatus::Won), now)
            .is_err());
        let stored = store.get(&key).unwrap().expect("stored");
        assert_eq!(stored.status, OpportunityStatus::New);
    }

    #[test]
    fn set_score_requires_existing_pair() {
        let store = SqliteStore::open_in_memory().expect("store");
        let err = store
            .set_score(&OpportunityKey::new("org-9", "n-9"), 0.4, Utc::now())
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }
}
