pub const BASE_MIGRATION: &str = r#"
CREATE TABLE IF NOT EXISTS opportunities (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    organization_id TEXT NOT NULL,
    notice_id TEXT NOT NULL,
    status TEXT NOT NULL,
    match_score REAL NOT NULL,
    analyzed_at TEXT,
    responsible TEXT,
    justification TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (organization_id, notice_id)
);
CREATE INDEX IF NOT EXISTS idx_opportunities_org_status
    ON opportunities(organization_id, status);
CREATE INDEX IF NOT EXISTS idx_opportunities_score
    ON opportunities(match_score);
"#;
