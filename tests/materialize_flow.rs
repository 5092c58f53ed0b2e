use std::fs;
use std::sync::Arc;

use bid_oracle::config::{Config, KeywordSignalMode, SectorSignalMode};
use bid_oracle::error::EngineError;
use bid_oracle::matching::scorer::RelevanceScorer;
use bid_oracle::opportunity::materializer::{materialize_notices, Materializer};
use bid_oracle::opportunity::refresh::{index_by_id, refresh_scores};
use bid_oracle::opportunity::{OpportunityKey, OpportunityStatus, StatusUpdate};
use bid_oracle::sources::file::FileSource;
use bid_oracle::sources::ProfileSource;
use bid_oracle::store::sqlite::SqliteStore;
use bid_oracle::store::OpportunityStore;
use bid_oracle::types::{NoticeProfile, OrganizationProfile, SubscriptionTier};
use chrono::Utc;
use rust_decimal_macros::dec;

const NOTICES: &str = r#"[
  {
    "id": "pe-2024-001",
    "number": "001/2024",
    "agency": "Prefeitura de Campinas",
    "modality": "pregao_eletronico",
    "classification_code": "4751-2/01",
    "uf": "SP",
    "municipality": "Campinas",
    "estimated_value": 320000.0,
    "object": "Aquisicao de computadores e impressoras para escolas"
  },
  {
    "id": "pe-2024-002",
    "classification_code": "5611-2/01",
    "uf": "AM",
    "municipality": "Manaus",
    "object": "Fornecimento de merenda escolar"
  }
]"#;

const ORGANIZATIONS: &str = r#"{
  "data": [
    {
      "id": "tech-sp",
      "tier": "basic",
      "primary_classification": "4751201",
      "uf": "SP",
      "municipality": "Sorocaba",
      "keywords": ["computadores", "impressoras", "notebooks"]
    },
    {
      "id": "food-am",
      "tier": "free",
      "primary_classification": "5611-2/01",
      "uf": "AM",
      "municipality": "Manaus",
      "keywords": ["merenda"]
    },
    {
      "id": "tech-rs",
      "tier": "enterprise",
      "primary_classification": "4751-2/01",
      "uf": "RS",
      "municipality": "Porto Alegre",
      "billing_status": "canceled"
    }
  ]
}"#;

fn classification_config() -> Config {
    let mut config = Config::default();
    config.matching.sector.mode = SectorSignalMode::Classification;
    config.matching.keyword.mode = KeywordSignalMode::Overlap;
    config.matching.threshold = 0.5;
    config
}

async fn load_profiles() -> (Vec<NoticeProfile>, Vec<OrganizationProfile>) {
    let dir = tempfile::tempdir().expect("tempdir");
    let notices_path = dir.path().join("notices.json");
    let orgs_path = dir.path().join("organizations.json");
    fs::write(&notices_path, NOTICES).expect("write notices");
    fs::write(&orgs_path, ORGANIZATIONS).expect("write organizations");

    let source = FileSource::new(&notices_path, &orgs_path);
    let notices = source.fetch_notices().await.expect("notices");
    let organizations = source.fetch_organizations().await.expect("organizations");
    (notices, organizations)
}

#[test]
fn notices_become_opportunities_for_matching_organizations() {
    tokio_test::block_on(async {
        let (notices, organizations) = load_profiles().await;
        let config = classification_config();
        let store: Arc<dyn OpportunityStore> =
            Arc::new(SqliteStore::open_in_memory().expect("store"));
        let materializer = Arc::new(Materializer::from_config(&config.matching, store.clone()));

        let reports = materialize_notices(
            materializer.clone(),
            notices.clone(),
            Arc::new(organizations.clone()),
        )
        .await
        .expect("reports");
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|r| r.skipped_inactive == 1));
        assert!(reports.iter().all(|r| r.failures.is_empty()));

        let listed = store.list(None).expect("list");
        let keys = listed.iter().map(|o| o.key()).collect::<Vec<_>>();
        assert_eq!(
            keys,
            vec![
                OpportunityKey::new("food-am", "pe-2024-002"),
                OpportunityKey::new("tech-sp", "pe-2024-001"),
            ]
        );
        assert!(listed.iter().all(|o| o.status == OpportunityStatus::New));

        let again = materialize_notices(materializer, notices, Arc::new(organizations))
            .await
            .expect("reports");
        assert!(again.iter().all(|r| r.created_count() == 0));
        assert_eq!(store.list(None).expect("list").len(), 2);
    });
}

#[test]
fn lifecycle_and_refresh_over_sqlite() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db_path = dir.path().join("nested").join("opportunities.db");
    let store = SqliteStore::open(&db_path).expect("store");
    let config = classification_config();
    let materializer_store: Arc<dyn OpportunityStore> = Arc::new(store);
    let materializer = Materializer::from_config(&config.matching, materializer_store.clone());

    let notice = NoticeProfile::new("n-10", "MG", "Uberlandia")
        .with_classification("4751-2/01")
        .with_estimated_value(dec!(90000))
        .with_object("Compra de impressoras");
    let organization = OrganizationProfile::new("org-10", SubscriptionTier::Free, "MG", "Uberaba")
        .with_classifications("4751-2/01", &[])
        .with_keywords(&["impressoras"]);
    let report = materializer.materialize(&notice, std::slice::from_ref(&organization));
    assert_eq!(report.created_count(), 1);

    let key = OpportunityKey::new("org-10", "n-10");
    let now = Utc::now();
    let reviewing = materializer_store
        .update_status(
            &key,
            &StatusUpdate {
                status: OpportunityStatus::Reviewing,
                responsible: Some("maria".into()),
                justification: Some("catalogue match".into()),
            },
            now,
        )
        .expect("review");
    assert_eq!(reviewing.analyzed_at, Some(reviewing.updated_at));

    let err = materializer_store
        .update_status(&key, &StatusUpdate::to(OpportunityStatus::Won), now)
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput(_)));

    // The notice moves away from the organization: refresh lowers the score
    // but keeps the opportunity.
    let moved = NoticeProfile {
        uf: "AC".into(),
        municipality: "Rio Branco".into(),
        ..notice
    };
    let report = refresh_scores(
        materializer_store.as_ref(),
        &RelevanceScorer::from_config(&config.matching),
        &index_by_id(vec![moved], |n| n.id.as_str()),
        &index_by_id(vec![organization], |o| o.id.as_str()),
    )
    .expect("refresh");
    assert_eq!(report.refreshed.len(), 1);
    assert!(report.refreshed[0].score < report.refreshed[0].previous);

    let stored = materializer_store.get(&key).expect("get").expect("kept");
    assert_eq!(stored.status, OpportunityStatus::Reviewing);
    assert_eq!(stored.responsible.as_deref(), Some("maria"));
    assert!(db_path.exists());
}
