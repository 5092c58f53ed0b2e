use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::config::Config;
use crate::error::EngineError;
use crate::matching::scorer::RelevanceScorer;
use crate::matching::MatchScore;
use crate::opportunity::materializer::{materialize_notices, MaterializationReport, Materializer};
use crate::opportunity::refresh::{index_by_id, refresh_scores, RefreshReport};
use crate::opportunity::{Opportunity, OpportunityKey, OpportunityStatus, StatusUpdate};
use crate::pricing::{PricedItem, ProposalItem};
use crate::store::OpportunityStore;
use crate::types::{NoticeProfile, OrganizationProfile};

#[derive(Clone)]
pub struct ApiState {
    config: Config,
    scorer: RelevanceScorer,
    materializer: Arc<Materializer>,
    store: Arc<dyn OpportunityStore>,
}

impl ApiState {
    pub fn new(config: Config, store: Arc<dyn OpportunityStore>) -> Self {
        let scorer = RelevanceScorer::from_config(&config.matching);
        let materializer = Arc::new(Materializer::new(
            scorer.clone(),
            Arc::clone(&store),
            config.matching.threshold,
        ));
        Self {
            config,
            scorer,
            materializer,
            store,
        }
    }
}

#[derive(Debug, Serialize)]
struct ApiResponse<T: Serialize> {
    ok: bool,
    data: T,
}

#[derive(Debug, Serialize)]
struct ApiErrorBody {
    ok: bool,
    error: String,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn internal(error: impl std::fmt::Display) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: error.to_string(),
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(error: EngineError) -> Self {
        let status = match &error {
            EngineError::InvalidInput(_) | EngineError::MissingProfileData { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            EngineError::NotFound(_) => StatusCode::NOT_FOUND,
            EngineError::TransientExternal(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        Self {
            status,
            message: error.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            warn!(status = %self.status, "request failed: {}", self.message);
        }
        let body = Json(ApiErrorBody {
            ok: false,
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<ApiResponse<T>>, ApiError>;

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Debug, Deserialize)]
struct ScoreRequest {
    notice: NoticeProfile,
    organization: OrganizationProfile,
}

#[derive(Debug, Serialize)]
struct ScoreResponse {
    notice_id: String,
    organization_id: String,
    threshold: f64,
    clears_threshold: bool,
    #[serde(flatten)]
    result: MatchScore,
}

#[derive(Debug, Deserialize)]
struct ProfilesRequest {
    #[serde(default)]
    notices: Vec<NoticeProfile>,
    #[serde(default)]
    organizations: Vec<OrganizationProfile>,
}

#[derive(Debug, Default, Deserialize)]
struct OpportunitiesQuery {
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatusChangeRequest {
    organization_id: String,
    notice_id: String,
    #[serde(flatten)]
    update: StatusUpdate,
}

pub fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/v1/config", get(show_config))
        .route("/v1/prices", post(prices))
        .route("/v1/score", post(score))
        .route("/v1/materialize", post(materialize))
        .route("/v1/refresh", post(refresh))
        .route("/v1/opportunities", get(list_opportunities))
        .route("/v1/opportunities/status", post(change_status))
        .layer(cors)
        .with_state(state)
}

pub async fn run_server(state: ApiState, bind: SocketAddr) -> Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("REST API listening on http://{bind}");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health() -> Json<ApiResponse<HealthResponse>> {
    ok(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn show_config(State(state): State<ApiState>) -> Json<ApiResponse<Config>> {
    ok(state.config)
}

async fn prices(
    State(state): State<ApiState>,
    Json(item): Json<ProposalItem>,
) -> ApiResult<PricedItem> {
    let priced = item.price(state.config.pricing.default_markup_pct)?;
    Ok(ok(priced))
}

async fn score(
    State(state): State<ApiState>,
    Json(request): Json<ScoreRequest>,
) -> ApiResult<ScoreResponse> {
    let result = state.scorer.score(&request.notice, &request.organization)?;
    let threshold = state.config.matching.threshold;
    Ok(ok(ScoreResponse {
        notice_id: request.notice.id,
        organization_id: request.organization.id,
        threshold,
        clears_threshold: result.clears(threshold),
        result,
    }))
}

async fn materialize(
    State(state): State<ApiState>,
    Json(request): Json<ProfilesRequest>,
) -> ApiResult<Vec<MaterializationReport>> {
    if request.notices.is_empty() {
        return Err(ApiError::bad_request("notices cannot be empty"));
    }
    let reports = materialize_notices(
        state.materializer,
        request.notices,
        Arc::new(request.organizations),
    )
    .await?;
    Ok(ok(reports))
}

async fn refresh(
    State(state): State<ApiState>,
    Json(request): Json<ProfilesRequest>,
) -> ApiResult<RefreshReport> {
    let notices = index_by_id(request.notices, |n| n.id.as_str());
    let organizations = index_by_id(request.organizations, |o| o.id.as_str());
    let report = tokio::task::spawn_blocking(move || {
        refresh_scores(state.store.as_ref(), &state.scorer, &notices, &organizations)
    })
    .await
    .map_err(ApiError::internal)??;
    Ok(ok(report))
}

async fn list_opportunities(
    State(state): State<ApiState>,
    Query(query): Query<OpportunitiesQuery>,
) -> ApiResult<Vec<Opportunity>> {
    let statuses = query
        .status
        .as_deref()
        .map(parse_statuses)
        .transpose()?;
    let opportunities = state.store.list(statuses.as_deref())?;
    Ok(ok(opportunities))
}

async fn change_status(
    State(state): State<ApiState>,
    Json(request): Json<StatusChangeRequest>,
) -> ApiResult<Opportunity> {
    let key = OpportunityKey::new(request.organization_id, request.notice_id);
    let updated = state.store.update_status(&key, &request.update, Utc::now())?;
    info!(opportunity = %key, status = %updated.status, "opportunity status changed");
    Ok(ok(updated))
}

fn ok<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse { ok: true, data })
}

fn parse_statuses(raw: &str) -> std::result::Result<Vec<OpportunityStatus>, ApiError> {
    let mut seen = BTreeSet::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let status = OpportunityStatus::from_str(part)
            .map_err(|error| ApiError::bad_request(error.to_string()))?;
        seen.insert(status);
    }
    if seen.is_empty() {
        return Err(ApiError::bad_request("status filter cannot be empty"));
    }
    Ok(seen.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::pricing::CostComponent;
    use crate::store::memory::MemoryStore;
    use crate::types::SubscriptionTier;

    fn state() -> ApiState {
        ApiState::new(Config::default(), Arc::new(MemoryStore::new()))
    }

    #[test]
    fn parses_status_filters() {
        let statuses = parse_statuses("reviewing, new,new").expect("statuses");
        assert_eq!(
            statuses,
            vec![OpportunityStatus::New, OpportunityStatus::Reviewing]
        );
        assert!(parse_statuses("archived").is_err());
        assert!(parse_statuses(" , ").is_err());
    }

    #[test]
    fn engine_errors_map_to_http_statuses() {
        let not_found = ApiError::from(EngineError::NotFound("opportunity x/y".into()));
        assert_eq!(not_found.status, StatusCode::NOT_FOUND);
        let invalid = ApiError::from(EngineError::invalid("negative cost"));
        assert_eq!(invalid.status, StatusCode::UNPROCESSABLE_ENTITY);
        let transient = ApiError::from(EngineError::transient("db locked"));
        assert_eq!(transient.status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn prices_use_configured_default_markup() {
        let item = ProposalItem::new("Resma A4", "cx", dec!(5))
            .with_component("papel", CostComponent::absolute(dec!(100), "cx"));
        let Json(response) = prices(State(state()), Json(item)).await.expect("priced");
        assert!(response.ok);
        assert_eq!(response.data.pricing.moderate.unit_price, dec!(120));
    }

    #[tokio::test]
    async fn prices_out_of_decimal_range_are_unprocessable() {
        let item = ProposalItem::new("Usina", "un", dec!(1))
            .with_component("obra", CostComponent::absolute(dec!(70000000000000000000000000000), "un"));
        let Err(err) = prices(State(state()), Json(item)).await else {
            panic!("overflowing price accepted");
        };
        assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(err.message.contains("overflows"));
    }

    #[tokio::test]
    async fn materialize_then_move_through_review() {
        let state = state();
        let request = ProfilesRequest {
            notices: vec![NoticeProfile::new("n-1", "GO", "Goiania")],
            organizations: vec![OrganizationProfile::new(
                "org-1",
                SubscriptionTier::Basic,
                "GO",
                "Anapolis",
            )],
        };
        let Json(reports) = materialize(State(state.clone()), Json(request))
            .await
            .expect("materialized");
        assert_eq!(reports.data[0].created_count(), 1);

        let change = StatusChangeRequest {
            organization_id: "org-1".into(),
            notice_id: "n-1".into(),
            update: StatusUpdate::to(OpportunityStatus::Reviewing),
        };
        let Json(updated) = change_status(State(state.clone()), Json(change))
            .await
            .expect("status changed");
        assert!(updated.data.analyzed_at.is_some());

        let query = OpportunitiesQuery {
            status: Some("reviewing".into()),
        };
        let Json(listed) = list_opportunities(State(state), Query(query))
            .await
            .expect("listed");
        assert_eq!(listed.data.len(), 1);
    }

    #[tokio::test]
    async fn unknown_opportunity_is_not_found() {
        let change = StatusChangeRequest {
            organization_id: "org-9".into(),
            notice_id: "n-9".into(),
            update: StatusUpdate::to(OpportunityStatus::Reviewing),
        };
        let err = change_status(State(state()), Json(change)).await.unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }
}
