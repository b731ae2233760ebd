//! HTTP API for measurement intake, report browsing, health checks and metrics

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use sentinel_lib::{
    forecast::SeasonClock,
    health::{components, ComponentStatus, HealthRegistry},
    models::{CyberReport, MonitoredResource, ReportId, ResourceId},
    observability::SentinelMetrics,
    orchestrator::{TickDispatcher, TickError},
    store::{ReportStore, ResourceRegistry, StoreError},
};
use serde::Deserialize;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{info, warn};

const DEFAULT_PAGE_SIZE: usize = 20;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub metrics: SentinelMetrics,
    pub dispatcher: Arc<TickDispatcher>,
    pub reports: Arc<dyn ReportStore>,
    pub resources: Arc<dyn ResourceRegistry>,
    pub clock: SeasonClock,
}

/// One measurement submitted for forecasting
#[derive(Debug, Deserialize)]
pub struct TickSubmission {
    pub address: IpAddr,
    #[serde(default)]
    pub name: Option<String>,
    pub actual_value: f64,
    /// Derived from the current time when omitted
    #[serde(default)]
    pub season_index: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    pub page: Option<usize>,
    #[serde(default)]
    pub page_size: Option<usize>,
}

/// Error mapped onto an HTTP status with a JSON body
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl From<StoreError> for ApiError {
    fn from(error: StoreError) -> Self {
        let status = match &error {
            StoreError::DuplicateTick { .. } => StatusCode::CONFLICT,
            StoreError::ReportNotFound(_) | StoreError::ResourceNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            StoreError::Unavailable(_) | StoreError::Timeout(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        Self {
            status,
            message: error.to_string(),
        }
    }
}

impl From<TickError> for ApiError {
    fn from(error: TickError) -> Self {
        match error {
            TickError::Store(e) => e.into(),
            other => Self {
                status: StatusCode::SERVICE_UNAVAILABLE,
                message: other.to_string(),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({ "error": self.message })),
        )
            .into_response()
    }
}

/// Forecast one measurement and persist its report
async fn submit_tick(
    State(state): State<Arc<AppState>>,
    Json(submission): Json<TickSubmission>,
) -> Result<(StatusCode, Json<CyberReport>), ApiError> {
    let registered = state
        .resources
        .lookup_or_create(submission.address, submission.name.as_deref())
        .await;
    match &registered {
        Ok(_) => state.health_registry.set_healthy(components::INTAKE).await,
        Err(e) => {
            state
                .health_registry
                .set_degraded(components::INTAKE, format!("resource registry: {e}"))
                .await
        }
    }
    let resource_id = registered?;

    if let Ok(count) = state.resources.count().await {
        state.metrics.set_resources_monitored(count as i64);
    }

    let season_index = submission
        .season_index
        .unwrap_or_else(|| state.clock.current_index());

    let result = state
        .dispatcher
        .submit(resource_id, season_index, submission.actual_value)
        .await;

    match &result {
        Err(TickError::Store(e)) => state.health_registry.observe_store_error(Some(e)).await,
        Err(e @ TickError::ShuttingDown) => {
            state
                .health_registry
                .set_unhealthy(components::INTAKE, e.to_string())
                .await
        }
        Err(e) => {
            state
                .health_registry
                .set_degraded(components::FORECASTER, e.to_string())
                .await
        }
        Ok(_) => {
            state.health_registry.observe_store_error(None).await;
            state.health_registry.set_healthy(components::FORECASTER).await;
        }
    }

    let report = result.map_err(|e| {
        warn!(
            address = %submission.address,
            resource_id = resource_id,
            season_index = season_index,
            error = %e,
            "Tick rejected"
        );
        ApiError::from(e)
    })?;

    Ok((StatusCode::CREATED, Json(report)))
}

async fn get_report(
    State(state): State<Arc<AppState>>,
    Path(id): Path<ReportId>,
) -> Result<Json<CyberReport>, ApiError> {
    let found = state.reports.find_by_id(id).await;
    state.health_registry.observe_store_result(&found).await;
    Ok(Json(found?))
}

async fn list_resources(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<MonitoredResource>>, ApiError> {
    Ok(Json(state.resources.list().await?))
}

async fn list_reports(
    State(state): State<Arc<AppState>>,
    Path(resource_id): Path<ResourceId>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Vec<CyberReport>>, ApiError> {
    // Unknown resources are a 404 rather than an empty page
    state.resources.get(resource_id).await?;

    let reports = state
        .reports
        .list_latest(
            resource_id,
            query.page.unwrap_or(1),
            query.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
        )
        .await;
    state.health_registry.observe_store_result(&reports).await;
    Ok(Json(reports?))
}

/// Health check response - returns 503 only when a component is unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = if health.status == ComponentStatus::Unhealthy {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        warn!(error = %e, "Failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ticks", post(submit_tick))
        .route("/reports/:id", get(get_report))
        .route("/resources", get(list_resources))
        .route("/resources/:id/reports", get(list_reports))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use sentinel_lib::forecast::ForecastParameters;
    use sentinel_lib::orchestrator::ForecastStepOrchestrator;
    use sentinel_lib::store::{InMemoryReportStore, InMemoryResourceRegistry};
    use tower::ServiceExt;

    /// Registry whose backend is unreachable
    struct OfflineRegistry;

    #[async_trait::async_trait]
    impl ResourceRegistry for OfflineRegistry {
        async fn lookup_or_create(
            &self,
            _address: IpAddr,
            _name: Option<&str>,
        ) -> Result<ResourceId, StoreError> {
            Err(StoreError::Unavailable("registry offline".to_string()))
        }

        async fn get(&self, id: ResourceId) -> Result<MonitoredResource, StoreError> {
            Err(StoreError::ResourceNotFound(id))
        }

        async fn list(&self) -> Result<Vec<MonitoredResource>, StoreError> {
            Ok(Vec::new())
        }

        async fn count(&self) -> Result<usize, StoreError> {
            Ok(0)
        }
    }

    async fn setup_test_state() -> Arc<AppState> {
        state_with_registry(Arc::new(InMemoryResourceRegistry::new())).await
    }

    async fn state_with_registry(resources: Arc<dyn ResourceRegistry>) -> Arc<AppState> {
        let params = ForecastParameters::new(0.9, 0.5, 0.5, 2.0, 24, 60).unwrap();
        let reports: Arc<dyn ReportStore> = Arc::new(InMemoryReportStore::new());
        let orchestrator = Arc::new(ForecastStepOrchestrator::new(params, reports.clone()));

        let health_registry = HealthRegistry::new();
        health_registry.register(components::INTAKE).await;
        health_registry.register(components::STORE).await;

        Arc::new(AppState {
            health_registry,
            metrics: SentinelMetrics::new(),
            dispatcher: Arc::new(TickDispatcher::new(orchestrator)),
            reports,
            resources,
            clock: SeasonClock::new(&params),
        })
    }

    async fn send(state: &Arc<AppState>, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = create_router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if body.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };
        (status, json)
    }

    fn post_tick(body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/ticks")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_submit_ticks_flags_anomaly() {
        let state = setup_test_state().await;

        let (status, first) = send(
            &state,
            post_tick(serde_json::json!({
                "address": "192.168.1.10",
                "name": "web",
                "actual_value": 100.0,
                "season_index": 0
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(first["aberrant_behavior"], false);
        assert_eq!(first["baseline"], 100.0);

        let (status, second) = send(
            &state,
            post_tick(serde_json::json!({
                "address": "192.168.1.10",
                "actual_value": 105.0,
                "season_index": 1
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(second["resource_id"], first["resource_id"]);
        assert_eq!(second["aberrant_behavior"], true);
        assert_eq!(second["confidence_band_upper_value"], 100.0);
    }

    #[tokio::test]
    async fn test_duplicate_tick_conflict() {
        let state = setup_test_state().await;
        let tick = serde_json::json!({
            "address": "10.0.0.1",
            "actual_value": 5.0,
            "season_index": 3
        });

        let (status, _) = send(&state, post_tick(tick.clone())).await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = send(&state, post_tick(tick)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["error"].as_str().unwrap().contains("already exists"));

        // A duplicate is a caller error, not a store outage
        let health = state.health_registry.health().await;
        assert_eq!(health.status, ComponentStatus::Healthy);
    }

    #[tokio::test]
    async fn test_season_index_defaults_to_clock() {
        let state = setup_test_state().await;
        let before = state.clock.current_index();

        let (status, report) = send(
            &state,
            post_tick(serde_json::json!({ "address": "10.0.0.2", "actual_value": 1.0 })),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        let index = report["season_index"].as_i64().unwrap();
        assert!(index >= before && index <= state.clock.current_index());
    }

    #[tokio::test]
    async fn test_get_report_by_id() {
        let state = setup_test_state().await;
        let (_, created) = send(
            &state,
            post_tick(serde_json::json!({
                "address": "10.0.0.3",
                "actual_value": 7.0,
                "season_index": 0
            })),
        )
        .await;

        let uri = format!("/reports/{}", created["id"]);
        let (status, fetched) = send(&state, get_request(&uri)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched, created);

        let (status, _) = send(&state, get_request("/reports/9999")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_list_reports_newest_first() {
        let state = setup_test_state().await;
        for i in 0..3 {
            send(
                &state,
                post_tick(serde_json::json!({
                    "address": "10.0.0.4",
                    "actual_value": 10.0 + i as f64,
                    "season_index": i
                })),
            )
            .await;
        }

        let (status, resources) = send(&state, get_request("/resources")).await;
        assert_eq!(status, StatusCode::OK);
        let resource_id = resources[0]["id"].as_u64().unwrap();

        let uri = format!("/resources/{}/reports?page=1&page_size=2", resource_id);
        let (status, page) = send(&state, get_request(&uri)).await;
        assert_eq!(status, StatusCode::OK);
        let indices: Vec<i64> = page
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["season_index"].as_i64().unwrap())
            .collect();
        assert_eq!(indices, vec![2, 1]);

        let (status, _) = send(&state, get_request("/resources/777/reports")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_healthz_and_readyz() {
        let state = setup_test_state().await;

        let (status, health) = send(&state, get_request("/healthz")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(health["status"], "healthy");

        let (status, readiness) = send(&state, get_request("/readyz")).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(readiness["ready"], false);

        state.health_registry.set_ready(true).await;
        let (status, _) = send(&state, get_request("/readyz")).await;
        assert_eq!(status, StatusCode::OK);

        state
            .health_registry
            .set_unhealthy(components::STORE, "connection refused")
            .await;
        let (status, health) = send(&state, get_request("/healthz")).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(health["status"], "unhealthy");
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let state = setup_test_state().await;
        send(
            &state,
            post_tick(serde_json::json!({
                "address": "10.0.0.5",
                "actual_value": 1.0,
                "season_index": 0
            })),
        )
        .await;

        let response = create_router(state)
            .oneshot(get_request("/metrics"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("dos_sentinel_ticks_processed_total"));
    }

    #[tokio::test]
    async fn test_registry_outage_degrades_intake() {
        let state = state_with_registry(Arc::new(OfflineRegistry)).await;

        let (status, body) = send(
            &state,
            post_tick(serde_json::json!({ "address": "10.0.0.6", "actual_value": 1.0 })),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body["error"].as_str().unwrap().contains("registry offline"));

        let (status, health) = send(&state, get_request("/healthz")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(health["status"], "degraded");
        assert_eq!(health["components"]["intake"]["status"], "degraded");
        assert_eq!(health["components"]["store"]["status"], "healthy");
    }

    #[tokio::test]
    async fn test_ticks_rejected_after_shutdown() {
        let state = setup_test_state().await;
        let tick = serde_json::json!({
            "address": "10.0.0.7",
            "actual_value": 1.0,
            "season_index": 0
        });

        let (status, _) = send(&state, post_tick(tick.clone())).await;
        assert_eq!(status, StatusCode::CREATED);
        let (_, health) = send(&state, get_request("/healthz")).await;
        assert_eq!(health["components"]["intake"]["status"], "healthy");

        state.dispatcher.shutdown();
        let (status, _) = send(&state, post_tick(tick)).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let (status, health) = send(&state, get_request("/healthz")).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(health["components"]["intake"]["status"], "unhealthy");
    }
}
