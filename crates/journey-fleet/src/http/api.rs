use axum::Json;
use axum::Router;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use journey_protocol::{
    CircuitBreakerState, EnsureServiceRequest, EnsureServiceResponse, ErrorBody, FeatureFlagSet,
    FlagUpdateRequest, FlagUpdateResponse, JourneyRun, LoadStartRequest, LoadStartResponse,
    LoadStopRequest, LoadTest, ServiceInstanceInfo, SimulateRequest, ValidationError,
};
use serde_json::json;
use tracing::warn;
use utoipa::OpenApi;

use crate::error::FleetError;
use crate::http::HttpState;

const CONTROL_PLANE: &str = "control-plane";

pub fn router() -> Router<HttpState> {
    Router::new()
        .route("/health", get(health))
        .route("/ensure-service", post(ensure_service))
        .route("/services", get(list_services))
        .route("/services/{service_name}", delete(terminate_service))
        .route("/circuit-breakers", get(circuit_breakers))
        .route("/journey-simulation/simulate-journey", post(simulate_journey))
        .route("/feature-flags", get(feature_flags).post(update_feature_flags))
        .route("/load/start", post(load_start))
        .route("/load/stop", post(load_stop))
        .route("/load/status", get(load_status))
        .route("/load/stop-all", post(load_stop_all))
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        ensure_service,
        list_services,
        terminate_service,
        circuit_breakers,
        simulate_journey,
        feature_flags,
        update_feature_flags,
        load_start,
        load_stop,
        load_status,
        load_stop_all,
    ),
    components(schemas(ErrorBody)),
    tags((name = "journey-fleet", description = "Worker fleet and journey execution"))
)]
struct ApiDoc;

pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}

#[derive(Debug)]
pub enum ApiError {
    Fleet(FleetError),
    Invalid(String),
}

impl From<FleetError> for ApiError {
    fn from(err: FleetError) -> Self {
        ApiError::Fleet(err)
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::Invalid(err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(err: JsonRejection) -> Self {
        ApiError::Invalid(err.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            ApiError::Fleet(err) => {
                let status = match err.code() {
                    "exhausted" | "provisioning_timeout" | "provisioning_failed" => {
                        StatusCode::SERVICE_UNAVAILABLE
                    }
                    "invalid_service_name" | "invalid_request" => StatusCode::BAD_REQUEST,
                    "not_found" => StatusCode::NOT_FOUND,
                    "connection_error" => StatusCode::BAD_GATEWAY,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, err.code().to_string(), err.to_string())
            }
            ApiError::Invalid(msg) => (StatusCode::BAD_REQUEST, "invalid_request".into(), msg),
        };
        if status.is_server_error() {
            warn!(%code, %message, "request failed");
        }
        (status, Json(ErrorBody { code, message })).into_response()
    }
}

#[utoipa::path(
    get,
    path = "/api/health",
    tag = "journey-fleet",
    responses((status = 200, description = "Control plane is up, with port lease usage"))
)]
async fn health(State(state): State<HttpState>) -> impl IntoResponse {
    let ports = state.fleet.supervisor.ports();
    let leased: Vec<_> = ports
        .leases()
        .into_iter()
        .map(|lease| {
            json!({
                "port": lease.port,
                "serviceName": lease.owner_service_name,
                "leasedAt": lease.leased_at,
            })
        })
        .collect();
    Json(json!({
        "ok": true,
        "version": env!("CARGO_PKG_VERSION"),
        "services": state.fleet.supervisor.live_services().len(),
        "loadTests": state.fleet.load.status().len(),
        "ports": {
            "start": ports.range().start(),
            "end": ports.range().end(),
            "leased": leased,
        },
    }))
}

#[utoipa::path(
    post,
    path = "/api/ensure-service",
    tag = "journey-fleet",
    request_body = EnsureServiceRequest,
    responses(
        (status = 200, body = EnsureServiceResponse),
        (status = 400, body = ErrorBody),
        (status = 503, description = "Provisioning failed or no free port", body = ErrorBody)
    )
)]
async fn ensure_service(
    State(state): State<HttpState>,
    payload: Result<Json<EnsureServiceRequest>, JsonRejection>,
) -> Result<Json<EnsureServiceResponse>, ApiError> {
    let Json(req) = payload?;
    let ensured = state
        .fleet
        .supervisor
        .ensure_service(&req.service_name)
        .await?;
    Ok(Json(ensured))
}

#[utoipa::path(
    get,
    path = "/api/services",
    tag = "journey-fleet",
    responses((status = 200, body = [ServiceInstanceInfo]))
)]
async fn list_services(State(state): State<HttpState>) -> Json<Vec<ServiceInstanceInfo>> {
    Json(state.fleet.supervisor.list())
}

#[utoipa::path(
    delete,
    path = "/api/services/{service_name}",
    tag = "journey-fleet",
    params(("service_name" = String, Path, description = "Service to terminate")),
    responses(
        (status = 200, body = ServiceInstanceInfo),
        (status = 404, body = ErrorBody)
    )
)]
async fn terminate_service(
    State(state): State<HttpState>,
    Path(service_name): Path<String>,
) -> Result<Json<ServiceInstanceInfo>, ApiError> {
    Ok(Json(state.fleet.supervisor.terminate(&service_name).await?))
}

#[utoipa::path(
    get,
    path = "/api/circuit-breakers",
    tag = "journey-fleet",
    responses((status = 200, body = [CircuitBreakerState]))
)]
async fn circuit_breakers(State(state): State<HttpState>) -> Json<Vec<CircuitBreakerState>> {
    Json(state.fleet.breaker.snapshots())
}

#[utoipa::path(
    post,
    path = "/api/journey-simulation/simulate-journey",
    tag = "journey-fleet",
    request_body = SimulateRequest,
    responses(
        (status = 200, description = "Run finished; see status", body = JourneyRun),
        (status = 400, body = ErrorBody)
    )
)]
async fn simulate_journey(
    State(state): State<HttpState>,
    payload: Result<Json<SimulateRequest>, JsonRejection>,
) -> Result<Json<JourneyRun>, ApiError> {
    let Json(req) = payload?;
    Ok(Json(state.fleet.orchestrator.execute(req).await?))
}

#[utoipa::path(
    get,
    path = "/api/feature-flags",
    tag = "journey-fleet",
    responses((status = 200, body = FeatureFlagSet))
)]
async fn feature_flags(State(state): State<HttpState>) -> Json<FeatureFlagSet> {
    Json(state.fleet.flags.snapshot())
}

#[utoipa::path(
    post,
    path = "/api/feature-flags",
    tag = "journey-fleet",
    request_body = FlagUpdateRequest,
    responses(
        (status = 200, body = FlagUpdateResponse),
        (status = 400, body = ErrorBody)
    )
)]
async fn update_feature_flags(
    State(state): State<HttpState>,
    payload: Result<Json<FlagUpdateRequest>, JsonRejection>,
) -> Result<Json<FlagUpdateResponse>, ApiError> {
    let Json(req) = payload?;
    let (previous, new) = state.fleet.flags.update(&req)?;
    let mut applied_to = vec![CONTROL_PLANE.to_string()];
    applied_to.extend(state.fleet.supervisor.live_services());
    Ok(Json(FlagUpdateResponse {
        previous,
        new,
        applied_to,
    }))
}

#[utoipa::path(
    post,
    path = "/api/load/start",
    tag = "journey-fleet",
    request_body = LoadStartRequest,
    responses(
        (status = 200, body = LoadStartResponse),
        (status = 400, body = ErrorBody)
    )
)]
async fn load_start(
    State(state): State<HttpState>,
    payload: Result<Json<LoadStartRequest>, JsonRejection>,
) -> Result<Json<LoadStartResponse>, ApiError> {
    let Json(req) = payload?;
    let load_test_id = state.fleet.load.start(req)?;
    Ok(Json(LoadStartResponse { load_test_id }))
}

#[utoipa::path(
    post,
    path = "/api/load/stop",
    tag = "journey-fleet",
    request_body = LoadStopRequest,
    responses(
        (status = 200, description = "Final statistics", body = LoadTest),
        (status = 404, body = ErrorBody)
    )
)]
async fn load_stop(
    State(state): State<HttpState>,
    payload: Result<Json<LoadStopRequest>, JsonRejection>,
) -> Result<Json<LoadTest>, ApiError> {
    let Json(req) = payload?;
    Ok(Json(state.fleet.load.stop(&req.load_test_id).await?))
}

#[utoipa::path(
    get,
    path = "/api/load/status",
    tag = "journey-fleet",
    responses((status = 200, body = [LoadTest]))
)]
async fn load_status(State(state): State<HttpState>) -> Json<Vec<LoadTest>> {
    Json(state.fleet.load.status())
}

#[utoipa::path(
    post,
    path = "/api/load/stop-all",
    tag = "journey-fleet",
    responses((status = 200, body = [LoadTest]))
)]
async fn load_stop_all(State(state): State<HttpState>) -> Json<Vec<LoadTest>> {
    Json(state.fleet.load.stop_all().await)
}
