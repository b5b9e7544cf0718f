use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use journey_protocol::{
    HealthResponse, ProcessRequest, ProcessResponse, StepErrorKind, StepResult, StepSpec, routes,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::warn;

use crate::error::WorkerError;
use crate::runtime::WorkerRuntime;

pub fn router(runtime: Arc<WorkerRuntime>) -> Router {
    Router::new()
        .route(routes::WORKER_HEALTH, get(health))
        .route(routes::WORKER_PROCESS, post(process))
        .with_state(runtime)
}

pub async fn serve(
    listener: TcpListener,
    runtime: Arc<WorkerRuntime>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<(), WorkerError> {
    axum::serve(listener, router(runtime))
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await
        .map_err(WorkerError::Serve)
}

async fn health(State(runtime): State<Arc<WorkerRuntime>>) -> Json<HealthResponse> {
    Json(runtime.health())
}

/// Always answers with a `ProcessResponse`: 200 when every step completed,
/// 500 when one failed, 400 when the request was rejected.
async fn process(State(runtime): State<Arc<WorkerRuntime>>, body: Bytes) -> Response {
    let request: ProcessRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(err) => {
            let step = StepSpec::new("unknown", runtime.descriptor().service_name.clone());
            return reject(&step, WorkerError::Invalid(format!("decode request: {err}")));
        }
    };
    match runtime.process(&request).await {
        Ok(response) => {
            let status = if response.all_completed() {
                StatusCode::OK
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            (status, Json(response)).into_response()
        }
        Err(err) => reject(&request.step_payload.step, err),
    }
}

fn reject(step: &StepSpec, err: WorkerError) -> Response {
    warn!(step = %step.step_name, %err, "rejecting process request");
    let result = StepResult::failed(
        step,
        StepErrorKind::InvalidRequest,
        err.to_string(),
        Some(StatusCode::BAD_REQUEST.as_u16()),
        0,
    );
    let body = ProcessResponse {
        results: vec![result],
    };
    (StatusCode::BAD_REQUEST, Json(body)).into_response()
}
