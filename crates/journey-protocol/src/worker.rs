//! Per-worker boundary: `GET /health` and `POST /process`.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::journey::{FailurePolicy, JourneyContext, StepResult, StepSpec};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProcessRequest {
    pub journey_id: String,
    pub correlation_id: String,
    #[serde(default)]
    pub chained: bool,
    pub step_payload: StepPayload,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StepPayload {
    pub company_name: String,
    pub step: StepSpec,
    #[serde(default)]
    pub step_index: u32,
    /// Steps after this one; only forwarded when `chained` is set.
    #[serde(default)]
    pub remaining_steps: Vec<StepSpec>,
    #[serde(default)]
    pub context: JourneyContext,
    #[serde(default = "enabled")]
    pub error_simulation_enabled: bool,
    #[serde(default)]
    pub think_time_ms: u64,
    /// Budget for one hop; chained callers multiply it by the hops left.
    pub hop_timeout_ms: u64,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
}

fn enabled() -> bool {
    true
}

/// `results[0]` is the worker's own step; chained downstream results follow in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProcessResponse {
    pub results: Vec<StepResult>,
}

impl ProcessResponse {
    pub fn all_completed(&self) -> bool {
        self.results.iter().all(StepResult::is_completed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub service_name: String,
    pub instance_id: String,
}
