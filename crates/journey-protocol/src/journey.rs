//! Journey definitions, run records, and per-step results.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;

use crate::{ValidationError, validate_service_name};

/// An ordered sequence of steps simulated as one logical transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JourneyDefinition {
    pub company_name: String,
    pub steps: Vec<StepSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub journey_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    #[schema(value_type = Object)]
    pub additional_fields: Map<String, Value>,
    /// Profile supplied with the journey rather than the request. The
    /// request-level profile wins when both are present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_profile: Option<CustomerProfile>,
}

impl JourneyDefinition {
    pub fn new(company_name: impl Into<String>, steps: Vec<StepSpec>) -> Self {
        Self {
            company_name: company_name.into(),
            steps,
            journey_id: None,
            domain: None,
            additional_fields: Map::new(),
            customer_profile: None,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.company_name.trim().is_empty() {
            return Err(ValidationError::Empty {
                field: "companyName",
            });
        }
        if self.steps.is_empty() {
            return Err(ValidationError::Empty { field: "steps" });
        }
        self.steps.iter().try_for_each(StepSpec::validate)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StepSpec {
    pub step_name: String,
    /// Routing key: steps sharing a service name share one worker.
    pub service_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_duration_ms: Option<u64>,
    /// Customer-facing duration in minutes (`estimatedDuration`). Reported
    /// back unchanged; never simulated as latency.
    #[serde(
        default,
        rename = "estimatedDuration",
        skip_serializing_if = "Option::is_none"
    )]
    pub estimated_duration_minutes: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub substeps: Vec<Substep>,
}

impl StepSpec {
    pub fn new(step_name: impl Into<String>, service_name: impl Into<String>) -> Self {
        Self {
            step_name: step_name.into(),
            service_name: service_name.into(),
            step_number: None,
            description: None,
            estimated_duration_ms: None,
            estimated_duration_minutes: None,
            substeps: Vec::new(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.step_name.trim().is_empty() {
            return Err(ValidationError::Empty { field: "stepName" });
        }
        validate_service_name(&self.service_name)
    }

    /// Simulated work: the sum of substep durations, else the step estimate.
    pub fn simulated_work_ms(&self) -> u64 {
        let substeps = self
            .substeps
            .iter()
            .map(|s| s.duration_ms)
            .fold(0u64, u64::saturating_add);
        if substeps > 0 {
            substeps
        } else {
            self.estimated_duration_ms.unwrap_or(0)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Substep {
    pub substep_name: String,
    #[serde(default)]
    pub duration_ms: u64,
    /// Customer-facing duration in minutes (`duration`); not simulated.
    #[serde(default, rename = "duration", skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u64>,
}

/// Synthetic customer and tagging data carried through every hop.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JourneyContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_profile: Option<CustomerProfile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traffic_source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_iteration: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_test_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CustomerProfile {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub segment: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub device_type: String,
    #[serde(default)]
    pub location: String,
}

/// Body of `POST simulate-journey`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SimulateRequest {
    pub journey: JourneyDefinition,
    #[serde(default)]
    pub chained: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub journey_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(flatten)]
    pub context: JourneyContext,
    #[serde(default = "enabled")]
    pub error_simulation_enabled: bool,
    #[serde(default)]
    pub think_time_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_policy: Option<FailurePolicy>,
}

fn enabled() -> bool {
    true
}

impl SimulateRequest {
    /// Context carried to the workers, with the journey-level profile filled
    /// in when the request has none.
    pub fn resolved_context(&self) -> JourneyContext {
        let mut context = self.context.clone();
        if context.customer_profile.is_none() {
            context.customer_profile = self.journey.customer_profile.clone();
        }
        context
    }

    pub fn new(journey: JourneyDefinition) -> Self {
        Self {
            journey,
            chained: false,
            journey_id: None,
            correlation_id: None,
            context: JourneyContext::default(),
            error_simulation_enabled: true,
            think_time_ms: 0,
            failure_policy: None,
        }
    }

    pub fn chained(mut self, chained: bool) -> Self {
        self.chained = chained;
        self
    }
}

/// What to do with the remaining steps once one has failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum FailurePolicy {
    #[default]
    StopOnFirstFailure,
    ContinueOnFailure,
}

impl FailurePolicy {
    /// Whether the step after `result` should still be attempted.
    pub fn continues_after(self, result: &StepResult) -> bool {
        result.is_completed() || self == FailurePolicy::ContinueOnFailure
    }

    /// Overall status of a finished run.
    pub fn summarize(self, results: &[StepResult]) -> RunStatus {
        let failed = results.iter().filter(|r| !r.is_completed()).count();
        match (failed, self) {
            (0, _) => RunStatus::Completed,
            (_, FailurePolicy::StopOnFirstFailure) => RunStatus::Failed,
            (n, FailurePolicy::ContinueOnFailure) if n == results.len() => RunStatus::Failed,
            (_, FailurePolicy::ContinueOnFailure) => RunStatus::PartiallyFailed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
    PartiallyFailed,
}

/// Outcome of one journey execution. Not persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JourneyRun {
    pub journey_id: String,
    pub correlation_id: String,
    pub company_name: String,
    pub chained: bool,
    pub started_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<u64>,
    pub status: RunStatus,
    pub steps: Vec<StepResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<RunFailure>,
}

impl JourneyRun {
    /// Close the run: derive the status from the results and record the first failure.
    pub fn finish(&mut self, policy: FailurePolicy, finished_at: u64) {
        self.status = policy.summarize(&self.steps);
        self.failure = self.steps.iter().find(|r| !r.is_completed()).map(|r| RunFailure {
            step_name: r.step_name.clone(),
            service_name: r.service_name.clone(),
            error: r.error.clone().unwrap_or_else(|| StepError {
                kind: StepErrorKind::StepFailed,
                message: "step failed without detail".into(),
            }),
        });
        self.finished_at = Some(finished_at);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RunFailure {
    pub step_name: String,
    pub service_name: String,
    pub error: StepError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum StepStatus {
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    pub step_name: String,
    pub service_name: String,
    pub status: StepStatus,
    /// `None` when no HTTP response was received.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
    pub processing_time_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<StepError>,
}

impl StepResult {
    pub fn completed(step: &StepSpec, http_status: u16, processing_time_ms: u64) -> Self {
        Self {
            step_name: step.step_name.clone(),
            service_name: step.service_name.clone(),
            status: StepStatus::Completed,
            http_status: Some(http_status),
            processing_time_ms,
            error: None,
        }
    }

    pub fn failed(
        step: &StepSpec,
        kind: StepErrorKind,
        message: impl Into<String>,
        http_status: Option<u16>,
        processing_time_ms: u64,
    ) -> Self {
        Self {
            step_name: step.step_name.clone(),
            service_name: step.service_name.clone(),
            status: StepStatus::Failed,
            http_status,
            processing_time_ms,
            error: Some(StepError {
                kind,
                message: message.into(),
            }),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == StepStatus::Completed
    }

    pub fn error_kind(&self) -> Option<StepErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StepError {
    pub kind: StepErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum StepErrorKind {
    ProvisioningTimeout,
    Exhausted,
    CircuitOpen,
    StepFailed,
    ConnectionError,
    InvalidRequest,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(name: &str) -> StepSpec {
        StepSpec::new(name, format!("{name}Service"))
    }

    /// Body posted by the generated LoadRunner scripts, placeholders included.
    const LOADRUNNER_BODY: &str = r#"{"journeyId": "{correlation_id}","customerId": "{customer_id}","sessionId": "{session_id}","traceId": "{trace_id}","chained": true,"thinkTimeMs": 250,"errorSimulationEnabled": true,"journey": {  "journeyId": "{correlation_id}",  "companyName": "Argos",  "domain": "www.Argos.co.uk",  "steps": [    {      "stepNumber": 6,      "stepName": "DeliveryCompletion",      "serviceName": "DeliveryCompletionService",      "description": "Customer receives home delivery and collects in‑store item.",      "estimatedDuration": 1440,      "substeps": [{"substepName":"Home delivery of Dyson V8 (next day)","duration":720},{"substepName":"Click & collect pickup of Nintendo Switch","duration":720}]    }  ],  "additionalFields": {},  "customerProfile": {    "name": "{customer_name}",    "email": "{customer_email}",    "segment": "{customer_segment}",    "userId": "{customer_id}",    "deviceType": "desktop",    "location": "US-East"  }}}"#;

    #[test]
    fn parses_loadrunner_request() {
        let req: SimulateRequest = serde_json::from_str(LOADRUNNER_BODY).unwrap();
        assert!(req.chained);
        assert_eq!(req.think_time_ms, 250);
        assert_eq!(req.journey_id.as_deref(), Some("{correlation_id}"));
        assert_eq!(req.context.customer_id.as_deref(), Some("{customer_id}"));
        assert_eq!(req.journey.domain.as_deref(), Some("www.Argos.co.uk"));
        assert!(req.journey.validate().is_ok());

        let step = &req.journey.steps[0];
        assert_eq!(step.step_number, Some(6));
        assert_eq!(step.estimated_duration_minutes, Some(1440));
        assert_eq!(step.estimated_duration_ms, None);
        assert_eq!(step.substeps[0].duration_minutes, Some(720));
        // Minute estimates are customer time, not simulated latency.
        assert_eq!(step.simulated_work_ms(), 0);
    }

    #[test]
    fn journey_level_profile_reaches_the_context() {
        let req: SimulateRequest = serde_json::from_str(LOADRUNNER_BODY).unwrap();
        assert!(req.context.customer_profile.is_none());
        let context = req.resolved_context();
        let profile = context.customer_profile.unwrap();
        assert_eq!(profile.device_type, "desktop");
        assert_eq!(profile.location, "US-East");
        assert_eq!(profile.user_id, "{customer_id}");
        assert_eq!(context.customer_id.as_deref(), Some("{customer_id}"));

        let mut req = req;
        req.context.customer_profile = Some(CustomerProfile {
            name: "Top level".into(),
            ..CustomerProfile::default()
        });
        assert_eq!(
            req.resolved_context().customer_profile.unwrap().name,
            "Top level"
        );
    }

    #[test]
    fn millisecond_durations_drive_simulated_work() {
        let step: StepSpec = serde_json::from_value(serde_json::json!({
            "stepName": "Search",
            "serviceName": "SearchService",
            "estimatedDurationMs": 900,
            "substeps": [
                {"substepName": "Query", "durationMs": 120},
                {"substepName": "Render", "durationMs": 80}
            ]
        }))
        .unwrap();
        assert_eq!(step.simulated_work_ms(), 200);

        let estimate_only = StepSpec {
            substeps: Vec::new(),
            ..step
        };
        assert_eq!(estimate_only.simulated_work_ms(), 900);
        let out = serde_json::to_value(&estimate_only).unwrap();
        assert_eq!(out["estimatedDurationMs"], 900);
        assert!(out.get("estimatedDuration").is_none());
    }

    #[test]
    fn simulate_defaults_enable_error_simulation() {
        let body = serde_json::json!({
            "journey": {"companyName": "Acme", "steps": [{"stepName": "A", "serviceName": "A"}]}
        });
        let req: SimulateRequest = serde_json::from_value(body).unwrap();
        assert!(!req.chained);
        assert!(req.error_simulation_enabled);
        assert_eq!(req.failure_policy, None);
    }

    #[test]
    fn journey_validation_rejects_empty_parts() {
        let empty = JourneyDefinition::new("Acme", vec![]);
        assert_eq!(
            empty.validate(),
            Err(ValidationError::Empty { field: "steps" })
        );
        let nameless = JourneyDefinition::new(" ", vec![step("A")]);
        assert!(nameless.validate().is_err());
        let bad_service = JourneyDefinition::new("Acme", vec![StepSpec::new("A", "a b")]);
        assert!(bad_service.validate().is_err());
    }

    #[test]
    fn stop_policy_fails_on_any_failure() {
        let a = StepResult::completed(&step("A"), 200, 3);
        let b = StepResult::failed(&step("B"), StepErrorKind::StepFailed, "boom", Some(500), 4);
        let policy = FailurePolicy::StopOnFirstFailure;
        assert!(policy.continues_after(&a));
        assert!(!policy.continues_after(&b));
        assert_eq!(policy.summarize(&[a.clone()]), RunStatus::Completed);
        assert_eq!(policy.summarize(&[a, b]), RunStatus::Failed);
    }

    #[test]
    fn continue_policy_reports_partial_failure() {
        let a = StepResult::completed(&step("A"), 200, 3);
        let b = StepResult::failed(&step("B"), StepErrorKind::ConnectionError, "reset", None, 4);
        let policy = FailurePolicy::ContinueOnFailure;
        assert!(policy.continues_after(&b));
        assert_eq!(
            policy.summarize(&[a, b.clone()]),
            RunStatus::PartiallyFailed
        );
        assert_eq!(policy.summarize(&[b]), RunStatus::Failed);
    }

    #[test]
    fn finish_records_first_failure() {
        let mut run = JourneyRun {
            journey_id: "j".into(),
            correlation_id: "c".into(),
            company_name: "Acme".into(),
            chained: false,
            started_at: 1,
            finished_at: None,
            status: RunStatus::Running,
            steps: vec![
                StepResult::completed(&step("A"), 200, 1),
                StepResult::failed(&step("B"), StepErrorKind::CircuitOpen, "open", None, 0),
            ],
            failure: None,
        };
        run.finish(FailurePolicy::StopOnFirstFailure, 9);
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.finished_at, Some(9));
        let failure = run.failure.unwrap();
        assert_eq!(failure.step_name, "B");
        assert_eq!(failure.error.kind, StepErrorKind::CircuitOpen);
    }
}
