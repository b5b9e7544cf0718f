//! Journey execution: direct (the orchestrator calls every step) or chained
//! (the orchestrator calls the first worker, which forwards the rest).

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use journey_client::{CircuitBreaker, WorkerClient, now_wallclock_ms};
use journey_protocol::{
    FailurePolicy, JourneyContext, JourneyRun, ProcessRequest, RunStatus, SimulateRequest,
    StepErrorKind, StepPayload, StepResult, StepSpec,
};
use tracing::{Instrument, debug, info, info_span};
use uuid::Uuid;

use crate::config::OrchestratorConfig;
use crate::error::FleetError;
use crate::supervisor::ServiceSupervisor;

/// Anything that can execute a journey end to end.
#[async_trait]
pub trait JourneyRunner: Send + Sync {
    async fn run(&self, request: SimulateRequest) -> Result<JourneyRun, FleetError>;
}

pub struct JourneyOrchestrator {
    supervisor: Arc<ServiceSupervisor>,
    breaker: Arc<CircuitBreaker>,
    client: WorkerClient,
    config: OrchestratorConfig,
}

/// Fields shared by every hop of one run.
struct RunScope<'a> {
    journey_id: &'a str,
    correlation_id: &'a str,
    company_name: &'a str,
    context: &'a JourneyContext,
    error_simulation_enabled: bool,
    think_time_ms: u64,
    policy: FailurePolicy,
}

impl JourneyOrchestrator {
    pub fn new(
        supervisor: Arc<ServiceSupervisor>,
        breaker: Arc<CircuitBreaker>,
        config: OrchestratorConfig,
    ) -> Result<Self, FleetError> {
        Ok(Self {
            supervisor,
            breaker,
            client: WorkerClient::new()?,
            config,
        })
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub async fn execute(&self, request: SimulateRequest) -> Result<JourneyRun, FleetError> {
        request.journey.validate()?;
        let journey_id = request
            .journey_id
            .clone()
            .or_else(|| request.journey.journey_id.clone())
            .unwrap_or_else(|| format!("journey_{}", Uuid::new_v4().simple()));
        let correlation_id = request
            .correlation_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let policy = request.failure_policy.unwrap_or(self.config.default_policy);

        let span = info_span!(
            "journey",
            journey_id = %journey_id,
            company = %request.journey.company_name,
            chained = request.chained
        );
        async move {
            let mut run = JourneyRun {
                journey_id: journey_id.clone(),
                correlation_id: correlation_id.clone(),
                company_name: request.journey.company_name.clone(),
                chained: request.chained,
                started_at: now_wallclock_ms(),
                finished_at: None,
                status: RunStatus::Running,
                steps: Vec::new(),
                failure: None,
            };
            let context = request.resolved_context();
            let scope = RunScope {
                journey_id: &journey_id,
                correlation_id: &correlation_id,
                company_name: &request.journey.company_name,
                context: &context,
                error_simulation_enabled: request.error_simulation_enabled,
                think_time_ms: request.think_time_ms,
                policy,
            };
            let steps = &request.journey.steps;
            run.steps = if request.chained {
                self.run_chained(&scope, steps).await
            } else {
                self.run_direct(&scope, steps).await
            };
            run.finish(policy, now_wallclock_ms());
            info!(status = ?run.status, steps = run.steps.len(), "journey finished");
            Ok(run)
        }
        .instrument(span)
        .await
    }

    /// Steps strictly in order, one at a time.
    async fn run_direct(&self, scope: &RunScope<'_>, steps: &[StepSpec]) -> Vec<StepResult> {
        let mut results = Vec::with_capacity(steps.len());
        for (index, step) in steps.iter().enumerate() {
            let result = self
                .call_step(scope, index as u32, step, &[], self.config.step_timeout)
                .await
                .into_iter()
                .next()
                .unwrap_or_else(|| {
                    StepResult::failed(
                        step,
                        StepErrorKind::StepFailed,
                        "worker returned no result",
                        None,
                        0,
                    )
                });
            let proceed = scope.policy.continues_after(&result);
            results.push(result);
            if !proceed {
                break;
            }
        }
        results
    }

    async fn run_chained(&self, scope: &RunScope<'_>, steps: &[StepSpec]) -> Vec<StepResult> {
        let Some((first, rest)) = steps.split_first() else {
            return Vec::new();
        };
        // Every worker but the last provisions its successor inside this call.
        let hops = u32::try_from(steps.len()).unwrap_or(u32::MAX);
        let budget = self
            .config
            .step_timeout
            .saturating_mul(hops)
            .saturating_add(self.supervisor.ensure_budget().saturating_mul(hops - 1));
        self.call_step(scope, 0, first, rest, budget).await
    }

    /// Breaker, then ensure-service, then `process`. Every failure along the
    /// way becomes a failed result for `step`.
    async fn call_step(
        &self,
        scope: &RunScope<'_>,
        index: u32,
        step: &StepSpec,
        remaining: &[StepSpec],
        timeout: Duration,
    ) -> Vec<StepResult> {
        let started = Instant::now();
        let permit = match self.breaker.acquire(&step.service_name) {
            Ok(permit) => permit,
            Err(open) => {
                debug!(service = %step.service_name, "step rejected by breaker");
                return vec![StepResult::failed(
                    step,
                    StepErrorKind::CircuitOpen,
                    open.to_string(),
                    None,
                    0,
                )];
            }
        };

        let port = match self.supervisor.ensure_service(&step.service_name).await {
            Ok(ensured) => ensured.port,
            Err(err) => {
                permit.fail();
                return vec![StepResult::failed(
                    step,
                    err.step_error_kind(),
                    err.to_string(),
                    None,
                    elapsed_ms(started),
                )];
            }
        };

        let request = ProcessRequest {
            journey_id: scope.journey_id.to_string(),
            correlation_id: scope.correlation_id.to_string(),
            chained: !remaining.is_empty(),
            step_payload: StepPayload {
                company_name: scope.company_name.to_string(),
                step: step.clone(),
                step_index: index,
                remaining_steps: remaining.to_vec(),
                context: scope.context.clone(),
                error_simulation_enabled: scope.error_simulation_enabled,
                think_time_ms: scope.think_time_ms,
                hop_timeout_ms: self.config.step_timeout.as_millis() as u64,
                failure_policy: scope.policy,
            },
        };

        let call_started = Instant::now();
        match self.client.process(port, &request, timeout).await {
            Ok((_, response)) => {
                let mut results = response.results;
                permit.record(results.first().is_some_and(StepResult::is_completed));
                // Direct calls report the caller-side wall clock.
                if remaining.is_empty() {
                    if let Some(own) = results.first_mut() {
                        own.processing_time_ms = elapsed_ms(call_started);
                    }
                }
                results
            }
            Err(err) => {
                permit.fail();
                let kind = if err.is_connection() {
                    StepErrorKind::ConnectionError
                } else {
                    StepErrorKind::StepFailed
                };
                vec![StepResult::failed(
                    step,
                    kind,
                    err.to_string(),
                    err.status(),
                    elapsed_ms(call_started),
                )]
            }
        }
    }
}

#[async_trait]
impl JourneyRunner for JourneyOrchestrator {
    async fn run(&self, request: SimulateRequest) -> Result<JourneyRun, FleetError> {
        self.execute(request).await
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
