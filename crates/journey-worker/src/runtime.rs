//! Step execution inside one worker process.

use std::sync::Arc;
use std::time::{Duration, Instant};

use journey_client::{
    CircuitBreaker, EventSink, FeatureFlagStore, OutboundEvent, WorkerClient, now_wallclock_ms,
};
use journey_protocol::events::{STEP_COMPLETED, STEP_FAILED};
use journey_protocol::{
    BusinessEvent, HealthResponse, ProcessRequest, ProcessResponse, StepErrorKind, StepPayload,
    StepResult, StepSpec, WorkerDescriptor,
};
use tracing::{debug, info, warn};

use crate::directory::ServiceDirectory;
use crate::error::WorkerError;
use crate::injector::FaultInjector;

pub struct WorkerRuntime {
    descriptor: WorkerDescriptor,
    flags: FeatureFlagStore,
    directory: Arc<dyn ServiceDirectory>,
    events: Arc<dyn EventSink>,
    client: WorkerClient,
    breaker: CircuitBreaker,
    injector: FaultInjector,
}

impl WorkerRuntime {
    pub fn new(
        descriptor: WorkerDescriptor,
        flags: FeatureFlagStore,
        directory: Arc<dyn ServiceDirectory>,
        events: Arc<dyn EventSink>,
    ) -> Result<Self, WorkerError> {
        let breaker = CircuitBreaker::new(descriptor.breaker.into());
        Ok(Self {
            descriptor,
            flags,
            directory,
            events,
            client: WorkerClient::new()?,
            breaker,
            injector: FaultInjector::new(),
        })
    }

    pub fn descriptor(&self) -> &WorkerDescriptor {
        &self.descriptor
    }

    pub fn flags(&self) -> &FeatureFlagStore {
        &self.flags
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn health(&self) -> HealthResponse {
        HealthResponse {
            status: "ok".into(),
            service_name: self.descriptor.service_name.clone(),
            instance_id: self.descriptor.instance_id.clone(),
        }
    }

    /// Run this worker's step and, when chained, the rest of the journey.
    ///
    /// Only a malformed request is an error; step failures come back as
    /// failed results.
    pub async fn process(&self, request: &ProcessRequest) -> Result<ProcessResponse, WorkerError> {
        self.validate(request)?;
        let payload = &request.step_payload;
        let started = Instant::now();

        let work_ms = payload
            .step
            .simulated_work_ms()
            .min(self.descriptor.max_simulated_latency_ms)
            .saturating_add(payload.think_time_ms);
        if work_ms > 0 {
            tokio::time::sleep(Duration::from_millis(work_ms)).await;
        }

        let flags = self.flags.snapshot();
        let own = if self
            .injector
            .should_fail(&flags, payload.error_simulation_enabled)
        {
            info!(
                journey_id = %request.journey_id,
                step = %payload.step.step_name,
                "injecting step failure"
            );
            StepResult::failed(
                &payload.step,
                StepErrorKind::StepFailed,
                format!("injected failure in {}", payload.step.step_name),
                Some(500),
                elapsed_ms(started),
            )
        } else {
            StepResult::completed(&payload.step, 200, elapsed_ms(started))
        };
        self.emit(request, &own);

        let forward = request.chained
            && !payload.remaining_steps.is_empty()
            && payload.failure_policy.continues_after(&own);
        let mut results = vec![own];
        if forward {
            results.extend(self.forward(request).await);
        }
        Ok(ProcessResponse { results })
    }

    fn validate(&self, request: &ProcessRequest) -> Result<(), WorkerError> {
        if request.journey_id.trim().is_empty() {
            return Err(WorkerError::Invalid("journeyId must not be empty".into()));
        }
        if request.correlation_id.trim().is_empty() {
            return Err(WorkerError::Invalid("correlationId must not be empty".into()));
        }
        let payload = &request.step_payload;
        if payload.company_name.trim().is_empty() {
            return Err(WorkerError::Invalid("companyName must not be empty".into()));
        }
        payload.step.validate()?;
        if payload.step.service_name != self.descriptor.service_name {
            return Err(WorkerError::Invalid(format!(
                "step {} targets {} but this worker serves {}",
                payload.step.step_name, payload.step.service_name, self.descriptor.service_name
            )));
        }
        payload
            .remaining_steps
            .iter()
            .try_for_each(StepSpec::validate)?;
        if payload.hop_timeout_ms == 0 {
            return Err(WorkerError::Invalid("hopTimeoutMs must be positive".into()));
        }
        Ok(())
    }

    fn emit(&self, request: &ProcessRequest, result: &StepResult) {
        let payload = &request.step_payload;
        let event = BusinessEvent {
            event_type: if result.is_completed() {
                STEP_COMPLETED
            } else {
                STEP_FAILED
            }
            .to_string(),
            journey_id: request.journey_id.clone(),
            correlation_id: request.correlation_id.clone(),
            company_name: payload.company_name.clone(),
            step_name: result.step_name.clone(),
            service_name: result.service_name.clone(),
            step_index: payload.step_index,
            instance_id: self.descriptor.instance_id.clone(),
            status: result.status,
            processing_time_ms: result.processing_time_ms,
            error: result.error.clone(),
            context: payload.context.clone(),
            emitted_at: now_wallclock_ms(),
        };
        self.events.emit(OutboundEvent::Business(event));
    }

    /// Hand the remaining steps to the next service. Never fails: every
    /// problem reaching the next hop becomes a failed result for its step.
    async fn forward(&self, request: &ProcessRequest) -> Vec<StepResult> {
        let payload = &request.step_payload;
        let Some((next, rest)) = payload.remaining_steps.split_first() else {
            return Vec::new();
        };
        let started = Instant::now();
        // The next worker provisions its own successors inside this call.
        let hops = payload.remaining_steps.len() as u64;
        let timeout = Duration::from_millis(
            payload
                .hop_timeout_ms
                .saturating_mul(hops)
                .saturating_add(self.descriptor.ensure_timeout_ms.saturating_mul(hops - 1)),
        );

        let permit = match self.breaker.acquire(&next.service_name) {
            Ok(permit) => permit,
            Err(open) => {
                debug!(service = %next.service_name, "next hop rejected by breaker");
                return vec![StepResult::failed(
                    next,
                    StepErrorKind::CircuitOpen,
                    open.to_string(),
                    None,
                    0,
                )];
            }
        };

        let port = match self.directory.ensure_service(&next.service_name).await {
            Ok(port) => port,
            Err(err) => {
                permit.fail();
                warn!(service = %next.service_name, %err, "could not resolve next hop");
                return vec![StepResult::failed(
                    next,
                    err.step_error_kind(),
                    err.to_string(),
                    None,
                    elapsed_ms(started),
                )];
            }
        };

        let downstream = ProcessRequest {
            journey_id: request.journey_id.clone(),
            correlation_id: request.correlation_id.clone(),
            chained: true,
            step_payload: StepPayload {
                company_name: payload.company_name.clone(),
                step: next.clone(),
                step_index: payload.step_index + 1,
                remaining_steps: rest.to_vec(),
                context: payload.context.clone(),
                error_simulation_enabled: payload.error_simulation_enabled,
                think_time_ms: payload.think_time_ms,
                hop_timeout_ms: payload.hop_timeout_ms,
                failure_policy: payload.failure_policy,
            },
        };

        debug!(service = %next.service_name, port, "forwarding chained step");
        match self.client.process(port, &downstream, timeout).await {
            Ok((_, response)) => {
                permit.record(response.results.first().is_some_and(StepResult::is_completed));
                response.results
            }
            Err(err) => {
                permit.fail();
                let kind = if err.is_connection() {
                    StepErrorKind::ConnectionError
                } else {
                    StepErrorKind::StepFailed
                };
                warn!(service = %next.service_name, %err, "chained hop failed");
                vec![StepResult::failed(
                    next,
                    kind,
                    err.to_string(),
                    err.status(),
                    elapsed_ms(started),
                )]
            }
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
