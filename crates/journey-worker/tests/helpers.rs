//! Shared helpers for worker integration tests.
//!
//! Each integration test compiles this module separately, so some helpers
//! look unused from one file or another.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use journey_client::{EventSink, FeatureFlagStore, OutboundEvent};
use journey_protocol::{
    BreakerSettings, FeatureFlagSet, JourneyContext, ProcessRequest, ProcessResponse,
    StepErrorKind, StepPayload, StepSpec, WorkerDescriptor,
};
use journey_worker::{ServiceDirectory, WorkerError, WorkerRuntime, router};
use tokio::net::TcpListener;

#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<OutboundEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<OutboundEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: OutboundEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Fixed name-to-port table standing in for the control plane.
#[derive(Default)]
pub struct StaticDirectory {
    entries: Mutex<HashMap<String, Result<u16, StepErrorKind>>>,
}

impl StaticDirectory {
    pub fn insert(&self, service: &str, port: u16) {
        self.entries
            .lock()
            .unwrap()
            .insert(service.to_string(), Ok(port));
    }

    pub fn fail(&self, service: &str, kind: StepErrorKind) {
        self.entries
            .lock()
            .unwrap()
            .insert(service.to_string(), Err(kind));
    }
}

#[async_trait]
impl ServiceDirectory for StaticDirectory {
    async fn ensure_service(&self, service_name: &str) -> Result<u16, WorkerError> {
        let entry = self.entries.lock().unwrap().get(service_name).copied();
        match entry {
            Some(Ok(port)) => Ok(port),
            Some(Err(kind)) => Err(WorkerError::Provisioning {
                service: service_name.to_string(),
                kind,
                message: "scripted failure".into(),
            }),
            None => Err(WorkerError::Provisioning {
                service: service_name.to_string(),
                kind: StepErrorKind::ConnectionError,
                message: "unknown service".into(),
            }),
        }
    }
}

pub fn descriptor(service: &str, port: u16) -> WorkerDescriptor {
    WorkerDescriptor {
        service_name: service.to_string(),
        port,
        instance_id: format!("{service}-test"),
        control_url: "http://127.0.0.1:9".into(),
        events_url: None,
        flag_refresh_ms: 5_000,
        ensure_timeout_ms: 1_000,
        max_simulated_latency_ms: 2_000,
        breaker: BreakerSettings::default(),
    }
}

pub fn flags(errors_per_transaction: f64) -> FeatureFlagSet {
    FeatureFlagSet {
        errors_per_transaction,
        ..FeatureFlagSet::default()
    }
}

/// Serve a real worker router on an ephemeral loopback port.
pub async fn spawn_worker(
    service: &str,
    flag_set: FeatureFlagSet,
    directory: Arc<dyn ServiceDirectory>,
    sink: Arc<RecordingSink>,
) -> (u16, Arc<WorkerRuntime>) {
    let listener = TcpListener::bind(("127.0.0.1", 0)).await.expect("bind");
    let port = listener.local_addr().expect("addr").port();
    let runtime = Arc::new(
        WorkerRuntime::new(
            descriptor(service, port),
            FeatureFlagStore::new(flag_set),
            directory,
            sink,
        )
        .expect("runtime"),
    );
    let app = router(runtime.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    (port, runtime)
}

pub fn step(service: &str) -> StepSpec {
    StepSpec::new(format!("{service}Step"), service)
}

pub fn request(first: StepSpec, remaining: Vec<StepSpec>, chained: bool) -> ProcessRequest {
    ProcessRequest {
        journey_id: "journey-1".into(),
        correlation_id: "corr-1".into(),
        chained,
        step_payload: StepPayload {
            company_name: "Acme".into(),
            step: first,
            step_index: 0,
            remaining_steps: remaining,
            context: JourneyContext {
                customer_id: Some("customer_1_1".into()),
                ..JourneyContext::default()
            },
            error_simulation_enabled: true,
            think_time_ms: 0,
            hop_timeout_ms: 2_000,
            failure_policy: Default::default(),
        },
    }
}

pub async fn post_process(port: u16, body: &serde_json::Value) -> (u16, ProcessResponse) {
    let resp = reqwest::Client::new()
        .post(format!("http://127.0.0.1:{port}/process"))
        .json(body)
        .send()
        .await
        .expect("send");
    let status = resp.status().as_u16();
    (status, resp.json().await.expect("process response"))
}
