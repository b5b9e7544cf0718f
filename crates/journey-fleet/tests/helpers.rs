//! Shared helpers for control-plane integration tests.
//!
//! Each integration test compiles this module separately, so some helpers
//! look unused from one file or another.

#![allow(dead_code)]

use std::collections::HashMap;
use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use journey_client::{EventSink, FeatureFlagStore, FleetClient, OutboundEvent};
use journey_fleet::{FleetConfig, FleetError, WorkerLauncher, WorkerProcess};
use journey_protocol::{FeatureFlagSet, JourneyDefinition, StepSpec, WorkerDescriptor};
use journey_worker::{ControlPlaneDirectory, WorkerRuntime, router};
use rand::Rng;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

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

/// Runs each worker as a task in the test runtime, bound to the leased port.
#[derive(Default)]
pub struct InProcessLauncher {
    overrides: Mutex<HashMap<String, FeatureFlagSet>>,
    launches: AtomicUsize,
    startup_delay: Duration,
    pub sink: Arc<RecordingSink>,
}

impl InProcessLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_startup_delay(delay: Duration) -> Self {
        Self {
            startup_delay: delay,
            ..Self::default()
        }
    }

    /// Workers for `service` start with these flags instead of the defaults.
    pub fn flags_for(&self, service: &str, flags: FeatureFlagSet) {
        self.overrides
            .lock()
            .unwrap()
            .insert(service.to_string(), flags);
    }

    /// Workers for `service` fail every error-eligible step.
    pub fn always_fail(&self, service: &str) {
        self.flags_for(
            service,
            FeatureFlagSet {
                errors_per_transaction: 1.0,
                ..FeatureFlagSet::default()
            },
        );
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WorkerLauncher for InProcessLauncher {
    async fn launch(
        &self,
        descriptor: &WorkerDescriptor,
    ) -> Result<Box<dyn WorkerProcess>, FleetError> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        let flags = self
            .overrides
            .lock()
            .unwrap()
            .get(&descriptor.service_name)
            .copied()
            .unwrap_or_default();
        let control = FleetClient::new(
            descriptor.control_url.clone(),
            Duration::from_millis(descriptor.ensure_timeout_ms),
        )?;
        let runtime = WorkerRuntime::new(
            descriptor.clone(),
            FeatureFlagStore::new(flags),
            Arc::new(ControlPlaneDirectory::new(control)),
            self.sink.clone(),
        )
        .map_err(|e| FleetError::Spawn {
            service: descriptor.service_name.clone(),
            message: e.to_string(),
        })?;
        let addr = descriptor.bind_addr();
        let delay = self.startup_delay;
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let listener = TcpListener::bind(addr).await.expect("bind worker port");
            axum::serve(listener, router(Arc::new(runtime)))
                .await
                .expect("serve worker");
        });
        Ok(Box::new(TaskProcess { task }))
    }
}

/// A launcher whose workers never bind, so health probes never succeed.
#[derive(Default)]
pub struct SilentLauncher {
    launches: AtomicUsize,
}

impl SilentLauncher {
    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WorkerLauncher for SilentLauncher {
    async fn launch(
        &self,
        _descriptor: &WorkerDescriptor,
    ) -> Result<Box<dyn WorkerProcess>, FleetError> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        let task = tokio::spawn(std::future::pending::<()>());
        Ok(Box::new(TaskProcess { task }))
    }
}

struct TaskProcess {
    task: JoinHandle<()>,
}

#[async_trait]
impl WorkerProcess for TaskProcess {
    fn pid(&self) -> Option<u32> {
        None
    }

    fn has_exited(&mut self) -> bool {
        self.task.is_finished()
    }

    async fn terminate(&mut self) {
        self.task.abort();
        let _ = (&mut self.task).await;
    }
}

/// A block of loopback ports that were all free a moment ago.
pub fn free_port_block(len: u16) -> RangeInclusive<u16> {
    let mut rng = rand::thread_rng();
    loop {
        let start: u16 = rng.gen_range(20_000..60_000);
        let end = start + len - 1;
        let free = (start..=end).all(|port| std::net::TcpListener::bind(("127.0.0.1", port)).is_ok());
        if free {
            return start..=end;
        }
    }
}

/// Config with a private port block, short probe interval, and quick timeouts.
pub fn test_config(ports: u16) -> FleetConfig {
    let mut config = FleetConfig::default();
    config.http.bind = ([127, 0, 0, 1], 0).into();
    config.supervisor.port_range = free_port_block(ports);
    config.supervisor.provision_timeout = Duration::from_secs(5);
    config.supervisor.health_poll = Duration::from_millis(20);
    config.supervisor.max_simulated_latency = Duration::from_millis(200);
    config.orchestrator.step_timeout = Duration::from_secs(5);
    config
}

pub fn step(service: &str) -> StepSpec {
    StepSpec::new(format!("{service}Step"), service)
}

pub fn journey(services: &[&str]) -> JourneyDefinition {
    JourneyDefinition::new("Acme", services.iter().map(|s| step(s)).collect())
}
