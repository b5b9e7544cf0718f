//! Control plane for the step-worker fleet.
//!
//! [`ServiceSupervisor`] leases ports and keeps one worker process per
//! service name, [`JourneyOrchestrator`] sequences journeys over those
//! workers behind a shared [`CircuitBreaker`], [`FlagRegistry`] owns the
//! fault-injection flags, and [`LoadGenerator`] drives journeys at a fixed
//! rate. [`start`] wires them together behind the HTTP API.

pub mod config;
pub mod error;
pub mod flag_registry;
pub mod http;
pub mod launcher;
pub mod load;
pub mod orchestrator;
pub mod ports;
pub mod supervisor;
pub mod synthetic;

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use journey_client::{CircuitBreaker, EventSink};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::info;

pub use config::{
    FleetConfig, FlagConfig, HttpServerConfig, LoadConfig, OrchestratorConfig, SupervisorConfig,
};
pub use error::FleetError;
pub use flag_registry::FlagRegistry;
pub use launcher::{ProcessLauncher, WorkerLauncher, WorkerProcess};
pub use load::LoadGenerator;
pub use orchestrator::{JourneyOrchestrator, JourneyRunner};
pub use ports::{PortLease, PortLeaseRegistry};
pub use supervisor::ServiceSupervisor;

/// All control-plane components, shared by the HTTP handlers.
pub struct Fleet {
    pub supervisor: Arc<ServiceSupervisor>,
    pub breaker: Arc<CircuitBreaker>,
    pub orchestrator: Arc<JourneyOrchestrator>,
    pub flags: Arc<FlagRegistry>,
    pub load: Arc<LoadGenerator>,
}

impl Fleet {
    pub fn new(
        config: FleetConfig,
        launcher: Arc<dyn WorkerLauncher>,
        notifier: Arc<dyn EventSink>,
    ) -> Result<Self, FleetError> {
        let breaker = Arc::new(CircuitBreaker::new(config.breaker));
        let supervisor = Arc::new(ServiceSupervisor::new(
            config.supervisor,
            config.breaker,
            launcher,
        )?);
        let orchestrator = Arc::new(JourneyOrchestrator::new(
            supervisor.clone(),
            breaker.clone(),
            config.orchestrator,
        )?);
        let flags = Arc::new(FlagRegistry::new(config.flags.initial)?);
        let load = Arc::new(LoadGenerator::new(
            orchestrator.clone(),
            flags.clone(),
            notifier,
            config.load,
        ));
        Ok(Self {
            supervisor,
            breaker,
            orchestrator,
            flags,
            load,
        })
    }

    /// Stop every load test, then every worker.
    pub async fn shutdown(&self) {
        let stopped = self.load.stop_all().await;
        self.supervisor.shutdown_all().await;
        info!(load_tests = stopped.len(), "fleet shut down");
    }
}

/// A control plane serving HTTP with its reaper running.
pub struct RunningFleet {
    pub fleet: Arc<Fleet>,
    pub addr: SocketAddr,
    pub shutdown_tx: broadcast::Sender<()>,
    server: JoinHandle<()>,
    reaper: JoinHandle<()>,
}

impl RunningFleet {
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        let _ = self.server.await;
        let _ = self.reaper.await;
        self.fleet.shutdown().await;
    }
}

/// Bind the API, point workers at it, and start serving.
pub async fn start(
    mut config: FleetConfig,
    launcher: Arc<dyn WorkerLauncher>,
    notifier: Arc<dyn EventSink>,
) -> Result<RunningFleet, FleetError> {
    let listener = http::bind(config.http.bind).await?;
    let mut addr = listener.local_addr().map_err(|source| FleetError::Io {
        context: "local addr".into(),
        source,
    })?;
    if addr.ip().is_unspecified() {
        addr.set_ip(Ipv4Addr::LOCALHOST.into());
    }
    config.supervisor.control_url = format!("http://{addr}");

    let fleet = Arc::new(Fleet::new(config, launcher, notifier)?);
    let (shutdown_tx, _) = broadcast::channel(4);
    let reaper = fleet.supervisor.spawn_reaper(shutdown_tx.subscribe());
    let server = http::spawn_http_server(
        listener,
        http::HttpState::new(fleet.clone(), shutdown_tx.clone()),
    );
    Ok(RunningFleet {
        fleet,
        addr,
        shutdown_tx,
        server,
        reaper,
    })
}
