//! Runtime hosted by every spawned step worker.
//!
//! A worker serves one service name on one loopback port. It runs its step,
//! optionally injects a fault from the current flag snapshot, emits a business
//! event, and in chained mode forwards the remaining steps to the next
//! service, resolved through a [`ServiceDirectory`].

pub mod directory;
pub mod error;
pub mod http;
pub mod injector;
pub mod runtime;

use std::sync::Arc;
use std::time::Duration;

use journey_client::{
    EventSink, FeatureFlagStore, FlagSource, FleetClient, HttpEventSink, LogEventSink,
};
use journey_protocol::WorkerDescriptor;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{Instrument, info, info_span, warn};

pub use directory::{ControlPlaneDirectory, ServiceDirectory};
pub use error::WorkerError;
pub use http::{router, serve};
pub use injector::FaultInjector;
pub use runtime::WorkerRuntime;

const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Wire up a worker from its descriptor and serve until Ctrl-C.
pub async fn run(descriptor: WorkerDescriptor) -> Result<(), WorkerError> {
    let span = info_span!(
        "worker",
        service = %descriptor.service_name,
        port = descriptor.port
    );
    run_inner(descriptor).instrument(span).await
}

async fn run_inner(descriptor: WorkerDescriptor) -> Result<(), WorkerError> {
    let refresh = Duration::from_millis(descriptor.flag_refresh_ms.max(100));
    let control = FleetClient::new(descriptor.control_url.clone(), refresh)?;
    let directory = ControlPlaneDirectory::new(
        control.with_timeout(Duration::from_millis(descriptor.ensure_timeout_ms)),
    );
    let events: Arc<dyn EventSink> = match &descriptor.events_url {
        Some(url) => Arc::new(HttpEventSink::new(url.clone(), EVENT_TIMEOUT)?),
        None => Arc::new(LogEventSink),
    };

    let flags = FeatureFlagStore::default();
    if let Err(err) = flags.refresh(&control).await {
        warn!(%err, "starting with default feature flags");
    }

    let addr = descriptor.bind_addr();
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| WorkerError::Bind { addr, source })?;

    let (shutdown_tx, _) = broadcast::channel(1);
    let source: Arc<dyn FlagSource> = Arc::new(control);
    let refresher = flags.spawn_refresh(source, refresh, shutdown_tx.subscribe());

    let runtime = Arc::new(WorkerRuntime::new(
        descriptor,
        flags,
        Arc::new(directory),
        events,
    )?);

    let signal_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = signal_tx.send(());
        }
    });

    info!("worker listening on http://{addr}");
    let result = serve(listener, runtime, shutdown_tx.subscribe()).await;
    let _ = shutdown_tx.send(());
    let _ = refresher.await;
    result
}
