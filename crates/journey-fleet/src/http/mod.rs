pub mod api;

use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use utoipa_swagger_ui::SwaggerUi;

use crate::Fleet;
use crate::error::FleetError;

#[derive(Clone)]
pub struct HttpState {
    pub fleet: Arc<Fleet>,
    pub shutdown_tx: broadcast::Sender<()>,
}

impl HttpState {
    pub fn new(fleet: Arc<Fleet>, shutdown_tx: broadcast::Sender<()>) -> Self {
        Self { fleet, shutdown_tx }
    }
}

/// Control-plane API under `/api` plus Swagger UI.
pub fn app(state: HttpState) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/api/docs").url("/api/openapi.json", api::openapi()))
        .nest("/api", api::router())
        .with_state(state)
}

pub async fn bind(addr: std::net::SocketAddr) -> Result<TcpListener, FleetError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| FleetError::Io {
            context: format!("bind {addr}"),
            source,
        })
}

pub fn spawn_http_server(listener: TcpListener, state: HttpState) -> JoinHandle<()> {
    let shutdown_tx = state.shutdown_tx.clone();
    let app = app(state);
    tokio::spawn(async move {
        if let Err(err) = serve(listener, app, shutdown_tx).await {
            tracing::error!("http server error: {err}");
        }
    })
}

async fn serve(
    listener: TcpListener,
    app: Router,
    shutdown_tx: broadcast::Sender<()>,
) -> Result<(), String> {
    let addr = listener
        .local_addr()
        .map_err(|e| format!("local addr: {e}"))?;
    tracing::info!("HTTP server listening on http://{}", addr);
    let mut shutdown_rx = shutdown_tx.subscribe();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
        })
        .await
        .map_err(|e| format!("serve {addr}: {e}"))
}
