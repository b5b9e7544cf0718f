use std::time::Duration;

use journey_protocol::{HealthResponse, ProcessRequest, ProcessResponse, routes};
use reqwest::Client;

use crate::error::ClientError;
use crate::transport::{build_client, execute};

/// Loopback client for step workers, addressed by port.
#[derive(Debug, Clone)]
pub struct WorkerClient {
    http: Client,
}

impl WorkerClient {
    pub fn new() -> Result<Self, ClientError> {
        Ok(Self {
            http: build_client()?,
        })
    }

    pub fn url(port: u16, path: &str) -> String {
        format!("http://127.0.0.1:{port}{path}")
    }

    pub async fn health(&self, port: u16, timeout: Duration) -> Result<HealthResponse, ClientError> {
        execute(
            self.http.get(Self::url(port, routes::WORKER_HEALTH)),
            timeout,
        )
        .await?
        .json()
    }

    /// Returns the worker's HTTP status with its body. Failed steps come back
    /// with a non-2xx status and a `ProcessResponse`; only undecodable replies
    /// and network failures are errors.
    pub async fn process(
        &self,
        port: u16,
        request: &ProcessRequest,
        timeout: Duration,
    ) -> Result<(u16, ProcessResponse), ClientError> {
        let raw = execute(
            self.http
                .post(Self::url(port, routes::WORKER_PROCESS))
                .json(request),
            timeout,
        )
        .await?;
        match raw.decode::<ProcessResponse>() {
            Ok(body) if !body.results.is_empty() => Ok((raw.status.as_u16(), body)),
            _ if !raw.status.is_success() => Err(raw.api_error()),
            Ok(_) => Err(ClientError::Decode("worker returned no results".into())),
            Err(e) => Err(e),
        }
    }
}
