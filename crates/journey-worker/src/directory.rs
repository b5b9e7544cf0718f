use async_trait::async_trait;
use journey_client::{ClientError, FleetClient};
use journey_protocol::StepErrorKind;

use crate::error::WorkerError;

/// Resolves the loopback port of a service, provisioning it if needed.
#[async_trait]
pub trait ServiceDirectory: Send + Sync {
    async fn ensure_service(&self, service_name: &str) -> Result<u16, WorkerError>;
}

/// Resolves ports through the control plane's `ensure-service` call.
#[derive(Debug, Clone)]
pub struct ControlPlaneDirectory {
    client: FleetClient,
}

impl ControlPlaneDirectory {
    pub fn new(client: FleetClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ServiceDirectory for ControlPlaneDirectory {
    async fn ensure_service(&self, service_name: &str) -> Result<u16, WorkerError> {
        match self.client.ensure_service(service_name).await {
            Ok(resp) => Ok(resp.port),
            Err(ClientError::Api { code, message, .. }) => Err(WorkerError::Provisioning {
                service: service_name.to_string(),
                kind: kind_for_code(&code),
                message,
            }),
            Err(err) => Err(err.into()),
        }
    }
}

fn kind_for_code(code: &str) -> StepErrorKind {
    match code {
        "provisioning_timeout" | "provisioning_failed" => StepErrorKind::ProvisioningTimeout,
        "exhausted" => StepErrorKind::Exhausted,
        "invalid_service_name" | "invalid_request" => StepErrorKind::InvalidRequest,
        _ => StepErrorKind::ConnectionError,
    }
}
