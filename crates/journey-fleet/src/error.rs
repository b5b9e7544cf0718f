use std::time::Duration;

use journey_client::ClientError;
use journey_protocol::{StepErrorKind, ValidationError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FleetError {
    #[error("no free port in {start}..={end}")]
    Exhausted { start: u16, end: u16 },
    #[error("{service} did not pass a health probe within {timeout:?}")]
    ProvisioningTimeout { service: String, timeout: Duration },
    #[error("worker for {service} exited before becoming healthy")]
    WorkerExited { service: String },
    #[error("spawn worker for {service}: {message}")]
    Spawn { service: String, message: String },
    #[error("invalid service name: {0}")]
    InvalidServiceName(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid request: {0}")]
    Invalid(String),
    #[error("{context}: {source}")]
    Io {
        context: String,
        source: std::io::Error,
    },
    #[error(transparent)]
    Client(#[from] ClientError),
}

impl From<ValidationError> for FleetError {
    fn from(err: ValidationError) -> Self {
        FleetError::Invalid(err.to_string())
    }
}

impl FleetError {
    /// Stable machine-readable code used in HTTP error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            FleetError::Exhausted { .. } => "exhausted",
            FleetError::ProvisioningTimeout { .. } => "provisioning_timeout",
            FleetError::WorkerExited { .. } | FleetError::Spawn { .. } => "provisioning_failed",
            FleetError::InvalidServiceName(_) => "invalid_service_name",
            FleetError::NotFound(_) => "not_found",
            FleetError::Invalid(_) => "invalid_request",
            FleetError::Io { .. } => "io_error",
            FleetError::Client(_) => "connection_error",
        }
    }

    pub fn step_error_kind(&self) -> StepErrorKind {
        match self {
            FleetError::Exhausted { .. } => StepErrorKind::Exhausted,
            FleetError::ProvisioningTimeout { .. }
            | FleetError::WorkerExited { .. }
            | FleetError::Spawn { .. } => StepErrorKind::ProvisioningTimeout,
            FleetError::InvalidServiceName(_) | FleetError::Invalid(_) => {
                StepErrorKind::InvalidRequest
            }
            FleetError::NotFound(_) | FleetError::Io { .. } | FleetError::Client(_) => {
                StepErrorKind::ConnectionError
            }
        }
    }
}
