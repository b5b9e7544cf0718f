use std::net::SocketAddr;

use journey_client::ClientError;
use journey_protocol::{StepErrorKind, ValidationError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("invalid request: {0}")]
    Invalid(String),
    #[error("ensure-service for {service} failed: {message}")]
    Provisioning {
        service: String,
        kind: StepErrorKind,
        message: String,
    },
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },
    #[error("serve: {0}")]
    Serve(std::io::Error),
}

impl From<ValidationError> for WorkerError {
    fn from(err: ValidationError) -> Self {
        WorkerError::Invalid(err.to_string())
    }
}

impl WorkerError {
    /// How this error is reported in a step result.
    pub fn step_error_kind(&self) -> StepErrorKind {
        match self {
            WorkerError::Invalid(_) => StepErrorKind::InvalidRequest,
            WorkerError::Provisioning { kind, .. } => *kind,
            WorkerError::Client(ClientError::Api { .. }) => StepErrorKind::StepFailed,
            WorkerError::Client(_) | WorkerError::Bind { .. } | WorkerError::Serve(_) => {
                StepErrorKind::ConnectionError
            }
        }
    }
}
