//! Wire types shared by the control plane, step workers, and clients.
//!
//! Everything here is plain data: serde-serializable with camelCase field
//! names, and annotated for the OpenAPI document served by the control plane.

pub mod events;
pub mod fleet;
pub mod flags;
pub mod journey;
pub mod load;
pub mod routes;
pub mod worker;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

pub use events::{BusinessEvent, FlagChangeNotice};
pub use fleet::{
    BreakerSettings, BreakerState, CircuitBreakerState, EnsureServiceRequest,
    EnsureServiceResponse, InstanceState, ServiceInstanceInfo, WorkerDescriptor,
};
pub use flags::{FeatureFlagPatch, FeatureFlagSet, FlagUpdateRequest, FlagUpdateResponse};
pub use journey::{
    CustomerProfile, FailurePolicy, JourneyContext, JourneyDefinition, JourneyRun, RunFailure,
    RunStatus, SimulateRequest, StepError, StepErrorKind, StepResult, StepSpec, StepStatus,
    Substep,
};
pub use load::{
    LoadStartRequest, LoadStartResponse, LoadStats, LoadStopRequest, LoadTest, LoadTestState,
};
pub use worker::{HealthResponse, ProcessRequest, ProcessResponse, StepPayload};

/// Error body returned by every HTTP surface on failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{field} must not be empty")]
    Empty { field: &'static str },
    #[error("{field} must be within [0, 1], got {value}")]
    OutOfRange { field: &'static str, value: f64 },
    #[error("{field} must be at least {min}")]
    TooSmall { field: &'static str, min: u64 },
    #[error("invalid service name {0:?}: use letters, digits, '-', '_' or '.'")]
    ServiceName(String),
}

/// Service names end up in URLs, log fields, and process arguments.
pub fn validate_service_name(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::Empty {
            field: "serviceName",
        });
    }
    let ok = name.len() <= 128
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if ok {
        Ok(())
    } else {
        Err(ValidationError::ServiceName(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_names_are_restricted() {
        assert!(validate_service_name("CheckoutService").is_ok());
        assert!(validate_service_name("basket-management_v2.1").is_ok());
        assert!(validate_service_name("").is_err());
        assert!(validate_service_name("../etc").is_err());
        assert!(validate_service_name("has space").is_err());
        assert!(validate_service_name(&"x".repeat(129)).is_err());
    }
}
