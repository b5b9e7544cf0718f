//! Control-plane types: ensure-service, instance listings, and the worker
//! descriptor handed to every spawned process.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EnsureServiceRequest {
    pub service_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EnsureServiceResponse {
    pub service_name: String,
    pub port: u16,
    pub state: InstanceState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum InstanceState {
    Starting,
    Healthy,
    Unresponsive,
    Terminated,
}

impl InstanceState {
    /// Starting and Healthy instances are reused instead of respawned.
    pub fn is_live(self) -> bool {
        matches!(self, InstanceState::Starting | InstanceState::Healthy)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInstanceInfo {
    pub service_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    pub state: InstanceState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_health_check_at: Option<u64>,
}

/// Everything a worker needs to know about itself, passed explicitly at spawn time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WorkerDescriptor {
    pub service_name: String,
    pub port: u16,
    pub instance_id: String,
    /// Base URL of the control plane, e.g. `http://127.0.0.1:8080`.
    pub control_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub events_url: Option<String>,
    pub flag_refresh_ms: u64,
    /// Cap on one ensure-service call made while forwarding.
    pub ensure_timeout_ms: u64,
    pub max_simulated_latency_ms: u64,
    pub breaker: BreakerSettings,
}

impl WorkerDescriptor {
    pub fn bind_addr(&self) -> std::net::SocketAddr {
        std::net::SocketAddr::from(([127, 0, 0, 1], self.port))
    }
}

/// Circuit breaker tuning in wire form (milliseconds).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BreakerSettings {
    pub failure_threshold: u32,
    pub window_ms: u64,
    pub cooldown_ms: u64,
    pub success_reset: u32,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            window_ms: 60_000,
            cooldown_ms: 30_000,
            success_reset: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

/// Point-in-time view of one service's breaker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CircuitBreakerState {
    pub service_name: String,
    /// Failures inside the rolling window.
    pub failure_count: u32,
    pub state: BreakerState,
    /// Epoch ms of the last transition to Open.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opened_at: Option<u64>,
}
