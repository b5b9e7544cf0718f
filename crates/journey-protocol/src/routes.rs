//! HTTP paths shared by servers and clients.

pub const HEALTH: &str = "/api/health";
pub const ENSURE_SERVICE: &str = "/api/ensure-service";
pub const SERVICES: &str = "/api/services";
pub const SIMULATE_JOURNEY: &str = "/api/journey-simulation/simulate-journey";
pub const CIRCUIT_BREAKERS: &str = "/api/circuit-breakers";
pub const FEATURE_FLAGS: &str = "/api/feature-flags";
pub const LOAD_START: &str = "/api/load/start";
pub const LOAD_STOP: &str = "/api/load/stop";
pub const LOAD_STATUS: &str = "/api/load/status";
pub const LOAD_STOP_ALL: &str = "/api/load/stop-all";

/// Worker-local routes.
pub const WORKER_HEALTH: &str = "/health";
pub const WORKER_PROCESS: &str = "/process";

pub fn service(name: &str) -> String {
    format!("{SERVICES}/{name}")
}
