//! Clients for the control plane and step workers, plus the client-side
//! resilience pieces every caller shares: the circuit breaker, the polled
//! feature-flag cache, and fire-and-forget event sinks.

pub mod breaker;
pub mod error;
pub mod events;
pub mod fleet;
pub mod flags;
pub mod worker;

mod transport;

use std::time::{SystemTime, UNIX_EPOCH};

pub use breaker::{
    BreakerConfig, BreakerPermit, BreakerState, CircuitBreaker, CircuitBreakerState, CircuitOpen,
};
pub use error::ClientError;
pub use events::{EventSink, HttpEventSink, LogEventSink, OutboundEvent};
pub use fleet::FleetClient;
pub use flags::{ConfigRefreshFailed, FeatureFlagStore, FlagSource};
pub use worker::WorkerClient;

pub fn now_wallclock_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
