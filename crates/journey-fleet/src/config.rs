use std::net::SocketAddr;
use std::ops::RangeInclusive;
use std::time::Duration;

use journey_client::BreakerConfig;
use journey_protocol::{FailurePolicy, FeatureFlagSet};

#[derive(Debug, Clone, Default)]
pub struct FleetConfig {
    pub supervisor: SupervisorConfig,
    pub breaker: BreakerConfig,
    pub orchestrator: OrchestratorConfig,
    pub flags: FlagConfig,
    pub load: LoadConfig,
    pub http: HttpServerConfig,
}

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Loopback ports handed out to workers.
    pub port_range: RangeInclusive<u16>,
    /// Budget for spawn plus first successful health probe.
    pub provision_timeout: Duration,
    pub health_poll: Duration,
    /// Workers unused for this long are terminated by the reaper.
    pub idle_ttl: Duration,
    pub reap_interval: Duration,
    /// Base URL workers use to reach the control plane. Filled in once the
    /// HTTP listener is bound.
    pub control_url: String,
    /// Where workers POST business events; logged locally when unset.
    pub events_url: Option<String>,
    pub flag_refresh: Duration,
    pub max_simulated_latency: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            port_range: 4101..=4199,
            provision_timeout: Duration::from_secs(10),
            health_poll: Duration::from_millis(100),
            idle_ttl: Duration::from_secs(300),
            reap_interval: Duration::from_secs(30),
            control_url: "http://127.0.0.1:8080".into(),
            events_url: None,
            flag_refresh: Duration::from_secs(5),
            max_simulated_latency: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Cap on one `process` call; chained runs get this per remaining hop.
    pub step_timeout: Duration,
    pub default_policy: FailurePolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            step_timeout: Duration::from_secs(10),
            default_policy: FailurePolicy::StopOnFirstFailure,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FlagConfig {
    pub initial: FeatureFlagSet,
}

#[derive(Debug, Clone)]
pub struct LoadConfig {
    /// `errorsPerTransaction` while injection is toggled on.
    pub injection_rate: f64,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            injection_rate: 0.1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpServerConfig {
    pub bind: SocketAddr,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8080)),
        }
    }
}

/// Parse `4101-4199` (or a single port) into an inclusive range.
pub fn parse_port_range(raw: &str) -> Result<RangeInclusive<u16>, String> {
    let (start, end) = match raw.split_once('-') {
        Some((a, b)) => (a.trim(), b.trim()),
        None => (raw.trim(), raw.trim()),
    };
    let start: u16 = start
        .parse()
        .map_err(|e| format!("invalid start port {start:?}: {e}"))?;
    let end: u16 = end
        .parse()
        .map_err(|e| format!("invalid end port {end:?}: {e}"))?;
    if start == 0 || start > end {
        return Err(format!("invalid port range {start}-{end}"));
    }
    Ok(start..=end)
}
