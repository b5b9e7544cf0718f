//! Per-service circuit breaker.
//!
//! Every hop asks for a [`BreakerPermit`] before contacting a service and
//! reports the outcome through it. Closed circuits count failures inside a
//! rolling window; Open circuits reject until the cooldown elapses; the first
//! caller after the cooldown becomes the single HalfOpen probe.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use journey_protocol::BreakerSettings;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::now_wallclock_ms;

pub use journey_protocol::{BreakerState, CircuitBreakerState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub window: Duration,
    pub cooldown: Duration,
    /// Consecutive Closed-state successes that clear the failure count.
    pub success_reset: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        BreakerSettings::default().into()
    }
}

impl From<BreakerSettings> for BreakerConfig {
    fn from(s: BreakerSettings) -> Self {
        Self {
            failure_threshold: s.failure_threshold.max(1),
            window: Duration::from_millis(s.window_ms),
            cooldown: Duration::from_millis(s.cooldown_ms),
            success_reset: s.success_reset.max(1),
        }
    }
}

impl BreakerConfig {
    pub fn settings(&self) -> BreakerSettings {
        BreakerSettings {
            failure_threshold: self.failure_threshold,
            window_ms: self.window.as_millis() as u64,
            cooldown_ms: self.cooldown.as_millis() as u64,
            success_reset: self.success_reset,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("circuit open for {service}, retry in {retry_in:?}")]
pub struct CircuitOpen {
    pub service: String,
    pub retry_in: Duration,
}

#[derive(Debug)]
struct ServiceCircuit {
    state: BreakerState,
    failures: VecDeque<Instant>,
    consecutive_successes: u32,
    opened_at: Option<Instant>,
    opened_at_ms: Option<u64>,
    probe_in_flight: bool,
}

impl Default for ServiceCircuit {
    fn default() -> Self {
        Self {
            state: BreakerState::Closed,
            failures: VecDeque::new(),
            consecutive_successes: 0,
            opened_at: None,
            opened_at_ms: None,
            probe_in_flight: false,
        }
    }
}

impl ServiceCircuit {
    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(first) = self.failures.front() {
            if now.saturating_duration_since(*first) > window {
                self.failures.pop_front();
            } else {
                break;
            }
        }
    }

    fn open(&mut self, now: Instant) {
        self.state = BreakerState::Open;
        self.opened_at = Some(now);
        self.opened_at_ms = Some(now_wallclock_ms());
        self.consecutive_successes = 0;
        self.probe_in_flight = false;
    }

    fn close(&mut self) {
        self.state = BreakerState::Closed;
        self.failures.clear();
        self.consecutive_successes = 0;
        self.opened_at = None;
        self.opened_at_ms = None;
        self.probe_in_flight = false;
    }
}

#[derive(Debug, Default)]
pub struct CircuitBreaker {
    config: BreakerConfig,
    circuits: Mutex<HashMap<String, ServiceCircuit>>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            circuits: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ServiceCircuit>> {
        self.circuits.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Ask to send one request to `service`.
    pub fn acquire(&self, service: &str) -> Result<BreakerPermit<'_>, CircuitOpen> {
        let now = Instant::now();
        let mut circuits = self.lock();
        let circuit = circuits.entry(service.to_string()).or_default();
        let probe = match circuit.state {
            BreakerState::Closed => false,
            BreakerState::Open => {
                let opened = circuit.opened_at.unwrap_or(now);
                let elapsed = now.saturating_duration_since(opened);
                if elapsed < self.config.cooldown {
                    return Err(CircuitOpen {
                        service: service.to_string(),
                        retry_in: self.config.cooldown - elapsed,
                    });
                }
                circuit.state = BreakerState::HalfOpen;
                circuit.probe_in_flight = true;
                info!(service, "circuit half-open, admitting probe");
                true
            }
            BreakerState::HalfOpen => {
                if circuit.probe_in_flight {
                    return Err(CircuitOpen {
                        service: service.to_string(),
                        retry_in: Duration::ZERO,
                    });
                }
                circuit.probe_in_flight = true;
                true
            }
        };
        Ok(BreakerPermit {
            breaker: self,
            service: service.to_string(),
            probe,
            resolved: false,
        })
    }

    fn record(&self, service: &str, probe: bool, ok: bool) {
        let now = Instant::now();
        let mut circuits = self.lock();
        let circuit = circuits.entry(service.to_string()).or_default();

        if probe {
            if ok {
                circuit.close();
                info!(service, "probe succeeded, circuit closed");
            } else {
                circuit.open(now);
                warn!(service, "probe failed, circuit reopened");
            }
            return;
        }

        // Late results from requests admitted before the circuit opened.
        if circuit.state != BreakerState::Closed {
            return;
        }

        if ok {
            circuit.consecutive_successes = circuit.consecutive_successes.saturating_add(1);
            if circuit.consecutive_successes >= self.config.success_reset {
                circuit.failures.clear();
            }
            return;
        }

        circuit.consecutive_successes = 0;
        circuit.prune(now, self.config.window);
        circuit.failures.push_back(now);
        if circuit.failures.len() >= self.config.failure_threshold as usize {
            circuit.open(now);
            warn!(
                service,
                failures = self.config.failure_threshold,
                "failure threshold reached, circuit opened"
            );
        }
    }

    pub fn state(&self, service: &str) -> BreakerState {
        self.lock()
            .get(service)
            .map(|c| c.state)
            .unwrap_or(BreakerState::Closed)
    }

    pub fn snapshot(&self, service: &str) -> CircuitBreakerState {
        let now = Instant::now();
        let mut circuits = self.lock();
        match circuits.get_mut(service) {
            Some(circuit) => view(service, circuit, now, self.config.window),
            None => CircuitBreakerState {
                service_name: service.to_string(),
                failure_count: 0,
                state: BreakerState::Closed,
                opened_at: None,
            },
        }
    }

    /// All known circuits, sorted by service name.
    pub fn snapshots(&self) -> Vec<CircuitBreakerState> {
        let now = Instant::now();
        let mut circuits = self.lock();
        let mut out: Vec<_> = circuits
            .iter_mut()
            .map(|(name, circuit)| view(name, circuit, now, self.config.window))
            .collect();
        out.sort_by(|a, b| a.service_name.cmp(&b.service_name));
        out
    }
}

fn view(
    service: &str,
    circuit: &mut ServiceCircuit,
    now: Instant,
    window: Duration,
) -> CircuitBreakerState {
    circuit.prune(now, window);
    CircuitBreakerState {
        service_name: service.to_string(),
        failure_count: circuit.failures.len() as u32,
        state: circuit.state,
        opened_at: circuit.opened_at_ms,
    }
}

/// Admission for a single request. Report the outcome with [`succeed`],
/// [`fail`], or [`record`]; a probe dropped without an outcome counts as a
/// failure.
///
/// [`succeed`]: BreakerPermit::succeed
/// [`fail`]: BreakerPermit::fail
/// [`record`]: BreakerPermit::record
#[must_use = "report the outcome through the permit"]
#[derive(Debug)]
pub struct BreakerPermit<'a> {
    breaker: &'a CircuitBreaker,
    service: String,
    probe: bool,
    resolved: bool,
}

impl BreakerPermit<'_> {
    pub fn is_probe(&self) -> bool {
        self.probe
    }

    pub fn succeed(self) {
        self.record(true);
    }

    pub fn fail(self) {
        self.record(false);
    }

    pub fn record(mut self, ok: bool) {
        self.resolved = true;
        self.breaker.record(&self.service, self.probe, ok);
    }
}

impl Drop for BreakerPermit<'_> {
    fn drop(&mut self) {
        if !self.resolved && self.probe {
            self.breaker.record(&self.service, true, false);
        }
    }
}
