//! One live worker process per service name.
//!
//! Each service name owns a slot guarded by an async mutex. `ensure_service`
//! holds the slot lock for the whole spawn-and-probe sequence, so concurrent
//! callers for one name wait for the first caller's provisioning instead of
//! spawning a second process. Distinct names never share a lock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use journey_client::{BreakerConfig, WorkerClient, now_wallclock_ms};
use journey_protocol::{
    EnsureServiceResponse, InstanceState, ServiceInstanceInfo, WorkerDescriptor,
    validate_service_name,
};
use tokio::sync::{Mutex as AsyncMutex, broadcast};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::SupervisorConfig;
use crate::error::FleetError;
use crate::launcher::{WorkerLauncher, WorkerProcess};
use crate::ports::PortLeaseRegistry;

const PROBE_TIMEOUT: Duration = Duration::from_secs(1);
const ENSURE_MARGIN: Duration = Duration::from_secs(5);

struct Instance {
    port: u16,
    instance_id: String,
    process: Box<dyn WorkerProcess>,
    state: InstanceState,
    started_at: u64,
    last_health_check_at: Option<u64>,
    last_used: Instant,
}

impl Instance {
    fn info(&self, service_name: &str) -> ServiceInstanceInfo {
        ServiceInstanceInfo {
            service_name: service_name.to_string(),
            port: Some(self.port),
            pid: self.process.pid(),
            state: self.state,
            instance_id: Some(self.instance_id.clone()),
            started_at: Some(self.started_at),
            last_health_check_at: self.last_health_check_at,
        }
    }
}

#[derive(Default)]
struct Slot {
    live: Option<Instance>,
    /// Last instance that left the fleet, kept for listings.
    retired: Option<ServiceInstanceInfo>,
    retired_at: Option<Instant>,
}

impl Slot {
    fn set_retired(&mut self, info: Option<ServiceInstanceInfo>) {
        self.retired_at = info.as_ref().map(|_| Instant::now());
        self.retired = info;
    }

    /// No live worker, and nothing retired within `ttl`.
    fn expired(&self, ttl: Duration) -> bool {
        self.live.is_none() && self.retired_at.is_none_or(|at| at.elapsed() >= ttl)
    }
}

type SlotHandle = Arc<AsyncMutex<Slot>>;

pub struct ServiceSupervisor {
    config: SupervisorConfig,
    breaker: BreakerConfig,
    launcher: Arc<dyn WorkerLauncher>,
    ports: PortLeaseRegistry,
    slots: Mutex<HashMap<String, SlotHandle>>,
    client: WorkerClient,
}

impl ServiceSupervisor {
    pub fn new(
        config: SupervisorConfig,
        breaker: BreakerConfig,
        launcher: Arc<dyn WorkerLauncher>,
    ) -> Result<Self, FleetError> {
        Ok(Self {
            ports: PortLeaseRegistry::new(config.port_range.clone()),
            config,
            breaker,
            launcher,
            slots: Mutex::new(HashMap::new()),
            client: WorkerClient::new()?,
        })
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    pub fn ports(&self) -> &PortLeaseRegistry {
        &self.ports
    }

    /// Longest a worker may wait on `ensure-service` for its next hop.
    pub fn ensure_budget(&self) -> Duration {
        self.config.provision_timeout + ENSURE_MARGIN
    }

    fn slot(&self, service_name: &str) -> SlotHandle {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(service_name.to_string())
            .or_default()
            .clone()
    }

    fn existing_slot(&self, service_name: &str) -> Option<SlotHandle> {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(service_name)
            .cloned()
    }

    fn all_slots(&self) -> Vec<(String, SlotHandle)> {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(name, slot)| (name.clone(), slot.clone()))
            .collect()
    }

    /// Return the port of a live worker for `service_name`, spawning one if needed.
    pub async fn ensure_service(
        &self,
        service_name: &str,
    ) -> Result<EnsureServiceResponse, FleetError> {
        validate_service_name(service_name)
            .map_err(|e| FleetError::InvalidServiceName(e.to_string()))?;
        let slot = self.slot(service_name);
        let mut slot = slot.lock().await;

        if let Some(instance) = slot.live.as_mut() {
            if instance.state.is_live() && !instance.process.has_exited() {
                instance.last_used = Instant::now();
                return Ok(EnsureServiceResponse {
                    service_name: service_name.to_string(),
                    port: instance.port,
                    state: instance.state,
                });
            }
            warn!(service = service_name, "worker process gone, replacing it");
        }
        if let Some(dead) = slot.live.take() {
            slot.set_retired(Some(self.retire(service_name, dead).await));
        }

        match self.provision(service_name).await {
            Ok(instance) => {
                let response = EnsureServiceResponse {
                    service_name: service_name.to_string(),
                    port: instance.port,
                    state: instance.state,
                };
                slot.live = Some(instance);
                Ok(response)
            }
            Err((err, tombstone)) => {
                slot.set_retired(tombstone);
                Err(err)
            }
        }
    }

    async fn provision(
        &self,
        service_name: &str,
    ) -> Result<Instance, (FleetError, Option<ServiceInstanceInfo>)> {
        let port = self.ports.lease(service_name).map_err(|e| (e, None))?;
        let instance_id = format!("{service_name}-{}", Uuid::new_v4().simple());
        let descriptor = WorkerDescriptor {
            service_name: service_name.to_string(),
            port,
            instance_id: instance_id.clone(),
            control_url: self.config.control_url.clone(),
            events_url: self.config.events_url.clone(),
            flag_refresh_ms: self.config.flag_refresh.as_millis() as u64,
            ensure_timeout_ms: self.ensure_budget().as_millis() as u64,
            max_simulated_latency_ms: self.config.max_simulated_latency.as_millis() as u64,
            breaker: self.breaker.settings(),
        };

        let mut process = match self.launcher.launch(&descriptor).await {
            Ok(process) => process,
            Err(err) => {
                self.ports.release(port);
                return Err((err, None));
            }
        };
        let started_at = now_wallclock_ms();
        info!(
            service = service_name,
            port,
            pid = ?process.pid(),
            "worker starting"
        );

        match self.await_healthy(service_name, port, process.as_mut()).await {
            Ok(()) => {
                info!(service = service_name, port, "worker healthy");
                let now = now_wallclock_ms();
                Ok(Instance {
                    port,
                    instance_id,
                    process,
                    state: InstanceState::Healthy,
                    started_at,
                    last_health_check_at: Some(now),
                    last_used: Instant::now(),
                })
            }
            Err(err) => {
                warn!(service = service_name, port, %err, "worker unresponsive, terminating");
                let tombstone = ServiceInstanceInfo {
                    service_name: service_name.to_string(),
                    port: None,
                    pid: process.pid(),
                    state: InstanceState::Unresponsive,
                    instance_id: Some(instance_id),
                    started_at: Some(started_at),
                    last_health_check_at: None,
                };
                process.terminate().await;
                self.ports.release(port);
                Err((err, Some(tombstone)))
            }
        }
    }

    /// Poll the worker's health route until it answers for `service_name` or
    /// the provisioning budget runs out.
    async fn await_healthy(
        &self,
        service_name: &str,
        port: u16,
        process: &mut dyn WorkerProcess,
    ) -> Result<(), FleetError> {
        let timeout = self.config.provision_timeout;
        let deadline = Instant::now() + timeout;
        loop {
            if process.has_exited() {
                return Err(FleetError::WorkerExited {
                    service: service_name.to_string(),
                });
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(FleetError::ProvisioningTimeout {
                    service: service_name.to_string(),
                    timeout,
                });
            }
            match self.client.health(port, remaining.min(PROBE_TIMEOUT)).await {
                Ok(health) if health.service_name == service_name => return Ok(()),
                Ok(health) => debug!(
                    service = service_name,
                    port,
                    answered = %health.service_name,
                    "port answered for another service"
                ),
                Err(err) => debug!(service = service_name, port, %err, "health probe pending"),
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            tokio::time::sleep(self.config.health_poll.min(remaining)).await;
        }
    }

    async fn retire(&self, service_name: &str, mut instance: Instance) -> ServiceInstanceInfo {
        instance.process.terminate().await;
        self.ports.release(instance.port);
        instance.state = InstanceState::Terminated;
        info!(service = service_name, port = instance.port, "worker terminated");
        let mut info = instance.info(service_name);
        info.port = None;
        info
    }

    /// Stop the worker for `service_name` and release its port.
    pub async fn terminate(&self, service_name: &str) -> Result<ServiceInstanceInfo, FleetError> {
        let not_found = || FleetError::NotFound(format!("no live worker for {service_name}"));
        let slot = self.existing_slot(service_name).ok_or_else(not_found)?;
        let mut slot = slot.lock().await;
        let instance = slot.live.take().ok_or_else(not_found)?;
        let info = self.retire(service_name, instance).await;
        slot.set_retired(Some(info.clone()));
        Ok(info)
    }

    /// Every known service, sorted by name. Slots busy provisioning report Starting.
    pub fn list(&self) -> Vec<ServiceInstanceInfo> {
        let mut out: Vec<_> = self
            .all_slots()
            .into_iter()
            .filter_map(|(name, slot)| match slot.try_lock() {
                Ok(slot) => slot
                    .live
                    .as_ref()
                    .map(|i| i.info(&name))
                    .or_else(|| slot.retired.clone()),
                Err(_) => Some(ServiceInstanceInfo {
                    service_name: name,
                    port: None,
                    pid: None,
                    state: InstanceState::Starting,
                    instance_id: None,
                    started_at: None,
                    last_health_check_at: None,
                }),
            })
            .collect();
        out.sort_by(|a, b| a.service_name.cmp(&b.service_name));
        out
    }

    /// Service names currently holding a slot, live or retired.
    pub fn tracked_len(&self) -> usize {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Names of services with a live worker.
    pub fn live_services(&self) -> Vec<String> {
        self.list()
            .into_iter()
            .filter(|i| i.state.is_live())
            .map(|i| i.service_name)
            .collect()
    }

    /// Terminate workers idle past the TTL or whose process has exited, then
    /// forget services retired for longer than the TTL. Slots busy with
    /// another call are skipped until the next pass.
    pub async fn reap_idle(&self) -> Vec<String> {
        let reaped = self.reap_live().await;
        let forgotten = self.forget_retired();
        if forgotten > 0 {
            debug!(forgotten, "dropped retired service slots");
        }
        reaped
    }

    async fn reap_live(&self) -> Vec<String> {
        let mut reaped = Vec::new();
        for (name, slot) in self.all_slots() {
            let Ok(mut slot) = slot.try_lock() else {
                continue;
            };
            let Some(instance) = slot.live.as_mut() else {
                continue;
            };
            let idle = instance.last_used.elapsed() >= self.config.idle_ttl;
            if !idle && !instance.process.has_exited() {
                continue;
            }
            if let Some(instance) = slot.live.take() {
                debug!(service = %name, idle, "reaping worker");
                slot.set_retired(Some(self.retire(&name, instance).await));
                reaped.push(name);
            }
        }
        reaped
    }

    /// Remove expired slots nobody else holds. A slot handle only leaves the
    /// map under the map lock, so a caller can never lock a slot after it has
    /// been removed.
    fn forget_retired(&self) -> usize {
        let ttl = self.config.idle_ttl;
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let before = slots.len();
        slots.retain(|_, slot| {
            let unshared = Arc::strong_count(slot) == 1;
            let expired = slot.try_lock().is_ok_and(|s| s.expired(ttl));
            !(unshared && expired)
        });
        before - slots.len()
    }

    pub fn spawn_reaper(
        self: &Arc<Self>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        let supervisor = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(supervisor.config.reap_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.recv() => break,
                    _ = ticker.tick() => {
                        let reaped = supervisor.reap_idle().await;
                        if !reaped.is_empty() {
                            info!(?reaped, "reaped idle workers");
                        }
                    }
                }
            }
        })
    }

    /// Terminate every worker, waiting for in-flight provisioning to finish.
    pub async fn shutdown_all(&self) {
        for (name, slot) in self.all_slots() {
            let mut slot = slot.lock().await;
            if let Some(instance) = slot.live.take() {
                slot.set_retired(Some(self.retire(&name, instance).await));
            }
        }
    }
}
