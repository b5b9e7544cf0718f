//! Rate-controlled journey load.
//!
//! Each load test is one tick task issuing journeys at a fixed interval.
//! Runs are spawned detached, so a slow journey never delays the next tick.
//! Stopping aborts the tick task and waits for it, so no tick fires after
//! `stop` returns.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use journey_client::{EventSink, OutboundEvent, now_wallclock_ms};
use journey_protocol::events::FLAG_CHANGED;
use journey_protocol::{
    FlagChangeNotice, JourneyDefinition, LoadStartRequest, LoadStats, LoadTest, LoadTestState,
    RunStatus, SimulateRequest,
};
use rand::Rng;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::config::LoadConfig;
use crate::error::FleetError;
use crate::flag_registry::FlagRegistry;
use crate::orchestrator::JourneyRunner;
use crate::synthetic::visit_context;

#[derive(Debug, Default)]
struct Counters {
    iterations: AtomicU64,
    successes: AtomicU64,
    errors: AtomicU64,
    flag_toggles: AtomicU64,
    finished: AtomicBool,
}

impl Counters {
    fn stats(&self) -> LoadStats {
        LoadStats {
            iterations: self.iterations.load(Ordering::SeqCst),
            successes: self.successes.load(Ordering::SeqCst),
            errors: self.errors.load(Ordering::SeqCst),
            flag_toggles: self.flag_toggles.load(Ordering::SeqCst),
        }
    }
}

struct LoadEntry {
    test: LoadTest,
    counters: Arc<Counters>,
    task: JoinHandle<()>,
}

impl LoadEntry {
    fn view(&self) -> LoadTest {
        let state = if self.counters.finished.load(Ordering::SeqCst) {
            LoadTestState::Finished
        } else {
            LoadTestState::Running
        };
        LoadTest {
            state,
            stats: self.counters.stats(),
            ..self.test.clone()
        }
    }
}

pub struct LoadGenerator {
    runner: Arc<dyn JourneyRunner>,
    flags: Arc<FlagRegistry>,
    notifier: Arc<dyn EventSink>,
    config: LoadConfig,
    tests: Mutex<HashMap<String, LoadEntry>>,
}

/// Everything a tick task needs; owned so the task is `'static`.
struct TickLoop {
    id: String,
    journey: JourneyDefinition,
    chained: bool,
    period: Duration,
    deadline: Option<Instant>,
    runner: Arc<dyn JourneyRunner>,
    flags: Arc<FlagRegistry>,
    notifier: Arc<dyn EventSink>,
    injection_rate: f64,
    /// Injection state when the test started; odd toggle counts invert it.
    initially_injecting: bool,
    counters: Arc<Counters>,
}

impl LoadGenerator {
    pub fn new(
        runner: Arc<dyn JourneyRunner>,
        flags: Arc<FlagRegistry>,
        notifier: Arc<dyn EventSink>,
        config: LoadConfig,
    ) -> Self {
        Self {
            runner,
            flags,
            notifier,
            config,
            tests: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, LoadEntry>> {
        self.tests.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn start(&self, request: LoadStartRequest) -> Result<String, FleetError> {
        request.journey.validate()?;
        if request.rate_per_minute == 0 {
            return Err(FleetError::Invalid("ratePerMinute must be at least 1".into()));
        }
        if request.duration_secs == Some(0) {
            return Err(FleetError::Invalid("duration must be at least 1 second".into()));
        }

        let id = format!("load_{}", Uuid::new_v4().simple());
        let period = Duration::from_millis((60_000 / u64::from(request.rate_per_minute)).max(1));
        let counters = Arc::new(Counters::default());
        let test = LoadTest {
            id: id.clone(),
            company_name: request.journey.company_name.clone(),
            rate_per_minute: request.rate_per_minute,
            chained: request.chained,
            duration_secs: request.duration_secs,
            started_at: now_wallclock_ms(),
            state: LoadTestState::Running,
            stats: LoadStats::default(),
        };

        let tick = TickLoop {
            id: id.clone(),
            journey: request.journey,
            chained: request.chained,
            period,
            deadline: request
                .duration_secs
                .map(|s| Instant::now() + Duration::from_secs(s)),
            runner: self.runner.clone(),
            flags: self.flags.clone(),
            notifier: self.notifier.clone(),
            injection_rate: self.config.injection_rate,
            initially_injecting: self.flags.snapshot().error_injection_enabled(),
            counters: counters.clone(),
        };
        let span = info_span!("load_test", load_test_id = %id);
        let task = tokio::spawn(tick.run().instrument(span));

        info!(
            load_test_id = %id,
            rate_per_minute = test.rate_per_minute,
            period_ms = period.as_millis() as u64,
            "load test started"
        );
        self.lock().insert(
            id.clone(),
            LoadEntry {
                test,
                counters,
                task,
            },
        );
        Ok(id)
    }

    /// Cancel the tick task and return final statistics.
    pub async fn stop(&self, id: &str) -> Result<LoadTest, FleetError> {
        let entry = self
            .lock()
            .remove(id)
            .ok_or_else(|| FleetError::NotFound(format!("load test {id}")))?;
        Ok(finish(entry).await)
    }

    pub fn status(&self) -> Vec<LoadTest> {
        let mut tests: Vec<_> = self.lock().values().map(LoadEntry::view).collect();
        tests.sort_by(|a, b| a.started_at.cmp(&b.started_at).then(a.id.cmp(&b.id)));
        tests
    }

    pub async fn stop_all(&self) -> Vec<LoadTest> {
        let entries: Vec<_> = self.lock().drain().map(|(_, entry)| entry).collect();
        let mut stopped = Vec::with_capacity(entries.len());
        for entry in entries {
            stopped.push(finish(entry).await);
        }
        stopped.sort_by(|a, b| a.started_at.cmp(&b.started_at).then(a.id.cmp(&b.id)));
        stopped
    }
}

async fn finish(entry: LoadEntry) -> LoadTest {
    entry.task.abort();
    let _ = entry.task.await;
    let stats = entry.counters.stats();
    info!(load_test_id = %entry.test.id, ?stats, "load test stopped");
    LoadTest {
        state: LoadTestState::Stopped,
        stats,
        ..entry.test
    }
}

impl TickLoop {
    async fn run(self) {
        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            match self.deadline {
                Some(deadline) => {
                    tokio::select! {
                        _ = ticker.tick() => {}
                        _ = tokio::time::sleep_until(deadline) => break,
                    }
                    if Instant::now() >= deadline {
                        break;
                    }
                }
                None => {
                    ticker.tick().await;
                }
            }
            self.tick();
        }
        self.counters.finished.store(true, Ordering::SeqCst);
        info!(stats = ?self.counters.stats(), "load test duration elapsed");
    }

    fn tick(&self) {
        let iteration = self.counters.iterations.fetch_add(1, Ordering::SeqCst) + 1;
        let flags = self.flags.snapshot();
        let request = self.visit(iteration, flags.errors_per_visit);

        let runner = self.runner.clone();
        let counters = self.counters.clone();
        tokio::spawn(async move {
            match runner.run(request).await {
                Ok(run) if run.status == RunStatus::Completed => {
                    counters.successes.fetch_add(1, Ordering::SeqCst);
                }
                Ok(run) => {
                    counters.errors.fetch_add(1, Ordering::SeqCst);
                    debug!(journey_id = %run.journey_id, status = ?run.status, "journey did not complete");
                }
                Err(err) => {
                    counters.errors.fetch_add(1, Ordering::SeqCst);
                    warn!(%err, "journey run failed");
                }
            }
        });

        let every = flags.regenerate_every_n_transactions.max(1);
        if iteration % every == 0 {
            self.toggle(iteration);
        }
    }

    fn visit(&self, iteration: u64, errors_per_visit: f64) -> SimulateRequest {
        let mut rng = rand::thread_rng();
        let correlation_id = Uuid::new_v4().to_string();
        let context = visit_context(
            &mut rng,
            &self.journey.company_name,
            iteration,
            &correlation_id,
            &self.id,
        );
        let error_eligible = rng.gen_bool(if errors_per_visit.is_finite() {
            errors_per_visit.clamp(0.0, 1.0)
        } else {
            1.0
        });
        SimulateRequest {
            journey: self.journey.clone(),
            chained: self.chained,
            journey_id: Some(format!("{}_{iteration}", self.id)),
            correlation_id: Some(correlation_id),
            context,
            error_simulation_enabled: error_eligible,
            think_time_ms: 0,
            failure_policy: None,
        }
    }

    /// The target state comes from this test's own toggle count, so tests
    /// sharing the flag on the same schedule converge instead of cancelling.
    fn toggle(&self, iteration: u64) {
        let toggles = self.counters.flag_toggles.fetch_add(1, Ordering::SeqCst) + 1;
        let enable = self.initially_injecting ^ (toggles % 2 == 1);
        let (previous, new) = self.flags.set_error_injection(enable, self.injection_rate);
        if previous == new {
            debug!(iteration, enable, "error injection already in target state");
            return;
        }
        info!(
            iteration,
            errors_per_transaction = new.errors_per_transaction,
            "toggled error injection"
        );
        self.notifier
            .emit(OutboundEvent::FlagChange(FlagChangeNotice {
                event_type: FLAG_CHANGED.to_string(),
                load_test_id: Some(self.id.clone()),
                iteration,
                previous,
                new,
                emitted_at: now_wallclock_ms(),
            }));
    }
}
