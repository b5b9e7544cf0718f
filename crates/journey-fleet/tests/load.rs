#[path = "helpers.rs"]
mod helpers;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use helpers::{RecordingSink, journey};
use journey_client::OutboundEvent;
use journey_fleet::{FleetError, FlagRegistry, JourneyRunner, LoadConfig, LoadGenerator};
use journey_protocol::{
    FeatureFlagSet, JourneyRun, LoadStartRequest, LoadTestState, RunStatus, SimulateRequest,
};

/// Completes every journey instantly, failing those whose id is listed.
#[derive(Default)]
struct ScriptedRunner {
    seen: Mutex<Vec<SimulateRequest>>,
    fail_every: Option<u64>,
}

impl ScriptedRunner {
    fn seen(&self) -> Vec<SimulateRequest> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl JourneyRunner for ScriptedRunner {
    async fn run(&self, request: SimulateRequest) -> Result<JourneyRun, FleetError> {
        let n = {
            let mut seen = self.seen.lock().unwrap();
            seen.push(request.clone());
            seen.len() as u64
        };
        let failed = self.fail_every.is_some_and(|every| n % every == 0);
        Ok(JourneyRun {
            journey_id: request.journey_id.unwrap_or_default(),
            correlation_id: request.correlation_id.unwrap_or_default(),
            company_name: request.journey.company_name,
            chained: request.chained,
            started_at: 0,
            finished_at: Some(0),
            status: if failed {
                RunStatus::Failed
            } else {
                RunStatus::Completed
            },
            steps: Vec::new(),
            failure: None,
        })
    }
}

struct Harness {
    runner: Arc<ScriptedRunner>,
    flags: Arc<FlagRegistry>,
    sink: Arc<RecordingSink>,
    load: LoadGenerator,
}

fn harness(runner: ScriptedRunner, flags: FeatureFlagSet) -> Harness {
    let runner = Arc::new(runner);
    let flags = Arc::new(FlagRegistry::new(flags).unwrap());
    let sink = Arc::new(RecordingSink::default());
    let load = LoadGenerator::new(
        runner.clone(),
        flags.clone(),
        sink.clone(),
        LoadConfig::default(),
    );
    Harness {
        runner,
        flags,
        sink,
        load,
    }
}

fn start_request(rate_per_minute: u32, duration_secs: Option<u64>) -> LoadStartRequest {
    LoadStartRequest {
        journey: journey(&["Discovery", "Checkout"]),
        rate_per_minute,
        duration_secs,
        chained: false,
    }
}

#[tokio::test(start_paused = true)]
async fn ticks_at_the_requested_rate() {
    let h = harness(ScriptedRunner::default(), FeatureFlagSet::default());
    let id = h.load.start(start_request(60, None)).unwrap();
    assert!(id.starts_with("load_"));

    tokio::time::sleep(Duration::from_millis(4_500)).await;
    let status = h.load.status();
    assert_eq!(status.len(), 1);
    assert_eq!(status[0].state, LoadTestState::Running);
    let iterations = status[0].stats.iterations;
    assert!((4..=6).contains(&iterations), "iterations = {iterations}");

    let stopped = h.load.stop(&id).await.unwrap();
    assert_eq!(stopped.state, LoadTestState::Stopped);
    assert_eq!(stopped.stats.successes, stopped.stats.iterations);
    assert_eq!(stopped.stats.errors, 0);
}

#[tokio::test(start_paused = true)]
async fn stop_halts_further_ticks() {
    let h = harness(ScriptedRunner::default(), FeatureFlagSet::default());
    let id = h.load.start(start_request(120, None)).unwrap();

    tokio::time::sleep(Duration::from_millis(1_200)).await;
    let stopped = h.load.stop(&id).await.unwrap();
    let issued = h.runner.seen().len();

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(h.runner.seen().len(), issued);
    assert!(h.load.status().is_empty());
    assert_eq!(stopped.stats.iterations as usize, issued);

    let err = h.load.stop(&id).await.unwrap_err();
    assert_eq!(err.code(), "not_found");
}

#[tokio::test(start_paused = true)]
async fn visits_carry_load_test_tagging() {
    let h = harness(ScriptedRunner::default(), FeatureFlagSet::default());
    let id = h.load.start(start_request(60, None)).unwrap();

    tokio::time::sleep(Duration::from_millis(2_500)).await;
    h.load.stop(&id).await.unwrap();

    let seen = h.runner.seen();
    assert!(seen.len() >= 2);
    for (i, visit) in seen.iter().enumerate() {
        let iteration = i as u64 + 1;
        assert_eq!(visit.journey_id.as_deref(), Some(format!("{id}_{iteration}").as_str()));
        assert_eq!(visit.context.load_test_id.as_deref(), Some(id.as_str()));
        assert_eq!(visit.context.test_iteration, Some(iteration));
        assert!(visit.context.customer_id.is_some());
        assert!(visit.correlation_id.is_some());
    }
    // Two visits never share a correlation id.
    assert_ne!(seen[0].correlation_id, seen[1].correlation_id);
}

#[tokio::test(start_paused = true)]
async fn error_injection_toggles_every_n_iterations() {
    let flags = FeatureFlagSet {
        regenerate_every_n_transactions: 2,
        ..FeatureFlagSet::default()
    };
    let h = harness(ScriptedRunner::default(), flags);
    let id = h.load.start(start_request(60, None)).unwrap();

    // Iterations at t=0s, 1s, 2s: one toggle after the second.
    tokio::time::sleep(Duration::from_millis(2_500)).await;
    assert_eq!(h.load.status()[0].stats.flag_toggles, 1);
    assert!(h.flags.snapshot().error_injection_enabled());

    // Fourth iteration at t=3s toggles injection back off.
    tokio::time::sleep(Duration::from_secs(1)).await;
    let stopped = h.load.stop(&id).await.unwrap();
    assert_eq!(stopped.stats.flag_toggles, 2);
    assert!(!h.flags.snapshot().error_injection_enabled());

    let notices: Vec<_> = h
        .sink
        .events()
        .into_iter()
        .filter_map(|e| match e {
            OutboundEvent::FlagChange(notice) => Some(notice),
            _ => None,
        })
        .collect();
    assert_eq!(notices.len(), 2);
    assert_eq!(notices[0].iteration, 2);
    assert_eq!(notices[0].load_test_id.as_deref(), Some(id.as_str()));
    assert_eq!(notices[0].new.errors_per_transaction, 0.1);
    assert_eq!(notices[1].new.errors_per_transaction, 0.0);
}

#[tokio::test(start_paused = true)]
async fn concurrent_load_tests_agree_on_injection_state() {
    let flags = FeatureFlagSet {
        regenerate_every_n_transactions: 2,
        ..FeatureFlagSet::default()
    };
    let h = harness(ScriptedRunner::default(), flags);
    let first = h.load.start(start_request(60, None)).unwrap();
    let second = h.load.start(start_request(60, None)).unwrap();

    // Both tests reach their second iteration together and both ask for "on".
    tokio::time::sleep(Duration::from_millis(1_500)).await;
    let status = h.load.status();
    assert!(status.iter().all(|t| t.stats.iterations == 2), "{status:?}");
    assert!(status.iter().all(|t| t.stats.flag_toggles == 1), "{status:?}");
    assert!(h.flags.snapshot().error_injection_enabled());

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(!h.flags.snapshot().error_injection_enabled());
    h.load.stop(&first).await.unwrap();
    h.load.stop(&second).await.unwrap();

    // Only actual changes are announced.
    let notices: Vec<_> = h
        .sink
        .events()
        .into_iter()
        .filter_map(|e| match e {
            OutboundEvent::FlagChange(notice) => Some(notice),
            _ => None,
        })
        .collect();
    assert_eq!(notices.len(), 2);
    assert_eq!(notices[0].new.errors_per_transaction, 0.1);
    assert_eq!(notices[1].new.errors_per_transaction, 0.0);
}

#[tokio::test(start_paused = true)]
async fn duration_elapses_into_finished() {
    let h = harness(ScriptedRunner::default(), FeatureFlagSet::default());
    let id = h.load.start(start_request(60, Some(3))).unwrap();

    tokio::time::sleep(Duration::from_secs(5)).await;
    let status = h.load.status();
    assert_eq!(status[0].state, LoadTestState::Finished);
    assert_eq!(status[0].stats.iterations, 3);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(h.runner.seen().len(), 3);

    let stopped = h.load.stop(&id).await.unwrap();
    assert_eq!(stopped.state, LoadTestState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn failed_runs_count_as_errors() {
    let runner = ScriptedRunner {
        fail_every: Some(2),
        ..ScriptedRunner::default()
    };
    let h = harness(runner, FeatureFlagSet::default());
    let id = h.load.start(start_request(60, None)).unwrap();

    tokio::time::sleep(Duration::from_millis(3_500)).await;
    let stopped = h.load.stop(&id).await.unwrap();
    assert_eq!(stopped.stats.iterations, 4);
    assert_eq!(stopped.stats.successes, 2);
    assert_eq!(stopped.stats.errors, 2);
}

#[tokio::test(start_paused = true)]
async fn stop_all_returns_every_test() {
    let h = harness(ScriptedRunner::default(), FeatureFlagSet::default());
    h.load.start(start_request(60, None)).unwrap();
    h.load.start(start_request(30, Some(60))).unwrap();

    tokio::time::sleep(Duration::from_millis(500)).await;
    let stopped = h.load.stop_all().await;
    assert_eq!(stopped.len(), 2);
    assert!(stopped.iter().all(|t| t.state == LoadTestState::Stopped));
    assert!(h.load.status().is_empty());
}

#[tokio::test]
async fn invalid_start_requests_are_rejected() {
    let h = harness(ScriptedRunner::default(), FeatureFlagSet::default());

    let err = h.load.start(start_request(0, None)).unwrap_err();
    assert_eq!(err.code(), "invalid_request");
    let err = h.load.start(start_request(60, Some(0))).unwrap_err();
    assert_eq!(err.code(), "invalid_request");

    let mut bad = start_request(60, None);
    bad.journey.steps.clear();
    assert!(h.load.start(bad).is_err());
    assert!(h.load.status().is_empty());
}
