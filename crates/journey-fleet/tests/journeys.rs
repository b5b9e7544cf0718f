#[path = "helpers.rs"]
mod helpers;

use std::sync::Arc;
use std::time::Duration;

use helpers::{InProcessLauncher, RecordingSink, journey, test_config};
use journey_client::{FleetClient, OutboundEvent};
use journey_fleet::RunningFleet;
use journey_protocol::{
    BreakerState, CustomerProfile, FailurePolicy, RunStatus, SimulateRequest, StepErrorKind,
    StepStatus,
};

async fn start_fleet(launcher: Arc<InProcessLauncher>) -> (RunningFleet, FleetClient) {
    let running = journey_fleet::start(
        test_config(8),
        launcher,
        Arc::new(RecordingSink::default()),
    )
    .await
    .expect("start fleet");
    let client = FleetClient::new(running.base_url(), Duration::from_secs(30)).unwrap();
    (running, client)
}

fn step_names(run: &journey_protocol::JourneyRun) -> Vec<&str> {
    run.steps.iter().map(|s| s.step_name.as_str()).collect()
}

#[tokio::test]
async fn direct_journey_runs_steps_in_order() {
    let launcher = Arc::new(InProcessLauncher::new());
    let (running, client) = start_fleet(launcher.clone()).await;

    let run = client
        .simulate(&SimulateRequest::new(journey(&["Discovery", "Basket", "Checkout"])))
        .await
        .unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert!(!run.chained);
    assert_eq!(step_names(&run), ["DiscoveryStep", "BasketStep", "CheckoutStep"]);
    assert!(run.steps.iter().all(|s| s.http_status == Some(200)));
    assert!(run.failure.is_none());
    assert!(run.journey_id.starts_with("journey_"));
    assert_eq!(launcher.launches(), 3);

    let services = client.list_services().await.unwrap();
    assert_eq!(services.len(), 3);

    // Workers emitted one business event per completed step.
    let events = launcher.sink.events();
    assert_eq!(events.len(), 3);
    assert!(events.iter().all(|e| matches!(e, OutboundEvent::Business(_))));

    running.shutdown().await;
}

#[tokio::test]
async fn journey_level_profile_reaches_business_events() {
    let launcher = Arc::new(InProcessLauncher::new());
    let (running, client) = start_fleet(launcher.clone()).await;

    let mut definition = journey(&["Discovery"]);
    definition.customer_profile = Some(CustomerProfile {
        name: "Ada Lovelace".into(),
        segment: "Premium".into(),
        device_type: "desktop".into(),
        ..CustomerProfile::default()
    });
    let run = client
        .simulate(&SimulateRequest::new(definition))
        .await
        .unwrap();
    assert_eq!(run.status, RunStatus::Completed);

    let events = launcher.sink.events();
    let Some(OutboundEvent::Business(event)) = events.first() else {
        panic!("expected a business event, got {events:?}");
    };
    let profile = event.context.customer_profile.as_ref().unwrap();
    assert_eq!(profile.name, "Ada Lovelace");
    assert_eq!(profile.segment, "Premium");

    running.shutdown().await;
}

#[tokio::test]
async fn direct_journey_stops_at_first_failure() {
    let launcher = Arc::new(InProcessLauncher::new());
    launcher.always_fail("Basket");
    let (running, client) = start_fleet(launcher.clone()).await;

    let run = client
        .simulate(&SimulateRequest::new(journey(&["Discovery", "Basket", "Checkout"])))
        .await
        .unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(step_names(&run), ["DiscoveryStep", "BasketStep"]);
    let failed = &run.steps[1];
    assert_eq!(failed.status, StepStatus::Failed);
    assert_eq!(failed.http_status, Some(500));
    assert_eq!(failed.error_kind(), Some(StepErrorKind::StepFailed));
    let failure = run.failure.as_ref().unwrap();
    assert_eq!(failure.service_name, "Basket");
    // Checkout never ran, so no worker was provisioned for it.
    assert_eq!(launcher.launches(), 2);

    running.shutdown().await;
}

#[tokio::test]
async fn continue_on_failure_runs_every_step() {
    let launcher = Arc::new(InProcessLauncher::new());
    launcher.always_fail("Basket");
    let (running, client) = start_fleet(launcher.clone()).await;

    let mut request = SimulateRequest::new(journey(&["Discovery", "Basket", "Checkout"]));
    request.failure_policy = Some(FailurePolicy::ContinueOnFailure);
    let run = client.simulate(&request).await.unwrap();
    assert_eq!(run.status, RunStatus::PartiallyFailed);
    assert_eq!(step_names(&run), ["DiscoveryStep", "BasketStep", "CheckoutStep"]);
    assert!(run.steps[2].is_completed());

    running.shutdown().await;
}

#[tokio::test]
async fn disabled_error_simulation_skips_injection() {
    let launcher = Arc::new(InProcessLauncher::new());
    launcher.always_fail("Basket");
    let (running, client) = start_fleet(launcher.clone()).await;

    let mut request = SimulateRequest::new(journey(&["Basket"]));
    request.error_simulation_enabled = false;
    let run = client.simulate(&request).await.unwrap();
    assert_eq!(run.status, RunStatus::Completed);

    running.shutdown().await;
}

#[tokio::test]
async fn chained_journey_is_forwarded_worker_to_worker() {
    let launcher = Arc::new(InProcessLauncher::new());
    let (running, client) = start_fleet(launcher.clone()).await;

    let request = SimulateRequest::new(journey(&["Discovery", "Basket", "Checkout"])).chained(true);
    let run = client.simulate(&request).await.unwrap();
    assert_eq!(run.status, RunStatus::Completed, "{run:?}");
    assert!(run.chained);
    assert_eq!(step_names(&run), ["DiscoveryStep", "BasketStep", "CheckoutStep"]);
    assert_eq!(launcher.launches(), 3);

    running.shutdown().await;
}

#[tokio::test]
async fn chained_journey_stops_where_a_hop_fails() {
    let launcher = Arc::new(InProcessLauncher::new());
    launcher.always_fail("Basket");
    let (running, client) = start_fleet(launcher.clone()).await;

    let request = SimulateRequest::new(journey(&["Discovery", "Basket", "Checkout"])).chained(true);
    let run = client.simulate(&request).await.unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(step_names(&run), ["DiscoveryStep", "BasketStep"]);
    assert_eq!(run.failure.unwrap().service_name, "Basket");
    assert_eq!(launcher.launches(), 2);

    running.shutdown().await;
}

#[tokio::test]
async fn chained_budget_covers_slow_downstream_provisioning() {
    // Each hop spends longer provisioning its successor than the per-step
    // timeout, but stays within the provisioning timeout.
    let launcher = Arc::new(InProcessLauncher::with_startup_delay(Duration::from_secs(2)));
    let mut config = test_config(8);
    config.orchestrator.step_timeout = Duration::from_secs(1);
    let running = journey_fleet::start(
        config,
        launcher.clone(),
        Arc::new(RecordingSink::default()),
    )
    .await
    .expect("start fleet");
    let client = FleetClient::new(running.base_url(), Duration::from_secs(60)).unwrap();

    let request = SimulateRequest::new(journey(&["Discovery", "Basket", "Checkout"])).chained(true);
    let run = client.simulate(&request).await.unwrap();
    assert_eq!(run.status, RunStatus::Completed, "{run:?}");
    assert_eq!(step_names(&run), ["DiscoveryStep", "BasketStep", "CheckoutStep"]);
    assert_eq!(launcher.launches(), 3);

    let breakers = running.fleet.breaker.snapshots();
    assert!(breakers.iter().all(|b| b.failure_count == 0), "{breakers:?}");

    running.shutdown().await;
}

#[tokio::test]
async fn repeated_failures_open_the_breaker() {
    let launcher = Arc::new(InProcessLauncher::new());
    launcher.always_fail("Flaky");
    let (running, client) = start_fleet(launcher.clone()).await;

    for _ in 0..5 {
        let run = client
            .simulate(&SimulateRequest::new(journey(&["Flaky"])))
            .await
            .unwrap();
        assert_eq!(run.steps[0].error_kind(), Some(StepErrorKind::StepFailed));
    }
    let run = client
        .simulate(&SimulateRequest::new(journey(&["Flaky"])))
        .await
        .unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.steps[0].error_kind(), Some(StepErrorKind::CircuitOpen));
    assert_eq!(run.steps[0].http_status, None);

    let breakers = running.fleet.breaker.snapshots();
    assert_eq!(breakers.len(), 1);
    assert_eq!(breakers[0].service_name, "Flaky");
    assert_eq!(breakers[0].state, BreakerState::Open);

    running.shutdown().await;
}

#[tokio::test]
async fn invalid_journeys_are_rejected() {
    let launcher = Arc::new(InProcessLauncher::new());
    let (running, client) = start_fleet(launcher.clone()).await;

    let err = client
        .simulate(&SimulateRequest::new(journey(&[])))
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(400));
    assert_eq!(err.code(), Some("invalid_request"));

    let err = client
        .simulate(&SimulateRequest::new(journey(&["bad name"])))
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(400));
    assert_eq!(launcher.launches(), 0);

    running.shutdown().await;
}
