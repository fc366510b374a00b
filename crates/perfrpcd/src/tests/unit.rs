//! Unit tests for the daemon lifecycle.

use std::sync::Arc;
use std::time::Duration;

use rstest::rstest;
use serde_json::json;

use perfrpc_config::Config;

use crate::broker::{BrokerState, InterfaceId, SUPPORTED_VERSION};
use crate::dispatch::{DispatchError, StatusCode, TIME_EVENT};
use crate::process::LaunchError;
use crate::process::launch::{LaunchPlan, run_daemon_with};
use crate::scheduler::ManualClock;
use crate::{BootstrapError, bootstrap_with};

use super::support::{
    FailingConfigLoader, HealthEvent, ImmediateShutdown, JsonlClient, RecordingHealthReporter,
    TestConfigLoader, loopback_config,
};

fn bootstrap(config: Config) -> (crate::Daemon, Arc<RecordingHealthReporter>, Arc<ManualClock>) {
    let reporter = Arc::new(RecordingHealthReporter::default());
    let clock = Arc::new(ManualClock::default());
    let daemon = bootstrap_with(
        &TestConfigLoader::new(config),
        reporter.clone(),
        clock.clone(),
    )
    .expect("bootstrap should succeed");
    (daemon, reporter, clock)
}

#[rstest]
fn bootstrap_does_not_bind_the_listener() {
    let (daemon, reporter, _) = bootstrap(loopback_config());

    assert!(daemon.local_addr().is_none());
    assert_eq!(
        reporter.events(),
        vec![HealthEvent::BootstrapStarting, HealthEvent::BootstrapSucceeded]
    );
    daemon.shutdown().expect("shutdown");
}

#[rstest]
fn configuration_failure_is_reported() {
    let reporter = Arc::new(RecordingHealthReporter::default());
    let error = bootstrap_with(
        &FailingConfigLoader,
        reporter.clone(),
        Arc::new(ManualClock::default()),
    )
    .expect_err("bootstrap should fail");

    assert!(matches!(error, BootstrapError::Configuration { .. }));
    assert!(matches!(
        reporter.events().last(),
        Some(HealthEvent::BootstrapFailed(_))
    ));
}

#[rstest]
fn configured_interval_arms_the_time_notification() {
    let config = Config {
        notification_interval_secs: 5,
        ..loopback_config()
    };
    let (daemon, _, _) = bootstrap(config);

    assert!(daemon.service().timer().active().is_some());
    assert_eq!(daemon.scheduler().pending(), 1);
    daemon.shutdown().expect("shutdown");
}

#[rstest]
fn serve_answers_requests_and_reports_readiness() {
    let (mut daemon, reporter, _) = bootstrap(loopback_config());
    let addr = daemon
        .serve()
        .expect("serve")
        .expect("tcp listener has an address");

    let mut client = JsonlClient::connect(addr);
    let reply = client.call(r#"{"id":4,"method":"exists","params":"get_geometry"}"#);

    assert_eq!(reply, json!({"kind": "result", "id": 4, "result": true}));
    assert!(reporter.events().contains(&HealthEvent::ListenerReady(addr)));
    drop(client);
    daemon.shutdown().expect("shutdown");
}

#[rstest]
fn interface_refusals_surface_in_process_only() {
    let (mut daemon, _, _) = bootstrap(loopback_config());
    let refused = daemon
        .acquire_interface(InterfaceId(9), SUPPORTED_VERSION)
        .expect_err("unknown interface");
    assert_eq!(
        DispatchError::from(refused).status(),
        StatusCode::RefusedCapability
    );

    let addr = daemon
        .serve()
        .expect("serve")
        .expect("tcp listener has an address");
    let mut client = JsonlClient::connect(addr);
    let reply = client.call(r#"{"id":5,"method":"exists","params":"acquire_interface"}"#);
    assert_eq!(reply, json!({"kind": "result", "id": 5, "result": false}));
    drop(client);
    daemon.shutdown().expect("shutdown");
}

#[rstest]
fn serving_twice_keeps_the_first_listener() {
    let (mut daemon, _, _) = bootstrap(loopback_config());
    let first = daemon.serve().expect("serve");
    let second = daemon.serve().expect("serve again");

    assert_eq!(first, second);
    daemon.shutdown().expect("shutdown");
}

#[rstest]
fn time_notifications_reach_subscribed_connections() {
    let (mut daemon, _, clock) = bootstrap(loopback_config());
    let addr = daemon.serve().expect("serve").expect("address");
    let mut client = JsonlClient::connect(addr);

    let subscribed = client.call(r#"{"id":1,"method":"register","params":{"event":"time","id":"watcher"}}"#);
    assert_eq!(subscribed["kind"], json!("result"));
    let started = client.call(r#"{"id":2,"method":"start_notifications","params":{"interval":30}}"#);
    assert_eq!(started["kind"], json!("result"));

    clock.advance(Duration::from_secs(30));
    daemon.scheduler().run_pending();

    let notification = client.next_message();
    assert_eq!(notification["kind"], json!("notification"));
    assert_eq!(notification["event"], json!(TIME_EVENT));
    drop(client);
    daemon.shutdown().expect("shutdown");
}

#[rstest]
fn shutdown_drops_jobs_and_refuses_new_handles() {
    let config = Config {
        notification_interval_secs: 10,
        ..loopback_config()
    };
    let (daemon, reporter, _) = bootstrap(config);
    let broker = Arc::clone(daemon.broker());
    let scheduler = daemon.scheduler().clone();
    let handle = daemon
        .acquire_interface(InterfaceId::PERFORMANCE, SUPPORTED_VERSION)
        .expect("interface granted");

    daemon.shutdown().expect("shutdown");

    assert_eq!(scheduler.pending(), 0);
    assert!(
        broker
            .try_acquire(InterfaceId::PERFORMANCE, SUPPORTED_VERSION)
            .is_err()
    );
    assert_eq!(broker.state(), BrokerState::Granted);
    drop(handle);
    assert_eq!(broker.state(), BrokerState::Idle);

    let events = reporter.events();
    assert!(events.contains(&HealthEvent::ShutdownStarting));
    assert_eq!(events.last(), Some(&HealthEvent::ShutdownCompleted));
}

#[rstest]
fn run_daemon_with_serves_until_the_signal() {
    let reporter = Arc::new(RecordingHealthReporter::default());
    run_daemon_with(LaunchPlan {
        loader: TestConfigLoader::new(loopback_config()),
        reporter: reporter.clone(),
        clock: Arc::new(ManualClock::default()),
        shutdown: ImmediateShutdown,
    })
    .expect("launch should succeed");

    let events = reporter.events();
    assert!(
        events
            .iter()
            .any(|event| matches!(event, HealthEvent::ListenerReady(_)))
    );
    assert_eq!(events.last(), Some(&HealthEvent::ShutdownCompleted));
}

#[rstest]
fn run_daemon_with_propagates_bootstrap_failure() {
    let error = run_daemon_with(LaunchPlan {
        loader: FailingConfigLoader,
        reporter: Arc::new(RecordingHealthReporter::default()),
        clock: Arc::new(ManualClock::default()),
        shutdown: ImmediateShutdown,
    })
    .expect_err("launch should fail");

    assert!(matches!(error, LaunchError::Bootstrap { .. }));
}
