//! Integration tests for deployment lifecycle flows against the mock engine.

mod common;

use common::{control, gated_control, TestControl};
use productionapp_control::{BufferSink, InstanceState, LifecycleOutcome, NullSink};
use rstest::rstest;

const DEMO_IMAGE: &str = "gcr.io/kuar-demo/kuard-amd64:blue";

#[rstest]
#[tokio::test]
async fn demo_end_to_end(control: TestControl) {
    let manager = &control.manager;

    let created = manager.create("demo", DEMO_IMAGE, 80, &NullSink).await;
    assert!(created.is_success(), "{:?}", created.message());

    let listing = manager.list().await;
    assert!(listing.outcome.is_success());
    assert_eq!(listing.names(), vec!["demo"]);

    let deleted = manager.delete("demo", &NullSink).await;
    assert!(deleted.is_success(), "{:?}", deleted.message());

    let listing = manager.list().await;
    assert!(listing.outcome.is_success());
    assert!(listing.deployments.is_empty());
}

#[rstest]
#[tokio::test]
async fn created_deployment_listed_exactly_once(control: TestControl) {
    let manager = &control.manager;

    manager.create("alpha", DEMO_IMAGE, 8080, &NullSink).await;
    manager.create("beta", DEMO_IMAGE, 8080, &NullSink).await;
    manager.create("alpha", DEMO_IMAGE, 9090, &NullSink).await;

    let listing = manager.list().await;
    let alphas = listing.names().iter().filter(|n| **n == "alpha").count();
    assert_eq!(alphas, 1);
    assert_eq!(listing.names(), vec!["alpha", "beta"]);
}

#[rstest]
#[tokio::test]
async fn second_create_reports_already_exists(control: TestControl) {
    let manager = &control.manager;

    let first = manager.create("demo", DEMO_IMAGE, 80, &NullSink).await;
    assert!(first.is_success());

    let sink = BufferSink::new();
    let second = manager.create("demo", DEMO_IMAGE, 8080, &sink).await;
    assert_eq!(
        second,
        LifecycleOutcome::AlreadyExists {
            name: "demo".to_owned()
        }
    );

    // The live deployment was not touched.
    assert!(sink.lines().is_empty());
    let listing = manager.list().await;
    assert_eq!(listing.deployments[0].resource_count, Some(4));
    assert_eq!(
        control.engine.stack_state(&control.stack("demo")),
        Some(InstanceState::Active)
    );
}

#[rstest]
#[tokio::test]
async fn delete_unknown_is_failure(control: TestControl) {
    let outcome = control.manager.delete("never-created", &NullSink).await;
    assert_eq!(outcome.kind(), "failure");
    assert!(outcome.message().unwrap().contains("never-created"));
}

#[rstest]
#[tokio::test]
async fn deleted_deployment_not_listed(control: TestControl) {
    let manager = &control.manager;

    manager.create("keep", DEMO_IMAGE, 80, &NullSink).await;
    manager.create("drop", DEMO_IMAGE, 80, &NullSink).await;

    let outcome = manager.delete("drop", &NullSink).await;
    assert_eq!(outcome.success().unwrap().name, "drop");

    assert_eq!(manager.list().await.names(), vec!["keep"]);
}

#[rstest]
#[tokio::test]
async fn concurrent_creates_single_winner(control: TestControl) {
    let a = {
        let manager = control.manager.clone();
        tokio::spawn(async move { manager.create("race", DEMO_IMAGE, 80, &NullSink).await })
    };
    let b = {
        let manager = control.manager.clone();
        tokio::spawn(async move { manager.create("race", DEMO_IMAGE, 81, &NullSink).await })
    };

    let outcomes = [a.await.unwrap(), b.await.unwrap()];
    let successes = outcomes.iter().filter(|o| o.is_success()).count();
    assert_eq!(successes, 1);
    assert!(outcomes
        .iter()
        .any(|o| matches!(o, LifecycleOutcome::AlreadyExists { .. })));
    assert_eq!(control.manager.list().await.names(), vec!["race"]);
}

#[rstest]
#[tokio::test]
async fn delete_during_create_is_concurrent_conflict(gated_control: TestControl) {
    let control = gated_control;

    let create = {
        let manager = control.manager.clone();
        tokio::spawn(async move { manager.create("demo", DEMO_IMAGE, 80, &NullSink).await })
    };
    control.wait_for_update("demo").await;

    let outcome = control.manager.delete("demo", &NullSink).await;
    assert_eq!(
        outcome,
        LifecycleOutcome::ConcurrentConflict {
            name: "demo".to_owned()
        }
    );

    // Listing sees the in-flight update.
    let listing = control.manager.list().await;
    assert!(listing.deployments[0].update_in_progress);

    control.gate.as_ref().unwrap().release();
    assert!(create.await.unwrap().is_success());

    control.gate.as_ref().unwrap().release();
    assert!(control.manager.delete("demo", &NullSink).await.is_success());
}

#[rstest]
#[tokio::test]
async fn stuck_record_reports_partial_teardown(control: TestControl) {
    let manager = &control.manager;
    manager.create("demo", DEMO_IMAGE, 80, &NullSink).await;

    control.engine.fail_next_remove(&control.stack("demo"));
    let outcome = manager.delete("demo", &NullSink).await;

    assert_eq!(outcome.kind(), "partial_teardown");
    assert!(matches!(
        &outcome,
        LifecycleOutcome::PartialTeardown { name, .. } if name == "demo"
    ));

    // Resources are gone, the record lingers until someone deletes it again.
    let listing = manager.list().await;
    assert_eq!(listing.names(), vec!["demo"]);
    assert_eq!(listing.deployments[0].resource_count, Some(0));

    assert!(manager.delete("demo", &NullSink).await.is_success());
    assert!(manager.list().await.deployments.is_empty());
}

#[rstest]
#[tokio::test]
async fn unreachable_engine_fails_listing(control: TestControl) {
    control
        .manager
        .create("demo", DEMO_IMAGE, 80, &NullSink)
        .await;
    control.engine.set_unreachable(true);

    let listing = control.manager.list().await;
    assert!(listing.deployments.is_empty());
    assert_eq!(listing.outcome.kind(), "failure");
    assert_eq!(
        listing.outcome.message().as_deref(),
        Some("automation backend unreachable")
    );

    let created = control.manager.create("other", DEMO_IMAGE, 80, &NullSink).await;
    assert_eq!(created.kind(), "failure");
}

#[rstest]
#[tokio::test]
async fn progress_reaches_sink(control: TestControl) {
    let sink = BufferSink::new();
    control
        .manager
        .create("demo", DEMO_IMAGE, 80, &sink)
        .await;

    let lines = sink.lines();
    assert!(lines.iter().any(|l| l.contains(DEMO_IMAGE)));

    let sink = BufferSink::new();
    control.manager.delete("demo", &sink).await;
    assert!(sink.lines().iter().any(|l| l.starts_with("Destroying")));
}

#[rstest]
#[tokio::test]
async fn failed_provision_keeps_name_taken(control: TestControl) {
    control
        .engine
        .fail_next_up(&control.stack("demo"), "image pull back-off");

    let outcome = control.manager.create("demo", DEMO_IMAGE, 80, &NullSink).await;
    assert_eq!(
        outcome,
        LifecycleOutcome::Failure {
            message: "image pull back-off".to_owned()
        }
    );

    let retry = control.manager.create("demo", DEMO_IMAGE, 80, &NullSink).await;
    assert_eq!(retry.kind(), "already_exists");
}

#[rstest]
#[case("", 80)]
#[case("demo", 0)]
#[case("demo", 65536)]
#[case("demo", -1)]
#[case("bad/name", 80)]
#[tokio::test]
async fn invalid_descriptors_rejected(control: TestControl, #[case] name: &str, #[case] port: i64) {
    let outcome = control.manager.create(name, DEMO_IMAGE, port, &NullSink).await;
    assert_eq!(outcome.kind(), "invalid");
    assert_eq!(control.engine.stack_count(), 0);
}
