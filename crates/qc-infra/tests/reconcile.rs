//! End-to-end reconciliation passes against the in-memory controller.

use std::sync::Arc;
use std::time::Duration;

use qc_infra::testing::{Call, Convergence, FakeController, FakeImages, RecordingSleeper};
use qc_infra::types::{DesiredState, Hardware, InstanceInfo, ObservedState};
use qc_infra::{Controller, Error, Reconciler, VmParams, resolve};
use serde_json::json;

struct Harness {
    controller: Arc<FakeController>,
    images: Arc<FakeImages>,
    sleeper: Arc<RecordingSleeper>,
}

impl Harness {
    fn new(controller: FakeController) -> Self {
        Self::with_images(controller, FakeImages::default())
    }

    fn with_images(controller: FakeController, images: FakeImages) -> Self {
        Self {
            controller: Arc::new(controller),
            images: Arc::new(images),
            sleeper: Arc::new(RecordingSleeper::default()),
        }
    }

    fn reconciler(&self) -> Reconciler {
        Reconciler::new(
            self.controller.clone(),
            self.images.clone(),
            self.sleeper.clone(),
        )
    }
}

fn existing(state: ObservedState) -> InstanceInfo {
    InstanceInfo {
        name: "vm1".into(),
        state,
        ipaddresses: vec![],
        details: Hardware {
            cpus: 2,
            memory: 2048,
            disk: 20,
        },
    }
}

fn params(state: &str) -> VmParams {
    VmParams {
        name: Some("vm1".into()),
        image: Some("ubuntu".into()),
        cpus: Some(2),
        memory: Some(2048),
        disk: Some(20),
        state: Some(state.into()),
        ..Default::default()
    }
}

#[tokio::test]
async fn present_creates_missing_instance() {
    let h = Harness::new(FakeController::empty());
    let req = params("present").validate().unwrap();

    let plan = resolve(req.state, None);
    assert!(plan.create && !plan.start && !plan.stop && !plan.delete);

    let outcome = h.reconciler().reconcile(&req).await.unwrap();

    assert!(outcome.changed);
    assert_eq!(outcome.message, "VM successfully created");
    assert_eq!(
        serde_json::Value::Object(outcome.result),
        json!({
            "name": "vm1",
            "state": "STATE_STOPPED",
            "ipaddresses": [],
            "cpus": 2,
            "memory": 2048,
            "disk": 20,
        })
    );

    let mutations = h.controller.mutations();
    assert_eq!(mutations.len(), 1);
    let Call::Create { image, instance } = &mutations[0] else {
        panic!("expected create, got {mutations:?}");
    };
    assert_eq!(image, "ubuntu");
    assert_eq!(instance.id, "vm1");
    assert_eq!(instance.hardware.memory, 2048);
}

#[tokio::test]
async fn present_is_idempotent() {
    let h = Harness::new(FakeController::empty());
    let req = params("present").validate().unwrap();

    let first = h.reconciler().reconcile(&req).await.unwrap();
    let second = h.reconciler().reconcile(&req).await.unwrap();

    assert!(first.plan.unwrap().create);
    assert!(!second.plan.as_ref().unwrap().create);
    assert!(!second.changed);
    assert_eq!(second.message, "VM successfully created");

    let creates = h
        .controller
        .mutations()
        .into_iter()
        .filter(|c| matches!(c, Call::Create { .. }))
        .count();
    assert_eq!(creates, 1);
}

#[tokio::test]
async fn running_starts_stopped_instance_and_waits_for_ip() {
    let h = Harness::new(
        FakeController::with_instance(existing(ObservedState::Stopped))
            .assign_ip("10.0.0.7", Convergence::AfterLookups(2)),
    );
    let req = params("running").validate().unwrap();

    let outcome = h.reconciler().reconcile(&req).await.unwrap();

    assert_eq!(outcome.plan.as_ref().unwrap().actions(), ["start"]);
    assert_eq!(outcome.message, "VM successfully started");
    assert_eq!(outcome.result["ipaddresses"], json!(["10.0.0.7"]));
    assert_eq!(outcome.result["state"], "STATE_RUNNING");
    assert_eq!(h.controller.mutations(), [Call::Start("vm1".into())]);
    // IP shows up on the third lookup after start.
    assert_eq!(h.sleeper.count(), 2);
}

#[tokio::test]
async fn running_creates_then_starts_when_missing() {
    let h = Harness::new(FakeController::empty());
    let req = params("running").validate().unwrap();

    let outcome = h.reconciler().reconcile(&req).await.unwrap();

    let mutations = h.controller.mutations();
    assert!(matches!(
        mutations.as_slice(),
        [Call::Create { .. }, Call::Start(id)] if id == "vm1"
    ));
    assert_eq!(outcome.result["ipaddresses"], json!(["10.0.0.2"]));
    assert_eq!(h.sleeper.count(), 0);
}

#[tokio::test]
async fn stopped_forwards_force_and_waits_for_stopped() {
    let h = Harness::new(
        FakeController::with_instance(existing(ObservedState::Running))
            .stop_converges(Convergence::AfterLookups(1)),
    );
    let req = VmParams {
        force: Some(true),
        ..params("stopped")
    }
    .validate()
    .unwrap();

    let outcome = h.reconciler().reconcile(&req).await.unwrap();

    assert_eq!(outcome.plan.as_ref().unwrap().actions(), ["stop"]);
    assert_eq!(
        h.controller.mutations(),
        [Call::Stop {
            id: "vm1".into(),
            force: true
        }]
    );
    assert_eq!(outcome.result["state"], "STATE_STOPPED");
    assert_eq!(h.sleeper.sleeps(), [Duration::from_secs(1)]);
}

#[tokio::test]
async fn stopped_on_missing_instance_is_a_noop() {
    let h = Harness::new(FakeController::empty());
    let req = params("stopped").validate().unwrap();

    let outcome = h.reconciler().reconcile(&req).await.unwrap();

    assert!(!outcome.changed);
    assert_eq!(outcome.message, "VM successfully stopped");
    assert!(outcome.result.is_empty());
    assert!(h.controller.mutations().is_empty());
}

#[tokio::test]
async fn absent_stops_running_instance_before_deleting() {
    let h = Harness::new(
        FakeController::with_instance(existing(ObservedState::Running))
            .stop_converges(Convergence::AfterLookups(1)),
    );
    let req = params("absent").validate().unwrap();

    let outcome = h.reconciler().reconcile(&req).await.unwrap();

    assert_eq!(outcome.message, "VM successfully deleted");
    assert!(outcome.result.is_empty());
    assert!(h.controller.instance().is_none());

    // The stop has to be observed as STOPPED before delete is issued.
    let calls = h.controller.calls();
    let stop = calls
        .iter()
        .position(|c| matches!(c, Call::Stop { .. }))
        .unwrap();
    let delete = calls
        .iter()
        .position(|c| matches!(c, Call::Delete(_)))
        .unwrap();
    let polls_between = calls[stop + 1..delete]
        .iter()
        .filter(|c| matches!(c, Call::Get(_)))
        .count();
    assert_eq!(polls_between, 2);
}

#[tokio::test]
async fn absent_deletes_stopped_instance_without_stopping() {
    let h = Harness::new(FakeController::with_instance(existing(ObservedState::Stopped)));
    let req = params("absent").validate().unwrap();

    h.reconciler().reconcile(&req).await.unwrap();

    assert_eq!(h.controller.mutations(), [Call::Delete("vm1".into())]);
}

#[tokio::test]
async fn failed_stop_never_reaches_delete() {
    let h = Harness::new(
        FakeController::with_instance(existing(ObservedState::Running))
            .stop_converges(Convergence::Never),
    );
    let req = VmParams {
        timeout: Some(6),
        ..params("absent")
    }
    .validate()
    .unwrap();

    let failure = h.reconciler().reconcile(&req).await.unwrap_err();

    assert!(matches!(
        failure.error,
        Error::ConvergenceTimeout { attempts: 3, .. }
    ));
    assert!(failure.outcome.changed);
    assert!(
        !h.controller
            .mutations()
            .iter()
            .any(|c| matches!(c, Call::Delete(_)))
    );
    assert!(h.controller.instance().is_some());
}

#[tokio::test]
async fn timeout_of_four_seconds_allows_two_attempts() {
    let h = Harness::new(
        FakeController::with_instance(existing(ObservedState::Stopped))
            .assign_ip("10.0.0.7", Convergence::Never),
    );
    let req = VmParams {
        timeout: Some(4),
        ..params("running")
    }
    .validate()
    .unwrap();

    let failure = h.reconciler().reconcile(&req).await.unwrap_err();

    let Error::ConvergenceTimeout {
        attempts, last, ..
    } = &failure.error
    else {
        panic!("expected convergence timeout, got {:?}", failure.error);
    };
    assert_eq!(*attempts, 2);
    assert!(matches!(**last, Error::NotReady(_)));
    assert_eq!(h.sleeper.sleeps(), [Duration::from_secs(1)]);

    // initial lookup + two polls
    let lookups = h
        .controller
        .calls()
        .iter()
        .filter(|c| matches!(c, Call::Get(_)))
        .count();
    assert_eq!(lookups, 3);

    // The start itself went through and is not rolled back.
    assert_eq!(
        h.controller.instance().unwrap().state,
        ObservedState::Running
    );
}

#[tokio::test]
async fn create_failure_is_reported_without_later_steps() {
    let h = Harness::new(FakeController::empty().fail_on("create"));
    let req = params("running").validate().unwrap();

    let failure = h.reconciler().reconcile(&req).await.unwrap_err();

    assert!(matches!(failure.error, Error::Api(_)));
    assert!(
        !h.controller
            .mutations()
            .iter()
            .any(|c| matches!(c, Call::Start(_)))
    );
}

#[tokio::test]
async fn duplicate_records_use_the_first() {
    let h = Harness::new(
        FakeController::with_instance(existing(ObservedState::Running)).with_duplicates(2),
    );
    let req = params("running").validate().unwrap();

    let outcome = h.reconciler().reconcile(&req).await.unwrap();

    assert!(!outcome.changed);
    assert_eq!(outcome.result["name"], "vm1");
}

#[tokio::test]
async fn local_image_is_uploaded_once_without_overwrite() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("img1.qcow2");
    std::fs::write(&path, b"qcow").unwrap();

    let h = Harness::new(FakeController::empty());
    let req = VmParams {
        image: Some("img1".into()),
        file: Some(path.clone()),
        ..params("present")
    }
    .validate()
    .unwrap();

    h.reconciler().reconcile(&req).await.unwrap();
    h.controller.delete("vm1").await.unwrap();
    h.reconciler().reconcile(&req).await.unwrap();

    assert_eq!(h.images.uploads(), ["img1"]);
    let creates: Vec<_> = h
        .controller
        .mutations()
        .into_iter()
        .filter_map(|c| match c {
            Call::Create { image, .. } => Some(image),
            _ => None,
        })
        .collect();
    assert_eq!(creates, ["img1", "img1"]);
}

#[tokio::test]
async fn overwrite_uploads_even_when_registered() {
    let h = Harness::with_images(FakeController::empty(), FakeImages::with_images(&["img1"]));
    let req = VmParams {
        image: Some("img1".into()),
        file: Some("/images/img1.qcow2".into()),
        overwrite: Some(true),
        ..params("present")
    }
    .validate()
    .unwrap();

    h.reconciler().reconcile(&req).await.unwrap();

    assert_eq!(h.images.uploads(), ["img1"]);
}

#[tokio::test]
async fn registered_image_is_reused() {
    let h = Harness::with_images(FakeController::empty(), FakeImages::with_images(&["img1"]));
    let req = VmParams {
        image: Some("img1".into()),
        file: Some("/images/img1.qcow2".into()),
        ..params("present")
    }
    .validate()
    .unwrap();

    h.reconciler().reconcile(&req).await.unwrap();

    assert!(h.images.uploads().is_empty());
}

#[tokio::test]
async fn every_state_converges_to_a_stable_second_pass() {
    for desired in DesiredState::ALL {
        let h = Harness::new(FakeController::with_instance(existing(ObservedState::Running)));
        let req = params(desired.as_str()).validate().unwrap();

        h.reconciler().reconcile(&req).await.unwrap();
        let second = h.reconciler().reconcile(&req).await.unwrap();

        assert!(!second.changed, "{desired} should be stable");
    }
}
