//! Unit tests for the compute and database resource lifecycles.

use std::time::Duration;

use rstest::{fixture, rstest};
use serde_json::{Value, json};

use super::*;
use crate::converge::{Operation, PollBackoff};
use crate::registry::ClientRegistry;
use crate::service::{DbInstanceId, InstanceId};
use crate::test_support::{ScriptedTransport, scripted_registry};

struct Harness {
    transport: ScriptedTransport,
    registry: ClientRegistry,
}

impl Harness {
    fn compute(&self) -> ComputeInstanceResource<'_> {
        ComputeInstanceResource::new(&self.registry).with_backoff(fast_backoff())
    }

    fn database(&self) -> DatabaseInstanceResource<'_> {
        DatabaseInstanceResource::new(&self.registry).with_backoff(fast_backoff())
    }

    fn push_instance(&self, state: &str) {
        self.transport.push_response(json!({
            "TotalCount": 1,
            "InstanceSet": [instance_json(state)]
        }));
    }

    fn push_no_instance(&self) {
        self.transport
            .push_response(json!({"TotalCount": 0, "InstanceSet": []}));
    }

    fn push_db(&self, status: &str) {
        self.transport.push_response(json!({
            "TotalCount": 1,
            "Items": [db_json(status)]
        }));
    }

    fn push_task(&self, status: &str) {
        self.transport
            .push_response(json!({"Status": status, "Info": ""}));
    }
}

const fn fast_backoff() -> PollBackoff {
    PollBackoff::fixed(Duration::from_millis(1))
}

fn instance_json(state: &str) -> Value {
    json!({
        "InstanceId": "ins-1",
        "InstanceName": "web",
        "InstanceState": state,
        "InstanceType": "S5.MEDIUM2",
        "ImageId": "img-ubuntu"
    })
}

fn db_json(status: &str) -> Value {
    json!({
        "InstanceId": "db-1",
        "InstanceName": "orders",
        "Status": status,
        "EngineVersion": "8.0",
        "Memory": 4000,
        "Volume": 100,
        "Zone": "eu-central-1a"
    })
}

#[fixture]
fn harness() -> Harness {
    let transport = ScriptedTransport::new();
    let registry = scripted_registry(&transport);
    Harness {
        transport,
        registry,
    }
}

#[fixture]
fn web_spec() -> ComputeInstanceSpec {
    ComputeInstanceSpec::builder()
        .name(" web ")
        .instance_type("S5.MEDIUM2")
        .image_id("img-ubuntu")
        .zone("eu-central-1a")
        .build()
        .expect("spec should be valid")
}

#[fixture]
fn orders_spec() -> DatabaseInstanceSpec {
    DatabaseInstanceSpec {
        name: String::from("orders"),
        engine_version: String::from("8.0"),
        memory: 4000,
        volume: 100,
        zone: String::from("eu-central-1a"),
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| (*value).to_owned()).collect()
}

#[rstest]
fn builder_trims_and_validates(web_spec: ComputeInstanceSpec) {
    assert_eq!(web_spec.name, "web");
    let err = ComputeInstanceSpec::builder()
        .name("web")
        .zone("eu-central-1a")
        .build()
        .expect_err("missing type must fail");
    assert_eq!(err, ResourceError::validation("instance_type", "must not be empty"));
}

#[rstest]
#[tokio::test]
async fn compute_create_waits_for_running(harness: Harness, web_spec: ComputeInstanceSpec) {
    harness
        .transport
        .push_response(json!({"InstanceIdSet": ["ins-1"]}));
    harness.push_instance("PENDING");
    harness.push_instance("STARTING");
    harness.push_instance("RUNNING");

    let instance = harness
        .compute()
        .create(&web_spec)
        .await
        .expect("create should converge");

    assert_eq!(instance.instance_state, "RUNNING");
    assert_eq!(
        harness.transport.actions(),
        strings(&[
            "RunInstances",
            "DescribeInstances",
            "DescribeInstances",
            "DescribeInstances"
        ])
    );
}

#[rstest]
#[tokio::test]
async fn compute_create_stops_on_launch_failure(
    harness: Harness,
    web_spec: ComputeInstanceSpec,
) {
    harness
        .transport
        .push_response(json!({"InstanceIdSet": ["ins-1"]}));
    harness.push_instance("PENDING");
    harness.push_instance("LAUNCH_FAILED");
    harness.push_instance("RUNNING");

    let err = harness
        .compute()
        .create(&web_spec)
        .await
        .expect_err("launch failure must surface");

    assert_eq!(
        err,
        ResourceError::Converge(ConvergeError::FatalStatus {
            operation: Operation::Create,
            resource_id: String::from("ins-1"),
            status: String::from("LAUNCH_FAILED"),
        })
    );
    assert_eq!(harness.transport.remaining(), 1);
}

#[rstest]
#[tokio::test]
async fn compute_create_retries_throttled_launch(
    harness: Harness,
    web_spec: ComputeInstanceSpec,
) {
    harness
        .transport
        .push_api_error("RequestLimitExceeded", "slow down");
    harness
        .transport
        .push_response(json!({"InstanceIdSet": ["ins-1"]}));
    harness.push_instance("RUNNING");

    harness
        .compute()
        .create(&web_spec)
        .await
        .expect("throttling is transient");

    let launches: Vec<_> = harness
        .transport
        .requests()
        .into_iter()
        .filter(|request| request.action == "RunInstances")
        .map(|request| request.payload["ClientToken"].clone())
        .collect();
    assert_eq!(launches.len(), 2);
    assert_eq!(launches.first(), launches.last(), "retries reuse the token");
}

#[rstest]
#[tokio::test]
async fn compute_create_surfaces_permanent_errors(
    harness: Harness,
    web_spec: ComputeInstanceSpec,
) {
    harness
        .transport
        .push_api_error("InvalidParameterValue.ImageNotFound", "no image");

    let err = harness
        .compute()
        .create(&web_spec)
        .await
        .expect_err("permanent errors are not retried");

    assert_eq!(
        err.sdk_error().map(crate::sdk::SdkError::code),
        Some("InvalidParameterValue.ImageNotFound")
    );
    assert_eq!(harness.transport.actions(), strings(&["RunInstances"]));
}

#[rstest]
#[tokio::test]
async fn compute_read_maps_absence_to_none(harness: Harness) {
    harness
        .transport
        .push_api_error("ResourceNotFound.InstanceNotExist", "gone");

    let state = harness
        .compute()
        .read(&InstanceId::from("ins-1"))
        .await
        .expect("absence is not an error");

    assert_eq!(state, None);
}

#[rstest]
#[tokio::test]
async fn compute_update_renames_then_waits(harness: Harness, web_spec: ComputeInstanceSpec) {
    harness.transport.push_response(json!({
        "TotalCount": 1,
        "InstanceSet": [{
            "InstanceId": "ins-1",
            "InstanceName": "old",
            "InstanceState": "RUNNING",
            "InstanceType": "S5.MEDIUM2",
            "ImageId": "img-ubuntu"
        }]
    }));
    harness.transport.push_response(json!({}));
    harness.push_instance("RUNNING");

    let instance = harness
        .compute()
        .update(&InstanceId::from("ins-1"), &web_spec)
        .await
        .expect("rename should converge");

    assert_eq!(instance.instance_name, "web");
    assert_eq!(
        harness.transport.actions(),
        strings(&[
            "DescribeInstances",
            "ModifyInstancesAttribute",
            "DescribeInstances"
        ])
    );
}

#[rstest]
#[tokio::test]
async fn compute_update_rejects_immutable_changes(
    harness: Harness,
    mut web_spec: ComputeInstanceSpec,
) {
    harness.push_instance("RUNNING");
    web_spec.instance_type = String::from("S5.LARGE8");

    let err = harness
        .compute()
        .update(&InstanceId::from("ins-1"), &web_spec)
        .await
        .expect_err("type changes need replacement");

    assert!(
        matches!(&err, ResourceError::Validation { field, .. } if *field == "instance_type"),
        "got {err:?}"
    );
}

#[rstest]
#[tokio::test]
async fn compute_delete_waits_for_absence(harness: Harness) {
    harness.transport.push_response(json!({}));
    harness.push_instance("SHUTDOWN");
    harness.push_instance("TERMINATING");
    harness.push_no_instance();

    harness
        .compute()
        .delete(&InstanceId::from("ins-1"))
        .await
        .expect("delete should converge");

    assert_eq!(harness.transport.remaining(), 0);
}

#[rstest]
#[tokio::test]
async fn compute_delete_is_idempotent(harness: Harness) {
    for _ in 0..2 {
        harness
            .transport
            .push_api_error("ResourceNotFound.InstanceNotExist", "gone");
        harness.push_no_instance();
    }
    let compute = harness.compute();
    let id = InstanceId::from("ins-1");

    compute.delete(&id).await.expect("first delete succeeds");
    compute.delete(&id).await.expect("second delete succeeds");

    assert_eq!(
        harness.transport.actions(),
        strings(&[
            "TerminateInstances",
            "DescribeInstances",
            "TerminateInstances",
            "DescribeInstances"
        ])
    );
}

#[rstest]
#[tokio::test]
async fn database_create_waits_for_task_then_instance(
    harness: Harness,
    orders_spec: DatabaseInstanceSpec,
) {
    harness.transport.push_response(json!({
        "InstanceIds": ["db-1"],
        "AsyncRequestId": "task-1"
    }));
    harness.push_task("INITIAL");
    harness.push_task("RUNNING");
    harness.push_task("SUCCESS");
    harness.push_db("CREATING");
    harness.push_db("RUNNING");

    let instance = harness
        .database()
        .create(&orders_spec)
        .await
        .expect("create should converge");

    assert_eq!(instance.status, "RUNNING");
    assert_eq!(harness.transport.remaining(), 0);
}

#[rstest]
#[case("FAILED")]
#[case("KILLED")]
#[tokio::test]
async fn database_create_fails_with_task(
    harness: Harness,
    orders_spec: DatabaseInstanceSpec,
    #[case] status: &str,
) {
    harness.transport.push_response(json!({
        "InstanceIds": ["db-1"],
        "AsyncRequestId": "task-1"
    }));
    harness.push_task("RUNNING");
    harness.push_task(status);

    let err = harness
        .database()
        .create(&orders_spec)
        .await
        .expect_err("failed task must surface");

    assert_eq!(
        err,
        ResourceError::Converge(ConvergeError::FatalStatus {
            operation: Operation::Create,
            resource_id: String::from("task-1"),
            status: status.to_owned(),
        })
    );
}

#[rstest]
#[tokio::test]
async fn database_create_rejects_zero_memory(
    harness: Harness,
    mut orders_spec: DatabaseInstanceSpec,
) {
    orders_spec.memory = 0;

    let err = harness
        .database()
        .create(&orders_spec)
        .await
        .expect_err("zero memory is invalid");

    assert_eq!(err, ResourceError::validation("memory", "must be positive"));
    assert!(harness.transport.requests().is_empty());
}

#[rstest]
#[tokio::test]
async fn database_update_rejects_drift(harness: Harness, mut orders_spec: DatabaseInstanceSpec) {
    harness.push_db("RUNNING");
    orders_spec.volume = 200;

    let err = harness
        .database()
        .update(&DbInstanceId::from("db-1"), &orders_spec)
        .await
        .expect_err("resizing needs replacement");

    assert!(
        matches!(&err, ResourceError::Validation { field, .. } if *field == "volume"),
        "got {err:?}"
    );
}

#[rstest]
#[tokio::test]
async fn database_update_without_changes_returns_current(
    harness: Harness,
    orders_spec: DatabaseInstanceSpec,
) {
    harness.push_db("RUNNING");

    let instance = harness
        .database()
        .update(&DbInstanceId::from("db-1"), &orders_spec)
        .await
        .expect("no-op update succeeds");

    assert_eq!(instance.instance_name, "orders");
}

#[rstest]
#[tokio::test]
async fn database_delete_waits_for_task_and_absence(harness: Harness) {
    harness
        .transport
        .push_response(json!({"AsyncRequestId": "task-2"}));
    harness.push_task("SUCCESS");
    harness.push_db("ISOLATING");
    harness
        .transport
        .push_api_error("ResourceNotFound.InstanceNotFound", "gone");

    harness
        .database()
        .delete(&DbInstanceId::from("db-1"))
        .await
        .expect("delete should converge");

    assert_eq!(
        harness.transport.actions(),
        strings(&[
            "TerminateDBInstance",
            "DescribeAsyncRequestInfo",
            "DescribeDBInstances",
            "DescribeDBInstances"
        ])
    );
}

#[rstest]
fn resource_errors_expose_sdk_cause() {
    let sdk = crate::sdk::SdkError::Api {
        code: String::from("InternalError"),
        message: String::from("boom"),
        request_id: String::from("req"),
    };
    let timed_out = ResourceError::Retry(crate::retry::RetryFailure::TimedOut {
        elapsed: Duration::from_secs(1),
        last_error: sdk.clone(),
    });
    assert_eq!(timed_out.sdk_error(), Some(&sdk));
    assert_eq!(ResourceError::validation("name", "empty").sdk_error(), None);
}
