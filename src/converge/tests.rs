//! Unit tests for the convergence wait loop.

use std::time::Duration;

use rstest::{fixture, rstest};

use super::*;
use crate::test_support::StatusScript;

const RESOURCE: &str = "ins-0001";

#[fixture]
fn fast() -> PollBackoff {
    PollBackoff::fixed(Duration::from_millis(1))
}

fn instance_wait(operation: Operation, timeout: Duration, backoff: PollBackoff) -> Convergence {
    Convergence::new(operation, RESOURCE, timeout)
        .target(["RUNNING"])
        .pending(["PENDING", "STARTING"])
        .fatal(["LAUNCH_FAILED"])
        .backoff(backoff)
}

async fn run(
    convergence: &Convergence,
    script: &StatusScript,
) -> Result<Converged<String>, ConvergeError<String>> {
    convergence.wait(move || async move { script.answer() }).await
}

#[rstest]
#[tokio::test]
async fn stops_polling_once_target_is_reached(fast: PollBackoff) {
    let script = StatusScript::statuses(&["PENDING", "STARTING", "RUNNING", "PENDING"]);
    let wait = instance_wait(Operation::Create, Duration::from_secs(5), fast);

    let outcome = run(&wait, &script).await;

    assert_eq!(outcome, Ok(Converged::Reached(String::from("RUNNING"))));
    assert_eq!(script.calls(), 3);
}

#[rstest]
#[tokio::test]
async fn fatal_status_fails_without_further_polls(fast: PollBackoff) {
    let script = StatusScript::statuses(&["PENDING", "LAUNCH_FAILED", "RUNNING"]);
    let wait = instance_wait(Operation::Create, Duration::from_secs(5), fast);

    let outcome = run(&wait, &script).await;

    assert_eq!(
        outcome,
        Err(ConvergeError::FatalStatus {
            operation: Operation::Create,
            resource_id: RESOURCE.to_owned(),
            status: String::from("LAUNCH_FAILED"),
        })
    );
    assert_eq!(script.calls(), 2);
}

#[rstest]
#[tokio::test]
async fn unexpected_status_fails_when_pending_set_is_known(fast: PollBackoff) {
    let script = StatusScript::statuses(&["PENDING", "REBOOTING"]);
    let wait = instance_wait(Operation::Update, Duration::from_secs(5), fast);

    let outcome = run(&wait, &script).await;

    assert!(
        matches!(
            &outcome,
            Err(ConvergeError::FatalStatus { status, .. }) if status == "REBOOTING"
        ),
        "got {outcome:?}"
    );
}

#[rstest]
#[tokio::test]
async fn delete_succeeds_when_resource_disappears(fast: PollBackoff) {
    let script = StatusScript::new([
        Ok(Some(String::from("SHUTTING_DOWN"))),
        Ok(Some(String::from("SHUTTING_DOWN"))),
        Ok(None),
    ]);
    let wait = Convergence::absence(RESOURCE, Duration::from_secs(5)).backoff(fast);

    let outcome = run(&wait, &script).await;

    assert_eq!(outcome, Ok(Converged::Gone));
    assert_eq!(script.calls(), 3);
}

#[rstest]
#[tokio::test]
async fn repeated_delete_waits_are_idempotent(fast: PollBackoff) {
    let script = StatusScript::new([Ok(None)]);
    let wait = Convergence::absence(RESOURCE, Duration::from_secs(5)).backoff(fast);

    let first = run(&wait, &script).await;
    let second = run(&wait, &script).await;

    assert_eq!(first, Ok(Converged::Gone));
    assert_eq!(second, Ok(Converged::Gone));
    assert_eq!(script.calls(), 2);
}

#[rstest]
#[case(Operation::Create)]
#[case(Operation::Update)]
#[tokio::test]
async fn absence_fails_creates_and_updates(fast: PollBackoff, #[case] operation: Operation) {
    let script = StatusScript::new([Ok(None)]);
    let wait = instance_wait(operation, Duration::from_secs(5), fast);

    let outcome = run(&wait, &script).await;

    assert_eq!(
        outcome,
        Err(ConvergeError::NotFound {
            operation,
            resource_id: RESOURCE.to_owned(),
        })
    );
    assert_eq!(script.calls(), 1);
}

#[rstest]
#[tokio::test]
async fn times_out_while_status_stays_pending(fast: PollBackoff) {
    let script = StatusScript::statuses(&["PENDING"]);
    let timeout = Duration::from_millis(25);
    let wait = instance_wait(Operation::Create, timeout, fast);

    let outcome = run(&wait, &script).await;

    match outcome {
        Err(ConvergeError::Timeout {
            operation,
            elapsed,
            last_status,
            last_error,
            ..
        }) => {
            assert_eq!(operation, Operation::Create);
            assert!(elapsed >= timeout, "elapsed {elapsed:?}");
            assert_eq!(last_status.as_deref(), Some("PENDING"));
            assert_eq!(last_error, None);
        }
        other => panic!("expected timeout, got {other:?}"),
    }
    assert!(script.calls() >= 2);
}

#[rstest]
#[tokio::test]
async fn retryable_errors_are_tolerated(fast: PollBackoff) {
    let script = StatusScript::new([
        Err(RetryError::Retryable(String::from("busy"))),
        Err(RetryError::Retryable(String::from("busy"))),
        Ok(Some(String::from("RUNNING"))),
    ]);
    let wait = instance_wait(Operation::Create, Duration::from_secs(5), fast);

    let outcome = run(&wait, &script).await;

    assert_eq!(outcome, Ok(Converged::Reached(String::from("RUNNING"))));
    assert_eq!(script.calls(), 3);
}

#[rstest]
#[tokio::test]
async fn timeout_carries_last_retryable_error(fast: PollBackoff) {
    let script = StatusScript::new([
        Ok(Some(String::from("PENDING"))),
        Err(RetryError::Retryable(String::from("throttled"))),
    ]);
    let wait = instance_wait(Operation::Create, Duration::from_millis(20), fast);

    let outcome = run(&wait, &script).await;

    match outcome {
        Err(ConvergeError::Timeout {
            last_status,
            last_error,
            ..
        }) => {
            assert_eq!(last_status.as_deref(), Some("PENDING"));
            assert_eq!(last_error.as_deref(), Some("throttled"));
        }
        other => panic!("expected timeout, got {other:?}"),
    }
}

#[rstest]
#[tokio::test]
async fn non_retryable_error_ends_the_wait(fast: PollBackoff) {
    let script = StatusScript::new([
        Ok(Some(String::from("PENDING"))),
        Err(RetryError::NonRetryable(String::from("denied"))),
        Ok(Some(String::from("RUNNING"))),
    ]);
    let wait = instance_wait(Operation::Create, Duration::from_secs(5), fast);

    let outcome = run(&wait, &script).await;

    assert_eq!(
        outcome,
        Err(ConvergeError::Refresh {
            operation: Operation::Create,
            resource_id: RESOURCE.to_owned(),
            error: String::from("denied"),
        })
    );
    assert_eq!(script.calls(), 2);
}

#[tokio::test]
async fn sleeps_are_clamped_to_the_deadline() {
    let script = StatusScript::statuses(&["PENDING"]);
    let wait = instance_wait(
        Operation::Create,
        Duration::from_millis(30),
        PollBackoff::fixed(Duration::from_secs(60)),
    );

    let started = Instant::now();
    let outcome = run(&wait, &script).await;

    assert!(matches!(outcome, Err(ConvergeError::Timeout { .. })));
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(script.calls(), 2, "expected one poll at start and one at the deadline");
}

#[tokio::test]
async fn initial_delay_still_allows_one_poll() {
    let script = StatusScript::statuses(&["RUNNING"]);
    let wait = instance_wait(
        Operation::Create,
        Duration::from_millis(10),
        PollBackoff::default(),
    )
    .initial_delay(Duration::from_secs(30));

    let outcome = run(&wait, &script).await;

    assert_eq!(outcome, Ok(Converged::Reached(String::from("RUNNING"))));
    assert_eq!(script.calls(), 1);
}

#[rstest]
#[case("RUNNING", StatusClass::Ready)]
#[case("PENDING", StatusClass::Pending)]
#[case("LAUNCH_FAILED", StatusClass::Failed)]
#[case("MIGRATING", StatusClass::Failed)]
fn status_sets_classify_observations(#[case] status: &str, #[case] expected: StatusClass) {
    let sets = StatusSets::new()
        .target(["RUNNING"])
        .pending(["PENDING"])
        .fatal(["LAUNCH_FAILED"]);
    assert_eq!(sets.classify(status), expected);
}

#[rstest]
fn empty_pending_set_waits_on_unknown_statuses() {
    let sets = StatusSets::new().target(["ACTIVE"]);
    assert_eq!(sets.classify("RESIZING"), StatusClass::Pending);
}

#[rstest]
fn converged_exposes_observation() {
    assert_eq!(
        Converged::Reached(String::from("RUNNING")).into_observed(),
        Some(String::from("RUNNING"))
    );
    assert_eq!(Converged::<String>::Gone.into_observed(), None);
}

#[rstest]
#[tokio::test]
async fn unbounded_timeout_polls_until_target(fast: PollBackoff) {
    let script = StatusScript::statuses(&["PENDING", "RUNNING"]);
    let wait = instance_wait(Operation::Create, Duration::MAX, fast);

    let outcome = run(&wait, &script).await;

    assert_eq!(outcome, Ok(Converged::Reached(String::from("RUNNING"))));
    assert_eq!(script.calls(), 2);
}
