mod common;

use common::RecordingSink;
use futures::FutureExt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use task_engine_rs::task::retry::{tag_classifier, RetryPolicy};
use task_engine_rs::task::{Operation, Task, TaskError, TaskFailure};
use task_engine_rs::{EngineConfig, ErrorKind};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

fn policy_with(config: EngineConfig) -> (RetryPolicy, Arc<RecordingSink>) {
    let sink = RecordingSink::new();
    let (_tx, rx) = watch::channel(config);
    (RetryPolicy::new(rx, tag_classifier(), sink.clone()), sink)
}

fn fast_config() -> EngineConfig {
    EngineConfig {
        initial_backoff_ms: 10,
        max_backoff_ms: 40,
        ..Default::default()
    }
}

/// Operation that counts attempts and fails retryably the first
/// `failures` times
fn flaky_operation(counter: Arc<AtomicU32>, failures: u32) -> Operation {
    Box::new(move || {
        let counter = counter.clone();
        async move {
            let attempt = counter.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt <= failures {
                Err(TaskError::retryable("transient"))
            } else {
                Ok(())
            }
        }
        .boxed()
    })
}

#[tokio::test]
async fn test_success_on_first_attempt() {
    let (policy, _sink) = policy_with(fast_config());
    let counter = Arc::new(AtomicU32::new(0));

    let (mut task, _handle) = Task::new(1, flaky_operation(counter.clone(), 0), 3);
    let result = policy.execute(&mut task, &CancellationToken::new()).await;

    assert!(result.is_ok());
    assert_eq!(counter.load(Ordering::SeqCst), 1);
    assert_eq!(task.attempt, 1);
}

#[tokio::test]
async fn test_always_retryable_runs_max_retries_plus_one_attempts() {
    let (policy, _sink) = policy_with(fast_config());
    let counter = Arc::new(AtomicU32::new(0));

    let (mut task, _handle) = Task::new(1, flaky_operation(counter.clone(), u32::MAX), 3);
    let result = policy.execute(&mut task, &CancellationToken::new()).await;

    match result {
        Err(TaskFailure::MaxRetriesExceeded { attempts, source }) => {
            assert_eq!(attempts, 4);
            assert_eq!(source.kind, ErrorKind::Retryable);
        }
        other => panic!("expected MaxRetriesExceeded, got {:?}", other),
    }
    assert_eq!(counter.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_terminal_error_consumes_no_retries() {
    let (policy, _sink) = policy_with(fast_config());
    let counter = Arc::new(AtomicU32::new(0));

    let op: Operation = Box::new({
        let counter = counter.clone();
        move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(TaskError::terminal("broken payload"))
            }
            .boxed()
        }
    });

    let (mut task, _handle) = Task::new(1, op, 5);
    let result = policy.execute(&mut task, &CancellationToken::new()).await;

    assert!(matches!(result, Err(TaskFailure::Terminal(_))));
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_fail_twice_then_succeed() {
    let (policy, _sink) = policy_with(fast_config());
    let counter = Arc::new(AtomicU32::new(0));

    let (mut task, _handle) = Task::new(1, flaky_operation(counter.clone(), 2), 3);
    let result = policy.execute(&mut task, &CancellationToken::new()).await;

    assert!(result.is_ok());
    assert_eq!(counter.load(Ordering::SeqCst), 3);
    assert_eq!(task.attempt, 3);
}

#[tokio::test]
async fn test_backoff_delays_grow_and_are_capped() {
    // 10ms, 20ms, 40ms, then capped at 40ms: >= 110ms total
    let (policy, sink) = policy_with(fast_config());
    let counter = Arc::new(AtomicU32::new(0));

    let (mut task, _handle) = Task::new(1, flaky_operation(counter.clone(), u32::MAX), 4);
    let started = Instant::now();
    let result = policy.execute(&mut task, &CancellationToken::new()).await;
    let elapsed = started.elapsed();

    assert!(matches!(result, Err(TaskFailure::MaxRetriesExceeded { .. })));
    assert!(elapsed >= Duration::from_millis(110), "elapsed {:?}", elapsed);

    let delays: Vec<u64> = sink
        .events()
        .iter()
        .filter_map(|e| match e {
            task_engine_rs::EngineEvent::Retried { delay_ms, .. } => Some(*delay_ms),
            _ => None,
        })
        .collect();
    assert_eq!(delays, vec![10, 20, 40, 40]);
}

#[tokio::test]
async fn test_cancellation_interrupts_backoff_sleep() {
    let mut config = fast_config();
    config.initial_backoff_ms = 5_000;
    config.max_backoff_ms = 5_000;
    let (policy, _sink) = policy_with(config);

    let counter = Arc::new(AtomicU32::new(0));
    let (mut task, _handle) = Task::new(1, flaky_operation(counter.clone(), u32::MAX), 3);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let result = policy.execute(&mut task, &cancel).await;

    assert!(matches!(result, Err(TaskFailure::Cancelled)));
    // The 5s sleep was interrupted, not completed
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_custom_classifier_overrides_tag() {
    // Classifier that treats every error as terminal, whatever the tag says
    let sink = RecordingSink::new();
    let (_tx, rx) = watch::channel(fast_config());
    let policy = RetryPolicy::new(
        rx,
        Arc::new(|_: &TaskError| ErrorKind::Terminal),
        sink,
    );

    let counter = Arc::new(AtomicU32::new(0));
    let (mut task, _handle) = Task::new(1, flaky_operation(counter.clone(), u32::MAX), 5);
    let result = policy.execute(&mut task, &CancellationToken::new()).await;

    assert!(matches!(result, Err(TaskFailure::Terminal(_))));
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}
