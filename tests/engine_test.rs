use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use task_engine_rs::{
    BreakerState, CircuitPolicy, Engine, EngineConfig, TaskError, TaskFailure,
};

/// One worker, fast breaker and backoff, scaler effectively off
fn single_worker_config() -> EngineConfig {
    EngineConfig {
        min_workers: 1,
        max_workers: 1,
        failure_threshold: 3,
        success_threshold: 1,
        cooldown_ms: 100,
        initial_backoff_ms: 10,
        max_backoff_ms: 40,
        scale_interval_ms: 60_000,
        shutdown_grace_secs: 5,
        ..Default::default()
    }
}

async fn started_engine(config: EngineConfig) -> Engine {
    let engine = Engine::new(config).unwrap();
    engine.start().await.unwrap();
    engine
}

#[tokio::test]
async fn test_submit_and_wait_success() {
    let engine = started_engine(single_worker_config()).await;
    let counter = Arc::new(AtomicU32::new(0));

    let handle = {
        let counter = counter.clone();
        engine
            .submit(
                5,
                move || {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }
                },
                None,
            )
            .await
            .unwrap()
    };

    assert!(handle.wait().await.is_ok());
    assert_eq!(counter.load(Ordering::SeqCst), 1);
    assert_eq!(engine.pending_count(), 0);

    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_fail_twice_then_succeed_reports_one_success() {
    // failure_threshold 2: per-attempt reporting would trip the breaker,
    // final-outcome reporting must not
    let mut config = single_worker_config();
    config.failure_threshold = 2;
    let engine = started_engine(config).await;

    let counter = Arc::new(AtomicU32::new(0));
    let handle = {
        let counter = counter.clone();
        engine
            .submit(
                1,
                move || {
                    let counter = counter.clone();
                    async move {
                        if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                            Err(TaskError::retryable("transient"))
                        } else {
                            Ok(())
                        }
                    }
                },
                Some(3),
            )
            .await
            .unwrap()
    };

    assert!(handle.wait().await.is_ok());
    assert_eq!(counter.load(Ordering::SeqCst), 3);
    assert_eq!(engine.breaker().state().await, BreakerState::Closed);

    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_terminal_failure_surfaces_immediately() {
    let engine = started_engine(single_worker_config()).await;
    let counter = Arc::new(AtomicU32::new(0));

    let handle = {
        let counter = counter.clone();
        engine
            .submit(
                1,
                move || {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Err(TaskError::terminal("bad input"))
                    }
                },
                Some(5),
            )
            .await
            .unwrap()
    };

    assert!(matches!(
        handle.wait().await,
        Err(TaskFailure::Terminal(_))
    ));
    assert_eq!(counter.load(Ordering::SeqCst), 1);

    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_retries_exhausted_wraps_last_cause() {
    let engine = started_engine(single_worker_config()).await;

    let handle = engine
        .submit(
            1,
            || async { Err(TaskError::retryable("still down")) },
            Some(2),
        )
        .await
        .unwrap();

    match handle.wait().await {
        Err(TaskFailure::MaxRetriesExceeded { attempts, source }) => {
            assert_eq!(attempts, 3);
            assert_eq!(source.message, "still down");
        }
        other => panic!("expected MaxRetriesExceeded, got {:?}", other),
    }

    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_default_max_retries_comes_from_config() {
    let mut config = single_worker_config();
    config.max_retries = 1;
    let engine = started_engine(config).await;

    let handle = engine
        .submit(1, || async { Err(TaskError::retryable("nope")) }, None)
        .await
        .unwrap();

    match handle.wait().await {
        Err(TaskFailure::MaxRetriesExceeded { attempts, .. }) => assert_eq!(attempts, 2),
        other => panic!("expected MaxRetriesExceeded, got {:?}", other),
    }

    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_open_breaker_rejects_without_executing() {
    // Long cooldown so the fourth task cannot sneak in as a half-open probe
    let mut config = single_worker_config();
    config.cooldown_ms = 60_000;
    let engine = started_engine(config).await;

    // Three terminal failures trip the breaker (threshold 3)
    for _ in 0..3 {
        let handle = engine
            .submit(
                1,
                || async { Err(TaskError::terminal("downstream down")) },
                Some(0),
            )
            .await
            .unwrap();
        assert!(handle.wait().await.is_err());
    }
    assert_eq!(engine.breaker().state().await, BreakerState::Open);

    let executed = Arc::new(AtomicBool::new(false));
    let handle = {
        let executed = executed.clone();
        engine
            .submit(
                1,
                move || {
                    let executed = executed.clone();
                    async move {
                        executed.store(true, Ordering::SeqCst);
                        Ok(())
                    }
                },
                Some(0),
            )
            .await
            .unwrap()
    };

    assert!(matches!(handle.wait().await, Err(TaskFailure::CircuitOpen)));
    assert!(!executed.load(Ordering::SeqCst));

    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_requeue_policy_runs_task_after_cooldown() {
    let mut config = single_worker_config();
    config.circuit_policy = CircuitPolicy::Requeue;
    let engine = started_engine(config).await;

    for _ in 0..3 {
        let handle = engine
            .submit(
                1,
                || async { Err(TaskError::terminal("downstream down")) },
                Some(0),
            )
            .await
            .unwrap();
        assert!(handle.wait().await.is_err());
    }
    assert_eq!(engine.breaker().state().await, BreakerState::Open);

    // Requeued until the cooldown admits it as the half-open probe
    let handle = engine
        .submit(1, || async { Ok(()) }, Some(0))
        .await
        .unwrap();

    let result = tokio::time::timeout(Duration::from_secs(5), handle.wait())
        .await
        .expect("task should run once the breaker cools down");
    assert!(result.is_ok());
    assert_eq!(engine.breaker().state().await, BreakerState::Closed);

    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_pending_count_tracks_unresolved_tasks() {
    let engine = started_engine(single_worker_config()).await;

    let handle = engine
        .submit(
            1,
            || async {
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok(())
            },
            Some(0),
        )
        .await
        .unwrap();

    assert_eq!(engine.pending_count(), 1);
    assert!(handle.wait().await.is_ok());
    assert_eq!(engine.pending_count(), 0);

    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_double_start_is_refused() {
    let engine = started_engine(single_worker_config()).await;
    assert!(engine.start().await.is_err());
    engine.shutdown().await.unwrap();
}
