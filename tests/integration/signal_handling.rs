use std::time::Duration;

use crate::support::{date, secrets, test_config, MockProvider};
use slicehound::auth::CredentialPool;
use slicehound::engine::{Orchestrator, ResultStore};
use slicehound::fetcher::RequestResult;
use slicehound::output::MemorySink;
use slicehound::shutdown::{sleep_or_shutdown, ShutdownCoordinator, Sleep};
use slicehound::{SearchKind, SearchWindow};

#[tokio::test]
async fn shutdown_notifies_waiters() {
    let shutdown = ShutdownCoordinator::shared();
    let waiter = {
        let handle = shutdown.clone();
        tokio::spawn(async move {
            handle.wait_for_shutdown().await;
            true
        })
    };

    // Give the task time to start waiting
    tokio::time::sleep(Duration::from_millis(50)).await;
    shutdown.request_shutdown();

    let result = tokio::time::timeout(Duration::from_secs(1), waiter).await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn shutdown_requested_before_wait_returns_immediately() {
    let shutdown = ShutdownCoordinator::shared();
    shutdown.request_shutdown();

    let handle = shutdown.clone();
    let waiter = tokio::spawn(async move {
        handle.wait_for_shutdown().await;
        true
    });

    let result = tokio::time::timeout(Duration::from_secs(1), waiter).await;
    assert!(result.is_ok(), "wait_for_shutdown() blocked despite shutdown already requested");
}

#[tokio::test(start_paused = true)]
async fn shutdown_interrupts_long_sleep() {
    let shutdown = ShutdownCoordinator::shared();
    let sleeper = {
        let handle = shutdown.clone();
        tokio::spawn(async move { sleep_or_shutdown(Duration::from_secs(3600), Some(&*handle)).await })
    };

    tokio::time::sleep(Duration::from_secs(1)).await;
    shutdown.request_shutdown();

    assert_eq!(sleeper.await.unwrap(), Sleep::Interrupted);
}

#[tokio::test(start_paused = true)]
async fn cancelled_run_flushes_sink_and_reports_pending() {
    let window = SearchWindow::years(2020, 2020).unwrap();
    let shutdown = ShutdownCoordinator::shared();
    // Requests 1-3 split the year; request 5 is the second page of the
    // first leaf, after which the run must stop.
    let provider = MockProvider::new()
        .spread(window, 2500)
        .cancel_after(shutdown.clone(), 5);

    let config = test_config();
    let sink = MemorySink::new();
    let pool = CredentialPool::new(secrets(1), &config).unwrap();
    let store = ResultStore::with_sink(Box::new(sink.clone()));
    let mut orchestrator = Orchestrator::new(provider, pool, store, config)
        .unwrap()
        .with_shutdown(shutdown.clone());

    let summary = orchestrator
        .run("acme.io", &[SearchKind::Repository], window)
        .await
        .unwrap();

    assert!(summary.cancelled);
    assert!(!summary.is_complete());
    assert!(summary.windows_pending >= 1);
    assert!(sink.is_finalized());
    assert_eq!(summary.items_discovered, 200);
    assert_eq!(sink.items().len(), summary.items_discovered);
    assert_eq!(orchestrator.provider().call_count(), 5);
}

#[tokio::test(start_paused = true)]
async fn shutdown_during_penalty_wait_cancels_run() {
    let window = SearchWindow::day(date(2021, 1, 1));
    let shutdown = ShutdownCoordinator::shared();
    let mut limited = RequestResult::error(429, "Too Many Requests");
    limited.retry_after = Some(Duration::from_secs(3000));
    let provider = MockProvider::new()
        .with_day(date(2021, 1, 1), 5)
        .script(limited);

    let config = test_config();
    let sink = MemorySink::new();
    let pool = CredentialPool::new(secrets(1), &config).unwrap();
    let store = ResultStore::with_sink(Box::new(sink.clone()));
    let mut orchestrator = Orchestrator::new(provider, pool, store, config)
        .unwrap()
        .with_shutdown(shutdown.clone());

    let trigger = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(10)).await;
            shutdown.request_shutdown();
        })
    };

    let started = tokio::time::Instant::now();
    let summary = orchestrator
        .run("acme.io", &[SearchKind::Repository], window)
        .await
        .unwrap();
    trigger.await.unwrap();

    assert!(summary.cancelled);
    assert!(started.elapsed() < Duration::from_secs(3000));
    assert_eq!(summary.items_discovered, 0);
    assert_eq!(summary.windows_pending, 1);
    assert!(sink.is_finalized());
}
