use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use relaykit::prelude::*;

const CAPACITY: usize = 4;

fn track_peak(in_flight: &AtomicUsize, peak: &AtomicUsize) {
    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    peak.fetch_max(now, Ordering::SeqCst);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn burst_never_exceeds_capacity() {
    let bulkhead = Arc::new(Bulkhead::new(
        "burst",
        BulkheadConfig::new()
            .with_max_concurrent(CAPACITY)
            .with_max_waiting(CAPACITY * 10)
            .with_max_wait(Duration::from_secs(10)),
    ));
    let in_flight = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let tasks: Vec<_> = (0..CAPACITY * 10)
        .map(|_| {
            let bulkhead = Arc::clone(&bulkhead);
            let in_flight = Arc::clone(&in_flight);
            let peak = Arc::clone(&peak);
            tokio::spawn(async move {
                bulkhead
                    .execute(|| async {
                        track_peak(&in_flight, &peak);
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                        Ok::<_, LlmError>(())
                    })
                    .await
            })
        })
        .collect();

    for task in tasks {
        task.await.unwrap().unwrap();
    }
    assert!(peak.load(Ordering::SeqCst) <= CAPACITY);
    assert_eq!(bulkhead.in_flight(), 0);
    assert_eq!(bulkhead.waiting(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn burst_without_queue_rejects_the_excess() {
    let bulkhead = Arc::new(Bulkhead::new(
        "no-queue",
        BulkheadConfig::new()
            .with_max_concurrent(CAPACITY)
            .with_max_waiting(0),
    ));
    let in_flight = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let gate = Arc::new(tokio::sync::Semaphore::new(0));

    let tasks: Vec<_> = (0..CAPACITY * 10)
        .map(|_| {
            let bulkhead = Arc::clone(&bulkhead);
            let in_flight = Arc::clone(&in_flight);
            let peak = Arc::clone(&peak);
            let gate = Arc::clone(&gate);
            tokio::spawn(async move {
                bulkhead
                    .execute(|| async {
                        track_peak(&in_flight, &peak);
                        let _pass = gate.acquire().await.unwrap();
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                        Ok::<_, LlmError>(())
                    })
                    .await
            })
        })
        .collect();

    while bulkhead.in_flight() < CAPACITY {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    tokio::time::sleep(Duration::from_millis(20)).await;
    gate.add_permits(CAPACITY * 10);

    let mut admitted = 0;
    let mut rejected = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(()) => admitted += 1,
            Err(LlmError::BulkheadFull { upstream }) => {
                assert_eq!(upstream, "no-queue");
                rejected += 1;
            }
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert!(peak.load(Ordering::SeqCst) <= CAPACITY);
    assert!(admitted >= CAPACITY);
    assert_eq!(admitted + rejected, CAPACITY * 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_failures_open_the_breaker_once() {
    let registry = Arc::new(ResilienceRegistry::new(
        ResilienceConfig::default().with_circuit_breaker(
            CircuitBreakerConfig::new()
                .with_failure_threshold(5)
                .with_cooldown(Duration::from_secs(60)),
        ),
    ));
    let invocations = Arc::new(AtomicUsize::new(0));

    let tasks: Vec<_> = (0..50)
        .map(|_| {
            let registry = Arc::clone(&registry);
            let invocations = Arc::clone(&invocations);
            tokio::spawn(async move {
                registry
                    .with_circuit_breaker("flaky", || async {
                        invocations.fetch_add(1, Ordering::SeqCst);
                        Err::<(), _>(LlmError::api_error(503, "down"))
                    })
                    .await
            })
        })
        .collect();

    let mut open = 0;
    for task in tasks {
        if let Err(LlmError::CircuitOpen { .. }) = task.await.unwrap() {
            open += 1;
        }
    }

    let stats = registry.breaker("flaky").stats();
    assert_eq!(registry.breaker("flaky").state(), CircuitState::Open);
    assert_eq!(open + invocations.load(Ordering::SeqCst), 50);
    assert!(invocations.load(Ordering::SeqCst) >= 5);
    assert_eq!(stats.total_failures as usize, invocations.load(Ordering::SeqCst));
}
