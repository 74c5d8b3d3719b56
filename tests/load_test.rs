//! Concurrency and load tests for the breaker and the client.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use resilient_client::http::ResilientClient;
use resilient_client::resilience::{CallContext, CircuitBreaker, CircuitPolicy, CircuitState};

mod common;

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_breaker_operations() {
    let breaker = Arc::new(CircuitBreaker::new(
        "load",
        CircuitPolicy {
            max_failures: 100,
            open_timeout: Duration::from_millis(5),
            half_open_limit: 3,
        },
    ));

    // Observer re-entering the breaker must not deadlock.
    let observed = Arc::new(AtomicU32::new(0));
    let (b, o) = (breaker.clone(), observed.clone());
    breaker.on_state_change(move |_t| {
        let _ = b.state();
        o.fetch_add(1, Ordering::Relaxed);
    });

    let mut handles = Vec::with_capacity(1000);
    for i in 0..1000u32 {
        let breaker = breaker.clone();
        handles.push(tokio::spawn(async move {
            if breaker.allow() {
                if i % 3 == 0 {
                    breaker.record_success();
                } else {
                    breaker.record_failure();
                }
            }
            if i % 50 == 0 {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
            breaker.state()
        }));
    }

    let results = tokio::time::timeout(Duration::from_secs(30), futures_util::future::join_all(handles))
        .await
        .expect("breaker operations deadlocked");

    for result in results {
        let state = result.expect("task panicked");
        assert!(matches!(
            state,
            CircuitState::Closed | CircuitState::Open | CircuitState::HalfOpen
        ));
    }

    let snapshot = breaker.snapshot();
    assert!(snapshot.in_flight_probes <= 3);
    assert_eq!(snapshot.state, breaker.state());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_shared_client_under_load() {
    let backend = common::start_mock_backend(200, r#"{"ok":true}"#).await;
    let client = ResilientClient::builder(common::fast_config("load", &backend.url()))
        .http_client(common::direct_http_client())
        .build()
        .unwrap();

    let concurrency = 20;
    let requests_per_task = 10;
    let total_requests = concurrency * requests_per_task;
    let start = Instant::now();

    let mut handles = Vec::new();
    for _ in 0..concurrency {
        let client = client.clone();
        handles.push(tokio::spawn(async move {
            let ctx = CallContext::background();
            let mut ok = 0;
            for _ in 0..requests_per_task {
                if client.get(&ctx, "/").await.is_ok_and(|r| r.status == 200) {
                    ok += 1;
                }
            }
            ok
        }));
    }

    let mut success = 0;
    for handle in handles {
        success += handle.await.unwrap();
    }

    let duration = start.elapsed();
    println!("Total requests: {}", total_requests);
    println!("Success: {}", success);
    println!("Duration: {:?}", duration);

    assert_eq!(success, total_requests);
    assert_eq!(backend.hits(), total_requests);
    assert_eq!(client.breaker().state(), CircuitState::Closed);
}
