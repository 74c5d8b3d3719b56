//! Request context against live mock services.

use std::sync::Arc;

use serde::Deserialize;

use resilient_client::http::{BoxError, ResilientClient};
use resilient_client::orchestration::{ContextError, FnAction, JsonResource, RequestContext};
use resilient_client::resilience::CallContext;

mod common;

#[derive(Debug, Deserialize, PartialEq)]
struct Product {
    sku: String,
    price: u32,
}

fn client(service: &str, backend: &common::MockBackend, max_attempts: u32) -> ResilientClient {
    let mut config = common::fast_config(service, &backend.url());
    config.retry.max_attempts = max_attempts;
    ResilientClient::builder(config)
        .http_client(common::direct_http_client())
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_load_memoizes_downstream_fetch() {
    let backend = common::start_mock_backend(200, r#"{"sku":"a1","price":250}"#).await;
    let catalog = client("catalog", &backend, 3);
    let ctx = RequestContext::with_call(CallContext::background());
    let product = JsonResource::<Product>::new(catalog, "/products/a1");

    let first = ctx.load(&product).await.unwrap();
    let second = ctx.load(&product).await.unwrap();

    assert_eq!(*first, Product { sku: "a1".into(), price: 250 });
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(backend.hits(), 1);
    assert!(ctx.is_cached("catalog:/products/a1"));
}

#[tokio::test]
async fn test_failed_load_is_retried_on_next_call() {
    let backend = common::start_mock_backend(404, r#"{"error":"missing"}"#).await;
    let catalog = client("catalog", &backend, 3);
    let ctx = RequestContext::with_call(CallContext::background());
    let product = JsonResource::<Product>::new(catalog, "/products/zz");

    for _ in 0..2 {
        let err = ctx.load(&product).await.unwrap_err();
        assert!(matches!(err, ContextError::Fetch { .. }));
    }
    assert_eq!(backend.hits(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_fan_out_within_one_request() {
    let backend = common::start_programmable_backend(|req| async move {
        let sku = req.path.rsplit('/').next().unwrap_or_default().to_string();
        (200, format!(r#"{{"sku":"{}","price":1}}"#, sku))
    })
    .await;
    let catalog = client("catalog", &backend, 3);
    let ctx = Arc::new(RequestContext::with_call(CallContext::background()));

    let mut handles = Vec::new();
    for i in 0..20 {
        let ctx = ctx.clone();
        let product = JsonResource::<Product>::new(catalog.clone(), format!("/products/p{}", i));
        handles.push(tokio::spawn(async move { ctx.load(&product).await.map(|p| p.sku.clone()) }));
    }

    for (i, handle) in handles.into_iter().enumerate() {
        assert_eq!(handle.await.unwrap().unwrap(), format!("p{}", i));
    }
    assert_eq!(backend.hits(), 20);
}

#[tokio::test]
async fn test_failed_commit_compensates_through_client() {
    let inventory_backend = common::start_mock_backend(200, "{}").await;
    let payments_backend = common::start_mock_backend(500, "declined").await;
    let inventory = client("inventory", &inventory_backend, 1);
    let payments = client("payments", &payments_backend, 1);

    let ctx = RequestContext::with_call(CallContext::background().with_request_id("order-1"));

    let (reserve, release) = (inventory.clone(), inventory.clone());
    ctx.add_action(FnAction::new(
        "reserve inventory",
        move |call: CallContext| {
            let client = reserve.clone();
            async move {
                client.post(&call, "/reservations/o1", "{}").await?;
                Ok::<(), BoxError>(())
            }
        },
        move |call: CallContext| {
            let client = release.clone();
            async move {
                client.delete(&call, "/reservations/o1").await?;
                Ok::<(), BoxError>(())
            }
        },
    ))
    .unwrap();

    let charge = payments.clone();
    ctx.add_action(FnAction::new(
        "charge payment",
        move |call: CallContext| {
            let client = charge.clone();
            async move {
                client.post(&call, "/charges", "{}").await?;
                Ok::<(), BoxError>(())
            }
        },
        |_| async { Ok::<(), BoxError>(()) },
    ))
    .unwrap();

    let err = ctx.commit().await.unwrap_err();
    match &err {
        ContextError::ActionFailed {
            index,
            description,
            rollback,
            ..
        } => {
            assert_eq!(*index, 1);
            assert_eq!(description, "charge payment");
            assert_eq!(rollback.rolled_back, vec!["reserve inventory"]);
            assert!(rollback.is_clean());
        }
        other => panic!("unexpected error: {other}"),
    }

    let calls: Vec<_> = inventory_backend
        .requests()
        .into_iter()
        .map(|r| {
            let request_id = r.header("x-request-id").map(str::to_string);
            (r.method, r.path, request_id)
        })
        .collect();
    assert_eq!(
        calls,
        vec![
            ("POST".to_string(), "/reservations/o1".to_string(), Some("order-1".to_string())),
            ("DELETE".to_string(), "/reservations/o1".to_string(), Some("order-1".to_string())),
        ]
    );
    assert_eq!(payments_backend.hits(), 1);
    assert!(ctx.commit().await.unwrap_err().is_already_committed());
}
