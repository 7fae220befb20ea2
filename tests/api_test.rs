//! Integration tests for the HTTP surface
//!
//! Tests cover:
//! - Payment initiation status codes
//! - Webhook delivery outcomes
//! - Health probes

mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

use common::*;
use storefront_payments::api::{router, AppState};
use storefront_payments::database::memory::{InMemoryOrderStore, InMemoryTransactionStore};
use storefront_payments::database::models::{Order, PaymentStatus, TransactionStatus};
use storefront_payments::database::repository::{OrderStore, TransactionStore};
use storefront_payments::health::HealthChecker;
use storefront_payments::services::payment_initiation::PaymentInitiationService;

struct TestApp {
    app: Router,
    transactions: Arc<InMemoryTransactionStore>,
    orders: Arc<InMemoryOrderStore>,
}

fn create_test_app() -> TestApp {
    let transactions = Arc::new(InMemoryTransactionStore::new());
    let orders = Arc::new(InMemoryOrderStore::new());
    let engine = Arc::new(engine_with(
        transactions.clone(),
        orders.clone(),
        fast_retries(),
    ));
    let initiation = Arc::new(PaymentInitiationService::new(
        transactions.clone(),
        orders.clone(),
        Arc::new(FakePaystack),
        None,
    ));
    let app = router(AppState {
        initiation,
        reconciliation: engine,
        health_checker: HealthChecker::new(transactions.clone(), orders.clone()),
    });
    TestApp {
        app,
        transactions,
        orders,
    }
}

async fn body_json(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn initiate_request(store_id: Option<Uuid>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/payments/initiate")
        .header("content-type", "application/json");
    if let Some(store_id) = store_id {
        builder = builder.header("x-store-id", store_id.to_string());
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn webhook_request(body: Vec<u8>, signature: Option<String>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/webhooks/paystack")
        .header("content-type", "application/json");
    if let Some(signature) = signature {
        builder = builder.header("x-paystack-signature", signature);
    }
    builder.body(Body::from(body)).unwrap()
}

async fn seeded_order(t: &TestApp, total: &str) -> Order {
    let order = Order::new(Uuid::new_v4(), "ORD-1", dec(total), "NGN");
    t.orders.insert(order.clone()).await;
    order
}

#[tokio::test]
async fn test_initiate_payment_returns_authorization() {
    let t = create_test_app();
    let order = seeded_order(&t, "25000").await;

    let response = t
        .app
        .clone()
        .oneshot(initiate_request(
            Some(order.store_id),
            json!({
                "orderId": order.id,
                "email": "buyer@example.com",
                "amount": 25000,
                "currency": "NGN"
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    assert!(response.headers().contains_key("x-request-id"));
    let json = body_json(response).await;
    let reference = json["reference"].as_str().unwrap();
    assert!(reference.starts_with("ORD-1-"));
    assert_eq!(json["access_code"], "ac_test");
    assert!(json["authorization_url"].as_str().unwrap().ends_with(reference));

    let tx = t.transactions.find_by_reference(reference).await.unwrap().unwrap();
    assert_eq!(tx.status, TransactionStatus::Pending);
    assert_eq!(tx.order_id, order.id);
}

#[tokio::test]
async fn test_initiate_payment_validation_errors() {
    let t = create_test_app();
    let order = seeded_order(&t, "100").await;

    let missing_email = t
        .app
        .clone()
        .oneshot(initiate_request(
            Some(order.store_id),
            json!({ "orderId": order.id, "amount": 100, "currency": "NGN" }),
        ))
        .await
        .unwrap();
    assert_eq!(missing_email.status(), StatusCode::BAD_REQUEST);
    let json = body_json(missing_email).await;
    assert_eq!(json["error"], "VALIDATION_ERROR");
    assert_eq!(json["details"]["field"], "email");

    let no_store = t
        .app
        .clone()
        .oneshot(initiate_request(
            None,
            json!({ "orderId": order.id, "email": "a@b.co", "amount": 100, "currency": "NGN" }),
        ))
        .await
        .unwrap();
    assert_eq!(no_store.status(), StatusCode::BAD_REQUEST);

    let wrong_amount = t
        .app
        .clone()
        .oneshot(initiate_request(
            Some(order.store_id),
            json!({ "orderId": order.id, "email": "a@b.co", "amount": 99, "currency": "NGN" }),
        ))
        .await
        .unwrap();
    assert_eq!(wrong_amount.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(wrong_amount).await["details"]["field"], "amount");

    let not_json = Request::builder()
        .method("POST")
        .uri("/api/payments/initiate")
        .header("content-type", "application/json")
        .header("x-store-id", order.store_id.to_string())
        .body(Body::from("{"))
        .unwrap();
    let response = t.app.clone().oneshot(not_json).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    assert!(t.transactions.all().await.is_empty());
}

#[tokio::test]
async fn test_initiate_payment_unknown_or_foreign_order_is_not_found() {
    let t = create_test_app();
    let order = seeded_order(&t, "100").await;

    for (store_id, order_id) in [(order.store_id, Uuid::new_v4()), (Uuid::new_v4(), order.id)] {
        let response = t
            .app
            .clone()
            .oneshot(initiate_request(
                Some(store_id),
                json!({ "orderId": order_id, "email": "a@b.co", "amount": 100, "currency": "NGN" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["error"], "ORDER_NOT_FOUND");
    }
}

#[tokio::test]
async fn test_initiate_payment_for_paid_order_conflicts() {
    let t = create_test_app();
    let mut order = Order::new(Uuid::new_v4(), "ORD-2", dec("100"), "NGN");
    order.payment_status = PaymentStatus::Paid;
    t.orders.insert(order.clone()).await;

    let response = t
        .app
        .clone()
        .oneshot(initiate_request(
            Some(order.store_id),
            json!({ "orderId": order.id, "email": "a@b.co", "amount": 100, "currency": "NGN" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(response).await["error"], "ORDER_ALREADY_PAID");
}

#[tokio::test]
async fn test_webhook_delivery_and_redelivery() {
    let t = create_test_app();
    let order = seeded_order(&t, "25000").await;
    add_transaction(&t.transactions, &order, "ref-1").await;
    let body = charge_event("charge.success", "ref-1", "success", 2_500_000);

    let response = t
        .app
        .clone()
        .oneshot(webhook_request(body.clone(), Some(sign(&body))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({ "status": "applied" }));

    let response = t
        .app
        .clone()
        .oneshot(webhook_request(body.clone(), Some(sign(&body))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({ "status": "duplicate" }));

    let stored = t.orders.find_by_id(order.id).await.unwrap().unwrap();
    assert_eq!(stored.payment_status, PaymentStatus::Paid);
    assert_eq!(t.orders.writes(), 1);
}

#[tokio::test]
async fn test_webhook_with_bad_signature_is_rejected() {
    let t = create_test_app();
    let order = seeded_order(&t, "100").await;
    add_transaction(&t.transactions, &order, "ref-2").await;
    let body = charge_event("charge.success", "ref-2", "success", 10_000);

    let response = t
        .app
        .clone()
        .oneshot(webhook_request(body.clone(), Some("0".repeat(128))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "INVALID_SIGNATURE");

    let response = t
        .app
        .clone()
        .oneshot(webhook_request(body, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    assert_eq!(t.orders.writes(), 0);
}

#[tokio::test]
async fn test_webhook_for_unknown_reference_is_not_found() {
    let t = create_test_app();
    let body = charge_event("charge.success", "ref-nope", "success", 10_000);

    let response = t
        .app
        .clone()
        .oneshot(webhook_request(body.clone(), Some(sign(&body))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["error"], "TRANSACTION_NOT_FOUND");
}

#[tokio::test]
async fn test_webhook_dispute_is_acknowledged() {
    let t = create_test_app();
    let body = br#"{"event":"charge.dispute.create","data":{"status":"awaiting-merchant-feedback","transaction":{"reference":"ref-1"}}}"#.to_vec();

    let response = t
        .app
        .clone()
        .oneshot(webhook_request(body.clone(), Some(sign(&body))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({ "status": "ignored" }));
}

#[tokio::test]
async fn test_health_probes() {
    let t = create_test_app();

    let response = t
        .app
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "Healthy");
    assert_eq!(json["checks"]["transactions"]["status"], "Up");

    let response = t
        .app
        .clone()
        .oneshot(Request::builder().uri("/health/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = t
        .app
        .clone()
        .oneshot(Request::builder().uri("/health/live").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&body[..], b"OK");
}
