//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use domain::{FeeSchedule, OrderEvent, Recipient, RecordingSink};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{Value, json};
use store::InMemoryStore;
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

fn setup() -> (Router, RecordingSink) {
    let sink = RecordingSink::new();
    let state = api::create_state(
        InMemoryStore::new(),
        "memory",
        FeeSchedule::default(),
        Arc::new(sink.clone()),
    );
    (api::create_app(state, get_metrics_handle()), sink)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

async fn post(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    send(
        app,
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    send(app, Request::builder().uri(uri).body(Body::empty()).unwrap()).await
}

fn new_id() -> String {
    common::UserId::new().to_string()
}

async fn register_driver(app: &Router, verified: bool) -> String {
    let driver = new_id();
    let (status, _) = post(
        app,
        "/drivers",
        json!({ "user_id": driver, "is_verified": verified, "is_online": true }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    driver
}

/// Places a paid order for 100.00 plus 10.00 delivery and returns `(order_id, vendor_id)`.
async fn place_paid_order(app: &Router) -> (String, String) {
    let vendor = new_id();
    let (status, json) = post(
        app,
        "/orders",
        json!({
            "vendor_id": vendor,
            "customer_id": new_id(),
            "gross_total": 10000,
            "delivery_fee": 1000,
            "paid": true,
            "otp_code": "7312"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["success"], true);
    assert_eq!(json["data"]["status"], "PAID");
    (json["data"]["id"].as_str().unwrap().to_string(), vendor)
}

async fn set_status(app: &Router, order_id: &str, body: Value) -> (StatusCode, Value) {
    post(app, &format!("/orders/{order_id}/status"), body).await
}

#[tokio::test]
async fn test_health_check() {
    let (app, _) = setup();

    let (status, json) = get(&app, "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["data"]["status"], "ok");
    assert_eq!(json["data"]["store"], "memory");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let (app, _) = setup();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers().get("content-type").unwrap();
    assert!(content_type.to_str().unwrap().starts_with("text/plain"));
}

#[tokio::test]
async fn test_delivery_flow_settles_and_credits_wallets() {
    let (app, _) = setup();
    let driver = register_driver(&app, true).await;
    let (order_id, vendor) = place_paid_order(&app).await;

    let (status, json) = post(
        &app,
        &format!("/orders/{order_id}/assign"),
        json!({ "driver_id": driver }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["kind"], "assigned");

    let driver_actor = json!({ "role": "driver", "id": driver });
    let (status, _) = set_status(
        &app,
        &order_id,
        json!({ "actor": driver_actor, "target_status": "DISPATCHED" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, json) = set_status(
        &app,
        &order_id,
        json!({ "actor": driver_actor, "target_status": "COMPLETED", "otp": "7312" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["changed"], true);
    assert_eq!(json["data"]["order"]["status"], "COMPLETED");
    assert_eq!(json["data"]["settlement"]["settlement"]["vendor_amount"], 9000);
    assert_eq!(json["data"]["settlement"]["earning"]["net_amount"], 900);

    let (status, json) = get(&app, &format!("/wallets/{vendor}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["balance"], 9000);

    let (_, json) = get(&app, &format!("/wallets/{driver}/transactions")).await;
    let rows = json["data"].as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["type"], "EARNING");
    assert_eq!(rows[0]["reference"], format!("earning:{order_id}"));

    let (status, json) = get(&app, &format!("/wallets/{vendor}/reconcile")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["computed_balance"], 9000);
    assert_eq!(json["data"]["cached_balance"], 9000);
}

#[tokio::test]
async fn test_repeated_status_is_a_no_op() {
    let (app, sink) = setup();
    let (order_id, _) = place_paid_order(&app).await;
    let body = json!({ "actor": { "role": "system" }, "target_status": "PROCESSING" });

    let (_, first) = set_status(&app, &order_id, body.clone()).await;
    let (status, second) = set_status(&app, &order_id, body).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["data"]["changed"], false);
    assert_eq!(first["data"]["timestamp"], second["data"]["timestamp"]);
    assert_eq!(sink.notifications().len(), 1);
}

#[tokio::test]
async fn test_invalid_transition_returns_conflict_envelope() {
    let (app, _) = setup();
    let (order_id, _) = place_paid_order(&app).await;

    let (status, json) = set_status(
        &app,
        &order_id,
        json!({ "actor": { "role": "system" }, "target_status": "COMPLETED" }),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["success"], false);
    assert!(json["data"].is_null());
    assert!(json["message"].as_str().unwrap().contains("PAID"));
}

#[tokio::test]
async fn test_vendor_cannot_refund() {
    let (app, _) = setup();
    let (order_id, vendor) = place_paid_order(&app).await;

    let (status, json) = set_status(
        &app,
        &order_id,
        json!({ "actor": { "role": "vendor", "id": vendor }, "target_status": "REFUNDED" }),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["success"], false);
}

#[tokio::test]
async fn test_reassignment_notifies_both_drivers() {
    let (app, sink) = setup();
    let first = register_driver(&app, true).await;
    let second = register_driver(&app, true).await;
    let (order_id, _) = place_paid_order(&app).await;
    post(
        &app,
        &format!("/orders/{order_id}/assign"),
        json!({ "driver_id": first }),
    )
    .await;
    sink.clear();

    let (status, json) = post(
        &app,
        &format!("/orders/{order_id}/reassign"),
        json!({ "driver_id": second, "reason": "vehicle breakdown" }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["kind"], "reassigned");
    assert_eq!(json["data"]["previous_driver"], first);

    let first_id = first.parse().unwrap();
    let second_id = second.parse().unwrap();
    let to_first = sink.for_recipient(Recipient::Driver(first_id));
    let to_second = sink.for_recipient(Recipient::Driver(second_id));
    assert_eq!(to_first.len(), 1);
    assert_eq!(to_first[0].event, OrderEvent::Cancelled);
    assert_eq!(to_second.len(), 1);
    assert_eq!(to_second[0].event, OrderEvent::Reassigned);

    let (status, json) = post(
        &app,
        &format!("/orders/{order_id}/reassign"),
        json!({ "driver_id": second }),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["success"], false);
}

#[tokio::test]
async fn test_unverified_driver_is_rejected() {
    let (app, _) = setup();
    let driver = register_driver(&app, false).await;
    let (order_id, _) = place_paid_order(&app).await;

    let (status, json) = post(
        &app,
        &format!("/orders/{order_id}/assign"),
        json!({ "driver_id": driver }),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(json["message"].as_str().unwrap().contains("not verified"));
}

#[tokio::test]
async fn test_payout_lifecycle() {
    let (app, _) = setup();
    let (order_id, vendor) = place_paid_order(&app).await;
    for target in ["DISPATCHED", "COMPLETED"] {
        let (status, _) = set_status(
            &app,
            &order_id,
            json!({ "actor": { "role": "system" }, "target_status": target }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, json) = post(
        &app,
        "/payouts",
        json!({ "account_id": vendor, "amount": 9001, "reference": "wd-1" }),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["success"], false);

    let (status, json) = post(
        &app,
        "/payouts",
        json!({ "account_id": vendor, "amount": 4000, "reference": "wd-1" }),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(json["data"]["payout"]["status"], "PENDING");
    assert_eq!(json["data"]["created"], true);

    let (status, json) = post(
        &app,
        "/payouts",
        json!({ "account_id": vendor, "amount": 4000, "reference": "wd-1" }),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(json["data"]["created"], false);

    let (_, json) = get(&app, &format!("/wallets/{vendor}")).await;
    assert_eq!(json["data"]["balance"], 5000);

    let (status, json) = post(&app, "/payouts/wd-1/fail", json!({ "reason": "bank down" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["status"], "FAILED");

    let (_, json) = get(&app, &format!("/wallets/{vendor}")).await;
    assert_eq!(json["data"]["balance"], 9000);

    let (status, _) = post(&app, "/payouts/wd-1/complete", json!({})).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_bad_input_returns_bad_request_envelope() {
    let (app, _) = setup();

    let (status, json) = get(&app, "/orders/not-a-uuid").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["success"], false);

    let (status, json) = post(&app, "/orders", json!({ "vendor_id": "x" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["success"], false);
}

#[tokio::test]
async fn test_out_of_range_totals_are_rejected() {
    let (app, _) = setup();

    for (gross_total, delivery_fee, coupon_discount) in
        [(i64::MIN, 0, 1), (i64::MAX, 1, 0), (100, 0, 200)]
    {
        let (status, json) = post(
            &app,
            "/orders",
            json!({
                "vendor_id": new_id(),
                "customer_id": new_id(),
                "gross_total": gross_total,
                "delivery_fee": delivery_fee,
                "coupon_discount": coupon_discount,
                "paid": true
            }),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json["success"], false);
    }
}

#[tokio::test]
async fn test_unknown_resources_return_not_found() {
    let (app, _) = setup();

    let (status, _) = get(&app, &format!("/orders/{}", new_id())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = get(&app, &format!("/wallets/{}", new_id())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = get(&app, "/payouts/missing").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
