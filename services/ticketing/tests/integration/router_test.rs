use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

use gather_core::middleware::REQUEST_ID_HEADER;
use gather_domain::fee::FeeSchedule;
use gather_domain::rate_limit::RateLimitPolicy;
use gather_testing::auth::MockAuth;
use gather_testing::webhook::{SIGNATURE_HEADER, sign};
use gather_ticketing::config::TicketingConfig;
use gather_ticketing::router::build_router;
use gather_ticketing::state::AppState;

const WEBHOOK_SECRET: &str = "whsec_test";
const WORKER_TOKEN: &str = "worker-token";

fn config(webhook_secret: Option<&str>) -> TicketingConfig {
    TicketingConfig {
        database_url: "postgres://localhost/unused".to_owned(),
        redis_url: "redis://127.0.0.1:1".to_owned(),
        ticketing_port: 0,
        payment_api_key: "sk_test".to_owned(),
        payment_api_base: "http://127.0.0.1:1".to_owned(),
        payment_webhook_secret: webhook_secret.map(str::to_owned),
        email_api_key: "re_test".to_owned(),
        email_api_base: "http://127.0.0.1:1".to_owned(),
        email_from: "tickets@gather.example".to_owned(),
        public_base_url: "https://gather.example".to_owned(),
        worker_bearer_token: WORKER_TOKEN.to_owned(),
        sentinel_account_id: None,
        fee_schedule: FeeSchedule::v1(1_000, 0),
        currency: "gbp".to_owned(),
        checkout_rate_limit: RateLimitPolicy::default(),
        worker_concurrency: 1,
        worker_window_secs: 0,
    }
}

/// Router over a disconnected database; only paths that stop before I/O succeed.
fn router(webhook_secret: Option<&str>) -> Router {
    let config = config(webhook_secret);
    let redis = deadpool_redis::Config::from_url(&config.redis_url)
        .create_pool(Some(deadpool_redis::Runtime::Tokio1))
        .unwrap();
    build_router(AppState {
        db: DatabaseConnection::default(),
        redis,
        http: reqwest::Client::new(),
        config: Arc::new(config),
    })
}

async fn send(router: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

fn webhook_request(body: &str, signature: Option<String>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/webhooks/payment")
        .header("content-type", "application/json");
    if let Some(signature) = signature {
        builder = builder.header(SIGNATURE_HEADER, signature);
    }
    builder.body(Body::from(body.to_owned())).unwrap()
}

fn checkout_body(quantity: i64, guest_email: Option<&str>) -> Body {
    let mut body = serde_json::json!({
        "event_id": Uuid::new_v4(),
        "ticket_uuid": Uuid::new_v4(),
        "quantity": quantity,
        "guest_name": "Ana",
    });
    if let Some(email) = guest_email {
        body["guest_email"] = Value::from(email);
    }
    Body::from(body.to_string())
}

// ── Health ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn should_report_live_and_tag_request_id() {
    let response = router(None)
        .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key(REQUEST_ID_HEADER));
}

#[tokio::test]
async fn should_report_not_ready_without_database() {
    let (status, _) = send(
        router(None),
        Request::get("/readyz").body(Body::empty()).unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

// ── Webhook ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn should_reject_unsigned_webhook() {
    let (status, json) = send(
        router(Some(WEBHOOK_SECRET)),
        webhook_request(r#"{"type":"invoice.paid","data":{"object":{}}}"#, None),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["kind"], "INVALID_SIGNATURE");
}

#[tokio::test]
async fn should_reject_webhook_signed_with_other_secret() {
    let body = r#"{"type":"invoice.paid","data":{"object":{}}}"#;
    let signature = sign(body.as_bytes(), "whsec_other", Utc::now().timestamp());

    let (status, json) = send(
        router(Some(WEBHOOK_SECRET)),
        webhook_request(body, Some(signature)),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["kind"], "INVALID_SIGNATURE");
}

#[tokio::test]
async fn should_reject_every_webhook_when_secret_unset() {
    let body = r#"{"type":"invoice.paid","data":{"object":{}}}"#;
    let signature = sign(body.as_bytes(), WEBHOOK_SECRET, Utc::now().timestamp());

    let (status, _) = send(router(None), webhook_request(body, Some(signature))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn should_reject_signed_but_malformed_payload() {
    let body = r#"{"type":"checkout.session.completed","data":{"object":{}}}"#;
    let signature = sign(body.as_bytes(), WEBHOOK_SECRET, Utc::now().timestamp());

    let (status, json) = send(
        router(Some(WEBHOOK_SECRET)),
        webhook_request(body, Some(signature)),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["kind"], "INVALID_PAYLOAD");
}

#[tokio::test]
async fn should_acknowledge_signed_unhandled_event() {
    let body = r#"{"id":"evt_1","type":"invoice.paid","data":{"object":{}}}"#;
    let signature = sign(body.as_bytes(), WEBHOOK_SECRET, Utc::now().timestamp());

    let (status, json) = send(
        router(Some(WEBHOOK_SECRET)),
        webhook_request(body, Some(signature)),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["received"], true);
}

// ── Worker trigger ───────────────────────────────────────────────────────────

#[tokio::test]
async fn should_require_worker_bearer_token() {
    let (status, _) = send(
        router(None),
        Request::get("/workers/process-reminders")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(
        router(None),
        Request::get("/workers/process-reminders")
            .header("authorization", "Bearer not-the-token")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn should_return_summary_for_empty_window() {
    let (status, json) = send(
        router(None),
        Request::get("/workers/process-reminders")
            .header("authorization", format!("Bearer {WORKER_TOKEN}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(
        json["message"],
        "processed 0 jobs (0 succeeded, 0 skipped, 0 failed)"
    );
    assert!(json["timestamp"].as_str().unwrap().ends_with('Z'));
}

// ── Checkout ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn should_require_identity_for_member_checkout() {
    let (status, _) = send(
        router(None),
        Request::post("/checkout/create-session")
            .header("content-type", "application/json")
            .body(checkout_body(1, None))
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn should_validate_member_quantity_before_any_lookup() {
    let mut request = Request::post("/checkout/create-session")
        .header("content-type", "application/json")
        .body(checkout_body(11, None))
        .unwrap();
    request
        .headers_mut()
        .extend(MockAuth::member(Uuid::new_v4()).headers());

    let (status, json) = send(router(None), request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["success"], false);
    assert_eq!(json["kind"], "INVALID_QUANTITY");
}

#[tokio::test]
async fn should_reject_guest_checkout_with_bad_quantity() {
    let (status, json) = send(
        router(None),
        Request::post("/checkout/create-guest-session")
            .header("content-type", "application/json")
            .body(checkout_body(0, Some("ana@example.com")))
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["kind"], "INVALID_QUANTITY");
}

#[tokio::test]
async fn should_require_guest_email() {
    let (status, json) = send(
        router(None),
        Request::post("/checkout/create-guest-session")
            .header("content-type", "application/json")
            .body(checkout_body(1, None))
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["kind"], "INVALID_REQUEST");
    assert_eq!(json["error"], "a valid guest_email is required");
}

#[tokio::test]
async fn should_reject_malformed_checkout_body() {
    let (status, json) = send(
        router(None),
        Request::post("/checkout/create-guest-session")
            .header("content-type", "application/json")
            .body(Body::from("{"))
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["kind"], "INVALID_REQUEST");
}
