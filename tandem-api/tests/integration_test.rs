use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use chrono::Utc;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use tandem_api::metrics::Metrics;
use tandem_api::middleware::Claims;
use tandem_api::{app, AppState, AuthConfig, Repositories};
use tandem_core::payment::MockPaymentGateway;
use tandem_core::repository::{LedgerRepository, PhaseLevelRepository};
use tandem_core::{AppSettings, PhaseLevel, Profile, ProfileRole, Subscription, SubscriptionStatus};
use tandem_store::InMemoryStore;

const JWT_SECRET: &str = "test-secret";
const WEBHOOK_SECRET: &str = "hook-secret";
const CSRF: &str = "csrf-123";

struct TestApp {
    router: Router,
    store: InMemoryStore,
    sponsor: Uuid,
    buyer: Uuid,
    admin: Uuid,
}

async fn setup() -> TestApp {
    let store = InMemoryStore::new();
    store
        .upsert_phase_level(&PhaseLevel {
            phase: 1,
            name: "Starter".into(),
            direct_rate_bps: 1000,
            network_rate_bps: 200,
            max_depth: 3,
            is_active: true,
        })
        .await
        .unwrap();

    let sponsor = Profile::new("sponsor@example.com".into(), "SPONSOR".into(), None);
    let buyer = Profile::new("buyer@example.com".into(), "BUYER".into(), Some(sponsor.id));
    let mut admin = Profile::new("admin@example.com".into(), "ADMIN".into(), None);
    admin.role = ProfileRole::Admin;
    let ids = (sponsor.id, buyer.id, admin.id);

    store.insert_subscription(Subscription::new(sponsor.id, SubscriptionStatus::Active, 1)).await;
    store.insert_profile(sponsor).await;
    store.insert_profile(buyer).await;
    store.insert_profile(admin).await;

    let defaults = AppSettings {
        maintenance_mode: false,
        coming_soon: false,
        max_commission_levels: 5,
        strict_referrals: true,
        min_payout_cents: 500,
        currency: "USD".into(),
        updated_at: Utc::now(),
    };
    let state = AppState::new(
        Repositories::in_memory(store.clone()),
        Arc::new(MockPaymentGateway),
        Arc::new(Metrics::new().unwrap()),
        AuthConfig { secret: JWT_SECRET.into() },
        WEBHOOK_SECRET.into(),
        defaults,
    );

    TestApp { router: app(state), store, sponsor: ids.0, buyer: ids.1, admin: ids.2 }
}

fn token(user_id: Uuid, role: &str) -> String {
    let claims = Claims {
        sub: user_id.to_string(),
        role: role.to_string(),
        exp: (Utc::now().timestamp() + 3600) as usize,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(JWT_SECRET.as_bytes())).unwrap()
}

fn request(method: Method, uri: &str, user: Option<(Uuid, &str)>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-csrf-token", CSRF)
        .header(header::COOKIE, format!("csrf_token={}", CSRF));
    if let Some((id, role)) = user {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token(id, role)));
    }
    let body = body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty);
    builder.body(body).unwrap()
}

fn webhook(tx: &str, user_id: Uuid, affiliate_id: Option<Uuid>) -> Request<Body> {
    referred_webhook(tx, user_id, affiliate_id, None)
}

fn referred_webhook(tx: &str, user_id: Uuid, affiliate_id: Option<Uuid>, referral_code: Option<&str>) -> Request<Body> {
    let payload = json!({
        "type": "payment.succeeded",
        "data": {
            "user_id": user_id,
            "gateway": "stripe",
            "gateway_transaction_id": tx,
            "currency": "USD",
            "items": [{ "product_id": Uuid::new_v4(), "name": "Serum", "quantity": 2, "unit_price_cents": 5000 }],
            "subtotal_cents": 10000,
            "shipping_cents": 500,
            "affiliate_id": affiliate_id,
            "referral_code": referral_code,
        }
    });
    Request::builder()
        .method(Method::POST)
        .uri("/api/payments/webhook")
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-webhook-secret", WEBHOOK_SECRET)
        .body(Body::from(payload.to_string()))
        .unwrap()
}

async fn send(router: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn test_health_is_public() {
    let t = setup().await;
    let (status, body) = send(&t.router, request(Method::GET, "/health", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_webhook_creates_order_once_and_credits_sponsor() {
    let t = setup().await;

    let (status, body) = send(&t.router, webhook("pi_100", t.buyer, Some(t.sponsor))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "created");
    assert_eq!(body["commission_status"], "calculated");
    let order_id = body["order_id"].clone();

    let (status, body) = send(&t.router, webhook("pi_100", t.buyer, Some(t.sponsor))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "already_processed");
    assert_eq!(body["order_id"], order_id);

    let wallet = t.store.get_wallet(t.sponsor).await.unwrap().unwrap();
    assert_eq!(wallet.balance_cents, 1_000);

    let response = t.router.clone().oneshot(request(Method::GET, "/metrics", None, None)).await.unwrap();
    let text = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(text.to_vec()).unwrap();
    assert!(text.contains("tandem_orders_created_total 1"));
    assert!(text.contains("tandem_orders_duplicate_total 1"));
}

#[tokio::test]
async fn test_webhook_rejects_bad_secret_and_self_referral() {
    let t = setup().await;

    let mut req = webhook("pi_200", t.buyer, None);
    req.headers_mut().insert("x-webhook-secret", "wrong".parse().unwrap());
    let (status, _) = send(&t.router, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(&t.router, webhook("pi_201", t.buyer, Some(t.buyer))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("own order"));
}

#[tokio::test]
async fn test_webhook_rejects_unusable_referrals() {
    let t = setup().await;

    let stranger = Uuid::new_v4();
    let (status, body) = send(&t.router, webhook("pi_210", t.buyer, Some(stranger))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("Unknown affiliate"));

    let waiting = Profile::new("waiting@example.com".into(), "WAITING".into(), None);
    let waiting_id = waiting.id;
    t.store.insert_subscription(Subscription::new(waiting_id, SubscriptionStatus::Waitlisted, 1)).await;
    t.store.insert_profile(waiting).await;
    let (status, body) = send(&t.router, webhook("pi_211", t.buyer, Some(waiting_id))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("waitlist"));

    let (status, body) =
        send(&t.router, referred_webhook("pi_212", t.buyer, Some(t.sponsor), Some("NOT-SPONSOR"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("does not belong"));

    // Nothing was stored or credited for any of them
    for tx in ["pi_210", "pi_211", "pi_212"] {
        let (status, body) = send(&t.router, webhook(tx, t.buyer, None)).await;
        assert_eq!(status, StatusCode::CREATED, "{} should be new", tx);
        assert_eq!(body["status"], "created");
    }
    assert!(t.store.get_wallet(waiting_id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_webhook_validation_errors_list_issues() {
    let t = setup().await;
    let payload = json!({
        "type": "payment.succeeded",
        "data": {
            "user_id": t.buyer,
            "gateway": "stripe",
            "gateway_transaction_id": "pi_300",
            "currency": "USD",
            "items": [],
            "subtotal_cents": 10,
        }
    });
    let req = Request::builder()
        .method(Method::POST)
        .uri("/api/payments/webhook")
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-webhook-secret", WEBHOOK_SECRET)
        .body(Body::from(payload.to_string()))
        .unwrap();

    let (status, body) = send(&t.router, req).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(!body["issues"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_profile_routes_require_auth_and_csrf() {
    let t = setup().await;
    send(&t.router, webhook("pi_400", t.buyer, Some(t.sponsor))).await;

    let (status, _) = send(&t.router, request(Method::GET, "/api/profile/summary", None, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) =
        send(&t.router, request(Method::GET, "/api/profile/summary", Some((t.sponsor, "member")), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["wallet"]["balance_cents"], 1_000);
    assert_eq!(body["direct_referrals"], 1);

    let payout = json!({ "amount_cents": 600, "request_id": Uuid::new_v4() });
    let mut no_csrf = request(Method::POST, "/api/profile/payouts", Some((t.sponsor, "member")), Some(payout.clone()));
    no_csrf.headers_mut().remove("x-csrf-token");
    let (status, _) = send(&t.router, no_csrf).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) =
        send(&t.router, request(Method::POST, "/api/profile/payouts", Some((t.sponsor, "member")), Some(payout))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["balance_after_cents"], 400);

    let too_much = json!({ "amount_cents": 5_000, "request_id": Uuid::new_v4() });
    let (status, _) =
        send(&t.router, request(Method::POST, "/api/profile/payouts", Some((t.sponsor, "member")), Some(too_much))).await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
}

#[tokio::test]
async fn test_recharge_confirmation_is_idempotent() {
    let t = setup().await;
    let body = json!({ "gateway_transaction_id": format!("mock_{}_2500", t.buyer) });

    for _ in 0..2 {
        let (status, _) = send(
            &t.router,
            request(Method::POST, "/api/profile/recharge/confirm", Some((t.buyer, "member")), Some(body.clone())),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (_, wallet) = send(&t.router, request(Method::GET, "/api/profile/wallet", Some((t.buyer, "member")), None)).await;
    assert_eq!(wallet["wallet"]["balance_cents"], 2_500);
    assert_eq!(wallet["transactions"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_admin_routes_require_admin_role() {
    let t = setup().await;

    let (status, _) =
        send(&t.router, request(Method::GET, "/api/admin/app-settings", Some((t.buyer, "member")), None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) =
        send(&t.router, request(Method::GET, "/api/admin/app-settings", Some((t.admin, "admin")), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["max_commission_levels"], 5);
}

#[tokio::test]
async fn test_maintenance_mode_gates_member_routes() {
    let t = setup().await;
    let admin = Some((t.admin, "admin"));

    let (status, _) = send(
        &t.router,
        request(Method::PATCH, "/api/admin/app-settings", admin, Some(json!({ "maintenance_mode": true }))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) =
        send(&t.router, request(Method::GET, "/api/profile/summary", Some((t.buyer, "member")), None)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    // Payments keep flowing during maintenance
    let (status, _) = send(&t.router, webhook("pi_500", t.buyer, None)).await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_coming_soon_gates_member_routes() {
    let t = setup().await;
    let admin = Some((t.admin, "admin"));

    let (status, body) = send(
        &t.router,
        request(Method::PATCH, "/api/admin/app-settings", admin, Some(json!({ "coming_soon": true }))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["coming_soon"], true);

    let (status, body) =
        send(&t.router, request(Method::GET, "/api/profile/summary", Some((t.buyer, "member")), None)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["error"].as_str().unwrap().contains("Coming soon"));

    // The back-office stays open so the launch can be switched on
    let (status, _) = send(
        &t.router,
        request(Method::PATCH, "/api/admin/app-settings", admin, Some(json!({ "coming_soon": false }))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) =
        send(&t.router, request(Method::GET, "/api/profile/summary", Some((t.buyer, "member")), None)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_refund_reverses_commissions() {
    let t = setup().await;
    let admin = Some((t.admin, "admin"));
    let (_, created) = send(&t.router, webhook("pi_600", t.buyer, Some(t.sponsor))).await;
    let order_id = created["order_id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &t.router,
        request(Method::PATCH, &format!("/api/admin/orders/{}/status", order_id), admin, Some(json!({ "status": "refunded" }))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["order"]["commission_status"], "reversed");

    let (status, _) = send(
        &t.router,
        request(Method::PATCH, &format!("/api/admin/orders/{}/status", order_id), admin, Some(json!({ "status": "shipped" }))),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, body) = send(
        &t.router,
        request(Method::GET, &format!("/api/admin/orders/{}/commissions", order_id), admin, None),
    )
    .await;
    assert_eq!(body["commissions"][0]["status"], "reversed");
    assert_eq!(t.store.get_wallet(t.sponsor).await.unwrap().unwrap().balance_cents, 0);
}

#[tokio::test]
async fn test_phase_level_crud() {
    let t = setup().await;
    let admin = Some((t.admin, "admin"));

    let bad = json!({ "phase": 2, "name": "", "direct_rate_bps": 20000, "network_rate_bps": 100, "max_depth": 2 });
    let (status, body) = send(&t.router, request(Method::POST, "/api/admin/phase-levels", admin, Some(bad))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["issues"].as_array().unwrap().len(), 2);

    let good = json!({ "phase": 2, "name": "Leader", "direct_rate_bps": 1500, "network_rate_bps": 300, "max_depth": 4 });
    let (status, _) = send(&t.router, request(Method::POST, "/api/admin/phase-levels", admin, Some(good.clone()))).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = send(&t.router, request(Method::POST, "/api/admin/phase-levels", admin, Some(good))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(&t.router, request(Method::DELETE, "/api/admin/phase-levels/2", admin, None)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&t.router, request(Method::DELETE, "/api/admin/phase-levels/2", admin, None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_fulfillment_report_and_retry() {
    let t = setup().await;
    let admin = Some((t.admin, "admin"));
    send(&t.router, webhook("pi_700", t.buyer, Some(t.sponsor))).await;

    let (status, report) = send(&t.router, request(Method::GET, "/api/admin/reports/fulfillment", admin, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["order_count"], 1);
    assert_eq!(report["totals"]["paid"]["total_cents"], 10_500);

    let (status, summary) = send(&t.router, request(Method::POST, "/api/admin/commissions/retry", admin, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["attempted"], 0);
}
