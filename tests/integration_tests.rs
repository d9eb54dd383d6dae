//! Integration tests for the Campus Market trust service
//!
//! These tests drive the service layer and the HTTP router end to end:
//! registration, verification codes, seller reputation, purchase caps,
//! fraud blocking and the admin surface.

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode},
};
use campus_market::{
    AccountRole, AccountService, AuditEventType, AuditLogger, CodeSender, FraudDetector,
    FraudSeverity, FraudThresholds, FraudType, ListingService, MarketApiState, MarketError,
    MarketStore, MemoryStore, OrderStatus, Principal, PurchaseLimits, ReputationManager,
    SecurityMiddlewareConfig, SecurityState, SessionStore, TrustTier, VerificationChannel,
    VerificationFlag, VerificationManager,
    config::VerificationConfig,
    create_app,
    market::{NewBuyer, NewOrder, NewProduct, NewReview, NewSeller},
};
use chrono::{Duration, Utc};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;
use uuid::Uuid;

const ADMIN_KEY: &str = "integration-admin-key-0001";

// ============================================================================
// Test Helpers
// ============================================================================

/// Gateway that keeps every message so tests can read the codes back
#[derive(Default)]
struct RecordingSender {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingSender {
    fn last_code(&self) -> String {
        let sent = self.sent.lock().unwrap();
        let (_, message) = sent.last().expect("a message was sent");
        message
            .split_whitespace()
            .map(|w| w.trim_end_matches('.'))
            .find(|w| w.len() == 6 && w.chars().all(|c| c.is_ascii_digit()))
            .expect("message carries a code")
            .to_string()
    }

    fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl CodeSender for RecordingSender {
    async fn send(&self, destination: &str, message: &str) -> anyhow::Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((destination.to_string(), message.to_string()));
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

/// Fully wired service graph over an in-memory store
struct TestMarket {
    store: Arc<MemoryStore>,
    sms: Arc<RecordingSender>,
    email: Arc<RecordingSender>,
    audit: Arc<AuditLogger>,
    sessions: Arc<SessionStore>,
    accounts: Arc<AccountService>,
    verification: Arc<VerificationManager>,
    reputation: Arc<ReputationManager>,
    listings: Arc<ListingService>,
    fraud: Arc<FraudDetector>,
}

impl TestMarket {
    fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let dyn_store: Arc<dyn MarketStore> = store.clone();
        let sms = Arc::new(RecordingSender::default());
        let email = Arc::new(RecordingSender::default());
        let audit = Arc::new(AuditLogger::new());
        let sessions = Arc::new(SessionStore::new(Duration::hours(24)));
        let reputation = Arc::new(ReputationManager::new(dyn_store.clone(), audit.clone()));
        let fraud = Arc::new(FraudDetector::new(
            FraudThresholds::default(),
            audit.clone(),
        ));
        let verification = Arc::new(VerificationManager::new(
            &VerificationConfig::default(),
            sms.clone(),
            email.clone(),
            dyn_store.clone(),
            reputation.clone(),
            audit.clone(),
        ));
        let accounts = Arc::new(AccountService::new(
            dyn_store.clone(),
            sessions.clone(),
            audit.clone(),
        ));
        let listings = Arc::new(ListingService::new(
            dyn_store,
            reputation.clone(),
            fraud.clone(),
            PurchaseLimits::default(),
            audit.clone(),
        ));

        Self {
            store,
            sms,
            email,
            audit,
            sessions,
            accounts,
            verification,
            reputation,
            listings,
            fraud,
        }
    }

    fn router(&self) -> Router {
        let security = SecurityState::new(
            SecurityMiddlewareConfig {
                admin_api_key: ADMIN_KEY.to_string(),
                ..Default::default()
            },
            self.sessions.clone(),
        );
        create_app(
            MarketApiState {
                store: self.store.clone(),
                accounts: self.accounts.clone(),
                verification: self.verification.clone(),
                reputation: self.reputation.clone(),
                listings: self.listings.clone(),
                fraud: self.fraud.clone(),
                audit: self.audit.clone(),
            },
            security,
        )
    }

    async fn seller(&self, tag: &str, payment_account: Option<&str>) -> Uuid {
        self.accounts
            .register_seller(NewSeller {
                name: format!("Seller {}", tag),
                email: format!("{}@campus.edu", tag),
                phone: phone_for(tag, '5'),
                password: "password123".to_string(),
                store_name: format!("{} Store", tag),
                campus: Some("North".to_string()),
                business_address: None,
                payment_account: payment_account.map(str::to_string),
            })
            .await
            .expect("seller registers")
            .id
    }

    async fn buyer(&self, tag: &str) -> Uuid {
        self.accounts
            .register_buyer(NewBuyer {
                name: format!("Buyer {}", tag),
                email: format!("{}@campus.edu", tag),
                phone: phone_for(tag, '7'),
                password: "password123".to_string(),
            })
            .await
            .expect("buyer registers")
            .id
    }

    /// Mark a buyer's email, phone and optionally student status as verified
    async fn verify_buyer(&self, buyer_id: Uuid, student: bool) {
        let mut flags = vec![VerificationFlag::Email, VerificationFlag::Phone];
        if student {
            flags.push(VerificationFlag::Student);
        }
        for flag in flags {
            self.store
                .set_verification_flag(AccountRole::Buyer, buyer_id, flag)
                .await
                .unwrap()
                .expect("buyer exists");
        }
    }

    async fn product(&self, seller_id: Uuid, category: &str, price: f64) -> Uuid {
        self.listings
            .create_product(
                seller_id,
                NewProduct {
                    title: format!("{} item", category),
                    category: category.to_string(),
                    price,
                },
            )
            .await
            .expect("product is listed")
            .id
    }
}

/// Distinct 10-digit phone number per tag
fn phone_for(tag: &str, lead: char) -> String {
    let digits: u32 = tag.bytes().map(u32::from).sum();
    format!("{}{:09}", lead, digits)
}

fn buyer(id: Uuid) -> Principal {
    Principal {
        role: AccountRole::Buyer,
        account_id: id,
    }
}

fn seller(id: Uuid) -> Principal {
    Principal {
        role: AccountRole::Seller,
        account_id: id,
    }
}

/// Send one request through the router and decode the JSON reply
async fn call(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    call_with_headers(app, method, uri, token, body, &[]).await
}

async fn call_with_headers(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
    headers: &[(&str, &str)],
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

async fn login(app: &Router, role: &str, email: &str) -> String {
    let (status, body) = call(
        app,
        "POST",
        "/api/auth/login",
        None,
        Some(json!({ "role": role, "email": email, "password": "password123" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "login failed: {}", body);
    body["session"]["token"].as_str().unwrap().to_string()
}

// ============================================================================
// Seller Verification Tests
// ============================================================================

mod seller_verification {
    use super::*;

    #[tokio::test]
    async fn test_full_verification_reaches_trusted() {
        let market = TestMarket::new();
        let seller_id = market.seller("ana", None).await;
        let subject = seller(seller_id).into();

        market
            .verification
            .send_code(subject, VerificationChannel::Email)
            .await
            .unwrap();
        let code = market.email.last_code();
        market
            .verification
            .check_code(subject, VerificationChannel::Email, &code)
            .await
            .unwrap();

        market
            .verification
            .send_code(subject, VerificationChannel::Phone)
            .await
            .unwrap();
        let code = market.sms.last_code();
        let status = market
            .verification
            .check_code(subject, VerificationChannel::Phone, &code)
            .await
            .unwrap();
        let report = status.reputation.expect("sellers carry a report");
        assert_eq!(report.score, 35);
        assert_eq!(report.tier, TrustTier::Probation);

        market.verification.confirm_student(subject).await.unwrap();
        market
            .verification
            .acknowledge_safety(subject, true)
            .await
            .unwrap();
        let status = market
            .verification
            .acknowledge_anti_scam(subject, true)
            .await
            .unwrap();

        let report = status.reputation.unwrap();
        assert_eq!(report.score, 80);
        assert_eq!(report.tier, TrustTier::Trusted);
        assert_eq!(report.next_tier, None);

        let stored = market.store.get_seller(seller_id).await.unwrap().unwrap();
        assert_eq!(stored.reputation_score, 80);
        assert_eq!(stored.trust_tier, TrustTier::Trusted);
    }

    #[tokio::test]
    async fn test_student_confirmation_needs_verified_email() {
        let market = TestMarket::new();
        let seller_id = market.seller("ben", None).await;

        let result = market
            .verification
            .confirm_student(seller(seller_id).into())
            .await;
        assert!(matches!(result, Err(MarketError::Validation(_))));

        let status = market
            .verification
            .admin_confirm_student(AccountRole::Seller, seller_id)
            .await
            .unwrap();
        assert!(status.flags.student_confirmed);
        assert_eq!(status.reputation.unwrap().score, 25);
    }

    #[tokio::test]
    async fn test_expired_code_is_rejected() {
        let market = TestMarket::new();
        let buyer_id = market.buyer("cal").await;
        let subject = buyer(buyer_id).into();
        let now = Utc::now();

        market
            .verification
            .send_code_at(subject, VerificationChannel::Phone, now)
            .await
            .unwrap();
        let code = market.sms.last_code();

        let err = market
            .verification
            .check_code_at(
                subject,
                VerificationChannel::Phone,
                &code,
                now + Duration::minutes(11),
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("expired"));

        let buyer = market.store.get_buyer(buyer_id).await.unwrap().unwrap();
        assert!(!buyer.flags.phone_verified);
    }

    #[tokio::test]
    async fn test_resend_cooldown() {
        let market = TestMarket::new();
        let buyer_id = market.buyer("dee").await;
        let subject = buyer(buyer_id).into();
        let now = Utc::now();

        market
            .verification
            .send_code_at(subject, VerificationChannel::Email, now)
            .await
            .unwrap();
        let early = market
            .verification
            .send_code_at(
                subject,
                VerificationChannel::Email,
                now + Duration::seconds(30),
            )
            .await;
        assert!(early.unwrap_err().to_string().contains("Please wait"));

        market
            .verification
            .send_code_at(
                subject,
                VerificationChannel::Email,
                now + Duration::seconds(61),
            )
            .await
            .unwrap();
        assert_eq!(market.email.count(), 2);
    }

    #[tokio::test]
    async fn test_buyers_cannot_acknowledge_guidelines() {
        let market = TestMarket::new();
        let buyer_id = market.buyer("eve").await;

        let result = market
            .verification
            .acknowledge_safety(buyer(buyer_id).into(), true)
            .await;
        assert!(matches!(result, Err(MarketError::Forbidden(_))));
    }
}

// ============================================================================
// Order and Review Tests
// ============================================================================

mod order_flow {
    use super::*;

    #[tokio::test]
    async fn test_completed_order_and_review_raise_score() {
        let market = TestMarket::new();
        let seller_id = market.seller("fay", None).await;
        let buyer_id = market.buyer("gus").await;
        market.verify_buyer(buyer_id, false).await;
        let product_id = market.product(seller_id, "books", 40.0).await;

        let order = market
            .listings
            .create_order(buyer_id, NewOrder { product_id })
            .await
            .unwrap();
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.amount, 40.0);

        // Reviews need a completed order
        let early = market
            .listings
            .submit_review(
                buyer_id,
                NewReview {
                    order_id: order.id,
                    rating: 5,
                    comment: String::new(),
                },
            )
            .await;
        assert!(matches!(early, Err(MarketError::Validation(_))));

        market
            .listings
            .complete_order(buyer(buyer_id), order.id)
            .await
            .unwrap();
        market
            .listings
            .submit_review(
                buyer_id,
                NewReview {
                    order_id: order.id,
                    rating: 5,
                    comment: "Great condition".to_string(),
                },
            )
            .await
            .unwrap();

        let duplicate = market
            .listings
            .submit_review(
                buyer_id,
                NewReview {
                    order_id: order.id,
                    rating: 4,
                    comment: String::new(),
                },
            )
            .await;
        assert!(matches!(duplicate, Err(MarketError::Validation(_))));

        // 20 (rating 5.0) + 2 (one order) + 1 (one product)
        let report = market.reputation.seller_report(seller_id).await.unwrap();
        assert_eq!(report.breakdown.rating, 20);
        assert_eq!(report.breakdown.orders, 2);
        assert_eq!(report.breakdown.products, 1);
        assert_eq!(report.score, 23);
        assert_eq!(report.review_count, 1);
        assert_eq!(report.tier, TrustTier::Probation);
    }

    #[tokio::test]
    async fn test_seller_cannot_complete_order() {
        let market = TestMarket::new();
        let seller_id = market.seller("hal", None).await;
        let buyer_id = market.buyer("ida").await;
        market.verify_buyer(buyer_id, false).await;
        let product_id = market.product(seller_id, "lamps", 20.0).await;
        let order = market
            .listings
            .create_order(buyer_id, NewOrder { product_id })
            .await
            .unwrap();

        let result = market
            .listings
            .complete_order(seller(seller_id), order.id)
            .await;
        assert!(matches!(result, Err(MarketError::Forbidden(_))));

        let cancelled = market
            .listings
            .cancel_order(seller(seller_id), order.id)
            .await
            .unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert_eq!(cancelled.cancelled_by, Some(AccountRole::Seller));

        let again = market
            .listings
            .complete_order(buyer(buyer_id), order.id)
            .await;
        assert!(matches!(again, Err(MarketError::Validation(_))));
    }

    #[tokio::test]
    async fn test_purchase_caps_by_buyer_level() {
        let market = TestMarket::new();
        let seller_id = market.seller("jo", None).await;
        let buyer_id = market.buyer("kit").await;
        let cheap = market.product(seller_id, "desks", 80.0).await;
        let pricey = market.product(seller_id, "desks", 300.0).await;

        // Unverified buyers cannot buy at all
        let blocked = market
            .listings
            .create_order(buyer_id, NewOrder { product_id: cheap })
            .await;
        assert!(matches!(blocked, Err(MarketError::Forbidden(_))));

        market.verify_buyer(buyer_id, false).await;
        market
            .listings
            .create_order(buyer_id, NewOrder { product_id: cheap })
            .await
            .unwrap();
        let over_cap = market
            .listings
            .create_order(buyer_id, NewOrder { product_id: pricey })
            .await;
        assert!(matches!(over_cap, Err(MarketError::Forbidden(_))));

        market.verify_buyer(buyer_id, true).await;
        market
            .listings
            .create_order(buyer_id, NewOrder { product_id: pricey })
            .await
            .unwrap();

        let rejected = market
            .audit
            .get_for_account(buyer_id)
            .await
            .into_iter()
            .filter(|e| matches!(e.event_type, AuditEventType::PurchaseRejected { .. }))
            .count();
        assert!(rejected >= 2);
    }
}

// ============================================================================
// Fraud Detection Tests
// ============================================================================

mod fraud_blocking {
    use super::*;

    #[tokio::test]
    async fn test_shared_payment_account_blocks_probation_seller() {
        let market = TestMarket::new();
        let first = market.seller("lou", Some("IBAN 0001")).await;
        let second = market.seller("max", Some("iban  0001")).await;
        let buyer_id = market.buyer("ned").await;
        market.verify_buyer(buyer_id, true).await;
        let product_id = market.product(second, "bikes", 120.0).await;

        let flags = market
            .fraud
            .scan_seller(market.store.as_ref(), second)
            .await
            .unwrap();
        let duplicate = flags
            .iter()
            .find(|f| f.fraud_type == FraudType::DuplicateDetails)
            .expect("duplicate details flagged");
        assert_eq!(duplicate.severity, FraudSeverity::High);
        assert!(duplicate.evidence.to_string().contains(&first.to_string()));

        let result = market
            .listings
            .create_order(buyer_id, NewOrder { product_id })
            .await;
        assert!(matches!(result, Err(MarketError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_clean_probation_seller_can_sell() {
        let market = TestMarket::new();
        let seller_id = market.seller("oli", Some("IBAN 0002")).await;
        let buyer_id = market.buyer("pat").await;
        market.verify_buyer(buyer_id, false).await;
        let product_id = market.product(seller_id, "chairs", 25.0).await;

        let flags = market
            .fraud
            .scan_seller(market.store.as_ref(), seller_id)
            .await
            .unwrap();
        assert!(flags.is_empty());

        market
            .listings
            .create_order(buyer_id, NewOrder { product_id })
            .await
            .unwrap();
    }
}

// ============================================================================
// HTTP API Tests
// ============================================================================

mod http_api {
    use super::*;

    fn seller_body(tag: &str) -> Value {
        json!({
            "name": format!("Seller {}", tag),
            "email": format!("{}@campus.edu", tag),
            "phone": phone_for(tag, '5'),
            "password": "password123",
            "store_name": format!("{} Store", tag),
        })
    }

    fn buyer_body(tag: &str) -> Value {
        json!({
            "name": format!("Buyer {}", tag),
            "email": format!("{}@campus.edu", tag),
            "phone": phone_for(tag, '7'),
            "password": "password123",
        })
    }

    #[tokio::test]
    async fn test_register_and_duplicate() {
        let market = TestMarket::new();
        let app = market.router();

        let (status, body) = call(
            &app,
            "POST",
            "/api/sellers/register",
            None,
            Some(seller_body("quinn")),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["success"], true);
        assert_eq!(body["account"]["trust_tier"], "probation");

        let (status, body) = call(
            &app,
            "POST",
            "/api/sellers/register",
            None,
            Some(seller_body("quinn")),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert!(body["errors"].as_array().unwrap().len() >= 2);
    }

    #[tokio::test]
    async fn test_invalid_registration_lists_every_error() {
        let market = TestMarket::new();
        let app = market.router();

        let (status, body) = call(
            &app,
            "POST",
            "/api/buyers/register",
            None,
            Some(json!({
                "name": "",
                "email": "not-an-email",
                "phone": "123",
                "password": "short",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["errors"].as_array().unwrap().len() >= 4);
    }

    #[tokio::test]
    async fn test_incomplete_body_gets_json_errors() {
        let market = TestMarket::new();
        let app = market.router();

        let (status, body) = call(
            &app,
            "POST",
            "/api/sellers/register",
            None,
            Some(json!({ "name": "Sam", "email": "a@uni.edu" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        let errors = body["errors"].as_array().expect("JSON error list");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].as_str().unwrap().contains("phone"));

        let (status, body) = call(&app, "GET", "/api/sellers/not-a-uuid/trust", None, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert!(body["errors"].is_array());
    }

    #[tokio::test]
    async fn test_login_and_protected_routes() {
        let market = TestMarket::new();
        let app = market.router();
        call(
            &app,
            "POST",
            "/api/buyers/register",
            None,
            Some(buyer_body("rae")),
        )
        .await;

        let (status, _) = call(
            &app,
            "POST",
            "/api/auth/login",
            None,
            Some(json!({ "role": "buyer", "email": "rae@campus.edu", "password": "wrong-pass1" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = call(&app, "POST", "/api/verify/phone/send", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = call(
            &app,
            "POST",
            "/api/verify/phone/send",
            Some("not-a-session"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let token = login(&app, "buyer", "rae@campus.edu").await;
        let (status, body) = call(
            &app,
            "GET",
            "/api/purchase/eligibility?amount=50",
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["eligibility"]["approved"], false);
        assert_eq!(body["eligibility"]["level"], "unverified");
    }

    #[tokio::test]
    async fn test_phone_verification_over_http() {
        let market = TestMarket::new();
        let app = market.router();
        call(
            &app,
            "POST",
            "/api/buyers/register",
            None,
            Some(buyer_body("sam")),
        )
        .await;
        let token = login(&app, "buyer", "sam@campus.edu").await;

        let (status, body) = call(&app, "POST", "/api/verify/phone/send", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        let code = market.sms.last_code();
        assert!(!body.to_string().contains(&code));
        assert_ne!(body["dispatch"]["destination"], phone_for("sam", '7'));

        let wrong = if code == "000000" { "111111" } else { "000000" };
        let (status, body) = call(
            &app,
            "POST",
            "/api/verify/phone",
            Some(&token),
            Some(json!({ "code": wrong })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["errors"][0].as_str().unwrap().contains("4 attempt(s) left"));

        let (status, body) = call(
            &app,
            "POST",
            "/api/verify/phone",
            Some(&token),
            Some(json!({ "code": code })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["verification"]["flags"]["phone_verified"], true);
    }

    #[tokio::test]
    async fn test_public_trust_report() {
        let market = TestMarket::new();
        let app = market.router();
        let seller_id = market.seller("tia", None).await;

        let (status, body) = call(
            &app,
            "GET",
            &format!("/api/sellers/{}/trust", seller_id),
            None,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["trust"]["score"], 0);
        assert_eq!(body["trust"]["tier"], "probation");
        assert_eq!(body["trust"]["next_tier"], "basic");

        let (status, _) = call(
            &app,
            "GET",
            &format!("/api/sellers/{}/trust", Uuid::new_v4()),
            None,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_role_checks_on_listings() {
        let market = TestMarket::new();
        let app = market.router();
        call(
            &app,
            "POST",
            "/api/buyers/register",
            None,
            Some(buyer_body("uma")),
        )
        .await;
        let token = login(&app, "buyer", "uma@campus.edu").await;

        let (status, _) = call(
            &app,
            "POST",
            "/api/products",
            Some(&token),
            Some(json!({ "title": "Desk", "category": "furniture", "price": 30.0 })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = call(
            &app,
            "POST",
            "/api/verify/safety",
            Some(&token),
            Some(json!({ "accepted": true })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_seller_lists_product() {
        let market = TestMarket::new();
        let app = market.router();
        call(
            &app,
            "POST",
            "/api/sellers/register",
            None,
            Some(seller_body("vic")),
        )
        .await;
        let token = login(&app, "seller", "vic@campus.edu").await;

        let (status, body) = call(
            &app,
            "POST",
            "/api/products",
            Some(&token),
            Some(json!({ "title": "Calculus textbook", "category": "Books", "price": 45.0 })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["product"]["category"], "books");
        assert_eq!(body["product"]["active"], true);
    }

    #[tokio::test]
    async fn test_admin_routes_require_key() {
        let market = TestMarket::new();
        let app = market.router();
        let seller_id = market.seller("wes", None).await;
        let uri = format!("/api/admin/sellers/{}/fraud", seller_id);

        let (status, _) = call(&app, "GET", &uri, None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) =
            call_with_headers(&app, "GET", &uri, None, None, &[("x-admin-key", "nope")]).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) =
            call_with_headers(&app, "GET", &uri, None, None, &[("x-admin-key", ADMIN_KEY)]).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["fraud"]["flagged"], false);

        let (status, body) = call_with_headers(
            &app,
            "POST",
            &format!("/api/admin/sellers/{}/student", seller_id),
            None,
            None,
            &[("x-admin-key", ADMIN_KEY)],
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["verification"]["flags"]["student_confirmed"], true);

        let (status, body) = call_with_headers(
            &app,
            "GET",
            "/api/admin/audit?limit=5",
            None,
            None,
            &[("x-admin-key", ADMIN_KEY)],
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let total = body["audit"]["total"].as_u64().unwrap();
        assert!(total >= 1 && total <= 5);
    }

    #[tokio::test]
    async fn test_security_headers_present() {
        let market = TestMarket::new();
        let app = market.router();

        let request = Request::builder()
            .method("GET")
            .uri(format!("/api/sellers/{}/trust", Uuid::new_v4()))
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        let headers = response.headers();
        assert_eq!(headers.get("X-Frame-Options").unwrap(), "DENY");
        assert_eq!(headers.get("X-Content-Type-Options").unwrap(), "nosniff");
        assert!(headers.get("X-RateLimit-Limit").is_some());
    }
}
