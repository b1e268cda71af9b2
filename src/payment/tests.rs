//! Tests for payment initiation, verification and webhooks.

use super::*;
use crate::domain::OrderStatus;
use crate::notification::{EventType, RecordingNotifier};
use crate::testing::{self, Stores};
use async_trait::async_trait;
use rust_decimal_macros::dec;
use std::sync::Mutex;
use std::time::Duration;

const CUSTOMER: &str = "cust-1";
const KEY_SECRET: &str = "key-secret";
const WEBHOOK_SECRET: &str = "hook-secret";

#[derive(Default)]
struct FakeGateway {
    calls: Mutex<Vec<(i64, String, String)>>,
    fail: bool,
}

impl FakeGateway {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    fn calls(&self) -> Vec<(i64, String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_order(
        &self,
        amount_minor: i64,
        currency: &str,
        reference: &str,
    ) -> Result<GatewayOrder, GatewayError> {
        let mut calls = self.calls.lock().unwrap();
        calls.push((amount_minor, currency.to_string(), reference.to_string()));
        if self.fail {
            return Err(GatewayError::Api {
                status: 500,
                body: "boom".into(),
            });
        }
        Ok(GatewayOrder {
            id: format!("gw_order_{}", calls.len()),
            amount: amount_minor,
            currency: currency.to_string(),
            status: "created".into(),
            receipt: reference.to_string(),
        })
    }

    fn key_id(&self) -> &str {
        "key_test"
    }
}

struct Fixture {
    stores: Stores,
    gateway: Arc<FakeGateway>,
    notifier: Arc<RecordingNotifier>,
    service: PaymentService,
}

fn config() -> PaymentConfig {
    PaymentConfig {
        key_id: "key_test".into(),
        key_secret: KEY_SECRET.into(),
        webhook_secret: WEBHOOK_SECRET.into(),
        ..PaymentConfig::default()
    }
}

async fn fixture_with(gateway: FakeGateway) -> Fixture {
    let stores = Stores::new();
    stores
        .seed(
            Collection::Orders,
            "order-1",
            &testing::order("order-1", CUSTOMER, "rest-1", OrderStatus::Placed),
        )
        .await;

    let gateway = Arc::new(gateway);
    let notifier = Arc::new(RecordingNotifier::default());
    let service = PaymentService::new(
        stores.document_store(),
        gateway.clone(),
        notifier.clone(),
        &config(),
    );
    Fixture {
        stores,
        gateway,
        notifier,
        service,
    }
}

async fn fixture() -> Fixture {
    fixture_with(FakeGateway::default()).await
}

fn deadline() -> Deadline {
    Deadline::after(Duration::from_secs(5))
}

fn customer() -> Actor {
    Actor::customer(CUSTOMER)
}

fn callback(gateway_order_id: &str, payment_id: &str) -> PaymentCallback {
    PaymentCallback {
        gateway_order_id: gateway_order_id.into(),
        payment_id: payment_id.into(),
        signature: sign(KEY_SECRET, format!("{}|{}", gateway_order_id, payment_id).as_bytes()),
    }
}

fn webhook_body(event: &str, gateway_order_id: &str, payment_id: &str) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "event": event,
        "payload": {"payment": {"entity": {
            "id": payment_id,
            "order_id": gateway_order_id,
            "amount": 31550,
            "status": "captured"
        }}}
    }))
    .unwrap()
}

async fn deliver_webhook(f: &Fixture, body: &[u8]) -> Result<WebhookOutcome, PaymentError> {
    let signature = sign(WEBHOOK_SECRET, body);
    f.service.handle_webhook(body, &signature, deadline()).await
}

// ==================== Initiation tests ====================

#[tokio::test]
async fn test_initiate_creates_gateway_order_in_minor_units() {
    let f = fixture().await;

    let init = f.service.initiate(&customer(), "order-1", deadline()).await.unwrap();

    assert_eq!(init.amount, 31550);
    assert_eq!(init.currency, "INR");
    assert_eq!(init.key_id, "key_test");
    assert_eq!(init.order_id, "order-1");
    assert_eq!(
        f.gateway.calls(),
        vec![(31550, "INR".to_string(), "CHZ-000000-order-1".to_string())]
    );

    let record: PaymentRecord = f.stores.load(Collection::Payments, &init.gateway_order_id).await;
    assert_eq!(record.order_id, "order-1");
    assert_eq!(record.status, PaymentStatus::Pending);

    let order = f.stores.order("order-1").await;
    assert_eq!(order.gateway_order_id.as_deref(), Some(init.gateway_order_id.as_str()));
}

#[tokio::test]
async fn test_initiate_rejects_other_customers_order() {
    let f = fixture().await;
    let err = f
        .service
        .initiate(&Actor::customer("someone-else"), "order-1", deadline())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);
    assert!(f.gateway.calls().is_empty());
}

#[tokio::test]
async fn test_initiate_unknown_order() {
    let f = fixture().await;
    let err = f.service.initiate(&customer(), "missing", deadline()).await.unwrap_err();
    assert_eq!(err.reason(), "order_not_found");
}

#[tokio::test]
async fn test_initiate_rejects_non_positive_total() {
    let f = fixture().await;
    let mut order = testing::order("order-free", CUSTOMER, "rest-1", OrderStatus::Placed);
    order.grand_total = dec!(0);
    f.stores.seed(Collection::Orders, "order-free", &order).await;

    let err = f.service.initiate(&customer(), "order-free", deadline()).await.unwrap_err();
    assert_eq!(err.reason(), "invalid_amount");
    assert!(f.gateway.calls().is_empty());
}

#[tokio::test]
async fn test_initiate_gateway_failure_is_upstream_and_not_retried() {
    let f = fixture_with(FakeGateway::failing()).await;

    let err = f.service.initiate(&customer(), "order-1", deadline()).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::UpstreamUnavailable);
    assert_eq!(err.reason(), "payment_gateway_unavailable");
    assert_eq!(f.gateway.calls().len(), 1);
    assert_eq!(f.stores.documents.count(Collection::Payments), 0);
}

#[test]
fn test_to_minor_units_rounds() {
    assert_eq!(to_minor_units(dec!(315.5)), Some(31550));
    assert_eq!(to_minor_units(dec!(0.005)), Some(1));
    assert_eq!(to_minor_units(dec!(99.994)), Some(9999));
}

// ==================== Verification tests ====================

#[tokio::test]
async fn test_verify_marks_payment_and_order_paid() {
    let f = fixture().await;
    let init = f.service.initiate(&customer(), "order-1", deadline()).await.unwrap();

    let verification = f
        .service
        .verify(&customer(), &callback(&init.gateway_order_id, "pay_1"), deadline())
        .await
        .unwrap();

    assert!(verification.verified);
    assert_eq!(verification.status, PaymentStatus::Paid);

    let order = f.stores.order("order-1").await;
    assert_eq!(order.payment_status, PaymentStatus::Paid);
    assert_eq!(order.payment_id.as_deref(), Some("pay_1"));
    assert_eq!(f.notifier.types(), vec![EventType::PaymentUpdated]);
}

#[tokio::test]
async fn test_verify_rejects_bad_signature() {
    let f = fixture().await;
    let init = f.service.initiate(&customer(), "order-1", deadline()).await.unwrap();

    let mut cb = callback(&init.gateway_order_id, "pay_1");
    cb.payment_id = "pay_2".into();
    let err = f.service.verify(&customer(), &cb, deadline()).await.unwrap_err();

    assert_eq!(err.reason(), "invalid_signature");
    assert_eq!(f.stores.order("order-1").await.payment_status, PaymentStatus::Pending);
}

#[tokio::test]
async fn test_verify_requires_fields() {
    let f = fixture().await;
    let cb = PaymentCallback {
        gateway_order_id: String::new(),
        payment_id: "pay_1".into(),
        signature: "abc".into(),
    };
    let err = f.service.verify(&customer(), &cb, deadline()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn test_verify_checks_ownership() {
    let f = fixture().await;
    let init = f.service.initiate(&customer(), "order-1", deadline()).await.unwrap();

    let err = f
        .service
        .verify(
            &Actor::customer("intruder"),
            &callback(&init.gateway_order_id, "pay_1"),
            deadline(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);
}

#[tokio::test]
async fn test_initiate_after_payment_conflicts() {
    let f = fixture().await;
    let init = f.service.initiate(&customer(), "order-1", deadline()).await.unwrap();
    f.service
        .verify(&customer(), &callback(&init.gateway_order_id, "pay_1"), deadline())
        .await
        .unwrap();

    let err = f.service.initiate(&customer(), "order-1", deadline()).await.unwrap_err();
    assert_eq!(err.reason(), "already_paid");
}

// ==================== Webhook tests ====================

#[tokio::test]
async fn test_webhook_capture_is_idempotent() {
    let f = fixture().await;
    let init = f.service.initiate(&customer(), "order-1", deadline()).await.unwrap();
    let body = webhook_body("payment.captured", &init.gateway_order_id, "pay_1");

    let first = deliver_webhook(&f, &body).await.unwrap();
    let second = deliver_webhook(&f, &body).await.unwrap();

    assert!(first.applied);
    assert!(!second.applied);
    assert_eq!(f.stores.order("order-1").await.payment_status, PaymentStatus::Paid);
    assert_eq!(f.notifier.types(), vec![EventType::PaymentUpdated]);
}

#[tokio::test]
async fn test_webhook_never_regresses_status() {
    let f = fixture().await;
    let init = f.service.initiate(&customer(), "order-1", deadline()).await.unwrap();

    deliver_webhook(&f, &webhook_body("payment.captured", &init.gateway_order_id, "pay_1"))
        .await
        .unwrap();
    let late_failure =
        deliver_webhook(&f, &webhook_body("payment.failed", &init.gateway_order_id, "pay_1"))
            .await
            .unwrap();

    assert!(!late_failure.applied);
    assert_eq!(f.stores.order("order-1").await.payment_status, PaymentStatus::Paid);
}

#[tokio::test]
async fn test_webhook_failed_then_paid_then_refunded() {
    let f = fixture().await;
    let init = f.service.initiate(&customer(), "order-1", deadline()).await.unwrap();
    let gw = init.gateway_order_id.clone();

    for (event, expected) in [
        ("payment.failed", PaymentStatus::Failed),
        ("payment.captured", PaymentStatus::Paid),
        ("refund.processed", PaymentStatus::Refunded),
    ] {
        let outcome = deliver_webhook(&f, &webhook_body(event, &gw, "pay_1")).await.unwrap();
        assert!(outcome.applied, "{} should apply", event);
        assert_eq!(f.stores.order("order-1").await.payment_status, expected);
    }
}

#[tokio::test]
async fn test_webhook_refund_before_capture_is_ignored() {
    let f = fixture().await;
    let init = f.service.initiate(&customer(), "order-1", deadline()).await.unwrap();

    let outcome =
        deliver_webhook(&f, &webhook_body("refund.processed", &init.gateway_order_id, "pay_1"))
            .await
            .unwrap();

    assert!(!outcome.applied);
    assert_eq!(f.stores.order("order-1").await.payment_status, PaymentStatus::Pending);
}

#[tokio::test]
async fn test_webhook_rejects_bad_signature() {
    let f = fixture().await;
    let body = webhook_body("payment.captured", "gw_order_1", "pay_1");

    let err = f
        .service
        .handle_webhook(&body, &sign(KEY_SECRET, &body), deadline())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);

    let err = f.service.handle_webhook(&body, "", deadline()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);
}

#[tokio::test]
async fn test_webhook_unknown_event_and_payment_acknowledged() {
    let f = fixture().await;

    let unknown = deliver_webhook(&f, &webhook_body("order.paid", "gw_order_1", "pay_1"))
        .await
        .unwrap();
    assert!(!unknown.applied);

    let missing = deliver_webhook(&f, &webhook_body("payment.captured", "gw_missing", "pay_1"))
        .await
        .unwrap();
    assert!(!missing.applied);
}

#[tokio::test]
async fn test_webhook_malformed_body() {
    let f = fixture().await;
    let err = deliver_webhook(&f, b"{not json").await.unwrap_err();
    assert_eq!(err.reason(), "invalid_payload");
}
