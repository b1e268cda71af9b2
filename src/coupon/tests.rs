//! Tests for coupon validation, discounts and redemption.

use super::*;
use crate::config::CouponConfig;
use crate::coordination::InMemoryCoordinationStore;
use crate::coordination::testing::UnavailableCoordinationStore;
use crate::testing::{self, Stores};
use chrono::Duration as ChronoDuration;
use rust_decimal_macros::dec;

fn ledger(stores: &Stores) -> CouponLedger {
    CouponLedger::new(
        stores.document_store(),
        stores.coordination.clone(),
        &CouponConfig::default(),
    )
}

fn percent(value: Decimal) -> Coupon {
    testing::coupon("cpn-1", "SAVE", DiscountType::Percentage, value)
}

// ==================== Validation tests ====================

#[test]
fn test_validate_accepts_valid_coupon() {
    assert_eq!(validate(&percent(dec!(10)), dec!(250), None, Utc::now()), Ok(()));
}

#[test]
fn test_validate_inactive_first() {
    let mut coupon = percent(dec!(10));
    coupon.is_active = false;
    coupon.used_count = coupon.usage_limit;
    assert_eq!(
        validate(&coupon, dec!(250), None, Utc::now()),
        Err(CouponRejection::Inactive)
    );
}

#[test]
fn test_validate_window_is_half_open() {
    let coupon = percent(dec!(10));
    assert_eq!(validate(&coupon, dec!(250), None, coupon.valid_from), Ok(()));
    assert_eq!(
        validate(&coupon, dec!(250), None, coupon.valid_from - ChronoDuration::seconds(1)),
        Err(CouponRejection::NotYetValid)
    );
    assert_eq!(
        validate(&coupon, dec!(250), None, coupon.valid_until),
        Err(CouponRejection::Expired)
    );
}

#[test]
fn test_validate_usage_before_min_order() {
    let mut coupon = percent(dec!(10));
    coupon.usage_limit = 3;
    coupon.used_count = 3;
    coupon.min_order_value = dec!(500);
    assert_eq!(
        validate(&coupon, dec!(100), None, Utc::now()),
        Err(CouponRejection::UsageLimitReached)
    );

    coupon.used_count = 2;
    assert_eq!(
        validate(&coupon, dec!(100), None, Utc::now()),
        Err(CouponRejection::MinimumOrderNotMet)
    );
    assert_eq!(validate(&coupon, dec!(500), None, Utc::now()), Ok(()));
}

#[test]
fn test_validate_restaurant_scope() {
    let mut coupon = percent(dec!(10));
    coupon.restaurant_id = Some("rest-1".into());
    assert_eq!(validate(&coupon, dec!(250), Some("rest-1"), Utc::now()), Ok(()));
    assert_eq!(
        validate(&coupon, dec!(250), Some("rest-2"), Utc::now()),
        Err(CouponRejection::NotApplicable)
    );
    // Unscoped quote skips the check
    assert_eq!(validate(&coupon, dec!(250), None, Utc::now()), Ok(()));
}

#[test]
fn test_rejection_reasons() {
    assert_eq!(CouponRejection::Expired.reason(), "coupon_expired");
    assert_eq!(CouponRejection::NotApplicable.reason(), "coupon_not_applicable");
    assert_eq!(CouponRejection::MinimumOrderNotMet.to_string(), "Minimum order value not met");
}

// ==================== Discount tests ====================

#[test]
fn test_percentage_discount() {
    assert_eq!(calculate_discount(&percent(dec!(10)), dec!(250)), dec!(25));
    assert_eq!(calculate_discount(&percent(dec!(15)), dec!(187.45)), dec!(28.12));
}

#[test]
fn test_discount_capped_by_max_discount() {
    let mut coupon = percent(dec!(50));
    coupon.max_discount = Some(dec!(100));
    assert_eq!(calculate_discount(&coupon, dec!(400)), dec!(100));

    // Zero cap means uncapped
    coupon.max_discount = Some(Decimal::ZERO);
    assert_eq!(calculate_discount(&coupon, dec!(400)), dec!(200));
}

#[test]
fn test_flat_discount_never_exceeds_total() {
    let coupon = testing::coupon("cpn-2", "FLAT", DiscountType::Flat, dec!(75));
    assert_eq!(calculate_discount(&coupon, dec!(250)), dec!(75));
    assert_eq!(calculate_discount(&coupon, dec!(60)), dec!(60));
}

// ==================== Quote tests ====================

#[tokio::test]
async fn test_quote_valid_coupon() {
    let stores = Stores::new();
    stores.seed(Collection::Coupons, "cpn-1", &percent(dec!(10))).await;

    let quote = ledger(&stores).quote("SAVE", dec!(250), None).await.unwrap();
    assert_eq!(
        quote,
        CouponQuote {
            valid: true,
            code: "SAVE".into(),
            discount: dec!(25),
        }
    );

    // Quotes never redeem
    assert!(stores.coordination.is_empty());
    let coupon: Coupon = stores.load(Collection::Coupons, "cpn-1").await;
    assert_eq!(coupon.used_count, 0);
}

#[tokio::test]
async fn test_quote_unknown_code_is_not_found() {
    let stores = Stores::new();
    let err = ledger(&stores).quote("NOPE", dec!(250), None).await.unwrap_err();
    assert!(matches!(err, CouponLookupError::NotFound(_)));
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_quote_rejection_carries_reason() {
    let stores = Stores::new();
    let mut coupon = percent(dec!(10));
    coupon.min_order_value = dec!(300);
    stores.seed(Collection::Coupons, "cpn-1", &coupon).await;

    let err = ledger(&stores).quote("SAVE", dec!(250), None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(err.reason(), "minimum_order_not_met");
}

#[tokio::test]
async fn test_quote_rejects_non_positive_total() {
    let stores = Stores::new();
    let err = ledger(&stores).quote("SAVE", Decimal::ZERO, None).await.unwrap_err();
    assert!(matches!(err, CouponLookupError::InvalidTotal));
}

#[tokio::test]
async fn test_list_active_skips_inactive() {
    let stores = Stores::new();
    stores.seed(Collection::Coupons, "cpn-1", &percent(dec!(10))).await;
    let mut inactive = testing::coupon("cpn-2", "OLD", DiscountType::Flat, dec!(50));
    inactive.is_active = false;
    stores.seed(Collection::Coupons, "cpn-2", &inactive).await;

    let active = ledger(&stores).list_active().await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].code, "SAVE");
}

// ==================== Redemption tests ====================

#[tokio::test]
async fn test_apply_redeems_and_mirrors_usage() {
    let stores = Stores::new();
    stores.seed(Collection::Coupons, "cpn-1", &percent(dec!(10))).await;

    let redemption = ledger(&stores)
        .apply("SAVE", dec!(250), "rest-1", Utc::now())
        .await
        .unwrap();
    assert_eq!(redemption.discount, dec!(25));
    assert_eq!(redemption.coupon_id, "cpn-1");

    assert_eq!(
        stores.coordination.get("coupon_usage:cpn-1").await.unwrap(),
        Some("1".into())
    );
    let ttl = stores.coordination.ttl("coupon_usage:cpn-1").await.unwrap().unwrap();
    assert!(ttl > Duration::from_secs(29 * 24 * 3600));

    let coupon: Coupon = stores.load(Collection::Coupons, "cpn-1").await;
    assert_eq!(coupon.used_count, 1);
}

#[tokio::test]
async fn test_apply_over_limit_denies_discount_but_counts_attempt() {
    let stores = Stores::new();
    let mut coupon = percent(dec!(10));
    coupon.usage_limit = 1;
    stores.seed(Collection::Coupons, "cpn-1", &coupon).await;
    // Another instance already used the only slot but the mirror lags
    stores.coordination.set("coupon_usage:cpn-1", "1", None).await.unwrap();

    let ledger = ledger(&stores);
    assert_eq!(ledger.apply("SAVE", dec!(250), "rest-1", Utc::now()).await, None);
    assert_eq!(
        stores.coordination.get("coupon_usage:cpn-1").await.unwrap(),
        Some("2".into())
    );

    let coupon: Coupon = stores.load(Collection::Coupons, "cpn-1").await;
    assert_eq!(coupon.used_count, 0);
}

#[tokio::test]
async fn test_apply_invalid_coupon_does_not_touch_counter() {
    let stores = Stores::new();
    let mut coupon = percent(dec!(10));
    coupon.restaurant_id = Some("rest-2".into());
    stores.seed(Collection::Coupons, "cpn-1", &coupon).await;

    assert_eq!(ledger(&stores).apply("SAVE", dec!(250), "rest-1", Utc::now()).await, None);
    assert!(stores.coordination.is_empty());
}

#[tokio::test]
async fn test_apply_fails_closed_when_coordination_down() {
    let stores = Stores::new();
    stores.seed(Collection::Coupons, "cpn-1", &percent(dec!(10))).await;
    let ledger = CouponLedger::new(
        stores.document_store(),
        Arc::new(UnavailableCoordinationStore),
        &CouponConfig::default(),
    );

    assert_eq!(ledger.apply("SAVE", dec!(250), "rest-1", Utc::now()).await, None);
    let coupon: Coupon = stores.load(Collection::Coupons, "cpn-1").await;
    assert_eq!(coupon.used_count, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_redemptions_never_exceed_limit() {
    const LIMIT: u32 = 5;
    const REQUESTS: usize = 40;

    let stores = Stores::new();
    let mut coupon = percent(dec!(10));
    coupon.usage_limit = LIMIT;
    stores.seed(Collection::Coupons, "cpn-1", &coupon).await;

    let ledger = Arc::new(CouponLedger::new(
        stores.document_store(),
        Arc::new(InMemoryCoordinationStore::new()),
        &CouponConfig::default(),
    ));

    let handles: Vec<_> = (0..REQUESTS)
        .map(|_| {
            let ledger = ledger.clone();
            tokio::spawn(async move { ledger.apply("SAVE", dec!(250), "rest-1", Utc::now()).await })
        })
        .collect();

    let mut granted = 0;
    for handle in handles {
        if handle.await.unwrap().is_some() {
            granted += 1;
        }
    }
    assert_eq!(granted, LIMIT as usize);
}
