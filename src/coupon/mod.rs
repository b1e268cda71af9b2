//! Coupon validation and exactly-once-safe redemption.
//!
//! The per-coupon counter in the coordination store decides whether a
//! redemption gets its discount. The `used_count` field on the coupon
//! document only mirrors successful redemptions for display.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::CouponConfig;
use crate::coordination::CoordinationStore;
use crate::documents::{Collection, DocumentStore, DocumentStoreExt, Filter, Query, StoreError};
use crate::domain::{Coupon, CouponPatch, DiscountType};
use crate::error::{ApiError, ErrorKind};
use crate::fees::round_money;

/// First failing coupon check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CouponRejection {
    Inactive,
    NotYetValid,
    Expired,
    UsageLimitReached,
    MinimumOrderNotMet,
    /// Scoped to a different restaurant.
    NotApplicable,
}

impl CouponRejection {
    pub fn reason(&self) -> &'static str {
        match self {
            CouponRejection::Inactive => "coupon_inactive",
            CouponRejection::NotYetValid => "coupon_not_yet_valid",
            CouponRejection::Expired => "coupon_expired",
            CouponRejection::UsageLimitReached => "coupon_usage_limit_reached",
            CouponRejection::MinimumOrderNotMet => "minimum_order_not_met",
            CouponRejection::NotApplicable => "coupon_not_applicable",
        }
    }
}

impl fmt::Display for CouponRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            CouponRejection::Inactive => "Coupon is not active",
            CouponRejection::NotYetValid => "Coupon is not yet valid",
            CouponRejection::Expired => "Coupon has expired",
            CouponRejection::UsageLimitReached => "Coupon usage limit reached",
            CouponRejection::MinimumOrderNotMet => "Minimum order value not met",
            CouponRejection::NotApplicable => "Coupon is not valid for this restaurant",
        };
        write!(f, "{}", msg)
    }
}

/// Checks `coupon` against `order_total` at `now`, in a fixed order.
///
/// The usage check reads the display mirror and only filters out coupons that
/// are obviously exhausted; the redemption counter has the final say.
pub fn validate(
    coupon: &Coupon,
    order_total: Decimal,
    restaurant_id: Option<&str>,
    now: DateTime<Utc>,
) -> Result<(), CouponRejection> {
    if !coupon.is_active {
        return Err(CouponRejection::Inactive);
    }
    if now < coupon.valid_from {
        return Err(CouponRejection::NotYetValid);
    }
    if now >= coupon.valid_until {
        return Err(CouponRejection::Expired);
    }
    if coupon.used_count >= coupon.usage_limit {
        return Err(CouponRejection::UsageLimitReached);
    }
    if order_total < coupon.min_order_value {
        return Err(CouponRejection::MinimumOrderNotMet);
    }
    if let (Some(scope), Some(restaurant)) = (coupon.restaurant_id.as_deref(), restaurant_id) {
        if scope != restaurant {
            return Err(CouponRejection::NotApplicable);
        }
    }
    Ok(())
}

/// Discount for `order_total`, capped by `max_discount` (when positive) and by
/// the total itself.
pub fn calculate_discount(coupon: &Coupon, order_total: Decimal) -> Decimal {
    let raw = match coupon.discount_type {
        DiscountType::Percentage => order_total * coupon.discount_value / Decimal::ONE_HUNDRED,
        DiscountType::Flat => coupon.discount_value,
    };

    let capped = match coupon.max_discount {
        Some(max) if max > Decimal::ZERO => raw.min(max),
        _ => raw,
    };

    round_money(capped.min(order_total).max(Decimal::ZERO))
}

/// Result of `quote`: what the coupon would take off, without redeeming it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CouponQuote {
    pub valid: bool,
    pub code: String,
    pub discount: Decimal,
}

/// A granted discount.
#[derive(Debug, Clone, PartialEq)]
pub struct Redemption {
    pub coupon_id: String,
    pub code: String,
    pub discount: Decimal,
}

/// Coupon lookup error.
#[derive(Debug, thiserror::Error)]
pub enum CouponLookupError {
    #[error("coupon {0} not found")]
    NotFound(String),

    #[error("coupon {code} rejected: {rejection}")]
    Rejected {
        code: String,
        rejection: CouponRejection,
    },

    #[error("order total must be positive")]
    InvalidTotal,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ApiError for CouponLookupError {
    fn kind(&self) -> ErrorKind {
        match self {
            CouponLookupError::NotFound(_) => ErrorKind::NotFound,
            CouponLookupError::Rejected { .. } | CouponLookupError::InvalidTotal => {
                ErrorKind::Validation
            }
            CouponLookupError::Store(e) => e.kind(),
        }
    }

    fn reason(&self) -> &'static str {
        match self {
            CouponLookupError::NotFound(_) => "coupon_not_found",
            CouponLookupError::Rejected { rejection, .. } => rejection.reason(),
            CouponLookupError::InvalidTotal => "validation_error",
            CouponLookupError::Store(e) => e.reason(),
        }
    }
}

/// Coupon lookup, quoting and redemption.
pub struct CouponLedger {
    documents: Arc<dyn DocumentStore>,
    coordination: Arc<dyn CoordinationStore>,
    counter_ttl: Duration,
}

impl CouponLedger {
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        coordination: Arc<dyn CoordinationStore>,
        config: &CouponConfig,
    ) -> Self {
        Self {
            documents,
            coordination,
            counter_ttl: config.counter_ttl,
        }
    }

    fn counter_key(coupon_id: &str) -> String {
        format!("coupon_usage:{}", coupon_id)
    }

    /// Looks a coupon up by its code.
    pub async fn find_by_code(&self, code: &str) -> Result<Option<Coupon>, StoreError> {
        self.documents
            .find_one(Collection::Coupons, Query::new().filter(Filter::eq("code", code)))
            .await
    }

    /// Active coupons, soonest-expiring first.
    pub async fn list_active(&self) -> Result<Vec<Coupon>, StoreError> {
        let query = Query::new()
            .filter(Filter::eq("is_active", true))
            .sort_asc("valid_until");
        let page = self.documents.list_as(Collection::Coupons, &query).await?;
        Ok(page.items)
    }

    /// Checks `code` against an order total without redeeming it.
    pub async fn quote(
        &self,
        code: &str,
        order_total: Decimal,
        restaurant_id: Option<&str>,
    ) -> Result<CouponQuote, CouponLookupError> {
        if order_total <= Decimal::ZERO {
            return Err(CouponLookupError::InvalidTotal);
        }

        let coupon = self
            .find_by_code(code)
            .await?
            .ok_or_else(|| CouponLookupError::NotFound(code.to_string()))?;

        validate(&coupon, order_total, restaurant_id, Utc::now()).map_err(|rejection| {
            CouponLookupError::Rejected {
                code: code.to_string(),
                rejection,
            }
        })?;

        Ok(CouponQuote {
            valid: true,
            code: coupon.code.clone(),
            discount: calculate_discount(&coupon, order_total),
        })
    }

    /// Atomically claims one use of `coupon`. Returns whether the claim is
    /// within the usage limit.
    ///
    /// An over-limit claim still consumes a counter slot. On store failure
    /// nothing is granted.
    pub async fn redeem(&self, coupon: &Coupon) -> bool {
        let key = Self::counter_key(&coupon.id);

        let count = match self.coordination.incr(&key).await {
            Ok(count) => count,
            Err(e) => {
                warn!(coupon = %coupon.code, error = %e, "Coupon redemption failed closed");
                return false;
            }
        };

        if count == 1 {
            if let Err(e) = self.coordination.expire(&key, self.counter_ttl).await {
                warn!(coupon = %coupon.code, error = %e, "Failed to set coupon counter expiry");
            }
        }

        if count > i64::from(coupon.usage_limit) {
            warn!(
                coupon = %coupon.code,
                count = count,
                limit = coupon.usage_limit,
                "Coupon over limit, discount denied"
            );
            return false;
        }

        // Display mirror only
        let patch = CouponPatch {
            used_count: u32::try_from(count).ok(),
            ..Default::default()
        };
        if let Err(e) = self
            .documents
            .update_with::<Coupon, _>(Collection::Coupons, &coupon.id, &patch)
            .await
        {
            debug!(coupon = %coupon.code, error = %e, "Failed to mirror coupon usage");
        }

        true
    }

    /// Validates and redeems `code` for a checkout. Any failure yields `None`
    /// so the checkout proceeds without a discount.
    pub async fn apply(
        &self,
        code: &str,
        item_subtotal: Decimal,
        restaurant_id: &str,
        now: DateTime<Utc>,
    ) -> Option<Redemption> {
        let coupon = match self.find_by_code(code).await {
            Ok(Some(coupon)) => coupon,
            Ok(None) => {
                debug!(coupon = %code, "Unknown coupon ignored");
                return None;
            }
            Err(e) => {
                warn!(coupon = %code, error = %e, "Coupon lookup failed, no discount");
                return None;
            }
        };

        if let Err(rejection) = validate(&coupon, item_subtotal, Some(restaurant_id), now) {
            debug!(coupon = %code, reason = rejection.reason(), "Coupon rejected");
            return None;
        }

        let discount = calculate_discount(&coupon, item_subtotal);
        if discount <= Decimal::ZERO || !self.redeem(&coupon).await {
            return None;
        }

        Some(Redemption {
            coupon_id: coupon.id,
            code: coupon.code,
            discount,
        })
    }
}

#[cfg(test)]
#[path = "tests.rs"]
mod tests;
