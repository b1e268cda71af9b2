//! Discount coupons.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::documents::Patch;

/// How a coupon's discount value is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountType {
    /// `discount_value` percent of the order total.
    Percentage,
    /// `discount_value` off, in currency units.
    Flat,
}

/// Coupon is a promotional discount code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coupon {
    pub id: String,
    /// Unique redemption code, e.g. "WELCOME50".
    pub code: String,
    #[serde(default)]
    pub description: String,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    /// Cap on the computed discount; `None` or zero means uncapped.
    #[serde(default)]
    pub max_discount: Option<Decimal>,
    #[serde(default)]
    pub min_order_value: Decimal,
    pub valid_from: DateTime<Utc>,
    /// Exclusive end of the validity window.
    pub valid_until: DateTime<Utc>,
    pub usage_limit: u32,
    /// Display mirror of successful redemptions; never used to enforce the limit.
    #[serde(default)]
    pub used_count: u32,
    pub is_active: bool,
    /// Restricts the coupon to one restaurant; `None` means platform-wide.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restaurant_id: Option<String>,
}

/// Mutable coupon fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CouponPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub used_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

impl Patch for CouponPatch {}
