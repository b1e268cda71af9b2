//! Orders, their line items and status enums.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{ParseEnumError, Role};
use crate::documents::Patch;
use crate::geo::GeoPoint;

/// OrderStatus is the fulfillment state of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Placed,
    Confirmed,
    Preparing,
    Ready,
    PickedUp,
    OutForDelivery,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 8] = [
        OrderStatus::Placed,
        OrderStatus::Confirmed,
        OrderStatus::Preparing,
        OrderStatus::Ready,
        OrderStatus::PickedUp,
        OrderStatus::OutForDelivery,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    /// Statuses reachable in one step.
    pub fn next_statuses(&self) -> &'static [OrderStatus] {
        use OrderStatus::*;
        match self {
            Placed => &[Confirmed, Cancelled],
            Confirmed => &[Preparing, Cancelled],
            Preparing => &[Ready, Cancelled],
            Ready => &[PickedUp],
            PickedUp => &[OutForDelivery],
            OutForDelivery => &[Delivered],
            Delivered | Cancelled => &[],
        }
    }

    pub fn can_transition_to(&self, to: OrderStatus) -> bool {
        self.next_statuses().contains(&to)
    }

    pub fn is_terminal(&self) -> bool {
        self.next_statuses().is_empty()
    }

    /// Role allowed to move an order into this status.
    pub fn required_role(&self) -> Option<Role> {
        match self {
            OrderStatus::Placed => None,
            OrderStatus::Confirmed | OrderStatus::Preparing | OrderStatus::Ready => {
                Some(Role::Restaurant)
            }
            OrderStatus::PickedUp | OrderStatus::OutForDelivery | OrderStatus::Delivered => {
                Some(Role::Courier)
            }
            OrderStatus::Cancelled => Some(Role::Customer),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Placed => "placed",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Preparing => "preparing",
            OrderStatus::Ready => "ready",
            OrderStatus::PickedUp => "picked_up",
            OrderStatus::OutForDelivery => "out_for_delivery",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ParseEnumError {
                kind: "order status",
                value: s.to_string(),
            })
    }
}

/// PaymentStatus tracks settlement of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Paid,
    Failed,
    Refunded,
}

impl PaymentStatus {
    /// Whether a gateway event may move the payment from `self` to `next`.
    ///
    /// A failed attempt can still be paid later; nothing moves backwards.
    pub fn can_become(&self, next: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, next),
            (Pending, Paid) | (Pending, Failed) | (Failed, Paid) | (Paid, Refunded)
        )
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        };
        write!(f, "{}", s)
    }
}

/// A priced line captured at checkout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub menu_item_id: String,
    pub name: String,
    pub quantity: u32,
    /// Authoritative menu price at the time of the order.
    pub unit_price: Decimal,
    pub line_total: Decimal,
    pub is_veg: bool,
}

/// Delivery address copied into the order so later edits do not alter it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressSnapshot {
    pub address_id: String,
    pub label: String,
    pub address_line_1: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_line_2: Option<String>,
    pub city: String,
    pub pincode: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl AddressSnapshot {
    pub fn location(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }
}

/// Order is a persisted customer order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    /// Human-legible reference; not guaranteed unique.
    pub order_number: String,
    pub customer_id: String,
    pub restaurant_id: String,
    /// Assigned courier's user id. Always serialized so `null` is queryable.
    #[serde(default)]
    pub courier_id: Option<String>,
    pub items: Vec<LineItem>,
    pub delivery_address: AddressSnapshot,

    pub item_subtotal: Decimal,
    pub delivery_fee: Decimal,
    pub platform_fee: Decimal,
    pub tax: Decimal,
    pub discount: Decimal,
    pub tip: Decimal,
    pub grand_total: Decimal,
    /// Set only when the coupon actually produced a discount.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coupon_code: Option<String>,

    pub payment_method: String,
    pub payment_status: PaymentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway_order_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<String>,

    pub status: OrderStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub special_instructions: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_instructions: Option<String>,
    pub distance_km: f64,
    pub estimated_delivery_min: u32,

    pub placed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preparing_at: Option<DateTime<Utc>>,
    /// Stamped when the order becomes ready.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prepared_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accepted_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picked_up_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub out_for_delivery_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivered_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancellation_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancelled_by: Option<Role>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Whether the given courier is assigned to this order.
    pub fn is_assigned_to(&self, courier_user_id: &str) -> bool {
        self.courier_id.as_deref() == Some(courier_user_id)
    }
}

/// Fields of an order that may change after placement.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OrderPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<OrderStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_status: Option<PaymentStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway_order_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub courier_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accepted_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preparing_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prepared_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub picked_up_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub out_for_delivery_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivered_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancellation_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled_by: Option<Role>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Patch for OrderPatch {}

impl OrderPatch {
    /// Moves the order into `status` and stamps the matching timestamp.
    pub fn transition(status: OrderStatus, now: DateTime<Utc>) -> Self {
        let mut patch = OrderPatch {
            status: Some(status),
            updated_at: Some(now),
            ..Default::default()
        };
        match status {
            OrderStatus::Placed => {}
            OrderStatus::Confirmed => patch.confirmed_at = Some(now),
            OrderStatus::Preparing => patch.preparing_at = Some(now),
            OrderStatus::Ready => patch.prepared_at = Some(now),
            OrderStatus::PickedUp => patch.picked_up_at = Some(now),
            OrderStatus::OutForDelivery => patch.out_for_delivery_at = Some(now),
            OrderStatus::Delivered => patch.delivered_at = Some(now),
            OrderStatus::Cancelled => patch.cancelled_at = Some(now),
        }
        patch
    }
}
