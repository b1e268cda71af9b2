//! Payment attempts recorded against orders.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::PaymentStatus;
use crate::documents::Patch;

/// PaymentRecord links an order to a gateway order.
///
/// Stored under the gateway order id so webhook events resolve directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub id: String,
    pub order_id: String,
    pub customer_id: String,
    /// Amount in minor currency units (paise).
    pub amount_minor: i64,
    pub currency: String,
    pub status: PaymentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Mutable payment fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PaymentPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<PaymentStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Patch for PaymentPatch {}
