//! Customer reviews of delivered orders.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Review is stored under the order id, so each order has at most one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub id: String,
    pub order_id: String,
    pub customer_id: String,
    pub restaurant_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub courier_id: Option<String>,
    /// 1 to 5.
    pub food_rating: u8,
    /// 1 to 5.
    pub delivery_rating: u8,
    #[serde(default)]
    pub review_text: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}
