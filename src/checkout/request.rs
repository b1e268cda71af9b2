use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::CheckoutError;

const MAX_QUANTITY: u32 = 50;
const MAX_TOKEN_LEN: usize = 255;

/// One requested cart line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    pub menu_item_id: String,
    pub quantity: u32,
    /// Price the client displayed. Never used for pricing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Decimal>,
}

impl CartItem {
    pub fn new(menu_item_id: impl Into<String>, quantity: u32) -> Self {
        Self {
            menu_item_id: menu_item_id.into(),
            quantity,
            price: None,
        }
    }
}

/// Body of `POST /orders`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceOrderRequest {
    pub restaurant_id: String,
    pub address_id: String,
    pub items: Vec<CartItem>,
    pub payment_method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coupon_code: Option<String>,
    #[serde(default)]
    pub tip: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub special_instructions: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_instructions: Option<String>,
}

impl PlaceOrderRequest {
    pub fn validate(&self) -> Result<(), CheckoutError> {
        if self.restaurant_id.trim().is_empty() {
            return Err(invalid("restaurant_id is required"));
        }
        if self.address_id.trim().is_empty() {
            return Err(invalid("address_id is required"));
        }
        if self.payment_method.trim().is_empty() {
            return Err(invalid("payment_method is required"));
        }
        if self.items.is_empty() {
            return Err(invalid("at least one item is required"));
        }
        for item in &self.items {
            if item.menu_item_id.trim().is_empty() {
                return Err(invalid("menu_item_id is required"));
            }
            if item.quantity == 0 || item.quantity > MAX_QUANTITY {
                return Err(invalid(format!(
                    "quantity for {} must be between 1 and {}",
                    item.menu_item_id, MAX_QUANTITY
                )));
            }
        }
        Ok(())
    }

    /// Coupon code with surrounding whitespace removed; blank means none.
    pub fn coupon(&self) -> Option<&str> {
        self.coupon_code
            .as_deref()
            .map(str::trim)
            .filter(|code| !code.is_empty())
    }
}

/// Normalizes a client idempotency token. An empty token counts as absent.
pub fn normalize_token(token: Option<&str>) -> Result<Option<&str>, CheckoutError> {
    match token.map(str::trim) {
        None | Some("") => Ok(None),
        Some(t) if t.len() > MAX_TOKEN_LEN => Err(invalid(format!(
            "idempotency token longer than {} characters",
            MAX_TOKEN_LEN
        ))),
        Some(t) => Ok(Some(t)),
    }
}

fn invalid(msg: impl Into<String>) -> CheckoutError {
    CheckoutError::Validation(msg.into())
}
