//! Checkout pipeline: turns a cart into a priced, persisted order.
//!
//! Every verification runs before anything is written, so a failed checkout
//! never leaves a partial order behind.

mod idempotency;
pub mod order_number;
mod request;

pub use idempotency::IdempotencyCache;
pub use request::{CartItem, PlaceOrderRequest, normalize_token};

use chrono::Utc;
use futures_util::future::try_join_all;
use rust_decimal::Decimal;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::CheckoutConfig;
use crate::coordination::CoordinationStore;
use crate::coupon::CouponLedger;
use crate::deadline::{Deadline, DeadlineExceeded};
use crate::documents::{Collection, DocumentStore, DocumentStoreExt, StoreError};
use crate::domain::{
    Address, LineItem, MenuItem, Order, OrderStatus, PaymentStatus, Restaurant,
};
use crate::error::{ApiError, ErrorKind};
use crate::fees::{FeeEngine, round_money};
use crate::geo;
use crate::notification::{Event, Notifier, OrderPlacedData};

/// Checkout failure. No order is persisted when one is returned.
#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("restaurant {0} not found")]
    RestaurantNotFound(String),

    #[error("restaurant {0} is offline")]
    RestaurantUnavailable(String),

    #[error("address {0} not found")]
    AddressNotFound(String),

    #[error("address {0} belongs to another user")]
    Forbidden(String),

    #[error("menu item {0} not found")]
    ItemNotFound(String),

    #[error("menu item {0} is unavailable")]
    ItemUnavailable(String),

    #[error("menu item {item} does not belong to restaurant {restaurant}")]
    ItemRestaurantMismatch { item: String, restaurant: String },

    #[error("delivery address is {distance_km:.2} km away, limit is {max_km} km")]
    OutOfRange { distance_km: f64, max_km: f64 },

    #[error(transparent)]
    Deadline(#[from] DeadlineExceeded),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ApiError for CheckoutError {
    fn kind(&self) -> ErrorKind {
        match self {
            CheckoutError::Validation(_)
            | CheckoutError::RestaurantUnavailable(_)
            | CheckoutError::ItemUnavailable(_)
            | CheckoutError::ItemRestaurantMismatch { .. }
            | CheckoutError::OutOfRange { .. } => ErrorKind::Validation,
            CheckoutError::RestaurantNotFound(_)
            | CheckoutError::AddressNotFound(_)
            | CheckoutError::ItemNotFound(_) => ErrorKind::NotFound,
            CheckoutError::Forbidden(_) => ErrorKind::Forbidden,
            CheckoutError::Deadline(e) => e.kind(),
            CheckoutError::Store(e) => e.kind(),
        }
    }

    fn reason(&self) -> &'static str {
        match self {
            CheckoutError::Validation(_) => "validation_error",
            CheckoutError::RestaurantNotFound(_) => "restaurant_not_found",
            CheckoutError::RestaurantUnavailable(_) => "restaurant_unavailable",
            CheckoutError::AddressNotFound(_) => "address_not_found",
            CheckoutError::Forbidden(_) => "forbidden",
            CheckoutError::ItemNotFound(_) => "item_not_found",
            CheckoutError::ItemUnavailable(_) => "item_unavailable",
            CheckoutError::ItemRestaurantMismatch { .. } => "item_restaurant_mismatch",
            CheckoutError::OutOfRange { .. } => "out_of_range",
            CheckoutError::Deadline(e) => e.reason(),
            CheckoutError::Store(e) => e.reason(),
        }
    }
}

/// Result of a checkout.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutOutcome {
    pub order: Order,
    /// Serialized order exactly as returned to the client and cached for replay.
    pub body: String,
    /// True when `body` came from the idempotency cache.
    pub replayed: bool,
}

/// Orchestrates verification, pricing, coupon redemption and persistence.
pub struct CheckoutService {
    documents: Arc<dyn DocumentStore>,
    coupons: Arc<CouponLedger>,
    idempotency: IdempotencyCache,
    fees: FeeEngine,
    notifier: Arc<dyn Notifier>,
    max_radius_km: f64,
    order_number_prefix: String,
    default_prep_time_min: u32,
}

impl CheckoutService {
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        coordination: Arc<dyn CoordinationStore>,
        coupons: Arc<CouponLedger>,
        fees: FeeEngine,
        notifier: Arc<dyn Notifier>,
        config: &CheckoutConfig,
    ) -> Self {
        Self {
            documents,
            coupons,
            idempotency: IdempotencyCache::new(coordination, config.idempotency_ttl),
            fees,
            notifier,
            max_radius_km: config.max_radius_km,
            order_number_prefix: config.order_number_prefix.clone(),
            default_prep_time_min: config.default_prep_time_min,
        }
    }

    /// Places an order for `customer_id`.
    ///
    /// With a token, a repeated call inside the cache window returns the cached
    /// body unchanged and performs no side effects. The whole pipeline is
    /// cancelled when `deadline` passes.
    pub async fn place_order(
        &self,
        customer_id: &str,
        request: &PlaceOrderRequest,
        idempotency_token: Option<&str>,
        deadline: Deadline,
    ) -> Result<CheckoutOutcome, CheckoutError> {
        let token = normalize_token(idempotency_token)?;
        deadline
            .run(self.run_pipeline(customer_id, request, token))
            .await?
    }

    async fn run_pipeline(
        &self,
        customer_id: &str,
        request: &PlaceOrderRequest,
        token: Option<&str>,
    ) -> Result<CheckoutOutcome, CheckoutError> {
        if let Some(token) = token {
            if let Some(outcome) = self.replay(customer_id, token).await {
                return Ok(outcome);
            }
        }

        request.validate()?;

        let restaurant: Restaurant = self
            .documents
            .find_by_id(Collection::Restaurants, &request.restaurant_id)
            .await?
            .ok_or_else(|| CheckoutError::RestaurantNotFound(request.restaurant_id.clone()))?;
        if !restaurant.is_online {
            return Err(CheckoutError::RestaurantUnavailable(restaurant.id));
        }

        let address: Address = self
            .documents
            .find_by_id(Collection::Addresses, &request.address_id)
            .await?
            .ok_or_else(|| CheckoutError::AddressNotFound(request.address_id.clone()))?;
        if address.user_id != customer_id {
            return Err(CheckoutError::Forbidden(address.id));
        }

        let items = self.price_items(request).await?;
        let item_subtotal: Decimal = items.iter().map(|item| item.line_total).sum();

        let distance_km = self.check_range(&restaurant, &address)?;
        let fees = self.fees.compute(item_subtotal, distance_km);

        let now = Utc::now();
        let redemption = match request.coupon() {
            Some(code) => self.coupons.apply(code, item_subtotal, &restaurant.id, now).await,
            None => None,
        };
        let discount = redemption
            .as_ref()
            .map(|r| r.discount)
            .unwrap_or(Decimal::ZERO);

        let tip = round_money(request.tip.max(Decimal::ZERO));
        let grand_total = round_money(
            item_subtotal + fees.delivery_fee + fees.platform_fee + fees.tax - discount + tip,
        );

        let prep_time = restaurant
            .avg_prep_time_min
            .filter(|min| *min > 0)
            .unwrap_or(self.default_prep_time_min);

        let order = Order {
            id: uuid::Uuid::new_v4().to_string(),
            order_number: order_number::generate(&self.order_number_prefix, now),
            customer_id: customer_id.to_string(),
            restaurant_id: restaurant.id.clone(),
            courier_id: None,
            items,
            delivery_address: address.snapshot(),
            item_subtotal,
            delivery_fee: fees.delivery_fee,
            platform_fee: fees.platform_fee,
            tax: fees.tax,
            discount,
            tip,
            grand_total,
            coupon_code: redemption.map(|r| r.code),
            payment_method: request.payment_method.trim().to_string(),
            payment_status: PaymentStatus::Pending,
            gateway_order_id: None,
            payment_id: None,
            status: OrderStatus::Placed,
            special_instructions: request.special_instructions.clone(),
            delivery_instructions: request.delivery_instructions.clone(),
            distance_km,
            estimated_delivery_min: geo::estimate_delivery_minutes(distance_km, prep_time),
            placed_at: now,
            confirmed_at: None,
            preparing_at: None,
            prepared_at: None,
            accepted_at: None,
            picked_up_at: None,
            out_for_delivery_at: None,
            delivered_at: None,
            cancelled_at: None,
            cancellation_reason: None,
            cancelled_by: None,
            updated_at: now,
        };

        let order: Order = self
            .documents
            .create_from(Collection::Orders, &order.id, &order)
            .await?;
        let body = serde_json::to_string(&order).map_err(StoreError::from)?;

        // Written after persistence; a retry landing in between creates a second order
        if let Some(token) = token {
            self.idempotency.store(customer_id, token, &body).await;
        }

        info!(
            order_id = %order.id,
            order_number = %order.order_number,
            customer_id = %customer_id,
            restaurant_id = %order.restaurant_id,
            grand_total = %order.grand_total,
            "Order placed"
        );

        self.notifier.send_async(Event::order_placed(OrderPlacedData {
            order_id: order.id.clone(),
            order_number: order.order_number.clone(),
            customer_id: order.customer_id.clone(),
            restaurant_id: order.restaurant_id.clone(),
            grand_total: order.grand_total,
        }));

        Ok(CheckoutOutcome {
            order,
            body,
            replayed: false,
        })
    }

    async fn replay(&self, customer_id: &str, token: &str) -> Option<CheckoutOutcome> {
        let body = self.idempotency.lookup(customer_id, token).await?;
        match serde_json::from_str::<Order>(&body) {
            Ok(order) => {
                info!(
                    order_id = %order.id,
                    customer_id = %customer_id,
                    "Idempotent replay of checkout response"
                );
                Some(CheckoutOutcome {
                    order,
                    body,
                    replayed: true,
                })
            }
            Err(e) => {
                warn!(customer_id = %customer_id, error = %e, "Ignoring unreadable cached checkout response");
                None
            }
        }
    }

    /// Prices every line from the authoritative menu. Client prices are ignored.
    async fn price_items(&self, request: &PlaceOrderRequest) -> Result<Vec<LineItem>, CheckoutError> {
        let lookups = request.items.iter().map(|line| {
            self.documents
                .find_by_id::<MenuItem>(Collection::MenuItems, &line.menu_item_id)
        });
        let menu = try_join_all(lookups).await?;

        let mut items = Vec::with_capacity(request.items.len());
        for (line, menu_item) in request.items.iter().zip(menu) {
            let menu_item =
                menu_item.ok_or_else(|| CheckoutError::ItemNotFound(line.menu_item_id.clone()))?;
            if !menu_item.is_available {
                return Err(CheckoutError::ItemUnavailable(menu_item.id));
            }
            if menu_item.restaurant_id != request.restaurant_id {
                return Err(CheckoutError::ItemRestaurantMismatch {
                    item: menu_item.id,
                    restaurant: request.restaurant_id.clone(),
                });
            }

            if let Some(client_price) = line.price {
                if client_price != menu_item.price {
                    debug!(
                        menu_item_id = %menu_item.id,
                        client_price = %client_price,
                        price = %menu_item.price,
                        "Client price ignored"
                    );
                }
            }

            items.push(LineItem {
                line_total: round_money(menu_item.price * Decimal::from(line.quantity)),
                menu_item_id: menu_item.id,
                name: menu_item.name,
                quantity: line.quantity,
                unit_price: menu_item.price,
                is_veg: menu_item.is_veg,
            });
        }
        Ok(items)
    }

    fn check_range(&self, restaurant: &Restaurant, address: &Address) -> Result<f64, CheckoutError> {
        let from = restaurant.location();
        let to = address.location();
        geo::within_radius(from, to, self.max_radius_km).ok_or_else(|| CheckoutError::OutOfRange {
            distance_km: geo::haversine_km(from, to),
            max_km: self.max_radius_km,
        })
    }
}
