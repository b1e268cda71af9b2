//! Shared fixtures for unit tests.

use chrono::{Duration as ChronoDuration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;

use crate::coordination::InMemoryCoordinationStore;
use crate::documents::{Collection, DocumentStore, DocumentStoreExt, InMemoryDocumentStore};
use crate::domain::{
    Address, Coupon, DeliveryPartner, DiscountType, LineItem, MenuItem, Order, OrderStatus,
    PaymentStatus, Restaurant,
};

pub(crate) const ORIGIN: (f64, f64) = (12.9716, 77.5946);

/// Kilometres per degree of latitude on the haversine sphere.
pub(crate) fn km_per_degree() -> f64 {
    6371.0 * std::f64::consts::PI / 180.0
}

/// Point `km` due north of the origin.
pub(crate) fn north_of_origin(km: f64) -> (f64, f64) {
    (ORIGIN.0 + km / km_per_degree(), ORIGIN.1)
}

pub(crate) struct Stores {
    pub documents: Arc<InMemoryDocumentStore>,
    pub coordination: Arc<InMemoryCoordinationStore>,
}

impl Stores {
    pub fn new() -> Self {
        Self {
            documents: Arc::new(InMemoryDocumentStore::new()),
            coordination: Arc::new(InMemoryCoordinationStore::new()),
        }
    }

    pub async fn seed<T>(&self, collection: Collection, id: &str, value: &T)
    where
        T: Serialize + DeserializeOwned + Send + Sync,
    {
        self.documents
            .create_from(collection, id, value)
            .await
            .expect("seed document");
    }

    pub async fn load<T: DeserializeOwned + Send>(&self, collection: Collection, id: &str) -> T {
        self.documents.get_as(collection, id).await.expect("load document")
    }

    pub async fn order(&self, id: &str) -> Order {
        self.load(Collection::Orders, id).await
    }

    pub fn document_store(&self) -> Arc<dyn DocumentStore> {
        self.documents.clone()
    }
}

pub(crate) fn restaurant(id: &str, owner_id: &str) -> Restaurant {
    Restaurant {
        id: id.to_string(),
        owner_id: owner_id.to_string(),
        name: format!("Restaurant {}", id),
        latitude: ORIGIN.0,
        longitude: ORIGIN.1,
        is_online: true,
        avg_prep_time_min: Some(20),
        rating: 0.0,
        total_ratings: 0,
    }
}

pub(crate) fn menu_item(id: &str, restaurant_id: &str, price: Decimal) -> MenuItem {
    MenuItem {
        id: id.to_string(),
        restaurant_id: restaurant_id.to_string(),
        name: format!("Item {}", id),
        price,
        is_veg: true,
        is_available: true,
    }
}

/// Address `km` north of the origin.
pub(crate) fn address(id: &str, user_id: &str, km: f64) -> Address {
    let (latitude, longitude) = north_of_origin(km);
    Address {
        id: id.to_string(),
        user_id: user_id.to_string(),
        label: "Home".to_string(),
        address_line_1: "12 MG Road".to_string(),
        address_line_2: None,
        city: "Bengaluru".to_string(),
        pincode: "560001".to_string(),
        latitude,
        longitude,
    }
}

/// Active platform-wide coupon valid from yesterday for thirty days.
pub(crate) fn coupon(id: &str, code: &str, discount_type: DiscountType, value: Decimal) -> Coupon {
    let now = Utc::now();
    Coupon {
        id: id.to_string(),
        code: code.to_string(),
        description: String::new(),
        discount_type,
        discount_value: value,
        max_discount: None,
        min_order_value: Decimal::ZERO,
        valid_from: now - ChronoDuration::days(1),
        valid_until: now + ChronoDuration::days(30),
        usage_limit: 100,
        used_count: 0,
        is_active: true,
        restaurant_id: None,
    }
}

/// Courier profile whose document id is `partner-{user_id}`.
pub(crate) fn courier(user_id: &str, is_online: bool) -> DeliveryPartner {
    DeliveryPartner {
        id: format!("partner-{}", user_id),
        user_id: user_id.to_string(),
        vehicle_type: "bike".to_string(),
        is_online,
        rating: 4.5,
        total_deliveries: 0,
        current_latitude: None,
        current_longitude: None,
        last_location_at: None,
        updated_at: None,
    }
}

/// Persisted-looking order in `status`.
pub(crate) fn order(id: &str, customer_id: &str, restaurant_id: &str, status: OrderStatus) -> Order {
    let now = Utc::now();
    Order {
        id: id.to_string(),
        order_number: format!("CHZ-000000-{}", id),
        customer_id: customer_id.to_string(),
        restaurant_id: restaurant_id.to_string(),
        courier_id: None,
        items: vec![LineItem {
            menu_item_id: "item-1".to_string(),
            name: "Item item-1".to_string(),
            quantity: 2,
            unit_price: dec!(125),
            line_total: dec!(250),
            is_veg: true,
        }],
        delivery_address: address("addr-1", customer_id, 6.0).snapshot(),
        item_subtotal: dec!(250),
        delivery_fee: dec!(48),
        platform_fee: dec!(5),
        tax: dec!(12.5),
        discount: Decimal::ZERO,
        tip: Decimal::ZERO,
        grand_total: dec!(315.5),
        coupon_code: None,
        payment_method: "upi".to_string(),
        payment_status: PaymentStatus::Pending,
        gateway_order_id: None,
        payment_id: None,
        status,
        special_instructions: None,
        delivery_instructions: None,
        distance_km: 6.0,
        estimated_delivery_min: 40,
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
    }
}
