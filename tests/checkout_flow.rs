//! End-to-end flow over the in-memory stores: checkout, kitchen, courier,
//! payment and review.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use rust_decimal_macros::dec;
use std::sync::Arc;

use order_fulfillment::api::PageRequest;
use order_fulfillment::app::{App, Components};
use order_fulfillment::checkout::{CartItem, PlaceOrderRequest};
use order_fulfillment::config::Config;
use order_fulfillment::coordination::InMemoryCoordinationStore;
use order_fulfillment::documents::{Collection, DocumentStoreExt, InMemoryDocumentStore};
use order_fulfillment::domain::{
    Actor, Address, Coupon, DeliveryPartner, DiscountType, MenuItem, Order, OrderStatus,
    PaymentStatus, Restaurant,
};
use order_fulfillment::error::ApiError;
use order_fulfillment::notification::NoopNotifier;
use order_fulfillment::payment::{
    GatewayError, GatewayOrder, PaymentCallback, PaymentGateway, sign, to_minor_units,
};
use order_fulfillment::review::ReviewSubmission;

const CUSTOMER: &str = "cust-1";
const OWNER: &str = "owner-1";
const COURIER: &str = "courier-1";
const KEY_SECRET: &str = "integration-secret";

struct FakeGateway;

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_order(
        &self,
        amount_minor: i64,
        currency: &str,
        reference: &str,
    ) -> Result<GatewayOrder, GatewayError> {
        Ok(GatewayOrder {
            id: format!("gw_{}", reference),
            amount: amount_minor,
            currency: currency.to_string(),
            status: "created".into(),
            receipt: reference.to_string(),
        })
    }

    fn key_id(&self) -> &str {
        "key_integration"
    }
}

fn config() -> Config {
    let mut config: Config =
        serde_yaml::from_str("app:\n  name: integration\n  env: development\n").unwrap();
    config.payment.key_secret = KEY_SECRET.into();
    config.payment.webhook_secret = KEY_SECRET.into();
    config
}

async fn seed(documents: &InMemoryDocumentStore) {
    let now = Utc::now();

    let restaurant = Restaurant {
        id: "rest-1".into(),
        owner_id: OWNER.into(),
        name: "Dosa Corner".into(),
        latitude: 12.9716,
        longitude: 77.5946,
        is_online: true,
        avg_prep_time_min: Some(20),
        rating: 0.0,
        total_ratings: 0,
    };
    documents
        .create_from(Collection::Restaurants, "rest-1", &restaurant)
        .await
        .unwrap();

    let item = MenuItem {
        id: "item-1".into(),
        restaurant_id: "rest-1".into(),
        name: "Masala Dosa".into(),
        price: dec!(125),
        is_veg: true,
        is_available: true,
    };
    documents
        .create_from(Collection::MenuItems, "item-1", &item)
        .await
        .unwrap();

    // About 5 km north of the restaurant
    let address = Address {
        id: "addr-1".into(),
        user_id: CUSTOMER.into(),
        label: "Home".into(),
        address_line_1: "12 MG Road".into(),
        address_line_2: None,
        city: "Bengaluru".into(),
        pincode: "560001".into(),
        latitude: 13.0166,
        longitude: 77.5946,
    };
    documents
        .create_from(Collection::Addresses, "addr-1", &address)
        .await
        .unwrap();

    let coupon = Coupon {
        id: "coupon-1".into(),
        code: "WELCOME50".into(),
        description: "Flat 50 off".into(),
        discount_type: DiscountType::Flat,
        discount_value: dec!(50),
        max_discount: None,
        min_order_value: dec!(100),
        valid_from: now - ChronoDuration::days(1),
        valid_until: now + ChronoDuration::days(7),
        usage_limit: 10,
        used_count: 0,
        is_active: true,
        restaurant_id: None,
    };
    documents
        .create_from(Collection::Coupons, "coupon-1", &coupon)
        .await
        .unwrap();

    let courier = DeliveryPartner {
        id: "partner-1".into(),
        user_id: COURIER.into(),
        vehicle_type: "bike".into(),
        is_online: false,
        rating: 4.8,
        total_deliveries: 0,
        current_latitude: None,
        current_longitude: None,
        last_location_at: None,
        updated_at: None,
    };
    documents
        .create_from(Collection::DeliveryPartners, "partner-1", &courier)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_order_from_checkout_to_review() {
    let documents = Arc::new(InMemoryDocumentStore::new());
    seed(&documents).await;

    let app = App::new(
        config(),
        Components {
            documents: documents.clone(),
            coordination: Arc::new(InMemoryCoordinationStore::new()),
            gateway: Arc::new(FakeGateway),
            notifier: Arc::new(NoopNotifier),
        },
    );
    let services = app.services();
    let customer = Actor::customer(CUSTOMER);
    let owner = Actor::restaurant(OWNER);
    let courier = Actor::courier(COURIER);

    // Checkout
    let request = PlaceOrderRequest {
        restaurant_id: "rest-1".into(),
        address_id: "addr-1".into(),
        items: vec![CartItem::new("item-1", 2)],
        payment_method: "upi".into(),
        coupon_code: Some(" WELCOME50 ".into()),
        tip: dec!(20),
        special_instructions: Some("Extra chutney".into()),
        delivery_instructions: None,
    };
    let reply = app
        .handle_checkout("203.0.113.7", CUSTOMER, &request, Some("flow-1"))
        .await;
    assert_eq!(reply.status, 201);
    let created_bytes = serde_json::to_string(&reply.body).unwrap();
    let raw = reply.body.data.expect("order in envelope");
    let order: Order = serde_json::from_str(raw.get()).unwrap();

    assert_eq!(order.status, OrderStatus::Placed);
    assert_eq!(order.item_subtotal, dec!(250));
    assert_eq!(order.discount, dec!(50));
    assert_eq!(order.coupon_code.as_deref(), Some("WELCOME50"));
    assert_eq!(
        order.grand_total,
        order.item_subtotal + order.delivery_fee + order.platform_fee + order.tax
            - order.discount
            + order.tip
    );

    // Kitchen
    for status in [OrderStatus::Confirmed, OrderStatus::Preparing, OrderStatus::Ready] {
        services
            .orders
            .update_status(&owner, &order.id, status, app.request_deadline())
            .await
            .unwrap();
    }

    // Courier
    services
        .delivery
        .set_online(&courier, true, app.request_deadline())
        .await
        .unwrap();
    let available = services
        .delivery
        .available_orders(&courier, PageRequest::default(), app.request_deadline())
        .await
        .unwrap();
    assert_eq!(available.total, 1);

    let assigned = services
        .delivery
        .accept_order(&courier, &order.id, app.request_deadline())
        .await
        .unwrap();
    assert_eq!(assigned.courier_id.as_deref(), Some(COURIER));

    let again = services
        .delivery
        .accept_order(&courier, &order.id, app.request_deadline())
        .await
        .unwrap_err();
    assert_eq!(again.reason(), "already_assigned");

    for status in [
        OrderStatus::PickedUp,
        OrderStatus::OutForDelivery,
        OrderStatus::Delivered,
    ] {
        services
            .orders
            .update_status(&courier, &order.id, status, app.request_deadline())
            .await
            .unwrap();
    }

    // Payment
    let initiation = services
        .payments
        .initiate(&customer, &order.id, app.request_deadline())
        .await
        .unwrap();
    assert_eq!(Some(initiation.amount), to_minor_units(order.grand_total));
    assert!(initiation.amount > 0);

    let signature = sign(
        KEY_SECRET,
        format!("{}|{}", initiation.gateway_order_id, "pay_flow_1").as_bytes(),
    );
    services
        .payments
        .verify(
            &customer,
            &PaymentCallback {
                gateway_order_id: initiation.gateway_order_id.clone(),
                payment_id: "pay_flow_1".into(),
                signature,
            },
            app.request_deadline(),
        )
        .await
        .unwrap();

    // Review
    services
        .reviews
        .submit(
            &customer,
            &order.id,
            &ReviewSubmission {
                food_rating: 5,
                delivery_rating: 4,
                review_text: "Crisp dosa".into(),
                tags: vec![],
            },
            app.request_deadline(),
        )
        .await
        .unwrap();
    app.background().wait_idle().await;

    let stored: Order = documents.get_as(Collection::Orders, &order.id).await.unwrap();
    assert_eq!(stored.status, OrderStatus::Delivered);
    assert_eq!(stored.payment_status, PaymentStatus::Paid);
    assert!(stored.delivered_at.is_some());
    assert_eq!(stored.item_subtotal, dec!(250));

    let restaurant: Restaurant = documents
        .get_as(Collection::Restaurants, "rest-1")
        .await
        .unwrap();
    assert_eq!(restaurant.total_ratings, 1);
    assert!((restaurant.rating - 5.0).abs() < 1e-9);

    // Replaying the original checkout returns the original order
    let replay = app
        .handle_checkout("203.0.113.7", CUSTOMER, &request, Some("flow-1"))
        .await;
    assert_eq!(replay.status, 200);
    assert_eq!(serde_json::to_string(&replay.body).unwrap(), created_bytes);
}
