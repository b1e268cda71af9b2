//! Domain models for orders, restaurants, couriers, coupons and payments.

mod actor;
mod coupon;
mod courier;
mod order;
mod payment;
mod restaurant;
mod review;

pub use actor::{Actor, Role};
pub use coupon::{Coupon, CouponPatch, DiscountType};
pub use courier::{CourierPatch, DeliveryPartner};
pub use order::{AddressSnapshot, LineItem, Order, OrderPatch, OrderStatus, PaymentStatus};
pub use payment::{PaymentPatch, PaymentRecord};
pub use restaurant::{Address, MenuItem, Restaurant, RestaurantPatch};
pub use review::Review;

/// Returned when parsing an unknown enum variant from a string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}
