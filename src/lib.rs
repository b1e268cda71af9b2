//! Checkout and fulfillment core for a food-delivery platform.
//!
//! Pricing, coupon redemption, idempotent order placement, the order state
//! machine, courier assignment and payment settlement, over pluggable document
//! and coordination stores.

pub mod api;
pub mod app;
pub mod background;
pub mod checkout;
pub mod config;
pub mod coordination;
pub mod coupon;
pub mod deadline;
pub mod delivery;
pub mod documents;
pub mod domain;
pub mod error;
pub mod fees;
pub mod geo;
pub mod lifecycle;
pub mod notification;
pub mod partner;
pub mod payment;
pub mod ratelimit;
pub mod review;

#[cfg(test)]
mod testing;
