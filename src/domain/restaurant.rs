//! Restaurants, menu items and customer addresses.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::AddressSnapshot;
use crate::documents::Patch;
use crate::geo::GeoPoint;

/// Restaurant is a merchant accepting orders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Restaurant {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Whether the restaurant currently accepts orders.
    pub is_online: bool,
    /// Typical preparation time in minutes.
    #[serde(default)]
    pub avg_prep_time_min: Option<u32>,
    #[serde(default)]
    pub rating: f64,
    #[serde(default)]
    pub total_ratings: u32,
}

impl Restaurant {
    pub fn location(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }
}

/// Mutable restaurant fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RestaurantPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_online: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_ratings: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Patch for RestaurantPatch {}

/// MenuItem carries the authoritative price of a dish.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuItem {
    pub id: String,
    pub restaurant_id: String,
    pub name: String,
    pub price: Decimal,
    #[serde(default)]
    pub is_veg: bool,
    pub is_available: bool,
}

/// Address is a customer's saved delivery address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Address {
    pub id: String,
    pub user_id: String,
    pub label: String,
    pub address_line_1: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_line_2: Option<String>,
    pub city: String,
    pub pincode: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl Address {
    pub fn location(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }

    pub fn snapshot(&self) -> AddressSnapshot {
        AddressSnapshot {
            address_id: self.id.clone(),
            label: self.label.clone(),
            address_line_1: self.address_line_1.clone(),
            address_line_2: self.address_line_2.clone(),
            city: self.city.clone(),
            pincode: self.pincode.clone(),
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }
}
