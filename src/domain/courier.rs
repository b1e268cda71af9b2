//! Delivery partner profiles.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::documents::Patch;
use crate::geo::GeoPoint;

/// DeliveryPartner is a courier's profile, linked to a user account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryPartner {
    pub id: String,
    pub user_id: String,
    #[serde(default)]
    pub vehicle_type: String,
    pub is_online: bool,
    #[serde(default)]
    pub rating: f64,
    #[serde(default)]
    pub total_deliveries: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_longitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_location_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl DeliveryPartner {
    /// Last reported position, if the courier has sent one.
    pub fn location(&self) -> Option<GeoPoint> {
        Some(GeoPoint::new(self.current_latitude?, self.current_longitude?))
    }
}

/// Mutable courier fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CourierPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_online: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_deliveries: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_longitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_location_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Patch for CourierPatch {}
