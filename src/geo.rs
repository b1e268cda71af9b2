//! Great-circle distance and service-radius checks.

use serde::{Deserialize, Serialize};

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Approximate kilometres per degree of latitude used by the bounding-box prefilter.
///
/// Slightly below the true value so the box always contains the radius circle.
const KM_PER_DEGREE: f64 = 111.0;

/// Average courier speed in km/h.
const AVERAGE_SPEED_KMH: f64 = 25.0;

/// Fixed pickup buffer added to every ETA, in minutes.
const PICKUP_BUFFER_MIN: u32 = 5;

/// A latitude/longitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Finite and within [-90, 90] x [-180, 180].
    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.latitude) && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// Lat/lng bounds around a center point.
///
/// Longitude bounds may extend past +/-180 when the box straddles the
/// antimeridian; `contains` wraps the probed longitude accordingly.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl BoundingBox {
    /// Box enclosing a circle of `radius_km` around `center`.
    pub fn around(center: GeoPoint, radius_km: f64) -> Self {
        let lat_delta = radius_km / KM_PER_DEGREE;
        let lng_delta = radius_km / (KM_PER_DEGREE * center.latitude.to_radians().cos());

        Self {
            min_lat: center.latitude - lat_delta,
            max_lat: center.latitude + lat_delta,
            min_lng: center.longitude - lng_delta,
            max_lng: center.longitude + lng_delta,
        }
    }

    pub fn contains(&self, point: GeoPoint) -> bool {
        if point.latitude < self.min_lat || point.latitude > self.max_lat {
            return false;
        }
        let lng = point.longitude;
        [lng, lng - 360.0, lng + 360.0]
            .into_iter()
            .any(|l| l >= self.min_lng && l <= self.max_lng)
    }
}

/// Haversine distance between two points in kilometres.
pub fn haversine_km(from: GeoPoint, to: GeoPoint) -> f64 {
    let d_lat = (to.latitude - from.latitude).to_radians();
    let d_lng = (to.longitude - from.longitude).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + from.latitude.to_radians().cos()
            * to.latitude.to_radians().cos()
            * (d_lng / 2.0).sin().powi(2);

    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_KM * c
}

/// Returns the distance when `to` lies within `radius_km` of `from`.
///
/// The cheap bounding-box test runs first; only points inside the box are
/// refined with the haversine formula.
pub fn within_radius(from: GeoPoint, to: GeoPoint, radius_km: f64) -> Option<f64> {
    if !BoundingBox::around(from, radius_km).contains(to) {
        return None;
    }

    let distance = haversine_km(from, to);
    (distance <= radius_km).then_some(distance)
}

/// Estimated minutes until delivery: preparation plus travel plus pickup buffer.
pub fn estimate_delivery_minutes(distance_km: f64, prep_time_min: u32) -> u32 {
    let travel = (distance_km / AVERAGE_SPEED_KMH * 60.0).ceil().max(0.0) as u32;
    prep_time_min + travel + PICKUP_BUFFER_MIN
}
