//! Delivery fee, platform fee and tax computation.
//!
//! Pure functions of their inputs: no I/O, no clock, no randomness.

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::config::FeeConfig;

/// Rounds a money amount to currency precision (2 dp, half away from zero).
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Fees charged on top of the item subtotal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fees {
    pub delivery_fee: Decimal,
    pub platform_fee: Decimal,
    pub tax: Decimal,
}

/// Fee schedule applied to every checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeeEngine {
    free_delivery_threshold: Decimal,
    per_km_rate: Decimal,
    min_delivery_fee: Decimal,
    max_delivery_fee: Decimal,
    platform_fee: Decimal,
    tax_rate: Decimal,
}

impl FeeEngine {
    pub fn new(config: &FeeConfig) -> Self {
        Self {
            free_delivery_threshold: config.free_delivery_threshold,
            per_km_rate: config.per_km_rate,
            min_delivery_fee: config.min_delivery_fee,
            max_delivery_fee: config.max_delivery_fee,
            platform_fee: config.platform_fee,
            tax_rate: config.tax_rate,
        }
    }

    /// Computes fees for an item subtotal delivered over `distance_km`.
    pub fn compute(&self, item_subtotal: Decimal, distance_km: f64) -> Fees {
        Fees {
            delivery_fee: self.delivery_fee(item_subtotal, distance_km),
            platform_fee: self.platform_fee,
            tax: round_money(item_subtotal * self.tax_rate),
        }
    }

    fn delivery_fee(&self, item_subtotal: Decimal, distance_km: f64) -> Decimal {
        if item_subtotal >= self.free_delivery_threshold {
            return Decimal::ZERO;
        }

        let distance = Decimal::from_f64(distance_km.max(0.0)).unwrap_or(Decimal::ZERO);
        (distance * self.per_km_rate)
            .ceil()
            .clamp(self.min_delivery_fee, self.max_delivery_fee)
    }
}

impl Default for FeeEngine {
    fn default() -> Self {
        Self::new(&FeeConfig::default())
    }
}
