//! Fee schedule configuration.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;

/// Fee schedule. Amounts are decimal strings (e.g., "299").
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FeeConfig {
    /// Item subtotal at or above which delivery is free.
    #[serde(default = "default_free_delivery_threshold")]
    pub free_delivery_threshold: Decimal,
    /// Delivery charge per kilometre.
    #[serde(default = "default_per_km_rate")]
    pub per_km_rate: Decimal,
    #[serde(default = "default_min_delivery_fee")]
    pub min_delivery_fee: Decimal,
    #[serde(default = "default_max_delivery_fee")]
    pub max_delivery_fee: Decimal,
    /// Flat platform fee per order.
    #[serde(default = "default_platform_fee")]
    pub platform_fee: Decimal,
    /// Tax rate on the item subtotal as a decimal (e.g., "0.05" for 5%).
    #[serde(default = "default_tax_rate")]
    pub tax_rate: Decimal,
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            free_delivery_threshold: default_free_delivery_threshold(),
            per_km_rate: default_per_km_rate(),
            min_delivery_fee: default_min_delivery_fee(),
            max_delivery_fee: default_max_delivery_fee(),
            platform_fee: default_platform_fee(),
            tax_rate: default_tax_rate(),
        }
    }
}

fn default_free_delivery_threshold() -> Decimal {
    dec!(299)
}

fn default_per_km_rate() -> Decimal {
    dec!(8)
}

fn default_min_delivery_fee() -> Decimal {
    dec!(20)
}

fn default_max_delivery_fee() -> Decimal {
    dec!(80)
}

fn default_platform_fee() -> Decimal {
    dec!(5)
}

fn default_tax_rate() -> Decimal {
    dec!(0.05)
}
