//! Serde adapter for TTLs and timeouts written as "250ms", "30s", "5m", "24h" or "30d".
//!
//! A value without a unit, such as "45", is read as seconds. An empty or null
//! value means zero, which validation rejects for every TTL that must be positive.

use serde::{Deserialize, Deserializer};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DurationError {
    #[error("invalid duration number in {0:?}")]
    Number(String),

    #[error("unknown duration unit {unit:?} in {input:?} (expected ms, s, m, h or d)")]
    Unit { input: String, unit: String },
}

const UNITS: [(&str, f64); 5] = [
    ("ms", 1e-3),
    ("s", 1.0),
    ("m", 60.0),
    ("h", 3600.0),
    ("d", 86400.0),
];

pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(s) => parse_duration(&s).map_err(serde::de::Error::custom),
        None => Ok(Duration::ZERO),
    }
}

pub(crate) fn parse_duration(input: &str) -> Result<Duration, DurationError> {
    let s = input.trim();
    if s.is_empty() {
        return Ok(Duration::ZERO);
    }

    let split = s
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(s.len());
    let (number, unit) = s.split_at(split);

    let value: f64 = number
        .parse()
        .map_err(|_| DurationError::Number(input.to_string()))?;

    let unit = unit.trim();
    let seconds_per_unit = if unit.is_empty() {
        1.0
    } else {
        UNITS
            .iter()
            .find(|(name, _)| *name == unit)
            .map(|(_, secs)| *secs)
            .ok_or_else(|| DurationError::Unit {
                input: input.to_string(),
                unit: unit.to_string(),
            })?
    };

    Ok(Duration::from_secs_f64(value * seconds_per_unit))
}
