use chrono::{DateTime, Utc};

/// Short human-legible order number: `{prefix}-{time}-{random}`.
///
/// Not guaranteed unique; the document id is the order's identity.
pub fn generate(prefix: &str, now: DateTime<Utc>) -> String {
    let time_part = now.timestamp_millis().rem_euclid(1_000_000);
    let random_part = hex::encode(rand::random::<[u8; 3]>());
    format!("{}-{:06}-{}", prefix, time_part, random_part)
}
