use chrono::{DateTime, Utc};

use crate::engine::features::age_days;

/// `0.5^(age / half_life)`, clamped to `[0, 1]`.
pub fn half_life_decay(age_days: f64, half_life_days: f64) -> f64 {
    if half_life_days.is_nan() || half_life_days <= 0.0 {
        return 0.0;
    }
    0.5_f64
        .powf(age_days.max(0.0) / half_life_days)
        .clamp(0.0, 1.0)
}

/// Decay of the most recent event, aged against `now`. No event means no
/// penalty.
pub fn event_decay(latest: Option<DateTime<Utc>>, now: DateTime<Utc>, half_life_days: f64) -> f64 {
    match latest {
        Some(at) => half_life_decay(age_days(at, now), half_life_days),
        None => 0.0,
    }
}
