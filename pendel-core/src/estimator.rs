use chrono::{DateTime, Timelike, Utc};

/// Travel-time estimation, consumed by the schedule expander. Pure function
/// of distance and timestamp; implementations must be monotonic in distance
/// and never return less than the configured floor.
pub trait TravelEstimator: Send + Sync {
    fn estimate_minutes(&self, distance_km: f64, when: DateTime<Utc>) -> i64;
}

/// Flat-speed estimator with a commute-hour surcharge. Callers that need a
/// routing backend swap the trait implementation; the core never awaits a
/// network call here, so estimation always completes before any row is
/// locked.
#[derive(Debug, Clone)]
pub struct DefaultEstimator {
    pub base_speed_kmh: f64,
    pub rush_multiplier: f64,
    pub floor_minutes: i64,
}

impl Default for DefaultEstimator {
    fn default() -> Self {
        Self {
            base_speed_kmh: 30.0,
            rush_multiplier: 1.4,
            floor_minutes: 6,
        }
    }
}

impl TravelEstimator for DefaultEstimator {
    fn estimate_minutes(&self, distance_km: f64, when: DateTime<Utc>) -> i64 {
        let hour = when.time().hour();
        let rush = matches!(hour, 7..=8 | 17..=18);
        let multiplier = if rush { self.rush_multiplier } else { 1.0 };
        let minutes = (distance_km / self.base_speed_kmh * 60.0 * multiplier).ceil() as i64;
        minutes.max(self.floor_minutes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn estimate_has_a_floor() {
        let est = DefaultEstimator::default();
        let noon = Utc.with_ymd_and_hms(2026, 8, 26, 12, 0, 0).unwrap();
        assert_eq!(est.estimate_minutes(0.5, noon), 6);
    }

    #[test]
    fn estimate_is_monotonic_and_rush_aware() {
        let est = DefaultEstimator::default();
        let noon = Utc.with_ymd_and_hms(2026, 8, 26, 12, 0, 0).unwrap();
        let rush = Utc.with_ymd_and_hms(2026, 8, 26, 8, 0, 0).unwrap();
        let short = est.estimate_minutes(10.0, noon);
        let long = est.estimate_minutes(20.0, noon);
        assert!(long > short);
        assert!(est.estimate_minutes(10.0, rush) > short);
    }
}
