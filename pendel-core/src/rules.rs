use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

/// Numeric tuning values for admission and billing. Loaded from layered
/// configuration by the store crate; defaults mirror the production service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapacityRules {
    /// Slot width in minutes.
    pub slot_minutes: u32,
    /// Operating window, local clock.
    pub day_start: NaiveTime,
    pub day_end: NaiveTime,
    /// Commute windows with premium-only access.
    pub peak_windows: Vec<(NaiveTime, NaiveTime)>,
    pub max_premium_per_slot: i32,
    pub max_non_premium_per_slot: i32,
    /// Base non-premium units contributed by one off-peak slot when deriving
    /// the day-level ceiling.
    pub base_per_slot: f64,
    /// Hard cap on rides admitted per day across both tiers.
    pub daily_max: i32,
    /// Premium-load thresholds and the non-premium reduction applied at each,
    /// ordered ascending by threshold.
    pub reduction_steps: Vec<(f64, f64)>,
    pub premium_subscriber_ceiling: i64,
    pub hold_ttl_minutes: i64,
    pub free_wait_minutes: i64,
    pub wait_charge_cents_per_minute: i64,
    pub half_refund_late_minutes: i64,
    pub full_refund_late_minutes: i64,
    pub hourly_cap: i64,
    pub overlap_buffer_minutes: i64,
    pub arrive_early_buffer_minutes: i64,
    /// Total width of the pickup/arrival windows stamped onto new rides.
    pub ride_window_minutes: i64,
    pub tight_chain_gap_minutes: i64,
    pub monthly_standard_credits: i32,
    pub monthly_standard_credits_peak_plan: i32,
    pub monthly_grocery_credits: i32,
}

impl Default for CapacityRules {
    fn default() -> Self {
        Self {
            slot_minutes: 5,
            day_start: NaiveTime::from_hms_opt(6, 0, 0).unwrap_or_default(),
            day_end: NaiveTime::from_hms_opt(22, 0, 0).unwrap_or_default(),
            peak_windows: vec![
                (
                    NaiveTime::from_hms_opt(7, 0, 0).unwrap_or_default(),
                    NaiveTime::from_hms_opt(9, 0, 0).unwrap_or_default(),
                ),
                (
                    NaiveTime::from_hms_opt(17, 0, 0).unwrap_or_default(),
                    NaiveTime::from_hms_opt(19, 0, 0).unwrap_or_default(),
                ),
            ],
            max_premium_per_slot: 2,
            max_non_premium_per_slot: 2,
            base_per_slot: 2.0,
            daily_max: 60,
            reduction_steps: vec![(0.4, 0.10), (0.6, 0.25), (0.8, 0.50)],
            premium_subscriber_ceiling: 20,
            hold_ttl_minutes: 5,
            free_wait_minutes: 5,
            wait_charge_cents_per_minute: 50,
            half_refund_late_minutes: 5,
            full_refund_late_minutes: 10,
            hourly_cap: 6,
            overlap_buffer_minutes: 30,
            arrive_early_buffer_minutes: 10,
            ride_window_minutes: 10,
            tight_chain_gap_minutes: 15,
            monthly_standard_credits: 20,
            monthly_standard_credits_peak_plan: 40,
            monthly_grocery_credits: 4,
        }
    }
}

impl CapacityRules {
    /// A time is peak when it falls inside one of the commute windows,
    /// start-inclusive and end-exclusive.
    pub fn is_peak_time(&self, time: NaiveTime) -> bool {
        self.peak_windows
            .iter()
            .any(|(start, end)| time >= *start && time < *end)
    }

    /// Non-premium capacity reduction for a given premium load fraction.
    /// Monotonic step function: the highest threshold at or below the load
    /// wins.
    pub fn reduction_for_load(&self, load: f64) -> f64 {
        let mut reduction = 0.0;
        for (threshold, step) in &self.reduction_steps {
            if load >= *threshold {
                reduction = *step;
            }
        }
        reduction
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peak_window_edges() {
        let rules = CapacityRules::default();
        let t = |h, m| NaiveTime::from_hms_opt(h, m, 0).unwrap();
        assert!(rules.is_peak_time(t(7, 0)));
        assert!(rules.is_peak_time(t(8, 55)));
        assert!(!rules.is_peak_time(t(9, 0)));
        assert!(rules.is_peak_time(t(17, 30)));
        assert!(!rules.is_peak_time(t(12, 0)));
    }

    #[test]
    fn reduction_steps_are_monotonic() {
        let rules = CapacityRules::default();
        assert_eq!(rules.reduction_for_load(0.1), 0.0);
        assert_eq!(rules.reduction_for_load(0.4), 0.10);
        assert_eq!(rules.reduction_for_load(0.65), 0.25);
        assert_eq!(rules.reduction_for_load(0.8), 0.50);
        assert_eq!(rules.reduction_for_load(1.0), 0.50);
    }
}
