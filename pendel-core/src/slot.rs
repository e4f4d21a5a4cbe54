use chrono::{NaiveDate, NaiveTime};
use pendel_shared::{Direction, ServiceTier, SlotType};
use serde::{Deserialize, Serialize};

/// A fixed-width arrival-time bucket for one direction, with independent
/// premium and non-premium capacity counters. Counters are mutated only by
/// the capacity ledger, through atomic conditional updates in the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Slot {
    pub slot_id: String,
    pub date: NaiveDate,
    pub direction: Direction,
    pub slot_type: SlotType,
    pub arrival_start: NaiveTime,
    pub arrival_end: NaiveTime,
    pub max_premium: i32,
    pub used_premium: i32,
    pub max_non_premium: i32,
    pub used_non_premium: i32,
    pub fragile: bool,
}

impl Slot {
    pub fn remaining(&self, tier: ServiceTier) -> i32 {
        match tier {
            ServiceTier::Premium => self.max_premium - self.used_premium,
            ServiceTier::NonPremium => self.max_non_premium - self.used_non_premium,
        }
    }

    pub fn has_room(&self, tier: ServiceTier) -> bool {
        self.remaining(tier) > 0
    }

    /// Capacity invariant: usage stays within [0, max] per tier and peak
    /// slots never carry non-premium capacity.
    pub fn invariant_holds(&self) -> bool {
        let bounds = (0..=self.max_premium).contains(&self.used_premium)
            && (0..=self.max_non_premium).contains(&self.used_non_premium);
        let peak_rule = self.slot_type != SlotType::Peak || self.max_non_premium == 0;
        bounds && peak_rule
    }
}

/// Deterministic slot identifier: `YYYY-MM-DD:direction:HHMM`. Derivable by
/// any caller without a store lookup.
pub fn derive_slot_id(date: NaiveDate, direction: Direction, arrival_start: NaiveTime) -> String {
    format!(
        "{}:{}:{}",
        date.format("%Y-%m-%d"),
        direction.as_str(),
        arrival_start.format("%H%M")
    )
}

/// Aggregate tier usage across one service day, the live input to the
/// capacity planner.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TierUsage {
    pub premium_used: i64,
    pub premium_max: i64,
    pub non_premium_used: i64,
    pub off_peak_slots: i64,
}

impl TierUsage {
    pub fn premium_load(&self) -> f64 {
        if self.premium_max == 0 {
            0.0
        } else {
            self.premium_used as f64 / self.premium_max as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_id_is_deterministic() {
        let date = NaiveDate::from_ymd_opt(2026, 8, 26).unwrap();
        let start = NaiveTime::from_hms_opt(6, 30, 0).unwrap();
        assert_eq!(
            derive_slot_id(date, Direction::ToWork, start),
            "2026-08-26:to_work:0630"
        );
    }

    #[test]
    fn invariant_rejects_peak_non_premium_capacity() {
        let date = NaiveDate::from_ymd_opt(2026, 8, 26).unwrap();
        let start = NaiveTime::from_hms_opt(7, 0, 0).unwrap();
        let mut slot = Slot {
            slot_id: derive_slot_id(date, Direction::ToWork, start),
            date,
            direction: Direction::ToWork,
            slot_type: SlotType::Peak,
            arrival_start: start,
            arrival_end: NaiveTime::from_hms_opt(7, 5, 0).unwrap(),
            max_premium: 2,
            used_premium: 0,
            max_non_premium: 0,
            used_non_premium: 0,
            fragile: false,
        };
        assert!(slot.invariant_holds());
        slot.max_non_premium = 2;
        assert!(!slot.invariant_holds());
    }

    #[test]
    fn premium_load_guards_zero_capacity() {
        let usage = TierUsage::default();
        assert_eq!(usage.premium_load(), 0.0);
    }
}
