use chrono::{Datelike, NaiveDate};
use pendel_shared::{PlanType, RideType};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-user ride quota for one calendar month. Rows are created lazily on
/// first access; consumption is an atomic conditional debit in the store, so
/// `used` never passes `total`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreditPeriod {
    pub user_id: Uuid,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub standard_total: i32,
    pub standard_used: i32,
    pub grocery_total: i32,
    pub grocery_used: i32,
}

impl CreditPeriod {
    pub fn remaining(&self, kind: RideType) -> i32 {
        match kind {
            RideType::Standard => self.standard_total - self.standard_used,
            RideType::Grocery => self.grocery_total - self.grocery_used,
        }
    }

    pub fn has_credit(&self, kind: RideType) -> bool {
        self.remaining(kind) > 0
    }
}

/// Plan-dependent monthly allowances used when a period row is first created.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreditDefaults {
    pub standard_total: i32,
    pub grocery_total: i32,
}

impl CreditDefaults {
    pub fn for_plan(plan: PlanType, standard: i32, standard_peak: i32, grocery: i32) -> Self {
        let standard_total = if plan.has_peak_access() {
            standard_peak
        } else {
            standard
        };
        Self {
            standard_total,
            grocery_total: grocery,
        }
    }
}

/// Calendar-month bounds containing `date`: first day of the month through
/// first day of the next month, end-exclusive.
pub fn period_bounds(date: NaiveDate) -> (NaiveDate, NaiveDate) {
    let start = NaiveDate::from_ymd_opt(date.year(), date.month(), 1).unwrap_or(date);
    let end = if date.month() == 12 {
        NaiveDate::from_ymd_opt(date.year() + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(date.year(), date.month() + 1, 1)
    }
    .unwrap_or(start);
    (start, end)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn period_bounds_wrap_year() {
        let (start, end) = period_bounds(NaiveDate::from_ymd_opt(2026, 12, 15).unwrap());
        assert_eq!(start, NaiveDate::from_ymd_opt(2026, 12, 1).unwrap());
        assert_eq!(end, NaiveDate::from_ymd_opt(2027, 1, 1).unwrap());
    }

    #[test]
    fn defaults_reward_peak_plans() {
        let d = CreditDefaults::for_plan(PlanType::PeakStandard, 20, 40, 4);
        assert_eq!(d.standard_total, 40);
        let d = CreditDefaults::for_plan(PlanType::Standard, 20, 40, 4);
        assert_eq!(d.standard_total, 20);
    }
}
