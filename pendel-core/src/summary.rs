use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Daily capacity snapshot, recomputed and upserted for reporting.
/// Never consulted for admission; admission re-derives from live counters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DailySummary {
    pub date: NaiveDate,
    pub premium_booked: i64,
    pub non_premium_booked: i64,
    pub computed_non_premium_capacity: i64,
    pub premium_load_pct: f64,
}
