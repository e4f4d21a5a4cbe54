use chrono::NaiveTime;
use pendel_shared::Direction;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Recurring weekly ride template. One row per (user, weekday, direction);
/// the schedule expander projects these into concrete future rides.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduleTemplate {
    pub user_id: Uuid,
    /// 0 = Monday .. 6 = Sunday, matching `chrono::Weekday::num_days_from_monday`.
    pub day_of_week: u8,
    pub direction: Direction,
    pub arrival_time: NaiveTime,
}

impl ScheduleTemplate {
    pub fn new(user_id: Uuid, day_of_week: u8, direction: Direction, arrival_time: NaiveTime) -> Self {
        Self {
            user_id,
            day_of_week,
            direction,
            arrival_time,
        }
    }
}
