use chrono::NaiveDate;
use pendel_core::repository::RideRepository;
use pendel_core::ride::Ride;
use pendel_core::rules::CapacityRules;
use pendel_shared::timeutil::hour_of;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::ScheduleError;

/// Ride count for one hour-of-day bucket.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct HourLoad {
    pub hour: u32,
    pub rides: i64,
    pub over_cap: bool,
}

/// Two consecutive rides of one user with less breathing room than the
/// configured gap: the second pickup follows the first arrival too closely.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TightChain {
    pub user_id: Uuid,
    pub first_ride: Uuid,
    pub second_ride: Uuid,
    pub gap_minutes: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DayLoadReport {
    pub date: NaiveDate,
    pub total_rides: usize,
    pub hour_loads: Vec<HourLoad>,
    pub tight_chains: Vec<TightChain>,
}

/// Read-only load reporting over one service day. Nothing here feeds back
/// into admission; the report exists for operators and the cron log.
pub struct LoadAnalyzer {
    rides: Arc<dyn RideRepository>,
    rules: CapacityRules,
}

impl LoadAnalyzer {
    pub fn new(rides: Arc<dyn RideRepository>, rules: CapacityRules) -> Self {
        Self { rides, rules }
    }

    pub async fn run_daily_load_analysis(
        &self,
        date: NaiveDate,
    ) -> Result<DayLoadReport, ScheduleError> {
        let mut rides: Vec<Ride> = self
            .rides
            .list_for_date(date)
            .await?
            .into_iter()
            .filter(|r| !r.status.is_cancellation())
            .collect();
        rides.sort_by_key(|r| r.pickup_time);

        let mut buckets = [0i64; 24];
        let mut by_user: HashMap<Uuid, Vec<&Ride>> = HashMap::new();
        for ride in &rides {
            buckets[hour_of(ride.pickup_time) as usize] += 1;
            by_user.entry(ride.user_id).or_default().push(ride);
        }

        let hour_loads: Vec<HourLoad> = buckets
            .iter()
            .enumerate()
            .filter(|(_, count)| **count > 0)
            .map(|(hour, count)| HourLoad {
                hour: hour as u32,
                rides: *count,
                over_cap: *count > self.rules.hourly_cap,
            })
            .collect();

        let mut tight_chains = Vec::new();
        for user_rides in by_user.values() {
            for pair in user_rides.windows(2) {
                let gap = (pair[1].pickup_time - pair[0].arrival_target).num_minutes();
                if gap < self.rules.tight_chain_gap_minutes {
                    tight_chains.push(TightChain {
                        user_id: pair[0].user_id,
                        first_ride: pair[0].id,
                        second_ride: pair[1].id,
                        gap_minutes: gap,
                    });
                }
            }
        }
        tight_chains.sort_by_key(|c| (c.user_id, c.first_ride));

        let report = DayLoadReport {
            date,
            total_rides: rides.len(),
            hour_loads,
            tight_chains,
        };
        if report.hour_loads.iter().any(|h| h.over_cap) || !report.tight_chains.is_empty() {
            warn!(
                %date,
                total = report.total_rides,
                overloaded_hours = report.hour_loads.iter().filter(|h| h.over_cap).count(),
                tight_chains = report.tight_chains.len(),
                "daily load analysis found pressure points"
            );
        } else {
            info!(%date, total = report.total_rides, "daily load analysis clean");
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveTime};
    use pendel_core::ride::RideStatus;
    use pendel_shared::timeutil::instant_on;
    use pendel_shared::{GeoPoint, PlanType, RideType};
    use pendel_store::MemoryStore;

    fn ride_at(user: Uuid, date: NaiveDate, pickup: NaiveTime, trip_minutes: i64) -> Ride {
        let pickup_time = instant_on(date, pickup);
        Ride::new(
            user,
            GeoPoint::new(52.52, 13.40, "a"),
            GeoPoint::new(52.50, 13.45, "b"),
            pickup_time,
            pickup_time + Duration::minutes(trip_minutes),
            RideType::Standard,
            PlanType::Standard,
            None,
            10,
        )
    }

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[tokio::test]
    async fn flags_hours_over_the_cap() {
        let store = Arc::new(MemoryStore::new());
        let date = NaiveDate::from_ymd_opt(2026, 9, 21).unwrap();
        for i in 0..7 {
            RideRepository::insert(&*store, &ride_at(Uuid::new_v4(), date, t(8, i), 20))
                .await
                .unwrap();
        }
        RideRepository::insert(&*store, &ride_at(Uuid::new_v4(), date, t(11, 0), 20))
            .await
            .unwrap();

        let analyzer = LoadAnalyzer::new(store, CapacityRules::default());
        let report = analyzer.run_daily_load_analysis(date).await.unwrap();

        assert_eq!(report.total_rides, 8);
        let eight = report.hour_loads.iter().find(|h| h.hour == 8).unwrap();
        assert_eq!(eight.rides, 7);
        assert!(eight.over_cap);
        let eleven = report.hour_loads.iter().find(|h| h.hour == 11).unwrap();
        assert!(!eleven.over_cap);
    }

    #[tokio::test]
    async fn detects_tight_chains_per_user() {
        let store = Arc::new(MemoryStore::new());
        let date = NaiveDate::from_ymd_opt(2026, 9, 21).unwrap();
        let hurried = Uuid::new_v4();
        let relaxed = Uuid::new_v4();

        // First ride arrives 09:00; the next pickup at 09:10 leaves a 10
        // minute gap, under the 15 minute threshold.
        let first = ride_at(hurried, date, t(8, 40), 20);
        let second = ride_at(hurried, date, t(9, 10), 20);
        RideRepository::insert(&*store, &first).await.unwrap();
        RideRepository::insert(&*store, &second).await.unwrap();

        RideRepository::insert(&*store, &ride_at(relaxed, date, t(10, 0), 20))
            .await
            .unwrap();
        RideRepository::insert(&*store, &ride_at(relaxed, date, t(14, 0), 20))
            .await
            .unwrap();

        let analyzer = LoadAnalyzer::new(store, CapacityRules::default());
        let report = analyzer.run_daily_load_analysis(date).await.unwrap();

        assert_eq!(report.tight_chains.len(), 1);
        let chain = &report.tight_chains[0];
        assert_eq!(chain.user_id, hurried);
        assert_eq!(chain.first_ride, first.id);
        assert_eq!(chain.second_ride, second.id);
        assert_eq!(chain.gap_minutes, 10);
    }

    #[tokio::test]
    async fn cancelled_rides_are_ignored() {
        let store = Arc::new(MemoryStore::new());
        let date = NaiveDate::from_ymd_opt(2026, 9, 21).unwrap();
        let mut cancelled = ride_at(Uuid::new_v4(), date, t(9, 0), 20);
        cancelled.status = RideStatus::CancelledByUser;
        RideRepository::insert(&*store, &cancelled).await.unwrap();

        let analyzer = LoadAnalyzer::new(store, CapacityRules::default());
        let report = analyzer.run_daily_load_analysis(date).await.unwrap();

        assert_eq!(report.total_rides, 0);
        assert!(report.hour_loads.is_empty());
        assert!(report.tight_chains.is_empty());
    }
}
