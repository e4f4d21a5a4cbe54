use chrono::{Datelike, Duration, NaiveDate, Utc};
use pendel_core::credit::{period_bounds, CreditDefaults};
use pendel_core::error::AdmissionDenied;
use pendel_core::estimator::TravelEstimator;
use pendel_core::repository::{
    CreditRepository, RideRepository, RiderRepository, TemplateRepository,
};
use pendel_core::ride::Ride;
use pendel_core::rules::CapacityRules;
use pendel_shared::timeutil::{hour_of, instant_on};
use pendel_shared::{Direction, RideType};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::ScheduleError;

/// Counters for one expansion run. Skips are expected outcomes, not errors;
/// the caller only ever sees a hard failure when the store does.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpansionOutcome {
    pub created: usize,
    pub skipped_peak: usize,
    pub skipped_hourly_cap: usize,
    pub skipped_overlap: usize,
    /// The standard credit budget ran out and the rest of the user's
    /// templates were not considered.
    pub stopped_no_credit: bool,
    /// Every skipped projection with the admission reason that blocked it,
    /// in encounter order.
    pub skips: Vec<(NaiveDate, AdmissionDenied)>,
}

impl ExpansionOutcome {
    fn record_skip(&mut self, date: NaiveDate, reason: AdmissionDenied) {
        match reason {
            AdmissionDenied::PeakRestricted => self.skipped_peak += 1,
            AdmissionDenied::HourlyCapReached => self.skipped_hourly_cap += 1,
            AdmissionDenied::OverlapConflict => self.skipped_overlap += 1,
            AdmissionDenied::InsufficientCredit => self.stopped_no_credit = true,
            _ => {}
        }
        self.skips.push((date, reason));
    }

    fn absorb(&mut self, other: &ExpansionOutcome) {
        self.created += other.created;
        self.skipped_peak += other.skipped_peak;
        self.skipped_hourly_cap += other.skipped_hourly_cap;
        self.skipped_overlap += other.skipped_overlap;
        self.skips.extend(other.skips.iter().cloned());
    }
}

/// Projects recurring weekly templates into concrete pending rides for the
/// lookahead window. Each accepted ride consumes one standard credit through
/// a conditional debit, so a rerun can never overdraw a budget, and the
/// overlap check makes reruns idempotent.
pub struct ScheduleExpander {
    riders: Arc<dyn RiderRepository>,
    templates: Arc<dyn TemplateRepository>,
    rides: Arc<dyn RideRepository>,
    credits: Arc<dyn CreditRepository>,
    estimator: Arc<dyn TravelEstimator>,
    rules: CapacityRules,
}

impl ScheduleExpander {
    pub fn new(
        riders: Arc<dyn RiderRepository>,
        templates: Arc<dyn TemplateRepository>,
        rides: Arc<dyn RideRepository>,
        credits: Arc<dyn CreditRepository>,
        estimator: Arc<dyn TravelEstimator>,
        rules: CapacityRules,
    ) -> Self {
        Self {
            riders,
            templates,
            rides,
            credits,
            estimator,
            rules,
        }
    }

    pub async fn expand_for_user(
        &self,
        user_id: Uuid,
        days_ahead: u32,
    ) -> Result<ExpansionOutcome, ScheduleError> {
        let rider = self
            .riders
            .get(user_id)
            .await?
            .ok_or(ScheduleError::UnknownRider(user_id))?;

        let mut outcome = ExpansionOutcome::default();
        if !rider.active {
            return Ok(outcome);
        }

        let templates = self.templates.for_user(user_id).await?;
        if templates.is_empty() {
            return Ok(outcome);
        }

        let now = Utc::now();
        let today = now.date_naive();
        let (period_start, period_end) = period_bounds(today);
        let defaults = CreditDefaults::for_plan(
            rider.plan_type,
            self.rules.monthly_standard_credits,
            self.rules.monthly_standard_credits_peak_plan,
            self.rules.monthly_grocery_credits,
        );
        self.credits
            .get_or_create(user_id, period_start, period_end, defaults)
            .await?;

        'days: for offset in 0..days_ahead as i64 {
            let date = today + Duration::days(offset);
            let weekday = date.weekday().num_days_from_monday() as u8;

            for template in templates.iter().filter(|t| t.day_of_week == weekday) {
                let arrival = instant_on(date, template.arrival_time);
                if arrival <= now {
                    continue;
                }

                let (pickup, dropoff) = match template.direction {
                    Direction::ToWork => (rider.home.clone(), rider.work.clone()),
                    Direction::ToHome => (rider.work.clone(), rider.home.clone()),
                };

                // Estimation is pure and happens before any write.
                let travel = self
                    .estimator
                    .estimate_minutes(pickup.distance_to(&dropoff), arrival);
                let pickup_time =
                    arrival - Duration::minutes(travel + self.rules.arrive_early_buffer_minutes);

                if self.rules.is_peak_time(pickup_time.time())
                    && !rider.plan_type.has_peak_access()
                {
                    outcome.record_skip(date, AdmissionDenied::PeakRestricted);
                    continue;
                }

                let in_hour = self
                    .rides
                    .count_in_hour(pickup_time.date_naive(), hour_of(pickup_time))
                    .await?;
                if in_hour >= self.rules.hourly_cap {
                    outcome.record_skip(date, AdmissionDenied::HourlyCapReached);
                    continue;
                }

                if self
                    .rides
                    .has_overlap(user_id, pickup_time, self.rules.overlap_buffer_minutes)
                    .await?
                {
                    outcome.record_skip(date, AdmissionDenied::OverlapConflict);
                    continue;
                }

                // The debit is the admission decision: losing it means the
                // budget is spent and the whole user stops here.
                if !self
                    .credits
                    .try_debit(user_id, period_start, RideType::Standard)
                    .await?
                {
                    outcome.record_skip(date, AdmissionDenied::InsufficientCredit);
                    break 'days;
                }

                let ride = self.build_ride(&rider, pickup, dropoff, arrival, pickup_time);
                if let Err(err) = self.rides.insert(&ride).await {
                    // Hand the credit back before surfacing the failure.
                    self.credits
                        .refund(user_id, period_start, RideType::Standard)
                        .await?;
                    return Err(err.into());
                }
                outcome.created += 1;
            }
        }

        info!(
            %user_id,
            created = outcome.created,
            skipped_peak = outcome.skipped_peak,
            skipped_hourly_cap = outcome.skipped_hourly_cap,
            skipped_overlap = outcome.skipped_overlap,
            stopped_no_credit = outcome.stopped_no_credit,
            "schedule expansion finished"
        );
        Ok(outcome)
    }

    /// Expands every active rider, logging and skipping per-user failures so
    /// one broken profile never stalls the batch.
    pub async fn expand_all(&self, days_ahead: u32) -> Result<ExpansionOutcome, ScheduleError> {
        let riders = self.riders.list_active().await?;
        let mut total = ExpansionOutcome::default();
        let mut failures = 0usize;

        for rider in riders {
            match self.expand_for_user(rider.id, days_ahead).await {
                Ok(outcome) => total.absorb(&outcome),
                Err(err) => {
                    failures += 1;
                    warn!(user_id = %rider.id, error = %err, "expansion failed for user");
                }
            }
        }

        info!(
            created = total.created,
            failures, "schedule expansion batch finished"
        );
        Ok(total)
    }

    fn build_ride(
        &self,
        rider: &pendel_core::rider::Rider,
        pickup: pendel_shared::GeoPoint,
        dropoff: pendel_shared::GeoPoint,
        arrival: chrono::DateTime<Utc>,
        pickup_time: chrono::DateTime<Utc>,
    ) -> Ride {
        Ride::new(
            rider.id,
            pickup,
            dropoff,
            pickup_time,
            arrival,
            RideType::Standard,
            rider.plan_type,
            None,
            self.rules.ride_window_minutes,
        )
    }
}
