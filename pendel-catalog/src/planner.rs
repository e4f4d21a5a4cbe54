use chrono::NaiveDate;
use pendel_core::error::{Admission, AdmissionDenied};
use pendel_core::repository::{
    CounterRepository, RideRepository, SlotRepository, SummaryRepository,
};
use pendel_core::rules::CapacityRules;
use pendel_core::slot::TierUsage;
use pendel_core::summary::DailySummary;
use pendel_shared::SlotType;
use std::sync::Arc;
use tracing::info;

use crate::CatalogError;

/// Store key of the global premium membership counter.
pub const PREMIUM_MEMBER_COUNTER: &str = "premium_members";

/// Day- and hour-level admission control. Premium capacity is a fixed global
/// ceiling consumed at subscription activation; non-premium capacity is
/// derived per day from the premium load and tightens progressively as
/// premium commitment grows. Every check re-derives from live counters; the
/// daily summary is reporting only.
pub struct CapacityPlanner {
    slots: Arc<dyn SlotRepository>,
    rides: Arc<dyn RideRepository>,
    counters: Arc<dyn CounterRepository>,
    summaries: Arc<dyn SummaryRepository>,
    rules: CapacityRules,
}

impl CapacityPlanner {
    pub fn new(
        slots: Arc<dyn SlotRepository>,
        rides: Arc<dyn RideRepository>,
        counters: Arc<dyn CounterRepository>,
        summaries: Arc<dyn SummaryRepository>,
        rules: CapacityRules,
    ) -> Self {
        Self {
            slots,
            rides,
            counters,
            summaries,
            rules,
        }
    }

    /// Consumes one unit of the premium subscriber ceiling. Called at
    /// subscription activation, never per ride.
    pub async fn register_premium_member(&self) -> Result<bool, CatalogError> {
        Ok(self
            .counters
            .increment_bounded(PREMIUM_MEMBER_COUNTER, self.rules.premium_subscriber_ceiling)
            .await?)
    }

    /// Returns one unit of the premium ceiling, floored at zero.
    pub async fn release_premium_member(&self) -> Result<(), CatalogError> {
        Ok(self.counters.decrement_floored(PREMIUM_MEMBER_COUNTER).await?)
    }

    pub async fn premium_member_count(&self) -> Result<i64, CatalogError> {
        Ok(self.counters.get(PREMIUM_MEMBER_COUNTER).await?)
    }

    /// Day-level non-premium ceiling:
    /// `floor(off_peak_slots * base_per_slot * (1 - reduction(load)))`,
    /// capped by `daily_max - premium_booked`. The load denominator is the
    /// day's total premium slot capacity.
    pub async fn non_premium_daily_capacity(&self, date: NaiveDate) -> Result<i64, CatalogError> {
        let usage = self.slots.tier_usage_for_date(date).await?;
        Ok(self.capacity_from_usage(&usage))
    }

    fn capacity_from_usage(&self, usage: &TierUsage) -> i64 {
        let reduction = self.rules.reduction_for_load(usage.premium_load());
        let raw = (usage.off_peak_slots as f64 * self.rules.base_per_slot * (1.0 - reduction))
            .floor() as i64;
        let cap = (self.rules.daily_max as i64 - usage.premium_used).max(0);
        raw.min(cap)
    }

    /// Day-level admission across both tiers, counted over the day's
    /// non-cancelled rides so template-expanded rides without a slot are
    /// included.
    pub async fn check_daily_capacity(&self, date: NaiveDate) -> Result<Admission, CatalogError> {
        let booked = self.rides.count_for_date(date).await?;
        if booked >= self.rules.daily_max as i64 {
            return Ok(Admission::denied(AdmissionDenied::DailyCapReached));
        }
        Ok(Admission::granted())
    }

    /// Hour-level admission on booked ride count.
    pub async fn check_hourly_capacity(
        &self,
        date: NaiveDate,
        hour: u32,
    ) -> Result<Admission, CatalogError> {
        let count = self.rides.count_in_hour(date, hour).await?;
        if count >= self.rules.hourly_cap {
            return Ok(Admission::denied(AdmissionDenied::HourlyCapReached));
        }
        Ok(Admission::granted())
    }

    /// Compound premium admission: day cap, then slot-tier room.
    pub async fn can_add_premium_ride(
        &self,
        date: NaiveDate,
        slot_id: &str,
    ) -> Result<Admission, CatalogError> {
        let daily = self.check_daily_capacity(date).await?;
        if !daily.allowed {
            return Ok(daily);
        }

        let slot = self
            .slots
            .get(slot_id)
            .await?
            .ok_or_else(|| CatalogError::UnknownSlot(slot_id.to_string()))?;
        if slot.used_premium >= slot.max_premium {
            return Ok(Admission::denied(AdmissionDenied::SlotFullPremium));
        }

        Ok(Admission::granted())
    }

    /// Compound non-premium admission: day cap, peak exclusion, slot-tier
    /// room, then the derived day-level non-premium ceiling. Each failing
    /// check answers with its own reason.
    pub async fn can_add_non_premium_ride(
        &self,
        date: NaiveDate,
        slot_id: &str,
    ) -> Result<Admission, CatalogError> {
        let daily = self.check_daily_capacity(date).await?;
        if !daily.allowed {
            return Ok(daily);
        }

        let slot = self
            .slots
            .get(slot_id)
            .await?
            .ok_or_else(|| CatalogError::UnknownSlot(slot_id.to_string()))?;
        if slot.slot_type == SlotType::Peak {
            return Ok(Admission::denied(AdmissionDenied::PeakRestricted));
        }
        if slot.used_non_premium >= slot.max_non_premium {
            return Ok(Admission::denied(AdmissionDenied::SlotFullNonPremium));
        }

        let usage = self.slots.tier_usage_for_date(date).await?;
        if usage.non_premium_used >= self.capacity_from_usage(&usage) {
            return Ok(Admission::denied(AdmissionDenied::NonPremiumDayExhausted));
        }

        Ok(Admission::granted())
    }

    /// Recomputes and upserts the reporting snapshot for one day. Admission
    /// never reads it back.
    pub async fn refresh_daily_summary(
        &self,
        date: NaiveDate,
    ) -> Result<DailySummary, CatalogError> {
        let usage = self.slots.tier_usage_for_date(date).await?;
        let summary = DailySummary {
            date,
            premium_booked: usage.premium_used,
            non_premium_booked: usage.non_premium_used,
            computed_non_premium_capacity: self.capacity_from_usage(&usage),
            premium_load_pct: usage.premium_load() * 100.0,
        };
        self.summaries.upsert(&summary).await?;
        info!(
            %date,
            premium = summary.premium_booked,
            non_premium = summary.non_premium_booked,
            capacity = summary.computed_non_premium_capacity,
            "daily summary refreshed"
        );
        Ok(summary)
    }
}
