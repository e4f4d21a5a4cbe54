//! In-memory repository set with the same conditional-update semantics as
//! the Postgres implementations. Backs the logic crates' tests; one mutex
//! over the whole state stands in for the store's row-level atomicity.

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use pendel_core::credit::{CreditDefaults, CreditPeriod};
use pendel_core::error::StoreError;
use pendel_core::hold::{Hold, HoldStatus};
use pendel_core::repository::{
    CounterRepository, CreditRepository, HoldRepository, RideRepository, RiderRepository,
    SlotRepository, StoreResult, SummaryRepository, TemplateRepository,
};
use pendel_core::ride::{Ride, RideStatus, RideTransition};
use pendel_core::rider::Rider;
use pendel_core::slot::{Slot, TierUsage};
use pendel_core::summary::DailySummary;
use pendel_core::template::ScheduleTemplate;
use pendel_shared::{Direction, RideType, ServiceTier, SlotType};

#[derive(Default)]
struct Inner {
    slots: HashMap<String, Slot>,
    holds: HashMap<Uuid, Hold>,
    rides: HashMap<Uuid, Ride>,
    credits: HashMap<(Uuid, NaiveDate), CreditPeriod>,
    templates: HashMap<(Uuid, u8, Direction), ScheduleTemplate>,
    riders: HashMap<Uuid, Rider>,
    summaries: HashMap<NaiveDate, DailySummary>,
    counters: HashMap<String, i64>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn is_cancelled(status: RideStatus) -> bool {
    status.is_cancellation()
}

#[async_trait]
impl SlotRepository for MemoryStore {
    async fn insert_missing(&self, slots: &[Slot]) -> StoreResult<u64> {
        let mut inner = self.inner.lock().await;
        let mut inserted = 0;
        for slot in slots {
            if !inner.slots.contains_key(&slot.slot_id) {
                inner.slots.insert(slot.slot_id.clone(), slot.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn get(&self, slot_id: &str) -> StoreResult<Option<Slot>> {
        Ok(self.inner.lock().await.slots.get(slot_id).cloned())
    }

    async fn list_for_date(
        &self,
        date: NaiveDate,
        direction: Option<Direction>,
    ) -> StoreResult<Vec<Slot>> {
        let inner = self.inner.lock().await;
        let mut slots: Vec<Slot> = inner
            .slots
            .values()
            .filter(|s| s.date == date && direction.map_or(true, |d| s.direction == d))
            .cloned()
            .collect();
        slots.sort_by_key(|s| (s.direction.as_str(), s.arrival_start));
        Ok(slots)
    }

    async fn try_reserve(&self, slot_id: &str, tier: ServiceTier) -> StoreResult<bool> {
        let mut inner = self.inner.lock().await;
        let Some(slot) = inner.slots.get_mut(slot_id) else {
            return Ok(false);
        };
        match tier {
            ServiceTier::Premium if slot.used_premium < slot.max_premium => {
                slot.used_premium += 1;
                Ok(true)
            }
            ServiceTier::NonPremium if slot.used_non_premium < slot.max_non_premium => {
                slot.used_non_premium += 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release(&self, slot_id: &str, tier: ServiceTier) -> StoreResult<()> {
        let mut inner = self.inner.lock().await;
        if let Some(slot) = inner.slots.get_mut(slot_id) {
            match tier {
                ServiceTier::Premium => slot.used_premium = (slot.used_premium - 1).max(0),
                ServiceTier::NonPremium => {
                    slot.used_non_premium = (slot.used_non_premium - 1).max(0)
                }
            }
        }
        Ok(())
    }

    async fn tier_usage_for_date(&self, date: NaiveDate) -> StoreResult<TierUsage> {
        let inner = self.inner.lock().await;
        let mut usage = TierUsage::default();
        for slot in inner.slots.values().filter(|s| s.date == date) {
            usage.premium_used += slot.used_premium as i64;
            usage.premium_max += slot.max_premium as i64;
            usage.non_premium_used += slot.used_non_premium as i64;
            if slot.slot_type == SlotType::OffPeak {
                usage.off_peak_slots += 1;
            }
        }
        Ok(usage)
    }

    async fn delete_for_date(&self, date: NaiveDate) -> StoreResult<u64> {
        let mut inner = self.inner.lock().await;
        let before = inner.slots.len();
        inner.slots.retain(|_, s| s.date != date);
        Ok((before - inner.slots.len()) as u64)
    }
}

#[async_trait]
impl HoldRepository for MemoryStore {
    async fn insert(&self, hold: &Hold) -> StoreResult<()> {
        let mut inner = self.inner.lock().await;
        let duplicate = inner.holds.values().any(|h| {
            h.slot_id == hold.slot_id
                && h.rider_id == hold.rider_id
                && h.status == HoldStatus::Active
        });
        if duplicate {
            return Err(StoreError::Conflict(format!(
                "active hold exists for slot {}",
                hold.slot_id
            )));
        }
        inner.holds.insert(hold.id, hold.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Hold>> {
        Ok(self.inner.lock().await.holds.get(&id).cloned())
    }

    async fn active_for(&self, slot_id: &str, rider_id: Uuid) -> StoreResult<Option<Hold>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .holds
            .values()
            .find(|h| {
                h.slot_id == slot_id && h.rider_id == rider_id && h.status == HoldStatus::Active
            })
            .cloned())
    }

    async fn confirm(&self, id: Uuid, ride_id: Uuid, now: DateTime<Utc>) -> StoreResult<bool> {
        let mut inner = self.inner.lock().await;
        let Some(hold) = inner.holds.get_mut(&id) else {
            return Ok(false);
        };
        if hold.status == HoldStatus::Active && hold.expires_at > now {
            hold.status = HoldStatus::Confirmed;
            hold.confirmed_ride_id = Some(ride_id);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn cancel(&self, id: Uuid) -> StoreResult<bool> {
        let mut inner = self.inner.lock().await;
        let Some(hold) = inner.holds.get_mut(&id) else {
            return Ok(false);
        };
        if hold.status == HoldStatus::Active {
            hold.status = HoldStatus::Cancelled;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn expire_due(&self, now: DateTime<Utc>) -> StoreResult<Vec<Hold>> {
        let mut inner = self.inner.lock().await;
        let mut expired = Vec::new();
        for hold in inner.holds.values_mut() {
            if hold.status == HoldStatus::Active && hold.expires_at <= now {
                hold.status = HoldStatus::Expired;
                expired.push(hold.clone());
            }
        }
        Ok(expired)
    }
}

#[async_trait]
impl RideRepository for MemoryStore {
    async fn insert(&self, ride: &Ride) -> StoreResult<()> {
        self.inner.lock().await.rides.insert(ride.id, ride.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Ride>> {
        Ok(self.inner.lock().await.rides.get(&id).cloned())
    }

    async fn update_transition(
        &self,
        id: Uuid,
        from: RideStatus,
        to: RideStatus,
        patch: &RideTransition,
    ) -> StoreResult<bool> {
        let mut inner = self.inner.lock().await;
        let Some(ride) = inner.rides.get_mut(&id) else {
            return Ok(false);
        };
        if ride.status != from {
            return Ok(false);
        }
        ride.status = to;
        ride.arrived_at = patch.arrived_at.or(ride.arrived_at);
        ride.started_at = patch.started_at.or(ride.started_at);
        ride.completed_at = patch.completed_at.or(ride.completed_at);
        ride.cancelled_at = patch.cancelled_at.or(ride.cancelled_at);
        ride.wait_minutes = patch.wait_minutes.unwrap_or(ride.wait_minutes);
        ride.wait_charge_cents = patch.wait_charge_cents.unwrap_or(ride.wait_charge_cents);
        ride.late_minutes = patch.late_minutes.unwrap_or(ride.late_minutes);
        ride.compensation = patch.compensation.unwrap_or(ride.compensation);
        ride.compensation_applied = patch
            .compensation_applied
            .unwrap_or(ride.compensation_applied);
        ride.driver_id = patch.driver_id.or(ride.driver_id);
        Ok(true)
    }

    async fn count_in_hour(&self, date: NaiveDate, hour: u32) -> StoreResult<i64> {
        let start = date
            .and_time(NaiveTime::from_hms_opt(hour, 0, 0).unwrap_or_default())
            .and_utc();
        let end = start + Duration::hours(1);
        let inner = self.inner.lock().await;
        Ok(inner
            .rides
            .values()
            .filter(|r| {
                !is_cancelled(r.status) && r.pickup_time >= start && r.pickup_time < end
            })
            .count() as i64)
    }

    async fn has_overlap(
        &self,
        user_id: Uuid,
        pickup: DateTime<Utc>,
        buffer_minutes: i64,
    ) -> StoreResult<bool> {
        let buffer = Duration::minutes(buffer_minutes);
        let inner = self.inner.lock().await;
        Ok(inner.rides.values().any(|r| {
            r.user_id == user_id
                && !is_cancelled(r.status)
                && r.pickup_time >= pickup - buffer
                && r.pickup_time <= pickup + buffer
        }))
    }

    async fn count_for_date(&self, date: NaiveDate) -> StoreResult<i64> {
        let inner = self.inner.lock().await;
        Ok(inner
            .rides
            .values()
            .filter(|r| !is_cancelled(r.status) && r.pickup_time.date_naive() == date)
            .count() as i64)
    }

    async fn list_for_date(&self, date: NaiveDate) -> StoreResult<Vec<Ride>> {
        let inner = self.inner.lock().await;
        let mut rides: Vec<Ride> = inner
            .rides
            .values()
            .filter(|r| r.pickup_time.date_naive() == date)
            .cloned()
            .collect();
        rides.sort_by_key(|r| r.pickup_time);
        Ok(rides)
    }
}

#[async_trait]
impl CreditRepository for MemoryStore {
    async fn get_or_create(
        &self,
        user_id: Uuid,
        period_start: NaiveDate,
        period_end: NaiveDate,
        defaults: CreditDefaults,
    ) -> StoreResult<CreditPeriod> {
        let mut inner = self.inner.lock().await;
        let period = inner
            .credits
            .entry((user_id, period_start))
            .or_insert_with(|| CreditPeriod {
                user_id,
                period_start,
                period_end,
                standard_total: defaults.standard_total,
                standard_used: 0,
                grocery_total: defaults.grocery_total,
                grocery_used: 0,
            });
        Ok(period.clone())
    }

    async fn try_debit(
        &self,
        user_id: Uuid,
        period_start: NaiveDate,
        kind: RideType,
    ) -> StoreResult<bool> {
        let mut inner = self.inner.lock().await;
        let Some(period) = inner.credits.get_mut(&(user_id, period_start)) else {
            return Ok(false);
        };
        match kind {
            RideType::Standard if period.standard_used < period.standard_total => {
                period.standard_used += 1;
                Ok(true)
            }
            RideType::Grocery if period.grocery_used < period.grocery_total => {
                period.grocery_used += 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn refund(
        &self,
        user_id: Uuid,
        period_start: NaiveDate,
        kind: RideType,
    ) -> StoreResult<()> {
        let mut inner = self.inner.lock().await;
        if let Some(period) = inner.credits.get_mut(&(user_id, period_start)) {
            match kind {
                RideType::Standard => period.standard_used = (period.standard_used - 1).max(0),
                RideType::Grocery => period.grocery_used = (period.grocery_used - 1).max(0),
            }
        }
        Ok(())
    }
}

#[async_trait]
impl TemplateRepository for MemoryStore {
    async fn upsert(&self, template: &ScheduleTemplate) -> StoreResult<()> {
        let mut inner = self.inner.lock().await;
        inner.templates.insert(
            (template.user_id, template.day_of_week, template.direction),
            template.clone(),
        );
        Ok(())
    }

    async fn for_user(&self, user_id: Uuid) -> StoreResult<Vec<ScheduleTemplate>> {
        let inner = self.inner.lock().await;
        let mut templates: Vec<ScheduleTemplate> = inner
            .templates
            .values()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect();
        templates.sort_by_key(|t| (t.day_of_week, t.direction.as_str()));
        Ok(templates)
    }
}

#[async_trait]
impl RiderRepository for MemoryStore {
    async fn upsert(&self, rider: &Rider) -> StoreResult<()> {
        self.inner.lock().await.riders.insert(rider.id, rider.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Rider>> {
        Ok(self.inner.lock().await.riders.get(&id).cloned())
    }

    async fn list_active(&self) -> StoreResult<Vec<Rider>> {
        let inner = self.inner.lock().await;
        Ok(inner.riders.values().filter(|r| r.active).cloned().collect())
    }
}

#[async_trait]
impl SummaryRepository for MemoryStore {
    async fn upsert(&self, summary: &DailySummary) -> StoreResult<()> {
        self.inner
            .lock()
            .await
            .summaries
            .insert(summary.date, summary.clone());
        Ok(())
    }

    async fn get(&self, date: NaiveDate) -> StoreResult<Option<DailySummary>> {
        Ok(self.inner.lock().await.summaries.get(&date).cloned())
    }
}

#[async_trait]
impl CounterRepository for MemoryStore {
    async fn increment_bounded(&self, key: &str, max: i64) -> StoreResult<bool> {
        let mut inner = self.inner.lock().await;
        let value = inner.counters.entry(key.to_string()).or_insert(0);
        if *value < max {
            *value += 1;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn decrement_floored(&self, key: &str) -> StoreResult<()> {
        let mut inner = self.inner.lock().await;
        let value = inner.counters.entry(key.to_string()).or_insert(0);
        *value = (*value - 1).max(0);
        Ok(())
    }

    async fn get(&self, key: &str) -> StoreResult<i64> {
        Ok(*self.inner.lock().await.counters.get(key).unwrap_or(&0))
    }
}
