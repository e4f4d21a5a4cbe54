use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use pendel_shared::{Direction, RideType, ServiceTier};
use uuid::Uuid;

use crate::credit::{CreditDefaults, CreditPeriod};
use crate::error::StoreError;
use crate::hold::Hold;
use crate::ride::{Ride, RideStatus, RideTransition};
use crate::rider::Rider;
use crate::slot::{Slot, TierUsage};
use crate::summary::DailySummary;
use crate::template::ScheduleTemplate;

pub type StoreResult<T> = Result<T, StoreError>;

/// Slot rows and their capacity counters. All counter mutations are atomic
/// conditional updates in the backing store; no caller ever read-modify-writes
/// a counter in process memory.
#[async_trait]
pub trait SlotRepository: Send + Sync {
    /// Inserts the slots that do not exist yet and leaves existing rows
    /// untouched. Returns the number of rows actually inserted.
    async fn insert_missing(&self, slots: &[Slot]) -> StoreResult<u64>;

    async fn get(&self, slot_id: &str) -> StoreResult<Option<Slot>>;

    async fn list_for_date(
        &self,
        date: NaiveDate,
        direction: Option<Direction>,
    ) -> StoreResult<Vec<Slot>>;

    /// Increments the tier's usage only while below its maximum, as one
    /// conditional update. False means saturation and no mutation.
    async fn try_reserve(&self, slot_id: &str, tier: ServiceTier) -> StoreResult<bool>;

    /// Decrements the tier's usage, floored at zero. Over-release is a no-op.
    async fn release(&self, slot_id: &str, tier: ServiceTier) -> StoreResult<()>;

    async fn tier_usage_for_date(&self, date: NaiveDate) -> StoreResult<TierUsage>;

    /// Administrative reset: drops every slot of one day.
    async fn delete_for_date(&self, date: NaiveDate) -> StoreResult<u64>;
}

/// Provisional reservations. The transition methods are compare-and-set on
/// `status = active`, so confirm, cancel and the expiry sweep can race and
/// exactly one wins per hold.
#[async_trait]
pub trait HoldRepository: Send + Sync {
    /// Inserts a new hold. Fails with `StoreError::Conflict` when the rider
    /// already has an active hold on the same slot.
    async fn insert(&self, hold: &Hold) -> StoreResult<()>;

    async fn get(&self, id: Uuid) -> StoreResult<Option<Hold>>;

    async fn active_for(&self, slot_id: &str, rider_id: Uuid) -> StoreResult<Option<Hold>>;

    /// active -> confirmed, only while unexpired at `now`. Returns whether
    /// the update won.
    async fn confirm(&self, id: Uuid, ride_id: Uuid, now: DateTime<Utc>) -> StoreResult<bool>;

    /// active -> cancelled. Returns whether the update won.
    async fn cancel(&self, id: Uuid) -> StoreResult<bool>;

    /// Flips every active hold past its expiry to expired and returns the
    /// rows that were flipped by this call, so the sweeper can release their
    /// capacity exactly once.
    async fn expire_due(&self, now: DateTime<Utc>) -> StoreResult<Vec<Hold>>;
}

/// Concrete rides and the queries admission control needs over them.
#[async_trait]
pub trait RideRepository: Send + Sync {
    async fn insert(&self, ride: &Ride) -> StoreResult<()>;

    async fn get(&self, id: Uuid) -> StoreResult<Option<Ride>>;

    /// Applies one status change plus its side-effect fields as a single
    /// conditional update keyed on the previous status. False means the row
    /// moved underneath the caller.
    async fn update_transition(
        &self,
        id: Uuid,
        from: RideStatus,
        to: RideStatus,
        patch: &RideTransition,
    ) -> StoreResult<bool>;

    /// Non-cancelled rides, across all users, picking up within the given
    /// hour of the given day.
    async fn count_in_hour(&self, date: NaiveDate, hour: u32) -> StoreResult<i64>;

    /// Non-cancelled rides of one user picking up within ±buffer of the
    /// candidate time.
    async fn has_overlap(
        &self,
        user_id: Uuid,
        pickup: DateTime<Utc>,
        buffer_minutes: i64,
    ) -> StoreResult<bool>;

    /// Non-cancelled rides picking up on the given day across all users.
    async fn count_for_date(&self, date: NaiveDate) -> StoreResult<i64>;

    async fn list_for_date(&self, date: NaiveDate) -> StoreResult<Vec<Ride>>;
}

/// Monthly credit ledgers. Debits are conditional on remaining credit;
/// refunds floor at zero usage.
#[async_trait]
pub trait CreditRepository: Send + Sync {
    async fn get_or_create(
        &self,
        user_id: Uuid,
        period_start: NaiveDate,
        period_end: NaiveDate,
        defaults: CreditDefaults,
    ) -> StoreResult<CreditPeriod>;

    /// Consumes one credit of the given kind while any remains. False means
    /// the budget is exhausted and nothing changed.
    async fn try_debit(&self, user_id: Uuid, period_start: NaiveDate, kind: RideType)
        -> StoreResult<bool>;

    /// Returns one credit of the given kind, usage floored at zero.
    async fn refund(&self, user_id: Uuid, period_start: NaiveDate, kind: RideType)
        -> StoreResult<()>;
}

#[async_trait]
pub trait TemplateRepository: Send + Sync {
    /// One row per (user, weekday, direction); upsert replaces the time.
    async fn upsert(&self, template: &ScheduleTemplate) -> StoreResult<()>;

    async fn for_user(&self, user_id: Uuid) -> StoreResult<Vec<ScheduleTemplate>>;
}

#[async_trait]
pub trait RiderRepository: Send + Sync {
    async fn upsert(&self, rider: &Rider) -> StoreResult<()>;

    async fn get(&self, id: Uuid) -> StoreResult<Option<Rider>>;

    async fn list_active(&self) -> StoreResult<Vec<Rider>>;
}

#[async_trait]
pub trait SummaryRepository: Send + Sync {
    async fn upsert(&self, summary: &DailySummary) -> StoreResult<()>;

    async fn get(&self, date: NaiveDate) -> StoreResult<Option<DailySummary>>;
}

/// Named global counters with atomic bounded increments, e.g. the premium
/// subscriber ceiling. Authoritative values live in the store, never in
/// process memory.
#[async_trait]
pub trait CounterRepository: Send + Sync {
    /// Increments while strictly below `max`. False means the ceiling held.
    async fn increment_bounded(&self, key: &str, max: i64) -> StoreResult<bool>;

    /// Decrements, floored at zero.
    async fn decrement_floored(&self, key: &str) -> StoreResult<()>;

    async fn get(&self, key: &str) -> StoreResult<i64>;
}
