use chrono::{DateTime, Utc};
use pendel_catalog::CapacityLedger;
use pendel_core::credit::period_bounds;
use pendel_core::error::StateError;
use pendel_core::repository::{CreditRepository, RideRepository};
use pendel_core::ride::{Compensation, Ride, RideStatus, RideTransition};
use pendel_core::rules::CapacityRules;
use pendel_shared::timeutil::minutes_since;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::notify::Notifier;
use crate::BookingError;

/// Ride status transitions and their billing consequences. Each transition
/// validates against the central table, computes its side-effect fields
/// purely, and commits them with one conditional update keyed on the
/// previous status; a lost race surfaces as an invalid transition instead of
/// a double-applied charge. A full refund moves the credit first and flips
/// `compensation_applied` only afterwards, so a refund interrupted by a
/// store outage stays pending and the next completion call lands it.
pub struct RideLifecycle {
    rides: Arc<dyn RideRepository>,
    credits: Arc<dyn CreditRepository>,
    ledger: CapacityLedger,
    notifier: Arc<dyn Notifier>,
    rules: CapacityRules,
}

impl RideLifecycle {
    pub fn new(
        rides: Arc<dyn RideRepository>,
        credits: Arc<dyn CreditRepository>,
        ledger: CapacityLedger,
        notifier: Arc<dyn Notifier>,
        rules: CapacityRules,
    ) -> Self {
        Self {
            rides,
            credits,
            ledger,
            notifier,
            rules,
        }
    }

    pub async fn apply_status_transition(
        &self,
        ride_id: Uuid,
        new_status: RideStatus,
        actor_id: Option<Uuid>,
    ) -> Result<Ride, BookingError> {
        let ride = self.fetch(ride_id).await?;

        // Self-transition is a permitted no-op; this is what makes a retried
        // completion idempotent. A retry also picks up a refund an earlier
        // attempt committed but could not deliver.
        if ride.status == new_status {
            if refund_pending(&ride) {
                self.settle_refund(&ride).await?;
                return self.fetch(ride_id).await;
            }
            return Ok(ride);
        }

        if !RideStatus::can_transition(ride.status, new_status) {
            return Err(StateError::InvalidTransition {
                from: ride.status.as_str().to_string(),
                to: new_status.as_str().to_string(),
            }
            .into());
        }

        let now = Utc::now();
        let patch = self.build_patch(&ride, new_status, actor_id, now);
        let refund_due = patch.compensation == Some(Compensation::FullRefund);

        let won = self
            .rides
            .update_transition(ride.id, ride.status, new_status, &patch)
            .await?;
        if !won {
            // The row moved underneath us; report against the status we read.
            return Err(StateError::InvalidTransition {
                from: ride.status.as_str().to_string(),
                to: new_status.as_str().to_string(),
            }
            .into());
        }

        // Post-commit consequences. A refund failing here leaves
        // compensation_applied unset, so the retried completion delivers it.
        if refund_due {
            self.settle_refund(&ride).await?;
        }

        if new_status.is_cancellation() {
            if let Some(slot_id) = &ride.slot_id {
                self.ledger
                    .release(slot_id, ride.plan_type.tier())
                    .await?;
            }
        }

        let updated = self.fetch(ride_id).await?;

        // Best-effort observer after the commit: a notification failure must
        // never undo a capacity or status change.
        if let Err(err) = self.notifier.ride_status_changed(&updated, ride.status).await {
            warn!(%ride_id, error = %err, "status notification failed");
        }

        Ok(updated)
    }

    async fn fetch(&self, ride_id: Uuid) -> Result<Ride, BookingError> {
        Ok(self
            .rides
            .get(ride_id)
            .await?
            .ok_or_else(|| StateError::NotFound {
                kind: "ride",
                id: ride_id.to_string(),
            })?)
    }

    /// Moves the credit, then marks it delivered. The marker is a separate
    /// conditional update so the flag can only be set once the refund has
    /// actually landed; delivering twice is bounded by the credit floor.
    async fn settle_refund(&self, ride: &Ride) -> Result<(), BookingError> {
        let (period_start, _) = period_bounds(Utc::now().date_naive());
        self.credits
            .refund(ride.user_id, period_start, ride.ride_type)
            .await?;

        let mark = RideTransition {
            compensation_applied: Some(true),
            ..RideTransition::default()
        };
        if !self
            .rides
            .update_transition(ride.id, RideStatus::Completed, RideStatus::Completed, &mark)
            .await?
        {
            warn!(ride_id = %ride.id, "ride disappeared before refund marker");
        }
        info!(ride_id = %ride.id, user_id = %ride.user_id, "late arrival refund credited");
        Ok(())
    }

    fn build_patch(
        &self,
        ride: &Ride,
        new_status: RideStatus,
        actor_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> RideTransition {
        let mut patch = RideTransition::default();

        match new_status {
            RideStatus::DriverEnRoute => {
                patch.driver_id = actor_id;
            }
            RideStatus::Arrived => {
                patch.arrived_at = Some(now);
            }
            RideStatus::InProgress => {
                let wait = ride
                    .arrived_at
                    .map(|arrived| minutes_since(arrived, now))
                    .unwrap_or(0);
                let billable = (wait - self.rules.free_wait_minutes).max(0);
                patch.started_at = Some(now);
                patch.wait_minutes = Some(wait as i32);
                patch.wait_charge_cents = Some(billable * self.rules.wait_charge_cents_per_minute);
            }
            RideStatus::Completed => {
                let late = minutes_since(ride.arrival_target, now);
                patch.completed_at = Some(now);
                patch.late_minutes = Some(late as i32);

                if late >= self.rules.full_refund_late_minutes && !ride.compensation_applied {
                    patch.compensation = Some(Compensation::FullRefund);
                } else if late >= self.rules.half_refund_late_minutes
                    && ride.compensation == Compensation::None
                {
                    // Advisory flag only; no credit moves automatically.
                    patch.compensation = Some(Compensation::HalfRefund);
                }
            }
            status if status.is_cancellation() => {
                patch.cancelled_at = Some(now);
            }
            _ => {}
        }

        patch
    }
}

/// A completed ride owed a full refund that has not been delivered yet.
fn refund_pending(ride: &Ride) -> bool {
    ride.status == RideStatus::Completed
        && ride.compensation == Compensation::FullRefund
        && !ride.compensation_applied
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::LogNotifier;
    use chrono::Duration;
    use pendel_core::credit::CreditDefaults;
    use pendel_core::slot::{derive_slot_id, Slot};
    use pendel_shared::{Direction, GeoPoint, PlanType, RideType, SlotType};
    use pendel_store::MemoryStore;

    fn test_ride(user_id: Uuid, arrival_target: DateTime<Utc>, slot_id: Option<String>) -> Ride {
        Ride::new(
            user_id,
            GeoPoint::new(52.52, 13.40, "home"),
            GeoPoint::new(52.50, 13.45, "work"),
            arrival_target - Duration::minutes(20),
            arrival_target,
            RideType::Standard,
            PlanType::Standard,
            slot_id,
            10,
        )
    }

    fn lifecycle(store: &Arc<MemoryStore>) -> RideLifecycle {
        RideLifecycle::new(
            store.clone(),
            store.clone(),
            CapacityLedger::new(store.clone()),
            Arc::new(LogNotifier),
            CapacityRules::default(),
        )
    }

    async fn insert_ride(store: &MemoryStore, ride: &Ride) {
        RideRepository::insert(store, ride).await.unwrap();
    }

    #[tokio::test]
    async fn arrival_stamps_timestamp() {
        let store = Arc::new(MemoryStore::new());
        let lc = lifecycle(&store);
        let mut ride = test_ride(Uuid::new_v4(), Utc::now() + Duration::hours(1), None);
        ride.status = RideStatus::DriverEnRoute;
        insert_ride(&store, &ride).await;

        let updated = lc
            .apply_status_transition(ride.id, RideStatus::Arrived, None)
            .await
            .unwrap();
        assert_eq!(updated.status, RideStatus::Arrived);
        assert!(updated.arrived_at.is_some());
    }

    #[tokio::test]
    async fn wait_charge_applies_beyond_free_minutes() {
        let store = Arc::new(MemoryStore::new());
        let lc = lifecycle(&store);
        let mut ride = test_ride(Uuid::new_v4(), Utc::now() + Duration::hours(1), None);
        ride.status = RideStatus::Arrived;
        // Driver has been waiting 12 minutes; 5 are free, 7 are billable.
        ride.arrived_at = Some(Utc::now() - Duration::minutes(12));
        insert_ride(&store, &ride).await;

        let updated = lc
            .apply_status_transition(ride.id, RideStatus::InProgress, None)
            .await
            .unwrap();
        assert_eq!(updated.wait_minutes, 12);
        assert_eq!(updated.wait_charge_cents, 7 * 50);
    }

    #[tokio::test]
    async fn on_time_completion_carries_no_compensation() {
        let store = Arc::new(MemoryStore::new());
        let lc = lifecycle(&store);
        let mut ride = test_ride(Uuid::new_v4(), Utc::now() + Duration::minutes(30), None);
        ride.status = RideStatus::InProgress;
        insert_ride(&store, &ride).await;

        let updated = lc
            .apply_status_transition(ride.id, RideStatus::Completed, None)
            .await
            .unwrap();
        assert_eq!(updated.late_minutes, 0);
        assert_eq!(updated.compensation, Compensation::None);
        assert!(!updated.compensation_applied);
    }

    #[tokio::test]
    async fn slightly_late_completion_flags_half_refund_only() {
        let store = Arc::new(MemoryStore::new());
        let lc = lifecycle(&store);
        let user = Uuid::new_v4();
        let (period_start, period_end) = period_bounds(Utc::now().date_naive());
        CreditRepository::get_or_create(
            &*store,
            user,
            period_start,
            period_end,
            CreditDefaults {
                standard_total: 10,
                grocery_total: 2,
            },
        )
        .await
        .unwrap();
        // Consume one credit so a refund would be visible.
        CreditRepository::try_debit(&*store, user, period_start, RideType::Standard)
            .await
            .unwrap();

        let mut ride = test_ride(user, Utc::now() - Duration::minutes(7), None);
        ride.status = RideStatus::InProgress;
        insert_ride(&store, &ride).await;

        let updated = lc
            .apply_status_transition(ride.id, RideStatus::Completed, None)
            .await
            .unwrap();
        assert_eq!(updated.compensation, Compensation::HalfRefund);
        assert!(!updated.compensation_applied);

        // Advisory only: the credit stays consumed.
        let period = CreditRepository::get_or_create(
            &*store,
            user,
            period_start,
            period_end,
            CreditDefaults {
                standard_total: 10,
                grocery_total: 2,
            },
        )
        .await
        .unwrap();
        assert_eq!(period.standard_used, 1);
    }

    #[tokio::test]
    async fn very_late_completion_refunds_exactly_once() {
        let store = Arc::new(MemoryStore::new());
        let lc = lifecycle(&store);
        let user = Uuid::new_v4();
        let (period_start, period_end) = period_bounds(Utc::now().date_naive());
        let defaults = CreditDefaults {
            standard_total: 10,
            grocery_total: 2,
        };
        CreditRepository::get_or_create(&*store, user, period_start, period_end, defaults)
            .await
            .unwrap();
        CreditRepository::try_debit(&*store, user, period_start, RideType::Standard)
            .await
            .unwrap();

        let mut ride = test_ride(user, Utc::now() - Duration::minutes(15), None);
        ride.status = RideStatus::InProgress;
        insert_ride(&store, &ride).await;

        let updated = lc
            .apply_status_transition(ride.id, RideStatus::Completed, None)
            .await
            .unwrap();
        assert_eq!(updated.compensation, Compensation::FullRefund);
        assert!(updated.compensation_applied);

        // Retried completion is a self-transition no-op: no second refund.
        let again = lc
            .apply_status_transition(ride.id, RideStatus::Completed, None)
            .await
            .unwrap();
        assert_eq!(again.compensation, Compensation::FullRefund);

        let period = CreditRepository::get_or_create(&*store, user, period_start, period_end, defaults)
            .await
            .unwrap();
        assert_eq!(period.standard_used, 0);
    }

    /// Credit repository that drops the first refund, emulating a store
    /// outage between the completion commit and the credit movement.
    struct OutageCredits {
        inner: Arc<MemoryStore>,
        fail_once: std::sync::atomic::AtomicBool,
    }

    #[async_trait::async_trait]
    impl CreditRepository for OutageCredits {
        async fn get_or_create(
            &self,
            user_id: Uuid,
            period_start: chrono::NaiveDate,
            period_end: chrono::NaiveDate,
            defaults: CreditDefaults,
        ) -> pendel_core::repository::StoreResult<pendel_core::credit::CreditPeriod> {
            CreditRepository::get_or_create(&*self.inner, user_id, period_start, period_end, defaults)
                .await
        }

        async fn try_debit(
            &self,
            user_id: Uuid,
            period_start: chrono::NaiveDate,
            kind: pendel_shared::RideType,
        ) -> pendel_core::repository::StoreResult<bool> {
            CreditRepository::try_debit(&*self.inner, user_id, period_start, kind).await
        }

        async fn refund(
            &self,
            user_id: Uuid,
            period_start: chrono::NaiveDate,
            kind: pendel_shared::RideType,
        ) -> pendel_core::repository::StoreResult<()> {
            if self.fail_once.swap(false, std::sync::atomic::Ordering::SeqCst) {
                return Err(pendel_core::error::StoreError::Unavailable(
                    "credit store timeout".into(),
                ));
            }
            CreditRepository::refund(&*self.inner, user_id, period_start, kind).await
        }
    }

    #[tokio::test]
    async fn refund_is_recovered_after_a_credit_store_outage() {
        let store = Arc::new(MemoryStore::new());
        let credits = Arc::new(OutageCredits {
            inner: store.clone(),
            fail_once: std::sync::atomic::AtomicBool::new(true),
        });
        let lc = RideLifecycle::new(
            store.clone(),
            credits,
            CapacityLedger::new(store.clone()),
            Arc::new(LogNotifier),
            CapacityRules::default(),
        );

        let user = Uuid::new_v4();
        let (period_start, period_end) = period_bounds(Utc::now().date_naive());
        let defaults = CreditDefaults {
            standard_total: 10,
            grocery_total: 2,
        };
        CreditRepository::get_or_create(&*store, user, period_start, period_end, defaults)
            .await
            .unwrap();
        CreditRepository::try_debit(&*store, user, period_start, RideType::Standard)
            .await
            .unwrap();

        let mut ride = test_ride(user, Utc::now() - Duration::minutes(15), None);
        ride.status = RideStatus::InProgress;
        insert_ride(&store, &ride).await;

        // The transition commits but the refund is lost to the outage.
        let err = lc
            .apply_status_transition(ride.id, RideStatus::Completed, None)
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::Store(_)));

        let committed = RideRepository::get(&*store, ride.id).await.unwrap().unwrap();
        assert_eq!(committed.status, RideStatus::Completed);
        assert_eq!(committed.compensation, Compensation::FullRefund);
        assert!(!committed.compensation_applied);

        // The retried completion delivers the pending refund.
        let healed = lc
            .apply_status_transition(ride.id, RideStatus::Completed, None)
            .await
            .unwrap();
        assert!(healed.compensation_applied);

        let period = CreditRepository::get_or_create(&*store, user, period_start, period_end, defaults)
            .await
            .unwrap();
        assert_eq!(period.standard_used, 0);

        // A further retry is a plain no-op.
        let again = lc
            .apply_status_transition(ride.id, RideStatus::Completed, None)
            .await
            .unwrap();
        assert!(again.compensation_applied);
        let period = CreditRepository::get_or_create(&*store, user, period_start, period_end, defaults)
            .await
            .unwrap();
        assert_eq!(period.standard_used, 0);
    }

    #[tokio::test]
    async fn cancellation_releases_the_slot() {
        let store = Arc::new(MemoryStore::new());
        let lc = lifecycle(&store);
        let date = chrono::NaiveDate::from_ymd_opt(2026, 9, 8).unwrap();
        let start = chrono::NaiveTime::from_hms_opt(10, 0, 0).unwrap();
        let slot_id = derive_slot_id(date, Direction::ToWork, start);
        let slot = Slot {
            slot_id: slot_id.clone(),
            date,
            direction: Direction::ToWork,
            slot_type: SlotType::OffPeak,
            arrival_start: start,
            arrival_end: chrono::NaiveTime::from_hms_opt(10, 5, 0).unwrap(),
            max_premium: 2,
            used_premium: 0,
            max_non_premium: 2,
            used_non_premium: 1,
            fragile: false,
        };
        pendel_core::repository::SlotRepository::insert_missing(&*store, &[slot])
            .await
            .unwrap();

        let ride = test_ride(Uuid::new_v4(), Utc::now() + Duration::hours(1), Some(slot_id.clone()));
        insert_ride(&store, &ride).await;

        let updated = lc
            .apply_status_transition(ride.id, RideStatus::CancelledByUser, None)
            .await
            .unwrap();
        assert_eq!(updated.status, RideStatus::CancelledByUser);
        assert!(updated.cancelled_at.is_some());

        let slot = pendel_core::repository::SlotRepository::get(&*store, &slot_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(slot.used_non_premium, 0);
    }

    #[tokio::test]
    async fn invalid_transition_names_both_states() {
        let store = Arc::new(MemoryStore::new());
        let lc = lifecycle(&store);
        let ride = test_ride(Uuid::new_v4(), Utc::now() + Duration::hours(1), None);
        insert_ride(&store, &ride).await;

        let err = lc
            .apply_status_transition(ride.id, RideStatus::Completed, None)
            .await
            .unwrap_err();
        match err {
            BookingError::State(StateError::InvalidTransition { from, to }) => {
                assert_eq!(from, "pending");
                assert_eq!(to, "completed");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn terminal_states_reject_further_movement() {
        let store = Arc::new(MemoryStore::new());
        let lc = lifecycle(&store);
        let mut ride = test_ride(Uuid::new_v4(), Utc::now(), None);
        ride.status = RideStatus::Completed;
        insert_ride(&store, &ride).await;

        let err = lc
            .apply_status_transition(ride.id, RideStatus::CancelledByAdmin, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BookingError::State(StateError::InvalidTransition { .. })
        ));
    }
}
