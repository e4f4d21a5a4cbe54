use chrono::Utc;
use pendel_catalog::CapacityLedger;
use pendel_core::error::{AdmissionDenied, StateError, StoreError};
use pendel_core::hold::{Hold, HoldStatus};
use pendel_core::repository::HoldRepository;
use pendel_core::rules::CapacityRules;
use pendel_shared::{PlanType, ServiceTier};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::BookingError;

/// Provisional reservations bridging "deciding" and "confirmed". Capacity is
/// taken from the ledger before the hold row exists, and every exit from
/// `active` is a compare-and-set in the store, so confirm, cancel and the
/// expiry sweep cannot double-settle the same hold.
pub struct HoldManager {
    holds: Arc<dyn HoldRepository>,
    ledger: CapacityLedger,
    rules: CapacityRules,
}

impl HoldManager {
    pub fn new(holds: Arc<dyn HoldRepository>, ledger: CapacityLedger, rules: CapacityRules) -> Self {
        Self {
            holds,
            ledger,
            rules,
        }
    }

    /// Reserves capacity and creates an active hold expiring after the
    /// configured TTL. On a saturated slot nothing is mutated and the caller
    /// gets the admission reason.
    pub async fn create_hold(
        &self,
        slot_id: &str,
        rider_id: Uuid,
        plan_type: PlanType,
        origin: &str,
        destination: &str,
    ) -> Result<Hold, BookingError> {
        if self.holds.active_for(slot_id, rider_id).await?.is_some() {
            return Err(StateError::DuplicateHold.into());
        }

        let tier = plan_type.tier();
        if !self.ledger.reserve(slot_id, tier).await? {
            return Err(match tier {
                ServiceTier::Premium => AdmissionDenied::SlotFullPremium,
                ServiceTier::NonPremium => AdmissionDenied::SlotFullNonPremium,
            }
            .into());
        }

        let hold = Hold::new(
            slot_id,
            rider_id,
            plan_type,
            origin,
            destination,
            self.rules.hold_ttl_minutes,
        );

        match self.holds.insert(&hold).await {
            Ok(()) => {
                info!(hold_id = %hold.id, slot_id, %rider_id, "hold created");
                Ok(hold)
            }
            Err(err) => {
                // The reservation must not leak when the insert loses; a
                // failed release leaves an orphaned unit for the sweep logs.
                if let Err(release_err) = self.ledger.release(slot_id, tier).await {
                    warn!(slot_id, error = %release_err, "failed to release after hold insert error");
                }
                match err {
                    StoreError::Conflict(_) => Err(StateError::DuplicateHold.into()),
                    other => Err(other.into()),
                }
            }
        }
    }

    /// Confirms an active, unexpired hold, linking the booked ride. The
    /// ledger reservation is retained as the ride's permanent allocation.
    /// The wall-clock check binds even when the sweep has not run yet.
    pub async fn confirm_hold(&self, hold_id: Uuid, ride_id: Uuid) -> Result<Hold, BookingError> {
        self.require(hold_id).await?;
        let now = Utc::now();

        if self.holds.confirm(hold_id, ride_id, now).await? {
            info!(%hold_id, %ride_id, "hold confirmed");
            return self.require(hold_id).await;
        }

        // Lost: either the hold left `active` first or the clock ran out.
        let current = self.require(hold_id).await?;
        match current.status {
            HoldStatus::Active | HoldStatus::Expired => Err(StateError::HoldExpired.into()),
            other => Err(StateError::HoldNotActive {
                status: other.as_str().to_string(),
            }
            .into()),
        }
    }

    /// Cancels an active hold and returns its capacity to the ledger.
    pub async fn cancel_hold(&self, hold_id: Uuid) -> Result<Hold, BookingError> {
        let hold = self.require(hold_id).await?;

        if !self.holds.cancel(hold_id).await? {
            let current = self.require(hold_id).await?;
            return Err(StateError::HoldNotActive {
                status: current.status.as_str().to_string(),
            }
            .into());
        }

        self.ledger
            .release(&hold.slot_id, hold.plan_type.tier())
            .await?;
        info!(%hold_id, slot_id = %hold.slot_id, "hold cancelled");
        self.require(hold_id).await
    }

    /// Batch expiry sweep. The conditional transition in the store returns
    /// only the holds this call flipped, so their capacity is released
    /// exactly once and a concurrent or repeated sweep is a no-op.
    pub async fn expire_holds(&self) -> Result<usize, BookingError> {
        let expired = self.holds.expire_due(Utc::now()).await?;

        for hold in &expired {
            if let Err(err) = self
                .ledger
                .release(&hold.slot_id, hold.plan_type.tier())
                .await
            {
                warn!(hold_id = %hold.id, error = %err, "failed to release expired hold capacity");
            }
        }

        if !expired.is_empty() {
            info!(count = expired.len(), "expired holds swept");
        }
        Ok(expired.len())
    }

    async fn require(&self, hold_id: Uuid) -> Result<Hold, BookingError> {
        self.holds
            .get(hold_id)
            .await?
            .ok_or_else(|| {
                StateError::NotFound {
                    kind: "hold",
                    id: hold_id.to_string(),
                }
                .into()
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate, NaiveTime};
    use pendel_core::slot::{derive_slot_id, Slot};
    use pendel_shared::{Direction, SlotType};
    use pendel_store::MemoryStore;

    async fn setup(non_premium_capacity: i32) -> (HoldManager, Arc<MemoryStore>, String) {
        let store = Arc::new(MemoryStore::new());
        let date = NaiveDate::from_ymd_opt(2026, 9, 7).unwrap();
        let start = NaiveTime::from_hms_opt(10, 0, 0).unwrap();
        let slot_id = derive_slot_id(date, Direction::ToWork, start);
        let slot = Slot {
            slot_id: slot_id.clone(),
            date,
            direction: Direction::ToWork,
            slot_type: SlotType::OffPeak,
            arrival_start: start,
            arrival_end: NaiveTime::from_hms_opt(10, 5, 0).unwrap(),
            max_premium: 2,
            used_premium: 0,
            max_non_premium: non_premium_capacity,
            used_non_premium: 0,
            fragile: false,
        };
        pendel_core::repository::SlotRepository::insert_missing(&*store, &[slot])
            .await
            .unwrap();

        let manager = HoldManager::new(
            store.clone(),
            CapacityLedger::new(store.clone()),
            CapacityRules::default(),
        );
        (manager, store, slot_id)
    }

    async fn slot_usage(store: &MemoryStore, slot_id: &str) -> i32 {
        pendel_core::repository::SlotRepository::get(store, slot_id)
            .await
            .unwrap()
            .unwrap()
            .used_non_premium
    }

    #[tokio::test]
    async fn create_and_confirm_keeps_reservation() {
        let (manager, store, slot_id) = setup(2).await;
        let rider = Uuid::new_v4();

        let hold = manager
            .create_hold(&slot_id, rider, PlanType::Standard, "home", "work")
            .await
            .unwrap();
        assert_eq!(slot_usage(&store, &slot_id).await, 1);

        let ride_id = Uuid::new_v4();
        let confirmed = manager.confirm_hold(hold.id, ride_id).await.unwrap();
        assert_eq!(confirmed.status, HoldStatus::Confirmed);
        assert_eq!(confirmed.confirmed_ride_id, Some(ride_id));
        // The permanent allocation stays on the slot.
        assert_eq!(slot_usage(&store, &slot_id).await, 1);
    }

    #[tokio::test]
    async fn saturated_slot_denies_without_mutation() {
        let (manager, store, slot_id) = setup(1).await;

        manager
            .create_hold(&slot_id, Uuid::new_v4(), PlanType::Standard, "a", "b")
            .await
            .unwrap();
        let err = manager
            .create_hold(&slot_id, Uuid::new_v4(), PlanType::Standard, "a", "b")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            BookingError::Admission(AdmissionDenied::SlotFullNonPremium)
        ));
        assert_eq!(slot_usage(&store, &slot_id).await, 1);
    }

    #[tokio::test]
    async fn duplicate_active_hold_is_rejected() {
        let (manager, store, slot_id) = setup(2).await;
        let rider = Uuid::new_v4();

        manager
            .create_hold(&slot_id, rider, PlanType::Standard, "a", "b")
            .await
            .unwrap();
        let err = manager
            .create_hold(&slot_id, rider, PlanType::Standard, "a", "b")
            .await
            .unwrap_err();

        assert!(matches!(err, BookingError::State(StateError::DuplicateHold)));
        assert_eq!(slot_usage(&store, &slot_id).await, 1);
    }

    #[tokio::test]
    async fn cancel_returns_capacity() {
        let (manager, store, slot_id) = setup(2).await;

        let hold = manager
            .create_hold(&slot_id, Uuid::new_v4(), PlanType::Standard, "a", "b")
            .await
            .unwrap();
        let cancelled = manager.cancel_hold(hold.id).await.unwrap();

        assert_eq!(cancelled.status, HoldStatus::Cancelled);
        assert_eq!(slot_usage(&store, &slot_id).await, 0);
    }

    #[tokio::test]
    async fn confirm_after_wall_clock_expiry_fails_without_sweep() {
        let (manager, store, slot_id) = setup(2).await;
        let rider = Uuid::new_v4();

        // Insert a hold whose clock has already run out but whose status is
        // still active: the sweep has not seen it yet.
        let mut hold = Hold::new(&slot_id, rider, PlanType::Standard, "a", "b", 5);
        hold.expires_at = Utc::now() - Duration::seconds(1);
        pendel_core::repository::HoldRepository::insert(&*store, &hold)
            .await
            .unwrap();

        let err = manager.confirm_hold(hold.id, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, BookingError::State(StateError::HoldExpired)));
    }

    #[tokio::test]
    async fn sweep_expires_and_releases_exactly_once() {
        let (manager, store, slot_id) = setup(2).await;

        let _live = manager
            .create_hold(&slot_id, Uuid::new_v4(), PlanType::Standard, "a", "b")
            .await
            .unwrap();
        assert_eq!(slot_usage(&store, &slot_id).await, 1);

        // Nothing is due yet.
        assert_eq!(manager.expire_holds().await.unwrap(), 0);

        // A second hold whose clock already ran out, with its own reserved
        // unit on the slot.
        let mut stale = Hold::new(&slot_id, Uuid::new_v4(), PlanType::Standard, "a", "b", 5);
        stale.expires_at = Utc::now() - Duration::seconds(1);
        pendel_core::repository::SlotRepository::try_reserve(
            &*store,
            &slot_id,
            ServiceTier::NonPremium,
        )
        .await
        .unwrap();
        pendel_core::repository::HoldRepository::insert(&*store, &stale)
            .await
            .unwrap();

        assert_eq!(manager.expire_holds().await.unwrap(), 1);
        assert_eq!(slot_usage(&store, &slot_id).await, 1);
        // Double sweep is a no-op.
        assert_eq!(manager.expire_holds().await.unwrap(), 0);
        assert_eq!(slot_usage(&store, &slot_id).await, 1);
    }

    #[tokio::test]
    async fn confirm_settled_hold_reports_status() {
        let (manager, _store, slot_id) = setup(2).await;

        let hold = manager
            .create_hold(&slot_id, Uuid::new_v4(), PlanType::Standard, "a", "b")
            .await
            .unwrap();
        manager.cancel_hold(hold.id).await.unwrap();

        let err = manager.confirm_hold(hold.id, Uuid::new_v4()).await.unwrap_err();
        match err {
            BookingError::State(StateError::HoldNotActive { status }) => {
                assert_eq!(status, "cancelled")
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
