use pendel_core::repository::SlotRepository;
use pendel_shared::ServiceTier;
use std::sync::Arc;
use tracing::debug;

use crate::CatalogError;

/// The only writer of slot capacity counters. Both operations are single
/// atomic conditional updates in the store, so concurrent callers cannot
/// oversell the last unit and over-release clamps at zero.
#[derive(Clone)]
pub struct CapacityLedger {
    slots: Arc<dyn SlotRepository>,
}

impl CapacityLedger {
    pub fn new(slots: Arc<dyn SlotRepository>) -> Self {
        Self { slots }
    }

    /// True when one unit of the tier was reserved; false on saturation,
    /// with no mutation.
    pub async fn reserve(&self, slot_id: &str, tier: ServiceTier) -> Result<bool, CatalogError> {
        let reserved = self.slots.try_reserve(slot_id, tier).await?;
        debug!(slot_id, tier = tier.as_str(), reserved, "ledger reserve");
        Ok(reserved)
    }

    /// Returns one unit of the tier. Releasing below zero is tolerated; a
    /// double release after an expiry sweep is a no-op, not an error.
    pub async fn release(&self, slot_id: &str, tier: ServiceTier) -> Result<(), CatalogError> {
        self.slots.release(slot_id, tier).await?;
        debug!(slot_id, tier = tier.as_str(), "ledger release");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};
    use pendel_core::slot::{derive_slot_id, Slot};
    use pendel_shared::{Direction, SlotType};
    use pendel_store::MemoryStore;

    async fn seeded_ledger(remaining: i32) -> (CapacityLedger, Arc<MemoryStore>, String) {
        let store = Arc::new(MemoryStore::new());
        let date = NaiveDate::from_ymd_opt(2026, 9, 3).unwrap();
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
            max_non_premium: remaining,
            used_non_premium: 0,
            fragile: false,
        };
        store.insert_missing(&[slot]).await.unwrap();
        (CapacityLedger::new(store.clone()), store, slot_id)
    }

    #[tokio::test]
    async fn last_unit_has_exactly_one_winner() {
        let (ledger, _store, slot_id) = seeded_ledger(1).await;

        let a = ledger.reserve(&slot_id, ServiceTier::NonPremium);
        let b = ledger.reserve(&slot_id, ServiceTier::NonPremium);
        let (a, b) = tokio::join!(a, b);

        let wins = [a.unwrap(), b.unwrap()].iter().filter(|w| **w).count();
        assert_eq!(wins, 1);
    }

    #[tokio::test]
    async fn reserve_on_unknown_slot_fails_closed() {
        let store = Arc::new(MemoryStore::new());
        let ledger = CapacityLedger::new(store);
        assert!(!ledger
            .reserve("2026-09-03:to_work:1000", ServiceTier::Premium)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn conservation_under_reserve_release_cycles() {
        let (ledger, store, slot_id) = seeded_ledger(2).await;

        for _ in 0..2 {
            assert!(ledger.reserve(&slot_id, ServiceTier::NonPremium).await.unwrap());
        }
        for _ in 0..3 {
            ledger.release(&slot_id, ServiceTier::NonPremium).await.unwrap();
        }

        let slot = store.get(&slot_id).await.unwrap().unwrap();
        assert_eq!(slot.used_non_premium, 0);
        assert!(slot.invariant_holds());
    }
}
