use chrono::{Duration, NaiveDate, NaiveTime};
use pendel_core::repository::SlotRepository;
use pendel_core::rules::CapacityRules;
use pendel_core::slot::{derive_slot_id, Slot};
use pendel_shared::{Direction, SlotType};
use std::sync::Arc;
use tracing::{info, warn};

use crate::CatalogError;

/// Generates and retrieves the fixed-width arrival slots of a service day.
/// Slot rows are created lazily on first reference to a date; regeneration
/// only inserts missing rows and never rewrites counters.
pub struct SlotCatalog {
    slots: Arc<dyn SlotRepository>,
    rules: CapacityRules,
}

impl SlotCatalog {
    pub fn new(slots: Arc<dyn SlotRepository>, rules: CapacityRules) -> Self {
        Self { slots, rules }
    }

    /// Ensures the day's slots exist and returns them, optionally filtered to
    /// one direction. Idempotent.
    pub async fn slots_for_date(
        &self,
        date: NaiveDate,
        direction: Option<Direction>,
    ) -> Result<Vec<Slot>, CatalogError> {
        let generated = self.generate(date, direction);
        let inserted = self.slots.insert_missing(&generated).await?;
        if inserted > 0 {
            info!(%date, inserted, "generated slots for date");
        }
        Ok(self.slots.list_for_date(date, direction).await?)
    }

    /// Resolves a derived slot id back to a stored slot, materialising the
    /// day on first reference.
    pub async fn ensure_slot(&self, slot_id: &str) -> Result<Slot, CatalogError> {
        if let Some(slot) = self.slots.get(slot_id).await? {
            return Ok(slot);
        }

        let (date, direction, _start) = parse_slot_id(slot_id)
            .ok_or_else(|| CatalogError::MalformedSlotId(slot_id.to_string()))?;
        let generated = self.generate(date, Some(direction));
        self.slots.insert_missing(&generated).await?;

        // A well-formed id can still miss the operating window or the slot
        // granularity grid.
        self.slots
            .get(slot_id)
            .await?
            .ok_or_else(|| CatalogError::UnknownSlot(slot_id.to_string()))
    }

    /// Administrative reset: drops and regenerates one day, losing its
    /// counters. Not part of normal operation.
    pub async fn reset_date(&self, date: NaiveDate) -> Result<u64, CatalogError> {
        let dropped = self.slots.delete_for_date(date).await?;
        warn!(%date, dropped, "administrative slot reset");
        let generated = self.generate(date, None);
        self.slots.insert_missing(&generated).await?;
        Ok(dropped)
    }

    /// Pure slot generation across the operating window. Peak slots carry
    /// zero non-premium capacity.
    fn generate(&self, date: NaiveDate, direction: Option<Direction>) -> Vec<Slot> {
        let directions: &[Direction] = match direction {
            Some(ref d) => std::slice::from_ref(d),
            None => &Direction::ALL,
        };

        let width = Duration::minutes(self.rules.slot_minutes as i64);
        let mut slots = Vec::new();
        for &dir in directions {
            let mut start = self.rules.day_start;
            while start < self.rules.day_end {
                let end = start + width;
                let slot_type = if self.rules.is_peak_time(start) {
                    SlotType::Peak
                } else {
                    SlotType::OffPeak
                };
                let max_non_premium = match slot_type {
                    SlotType::Peak => 0,
                    SlotType::OffPeak => self.rules.max_non_premium_per_slot,
                };
                slots.push(Slot {
                    slot_id: derive_slot_id(date, dir, start),
                    date,
                    direction: dir,
                    slot_type,
                    arrival_start: start,
                    arrival_end: end,
                    max_premium: self.rules.max_premium_per_slot,
                    used_premium: 0,
                    max_non_premium,
                    used_non_premium: 0,
                    fragile: false,
                });
                start = end;
            }
        }
        slots
    }
}

/// Inverse of `derive_slot_id`: `YYYY-MM-DD:direction:HHMM`.
pub fn parse_slot_id(slot_id: &str) -> Option<(NaiveDate, Direction, NaiveTime)> {
    let mut parts = slot_id.splitn(3, ':');
    let date = parts.next()?.parse::<NaiveDate>().ok()?;
    let direction = parts.next()?.parse::<Direction>().ok()?;
    let time = NaiveTime::parse_from_str(parts.next()?, "%H%M").ok()?;
    Some((date, direction, time))
}
