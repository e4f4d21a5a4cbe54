pub mod ledger;
pub mod planner;
pub mod slots;

pub use ledger::CapacityLedger;
pub use planner::CapacityPlanner;
pub use slots::SlotCatalog;

use pendel_core::error::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Unknown slot: {0}")]
    UnknownSlot(String),

    #[error("Malformed slot id: {0}")]
    MalformedSlotId(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}
