pub mod analysis;
pub mod expander;

pub use analysis::{DayLoadReport, LoadAnalyzer};
pub use expander::{ExpansionOutcome, ScheduleExpander};

use pendel_core::error::StoreError;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error("Unknown rider: {0}")]
    UnknownRider(Uuid),

    #[error(transparent)]
    Store(#[from] StoreError),
}
