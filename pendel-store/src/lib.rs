pub mod app_config;
pub mod credit_repo;
pub mod database;
pub mod hold_repo;
pub mod memory;
pub mod profile_repo;
pub mod report_repo;
pub mod ride_repo;
pub mod slot_repo;

pub use app_config::Config;
pub use credit_repo::PgCreditRepository;
pub use database::DbClient;
pub use hold_repo::PgHoldRepository;
pub use memory::MemoryStore;
pub use profile_repo::{PgRiderRepository, PgTemplateRepository};
pub use report_repo::{PgCounterRepository, PgSummaryRepository};
pub use ride_repo::PgRideRepository;
pub use slot_repo::PgSlotRepository;

use pendel_core::error::StoreError;

/// Wraps a driver failure at the repository boundary so domain crates only
/// ever see `StoreError`.
pub(crate) fn db_err(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::PoolTimedOut => StoreError::Unavailable("connection pool timed out".into()),
        sqlx::Error::Io(e) => StoreError::Unavailable(e.to_string()),
        other => StoreError::backend(other),
    }
}

/// Enum/text decoding failure coming out of a row read.
pub(crate) fn decode_err(msg: String) -> StoreError {
    StoreError::Backend(msg.into())
}
