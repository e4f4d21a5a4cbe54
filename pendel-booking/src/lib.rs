pub mod holds;
pub mod lifecycle;
pub mod notify;

pub use holds::HoldManager;
pub use lifecycle::RideLifecycle;
pub use notify::{LogNotifier, Notifier};

use pendel_core::error::{AdmissionDenied, StateError, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error(transparent)]
    Admission(#[from] AdmissionDenied),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<pendel_catalog::CatalogError> for BookingError {
    fn from(err: pendel_catalog::CatalogError) -> Self {
        match err {
            pendel_catalog::CatalogError::Store(e) => BookingError::Store(e),
            other => BookingError::Store(StoreError::backend(other)),
        }
    }
}
