pub mod credit;
pub mod error;
pub mod estimator;
pub mod hold;
pub mod repository;
pub mod ride;
pub mod rider;
pub mod rules;
pub mod slot;
pub mod summary;
pub mod template;

pub use credit::{CreditDefaults, CreditPeriod};
pub use error::{Admission, AdmissionDenied, StateError, StoreError};
pub use estimator::{DefaultEstimator, TravelEstimator};
pub use hold::{Hold, HoldStatus};
pub use ride::{Compensation, Ride, RideStatus, RideTransition};
pub use rider::Rider;
pub use rules::CapacityRules;
pub use slot::{Slot, TierUsage};
pub use summary::DailySummary;
pub use template::ScheduleTemplate;
