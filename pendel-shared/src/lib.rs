pub mod geo;
pub mod kinds;
pub mod timeutil;

pub use geo::{distance_km, GeoPoint};
pub use kinds::{Direction, PlanType, RideType, ServiceTier, SlotType};
