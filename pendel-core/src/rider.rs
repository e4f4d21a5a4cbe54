use pendel_shared::{GeoPoint, PlanType};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A subscribed rider. Home and work locations anchor the recurring
/// templates; the plan decides the capacity tier and peak entitlement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Rider {
    pub id: Uuid,
    pub plan_type: PlanType,
    pub home: GeoPoint,
    pub work: GeoPoint,
    pub active: bool,
}

impl Rider {
    pub fn new(plan_type: PlanType, home: GeoPoint, work: GeoPoint) -> Self {
        Self {
            id: Uuid::new_v4(),
            plan_type,
            home,
            work,
            active: true,
        }
    }
}
