use chrono::{DateTime, Duration, Utc};
use pendel_shared::PlanType;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Hold status. `Active` is the only non-terminal state; exactly one of
/// confirm, cancel or the expiry sweep wins the transition out of it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HoldStatus {
    Active,
    Confirmed,
    Expired,
    Cancelled,
}

impl HoldStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HoldStatus::Active => "active",
            HoldStatus::Confirmed => "confirmed",
            HoldStatus::Expired => "expired",
            HoldStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, HoldStatus::Active)
    }
}

impl FromStr for HoldStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(HoldStatus::Active),
            "confirmed" => Ok(HoldStatus::Confirmed),
            "expired" => Ok(HoldStatus::Expired),
            "cancelled" => Ok(HoldStatus::Cancelled),
            other => Err(format!("unknown hold status: {other}")),
        }
    }
}

/// A short-lived provisional reservation against one slot, bridging the gap
/// between the rider deciding and the booking being confirmed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Hold {
    pub id: Uuid,
    pub slot_id: String,
    pub rider_id: Uuid,
    pub plan_type: PlanType,
    pub origin: String,
    pub destination: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: HoldStatus,
    pub confirmed_ride_id: Option<Uuid>,
}

impl Hold {
    pub fn new(
        slot_id: impl Into<String>,
        rider_id: Uuid,
        plan_type: PlanType,
        origin: impl Into<String>,
        destination: impl Into<String>,
        ttl_minutes: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            slot_id: slot_id.into(),
            rider_id,
            plan_type,
            origin: origin.into(),
            destination: destination.into(),
            created_at: now,
            expires_at: now + Duration::minutes(ttl_minutes),
            status: HoldStatus::Active,
            confirmed_ride_id: None,
        }
    }

    /// Wall-clock expiry. Binds even before the sweep has flipped the status.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_hold_is_active_with_ttl() {
        let hold = Hold::new("2026-08-26:to_work:0630", Uuid::new_v4(), PlanType::Standard, "a", "b", 5);
        assert_eq!(hold.status, HoldStatus::Active);
        assert_eq!((hold.expires_at - hold.created_at).num_minutes(), 5);
        assert!(!hold.is_expired(hold.created_at));
        assert!(hold.is_expired(hold.expires_at));
    }
}
