use chrono::{DateTime, Utc};
use pendel_shared::{GeoPoint, PlanType, RideType};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Ride status. Pending, Requested and Scheduled form an equivalent initial
/// group; Completed and every cancellation status are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RideStatus {
    Pending,
    Requested,
    Scheduled,
    DriverEnRoute,
    Arrived,
    InProgress,
    Completed,
    CancelledByUser,
    CancelledByAdmin,
    CancelledByDriver,
    NoShow,
}

impl RideStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RideStatus::Pending => "pending",
            RideStatus::Requested => "requested",
            RideStatus::Scheduled => "scheduled",
            RideStatus::DriverEnRoute => "driver_en_route",
            RideStatus::Arrived => "arrived",
            RideStatus::InProgress => "in_progress",
            RideStatus::Completed => "completed",
            RideStatus::CancelledByUser => "cancelled_by_user",
            RideStatus::CancelledByAdmin => "cancelled_by_admin",
            RideStatus::CancelledByDriver => "cancelled_by_driver",
            RideStatus::NoShow => "no_show",
        }
    }

    pub fn is_cancellation(&self) -> bool {
        matches!(
            self,
            RideStatus::CancelledByUser
                | RideStatus::CancelledByAdmin
                | RideStatus::CancelledByDriver
                | RideStatus::NoShow
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RideStatus::Completed) || self.is_cancellation()
    }

    fn is_initial(&self) -> bool {
        matches!(
            self,
            RideStatus::Pending | RideStatus::Requested | RideStatus::Scheduled
        )
    }

    /// The single transition table. Self-transition is a permitted no-op;
    /// cancellation is reachable from every non-terminal state.
    pub fn can_transition(from: RideStatus, to: RideStatus) -> bool {
        if from == to {
            return true;
        }
        if from.is_terminal() {
            return false;
        }
        if to.is_cancellation() {
            return true;
        }
        match (from, to) {
            // Statuses within the initial group are interchangeable.
            (f, t) if f.is_initial() && t.is_initial() => true,
            (f, RideStatus::DriverEnRoute) if f.is_initial() => true,
            (RideStatus::DriverEnRoute, RideStatus::Arrived) => true,
            (RideStatus::Arrived, RideStatus::InProgress) => true,
            (RideStatus::InProgress, RideStatus::Completed) => true,
            _ => false,
        }
    }
}

impl FromStr for RideStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RideStatus::Pending),
            "requested" => Ok(RideStatus::Requested),
            "scheduled" => Ok(RideStatus::Scheduled),
            "driver_en_route" => Ok(RideStatus::DriverEnRoute),
            "arrived" => Ok(RideStatus::Arrived),
            "in_progress" => Ok(RideStatus::InProgress),
            "completed" => Ok(RideStatus::Completed),
            "cancelled_by_user" => Ok(RideStatus::CancelledByUser),
            "cancelled_by_admin" => Ok(RideStatus::CancelledByAdmin),
            "cancelled_by_driver" => Ok(RideStatus::CancelledByDriver),
            "no_show" => Ok(RideStatus::NoShow),
            other => Err(format!("unknown ride status: {other}")),
        }
    }
}

/// Lateness compensation attached to a completed ride.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Compensation {
    None,
    HalfRefund,
    FullRefund,
}

impl Compensation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Compensation::None => "none",
            Compensation::HalfRefund => "half_refund",
            Compensation::FullRefund => "full_refund",
        }
    }
}

impl FromStr for Compensation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Compensation::None),
            "half_refund" => Ok(Compensation::HalfRefund),
            "full_refund" => Ok(Compensation::FullRefund),
            other => Err(format!("unknown compensation: {other}")),
        }
    }
}

/// A concrete booked ride. `compensation_applied` flips at most once, and
/// only after the refund credit has actually been delivered.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Ride {
    pub id: Uuid,
    pub user_id: Uuid,
    pub driver_id: Option<Uuid>,
    pub pickup: GeoPoint,
    pub dropoff: GeoPoint,
    pub pickup_time: DateTime<Utc>,
    pub pickup_window_start: DateTime<Utc>,
    pub pickup_window_end: DateTime<Utc>,
    pub arrival_target: DateTime<Utc>,
    pub arrival_window_start: DateTime<Utc>,
    pub arrival_window_end: DateTime<Utc>,
    pub ride_type: RideType,
    pub status: RideStatus,
    pub arrived_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub wait_minutes: i32,
    pub wait_charge_cents: i64,
    pub late_minutes: i32,
    pub compensation: Compensation,
    pub compensation_applied: bool,
    pub slot_id: Option<String>,
    pub plan_type: PlanType,
    pub created_at: DateTime<Utc>,
}

impl Ride {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        user_id: Uuid,
        pickup: GeoPoint,
        dropoff: GeoPoint,
        pickup_time: DateTime<Utc>,
        arrival_target: DateTime<Utc>,
        ride_type: RideType,
        plan_type: PlanType,
        slot_id: Option<String>,
        window_minutes: i64,
    ) -> Self {
        let half = chrono::Duration::minutes(window_minutes / 2);
        Self {
            id: Uuid::new_v4(),
            user_id,
            driver_id: None,
            pickup,
            dropoff,
            pickup_time,
            pickup_window_start: pickup_time - half,
            pickup_window_end: pickup_time + half,
            arrival_target,
            arrival_window_start: arrival_target - half,
            arrival_window_end: arrival_target + half,
            ride_type,
            status: RideStatus::Pending,
            arrived_at: None,
            started_at: None,
            completed_at: None,
            cancelled_at: None,
            wait_minutes: 0,
            wait_charge_cents: 0,
            late_minutes: 0,
            compensation: Compensation::None,
            compensation_applied: false,
            slot_id,
            plan_type,
            created_at: Utc::now(),
        }
    }
}

/// Field set written alongside one status change. Built by the lifecycle
/// manager, applied by the store as a single conditional update keyed on the
/// previous status.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RideTransition {
    pub arrived_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub wait_minutes: Option<i32>,
    pub wait_charge_cents: Option<i64>,
    pub late_minutes: Option<i32>,
    pub compensation: Option<Compensation>,
    pub compensation_applied: Option<bool>,
    pub driver_id: Option<Uuid>,
}
