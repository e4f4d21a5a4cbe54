use serde::{Deserialize, Serialize};

/// Expected admission refusals. These are answers, not faults: every variant
/// maps to one failed check in the planner or ledger and carries a stable
/// reason code for the caller.
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum AdmissionDenied {
    #[error("Slot at premium capacity")]
    SlotFullPremium,
    #[error("Slot at non-premium capacity")]
    SlotFullNonPremium,
    #[error("Peak slots require a plan with peak access")]
    PeakRestricted,
    #[error("Daily ride cap reached")]
    DailyCapReached,
    #[error("Non-premium capacity for the day is exhausted")]
    NonPremiumDayExhausted,
    #[error("Hourly ride cap reached")]
    HourlyCapReached,
    #[error("Rider already has a ride within the overlap buffer")]
    OverlapConflict,
    #[error("No credit remaining in the current period")]
    InsufficientCredit,
}

impl AdmissionDenied {
    pub fn code(&self) -> &'static str {
        match self {
            AdmissionDenied::SlotFullPremium | AdmissionDenied::SlotFullNonPremium => "slot_full",
            AdmissionDenied::PeakRestricted => "peak_restricted",
            AdmissionDenied::DailyCapReached | AdmissionDenied::NonPremiumDayExhausted => {
                "daily_cap_reached"
            }
            AdmissionDenied::HourlyCapReached => "hourly_cap_reached",
            AdmissionDenied::OverlapConflict => "overlap_conflict",
            AdmissionDenied::InsufficientCredit => "insufficient_credit",
        }
    }
}

/// Admission answer handed to routes: a boolean plus the reason when denied.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Admission {
    pub allowed: bool,
    pub reason: Option<String>,
}

impl Admission {
    pub fn granted() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    pub fn denied(why: AdmissionDenied) -> Self {
        Self {
            allowed: false,
            reason: Some(why.to_string()),
        }
    }
}

impl From<Result<(), AdmissionDenied>> for Admission {
    fn from(res: Result<(), AdmissionDenied>) -> Self {
        match res {
            Ok(()) => Admission::granted(),
            Err(why) => Admission::denied(why),
        }
    }
}

/// Caller logic errors and lost races on status transitions.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum StateError {
    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },
    #[error("Hold is not active (status: {status})")]
    HoldNotActive { status: String },
    #[error("Hold has expired")]
    HoldExpired,
    #[error("Rider already has an active hold on this slot")]
    DuplicateHold,
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },
}

/// Failures at the storage boundary. Kept free of driver types so domain
/// crates never depend on the sqlx stack; the store crate converts into it.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    #[error("Conflicting concurrent write: {0}")]
    Conflict(String),
    #[error("Store backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    pub fn backend<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        StoreError::Backend(Box::new(err))
    }
}
