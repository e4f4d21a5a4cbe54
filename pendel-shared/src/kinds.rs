use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Travel direction of a shuttle slot or ride.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    ToWork,
    ToHome,
}

impl Direction {
    pub const ALL: [Direction; 2] = [Direction::ToWork, Direction::ToHome];

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::ToWork => "to_work",
            Direction::ToHome => "to_home",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "to_work" => Ok(Direction::ToWork),
            "to_home" => Ok(Direction::ToHome),
            other => Err(format!("unknown direction: {other}")),
        }
    }
}

/// Capacity tier a reservation counts against.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ServiceTier {
    Premium,
    NonPremium,
}

impl ServiceTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceTier::Premium => "premium",
            ServiceTier::NonPremium => "non_premium",
        }
    }
}

/// Subscription plan of a rider. The plan decides the capacity tier and
/// whether peak-window slots are bookable at all.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlanType {
    Standard,
    PeakStandard,
    Premium,
}

impl PlanType {
    pub fn tier(&self) -> ServiceTier {
        match self {
            PlanType::Premium => ServiceTier::Premium,
            PlanType::Standard | PlanType::PeakStandard => ServiceTier::NonPremium,
        }
    }

    pub fn has_peak_access(&self) -> bool {
        matches!(self, PlanType::PeakStandard | PlanType::Premium)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlanType::Standard => "standard",
            PlanType::PeakStandard => "peak_standard",
            PlanType::Premium => "premium",
        }
    }
}

impl FromStr for PlanType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "standard" => Ok(PlanType::Standard),
            "peak_standard" => Ok(PlanType::PeakStandard),
            "premium" => Ok(PlanType::Premium),
            other => Err(format!("unknown plan type: {other}")),
        }
    }
}

/// Kind of ride, each drawing from its own credit pool.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RideType {
    Standard,
    Grocery,
}

impl RideType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RideType::Standard => "standard",
            RideType::Grocery => "grocery",
        }
    }
}

impl FromStr for RideType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "standard" => Ok(RideType::Standard),
            "grocery" => Ok(RideType::Grocery),
            other => Err(format!("unknown ride type: {other}")),
        }
    }
}

/// Peak classification of a slot. Peak slots carry zero non-premium capacity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SlotType {
    Peak,
    OffPeak,
}

impl SlotType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SlotType::Peak => "peak",
            SlotType::OffPeak => "off_peak",
        }
    }
}

impl FromStr for SlotType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "peak" => Ok(SlotType::Peak),
            "off_peak" => Ok(SlotType::OffPeak),
            other => Err(format!("unknown slot type: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_tier_mapping() {
        assert_eq!(PlanType::Premium.tier(), ServiceTier::Premium);
        assert_eq!(PlanType::Standard.tier(), ServiceTier::NonPremium);
        assert_eq!(PlanType::PeakStandard.tier(), ServiceTier::NonPremium);
        assert!(PlanType::PeakStandard.has_peak_access());
        assert!(!PlanType::Standard.has_peak_access());
    }

    #[test]
    fn direction_round_trip() {
        for d in Direction::ALL {
            assert_eq!(d.as_str().parse::<Direction>().unwrap(), d);
        }
    }
}
