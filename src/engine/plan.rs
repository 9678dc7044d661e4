//! Compensation plan: career levels and per-event commission rates

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Sponsor-tree and monoline depth considered for payouts and team stats
pub const MAX_LEVELS: usize = 7;

pub const BPS_DENOMINATOR: i64 = 10_000;

#[derive(Debug, PartialEq, Eq)]
pub struct CareerLevel {
    pub name: &'static str,
    pub rank: u8,
    pub min_direct_referrals: i64,
    pub min_team_size: i64,
    pub commission_bps: u32,
    pub passive_bps: u32,
    pub leadership_eligible: bool,
}

pub static CAREER_LEVELS: [CareerLevel; 5] = [
    CareerLevel {
        name: "Bronze",
        rank: 0,
        min_direct_referrals: 0,
        min_team_size: 0,
        commission_bps: 500,
        passive_bps: 50,
        leadership_eligible: false,
    },
    CareerLevel {
        name: "Silver",
        rank: 1,
        min_direct_referrals: 3,
        min_team_size: 10,
        commission_bps: 700,
        passive_bps: 100,
        leadership_eligible: false,
    },
    CareerLevel {
        name: "Gold",
        rank: 2,
        min_direct_referrals: 5,
        min_team_size: 25,
        commission_bps: 1000,
        passive_bps: 150,
        leadership_eligible: true,
    },
    CareerLevel {
        name: "Platinum",
        rank: 3,
        min_direct_referrals: 10,
        min_team_size: 100,
        commission_bps: 1200,
        passive_bps: 200,
        leadership_eligible: true,
    },
    CareerLevel {
        name: "Diamond",
        rank: 4,
        min_direct_referrals: 20,
        min_team_size: 500,
        commission_bps: 1500,
        passive_bps: 300,
        leadership_eligible: true,
    },
];

/// Unknown names fall back to the entry level.
pub fn career_level_by_name(name: &str) -> &'static CareerLevel {
    CAREER_LEVELS
        .iter()
        .find(|l| l.name.eq_ignore_ascii_case(name))
        .unwrap_or(&CAREER_LEVELS[0])
}

/// Highest level whose thresholds are both met
pub fn career_level_for(active_directs: i64, team_size: i64) -> &'static CareerLevel {
    CAREER_LEVELS
        .iter()
        .rev()
        .find(|l| active_directs >= l.min_direct_referrals && team_size >= l.min_team_size)
        .unwrap_or(&CAREER_LEVELS[0])
}

/// Levels only go up: a member keeps a rank once reached.
pub fn promote(
    current: &'static CareerLevel,
    active_directs: i64,
    team_size: i64,
) -> &'static CareerLevel {
    let earned = career_level_for(active_directs, team_size);
    if earned.rank > current.rank {
        earned
    } else {
        current
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommissionEvent {
    Purchase,
    Activation,
}

impl CommissionEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Purchase => "purchase",
            Self::Activation => "activation",
        }
    }
}

impl fmt::Display for CommissionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommissionEvent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "purchase" => Ok(Self::Purchase),
            "activation" | "placement" => Ok(Self::Activation),
            other => Err(format!("unknown commission event: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommissionPlan {
    pub sponsor_bps: u32,
    pub leadership_bps: u32,
    pub max_payout_bps: u32,
}

impl CommissionPlan {
    pub const fn for_event(event: CommissionEvent) -> Self {
        match event {
            CommissionEvent::Purchase => Self {
                sponsor_bps: 1500,
                leadership_bps: 100,
                max_payout_bps: 5000,
            },
            CommissionEvent::Activation => Self {
                sponsor_bps: 2500,
                leadership_bps: 100,
                max_payout_bps: 5000,
            },
        }
    }
}

/// `amount × bps / 10000`, floored for non-negative amounts
pub fn apply_bps(amount: i64, bps: u32) -> i64 {
    let scaled = i128::from(amount) * i128::from(bps) / i128::from(BPS_DENOMINATOR);
    i64::try_from(scaled).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels_are_ordered() {
        for pair in CAREER_LEVELS.windows(2) {
            assert!(pair[0].rank < pair[1].rank);
            assert!(pair[0].commission_bps < pair[1].commission_bps);
            assert!(pair[0].min_team_size <= pair[1].min_team_size);
        }
    }

    #[test]
    fn test_career_level_for_needs_both_thresholds() {
        assert_eq!(career_level_for(0, 0).name, "Bronze");
        assert_eq!(career_level_for(3, 10).name, "Silver");
        // enough directs but not enough team
        assert_eq!(career_level_for(25, 24).name, "Silver");
        assert_eq!(career_level_for(20, 500).name, "Diamond");
    }

    #[test]
    fn test_promote_never_demotes() {
        let gold = career_level_by_name("Gold");
        assert_eq!(promote(gold, 0, 0).name, "Gold");
        assert_eq!(promote(gold, 10, 100).name, "Platinum");
    }

    #[test]
    fn test_level_lookup_falls_back_to_bronze() {
        assert_eq!(career_level_by_name("gold").name, "Gold");
        assert_eq!(career_level_by_name("Unobtainium").name, "Bronze");
    }

    #[test]
    fn test_apply_bps_floors() {
        // 299.00 at 15% is 44.85
        assert_eq!(apply_bps(29_900, 1500), 4_485);
        assert_eq!(apply_bps(99, 50), 0);
        assert_eq!(apply_bps(0, 2500), 0);
    }

    #[test]
    fn test_event_parse() {
        assert_eq!("purchase".parse::<CommissionEvent>(), Ok(CommissionEvent::Purchase));
        assert_eq!("placement".parse::<CommissionEvent>(), Ok(CommissionEvent::Activation));
        assert!("refund".parse::<CommissionEvent>().is_err());
    }
}
