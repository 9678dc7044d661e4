//! Membership packages, renewal windows and expiry arithmetic

use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub const DAY_MS: i64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MembershipType {
    Entry,
    Monthly,
    Yearly,
}

impl MembershipType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Entry => "entry",
            Self::Monthly => "monthly",
            Self::Yearly => "yearly",
        }
    }

    /// Package price in minor units
    pub fn price(&self) -> i64 {
        match self {
            Self::Entry => 10_000,
            Self::Monthly => 4_900,
            Self::Yearly => 49_000,
        }
    }

    pub fn duration_days(&self) -> i64 {
        match self {
            Self::Entry | Self::Monthly => 30,
            Self::Yearly => 365,
        }
    }
}

impl FromStr for MembershipType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "entry" => Ok(Self::Entry),
            "monthly" => Ok(Self::Monthly),
            "yearly" => Ok(Self::Yearly),
            other => Err(format!("unknown membership type: {}", other)),
        }
    }
}

/// Renewal stacks on top of any time still left; an expired window restarts at `now`.
pub fn renew_until(active_until_ms: Option<i64>, now_ms: i64, membership: MembershipType) -> i64 {
    let start = active_until_ms.map_or(now_ms, |t| t.max(now_ms));
    start + membership.duration_days() * DAY_MS
}

/// Whole days left, rounded up. Never negative.
pub fn remaining_days(active_until_ms: Option<i64>, now_ms: i64) -> i64 {
    match active_until_ms {
        Some(until) if until > now_ms => (until - now_ms + DAY_MS - 1) / DAY_MS,
        _ => 0,
    }
}

pub fn is_expired(active_until_ms: Option<i64>, now_ms: i64) -> bool {
    active_until_ms.map_or(true, |t| t <= now_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_760_000_000_000;

    #[test]
    fn test_remaining_days_never_negative() {
        assert_eq!(remaining_days(None, NOW), 0);
        assert_eq!(remaining_days(Some(NOW - 10 * DAY_MS), NOW), 0);
        assert_eq!(remaining_days(Some(NOW), NOW), 0);
    }

    #[test]
    fn test_remaining_days_rounds_up() {
        assert_eq!(remaining_days(Some(NOW + 1), NOW), 1);
        assert_eq!(remaining_days(Some(NOW + DAY_MS), NOW), 1);
        assert_eq!(remaining_days(Some(NOW + DAY_MS + 1), NOW), 2);
    }

    #[test]
    fn test_renew_stacks_on_remaining_time() {
        let until = NOW + 5 * DAY_MS;
        assert_eq!(
            renew_until(Some(until), NOW, MembershipType::Monthly),
            until + 30 * DAY_MS
        );
    }

    #[test]
    fn test_renew_after_expiry_starts_now() {
        assert_eq!(
            renew_until(Some(NOW - DAY_MS), NOW, MembershipType::Yearly),
            NOW + 365 * DAY_MS
        );
        assert_eq!(renew_until(None, NOW, MembershipType::Entry), NOW + 30 * DAY_MS);
    }

    #[test]
    fn test_parse_membership() {
        assert_eq!("yearly".parse::<MembershipType>(), Ok(MembershipType::Yearly));
        assert!("lifetime".parse::<MembershipType>().is_err());
        assert!(is_expired(None, NOW));
        assert!(!is_expired(Some(NOW + 1), NOW));
    }
}
