//! Commission distribution
//!
//! Given an amount and the buyer's surroundings (sponsor chain and monoline
//! predecessors), decide who is paid what. No I/O: callers load the context
//! and apply the result inside one SQL transaction.
//!
//! Payout order, each clipped against the remaining budget
//! (`amount × max_payout_bps`):
//!   1. sponsor bonus to the direct sponsor
//!   2. differential career bonus up the sponsor chain
//!   3. passive income to the monoline predecessors
//!   4. leadership bonus to eligible ancestors at depth 2..=7

use serde::Serialize;

use super::plan::{apply_bps, CareerLevel, CommissionEvent, CommissionPlan, MAX_LEVELS};

#[derive(Debug, Clone)]
pub struct Participant {
    pub id: String,
    /// active and inside the renewal window
    pub earning: bool,
    pub level: &'static CareerLevel,
}

#[derive(Debug, Clone, Default)]
pub struct PayoutContext {
    pub buyer_id: Option<String>,
    /// nearest first: index 0 is the direct sponsor
    pub sponsor_chain: Vec<Participant>,
    /// nearest first: index 0 holds the previous monoline position
    pub monoline_predecessors: Vec<Participant>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BonusKind {
    Sponsor,
    Career,
    Passive,
    Leadership,
}

impl BonusKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sponsor => "sponsor",
            Self::Career => "career",
            Self::Passive => "passive",
            Self::Leadership => "leadership",
        }
    }

    /// Wallet column credited by this bonus
    pub fn wallet_column(&self) -> &'static str {
        match self {
            Self::Sponsor => "sponsor_bonus",
            Self::Career => "career_bonus",
            Self::Passive => "passive_income",
            Self::Leadership => "leadership_bonus",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Payout {
    pub member_id: String,
    pub kind: BonusKind,
    pub amount: i64,
    /// sponsor depth (1 = direct sponsor) or monoline distance
    pub level: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Distribution {
    pub event: CommissionEvent,
    pub amount: i64,
    pub cap: i64,
    pub payouts: Vec<Payout>,
    pub total_paid: i64,
    pub company_retained: i64,
}

impl Distribution {
    pub fn paid_to(&self, member_id: &str) -> i64 {
        self.payouts
            .iter()
            .filter(|p| p.member_id == member_id)
            .map(|p| p.amount)
            .sum()
    }
}

struct Budget {
    remaining: i64,
    payouts: Vec<Payout>,
}

impl Budget {
    fn pay(&mut self, member_id: &str, kind: BonusKind, wanted: i64, level: usize) {
        let amount = wanted.min(self.remaining);
        if amount <= 0 {
            return;
        }
        self.remaining -= amount;
        self.payouts.push(Payout {
            member_id: member_id.to_string(),
            kind,
            amount,
            level,
        });
    }
}

pub fn distribute(amount: i64, event: CommissionEvent, ctx: &PayoutContext) -> Distribution {
    let plan = CommissionPlan::for_event(event);
    let amount = amount.max(0);
    let cap = apply_bps(amount, plan.max_payout_bps);
    let mut budget = Budget {
        remaining: cap,
        payouts: Vec::new(),
    };

    let buyer = ctx.buyer_id.as_deref();
    let eligible = |p: &Participant| p.earning && buyer != Some(p.id.as_str());
    let chain: Vec<&Participant> = ctx.sponsor_chain.iter().take(MAX_LEVELS).collect();

    // 1. sponsor bonus
    if let Some(sponsor) = chain.first().copied().filter(|s| eligible(*s)) {
        budget.pay(&sponsor.id, BonusKind::Sponsor, apply_bps(amount, plan.sponsor_bps), 1);
    }

    // 2. career bonus: each ancestor earns the gap between its rate and the
    // highest rate already paid below it. Skipped members don't raise the bar.
    let mut paid_bps = 0u32;
    for (i, ancestor) in chain.iter().copied().enumerate() {
        if !eligible(ancestor) {
            continue;
        }
        let rate = ancestor.level.commission_bps;
        if rate > paid_bps {
            budget.pay(&ancestor.id, BonusKind::Career, apply_bps(amount, rate - paid_bps), i + 1);
            paid_bps = rate;
        }
    }

    // 3. passive income
    for (i, predecessor) in ctx
        .monoline_predecessors
        .iter()
        .take(MAX_LEVELS)
        .enumerate()
    {
        if eligible(predecessor) {
            budget.pay(
                &predecessor.id,
                BonusKind::Passive,
                apply_bps(amount, predecessor.level.passive_bps),
                i + 1,
            );
        }
    }

    // 4. leadership bonus
    for (i, ancestor) in chain.iter().copied().enumerate().skip(1) {
        if eligible(ancestor) && ancestor.level.leadership_eligible {
            budget.pay(
                &ancestor.id,
                BonusKind::Leadership,
                apply_bps(amount, plan.leadership_bps),
                i + 1,
            );
        }
    }

    let total_paid: i64 = budget.payouts.iter().map(|p| p.amount).sum();
    Distribution {
        event,
        amount,
        cap,
        payouts: budget.payouts,
        total_paid,
        company_retained: amount - total_paid,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::plan::career_level_by_name;

    fn p(id: &str, level: &str) -> Participant {
        Participant {
            id: id.to_string(),
            earning: true,
            level: career_level_by_name(level),
        }
    }

    fn inactive(id: &str, level: &str) -> Participant {
        Participant {
            earning: false,
            ..p(id, level)
        }
    }

    fn amounts(d: &Distribution, kind: BonusKind) -> Vec<(String, i64)> {
        d.payouts
            .iter()
            .filter(|p| p.kind == kind)
            .map(|p| (p.member_id.clone(), p.amount))
            .collect()
    }

    #[test]
    fn test_sponsor_bonus_on_299_purchase() {
        let ctx = PayoutContext {
            buyer_id: Some("buyer".into()),
            sponsor_chain: vec![p("s1", "Bronze")],
            monoline_predecessors: vec![],
        };
        let d = distribute(29_900, CommissionEvent::Purchase, &ctx);
        assert_eq!(amounts(&d, BonusKind::Sponsor), vec![("s1".to_string(), 4_485)]);
        // Bronze career rate 5%
        assert_eq!(amounts(&d, BonusKind::Career), vec![("s1".to_string(), 1_495)]);
        assert_eq!(d.total_paid, 5_980);
        assert_eq!(d.company_retained, 29_900 - 5_980);
    }

    #[test]
    fn test_career_bonus_is_differential() {
        let ctx = PayoutContext {
            buyer_id: None,
            sponsor_chain: vec![p("s1", "Silver"), p("s2", "Bronze"), p("s3", "Gold")],
            monoline_predecessors: vec![],
        };
        let d = distribute(10_000, CommissionEvent::Purchase, &ctx);
        // Silver 7%, Bronze below bar, Gold 10% - 7% = 3%
        assert_eq!(
            amounts(&d, BonusKind::Career),
            vec![("s1".to_string(), 700), ("s3".to_string(), 300)]
        );
    }

    #[test]
    fn test_inactive_members_receive_nothing() {
        let ctx = PayoutContext {
            buyer_id: None,
            sponsor_chain: vec![inactive("s1", "Diamond"), p("s2", "Gold")],
            monoline_predecessors: vec![inactive("m1", "Diamond"), p("m2", "Bronze")],
        };
        let d = distribute(10_000, CommissionEvent::Purchase, &ctx);
        assert_eq!(d.paid_to("s1"), 0);
        assert_eq!(d.paid_to("m1"), 0);
        // no sponsor bonus climbs past an inactive direct sponsor
        assert!(amounts(&d, BonusKind::Sponsor).is_empty());
        // s2 gets the full Gold career rate (inactive s1 did not raise the bar) + leadership
        assert_eq!(amounts(&d, BonusKind::Career), vec![("s2".to_string(), 1_000)]);
        assert_eq!(amounts(&d, BonusKind::Leadership), vec![("s2".to_string(), 100)]);
        assert_eq!(amounts(&d, BonusKind::Passive), vec![("m2".to_string(), 50)]);
    }

    #[test]
    fn test_total_never_exceeds_cap() {
        let chain: Vec<Participant> = (0..7).map(|i| p(&format!("s{}", i), "Diamond")).collect();
        let line: Vec<Participant> = (0..7).map(|i| p(&format!("m{}", i), "Diamond")).collect();
        let ctx = PayoutContext {
            buyer_id: None,
            sponsor_chain: chain,
            monoline_predecessors: line,
        };
        let d = distribute(100_000, CommissionEvent::Activation, &ctx);
        assert_eq!(d.cap, 50_000);
        assert_eq!(d.total_paid, 50_000);
        assert!(d.payouts.iter().all(|p| p.amount > 0));
        assert_eq!(d.total_paid + d.company_retained, d.amount);
    }

    #[test]
    fn test_depth_limited_to_seven_levels() {
        let chain: Vec<Participant> = (1..=9).map(|i| p(&format!("s{}", i), "Gold")).collect();
        let ctx = PayoutContext {
            buyer_id: None,
            sponsor_chain: chain,
            monoline_predecessors: vec![],
        };
        let d = distribute(10_000, CommissionEvent::Purchase, &ctx);
        assert_eq!(d.paid_to("s8"), 0);
        assert_eq!(d.paid_to("s9"), 0);
        assert_eq!(amounts(&d, BonusKind::Leadership).len(), 6);
    }

    #[test]
    fn test_buyer_is_never_paid() {
        let ctx = PayoutContext {
            buyer_id: Some("me".into()),
            sponsor_chain: vec![p("s1", "Bronze")],
            monoline_predecessors: vec![p("me", "Diamond"), p("m2", "Bronze")],
        };
        let d = distribute(10_000, CommissionEvent::Purchase, &ctx);
        assert_eq!(d.paid_to("me"), 0);
        assert_eq!(d.paid_to("m2"), 50);
    }

    #[test]
    fn test_zero_amount_pays_nothing() {
        let ctx = PayoutContext {
            buyer_id: None,
            sponsor_chain: vec![p("s1", "Diamond")],
            monoline_predecessors: vec![],
        };
        let d = distribute(0, CommissionEvent::Purchase, &ctx);
        assert!(d.payouts.is_empty());
        assert_eq!(d.company_retained, 0);
    }
}
