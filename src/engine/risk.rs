//! Heuristic risk score attached to wallet transactions (0..=100)

use crate::models::tx_type;

use super::membership::DAY_MS;

pub struct RiskInput<'a> {
    pub tx_type: &'a str,
    pub amount: i64,
    pub balance: i64,
    pub withdrawals_last_24h: i64,
    pub account_age_ms: i64,
    pub kyc_verified: bool,
}

const LARGE_DEPOSIT: i64 = 1_000_000;

pub fn risk_score(input: &RiskInput<'_>) -> i64 {
    let mut score = 0;
    match input.tx_type {
        tx_type::WITHDRAWAL => {
            score += 10;
            if input.amount * 2 > input.balance {
                score += 30;
            }
            if input.withdrawals_last_24h >= 3 {
                score += 20;
            }
            if input.account_age_ms < 7 * DAY_MS {
                score += 20;
            }
            if !input.kyc_verified {
                score += 20;
            }
        }
        tx_type::DEPOSIT => {
            if input.amount > LARGE_DEPOSIT {
                score += 20;
            }
        }
        _ => {}
    }
    score.min(100)
}
