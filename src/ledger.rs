//! Wallet ledger
//!
//! Every balance change goes through here and writes a `transactions` row
//! with before/after snapshots. Callers pass a connection that is already
//! inside a SQL transaction when several rows must change together.

use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use std::fmt;
use std::str::FromStr;
use tracing::info;

use crate::engine::membership::DAY_MS;
use crate::engine::risk::{risk_score, RiskInput};
use crate::engine::{BonusKind, Distribution};
use crate::error::{ApiError, ApiResult};
use crate::models::{kyc_status, tx_type, Member, Transaction, WalletSnapshot};
use crate::store::require_member;

/// Largest single transaction amount, in minor units
pub const MAX_TX_AMOUNT: i64 = 1_000_000_000_000;

// ========================================
// Status state machine
// ========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl TxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn can_transition_to(&self, next: TxStatus) -> bool {
        use TxStatus::*;
        matches!(
            (self, next),
            (Pending, Processing | Completed | Failed | Cancelled)
                | (Processing, Completed | Failed)
        )
    }
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TxStatus {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(ApiError::bad_request(format!("Unknown status: {}", other))),
        }
    }
}

// ========================================
// Rows
// ========================================

struct NewTransaction<'a> {
    member_id: &'a str,
    tx_type: &'a str,
    status: TxStatus,
    amount: i64,
    bonus_kind: Option<&'a str>,
    counterparty_id: Option<&'a str>,
    reference_id: Option<&'a str>,
    description: Option<&'a str>,
    before: WalletSnapshot,
    after: WalletSnapshot,
    risk_score: i64,
}

fn snapshot_json(snapshot: &WalletSnapshot) -> String {
    serde_json::to_string(snapshot).unwrap_or_else(|_| "{}".to_string())
}

async fn insert_transaction(
    conn: &mut SqliteConnection,
    new: NewTransaction<'_>,
    now_ms: i64,
) -> ApiResult<Transaction> {
    let id = uuid::Uuid::new_v4().to_string();
    let completed_at = (new.status == TxStatus::Completed).then_some(now_ms);
    let processed_at = new.status.is_terminal().then_some(now_ms);

    sqlx::query(r#"
        INSERT INTO transactions (
            id, member_id, tx_type, status, amount, bonus_kind,
            counterparty_id, reference_id, description,
            balances_before, balances_after, risk_score,
            created_at_ms, processed_at_ms, completed_at_ms
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
    "#)
    .bind(&id)
    .bind(new.member_id)
    .bind(new.tx_type)
    .bind(new.status.as_str())
    .bind(new.amount)
    .bind(new.bonus_kind)
    .bind(new.counterparty_id)
    .bind(new.reference_id)
    .bind(new.description)
    .bind(snapshot_json(&new.before))
    .bind(snapshot_json(&new.after))
    .bind(new.risk_score)
    .bind(now_ms)
    .bind(processed_at)
    .bind(completed_at)
    .execute(&mut *conn)
    .await?;

    require_transaction(conn, &id).await
}

pub async fn require_transaction(conn: &mut SqliteConnection, id: &str) -> ApiResult<Transaction> {
    sqlx::query_as("SELECT * FROM transactions WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Transaction not found: {}", id)))
}

fn require_positive(amount: i64) -> ApiResult<()> {
    if amount <= 0 {
        return Err(ApiError::bad_request("Amount must be positive"));
    }
    if amount > MAX_TX_AMOUNT {
        return Err(ApiError::bad_request("Amount too large"));
    }
    Ok(())
}

pub(crate) fn checked_sum(a: i64, b: i64) -> ApiResult<i64> {
    a.checked_add(b)
        .ok_or_else(|| ApiError::bad_request("Amount too large"))
}

/// Adds `delta` to the spendable balance. Refuses to go below zero.
async fn move_balance(
    conn: &mut SqliteConnection,
    member_id: &str,
    delta: i64,
    now_ms: i64,
) -> ApiResult<(WalletSnapshot, WalletSnapshot)> {
    let before = require_member(conn, member_id).await?.wallet();
    let balance = checked_sum(before.balance, delta)?;
    if balance < 0 {
        return Err(ApiError::bad_request("Insufficient balance"));
    }
    sqlx::query("UPDATE members SET balance = balance + ?, updated_at_ms = ? WHERE id = ?")
        .bind(delta)
        .bind(now_ms)
        .bind(member_id)
        .execute(&mut *conn)
        .await?;
    let after = WalletSnapshot { balance, ..before };
    Ok((before, after))
}

// ========================================
// Earnings
// ========================================

/// Credits one bonus. Balance, the bonus column and total_earnings move in
/// the same statement so total_earnings always equals the bonus sum.
pub async fn credit_earning(
    conn: &mut SqliteConnection,
    member_id: &str,
    kind: BonusKind,
    amount: i64,
    reference_id: Option<&str>,
    description: &str,
    now_ms: i64,
) -> ApiResult<Transaction> {
    require_positive(amount)?;
    let before = require_member(conn, member_id).await?.wallet();

    let mut after = before;
    after.balance = checked_sum(after.balance, amount)?;
    after.total_earnings = checked_sum(after.total_earnings, amount)?;
    let bucket = match kind {
        BonusKind::Sponsor => &mut after.sponsor_bonus,
        BonusKind::Career => &mut after.career_bonus,
        BonusKind::Passive => &mut after.passive_income,
        BonusKind::Leadership => &mut after.leadership_bonus,
    };
    *bucket = checked_sum(*bucket, amount)?;

    let column = kind.wallet_column();
    let sql = format!(
        "UPDATE members SET balance = balance + ?1, total_earnings = total_earnings + ?1, \
         {col} = {col} + ?1, updated_at_ms = ?2 WHERE id = ?3",
        col = column
    );
    sqlx::query(&sql)
        .bind(amount)
        .bind(now_ms)
        .bind(member_id)
        .execute(&mut *conn)
        .await?;

    insert_transaction(
        conn,
        NewTransaction {
            member_id,
            tx_type: tx_type::COMMISSION,
            status: TxStatus::Completed,
            amount,
            bonus_kind: Some(kind.as_str()),
            counterparty_id: None,
            reference_id,
            description: Some(description),
            before,
            after,
            risk_score: 0,
        },
        now_ms,
    )
    .await
}

/// Pays every payout of a distribution. Returns the total credited.
pub async fn apply_distribution(
    conn: &mut SqliteConnection,
    distribution: &Distribution,
    reference_id: &str,
    now_ms: i64,
) -> ApiResult<i64> {
    let mut total = 0;
    for payout in &distribution.payouts {
        let description = format!(
            "{} bonus ({}, level {})",
            payout.kind.as_str(),
            distribution.event,
            payout.level
        );
        credit_earning(
            conn,
            &payout.member_id,
            payout.kind,
            payout.amount,
            Some(reference_id),
            &description,
            now_ms,
        )
        .await?;
        total += payout.amount;
    }
    if total > 0 {
        info!(
            "Distribution applied: reference={}, event={}, payouts={}, total={}",
            reference_id,
            distribution.event,
            distribution.payouts.len(),
            total
        );
    }
    Ok(total)
}

// ========================================
// Member-initiated transactions
// ========================================

async fn withdrawals_last_24h(
    conn: &mut SqliteConnection,
    member_id: &str,
    now_ms: i64,
) -> ApiResult<i64> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM transactions WHERE member_id = ? AND tx_type = ? AND created_at_ms > ?",
    )
    .bind(member_id)
    .bind(tx_type::WITHDRAWAL)
    .bind(now_ms - DAY_MS)
    .fetch_one(&mut *conn)
    .await?;
    Ok(count)
}

/// Deposit request: pending until an admin completes it
pub async fn create_deposit(
    conn: &mut SqliteConnection,
    member: &Member,
    amount: i64,
    description: Option<&str>,
    now_ms: i64,
) -> ApiResult<Transaction> {
    require_positive(amount)?;
    let wallet = member.wallet();
    let score = risk_score(&RiskInput {
        tx_type: tx_type::DEPOSIT,
        amount,
        balance: wallet.balance,
        withdrawals_last_24h: 0,
        account_age_ms: now_ms - member.created_at_ms,
        kyc_verified: member.kyc_status == kyc_status::VERIFIED,
    });
    insert_transaction(
        conn,
        NewTransaction {
            member_id: &member.id,
            tx_type: tx_type::DEPOSIT,
            status: TxStatus::Pending,
            amount,
            bonus_kind: None,
            counterparty_id: None,
            reference_id: None,
            description,
            before: wallet,
            after: wallet,
            risk_score: score,
        },
        now_ms,
    )
    .await
}

/// Withdrawal request: the amount is held (debited) right away and
/// returned if the request fails or is cancelled.
pub async fn create_withdrawal(
    conn: &mut SqliteConnection,
    member: &Member,
    amount: i64,
    description: Option<&str>,
    now_ms: i64,
) -> ApiResult<Transaction> {
    require_positive(amount)?;
    let recent = withdrawals_last_24h(conn, &member.id, now_ms).await?;
    let (before, after) = move_balance(conn, &member.id, -amount, now_ms).await?;
    let score = risk_score(&RiskInput {
        tx_type: tx_type::WITHDRAWAL,
        amount,
        balance: before.balance,
        withdrawals_last_24h: recent,
        account_age_ms: now_ms - member.created_at_ms,
        kyc_verified: member.kyc_status == kyc_status::VERIFIED,
    });
    insert_transaction(
        conn,
        NewTransaction {
            member_id: &member.id,
            tx_type: tx_type::WITHDRAWAL,
            status: TxStatus::Pending,
            amount,
            bonus_kind: None,
            counterparty_id: None,
            reference_id: None,
            description,
            before,
            after,
            risk_score: score,
        },
        now_ms,
    )
    .await
}

/// Wallet-to-wallet transfer. Writes one row per side, both completed.
pub async fn transfer(
    conn: &mut SqliteConnection,
    from: &Member,
    to_id: &str,
    amount: i64,
    description: Option<&str>,
    now_ms: i64,
) -> ApiResult<Transaction> {
    require_positive(amount)?;
    if from.id == to_id {
        return Err(ApiError::bad_request("Cannot transfer to yourself"));
    }
    let to = require_member(conn, to_id).await?;

    let (from_before, from_after) = move_balance(conn, &from.id, -amount, now_ms).await?;
    let (to_before, to_after) = move_balance(conn, &to.id, amount, now_ms).await?;

    let sent = insert_transaction(
        conn,
        NewTransaction {
            member_id: &from.id,
            tx_type: tx_type::TRANSFER,
            status: TxStatus::Completed,
            amount,
            bonus_kind: None,
            counterparty_id: Some(&to.id),
            reference_id: None,
            description,
            before: from_before,
            after: from_after,
            risk_score: 0,
        },
        now_ms,
    )
    .await?;
    insert_transaction(
        conn,
        NewTransaction {
            member_id: &to.id,
            tx_type: tx_type::TRANSFER,
            status: TxStatus::Completed,
            amount,
            bonus_kind: None,
            counterparty_id: Some(&from.id),
            reference_id: Some(&sent.id),
            description,
            before: to_before,
            after: to_after,
            risk_score: 0,
        },
        now_ms,
    )
    .await?;
    Ok(sent)
}

/// Debits a wallet purchase
pub async fn debit_purchase(
    conn: &mut SqliteConnection,
    member_id: &str,
    amount: i64,
    purchase_id: &str,
    description: &str,
    now_ms: i64,
) -> ApiResult<Transaction> {
    require_positive(amount)?;
    let (before, after) = move_balance(conn, member_id, -amount, now_ms).await?;
    insert_transaction(
        conn,
        NewTransaction {
            member_id,
            tx_type: tx_type::PURCHASE,
            status: TxStatus::Completed,
            amount,
            bonus_kind: None,
            counterparty_id: None,
            reference_id: Some(purchase_id),
            description: Some(description),
            before,
            after,
            risk_score: 0,
        },
        now_ms,
    )
    .await
}

/// Admin refund (credit) or penalty (debit). Completed immediately.
pub async fn adjust(
    conn: &mut SqliteConnection,
    member_id: &str,
    kind: &str,
    amount: i64,
    description: Option<&str>,
    admin_id: &str,
    now_ms: i64,
) -> ApiResult<Transaction> {
    require_positive(amount)?;
    let (kind, delta) = match kind {
        tx_type::REFUND => (tx_type::REFUND, amount),
        tx_type::PENALTY => (tx_type::PENALTY, -amount),
        other => {
            return Err(ApiError::bad_request(format!(
                "Adjustment kind must be refund or penalty, got {}",
                other
            )))
        }
    };
    let (before, after) = move_balance(conn, member_id, delta, now_ms).await?;
    insert_transaction(
        conn,
        NewTransaction {
            member_id,
            tx_type: kind,
            status: TxStatus::Completed,
            amount,
            bonus_kind: None,
            counterparty_id: Some(admin_id),
            reference_id: None,
            description,
            before,
            after,
            risk_score: 0,
        },
        now_ms,
    )
    .await
}

/// Moves a transaction to `next`, applying the balance side effect:
/// completed deposits credit the wallet, failed/cancelled withdrawals refund
/// the held amount.
pub async fn transition(
    conn: &mut SqliteConnection,
    tx_id: &str,
    next: TxStatus,
    now_ms: i64,
) -> ApiResult<Transaction> {
    let tx = require_transaction(conn, tx_id).await?;
    let current: TxStatus = tx.status.parse()?;
    if !current.can_transition_to(next) {
        return Err(ApiError::conflict(format!(
            "Cannot move transaction from {} to {}",
            current, next
        )));
    }

    let balance_delta = match (tx.tx_type.as_str(), next) {
        (tx_type::DEPOSIT, TxStatus::Completed) => tx.amount,
        (tx_type::WITHDRAWAL, TxStatus::Failed | TxStatus::Cancelled) => tx.amount,
        _ => 0,
    };
    let after = if balance_delta != 0 {
        let (_, after) = move_balance(conn, &tx.member_id, balance_delta, now_ms).await?;
        Some(snapshot_json(&after))
    } else {
        None
    };

    sqlx::query(r#"
        UPDATE transactions SET
            status = ?,
            balances_after = COALESCE(?, balances_after),
            processed_at_ms = COALESCE(processed_at_ms, ?),
            completed_at_ms = CASE WHEN ? = 'completed' THEN ? ELSE completed_at_ms END
        WHERE id = ?
    "#)
    .bind(next.as_str())
    .bind(after)
    .bind(now_ms)
    .bind(next.as_str())
    .bind(now_ms)
    .bind(tx_id)
    .execute(&mut *conn)
    .await?;

    info!("Transaction {}: {} -> {}", tx_id, current, next);
    require_transaction(conn, tx_id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory_db;
    use crate::engine::{distribute, CommissionEvent, Participant, PayoutContext};
    use crate::engine::plan::career_level_by_name;
    use crate::store::test_support::{member, reload};

    const NOW: i64 = 1_760_000_000_000;

    #[test]
    fn test_state_machine() {
        use TxStatus::*;
        assert!(Pending.can_transition_to(Processing));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Processing.can_transition_to(Completed));
        assert!(!Processing.can_transition_to(Cancelled));
        for terminal in [Completed, Failed, Cancelled] {
            assert!(terminal.is_terminal());
            for next in [Pending, Processing, Completed, Failed, Cancelled] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[tokio::test]
    async fn test_credit_keeps_total_equal_to_bonus_sum() {
        let pool = init_memory_db().await.unwrap();
        let m = member(&pool, "Earner One", None).await;
        let mut conn = pool.acquire().await.unwrap();
        credit_earning(&mut conn, &m.id, BonusKind::Sponsor, 4_485, None, "t", NOW).await.unwrap();
        credit_earning(&mut conn, &m.id, BonusKind::Passive, 15, None, "t", NOW).await.unwrap();
        let tx = credit_earning(&mut conn, &m.id, BonusKind::Leadership, 100, None, "t", NOW)
            .await
            .unwrap();
        drop(conn);

        let wallet = reload(&pool, &m).await.wallet();
        assert!(wallet.earnings_consistent());
        assert_eq!(wallet.balance, 4_600);
        assert_eq!(wallet.total_earnings, 4_600);
        assert_eq!(tx.bonus_kind.as_deref(), Some("leadership"));
        assert_eq!(tx.status, "completed");
    }

    #[tokio::test]
    async fn test_oversized_amounts_are_rejected() {
        let pool = init_memory_db().await.unwrap();
        let m = member(&pool, "Whale One", None).await;
        let mut conn = pool.acquire().await.unwrap();
        adjust(&mut conn, &m.id, "refund", 1, None, "admin", NOW).await.unwrap();
        let m = require_member(&mut conn, &m.id).await.unwrap();

        let huge = create_deposit(&mut conn, &m, i64::MAX, None, NOW).await;
        assert!(matches!(huge, Err(ApiError::BadRequest(_))));
        let huge = adjust(&mut conn, &m.id, "refund", MAX_TX_AMOUNT + 1, None, "admin", NOW).await;
        assert!(matches!(huge, Err(ApiError::BadRequest(_))));

        // a deposit at the cap still completes without wrapping
        let d = create_deposit(&mut conn, &m, MAX_TX_AMOUNT, None, NOW).await.unwrap();
        transition(&mut conn, &d.id, TxStatus::Completed, NOW).await.unwrap();
        assert_eq!(require_member(&mut conn, &m.id).await.unwrap().balance, MAX_TX_AMOUNT + 1);

        sqlx::query("UPDATE members SET balance = ? WHERE id = ?")
            .bind(i64::MAX - 10)
            .bind(&m.id)
            .execute(&mut *conn)
            .await
            .unwrap();
        let credit = credit_earning(&mut conn, &m.id, BonusKind::Sponsor, 100, None, "t", NOW).await;
        assert!(matches!(credit, Err(ApiError::BadRequest(_))));
        assert_eq!(require_member(&mut conn, &m.id).await.unwrap().balance, i64::MAX - 10);
    }

    #[tokio::test]
    async fn test_apply_distribution_credits_each_payout() {
        let pool = init_memory_db().await.unwrap();
        let sponsor = member(&pool, "Dist Sponsor", None).await;
        let ctx = PayoutContext {
            buyer_id: Some("buyer".into()),
            sponsor_chain: vec![Participant {
                id: sponsor.id.clone(),
                earning: true,
                level: career_level_by_name("Bronze"),
            }],
            monoline_predecessors: vec![],
        };
        let d = distribute(29_900, CommissionEvent::Purchase, &ctx);
        let mut conn = pool.acquire().await.unwrap();
        let total = apply_distribution(&mut conn, &d, "purchase-1", NOW).await.unwrap();
        drop(conn);
        assert_eq!(total, 5_980);
        let wallet = reload(&pool, &sponsor).await.wallet();
        assert_eq!(wallet.sponsor_bonus, 4_485);
        assert_eq!(wallet.career_bonus, 1_495);
        assert!(wallet.earnings_consistent());
    }

    #[tokio::test]
    async fn test_withdrawal_hold_and_cancel_refund() {
        let pool = init_memory_db().await.unwrap();
        let m = member(&pool, "Withdrawer", None).await;
        let mut conn = pool.acquire().await.unwrap();
        adjust(&mut conn, &m.id, "refund", 10_000, None, "admin", NOW).await.unwrap();
        let m = require_member(&mut conn, &m.id).await.unwrap();

        let over = create_withdrawal(&mut conn, &m, 20_000, None, NOW).await;
        assert!(matches!(over, Err(ApiError::BadRequest(_))));

        let w = create_withdrawal(&mut conn, &m, 4_000, None, NOW).await.unwrap();
        assert_eq!(w.status, "pending");
        assert_eq!(require_member(&mut conn, &m.id).await.unwrap().balance, 6_000);

        let cancelled = transition(&mut conn, &w.id, TxStatus::Cancelled, NOW).await.unwrap();
        assert_eq!(cancelled.status, "cancelled");
        assert_eq!(require_member(&mut conn, &m.id).await.unwrap().balance, 10_000);

        // terminal: no second refund
        let again = transition(&mut conn, &w.id, TxStatus::Failed, NOW).await;
        assert!(matches!(again, Err(ApiError::Conflict(_))));
        assert_eq!(require_member(&mut conn, &m.id).await.unwrap().balance, 10_000);
    }

    #[tokio::test]
    async fn test_deposit_credits_on_completion_only() {
        let pool = init_memory_db().await.unwrap();
        let m = member(&pool, "Depositor", None).await;
        let mut conn = pool.acquire().await.unwrap();
        let d = create_deposit(&mut conn, &m, 2_500, Some("bank"), NOW).await.unwrap();
        assert_eq!(require_member(&mut conn, &m.id).await.unwrap().balance, 0);

        transition(&mut conn, &d.id, TxStatus::Processing, NOW).await.unwrap();
        let done = transition(&mut conn, &d.id, TxStatus::Completed, NOW).await.unwrap();
        assert_eq!(done.completed_at_ms, Some(NOW));
        assert_eq!(require_member(&mut conn, &m.id).await.unwrap().balance, 2_500);
    }

    #[tokio::test]
    async fn test_transfer_and_penalty_bounds() {
        let pool = init_memory_db().await.unwrap();
        let a = member(&pool, "Sender Person", None).await;
        let b = member(&pool, "Receiver Person", None).await;
        let mut conn = pool.acquire().await.unwrap();
        adjust(&mut conn, &a.id, "refund", 1_000, None, "admin", NOW).await.unwrap();
        let a = require_member(&mut conn, &a.id).await.unwrap();

        transfer(&mut conn, &a, &b.id, 400, None, NOW).await.unwrap();
        assert_eq!(require_member(&mut conn, &a.id).await.unwrap().balance, 600);
        assert_eq!(require_member(&mut conn, &b.id).await.unwrap().balance, 400);

        assert!(transfer(&mut conn, &a, &a.id, 1, None, NOW).await.is_err());
        let penalty = adjust(&mut conn, &b.id, "penalty", 500, None, "admin", NOW).await;
        assert!(matches!(penalty, Err(ApiError::BadRequest(_))));
        assert!(adjust(&mut conn, &b.id, "bonus", 5, None, "admin", NOW).await.is_err());
    }
}
