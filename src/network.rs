//! Network operations
//! Activation, placement bonuses and sponsor-tree edits. Each function runs on
//! a caller-provided connection; handlers wrap them in one SQL transaction.

use serde::Serialize;
use sqlx::SqliteConnection;
use tracing::info;

use crate::engine::membership::renew_until;
use crate::engine::placement::{next_monoline_position, validate_move};
use crate::engine::{distribute, CommissionEvent, Distribution, MembershipType};
use crate::error::{ApiError, ApiResult};
use crate::ledger::apply_distribution;
use crate::models::Member;
use crate::store::{
    ancestor_ids, max_monoline_position, payout_context, recompute_sponsor_levels,
    refresh_career_levels, require_member, sponsor_chain,
};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivationOutcome {
    pub member_id: String,
    pub monoline_position: i64,
    pub active_until: i64,
    /// None when the placement bonus had already been paid earlier
    pub distribution: Option<Distribution>,
    pub career_changes: usize,
}

/// A concurrent activation took the same position first
fn placement_conflict(err: sqlx::Error) -> ApiError {
    let taken = err
        .as_database_error()
        .map_or(false, |db| db.is_unique_violation());
    if taken {
        ApiError::conflict("Monoline position was just taken, retry the activation")
    } else {
        ApiError::from(err)
    }
}

/// Activates or renews a membership.
///
/// First activation assigns the next monoline position. The activation
/// distribution is paid at most once per member (`placement_bonus_paid`).
pub async fn activate_member(
    conn: &mut SqliteConnection,
    member_id: &str,
    membership: MembershipType,
    now_ms: i64,
) -> ApiResult<ActivationOutcome> {
    let member = require_member(conn, member_id).await?;

    let position = match member.monoline_position {
        Some(position) => position,
        None => next_monoline_position(max_monoline_position(conn).await?),
    };
    let active_until = renew_until(member.active_until_ms, now_ms, membership);

    sqlx::query(r#"
        UPDATE members SET
            is_active = 1,
            active_until_ms = ?,
            membership_type = ?,
            monoline_position = ?,
            updated_at_ms = ?
        WHERE id = ?
    "#)
    .bind(active_until)
    .bind(membership.as_str())
    .bind(position)
    .bind(now_ms)
    .bind(&member.id)
    .execute(&mut *conn)
    .await
    .map_err(placement_conflict)?;

    let member = require_member(conn, &member.id).await?;
    let distribution = if member.placement_bonus_paid {
        None
    } else {
        Some(pay_activation(conn, &member, membership.price(), now_ms).await?)
    };

    let upline = sponsor_chain(conn, &member, usize::MAX).await?;
    let career_changes = refresh_career_levels(conn, &upline, now_ms).await?;

    info!(
        "Member activated: {} position={} until={} type={}",
        member.member_id,
        position,
        active_until,
        membership.as_str()
    );

    Ok(ActivationOutcome {
        member_id: member.id,
        monoline_position: position,
        active_until,
        distribution,
        career_changes,
    })
}

/// Pays the activation distribution for a member whose placement bonus is
/// still outstanding. A second call is a conflict.
pub async fn pay_placement_bonus(
    conn: &mut SqliteConnection,
    member_id: &str,
    now_ms: i64,
) -> ApiResult<Distribution> {
    let member = require_member(conn, member_id).await?;
    if member.placement_bonus_paid {
        return Err(ApiError::conflict("Placement bonus already paid"));
    }
    if !member.is_earning(now_ms) {
        return Err(ApiError::bad_request("Member is not active"));
    }
    let price = member
        .membership_type
        .parse::<MembershipType>()
        .unwrap_or(MembershipType::Entry)
        .price();
    pay_activation(conn, &member, price, now_ms).await
}

async fn pay_activation(
    conn: &mut SqliteConnection,
    member: &Member,
    amount: i64,
    now_ms: i64,
) -> ApiResult<Distribution> {
    // the flag flips first so a concurrent caller loses the race cleanly
    let flipped = sqlx::query(
        "UPDATE members SET placement_bonus_paid = 1 WHERE id = ? AND placement_bonus_paid = 0",
    )
    .bind(&member.id)
    .execute(&mut *conn)
    .await?;
    if flipped.rows_affected() == 0 {
        return Err(ApiError::conflict("Placement bonus already paid"));
    }

    let ctx = payout_context(conn, member, true, now_ms).await?;
    let distribution = distribute(amount, CommissionEvent::Activation, &ctx);
    apply_distribution(conn, &distribution, &member.id, now_ms).await?;
    Ok(distribution)
}

/// Re-parents `member_id` under `new_sponsor_id`.
pub async fn move_member(
    conn: &mut SqliteConnection,
    member_id: &str,
    new_sponsor_id: &str,
    now_ms: i64,
) -> ApiResult<Member> {
    let member = require_member(conn, member_id).await?;
    let new_sponsor = require_member(conn, new_sponsor_id).await?;
    let ancestors = ancestor_ids(conn, &new_sponsor).await?;
    validate_move(&member.id, &new_sponsor.id, &ancestors)
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    sqlx::query("UPDATE members SET sponsor_id = ?, updated_at_ms = ? WHERE id = ?")
        .bind(&new_sponsor.id)
        .bind(now_ms)
        .bind(&member.id)
        .execute(&mut *conn)
        .await?;

    let moved = require_member(conn, &member.id).await?;
    recompute_sponsor_levels(conn, &moved).await?;

    let mut upline = sponsor_chain(conn, &moved, usize::MAX).await?;
    upline.insert(0, moved.clone());
    refresh_career_levels(conn, &upline, now_ms).await?;

    info!(
        "Member moved: {} -> sponsor {}",
        moved.member_id, new_sponsor.member_id
    );
    require_member(conn, &member.id).await
}

/// Logical delete. Direct referrals move up to the deleted member's sponsor
/// and the member's sessions are dropped. Returns the number re-parented.
pub async fn delete_member(
    conn: &mut SqliteConnection,
    member_id: &str,
    now_ms: i64,
) -> ApiResult<usize> {
    let member = require_member(conn, member_id).await?;

    let children: Vec<Member> =
        sqlx::query_as("SELECT * FROM members WHERE sponsor_id = ? AND is_deleted = 0")
            .bind(&member.id)
            .fetch_all(&mut *conn)
            .await?;

    sqlx::query("UPDATE members SET sponsor_id = ?, updated_at_ms = ? WHERE sponsor_id = ?")
        .bind(&member.sponsor_id)
        .bind(now_ms)
        .bind(&member.id)
        .execute(&mut *conn)
        .await?;

    for child in &children {
        let child = require_member(conn, &child.id).await?;
        recompute_sponsor_levels(conn, &child).await?;
    }

    sqlx::query(
        "UPDATE members SET is_deleted = 1, is_active = 0, sponsor_id = NULL, updated_at_ms = ? WHERE id = ?",
    )
    .bind(now_ms)
    .bind(&member.id)
    .execute(&mut *conn)
    .await?;
    sqlx::query("DELETE FROM sessions WHERE member_id = ?")
        .bind(&member.id)
        .execute(&mut *conn)
        .await?;

    info!(
        "Member deleted: {} ({} referrals re-parented)",
        member.member_id,
        children.len()
    );
    Ok(children.len())
}
