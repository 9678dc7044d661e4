//! Store
//! Member lookups, sponsor tree / monoline queries and the admin audit log

use rand::Rng;
use serde::Serialize;
use sqlx::SqliteConnection;
use std::collections::HashSet;

use crate::engine::placement::network_depth;
use crate::engine::plan::{career_level_by_name, promote, MAX_LEVELS};
use crate::engine::{Participant, PayoutContext};
use crate::error::{ApiError, ApiResult};
use crate::models::{ClonePage, Member, MonolineStats};

// ========================================
// ID generation
// ========================================

fn random_code() -> String {
    let random_bytes: [u8; 5] = rand::thread_rng().gen();
    let encoded = base32::encode(base32::Alphabet::Crockford, &random_bytes);
    encoded.chars().take(8).collect()
}

/// Human-facing member number, e.g. `MB7K2QH9XA`
pub fn generate_member_id() -> String {
    format!("MB{}", random_code())
}

pub fn generate_referral_code() -> String {
    random_code()
}

// ========================================
// Members
// ========================================

pub async fn get_member(conn: &mut SqliteConnection, id: &str) -> ApiResult<Option<Member>> {
    let member = sqlx::query_as("SELECT * FROM members WHERE id = ? AND is_deleted = 0")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(member)
}

pub async fn require_member(conn: &mut SqliteConnection, id: &str) -> ApiResult<Member> {
    get_member(conn, id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Member not found: {}", id)))
}

pub async fn find_by_referral_code(
    conn: &mut SqliteConnection,
    code: &str,
) -> ApiResult<Option<Member>> {
    let member = sqlx::query_as(
        "SELECT * FROM members WHERE referral_code = ? COLLATE NOCASE AND is_deleted = 0",
    )
    .bind(code.trim())
    .fetch_optional(&mut *conn)
    .await?;
    Ok(member)
}

/// Login accepts either the email address or the member number
pub async fn find_by_login(
    conn: &mut SqliteConnection,
    identifier: &str,
) -> ApiResult<Option<Member>> {
    let identifier = identifier.trim();
    let member = sqlx::query_as(
        "SELECT * FROM members WHERE (email = ? OR member_id = ? COLLATE NOCASE) AND is_deleted = 0",
    )
    .bind(identifier.to_lowercase())
    .bind(identifier)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(member)
}

pub struct NewMember<'a> {
    pub full_name: &'a str,
    pub email: &'a str,
    pub phone: &'a str,
    pub password_hash: &'a str,
    pub role: &'a str,
    pub sponsor: Option<&'a Member>,
    pub membership_type: &'a str,
}

/// Inserts the member and its clone page. Email/phone uniqueness is
/// reported as 409 instead of a raw constraint error.
///
/// Logically deleted members keep their email and phone reserved.
pub async fn insert_member(
    conn: &mut SqliteConnection,
    new: NewMember<'_>,
    now_ms: i64,
) -> ApiResult<Member> {
    let email = new.email.trim().to_lowercase();
    let phone = new.phone.trim();

    let taken: Option<(String,)> =
        sqlx::query_as("SELECT id FROM members WHERE email = ? OR phone = ?")
            .bind(&email)
            .bind(phone)
            .fetch_optional(&mut *conn)
            .await?;
    if taken.is_some() {
        return Err(ApiError::conflict("Email or phone already registered"));
    }

    let id = uuid::Uuid::new_v4().to_string();
    let member_id = generate_member_id();
    let referral_code = generate_referral_code();
    let sponsor_level = new.sponsor.map_or(0, |s| s.sponsor_level + 1);

    sqlx::query(r#"
        INSERT INTO members (
            id, member_id, referral_code, full_name, email, phone, password_hash,
            role, sponsor_id, sponsor_level, membership_type,
            created_at_ms, updated_at_ms
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
    "#)
    .bind(&id)
    .bind(&member_id)
    .bind(&referral_code)
    .bind(new.full_name.trim())
    .bind(&email)
    .bind(phone)
    .bind(new.password_hash)
    .bind(new.role)
    .bind(new.sponsor.map(|s| s.id.as_str()))
    .bind(sponsor_level)
    .bind(new.membership_type)
    .bind(now_ms)
    .bind(now_ms)
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        "INSERT INTO clone_pages (member_id, slug, updated_at_ms) VALUES (?, ?, ?)",
    )
    .bind(&id)
    .bind(referral_code.to_lowercase())
    .bind(now_ms)
    .execute(&mut *conn)
    .await?;

    require_member(conn, &id).await
}

// ========================================
// Sponsor tree / monoline
// ========================================

/// Ancestors of `member`, nearest first, at most `limit`
pub async fn sponsor_chain(
    conn: &mut SqliteConnection,
    member: &Member,
    limit: usize,
) -> ApiResult<Vec<Member>> {
    let mut chain = Vec::new();
    let mut seen = HashSet::from([member.id.clone()]);
    let mut next = member.sponsor_id.clone();

    while let Some(sponsor_id) = next {
        if chain.len() >= limit || !seen.insert(sponsor_id.clone()) {
            break;
        }
        match get_member(conn, &sponsor_id).await? {
            Some(sponsor) => {
                next = sponsor.sponsor_id.clone();
                chain.push(sponsor);
            }
            None => break,
        }
    }
    Ok(chain)
}

/// Ids of every ancestor (unbounded), nearest first
pub async fn ancestor_ids(conn: &mut SqliteConnection, member: &Member) -> ApiResult<Vec<String>> {
    let chain = sponsor_chain(conn, member, usize::MAX).await?;
    Ok(chain.into_iter().map(|m| m.id).collect())
}

/// Members placed before `position` in the line, nearest first.
/// Unplaced members sit behind the whole line.
pub async fn monoline_predecessors(
    conn: &mut SqliteConnection,
    position: Option<i64>,
    limit: usize,
) -> ApiResult<Vec<Member>> {
    let members = sqlx::query_as(r#"
        SELECT * FROM members
        WHERE monoline_position IS NOT NULL AND monoline_position < ? AND is_deleted = 0
        ORDER BY monoline_position DESC
        LIMIT ?
    "#)
    .bind(position.unwrap_or(i64::MAX))
    .bind(limit as i64)
    .fetch_all(&mut *conn)
    .await?;
    Ok(members)
}

pub async fn max_monoline_position(conn: &mut SqliteConnection) -> ApiResult<Option<i64>> {
    let max: Option<i64> = sqlx::query_scalar("SELECT MAX(monoline_position) FROM members")
        .fetch_one(&mut *conn)
        .await?;
    Ok(max)
}

pub fn to_participant(member: &Member, now_ms: i64) -> Participant {
    Participant {
        id: member.id.clone(),
        earning: member.is_earning(now_ms),
        level: career_level_by_name(&member.career_level),
    }
}

/// Surroundings of an event anchored on `anchor`.
///
/// `anchor_is_buyer`: the anchor generated the event itself (own purchase or
/// activation), so payouts start at its sponsor. Otherwise the anchor is the
/// referrer of a visitor and takes the direct-sponsor slot.
pub async fn payout_context(
    conn: &mut SqliteConnection,
    anchor: &Member,
    anchor_is_buyer: bool,
    now_ms: i64,
) -> ApiResult<PayoutContext> {
    let mut sponsors = Vec::new();
    if !anchor_is_buyer {
        sponsors.push(to_participant(anchor, now_ms));
    }
    let chain = sponsor_chain(conn, anchor, MAX_LEVELS - sponsors.len()).await?;
    sponsors.extend(chain.iter().map(|m| to_participant(m, now_ms)));

    let predecessors = monoline_predecessors(conn, anchor.monoline_position, MAX_LEVELS).await?;

    Ok(PayoutContext {
        buyer_id: anchor_is_buyer.then(|| anchor.id.clone()),
        sponsor_chain: sponsors,
        monoline_predecessors: predecessors
            .iter()
            .map(|m| to_participant(m, now_ms))
            .collect(),
    })
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TeamMember {
    pub depth: i64,
    pub id: String,
    pub member_id: String,
    pub full_name: String,
    pub sponsor_id: Option<String>,
    pub is_active: bool,
    pub career_level: String,
    pub monoline_position: Option<i64>,
    #[serde(rename = "joinedAt")]
    pub created_at_ms: i64,
}

/// Downline up to `max_depth` levels, level by level
pub async fn team(
    conn: &mut SqliteConnection,
    root_id: &str,
    max_depth: i64,
) -> ApiResult<Vec<TeamMember>> {
    let rows = sqlx::query_as(r#"
        WITH RECURSIVE team(id, depth) AS (
            SELECT id, 1 FROM members WHERE sponsor_id = ? AND is_deleted = 0
            UNION ALL
            SELECT m.id, team.depth + 1 FROM members m
            JOIN team ON m.sponsor_id = team.id
            WHERE m.is_deleted = 0 AND team.depth < ?
        )
        SELECT team.depth AS depth, m.id, m.member_id, m.full_name, m.sponsor_id,
               m.is_active, m.career_level, m.monoline_position, m.created_at_ms
        FROM team JOIN members m ON m.id = team.id
        ORDER BY team.depth, m.created_at_ms
    "#)
    .bind(root_id)
    .bind(max_depth)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TeamSize {
    pub direct: i64,
    pub active_direct: i64,
    pub total: i64,
    pub deepest_level: i64,
}

pub async fn team_size(
    conn: &mut SqliteConnection,
    root_id: &str,
    now_ms: i64,
) -> ApiResult<TeamSize> {
    let (direct, active_direct): (i64, i64) = sqlx::query_as(r#"
        SELECT COUNT(*),
               COALESCE(SUM(CASE WHEN is_active = 1 AND active_until_ms > ? THEN 1 ELSE 0 END), 0)
        FROM members WHERE sponsor_id = ? AND is_deleted = 0
    "#)
    .bind(now_ms)
    .bind(root_id)
    .fetch_one(&mut *conn)
    .await?;

    let (total, deepest_level): (i64, i64) = sqlx::query_as(r#"
        WITH RECURSIVE team(id, depth) AS (
            SELECT id, 1 FROM members WHERE sponsor_id = ? AND is_deleted = 0
            UNION ALL
            SELECT m.id, team.depth + 1 FROM members m
            JOIN team ON m.sponsor_id = team.id
            WHERE m.is_deleted = 0
        )
        SELECT COUNT(*), COALESCE(MAX(depth), 0) FROM team
    "#)
    .bind(root_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(TeamSize {
        direct,
        active_direct,
        total,
        deepest_level,
    })
}

/// Re-evaluates career levels for the given members (promotion only).
/// Returns how many changed.
pub async fn refresh_career_levels(
    conn: &mut SqliteConnection,
    members: &[Member],
    now_ms: i64,
) -> ApiResult<usize> {
    let mut changed = 0;
    for member in members {
        let size = team_size(conn, &member.id, now_ms).await?;
        let current = career_level_by_name(&member.career_level);
        let next = promote(current, size.active_direct, size.total);
        if next.rank != current.rank {
            sqlx::query("UPDATE members SET career_level = ?, updated_at_ms = ? WHERE id = ?")
                .bind(next.name)
                .bind(now_ms)
                .bind(&member.id)
                .execute(&mut *conn)
                .await?;
            tracing::info!(
                "Career level changed: member={}, {} -> {}",
                member.member_id, current.name, next.name
            );
            changed += 1;
        }
    }
    Ok(changed)
}

/// Rewrites sponsor_level for a member and its whole downline
pub async fn recompute_sponsor_levels(
    conn: &mut SqliteConnection,
    root: &Member,
) -> ApiResult<()> {
    let root_level = match &root.sponsor_id {
        Some(sponsor_id) => require_member(conn, sponsor_id).await?.sponsor_level + 1,
        None => 0,
    };
    sqlx::query(r#"
        WITH RECURSIVE sub(id, depth) AS (
            SELECT ?, 0
            UNION ALL
            SELECT m.id, sub.depth + 1 FROM members m JOIN sub ON m.sponsor_id = sub.id
        )
        UPDATE members SET sponsor_level = ? + (SELECT depth FROM sub WHERE sub.id = members.id)
        WHERE id IN (SELECT id FROM sub)
    "#)
    .bind(&root.id)
    .bind(root_level)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn monoline_stats(
    conn: &mut SqliteConnection,
    member: &Member,
    now_ms: i64,
) -> ApiResult<MonolineStats> {
    let size = team_size(conn, &member.id, now_ms).await?;
    let (ahead, behind): (i64, i64) = sqlx::query_as(r#"
        SELECT
            COALESCE(SUM(CASE WHEN monoline_position < ?1 THEN 1 ELSE 0 END), 0),
            COALESCE(SUM(CASE WHEN monoline_position > ?1 THEN 1 ELSE 0 END), 0)
        FROM members
        WHERE monoline_position IS NOT NULL AND is_deleted = 0
    "#)
    .bind(member.monoline_position.unwrap_or(i64::MAX))
    .fetch_one(&mut *conn)
    .await?;

    Ok(MonolineStats {
        user_id: member.id.clone(),
        monoline_position: member.monoline_position,
        network_depth: network_depth(size.deepest_level),
        direct_referrals: size.direct,
        total_team_size: size.total,
        members_ahead: ahead,
        members_behind: behind,
        career_level: member.career().into(),
        is_active: member.is_earning(now_ms),
        active_until: member.active_until_ms,
    })
}

/// Looks a member up by internal id or member number
pub async fn resolve_member(conn: &mut SqliteConnection, key: &str) -> ApiResult<Member> {
    let key = key.trim();
    sqlx::query_as(
        "SELECT * FROM members WHERE (id = ? OR member_id = ? COLLATE NOCASE) AND is_deleted = 0",
    )
    .bind(key)
    .bind(key)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| ApiError::not_found(format!("Member not found: {}", key)))
}

// ========================================
// Clone pages
// ========================================

pub async fn clone_page_for(
    conn: &mut SqliteConnection,
    member_id: &str,
) -> ApiResult<Option<ClonePage>> {
    let page = sqlx::query_as("SELECT * FROM clone_pages WHERE member_id = ?")
        .bind(member_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(page)
}

// ========================================
// Admin audit log
// ========================================

pub async fn log_admin(
    conn: &mut SqliteConnection,
    admin_id: &str,
    action: &str,
    target_user_id: Option<&str>,
    details: serde_json::Value,
    now_ms: i64,
) -> ApiResult<()> {
    sqlx::query(
        "INSERT INTO admin_logs (admin_id, action, target_user_id, details, timestamp_ms) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(admin_id)
    .bind(action)
    .bind(target_user_id)
    .bind(details.to_string())
    .bind(now_ms)
    .execute(&mut *conn)
    .await?;
    Ok(())
}
