//! Member API Handlers
//! /api/user/:id endpoints: profile, dashboard, team, payment accounts, training progress

use axum::{
    extract::{Path, State},
    response::Json,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

use crate::auth::{ensure_self_or_admin, AuthUser};
use crate::engine::membership::remaining_days;
use crate::engine::plan::CAREER_LEVELS;
use crate::engine::MAX_LEVELS;
use crate::error::{ApiError, ApiResult};
use crate::models::{
    CareerLevelResponse, ClonePageStats, MemberResponse, MonolineStats, PaymentAccounts,
    TrainingProgress, TrainingProgressRequest, Transaction, TransactionResponse,
    UpdateProfileRequest, WalletSnapshot,
};
use crate::store::{
    clone_page_for, monoline_stats, require_member, team as downline, team_size, TeamMember,
};
use crate::AppState;

use super::now_ms;

const RECENT_TRANSACTIONS: i64 = 10;

// ========================================
// Response Types
// ========================================

#[derive(Serialize)]
pub struct ProfileResponse {
    pub success: bool,
    pub member: MemberResponse,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamSummary {
    pub direct_referrals: i64,
    pub active_direct_referrals: i64,
    pub total_team_size: i64,
    pub deepest_level: i64,
}

/// Everything the member dashboard shows, in one response
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardResponse {
    pub success: bool,
    pub profile: MemberResponse,
    pub wallet: WalletSnapshot,
    pub career_level: CareerLevelResponse,
    pub next_career_level: Option<CareerLevelResponse>,
    pub monoline: MonolineStats,
    pub remaining_days: i64,
    pub recent_transactions: Vec<TransactionResponse>,
    pub team: TeamSummary,
    pub clone_page: Option<ClonePageStats>,
}

#[derive(Serialize)]
pub struct TeamLevel {
    pub level: i64,
    pub count: usize,
    pub members: Vec<TeamMember>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamResponse {
    pub success: bool,
    pub direct_referrals: usize,
    pub total: usize,
    pub levels: Vec<TeamLevel>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentAccountsResponse {
    pub success: bool,
    pub payment_accounts: PaymentAccounts,
}

#[derive(Serialize)]
pub struct TrainingProgressResponse {
    pub success: bool,
    pub modules: Vec<TrainingProgress>,
}

// ========================================
// Validation
// ========================================

fn normalize(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.chars().filter(|c| !c.is_whitespace()).collect::<String>().to_uppercase())
        .filter(|v| !v.is_empty())
}

/// Shape check: country code, check digits, 11..=30 alphanumerics
pub fn is_valid_iban(iban: &str) -> bool {
    let bytes = iban.as_bytes();
    (15..=34).contains(&bytes.len())
        && bytes[..2].iter().all(u8::is_ascii_uppercase)
        && bytes[2..4].iter().all(u8::is_ascii_digit)
        && bytes.iter().all(u8::is_ascii_alphanumeric)
}

/// TRON address: 34 base58 characters starting with `T`
pub fn is_valid_trc20(address: &str) -> bool {
    address.len() == 34
        && address.starts_with('T')
        && address
            .chars()
            .all(|c| c.is_ascii_alphanumeric() && !"0OIl".contains(c))
}

fn validate_payment_accounts(mut accounts: PaymentAccounts) -> ApiResult<PaymentAccounts> {
    accounts.account_holder = accounts
        .account_holder
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty());
    accounts.try_iban = normalize(accounts.try_iban);
    accounts.usd_iban = normalize(accounts.usd_iban);
    accounts.eur_iban = normalize(accounts.eur_iban);
    accounts.usdt_trc20 = accounts
        .usdt_trc20
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty());

    for (field, iban) in [
        ("tryIban", &accounts.try_iban),
        ("usdIban", &accounts.usd_iban),
        ("eurIban", &accounts.eur_iban),
    ] {
        if let Some(iban) = iban {
            if !is_valid_iban(iban) {
                return Err(ApiError::bad_request(format!("Invalid IBAN in {}", field)));
            }
        }
    }
    if let Some(address) = &accounts.usdt_trc20 {
        if !is_valid_trc20(address) {
            return Err(ApiError::bad_request("Invalid USDT TRC20 address"));
        }
    }
    Ok(accounts)
}

// ========================================
// Handlers
// ========================================

/// GET /api/user/:id/profile - Member profile
pub async fn get_profile(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<ProfileResponse>> {
    ensure_self_or_admin(&user.member, &id)?;
    let mut conn = state.db.acquire().await?;
    let member = require_member(&mut conn, &id).await?;
    let size = team_size(&mut conn, &member.id, now_ms()).await?;
    Ok(Json(ProfileResponse {
        success: true,
        member: MemberResponse::from(&member).with_team(size.direct, size.total),
    }))
}

/// PUT /api/user/:id/profile - Update name / phone
pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(req): Json<UpdateProfileRequest>,
) -> ApiResult<Json<ProfileResponse>> {
    ensure_self_or_admin(&user.member, &id)?;
    let full_name = req.full_name.as_deref().map(str::trim);
    let phone = req.phone.as_deref().map(str::trim);
    if full_name == Some("") || phone == Some("") {
        return Err(ApiError::bad_request("Name and phone cannot be empty"));
    }

    let mut tx = state.db.begin().await?;
    let member = require_member(&mut tx, &id).await?;
    if let Some(phone) = phone {
        let taken: Option<(String,)> =
            sqlx::query_as("SELECT id FROM members WHERE phone = ? AND id != ?")
                .bind(phone)
                .bind(&member.id)
                .fetch_optional(&mut *tx)
                .await?;
        if taken.is_some() {
            return Err(ApiError::conflict("Phone already registered"));
        }
    }

    sqlx::query(r#"
        UPDATE members SET
            full_name = COALESCE(?, full_name),
            phone = COALESCE(?, phone),
            updated_at_ms = ?
        WHERE id = ?
    "#)
    .bind(full_name)
    .bind(phone)
    .bind(now_ms())
    .bind(&member.id)
    .execute(&mut *tx)
    .await?;
    let member = require_member(&mut tx, &member.id).await?;
    let size = team_size(&mut tx, &member.id, now_ms()).await?;
    tx.commit().await?;

    info!("Profile updated: {}", member.member_id);
    Ok(Json(ProfileResponse {
        success: true,
        member: MemberResponse::from(&member).with_team(size.direct, size.total),
    }))
}

/// GET /api/user/:id/dashboard - Aggregated dashboard data
pub async fn dashboard(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<DashboardResponse>> {
    ensure_self_or_admin(&user.member, &id)?;
    let now_ms = now_ms();
    let mut conn = state.db.acquire().await?;

    let member = require_member(&mut conn, &id).await?;
    let monoline = monoline_stats(&mut conn, &member, now_ms).await?;
    let size = team_size(&mut conn, &member.id, now_ms).await?;
    let recent: Vec<Transaction> = sqlx::query_as(
        "SELECT * FROM transactions WHERE member_id = ? ORDER BY seq DESC LIMIT ?",
    )
    .bind(&member.id)
    .bind(RECENT_TRANSACTIONS)
    .fetch_all(&mut *conn)
    .await?;
    let clone_page = clone_page_for(&mut conn, &member.id).await?;

    let career = member.career();
    Ok(Json(DashboardResponse {
        success: true,
        profile: MemberResponse::from(&member).with_team(size.direct, size.total),
        wallet: member.wallet(),
        career_level: career.into(),
        next_career_level: CAREER_LEVELS
            .iter()
            .find(|level| level.rank == career.rank + 1)
            .map(CareerLevelResponse::from),
        monoline,
        remaining_days: remaining_days(member.active_until_ms, now_ms),
        recent_transactions: recent.iter().map(TransactionResponse::from).collect(),
        team: TeamSummary {
            direct_referrals: size.direct,
            active_direct_referrals: size.active_direct,
            total_team_size: size.total,
            deepest_level: size.deepest_level,
        },
        clone_page: clone_page.as_ref().map(ClonePageStats::from),
    }))
}

/// GET /api/user/:id/team - Downline grouped by level (up to 7)
pub async fn team(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<TeamResponse>> {
    ensure_self_or_admin(&user.member, &id)?;
    let mut conn = state.db.acquire().await?;
    let member = require_member(&mut conn, &id).await?;
    let rows = downline(&mut conn, &member.id, MAX_LEVELS as i64).await?;

    let total = rows.len();
    let mut by_level: BTreeMap<i64, Vec<TeamMember>> = BTreeMap::new();
    for row in rows {
        by_level.entry(row.depth).or_default().push(row);
    }
    let levels: Vec<TeamLevel> = by_level
        .into_iter()
        .map(|(level, members)| TeamLevel {
            level,
            count: members.len(),
            members,
        })
        .collect();
    let direct_referrals = levels.first().filter(|l| l.level == 1).map_or(0, |l| l.count);

    Ok(Json(TeamResponse {
        success: true,
        direct_referrals,
        total,
        levels,
    }))
}

/// GET /api/user/:id/payment-accounts - Saved bank / crypto accounts
pub async fn get_payment_accounts(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<PaymentAccountsResponse>> {
    ensure_self_or_admin(&user.member, &id)?;
    let accounts: Option<PaymentAccounts> =
        sqlx::query_as("SELECT * FROM payment_accounts WHERE member_id = ?")
            .bind(&id)
            .fetch_optional(&state.db)
            .await?;

    Ok(Json(PaymentAccountsResponse {
        success: true,
        payment_accounts: accounts.unwrap_or_else(|| PaymentAccounts {
            member_id: id,
            ..PaymentAccounts::default()
        }),
    }))
}

/// PUT /api/user/:id/payment-accounts - Replace saved accounts
pub async fn update_payment_accounts(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(req): Json<PaymentAccounts>,
) -> ApiResult<Json<PaymentAccountsResponse>> {
    ensure_self_or_admin(&user.member, &id)?;
    let accounts = validate_payment_accounts(req)?;
    let now_ms = now_ms();

    let mut conn = state.db.acquire().await?;
    require_member(&mut conn, &id).await?;
    sqlx::query(r#"
        INSERT INTO payment_accounts (
            member_id, account_holder, try_iban, usd_iban, eur_iban, usdt_trc20, updated_at_ms
        ) VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(member_id) DO UPDATE SET
            account_holder = excluded.account_holder,
            try_iban = excluded.try_iban,
            usd_iban = excluded.usd_iban,
            eur_iban = excluded.eur_iban,
            usdt_trc20 = excluded.usdt_trc20,
            updated_at_ms = excluded.updated_at_ms
    "#)
    .bind(&id)
    .bind(&accounts.account_holder)
    .bind(&accounts.try_iban)
    .bind(&accounts.usd_iban)
    .bind(&accounts.eur_iban)
    .bind(&accounts.usdt_trc20)
    .bind(now_ms)
    .execute(&mut *conn)
    .await?;

    Ok(Json(PaymentAccountsResponse {
        success: true,
        payment_accounts: PaymentAccounts {
            member_id: id,
            updated_at_ms: now_ms,
            ..accounts
        },
    }))
}

/// GET /api/user/:id/training-progress - Progress per training module
pub async fn training_progress(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<TrainingProgressResponse>> {
    ensure_self_or_admin(&user.member, &id)?;
    let modules: Vec<TrainingProgress> = sqlx::query_as(
        "SELECT * FROM training_progress WHERE member_id = ? ORDER BY module_id",
    )
    .bind(&id)
    .fetch_all(&state.db)
    .await?;
    Ok(Json(TrainingProgressResponse {
        success: true,
        modules,
    }))
}

/// PUT /api/user/:id/training-progress/:moduleId - Save the current page of a module
pub async fn update_training_progress(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path((id, module_id)): Path<(String, String)>,
    Json(req): Json<TrainingProgressRequest>,
) -> ApiResult<Json<TrainingProgressResponse>> {
    ensure_self_or_admin(&user.member, &id)?;
    if req.page < 0 || module_id.trim().is_empty() {
        return Err(ApiError::bad_request("Invalid training progress"));
    }

    let mut conn = state.db.acquire().await?;
    require_member(&mut conn, &id).await?;
    // completion sticks once reached
    sqlx::query(r#"
        INSERT INTO training_progress (member_id, module_id, page, completed, updated_at_ms)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(member_id, module_id) DO UPDATE SET
            page = excluded.page,
            completed = MAX(completed, excluded.completed),
            updated_at_ms = excluded.updated_at_ms
    "#)
    .bind(&id)
    .bind(module_id.trim())
    .bind(req.page)
    .bind(req.completed)
    .bind(now_ms())
    .execute(&mut *conn)
    .await?;

    let modules: Vec<TrainingProgress> = sqlx::query_as(
        "SELECT * FROM training_progress WHERE member_id = ? ORDER BY module_id",
    )
    .bind(&id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(Json(TrainingProgressResponse {
        success: true,
        modules,
    }))
}
