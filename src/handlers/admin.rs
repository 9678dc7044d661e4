//! Admin API Handlers
//! /api/auth/admin endpoints: member management, ledger moderation, audit log, stats
//!
//! Every mutation writes an admin_logs row in the same SQL transaction.

use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::auth::{hash_password_blocking, AdminUser};
use crate::engine::{Distribution, MembershipType};
use crate::error::{ApiError, ApiResult};
use crate::ledger::{self, TxStatus};
use crate::models::{
    kyc_status, page_window, purchase_status, role, AdjustmentRequest, AdminCreateUserRequest,
    AdminLog, AdminUpdateUserRequest, ListTransactionsQuery, ListUsersQuery, Member,
    MemberResponse, MoveUserRequest, Paginated, ProductPurchase, TransactionResponse,
    UpdateTxStatusRequest,
};
use crate::network::{delete_member, move_member};
use crate::purchases::complete_purchase;
use crate::store::{insert_member, log_admin, require_member, resolve_member, NewMember};
use crate::AppState;

use super::now_ms;
use super::transactions::list_transactions as query_transactions;

// ========================================
// Response Types
// ========================================

#[derive(Serialize)]
pub struct UserDetailResponse {
    pub success: bool,
    pub member: MemberResponse,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteUserResponse {
    pub success: bool,
    pub reparented_referrals: usize,
}

#[derive(Serialize)]
pub struct TransactionStatusResponse {
    pub success: bool,
    pub transaction: TransactionResponse,
}

#[derive(Serialize)]
pub struct ApprovePurchaseResponse {
    pub success: bool,
    pub purchase: ProductPurchase,
    pub distribution: Distribution,
}

#[derive(Debug, Default, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PlatformStats {
    pub total_members: i64,
    pub active_members: i64,
    pub placed_members: i64,
    pub total_balance: i64,
    pub total_earnings: i64,
    pub pending_transactions: i64,
    pub pending_purchases: i64,
    pub pending_documents: i64,
}

#[derive(Serialize)]
pub struct StatsResponse {
    pub success: bool,
    pub stats: PlatformStats,
}

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    pub action: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

// ========================================
// Filters
// ========================================

/// Case-insensitive search over name, email and member number, plus
/// role and active/inactive filters
pub fn filter_members(members: Vec<Member>, query: &ListUsersQuery, now_ms: i64) -> Vec<Member> {
    let needle = query
        .search
        .as_deref()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty());

    members
        .into_iter()
        .filter(|m| {
            needle.as_ref().map_or(true, |n| {
                m.full_name.to_lowercase().contains(n)
                    || m.email.contains(n)
                    || m.member_id.to_lowercase().contains(n)
            })
        })
        .filter(|m| query.role.as_deref().map_or(true, |r| m.role == r))
        .filter(|m| match query.status.as_deref() {
            Some("active") => m.is_earning(now_ms),
            Some("inactive") => !m.is_earning(now_ms),
            _ => true,
        })
        .collect()
}

// ========================================
// Members
// ========================================

/// GET /api/auth/admin/users - Member list
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    AdminUser(_admin): AdminUser,
    Query(query): Query<ListUsersQuery>,
) -> ApiResult<Json<Paginated<MemberResponse>>> {
    let members: Vec<Member> = sqlx::query_as(
        "SELECT * FROM members WHERE is_deleted = 0 ORDER BY created_at_ms DESC",
    )
    .fetch_all(&state.db)
    .await?;

    let matched = filter_members(members, &query, now_ms());
    let (page, limit, offset) = page_window(query.page, query.limit);
    let total = matched.len() as i64;
    let items = matched
        .iter()
        .skip(offset as usize)
        .take(limit as usize)
        .map(MemberResponse::from)
        .collect();

    Ok(Json(Paginated::new(items, total, page, limit)))
}

/// POST /api/auth/admin/users - Create a member directly
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Json(req): Json<AdminCreateUserRequest>,
) -> ApiResult<Json<UserDetailResponse>> {
    if !role::is_valid(&req.role) {
        return Err(ApiError::bad_request(format!("Unknown role: {}", req.role)));
    }
    if req.full_name.trim().is_empty() || !req.email.contains('@') {
        return Err(ApiError::bad_request("Name and a valid email are required"));
    }
    if req.password.chars().count() < 6 {
        return Err(ApiError::bad_request("Password must be at least 6 characters"));
    }
    let membership: MembershipType = req.membership_type.parse().map_err(ApiError::BadRequest)?;

    let password_hash = hash_password_blocking(req.password.clone()).await?;

    let now_ms = now_ms();
    let mut tx = state.db.begin().await?;
    let sponsor = match req.sponsor_id.as_deref() {
        Some(key) => Some(resolve_member(&mut tx, key).await?),
        None => None,
    };

    let member = insert_member(
        &mut tx,
        NewMember {
            full_name: &req.full_name,
            email: &req.email,
            phone: &req.phone,
            password_hash: &password_hash,
            role: &req.role,
            sponsor: sponsor.as_ref(),
            membership_type: membership.as_str(),
        },
        now_ms,
    )
    .await?;
    log_admin(
        &mut tx,
        &admin.id,
        "create_user",
        Some(&member.id),
        serde_json::json!({ "role": member.role, "sponsorId": member.sponsor_id }),
        now_ms,
    )
    .await?;
    tx.commit().await?;

    info!("Admin {} created member {}", admin.member_id, member.member_id);
    Ok(Json(UserDetailResponse {
        success: true,
        member: MemberResponse::from(&member),
    }))
}

/// PUT /api/auth/admin/users/:id - Update profile, role, KYC or active flag
pub async fn update_user(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
    Json(req): Json<AdminUpdateUserRequest>,
) -> ApiResult<Json<UserDetailResponse>> {
    if let Some(r) = req.role.as_deref() {
        if !role::is_valid(r) {
            return Err(ApiError::bad_request(format!("Unknown role: {}", r)));
        }
    }
    if let Some(k) = req.kyc_status.as_deref() {
        if !kyc_status::is_valid(k) {
            return Err(ApiError::bad_request(format!("Unknown KYC status: {}", k)));
        }
    }
    let email = req.email.as_deref().map(|e| e.trim().to_lowercase());
    if email.as_deref().map_or(false, |e| !e.contains('@')) {
        return Err(ApiError::bad_request("Invalid email address"));
    }
    let phone = req.phone.as_deref().map(str::trim).filter(|p| !p.is_empty());

    let now_ms = now_ms();
    let mut tx = state.db.begin().await?;
    let target = require_member(&mut tx, &id).await?;

    let taken: Option<(String,)> = sqlx::query_as(
        "SELECT id FROM members WHERE (email = ? OR phone = ?) AND id != ?",
    )
    .bind(&email)
    .bind(phone)
    .bind(&target.id)
    .fetch_optional(&mut *tx)
    .await?;
    if taken.is_some() {
        return Err(ApiError::conflict("Email or phone already registered"));
    }

    sqlx::query(r#"
        UPDATE members SET
            full_name = COALESCE(?, full_name),
            email = COALESCE(?, email),
            phone = COALESCE(?, phone),
            role = COALESCE(?, role),
            kyc_status = COALESCE(?, kyc_status),
            is_active = COALESCE(?, is_active),
            updated_at_ms = ?
        WHERE id = ?
    "#)
    .bind(req.full_name.as_deref().map(str::trim).filter(|n| !n.is_empty()))
    .bind(&email)
    .bind(phone)
    .bind(&req.role)
    .bind(&req.kyc_status)
    .bind(req.is_active)
    .bind(now_ms)
    .bind(&target.id)
    .execute(&mut *tx)
    .await?;

    log_admin(
        &mut tx,
        &admin.id,
        "update_user",
        Some(&target.id),
        serde_json::json!({
            "role": req.role,
            "kycStatus": req.kyc_status,
            "isActive": req.is_active,
            "emailChanged": email.is_some(),
        }),
        now_ms,
    )
    .await?;
    let updated = require_member(&mut tx, &target.id).await?;
    tx.commit().await?;

    Ok(Json(UserDetailResponse {
        success: true,
        member: MemberResponse::from(&updated),
    }))
}

/// DELETE /api/auth/admin/users/:id - Logical delete, referrals move up
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
) -> ApiResult<Json<DeleteUserResponse>> {
    if id == admin.id {
        return Err(ApiError::bad_request("Admins cannot delete themselves"));
    }
    let now_ms = now_ms();
    let mut tx = state.db.begin().await?;
    let reparented = delete_member(&mut tx, &id, now_ms).await?;
    log_admin(
        &mut tx,
        &admin.id,
        "delete_user",
        Some(&id),
        serde_json::json!({ "reparentedReferrals": reparented }),
        now_ms,
    )
    .await?;
    tx.commit().await?;

    warn!("Admin {} deleted member {}", admin.member_id, id);
    Ok(Json(DeleteUserResponse {
        success: true,
        reparented_referrals: reparented,
    }))
}

/// POST /api/auth/admin/users/:id/move - Change a member's sponsor
pub async fn move_user(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
    Json(req): Json<MoveUserRequest>,
) -> ApiResult<Json<UserDetailResponse>> {
    let now_ms = now_ms();
    let mut tx = state.db.begin().await?;
    let old_sponsor = require_member(&mut tx, &id).await?.sponsor_id;
    let new_sponsor = resolve_member(&mut tx, &req.new_sponsor_id).await?;
    let moved = move_member(&mut tx, &id, &new_sponsor.id, now_ms).await?;
    log_admin(
        &mut tx,
        &admin.id,
        "move_user",
        Some(&moved.id),
        serde_json::json!({ "from": old_sponsor, "to": new_sponsor.id }),
        now_ms,
    )
    .await?;
    tx.commit().await?;

    Ok(Json(UserDetailResponse {
        success: true,
        member: MemberResponse::from(&moved),
    }))
}

// ========================================
// Ledger
// ========================================

/// GET /api/auth/admin/transactions - All transactions, filterable by member
pub async fn list_transactions(
    State(state): State<Arc<AppState>>,
    AdminUser(_admin): AdminUser,
    Query(query): Query<ListTransactionsQuery>,
) -> ApiResult<Json<Paginated<TransactionResponse>>> {
    let mut conn = state.db.acquire().await?;
    let member_id = match query.member_id.as_deref() {
        Some(key) => Some(resolve_member(&mut conn, key).await?.id),
        None => None,
    };
    let page = query_transactions(&mut conn, member_id.as_deref(), &query).await?;
    Ok(Json(page))
}

/// POST /api/auth/admin/transactions/:id/status - Approve, fail or cancel
pub async fn update_transaction_status(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
    Json(req): Json<UpdateTxStatusRequest>,
) -> ApiResult<Json<TransactionStatusResponse>> {
    let next: TxStatus = req.status.parse()?;
    let now_ms = now_ms();
    let mut tx = state.db.begin().await?;
    let updated = ledger::transition(&mut tx, &id, next, now_ms).await?;
    log_admin(
        &mut tx,
        &admin.id,
        "update_transaction_status",
        Some(&updated.member_id),
        serde_json::json!({ "transactionId": id, "status": next.as_str(), "amount": updated.amount }),
        now_ms,
    )
    .await?;
    tx.commit().await?;

    Ok(Json(TransactionStatusResponse {
        success: true,
        transaction: TransactionResponse::from(&updated),
    }))
}

/// POST /api/auth/admin/adjustments - Refund or penalty
pub async fn create_adjustment(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Json(req): Json<AdjustmentRequest>,
) -> ApiResult<Json<TransactionStatusResponse>> {
    let now_ms = now_ms();
    let mut tx = state.db.begin().await?;
    let target = resolve_member(&mut tx, &req.member_id).await?;
    let created = ledger::adjust(
        &mut tx,
        &target.id,
        &req.kind,
        req.amount,
        req.description.as_deref(),
        &admin.id,
        now_ms,
    )
    .await?;
    log_admin(
        &mut tx,
        &admin.id,
        "create_adjustment",
        Some(&target.id),
        serde_json::json!({ "kind": created.tx_type, "amount": created.amount }),
        now_ms,
    )
    .await?;
    tx.commit().await?;

    info!(
        "Adjustment {} {} for {}",
        created.tx_type, created.amount, target.member_id
    );
    Ok(Json(TransactionStatusResponse {
        success: true,
        transaction: TransactionResponse::from(&created),
    }))
}

/// POST /api/auth/admin/purchases/:id/approve - Confirm an external payment
pub async fn approve_purchase(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
) -> ApiResult<Json<ApprovePurchaseResponse>> {
    let now_ms = now_ms();
    let mut tx = state.db.begin().await?;
    let (purchase, distribution) = complete_purchase(&mut tx, &id, now_ms).await?;
    log_admin(
        &mut tx,
        &admin.id,
        "approve_purchase",
        purchase.sponsor_id.as_deref(),
        serde_json::json!({
            "purchaseId": id,
            "amount": purchase.amount,
            "commissionTotal": purchase.commission_total,
        }),
        now_ms,
    )
    .await?;
    tx.commit().await?;

    Ok(Json(ApprovePurchaseResponse {
        success: true,
        purchase,
        distribution,
    }))
}

// ========================================
// Audit log / stats
// ========================================

/// GET /api/auth/admin/logs - Audit trail, newest first
pub async fn logs(
    State(state): State<Arc<AppState>>,
    AdminUser(_admin): AdminUser,
    Query(query): Query<LogsQuery>,
) -> ApiResult<Json<Paginated<AdminLog>>> {
    let (page, limit, offset) = page_window(query.page, query.limit);

    let total: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM admin_logs WHERE (?1 IS NULL OR action = ?1)")
            .bind(&query.action)
            .fetch_one(&state.db)
            .await?;
    let rows: Vec<AdminLog> = sqlx::query_as(r#"
        SELECT * FROM admin_logs
        WHERE (?1 IS NULL OR action = ?1)
        ORDER BY id DESC
        LIMIT ?2 OFFSET ?3
    "#)
    .bind(&query.action)
    .bind(limit)
    .bind(offset)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(Paginated::new(rows, total, page, limit)))
}

/// GET /api/auth/admin/stats - Platform totals
pub async fn stats(
    State(state): State<Arc<AppState>>,
    AdminUser(_admin): AdminUser,
) -> ApiResult<Json<StatsResponse>> {
    let stats: PlatformStats = sqlx::query_as(r#"
        SELECT
            (SELECT COUNT(*) FROM members WHERE is_deleted = 0) AS total_members,
            (SELECT COUNT(*) FROM members
                WHERE is_deleted = 0 AND is_active = 1 AND active_until_ms > ?1) AS active_members,
            (SELECT COUNT(*) FROM members
                WHERE is_deleted = 0 AND monoline_position IS NOT NULL) AS placed_members,
            (SELECT COALESCE(SUM(balance), 0) FROM members WHERE is_deleted = 0) AS total_balance,
            (SELECT COALESCE(SUM(total_earnings), 0) FROM members WHERE is_deleted = 0) AS total_earnings,
            (SELECT COUNT(*) FROM transactions WHERE status = 'pending') AS pending_transactions,
            (SELECT COUNT(*) FROM product_purchases WHERE status = ?2) AS pending_purchases,
            (SELECT COUNT(*) FROM documents WHERE status = 'pending') AS pending_documents
    "#)
    .bind(now_ms())
    .bind(purchase_status::PENDING)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(StatsResponse {
        success: true,
        stats,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::TestApp;
    use crate::store::test_support::{admin, member, reload};
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn test_filter_members() {
        let pool = crate::db::init_memory_db().await.unwrap();
        let a = member(&pool, "Ayse Demir", None).await;
        let b = member(&pool, "Mehmet Yilmaz", None).await;
        let boss = admin(&pool, "Root Admin").await;
        let all = vec![a.clone(), b, boss];

        let q = |search: Option<&str>, role: Option<&str>, status: Option<&str>| ListUsersQuery {
            search: search.map(String::from),
            role: role.map(String::from),
            status: status.map(String::from),
            page: None,
            limit: None,
        };

        let found = filter_members(all.clone(), &q(Some("AYSE"), None, None), 0);
        assert_eq!(found.len(), 1);
        let found = filter_members(all.clone(), &q(Some(&a.member_id.to_lowercase()), None, None), 0);
        assert_eq!(found[0].id, a.id);
        assert_eq!(filter_members(all.clone(), &q(None, Some("admin"), None), 0).len(), 1);
        assert_eq!(filter_members(all, &q(None, None, Some("active")), 0).len(), 0);
    }

    #[tokio::test]
    async fn test_deposit_approval_adjustment_and_logs() {
        let app = TestApp::new().await;
        let boss = admin(&app.state.db, "Ledger Admin").await;
        let m = member(&app.state.db, "Ledger Member", None).await;
        let admin_token = app.token_for(&boss).await;
        let member_token = app.token_for(&m).await;

        let (_, body) = app
            .post(
                "/api/transactions/create",
                Some(&member_token),
                json!({ "type": "deposit", "amount": 20_000 }),
            )
            .await;
        let deposit_id = body["transaction"]["id"].as_str().unwrap().to_string();
        let status_uri = format!("/api/auth/admin/transactions/{}/status", deposit_id);

        let (status, _) = app
            .post(&status_uri, Some(&member_token), json!({ "status": "completed" }))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = app
            .post(&status_uri, Some(&admin_token), json!({ "status": "completed" }))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["transaction"]["balancesAfter"]["balance"], 20_000);
        let (status, _) = app
            .post(&status_uri, Some(&admin_token), json!({ "status": "failed" }))
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        let (status, _) = app
            .post(&status_uri, Some(&admin_token), json!({ "status": "bogus" }))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = app
            .post(
                "/api/auth/admin/adjustments",
                Some(&admin_token),
                json!({ "memberId": m.member_id, "kind": "penalty", "amount": 5_000 }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(reload(&app.state.db, &m).await.balance, 15_000);

        let (_, listed) = app
            .get(
                &format!("/api/auth/admin/transactions?memberId={}", m.id),
                Some(&admin_token),
            )
            .await;
        assert_eq!(listed["total"], 2);

        let (_, logs) = app.get("/api/auth/admin/logs", Some(&admin_token)).await;
        assert_eq!(logs["total"], 2);
        assert_eq!(logs["items"][0]["action"], "create_adjustment");

        let (status, _) = app
            .post(
                "/api/auth/admin/adjustments",
                Some(&admin_token),
                json!({ "memberId": m.member_id, "kind": "refund", "amount": i64::MAX }),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, stats) = app.get("/api/auth/admin/stats", Some(&admin_token)).await;
        assert_eq!(stats["stats"]["totalBalance"], 15_000);
        assert_eq!(stats["stats"]["totalMembers"], 2);

        // logically deleted members drop out of every aggregate
        let gone = member(&app.state.db, "Gone Member", None).await;
        sqlx::query(
            "UPDATE members SET is_deleted = 1, monoline_position = 99, balance = 7000, \
             total_earnings = 7000, sponsor_bonus = 7000 WHERE id = ?",
        )
        .bind(&gone.id)
        .execute(&app.state.db)
        .await
        .unwrap();
        let (_, after) = app.get("/api/auth/admin/stats", Some(&admin_token)).await;
        assert_eq!(after["stats"], stats["stats"]);
    }

    #[tokio::test]
    async fn test_user_lifecycle() {
        let app = TestApp::new().await;
        let boss = admin(&app.state.db, "People Admin").await;
        let token = app.token_for(&boss).await;
        let top = member(&app.state.db, "Top Sponsor", None).await;
        let mid = member(&app.state.db, "Mid Sponsor", Some(&top)).await;

        let (status, body) = app
            .post(
                "/api/auth/admin/users",
                Some(&token),
                json!({
                    "fullName": "Leaf Member",
                    "email": "leaf@example.org",
                    "phone": "+905550000001",
                    "password": "secret1",
                    "sponsorId": mid.member_id
                }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        let leaf_id = body["member"]["id"].as_str().unwrap().to_string();
        assert_eq!(body["member"]["sponsorId"], mid.id.as_str());

        let (status, _) = app
            .put(
                &format!("/api/auth/admin/users/{}", leaf_id),
                Some(&token),
                json!({ "email": top.email }),
            )
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        let (status, body) = app
            .put(
                &format!("/api/auth/admin/users/{}", leaf_id),
                Some(&token),
                json!({ "kycStatus": "verified", "role": "leader" }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["member"]["kycStatus"], "verified");

        // moving a sponsor under its own downline is refused
        let (status, _) = app
            .post(
                &format!("/api/auth/admin/users/{}/move", top.id),
                Some(&token),
                json!({ "newSponsorId": leaf_id }),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = app
            .delete(&format!("/api/auth/admin/users/{}", mid.id), Some(&token))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["reparentedReferrals"], 1);
        let (_, body) = app
            .get("/api/auth/admin/users?search=leaf", Some(&token))
            .await;
        assert_eq!(body["items"][0]["sponsorId"], top.id.as_str());

        let (status, _) = app
            .delete(&format!("/api/auth/admin/users/{}", boss.id), Some(&token))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
