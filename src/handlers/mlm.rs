//! MLM API Handlers
//! Monoline stats, career table, activation, commission preview, placement bonuses

use axum::{
    extract::{Path, State},
    response::Json,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::auth::{ensure_self_or_admin, AdminUser, AuthUser};
use crate::engine::plan::CAREER_LEVELS;
use crate::engine::{distribute, CommissionEvent, Distribution, MembershipType};
use crate::error::{ApiError, ApiResult};
use crate::ledger::MAX_TX_AMOUNT;
use crate::models::{
    ActivateRequest, CalculateRequest, CareerLevelResponse, MonolineStats, PlacementBonusRequest,
};
use crate::network::{activate_member, pay_placement_bonus, ActivationOutcome};
use crate::store::{log_admin, monoline_stats as load_stats, payout_context, require_member};
use crate::AppState;

use super::now_ms;

// ========================================
// Response Types
// ========================================

#[derive(Serialize)]
pub struct MonolineStatsResponse {
    pub success: bool,
    pub stats: MonolineStats,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CareerLevelsResponse {
    pub success: bool,
    pub career_levels: Vec<CareerLevelResponse>,
}

#[derive(Serialize)]
pub struct ActivationResponse {
    pub success: bool,
    pub activation: ActivationOutcome,
}

#[derive(Serialize)]
pub struct DistributionResponse {
    pub success: bool,
    pub distribution: Distribution,
}

// ========================================
// Handlers
// ========================================

/// GET /api/mlm/monoline-stats/:id - Position and team figures
pub async fn monoline_stats(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<MonolineStatsResponse>> {
    ensure_self_or_admin(&user.member, &id)?;
    let mut conn = state.db.acquire().await?;
    let member = require_member(&mut conn, &id).await?;
    let stats = load_stats(&mut conn, &member, now_ms()).await?;
    Ok(Json(MonolineStatsResponse {
        success: true,
        stats,
    }))
}

/// GET /api/mlm/career-levels - Career level table
pub async fn career_levels() -> Json<CareerLevelsResponse> {
    Json(CareerLevelsResponse {
        success: true,
        career_levels: CAREER_LEVELS.iter().map(CareerLevelResponse::from).collect(),
    })
}

/// POST /api/mlm/activate-monoline - Activate or renew a membership (admin)
pub async fn activate(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Json(req): Json<ActivateRequest>,
) -> ApiResult<Json<ActivationResponse>> {
    let membership: MembershipType = req.membership_type.parse().map_err(ApiError::BadRequest)?;
    let now_ms = now_ms();

    let mut tx = state.db.begin().await?;
    let outcome = activate_member(&mut tx, &req.user_id, membership, now_ms).await?;
    log_admin(
        &mut tx,
        &admin.id,
        "activate_monoline",
        Some(&req.user_id),
        serde_json::json!({
            "membershipType": membership.as_str(),
            "monolinePosition": outcome.monoline_position,
            "activeUntil": outcome.active_until,
            "commissionPaid": outcome.distribution.as_ref().map_or(0, |d| d.total_paid),
        }),
        now_ms,
    )
    .await?;
    tx.commit().await?;

    Ok(Json(ActivationResponse {
        success: true,
        activation: outcome,
    }))
}

/// POST /api/mlm/calculate-monoline/:id - Preview a distribution, nothing is written
pub async fn calculate_preview(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(req): Json<CalculateRequest>,
) -> ApiResult<Json<DistributionResponse>> {
    ensure_self_or_admin(&user.member, &id)?;
    if req.amount < 0 {
        return Err(ApiError::bad_request("Amount cannot be negative"));
    }
    if req.amount > MAX_TX_AMOUNT {
        return Err(ApiError::bad_request("Amount too large"));
    }
    let event: CommissionEvent = match req.event.as_deref() {
        Some(event) => event.parse().map_err(ApiError::BadRequest)?,
        None => CommissionEvent::Purchase,
    };

    let mut conn = state.db.acquire().await?;
    let member = require_member(&mut conn, &id).await?;
    let ctx = payout_context(&mut conn, &member, true, now_ms()).await?;

    Ok(Json(DistributionResponse {
        success: true,
        distribution: distribute(req.amount, event, &ctx),
    }))
}

/// POST /api/commissions/calculate-placement-bonuses - Pay an outstanding placement bonus (admin)
pub async fn placement_bonuses(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Json(req): Json<PlacementBonusRequest>,
) -> ApiResult<Json<DistributionResponse>> {
    let now_ms = now_ms();
    let mut tx = state.db.begin().await?;
    let distribution = pay_placement_bonus(&mut tx, &req.user_id, now_ms).await?;
    log_admin(
        &mut tx,
        &admin.id,
        "placement_bonus",
        Some(&req.user_id),
        serde_json::json!({
            "amount": distribution.amount,
            "totalPaid": distribution.total_paid,
            "payouts": distribution.payouts.len(),
        }),
        now_ms,
    )
    .await?;
    tx.commit().await?;

    info!(
        "Placement bonus paid for {}: {}",
        req.user_id, distribution.total_paid
    );
    Ok(Json(DistributionResponse {
        success: true,
        distribution,
    }))
}

#[cfg(test)]
mod tests {
    use crate::handlers::test_support::TestApp;
    use crate::store::test_support::{admin, member, reload};
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn test_career_levels_table() {
        let app = TestApp::new().await;
        let (status, body) = app.get("/api/mlm/career-levels", None).await;
        assert_eq!(status, StatusCode::OK);
        let levels = body["careerLevels"].as_array().unwrap();
        assert_eq!(levels.len(), 5);
        assert_eq!(levels[0]["name"], "Bronze");
        assert_eq!(levels[4]["commissionRate"], 15.0);
    }

    #[tokio::test]
    async fn test_activation_flow_and_preview() {
        let app = TestApp::new().await;
        let boss = admin(&app.state.db, "Mlm Admin").await;
        let sponsor = member(&app.state.db, "Mlm Sponsor", None).await;
        let recruit = member(&app.state.db, "Mlm Recruit", Some(&sponsor)).await;
        let admin_token = app.token_for(&boss).await;
        let recruit_token = app.token_for(&recruit).await;

        // members cannot activate
        let (status, _) = app
            .post(
                "/api/mlm/activate-monoline",
                Some(&recruit_token),
                json!({ "userId": recruit.id, "membershipType": "entry" }),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        for m in [&sponsor, &recruit] {
            let (status, _) = app
                .post(
                    "/api/mlm/activate-monoline",
                    Some(&admin_token),
                    json!({ "userId": m.id, "membershipType": "monthly" }),
                )
                .await;
            assert_eq!(status, StatusCode::OK);
        }
        let sponsor = reload(&app.state.db, &sponsor).await;
        assert!(sponsor.total_earnings > 0);
        assert!(sponsor.wallet().earnings_consistent());

        // second placement payout is refused
        let (status, _) = app
            .post(
                "/api/commissions/calculate-placement-bonuses",
                Some(&admin_token),
                json!({ "userId": recruit.id }),
            )
            .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, body) = app
            .post(
                &format!("/api/mlm/calculate-monoline/{}", recruit.id),
                Some(&recruit_token),
                json!({ "amount": 29900, "event": "purchase" }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["distribution"]["payouts"][0]["amount"], 4485);
        assert!(body["distribution"]["totalPaid"].as_i64().unwrap() <= 14_950);
        // preview writes nothing
        assert_eq!(reload(&app.state.db, &sponsor).await.balance, sponsor.balance);

        let (status, body) = app
            .get(&format!("/api/mlm/monoline-stats/{}", recruit.id), Some(&recruit_token))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["stats"]["monolinePosition"], 2);
        assert_eq!(body["stats"]["membersAhead"], 1);
    }
}
