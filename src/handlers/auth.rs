//! Auth API Handlers
//! /api/auth endpoints: registration wizard, login, logout, current member

use axum::{extract::State, response::Json};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::auth::{
    create_session, hash_password_blocking, revoke_session, validate_new_password,
    verify_password_blocking,
    AuthUser,
};
use crate::engine::membership::remaining_days;
use crate::engine::MembershipType;
use crate::error::{ApiError, ApiResult};
use crate::models::{role, LoginRequest, MemberResponse, RegisterRequest};
use crate::store::{find_by_login, find_by_referral_code, insert_member, team_size, NewMember};
use crate::AppState;

use super::{now_ms, MessageResponse};

// ========================================
// Response Types
// ========================================

#[derive(Serialize)]
pub struct SessionResponse {
    pub success: bool,
    pub token: String,
    pub member: MemberResponse,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeResponse {
    pub success: bool,
    pub member: MemberResponse,
    pub remaining_days: i64,
}

// ========================================
// Validation
// ========================================

/// Checks every wizard step that needs no database access
pub fn validate_registration(req: &RegisterRequest) -> ApiResult<MembershipType> {
    let required = [
        ("fullName", &req.full_name),
        ("email", &req.email),
        ("phone", &req.phone),
        ("password", &req.password),
    ];
    if let Some((field, _)) = required.iter().find(|(_, v)| v.trim().is_empty()) {
        return Err(ApiError::bad_request(format!("{} is required", field)));
    }
    if !req.email.contains('@') {
        return Err(ApiError::bad_request("Invalid email address"));
    }
    validate_new_password(&req.password, &req.confirm_password)?;
    if !req.accept_terms || !req.accept_privacy {
        return Err(ApiError::bad_request(
            "Terms and privacy policy must be accepted",
        ));
    }
    req.membership_type
        .parse::<MembershipType>()
        .map_err(ApiError::BadRequest)
}

// ========================================
// Handlers
// ========================================

/// POST /api/auth/register - Register a new member
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<Json<SessionResponse>> {
    let membership = validate_registration(&req)?;
    let now_ms = now_ms();
    let password_hash = hash_password_blocking(req.password.clone()).await?;

    let mut tx = state.db.begin().await?;

    let sponsor = match req.referral_code.as_deref().map(str::trim) {
        Some(code) if !code.is_empty() => Some(
            find_by_referral_code(&mut tx, code)
                .await?
                .ok_or_else(|| ApiError::bad_request("Invalid referral code"))?,
        ),
        _ => None,
    };

    let member = insert_member(
        &mut tx,
        NewMember {
            full_name: &req.full_name,
            email: &req.email,
            phone: &req.phone,
            password_hash: &password_hash,
            role: role::MEMBER,
            sponsor: sponsor.as_ref(),
            membership_type: membership.as_str(),
        },
        now_ms,
    )
    .await?;
    let token = create_session(&mut tx, &member.id, now_ms, state.config.session_ttl_ms()).await?;

    tx.commit().await?;

    info!(
        "Member registered: {} sponsor={:?}",
        member.member_id,
        sponsor.as_ref().map(|s| s.member_id.as_str())
    );

    Ok(Json(SessionResponse {
        success: true,
        token,
        member: MemberResponse::from(&member),
    }))
}

/// POST /api/auth/login - Login with email or member number
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<SessionResponse>> {
    let mut conn = state.db.acquire().await?;
    let member = find_by_login(&mut conn, &req.identifier)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Invalid credentials".to_string()))?;
    if !verify_password_blocking(req.password.clone(), member.password_hash.clone()).await? {
        return Err(ApiError::Unauthorized("Invalid credentials".to_string()));
    }

    let token =
        create_session(&mut conn, &member.id, now_ms(), state.config.session_ttl_ms()).await?;

    info!("Login: {}", member.member_id);
    Ok(Json(SessionResponse {
        success: true,
        token,
        member: MemberResponse::from(&member),
    }))
}

/// POST /api/auth/logout - Revoke the current session
pub async fn logout(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> ApiResult<Json<MessageResponse>> {
    let mut conn = state.db.acquire().await?;
    revoke_session(&mut conn, &user.token).await?;
    Ok(MessageResponse::ok("Logged out"))
}

/// GET /api/auth/me - Current member
pub async fn me(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> ApiResult<Json<MeResponse>> {
    let member = user.member;
    let now_ms = now_ms();
    let mut conn = state.db.acquire().await?;
    let size = team_size(&mut conn, &member.id, now_ms).await?;
    Ok(Json(MeResponse {
        success: true,
        remaining_days: remaining_days(member.active_until_ms, now_ms),
        member: MemberResponse::from(&member).with_team(size.direct, size.total),
    }))
}
