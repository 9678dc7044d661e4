//! Clone Page API Handlers
//! Personal storefronts reachable by slug, visit tracking, visitor orders

use axum::{
    extract::{Path, State},
    response::Json,
};
use serde::Serialize;
use sqlx::SqliteConnection;
use std::sync::Arc;
use tracing::info;

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::models::{
    ClonePage, ClonePageStats, Product, ProductPurchase, ProductResponse, UpdateCloneRequest,
    VisitorPurchaseRequest,
};
use crate::purchases::{purchase_as_visitor, require_product, VisitorOrder};
use crate::store::{clone_page_for, find_by_referral_code, get_member};
use crate::AppState;

use super::now_ms;
use super::products::product_to_response;

const MAX_CUSTOMIZATIONS_BYTES: usize = 16 * 1024;

// ========================================
// Response Types
// ========================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CloneOwner {
    pub member_id: String,
    pub full_name: String,
    pub referral_code: String,
    pub career_level: String,
}

#[derive(Serialize)]
pub struct ClonePageResponse {
    pub success: bool,
    pub owner: CloneOwner,
    pub page: ClonePageStats,
    pub products: Vec<ProductResponse>,
}

#[derive(Serialize)]
pub struct CloneStatsResponse {
    pub success: bool,
    pub page: ClonePageStats,
}

#[derive(Serialize)]
pub struct VisitorPurchaseResponse {
    pub success: bool,
    pub purchase: ProductPurchase,
}

// ========================================
// Helpers
// ========================================

async fn page_by_slug(conn: &mut SqliteConnection, slug: &str) -> ApiResult<ClonePage> {
    sqlx::query_as("SELECT * FROM clone_pages WHERE slug = ?")
        .bind(slug.trim().to_lowercase())
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Clone page not found: {}", slug)))
}

/// Customizations are stored verbatim; only a bounded JSON object is accepted
pub fn validate_customizations(value: &serde_json::Value) -> ApiResult<String> {
    if !value.is_object() {
        return Err(ApiError::bad_request("Customizations must be a JSON object"));
    }
    let encoded = value.to_string();
    if encoded.len() > MAX_CUSTOMIZATIONS_BYTES {
        return Err(ApiError::bad_request(format!(
            "Customizations exceed {} bytes",
            MAX_CUSTOMIZATIONS_BYTES
        )));
    }
    Ok(encoded)
}

// ========================================
// Handlers
// ========================================

/// GET /api/clone/:slug - Public storefront
pub async fn view(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> ApiResult<Json<ClonePageResponse>> {
    let mut conn = state.db.acquire().await?;
    let page = page_by_slug(&mut conn, &slug).await?;
    let owner = get_member(&mut conn, &page.member_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Clone page not found: {}", slug)))?;

    let products: Vec<Product> = sqlx::query_as(
        "SELECT * FROM products WHERE is_alive = 1 AND in_stock = 1 ORDER BY created_at_ms DESC",
    )
    .fetch_all(&mut *conn)
    .await?;

    Ok(Json(ClonePageResponse {
        success: true,
        owner: CloneOwner {
            member_id: owner.member_id.clone(),
            full_name: owner.full_name.clone(),
            referral_code: owner.referral_code.clone(),
            career_level: owner.career_level.clone(),
        },
        page: ClonePageStats::from(&page),
        products: products.iter().map(product_to_response).collect(),
    }))
}

/// PUT /api/clone/me - Replace the own page customizations
pub async fn update_mine(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<UpdateCloneRequest>,
) -> ApiResult<Json<CloneStatsResponse>> {
    let encoded = validate_customizations(&req.customizations)?;
    let mut conn = state.db.acquire().await?;

    let updated = sqlx::query(
        "UPDATE clone_pages SET customizations = ?, updated_at_ms = ? WHERE member_id = ?",
    )
    .bind(&encoded)
    .bind(now_ms())
    .bind(&user.member.id)
    .execute(&mut *conn)
    .await?;
    if updated.rows_affected() == 0 {
        return Err(ApiError::not_found("Clone page not found"));
    }

    let page = clone_page_for(&mut conn, &user.member.id)
        .await?
        .ok_or_else(|| ApiError::not_found("Clone page not found"))?;
    Ok(Json(CloneStatsResponse {
        success: true,
        page: ClonePageStats::from(&page),
    }))
}

/// POST /api/clone-products/:slug/visit - Count a storefront visit
pub async fn visit(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> ApiResult<Json<CloneStatsResponse>> {
    let mut conn = state.db.acquire().await?;
    let page = page_by_slug(&mut conn, &slug).await?;
    sqlx::query("UPDATE clone_pages SET visit_count = visit_count + 1 WHERE member_id = ?")
        .bind(&page.member_id)
        .execute(&mut *conn)
        .await?;

    let page = page_by_slug(&mut conn, &slug).await?;
    Ok(Json(CloneStatsResponse {
        success: true,
        page: ClonePageStats::from(&page),
    }))
}

/// POST /api/clone-products/purchase - Visitor order through a referral code
pub async fn visitor_purchase(
    State(state): State<Arc<AppState>>,
    Json(req): Json<VisitorPurchaseRequest>,
) -> ApiResult<Json<VisitorPurchaseResponse>> {
    let mut tx = state.db.begin().await?;
    let referrer = find_by_referral_code(&mut tx, &req.referral_code)
        .await?
        .ok_or_else(|| ApiError::bad_request("Invalid referral code"))?;
    let product = require_product(&mut tx, &req.product_id).await?;

    let purchase = purchase_as_visitor(
        &mut tx,
        VisitorOrder {
            referrer: &referrer,
            product: &product,
            quantity: req.quantity,
            buyer_name: &req.buyer_name,
            buyer_email: &req.buyer_email,
        },
        now_ms(),
    )
    .await?;
    tx.commit().await?;

    info!("Visitor purchase recorded: {}", purchase.id);
    Ok(Json(VisitorPurchaseResponse {
        success: true,
        purchase,
    }))
}
