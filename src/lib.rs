//! Monoline membership platform API
//!
//! Members register through a referral code, get placed in a single
//! sequential line on activation, and earn sponsor/career/passive/leadership
//! bonuses from activations and product sales.

pub mod auth;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod jobs;
pub mod ledger;
pub mod models;
pub mod network;
pub mod purchases;
pub mod seed;
pub mod store;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::handlers::{admin, auth as auth_h, clone_pages, documents, members, mlm, products, transactions};

/// Shared by every handler
pub struct AppState {
    pub db: DbPool,
    pub config: AppConfig,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let body_limit = state.config.max_upload_mb * 1024 * 1024;

    Router::new()
        .route("/api/health", get(handlers::health_check))
        // auth / member documents
        .route("/api/auth/register", post(auth_h::register))
        .route("/api/auth/login", post(auth_h::login))
        .route("/api/auth/logout", post(auth_h::logout))
        .route("/api/auth/me", get(auth_h::me))
        .route("/api/auth/upload-receipt", post(documents::upload_receipt))
        .route("/api/auth/member/documents", get(documents::member_documents))
        .route("/api/documents/:id/file", get(documents::download))
        // member area
        .route(
            "/api/user/:id/profile",
            get(members::get_profile).put(members::update_profile),
        )
        .route("/api/user/:id/dashboard", get(members::dashboard))
        .route("/api/user/:id/team", get(members::team))
        .route(
            "/api/user/:id/payment-accounts",
            get(members::get_payment_accounts).put(members::update_payment_accounts),
        )
        .route("/api/user/:id/training-progress", get(members::training_progress))
        .route(
            "/api/user/:id/training-progress/:module_id",
            put(members::update_training_progress),
        )
        // monoline
        .route("/api/mlm/monoline-stats/:id", get(mlm::monoline_stats))
        .route("/api/mlm/career-levels", get(mlm::career_levels))
        .route("/api/mlm/activate-monoline", post(mlm::activate))
        .route("/api/mlm/calculate-monoline/:id", post(mlm::calculate_preview))
        .route(
            "/api/commissions/calculate-placement-bonuses",
            post(mlm::placement_bonuses),
        )
        // wallet
        .route("/api/transactions/my-transactions", get(transactions::my_transactions))
        .route("/api/transactions/create", post(transactions::create))
        .route("/api/transactions/:id/cancel", post(transactions::cancel))
        .route("/api/transactions/feed", get(transactions::feed))
        // products
        .route("/api/products", get(products::list).post(products::create))
        .route("/api/products/purchases/my", get(products::my_purchases))
        .route(
            "/api/products/:id",
            get(products::get_one)
                .put(products::update)
                .delete(products::remove),
        )
        .route("/api/products/:id/purchase", post(products::purchase))
        // clone pages
        .route("/api/clone/me", put(clone_pages::update_mine))
        .route("/api/clone/:slug", get(clone_pages::view))
        .route("/api/clone-products/:slug/visit", post(clone_pages::visit))
        .route("/api/clone-products/purchase", post(clone_pages::visitor_purchase))
        // admin
        .route(
            "/api/auth/admin/users",
            get(admin::list_users).post(admin::create_user),
        )
        .route(
            "/api/auth/admin/users/:id",
            put(admin::update_user).delete(admin::delete_user),
        )
        .route("/api/auth/admin/users/:id/move", post(admin::move_user))
        .route("/api/auth/admin/transactions", get(admin::list_transactions))
        .route(
            "/api/auth/admin/transactions/:id/status",
            post(admin::update_transaction_status),
        )
        .route("/api/auth/admin/adjustments", post(admin::create_adjustment))
        .route("/api/auth/admin/purchases/:id/approve", post(admin::approve_purchase))
        .route("/api/auth/admin/documents", get(documents::admin_list))
        .route("/api/auth/admin/documents/shared", post(documents::upload_shared))
        .route("/api/auth/admin/documents/:id", delete(documents::admin_delete))
        .route("/api/auth/admin/documents/:id/approve", post(documents::approve))
        .route("/api/auth/admin/documents/:id/reject", post(documents::reject))
        .route("/api/auth/admin/logs", get(admin::logs))
        .route("/api/auth/admin/stats", get(admin::stats))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Creates the configured admin account when no admin exists yet
pub async fn bootstrap_admin(state: &AppState) -> anyhow::Result<()> {
    let (Some(email), Some(password)) = (&state.config.admin_email, &state.config.admin_password)
    else {
        return Ok(());
    };

    let admins: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM members WHERE role = 'admin' AND is_deleted = 0",
    )
    .fetch_one(&state.db)
    .await?;
    if admins > 0 {
        return Ok(());
    }

    let password_hash = auth::hash_password_blocking(password.clone())
        .await
        .map_err(|e| anyhow::anyhow!("admin bootstrap failed: {}", e))?;
    let now_ms = chrono::Utc::now().timestamp_millis();
    let mut conn = state.db.acquire().await?;
    let admin = store::insert_member(
        &mut conn,
        store::NewMember {
            full_name: "Administrator",
            email,
            phone: "admin",
            password_hash: &password_hash,
            role: models::role::ADMIN,
            sponsor: None,
            membership_type: "entry",
        },
        now_ms,
    )
    .await
    .map_err(|e| anyhow::anyhow!("admin bootstrap failed: {}", e))?;

    info!("Bootstrap admin created: {} ({})", admin.email, admin.member_id);
    Ok(())
}
