//! Background maintenance: membership expiry and session cleanup

use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::db::DbPool;
use crate::error::ApiResult;
use crate::AppState;

/// Deactivates members whose renewal window has closed
pub async fn expire_memberships(db: &DbPool, now_ms: i64) -> ApiResult<u64> {
    let result = sqlx::query(
        "UPDATE members SET is_active = 0, updated_at_ms = ? WHERE is_active = 1 AND active_until_ms <= ?",
    )
    .bind(now_ms)
    .bind(now_ms)
    .execute(db)
    .await?;
    Ok(result.rows_affected())
}

pub async fn purge_sessions(db: &DbPool, now_ms: i64) -> ApiResult<u64> {
    let result = sqlx::query("DELETE FROM sessions WHERE expires_at_ms <= ?")
        .bind(now_ms)
        .execute(db)
        .await?;
    Ok(result.rows_affected())
}

/// Runs both sweeps every `expiry_sweep_secs` until the runtime stops
pub fn spawn_maintenance(state: Arc<AppState>) -> tokio::task::JoinHandle<()> {
    let period = Duration::from_secs(state.config.expiry_sweep_secs.max(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            let now_ms = chrono::Utc::now().timestamp_millis();

            match expire_memberships(&state.db, now_ms).await {
                Ok(0) => {}
                Ok(n) => info!("Expired memberships: {}", n),
                Err(e) => warn!("Membership expiry failed: {}", e),
            }
            match purge_sessions(&state.db, now_ms).await {
                Ok(0) => {}
                Ok(n) => info!("Purged sessions: {}", n),
                Err(e) => warn!("Session purge failed: {}", e),
            }
        }
    })
}
