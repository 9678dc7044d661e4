//! Transactions API Handlers
//! /api/transactions endpoints: history, member requests, cancel, polling feed

use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use serde::Serialize;
use sqlx::SqliteConnection;
use std::sync::Arc;
use tracing::info;

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::ledger::{self, require_transaction, TxStatus};
use crate::models::{
    page_window, tx_type, CreateTransactionRequest, FeedQuery, ListTransactionsQuery, Paginated,
    Transaction, TransactionResponse, MAX_PAGE_SIZE,
};
use crate::store::resolve_member;
use crate::AppState;

use super::now_ms;

// ========================================
// Response Types
// ========================================

#[derive(Serialize)]
pub struct TransactionDetailResponse {
    pub success: bool,
    pub transaction: TransactionResponse,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedResponse {
    pub success: bool,
    pub transactions: Vec<TransactionResponse>,
    pub next_cursor: i64,
}

// ========================================
// Queries
// ========================================

/// Filtered, paginated history. `member_id = None` lists every member.
pub(crate) async fn list_transactions(
    conn: &mut SqliteConnection,
    member_id: Option<&str>,
    query: &ListTransactionsQuery,
) -> ApiResult<Paginated<TransactionResponse>> {
    let (page, limit, offset) = page_window(query.page, query.limit);

    let total: i64 = sqlx::query_scalar(r#"
        SELECT COUNT(*) FROM transactions
        WHERE (?1 IS NULL OR member_id = ?1)
          AND (?2 IS NULL OR tx_type = ?2)
          AND (?3 IS NULL OR status = ?3)
    "#)
    .bind(member_id)
    .bind(&query.tx_type)
    .bind(&query.status)
    .fetch_one(&mut *conn)
    .await?;

    let rows: Vec<Transaction> = sqlx::query_as(r#"
        SELECT * FROM transactions
        WHERE (?1 IS NULL OR member_id = ?1)
          AND (?2 IS NULL OR tx_type = ?2)
          AND (?3 IS NULL OR status = ?3)
        ORDER BY seq DESC
        LIMIT ?4 OFFSET ?5
    "#)
    .bind(member_id)
    .bind(&query.tx_type)
    .bind(&query.status)
    .bind(limit)
    .bind(offset)
    .fetch_all(&mut *conn)
    .await?;

    Ok(Paginated::new(
        rows.iter().map(TransactionResponse::from).collect(),
        total,
        page,
        limit,
    ))
}

// ========================================
// Handlers
// ========================================

/// GET /api/transactions/my-transactions - Own transaction history
pub async fn my_transactions(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Query(query): Query<ListTransactionsQuery>,
) -> ApiResult<Json<Paginated<TransactionResponse>>> {
    let mut conn = state.db.acquire().await?;
    let page = list_transactions(&mut conn, Some(&user.member.id), &query).await?;
    Ok(Json(page))
}

/// POST /api/transactions/create - Deposit / withdrawal request or transfer
pub async fn create(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<CreateTransactionRequest>,
) -> ApiResult<Json<TransactionDetailResponse>> {
    let now_ms = now_ms();
    let description = req.description.as_deref();
    let mut tx = state.db.begin().await?;

    let created = match req.tx_type.as_str() {
        tx_type::DEPOSIT => {
            ledger::create_deposit(&mut tx, &user.member, req.amount, description, now_ms).await?
        }
        tx_type::WITHDRAWAL => {
            ledger::create_withdrawal(&mut tx, &user.member, req.amount, description, now_ms)
                .await?
        }
        tx_type::TRANSFER => {
            let to = req
                .to_member_id
                .as_deref()
                .ok_or_else(|| ApiError::bad_request("toMemberId is required for transfers"))?;
            let recipient = resolve_member(&mut tx, to).await?;
            ledger::transfer(&mut tx, &user.member, &recipient.id, req.amount, description, now_ms)
                .await?
        }
        other => {
            return Err(ApiError::bad_request(format!(
                "Type must be deposit, withdrawal or transfer, got {}",
                other
            )))
        }
    };
    tx.commit().await?;

    info!(
        "Transaction created: {} {} amount={} risk={}",
        user.member.member_id, created.tx_type, created.amount, created.risk_score
    );
    Ok(Json(TransactionDetailResponse {
        success: true,
        transaction: TransactionResponse::from(&created),
    }))
}

/// POST /api/transactions/:id/cancel - Cancel an own pending request
pub async fn cancel(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<TransactionDetailResponse>> {
    let mut tx = state.db.begin().await?;
    let existing = require_transaction(&mut tx, &id).await?;
    if existing.member_id != user.member.id {
        return Err(ApiError::not_found(format!("Transaction not found: {}", id)));
    }
    if existing.tx_type != tx_type::DEPOSIT && existing.tx_type != tx_type::WITHDRAWAL {
        return Err(ApiError::bad_request(
            "Only deposit and withdrawal requests can be cancelled",
        ));
    }
    let cancelled = ledger::transition(&mut tx, &id, TxStatus::Cancelled, now_ms()).await?;
    tx.commit().await?;

    Ok(Json(TransactionDetailResponse {
        success: true,
        transaction: TransactionResponse::from(&cancelled),
    }))
}

/// GET /api/transactions/feed?after=<seq> - Rows newer than the cursor, oldest first
pub async fn feed(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Query(query): Query<FeedQuery>,
) -> ApiResult<Json<FeedResponse>> {
    let after = query.after.unwrap_or(0).max(0);
    let limit = query.limit.unwrap_or(50).clamp(1, MAX_PAGE_SIZE);
    let scope = (!user.member.is_admin()).then_some(user.member.id.as_str());

    let rows: Vec<Transaction> = sqlx::query_as(r#"
        SELECT * FROM transactions
        WHERE seq > ?1 AND (?2 IS NULL OR member_id = ?2)
        ORDER BY seq ASC
        LIMIT ?3
    "#)
    .bind(after)
    .bind(scope)
    .bind(limit)
    .fetch_all(&state.db)
    .await?;

    let next_cursor = rows.last().map_or(after, |t| t.seq);
    Ok(Json(FeedResponse {
        success: true,
        transactions: rows.iter().map(TransactionResponse::from).collect(),
        next_cursor,
    }))
}

#[cfg(test)]
mod tests {
    use crate::handlers::test_support::TestApp;
    use crate::ledger::adjust;
    use crate::store::test_support::member;
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn test_withdraw_cancel_and_feed_cursor() {
        let app = TestApp::new().await;
        let m = member(&app.state.db, "Feed Member", None).await;
        let other = member(&app.state.db, "Feed Other", None).await;
        {
            let mut conn = app.state.db.acquire().await.unwrap();
            adjust(&mut conn, &m.id, "refund", 10_000, None, "admin", 0).await.unwrap();
        }
        let token = app.token_for(&m).await;

        let (status, _) = app
            .post(
                "/api/transactions/create",
                Some(&token),
                json!({ "type": "withdrawal", "amount": 50_000 }),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = app
            .post(
                "/api/transactions/create",
                Some(&token),
                json!({ "type": "withdrawal", "amount": 3_000 }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        let withdrawal_id = body["transaction"]["id"].as_str().unwrap().to_string();
        assert_eq!(body["transaction"]["balancesAfter"]["balance"], 7_000);

        let (status, body) = app
            .post(
                "/api/transactions/create",
                Some(&token),
                json!({ "type": "transfer", "amount": 1_000, "toMemberId": other.member_id }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["transaction"]["status"], "completed");

        let cancel_uri = format!("/api/transactions/{}/cancel", withdrawal_id);
        let (status, body) = app.post(&cancel_uri, Some(&token), json!({})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["transaction"]["status"], "cancelled");
        let (status, _) = app.post(&cancel_uri, Some(&token), json!({})).await;
        assert_eq!(status, StatusCode::CONFLICT);

        // feed: own rows only, cursor never repeats rows
        let (_, first) = app.get("/api/transactions/feed?limit=2", Some(&token)).await;
        let rows = first["transactions"].as_array().unwrap();
        assert_eq!(rows.len(), 2);
        let cursor = first["nextCursor"].as_i64().unwrap();
        let (_, second) = app
            .get(&format!("/api/transactions/feed?after={}", cursor), Some(&token))
            .await;
        for row in second["transactions"].as_array().unwrap() {
            assert!(row["seq"].as_i64().unwrap() > cursor);
            assert_eq!(row["memberId"], m.id.as_str());
        }

        let (_, history) = app
            .get("/api/transactions/my-transactions?type=withdrawal", Some(&token))
            .await;
        assert_eq!(history["total"], 1);
    }
}
