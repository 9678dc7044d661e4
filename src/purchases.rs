//! Product purchases
//!
//! Member purchases are paid from the wallet and complete immediately.
//! Visitor purchases through a clone page stay pending until an admin
//! confirms the external payment. Either way commissions are distributed
//! exactly once, when the purchase reaches `completed`.

use sqlx::SqliteConnection;
use tracing::info;

use crate::engine::{distribute, CommissionEvent, Distribution, PayoutContext};
use crate::error::{ApiError, ApiResult};
use crate::ledger::{apply_distribution, debit_purchase, MAX_TX_AMOUNT};
use crate::models::{payment_method, purchase_status, Member, Product, ProductPurchase};
use crate::store::{get_member, payout_context};

const MAX_QUANTITY: i64 = 100;

pub async fn require_product(conn: &mut SqliteConnection, id: &str) -> ApiResult<Product> {
    sqlx::query_as("SELECT * FROM products WHERE id = ? AND is_alive = 1")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Product not found: {}", id)))
}

pub async fn require_purchase(conn: &mut SqliteConnection, id: &str) -> ApiResult<ProductPurchase> {
    sqlx::query_as("SELECT * FROM product_purchases WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Purchase not found: {}", id)))
}

/// Order total in minor units
pub fn order_amount(product: &Product, quantity: i64) -> ApiResult<i64> {
    if !(1..=MAX_QUANTITY).contains(&quantity) {
        return Err(ApiError::bad_request(format!(
            "Quantity must be between 1 and {}",
            MAX_QUANTITY
        )));
    }
    if !product.in_stock {
        return Err(ApiError::bad_request("Product is out of stock"));
    }
    product
        .price
        .checked_mul(quantity)
        .filter(|amount| *amount <= MAX_TX_AMOUNT)
        .ok_or_else(|| ApiError::bad_request("Amount too large"))
}

struct NewPurchase<'a> {
    product: &'a Product,
    buyer_member_id: Option<&'a str>,
    buyer_name: Option<&'a str>,
    buyer_email: Option<&'a str>,
    referral_code: Option<&'a str>,
    sponsor_id: Option<&'a str>,
    quantity: i64,
    amount: i64,
    payment_method: &'a str,
}

async fn insert_purchase(
    conn: &mut SqliteConnection,
    new: NewPurchase<'_>,
    now_ms: i64,
) -> ApiResult<ProductPurchase> {
    let id = uuid::Uuid::new_v4().to_string();
    sqlx::query(r#"
        INSERT INTO product_purchases (
            id, product_id, buyer_member_id, buyer_name, buyer_email, referral_code,
            sponsor_id, quantity, amount, payment_method, status, created_at_ms
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
    "#)
    .bind(&id)
    .bind(&new.product.id)
    .bind(new.buyer_member_id)
    .bind(new.buyer_name)
    .bind(new.buyer_email)
    .bind(new.referral_code)
    .bind(new.sponsor_id)
    .bind(new.quantity)
    .bind(new.amount)
    .bind(new.payment_method)
    .bind(purchase_status::PENDING)
    .bind(now_ms)
    .execute(&mut *conn)
    .await?;
    require_purchase(conn, &id).await
}

/// Wallet purchase by a signed-in member
pub async fn purchase_with_wallet(
    conn: &mut SqliteConnection,
    buyer: &Member,
    product: &Product,
    quantity: i64,
    now_ms: i64,
) -> ApiResult<(ProductPurchase, Distribution)> {
    let amount = order_amount(product, quantity)?;
    let purchase = insert_purchase(
        conn,
        NewPurchase {
            product,
            buyer_member_id: Some(&buyer.id),
            buyer_name: Some(&buyer.full_name),
            buyer_email: Some(&buyer.email),
            referral_code: None,
            sponsor_id: buyer.sponsor_id.as_deref(),
            quantity,
            amount,
            payment_method: payment_method::WALLET,
        },
        now_ms,
    )
    .await?;

    let description = format!("{} x{}", product.name, quantity);
    debit_purchase(conn, &buyer.id, amount, &purchase.id, &description, now_ms).await?;
    complete_purchase(conn, &purchase.id, now_ms).await
}

pub struct VisitorOrder<'a> {
    pub referrer: &'a Member,
    pub product: &'a Product,
    pub quantity: i64,
    pub buyer_name: &'a str,
    pub buyer_email: &'a str,
}

/// Visitor order through a clone page; counts as a conversion for the page
pub async fn purchase_as_visitor(
    conn: &mut SqliteConnection,
    order: VisitorOrder<'_>,
    now_ms: i64,
) -> ApiResult<ProductPurchase> {
    if order.buyer_name.trim().is_empty() || !order.buyer_email.contains('@') {
        return Err(ApiError::bad_request("Buyer name and a valid email are required"));
    }
    let amount = order_amount(order.product, order.quantity)?;
    let purchase = insert_purchase(
        conn,
        NewPurchase {
            product: order.product,
            buyer_member_id: None,
            buyer_name: Some(order.buyer_name.trim()),
            buyer_email: Some(order.buyer_email.trim()),
            referral_code: Some(&order.referrer.referral_code),
            sponsor_id: Some(&order.referrer.id),
            quantity: order.quantity,
            amount,
            payment_method: payment_method::EXTERNAL,
        },
        now_ms,
    )
    .await?;

    sqlx::query(
        "UPDATE clone_pages SET conversion_count = conversion_count + 1, updated_at_ms = ? WHERE member_id = ?",
    )
    .bind(now_ms)
    .bind(&order.referrer.id)
    .execute(&mut *conn)
    .await?;

    info!(
        "Visitor order {} via {} amount={}",
        purchase.id, order.referrer.referral_code, amount
    );
    Ok(purchase)
}

/// Completes a pending purchase and distributes its commissions.
/// Only the call that flips the status pays; later calls are conflicts.
pub async fn complete_purchase(
    conn: &mut SqliteConnection,
    purchase_id: &str,
    now_ms: i64,
) -> ApiResult<(ProductPurchase, Distribution)> {
    let purchase = require_purchase(conn, purchase_id).await?;
    let flipped = sqlx::query(
        "UPDATE product_purchases SET status = ?, completed_at_ms = ? WHERE id = ? AND status = ?",
    )
    .bind(purchase_status::COMPLETED)
    .bind(now_ms)
    .bind(purchase_id)
    .bind(purchase_status::PENDING)
    .execute(&mut *conn)
    .await?;
    if flipped.rows_affected() == 0 {
        return Err(ApiError::conflict(format!(
            "Purchase is already {}",
            purchase.status
        )));
    }

    let ctx = purchase_context(conn, &purchase, now_ms).await?;
    let distribution = distribute(purchase.amount, CommissionEvent::Purchase, &ctx);
    let paid = apply_distribution(conn, &distribution, &purchase.id, now_ms).await?;

    sqlx::query("UPDATE product_purchases SET commission_total = ? WHERE id = ?")
        .bind(paid)
        .bind(purchase_id)
        .execute(&mut *conn)
        .await?;

    Ok((require_purchase(conn, purchase_id).await?, distribution))
}

/// Member buyers anchor on themselves; visitor orders on the referrer.
async fn purchase_context(
    conn: &mut SqliteConnection,
    purchase: &ProductPurchase,
    now_ms: i64,
) -> ApiResult<PayoutContext> {
    if let Some(buyer_id) = &purchase.buyer_member_id {
        if let Some(buyer) = get_member(conn, buyer_id).await? {
            return payout_context(conn, &buyer, true, now_ms).await;
        }
    }
    if let Some(sponsor_id) = &purchase.sponsor_id {
        if let Some(referrer) = get_member(conn, sponsor_id).await? {
            return payout_context(conn, &referrer, false, now_ms).await;
        }
    }
    Ok(PayoutContext::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory_db;
    use crate::engine::MembershipType;
    use crate::ledger::adjust;
    use crate::network::activate_member;
    use crate::store::clone_page_for;
    use crate::store::test_support::{member, reload};

    async fn product(pool: &crate::db::DbPool, price: i64) -> Product {
        let id = uuid::Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO products (id, name, category, price, created_at_ms, updated_at_ms) VALUES (?, 'Serum', 'care', ?, 0, 0)",
        )
        .bind(&id)
        .bind(price)
        .execute(pool)
        .await
        .unwrap();
        let mut conn = pool.acquire().await.unwrap();
        require_product(&mut conn, &id).await.unwrap()
    }

    #[tokio::test]
    async fn test_wallet_purchase_pays_sponsor() {
        let pool = init_memory_db().await.unwrap();
        let sponsor = member(&pool, "Shop Sponsor", None).await;
        let buyer = member(&pool, "Shop Buyer", Some(&sponsor)).await;
        let item = product(&pool, 29_900).await;
        let now = chrono::Utc::now().timestamp_millis();

        let mut conn = pool.acquire().await.unwrap();
        activate_member(&mut conn, &sponsor.id, MembershipType::Yearly, now).await.unwrap();
        adjust(&mut conn, &buyer.id, "refund", 50_000, None, "admin", now).await.unwrap();
        let buyer = crate::store::require_member(&mut conn, &buyer.id).await.unwrap();

        let (purchase, dist) = purchase_with_wallet(&mut conn, &buyer, &item, 1, now).await.unwrap();
        assert_eq!(purchase.status, "completed");
        // unplaced buyer: the sponsor is also its nearest monoline predecessor
        assert_eq!(dist.paid_to(&sponsor.id), 4_485 + 1_495 + 149);
        assert_eq!(purchase.commission_total, 6_129);

        let again = complete_purchase(&mut conn, &purchase.id, now).await;
        assert!(matches!(again, Err(ApiError::Conflict(_))));
        drop(conn);

        assert_eq!(reload(&pool, &buyer).await.balance, 50_000 - 29_900);
    }

    #[tokio::test]
    async fn test_wallet_purchase_needs_funds() {
        let pool = init_memory_db().await.unwrap();
        let buyer = member(&pool, "Broke Buyer", None).await;
        let item = product(&pool, 1_000).await;
        let mut conn = pool.acquire().await.unwrap();
        let result = purchase_with_wallet(&mut conn, &buyer, &item, 1, 0).await;
        assert!(matches!(result, Err(ApiError::BadRequest(_))));
        assert!(order_amount(&item, 0).is_err());

        let mut pricey = item.clone();
        pricey.price = i64::MAX / 2;
        assert!(matches!(order_amount(&pricey, 3), Err(ApiError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_visitor_order_pending_then_approved() {
        let pool = init_memory_db().await.unwrap();
        let referrer = member(&pool, "Page Owner", None).await;
        let item = product(&pool, 10_000).await;
        let now = chrono::Utc::now().timestamp_millis();

        let mut conn = pool.acquire().await.unwrap();
        activate_member(&mut conn, &referrer.id, MembershipType::Entry, now).await.unwrap();
        let referrer = crate::store::require_member(&mut conn, &referrer.id).await.unwrap();
        let order = purchase_as_visitor(
            &mut conn,
            VisitorOrder {
                referrer: &referrer,
                product: &item,
                quantity: 2,
                buyer_name: "Guest",
                buyer_email: "guest@example.org",
            },
            now,
        )
        .await
        .unwrap();
        assert_eq!(order.status, "pending");
        assert_eq!(order.amount, 20_000);
        let page = clone_page_for(&mut conn, &referrer.id).await.unwrap().unwrap();
        assert_eq!(page.conversion_count, 1);

        let (done, dist) = complete_purchase(&mut conn, &order.id, now).await.unwrap();
        assert_eq!(done.status, "completed");
        // the referrer takes the direct-sponsor slot
        assert_eq!(dist.paid_to(&referrer.id), 3_000 + 1_000);
    }
}
