//! Products API Handlers
//! /api/products endpoints: catalog, admin maintenance, wallet purchase

use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use serde::Serialize;
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::info;

use crate::auth::{AdminUser, AuthUser};
use crate::engine::Distribution;
use crate::error::{ApiError, ApiResult};
use crate::ledger::MAX_TX_AMOUNT;
use crate::models::{
    page_window, CreateProductRequest, ListProductsQuery, MemberPurchaseRequest, Paginated,
    Product, ProductPurchase, ProductResponse, UpdateProductRequest,
};
use crate::purchases::{purchase_with_wallet, require_product};
use crate::store::log_admin;
use crate::AppState;

use super::{now_ms, MessageResponse};

// ========================================
// Response Types
// ========================================

#[derive(Serialize)]
pub struct ProductDetailResponse {
    pub success: bool,
    pub product: ProductResponse,
}

#[derive(Serialize)]
pub struct PurchaseResponse {
    pub success: bool,
    pub purchase: ProductPurchase,
    pub distribution: Distribution,
}

#[derive(Serialize)]
pub struct PurchaseListResponse {
    pub success: bool,
    pub purchases: Vec<ProductPurchase>,
}

// ========================================
// Catalog helpers
// ========================================

/// Whole-percent discount against the original price, 0 without a markdown
pub fn discount_percent(price: i64, original_price: Option<i64>) -> i64 {
    match original_price {
        Some(original) if original > price && original > 0 => {
            ((original - price) as f64 / original as f64 * 100.0).round() as i64
        }
        _ => 0,
    }
}

pub fn product_to_response(p: &Product) -> ProductResponse {
    ProductResponse {
        id: p.id.clone(),
        name: p.name.clone(),
        description: p.description.clone(),
        category: p.category.clone(),
        price: p.price,
        original_price: p.original_price,
        discount_percent: discount_percent(p.price, p.original_price),
        image_url: p.image_url.clone(),
        rating: p.rating,
        reviews: p.reviews,
        in_stock: p.in_stock,
        created_at: p.created_at_ms,
    }
}

/// Applies the catalog filters and sort order. Unknown sort keys keep
/// newest-first.
pub fn filter_products(products: Vec<Product>, query: &ListProductsQuery) -> Vec<Product> {
    let needle = query
        .search
        .as_deref()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty());

    let mut matched: Vec<Product> = products
        .into_iter()
        .filter(|p| {
            needle.as_ref().map_or(true, |n| {
                p.name.to_lowercase().contains(n)
                    || p.description
                        .as_deref()
                        .map_or(false, |d| d.to_lowercase().contains(n))
            })
        })
        .filter(|p| {
            query
                .category
                .as_deref()
                .map_or(true, |c| c == "all" || p.category.eq_ignore_ascii_case(c))
        })
        .filter(|p| query.in_stock.map_or(true, |s| p.in_stock == s))
        .filter(|p| query.min_price.map_or(true, |min| p.price >= min))
        .filter(|p| query.max_price.map_or(true, |max| p.price <= max))
        .collect();

    match query.sort.as_deref() {
        Some("price_asc") => matched.sort_by_key(|p| p.price),
        Some("price_desc") => matched.sort_by_key(|p| std::cmp::Reverse(p.price)),
        Some("rating") => matched.sort_by(|a, b| {
            b.rating
                .partial_cmp(&a.rating)
                .unwrap_or(Ordering::Equal)
                .then(b.reviews.cmp(&a.reviews))
        }),
        Some("discount") => matched.sort_by_key(|p| {
            std::cmp::Reverse(discount_percent(p.price, p.original_price))
        }),
        _ => matched.sort_by_key(|p| std::cmp::Reverse(p.created_at_ms)),
    }
    matched
}

fn validate_prices(price: i64, original_price: Option<i64>) -> ApiResult<()> {
    if price <= 0 {
        return Err(ApiError::bad_request("Price must be positive"));
    }
    if original_price.map_or(false, |o| o <= 0) {
        return Err(ApiError::bad_request("Original price must be positive"));
    }
    if price.max(original_price.unwrap_or(0)) > MAX_TX_AMOUNT {
        return Err(ApiError::bad_request("Price too large"));
    }
    Ok(())
}

// ========================================
// Handlers
// ========================================

/// GET /api/products - Catalog with search, filters, sort and paging
pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListProductsQuery>,
) -> ApiResult<Json<Paginated<ProductResponse>>> {
    let products: Vec<Product> = sqlx::query_as("SELECT * FROM products WHERE is_alive = 1")
        .fetch_all(&state.db)
        .await?;

    let matched = filter_products(products, &query);
    let (page, limit, offset) = page_window(query.page, query.limit);
    let total = matched.len() as i64;
    let items = matched
        .iter()
        .skip(offset as usize)
        .take(limit as usize)
        .map(product_to_response)
        .collect();

    Ok(Json(Paginated::new(items, total, page, limit)))
}

/// GET /api/products/:id - Product detail
pub async fn get_one(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<ProductDetailResponse>> {
    let mut conn = state.db.acquire().await?;
    let product = require_product(&mut conn, &id).await?;
    Ok(Json(ProductDetailResponse {
        success: true,
        product: product_to_response(&product),
    }))
}

/// POST /api/products - Create a product (admin)
pub async fn create(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Json(req): Json<CreateProductRequest>,
) -> ApiResult<Json<ProductDetailResponse>> {
    if req.name.trim().is_empty() {
        return Err(ApiError::bad_request("Product name is required"));
    }
    validate_prices(req.price, req.original_price)?;

    let now_ms = now_ms();
    let id = uuid::Uuid::new_v4().to_string();
    let mut tx = state.db.begin().await?;

    sqlx::query(r#"
        INSERT INTO products (
            id, name, description, category, price, original_price, image_url,
            rating, reviews, in_stock, created_at_ms, updated_at_ms
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
    "#)
    .bind(&id)
    .bind(req.name.trim())
    .bind(&req.description)
    .bind(req.category.trim().to_lowercase())
    .bind(req.price)
    .bind(req.original_price)
    .bind(&req.image_url)
    .bind(req.rating.clamp(0.0, 5.0))
    .bind(req.reviews.max(0))
    .bind(req.in_stock)
    .bind(now_ms)
    .bind(now_ms)
    .execute(&mut *tx)
    .await?;

    log_admin(
        &mut tx,
        &admin.id,
        "create_product",
        None,
        serde_json::json!({ "productId": id, "name": req.name.trim(), "price": req.price }),
        now_ms,
    )
    .await?;
    let product = require_product(&mut tx, &id).await?;
    tx.commit().await?;

    info!("Product created: {} ({})", product.name, product.id);
    Ok(Json(ProductDetailResponse {
        success: true,
        product: product_to_response(&product),
    }))
}

/// PUT /api/products/:id - Update a product (admin)
pub async fn update(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
    Json(req): Json<UpdateProductRequest>,
) -> ApiResult<Json<ProductDetailResponse>> {
    let now_ms = now_ms();
    let mut tx = state.db.begin().await?;
    let existing = require_product(&mut tx, &id).await?;

    let price = req.price.unwrap_or(existing.price);
    let original_price = req.original_price.or(existing.original_price);
    validate_prices(price, original_price)?;
    if req.name.as_deref().map_or(false, |n| n.trim().is_empty()) {
        return Err(ApiError::bad_request("Product name cannot be empty"));
    }

    sqlx::query(r#"
        UPDATE products SET
            name = COALESCE(?, name),
            description = COALESCE(?, description),
            category = COALESCE(?, category),
            price = ?,
            original_price = ?,
            image_url = COALESCE(?, image_url),
            rating = COALESCE(?, rating),
            reviews = COALESCE(?, reviews),
            in_stock = COALESCE(?, in_stock),
            updated_at_ms = ?
        WHERE id = ?
    "#)
    .bind(req.name.as_deref().map(str::trim))
    .bind(&req.description)
    .bind(req.category.as_deref().map(|c| c.trim().to_lowercase()))
    .bind(price)
    .bind(original_price)
    .bind(&req.image_url)
    .bind(req.rating.map(|r| r.clamp(0.0, 5.0)))
    .bind(req.reviews.map(|r| r.max(0)))
    .bind(req.in_stock)
    .bind(now_ms)
    .bind(&id)
    .execute(&mut *tx)
    .await?;

    log_admin(
        &mut tx,
        &admin.id,
        "update_product",
        None,
        serde_json::json!({ "productId": id, "price": price, "inStock": req.in_stock }),
        now_ms,
    )
    .await?;
    let product = require_product(&mut tx, &id).await?;
    tx.commit().await?;

    Ok(Json(ProductDetailResponse {
        success: true,
        product: product_to_response(&product),
    }))
}

/// DELETE /api/products/:id - Logical delete (admin)
pub async fn remove(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
) -> ApiResult<Json<MessageResponse>> {
    let now_ms = now_ms();
    let mut tx = state.db.begin().await?;
    let product = require_product(&mut tx, &id).await?;

    sqlx::query("UPDATE products SET is_alive = 0, updated_at_ms = ? WHERE id = ?")
        .bind(now_ms)
        .bind(&id)
        .execute(&mut *tx)
        .await?;
    log_admin(
        &mut tx,
        &admin.id,
        "delete_product",
        None,
        serde_json::json!({ "productId": id, "name": product.name }),
        now_ms,
    )
    .await?;
    tx.commit().await?;

    info!("Product deleted: {}", id);
    Ok(MessageResponse::ok("Product deleted"))
}

/// POST /api/products/:id/purchase - Buy with the wallet balance
pub async fn purchase(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(req): Json<MemberPurchaseRequest>,
) -> ApiResult<Json<PurchaseResponse>> {
    let now_ms = now_ms();
    let mut tx = state.db.begin().await?;
    let product = require_product(&mut tx, &id).await?;
    let (purchase, distribution) =
        purchase_with_wallet(&mut tx, &user.member, &product, req.quantity, now_ms).await?;
    tx.commit().await?;

    info!(
        "Purchase {}: {} x{} by {} (commissions {})",
        purchase.id, product.name, purchase.quantity, user.member.member_id, distribution.total_paid
    );
    Ok(Json(PurchaseResponse {
        success: true,
        purchase,
        distribution,
    }))
}

/// GET /api/products/purchases/my - Own purchase history
pub async fn my_purchases(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> ApiResult<Json<PurchaseListResponse>> {
    let purchases: Vec<ProductPurchase> = sqlx::query_as(
        "SELECT * FROM product_purchases WHERE buyer_member_id = ? ORDER BY created_at_ms DESC",
    )
    .bind(&user.member.id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(PurchaseListResponse {
        success: true,
        purchases,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::TestApp;
    use crate::ledger::adjust;
    use crate::store::test_support::{admin, member, reload};
    use axum::http::StatusCode;
    use serde_json::json;

    fn item(name: &str, price: i64, original: Option<i64>, created: i64) -> Product {
        Product {
            id: name.to_lowercase(),
            name: name.to_string(),
            description: None,
            category: "care".to_string(),
            price,
            original_price: original,
            image_url: None,
            rating: 4.0,
            reviews: 0,
            in_stock: true,
            is_alive: true,
            created_at_ms: created,
            updated_at_ms: created,
        }
    }

    fn query() -> ListProductsQuery {
        ListProductsQuery {
            search: None,
            category: None,
            in_stock: None,
            min_price: None,
            max_price: None,
            sort: None,
            page: None,
            limit: None,
        }
    }

    #[test]
    fn test_discount_percent() {
        assert_eq!(discount_percent(7_500, Some(10_000)), 25);
        assert_eq!(discount_percent(6_667, Some(10_000)), 33);
        assert_eq!(discount_percent(10_000, Some(10_000)), 0);
        assert_eq!(discount_percent(12_000, Some(10_000)), 0);
        assert_eq!(discount_percent(10_000, None), 0);
    }

    #[test]
    fn test_price_bounds() {
        assert!(validate_prices(29_900, Some(39_900)).is_ok());
        assert!(validate_prices(0, None).is_err());
        assert!(validate_prices(MAX_TX_AMOUNT + 1, None).is_err());
        assert!(validate_prices(100, Some(i64::MAX)).is_err());
    }

    #[test]
    fn test_filter_and_sort() {
        let catalog = vec![
            item("Serum", 5_000, Some(10_000), 1),
            item("Cream", 3_000, None, 2),
            item("Mask", 9_000, Some(10_000), 3),
        ];

        let newest = filter_products(catalog.clone(), &query());
        assert_eq!(newest[0].name, "Mask");

        let cheap_first = filter_products(
            catalog.clone(),
            &ListProductsQuery {
                sort: Some("price_asc".into()),
                max_price: Some(6_000),
                ..query()
            },
        );
        let names: Vec<_> = cheap_first.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["Cream", "Serum"]);

        let by_discount = filter_products(
            catalog.clone(),
            &ListProductsQuery {
                sort: Some("discount".into()),
                ..query()
            },
        );
        assert_eq!(by_discount[0].name, "Serum");

        let searched = filter_products(
            catalog,
            &ListProductsQuery {
                search: Some("SER".into()),
                ..query()
            },
        );
        assert_eq!(searched.len(), 1);
    }

    #[tokio::test]
    async fn test_admin_catalog_and_member_purchase() {
        let app = TestApp::new().await;
        let boss = admin(&app.state.db, "Shop Admin").await;
        let buyer = member(&app.state.db, "Shop Member", None).await;
        let admin_token = app.token_for(&boss).await;
        let buyer_token = app.token_for(&buyer).await;

        let body = json!({ "name": "Vitamin C", "price": 2_500, "originalPrice": 5_000 });
        let (status, _) = app.post("/api/products", Some(&buyer_token), body.clone()).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, created) = app.post("/api/products", Some(&admin_token), body).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(created["product"]["discountPercent"], 50);
        let product_id = created["product"]["id"].as_str().unwrap().to_string();

        let (status, updated) = app
            .put(
                &format!("/api/products/{}", product_id),
                Some(&admin_token),
                json!({ "price": 4_000 }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["product"]["discountPercent"], 20);

        let (status, _) = app
            .post(
                &format!("/api/products/{}/purchase", product_id),
                Some(&buyer_token),
                json!({ "quantity": 1 }),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        {
            let mut conn = app.state.db.acquire().await.unwrap();
            adjust(&mut conn, &buyer.id, "refund", 10_000, None, &boss.id, 0).await.unwrap();
        }
        let (status, bought) = app
            .post(
                &format!("/api/products/{}/purchase", product_id),
                Some(&buyer_token),
                json!({ "quantity": 2 }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(bought["purchase"]["amount"], 8_000);
        assert_eq!(reload(&app.state.db, &buyer).await.balance, 2_000);

        let (_, mine) = app.get("/api/products/purchases/my", Some(&buyer_token)).await;
        assert_eq!(mine["purchases"].as_array().unwrap().len(), 1);

        let (status, _) = app
            .delete(&format!("/api/products/{}", product_id), Some(&admin_token))
            .await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = app.get(&format!("/api/products/{}", product_id), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (_, listing) = app.get("/api/products", None).await;
        assert_eq!(listing["total"], 0);
    }
}
