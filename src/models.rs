//! Data Models
//! Member, Transaction, Product, ClonePage, Document: DB rows and API bodies

use serde::{Deserialize, Serialize};

use crate::engine::plan::{career_level_by_name, CareerLevel};

// ========================================
// Status Constants
// ========================================

pub mod role {
    pub const ADMIN: &str = "admin";
    pub const LEADER: &str = "leader";
    pub const MEMBER: &str = "member";
    pub const VISITOR: &str = "visitor";

    pub fn is_valid(role: &str) -> bool {
        matches!(role, ADMIN | LEADER | MEMBER | VISITOR)
    }
}

pub mod tx_type {
    pub const DEPOSIT: &str = "deposit";
    pub const WITHDRAWAL: &str = "withdrawal";
    pub const COMMISSION: &str = "commission";
    pub const BONUS: &str = "bonus";
    pub const TRANSFER: &str = "transfer";
    pub const PURCHASE: &str = "purchase";
    pub const REFUND: &str = "refund";
    pub const PENALTY: &str = "penalty";

    pub fn is_valid(t: &str) -> bool {
        matches!(
            t,
            DEPOSIT | WITHDRAWAL | COMMISSION | BONUS | TRANSFER | PURCHASE | REFUND | PENALTY
        )
    }
}

pub mod kyc_status {
    pub const PENDING: &str = "pending";
    pub const VERIFIED: &str = "verified";
    pub const REJECTED: &str = "rejected";

    pub fn is_valid(s: &str) -> bool {
        matches!(s, PENDING | VERIFIED | REJECTED)
    }
}

pub mod doc_kind {
    pub const PAYMENT_RECEIPT: &str = "payment_receipt";
    pub const KYC: &str = "kyc";
    pub const SHARED: &str = "shared";
}

pub mod doc_status {
    pub const PENDING: &str = "pending";
    pub const APPROVED: &str = "approved";
    pub const REJECTED: &str = "rejected";
}

pub mod purchase_status {
    pub const PENDING: &str = "pending";
    pub const COMPLETED: &str = "completed";
    pub const CANCELLED: &str = "cancelled";
}

pub mod payment_method {
    pub const WALLET: &str = "wallet";
    pub const EXTERNAL: &str = "external";
}

// ========================================
// Member
// ========================================

/// Member (DB row)
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Member {
    pub id: String,
    pub member_id: String,
    pub referral_code: String,
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub password_hash: String,
    pub role: String,
    pub sponsor_id: Option<String>,
    pub sponsor_level: i64,
    pub is_active: bool,
    pub career_level: String,
    pub monoline_position: Option<i64>,
    pub membership_type: String,
    pub active_until_ms: Option<i64>,
    pub kyc_status: String,
    pub placement_bonus_paid: bool,
    pub balance: i64,
    pub total_earnings: i64,
    pub sponsor_bonus: i64,
    pub career_bonus: i64,
    pub passive_income: i64,
    pub leadership_bonus: i64,
    pub is_deleted: bool,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

impl Member {
    pub fn is_admin(&self) -> bool {
        self.role == role::ADMIN
    }

    pub fn wallet(&self) -> WalletSnapshot {
        WalletSnapshot {
            balance: self.balance,
            total_earnings: self.total_earnings,
            sponsor_bonus: self.sponsor_bonus,
            career_bonus: self.career_bonus,
            passive_income: self.passive_income,
            leadership_bonus: self.leadership_bonus,
        }
    }

    pub fn career(&self) -> &'static CareerLevel {
        career_level_by_name(&self.career_level)
    }

    /// Active flag and an unexpired renewal window are both required to earn
    pub fn is_earning(&self, now_ms: i64) -> bool {
        self.is_active && !self.is_deleted && self.active_until_ms.map_or(false, |t| t > now_ms)
    }
}

/// Wallet balances, also used as the before/after snapshot of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletSnapshot {
    pub balance: i64,
    pub total_earnings: i64,
    pub sponsor_bonus: i64,
    pub career_bonus: i64,
    pub passive_income: i64,
    pub leadership_bonus: i64,
}

impl WalletSnapshot {
    pub fn earnings_consistent(&self) -> bool {
        self.total_earnings
            == self.sponsor_bonus + self.career_bonus + self.passive_income + self.leadership_bonus
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CareerLevelResponse {
    pub name: String,
    pub commission_rate: f64,
    pub passive_income_rate: f64,
    pub min_direct_referrals: i64,
    pub min_team_size: i64,
    pub leadership_eligible: bool,
}

impl From<&CareerLevel> for CareerLevelResponse {
    fn from(level: &CareerLevel) -> Self {
        Self {
            name: level.name.to_string(),
            commission_rate: f64::from(level.commission_bps) / 100.0,
            passive_income_rate: f64::from(level.passive_bps) / 100.0,
            min_direct_referrals: level.min_direct_referrals,
            min_team_size: level.min_team_size,
            leadership_eligible: level.leadership_eligible,
        }
    }
}

/// Member response (API shape, never carries password_hash)
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberResponse {
    pub id: String,
    pub member_id: String,
    pub referral_code: String,
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub role: String,
    pub sponsor_id: Option<String>,
    pub is_active: bool,
    pub career_level: CareerLevelResponse,
    pub monoline_position: Option<i64>,
    pub membership_type: String,
    pub active_until: Option<i64>,
    pub kyc_status: String,
    pub wallet: WalletSnapshot,
    pub created_at: i64,
    /// Filled on profile views only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direct_referrals: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_team_size: Option<i64>,
}

impl MemberResponse {
    pub fn with_team(mut self, direct_referrals: i64, total_team_size: i64) -> Self {
        self.direct_referrals = Some(direct_referrals);
        self.total_team_size = Some(total_team_size);
        self
    }
}

impl From<&Member> for MemberResponse {
    fn from(m: &Member) -> Self {
        Self {
            id: m.id.clone(),
            member_id: m.member_id.clone(),
            referral_code: m.referral_code.clone(),
            full_name: m.full_name.clone(),
            email: m.email.clone(),
            phone: m.phone.clone(),
            role: m.role.clone(),
            sponsor_id: m.sponsor_id.clone(),
            is_active: m.is_active,
            career_level: m.career().into(),
            monoline_position: m.monoline_position,
            membership_type: m.membership_type.clone(),
            active_until: m.active_until_ms,
            kyc_status: m.kyc_status.clone(),
            wallet: m.wallet(),
            created_at: m.created_at_ms,
            direct_referrals: None,
            total_team_size: None,
        }
    }
}

/// Registration wizard payload (personal info, package, agreements, sponsor)
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub password: String,
    pub confirm_password: String,
    #[serde(default = "default_membership_type")]
    pub membership_type: String,
    #[serde(default)]
    pub accept_terms: bool,
    #[serde(default)]
    pub accept_privacy: bool,
    pub referral_code: Option<String>,
}

fn default_membership_type() -> String { "entry".to_string() }

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    /// email or memberId
    pub identifier: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    pub full_name: Option<String>,
    pub phone: Option<String>,
}

// ========================================
// Admin user management
// ========================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminCreateUserRequest {
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub password: String,
    #[serde(default = "default_role")]
    pub role: String,
    pub sponsor_id: Option<String>,
    #[serde(default = "default_membership_type")]
    pub membership_type: String,
}

fn default_role() -> String { role::MEMBER.to_string() }

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminUpdateUserRequest {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub role: Option<String>,
    pub kyc_status: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveUserRequest {
    pub new_sponsor_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListUsersQuery {
    pub search: Option<String>,
    pub role: Option<String>,
    /// "active" | "inactive"
    pub status: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// AdminLog (DB row)
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct AdminLog {
    pub id: i64,
    pub admin_id: String,
    pub action: String,
    pub target_user_id: Option<String>,
    pub details: String,
    #[serde(rename = "timestamp")]
    pub timestamp_ms: i64,
}

// ========================================
// MLM
// ========================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivateRequest {
    pub user_id: String,
    pub membership_type: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculateRequest {
    pub amount: i64,
    /// "purchase" | "activation"
    pub event: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacementBonusRequest {
    pub user_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonolineStats {
    pub user_id: String,
    pub monoline_position: Option<i64>,
    pub network_depth: i64,
    pub direct_referrals: i64,
    pub total_team_size: i64,
    pub members_ahead: i64,
    pub members_behind: i64,
    pub career_level: CareerLevelResponse,
    pub is_active: bool,
    pub active_until: Option<i64>,
}

// ========================================
// Transaction
// ========================================

/// Transaction (DB row)
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Transaction {
    pub seq: i64,
    pub id: String,
    pub member_id: String,
    pub tx_type: String,
    pub status: String,
    pub amount: i64,
    pub bonus_kind: Option<String>,
    pub counterparty_id: Option<String>,
    pub reference_id: Option<String>,
    pub description: Option<String>,
    pub balances_before: String,
    pub balances_after: String,
    pub risk_score: i64,
    pub created_at_ms: i64,
    pub processed_at_ms: Option<i64>,
    pub completed_at_ms: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionResponse {
    pub id: String,
    pub seq: i64,
    pub member_id: String,
    #[serde(rename = "type")]
    pub tx_type: String,
    pub status: String,
    pub amount: i64,
    pub bonus_kind: Option<String>,
    pub counterparty_id: Option<String>,
    pub reference_id: Option<String>,
    pub description: Option<String>,
    pub balances_before: WalletSnapshot,
    pub balances_after: WalletSnapshot,
    pub risk_score: i64,
    pub created_at: i64,
    pub processed_at: Option<i64>,
    pub completed_at: Option<i64>,
}

impl From<&Transaction> for TransactionResponse {
    fn from(t: &Transaction) -> Self {
        Self {
            id: t.id.clone(),
            seq: t.seq,
            member_id: t.member_id.clone(),
            tx_type: t.tx_type.clone(),
            status: t.status.clone(),
            amount: t.amount,
            bonus_kind: t.bonus_kind.clone(),
            counterparty_id: t.counterparty_id.clone(),
            reference_id: t.reference_id.clone(),
            description: t.description.clone(),
            balances_before: serde_json::from_str(&t.balances_before).unwrap_or_default(),
            balances_after: serde_json::from_str(&t.balances_after).unwrap_or_default(),
            risk_score: t.risk_score,
            created_at: t.created_at_ms,
            processed_at: t.processed_at_ms,
            completed_at: t.completed_at_ms,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTransactionRequest {
    #[serde(rename = "type")]
    pub tx_type: String,
    pub amount: i64,
    pub to_member_id: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListTransactionsQuery {
    #[serde(rename = "type")]
    pub tx_type: Option<String>,
    pub status: Option<String>,
    pub member_id: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct FeedQuery {
    pub after: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTxStatusRequest {
    pub status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdjustmentRequest {
    pub member_id: String,
    /// "refund" | "penalty"
    pub kind: String,
    pub amount: i64,
    pub description: Option<String>,
}

// ========================================
// Product
// ========================================

/// Product (DB row)
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub category: String,
    pub price: i64,
    pub original_price: Option<i64>,
    pub image_url: Option<String>,
    pub rating: f64,
    pub reviews: i64,
    pub in_stock: bool,
    pub is_alive: bool,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductResponse {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub category: String,
    pub price: i64,
    pub original_price: Option<i64>,
    pub discount_percent: i64,
    pub image_url: Option<String>,
    pub rating: f64,
    pub reviews: i64,
    pub in_stock: bool,
    pub created_at: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProductRequest {
    pub name: String,
    pub description: Option<String>,
    #[serde(default = "default_category")]
    pub category: String,
    pub price: i64,
    pub original_price: Option<i64>,
    pub image_url: Option<String>,
    #[serde(default)]
    pub rating: f64,
    #[serde(default)]
    pub reviews: i64,
    #[serde(default = "default_true")]
    pub in_stock: bool,
}

fn default_category() -> String { "general".to_string() }
fn default_true() -> bool { true }

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub price: Option<i64>,
    pub original_price: Option<i64>,
    pub image_url: Option<String>,
    pub rating: Option<f64>,
    pub reviews: Option<i64>,
    pub in_stock: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListProductsQuery {
    pub search: Option<String>,
    pub category: Option<String>,
    pub in_stock: Option<bool>,
    pub min_price: Option<i64>,
    pub max_price: Option<i64>,
    pub sort: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// ProductPurchase (DB row)
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ProductPurchase {
    pub id: String,
    pub product_id: String,
    pub buyer_member_id: Option<String>,
    pub buyer_name: Option<String>,
    pub buyer_email: Option<String>,
    pub referral_code: Option<String>,
    pub sponsor_id: Option<String>,
    pub quantity: i64,
    pub amount: i64,
    pub payment_method: String,
    pub status: String,
    pub commission_total: i64,
    #[serde(rename = "createdAt")]
    pub created_at_ms: i64,
    #[serde(rename = "completedAt")]
    pub completed_at_ms: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct MemberPurchaseRequest {
    #[serde(default = "default_quantity")]
    pub quantity: i64,
}

fn default_quantity() -> i64 { 1 }

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitorPurchaseRequest {
    pub referral_code: String,
    pub product_id: String,
    #[serde(default = "default_quantity")]
    pub quantity: i64,
    pub buyer_name: String,
    pub buyer_email: String,
}

// ========================================
// Clone Page
// ========================================

/// ClonePage (DB row)
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ClonePage {
    pub member_id: String,
    pub slug: String,
    pub visit_count: i64,
    pub conversion_count: i64,
    pub customizations: String,
    pub updated_at_ms: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClonePageStats {
    pub slug: String,
    pub visit_count: i64,
    pub conversion_count: i64,
    /// conversions per 100 visits
    pub conversion_rate: f64,
    pub customizations: serde_json::Value,
}

impl From<&ClonePage> for ClonePageStats {
    fn from(p: &ClonePage) -> Self {
        let conversion_rate = if p.visit_count > 0 {
            (p.conversion_count as f64 / p.visit_count as f64 * 10000.0).round() / 100.0
        } else {
            0.0
        };
        Self {
            slug: p.slug.clone(),
            visit_count: p.visit_count,
            conversion_count: p.conversion_count,
            conversion_rate,
            customizations: serde_json::from_str(&p.customizations)
                .unwrap_or_else(|_| serde_json::json!({})),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateCloneRequest {
    pub customizations: serde_json::Value,
}

// ========================================
// Documents
// ========================================

/// Document (DB row)
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Document {
    pub id: String,
    pub owner_id: Option<String>,
    pub kind: String,
    pub file_name: String,
    pub mime: String,
    pub size_bytes: i64,
    pub sha256: String,
    pub storage_path: String,
    pub status: String,
    pub note: Option<String>,
    pub created_at_ms: i64,
    pub reviewed_at_ms: Option<i64>,
    pub reviewed_by: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentResponse {
    pub id: String,
    pub owner_id: Option<String>,
    pub kind: String,
    pub file_name: String,
    pub mime: String,
    pub size_bytes: i64,
    pub sha256: String,
    pub status: String,
    pub note: Option<String>,
    pub url: String,
    pub created_at: i64,
    pub reviewed_at: Option<i64>,
}

impl DocumentResponse {
    pub fn from_document(doc: &Document, base_url: &str) -> Self {
        Self {
            id: doc.id.clone(),
            owner_id: doc.owner_id.clone(),
            kind: doc.kind.clone(),
            file_name: doc.file_name.clone(),
            mime: doc.mime.clone(),
            size_bytes: doc.size_bytes,
            sha256: doc.sha256.clone(),
            status: doc.status.clone(),
            note: doc.note.clone(),
            url: format!("{}/api/documents/{}/file", base_url, doc.id),
            created_at: doc.created_at_ms,
            reviewed_at: doc.reviewed_at_ms,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApproveDocumentRequest {
    pub membership_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RejectDocumentRequest {
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListDocumentsQuery {
    pub kind: Option<String>,
    pub status: Option<String>,
}

// ========================================
// Payment accounts / training progress
// ========================================

/// PaymentAccounts (DB row)
#[derive(Debug, Clone, Default, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PaymentAccounts {
    #[serde(skip_deserializing)]
    pub member_id: String,
    pub account_holder: Option<String>,
    pub try_iban: Option<String>,
    pub usd_iban: Option<String>,
    pub eur_iban: Option<String>,
    pub usdt_trc20: Option<String>,
    #[serde(skip_deserializing, rename = "updatedAt")]
    pub updated_at_ms: i64,
}

/// TrainingProgress (DB row)
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TrainingProgress {
    pub member_id: String,
    pub module_id: String,
    pub page: i64,
    pub completed: bool,
    #[serde(rename = "updatedAt")]
    pub updated_at_ms: i64,
}

#[derive(Debug, Deserialize)]
pub struct TrainingProgressRequest {
    pub page: i64,
    #[serde(default)]
    pub completed: bool,
}

// ========================================
// Pagination
// ========================================

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;

/// Normalized (page, limit, offset) from optional query values
pub fn page_window(page: Option<i64>, limit: Option<i64>) -> (i64, i64, i64) {
    let page = page.unwrap_or(1).clamp(1, i64::MAX / MAX_PAGE_SIZE);
    let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    (page, limit, (page - 1) * limit)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Paginated<T> {
    pub success: bool,
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
    pub total_pages: i64,
}

impl<T> Paginated<T> {
    pub fn new(items: Vec<T>, total: i64, page: i64, limit: i64) -> Self {
        let total_pages = if total == 0 { 0 } else { (total + limit - 1) / limit };
        Self {
            success: true,
            items,
            total,
            page,
            limit,
            total_pages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_window_clamps() {
        assert_eq!(page_window(None, None), (1, 20, 0));
        assert_eq!(page_window(Some(0), Some(1000)), (1, 100, 0));
        assert_eq!(page_window(Some(3), Some(10)), (3, 10, 20));

        let (page, limit, offset) = page_window(Some(i64::MAX), Some(i64::MAX));
        assert_eq!(limit, MAX_PAGE_SIZE);
        assert_eq!(offset, (page - 1) * MAX_PAGE_SIZE);
    }

    #[test]
    fn test_paginated_total_pages() {
        let p: Paginated<i32> = Paginated::new(vec![], 0, 1, 20);
        assert_eq!(p.total_pages, 0);
        let p: Paginated<i32> = Paginated::new(vec![1], 41, 1, 20);
        assert_eq!(p.total_pages, 3);
    }

    #[test]
    fn test_wallet_consistency() {
        let w = WalletSnapshot {
            balance: 10,
            total_earnings: 6,
            sponsor_bonus: 1,
            career_bonus: 2,
            passive_income: 3,
            leadership_bonus: 0,
        };
        assert!(w.earnings_consistent());
        assert!(!WalletSnapshot { total_earnings: 7, ..w }.earnings_consistent());
    }

    #[test]
    fn test_conversion_rate() {
        let page = ClonePage {
            member_id: "m".into(),
            slug: "abc".into(),
            visit_count: 3,
            conversion_count: 1,
            customizations: "not json".into(),
            updated_at_ms: 0,
        };
        let stats = ClonePageStats::from(&page);
        assert_eq!(stats.conversion_rate, 33.33);
        assert_eq!(stats.customizations, serde_json::json!({}));
    }
}
