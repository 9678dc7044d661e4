//! Database Module
//! SQLite schema for members, wallet ledger, products, clone pages and documents

use anyhow::Result;
use sqlx::{sqlite::SqlitePoolOptions, Pool, Sqlite};
use tracing::info;

/// Database connection pool
pub type DbPool = Pool<Sqlite>;

/// Open (or create) the database file and apply the schema
pub async fn init_db(db_path: &str) -> Result<DbPool> {
    let db_url = format!("sqlite:{}?mode=rwc", db_path);

    info!("Initializing database: {}", db_path);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&db_url)
        .await?;

    create_schema(&pool).await?;

    info!("Database initialized successfully");
    Ok(pool)
}

/// In-memory database for tests. One connection only: every SQLite memory
/// connection is its own database.
pub async fn init_memory_db() -> Result<DbPool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;

    create_schema(&pool).await?;
    Ok(pool)
}

async fn create_schema(pool: &DbPool) -> Result<()> {
    // members: identity, sponsor tree, monoline position and wallet
    sqlx::query(r#"
        CREATE TABLE IF NOT EXISTS members (
            id TEXT PRIMARY KEY,
            member_id TEXT NOT NULL UNIQUE,
            referral_code TEXT NOT NULL UNIQUE,
            full_name TEXT NOT NULL,
            email TEXT NOT NULL UNIQUE,
            phone TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            role TEXT NOT NULL DEFAULT 'member',
            sponsor_id TEXT,
            sponsor_level INTEGER NOT NULL DEFAULT 0,
            is_active INTEGER NOT NULL DEFAULT 0,
            career_level TEXT NOT NULL DEFAULT 'Bronze',
            monoline_position INTEGER UNIQUE,
            membership_type TEXT NOT NULL DEFAULT 'entry',
            active_until_ms INTEGER,
            kyc_status TEXT NOT NULL DEFAULT 'pending',
            placement_bonus_paid INTEGER NOT NULL DEFAULT 0,
            balance INTEGER NOT NULL DEFAULT 0,
            total_earnings INTEGER NOT NULL DEFAULT 0,
            sponsor_bonus INTEGER NOT NULL DEFAULT 0,
            career_bonus INTEGER NOT NULL DEFAULT 0,
            passive_income INTEGER NOT NULL DEFAULT 0,
            leadership_bonus INTEGER NOT NULL DEFAULT 0,
            is_deleted INTEGER NOT NULL DEFAULT 0,
            created_at_ms INTEGER NOT NULL,
            updated_at_ms INTEGER NOT NULL,
            FOREIGN KEY (sponsor_id) REFERENCES members(id)
        )
    "#)
    .execute(pool)
    .await?;

    // sessions (bearer tokens)
    sqlx::query(r#"
        CREATE TABLE IF NOT EXISTS sessions (
            token TEXT PRIMARY KEY,
            member_id TEXT NOT NULL,
            created_at_ms INTEGER NOT NULL,
            expires_at_ms INTEGER NOT NULL,
            FOREIGN KEY (member_id) REFERENCES members(id)
        )
    "#)
    .execute(pool)
    .await?;

    // transactions: seq drives the polling feed cursor
    sqlx::query(r#"
        CREATE TABLE IF NOT EXISTS transactions (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT NOT NULL UNIQUE,
            member_id TEXT NOT NULL,
            tx_type TEXT NOT NULL,
            status TEXT NOT NULL,
            amount INTEGER NOT NULL,
            bonus_kind TEXT,
            counterparty_id TEXT,
            reference_id TEXT,
            description TEXT,
            balances_before TEXT NOT NULL,
            balances_after TEXT NOT NULL,
            risk_score INTEGER NOT NULL DEFAULT 0,
            created_at_ms INTEGER NOT NULL,
            processed_at_ms INTEGER,
            completed_at_ms INTEGER,
            FOREIGN KEY (member_id) REFERENCES members(id)
        )
    "#)
    .execute(pool)
    .await?;

    // products
    sqlx::query(r#"
        CREATE TABLE IF NOT EXISTS products (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            description TEXT,
            category TEXT NOT NULL DEFAULT 'general',
            price INTEGER NOT NULL,
            original_price INTEGER,
            image_url TEXT,
            rating REAL NOT NULL DEFAULT 0,
            reviews INTEGER NOT NULL DEFAULT 0,
            in_stock INTEGER NOT NULL DEFAULT 1,
            is_alive INTEGER NOT NULL DEFAULT 1,
            created_at_ms INTEGER NOT NULL,
            updated_at_ms INTEGER NOT NULL
        )
    "#)
    .execute(pool)
    .await?;

    // product_purchases
    sqlx::query(r#"
        CREATE TABLE IF NOT EXISTS product_purchases (
            id TEXT PRIMARY KEY,
            product_id TEXT NOT NULL,
            buyer_member_id TEXT,
            buyer_name TEXT,
            buyer_email TEXT,
            referral_code TEXT,
            sponsor_id TEXT,
            quantity INTEGER NOT NULL DEFAULT 1,
            amount INTEGER NOT NULL,
            payment_method TEXT NOT NULL,
            status TEXT NOT NULL,
            commission_total INTEGER NOT NULL DEFAULT 0,
            created_at_ms INTEGER NOT NULL,
            completed_at_ms INTEGER,
            FOREIGN KEY (product_id) REFERENCES products(id)
        )
    "#)
    .execute(pool)
    .await?;

    // clone_pages (one per member)
    sqlx::query(r#"
        CREATE TABLE IF NOT EXISTS clone_pages (
            member_id TEXT PRIMARY KEY,
            slug TEXT NOT NULL UNIQUE,
            visit_count INTEGER NOT NULL DEFAULT 0,
            conversion_count INTEGER NOT NULL DEFAULT 0,
            customizations TEXT NOT NULL DEFAULT '{}',
            updated_at_ms INTEGER NOT NULL,
            FOREIGN KEY (member_id) REFERENCES members(id)
        )
    "#)
    .execute(pool)
    .await?;

    // admin_logs (audit trail)
    sqlx::query(r#"
        CREATE TABLE IF NOT EXISTS admin_logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            admin_id TEXT NOT NULL,
            action TEXT NOT NULL,
            target_user_id TEXT,
            details TEXT NOT NULL DEFAULT '{}',
            timestamp_ms INTEGER NOT NULL
        )
    "#)
    .execute(pool)
    .await?;

    // documents (payment receipts, KYC files, shared documents)
    sqlx::query(r#"
        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            owner_id TEXT,
            kind TEXT NOT NULL,
            file_name TEXT NOT NULL,
            mime TEXT NOT NULL,
            size_bytes INTEGER NOT NULL,
            sha256 TEXT NOT NULL,
            storage_path TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            note TEXT,
            created_at_ms INTEGER NOT NULL,
            reviewed_at_ms INTEGER,
            reviewed_by TEXT
        )
    "#)
    .execute(pool)
    .await?;

    // payment_accounts (persisted bank / crypto accounts)
    sqlx::query(r#"
        CREATE TABLE IF NOT EXISTS payment_accounts (
            member_id TEXT PRIMARY KEY,
            account_holder TEXT,
            try_iban TEXT,
            usd_iban TEXT,
            eur_iban TEXT,
            usdt_trc20 TEXT,
            updated_at_ms INTEGER NOT NULL,
            FOREIGN KEY (member_id) REFERENCES members(id)
        )
    "#)
    .execute(pool)
    .await?;

    // training_progress
    sqlx::query(r#"
        CREATE TABLE IF NOT EXISTS training_progress (
            member_id TEXT NOT NULL,
            module_id TEXT NOT NULL,
            page INTEGER NOT NULL DEFAULT 0,
            completed INTEGER NOT NULL DEFAULT 0,
            updated_at_ms INTEGER NOT NULL,
            PRIMARY KEY (member_id, module_id),
            FOREIGN KEY (member_id) REFERENCES members(id)
        )
    "#)
    .execute(pool)
    .await?;

    // indexes
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_members_sponsor ON members(sponsor_id)")
        .execute(pool).await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_members_active_until ON members(active_until_ms)")
        .execute(pool).await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_sessions_expires ON sessions(expires_at_ms)")
        .execute(pool).await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_transactions_member ON transactions(member_id)")
        .execute(pool).await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_transactions_status ON transactions(status)")
        .execute(pool).await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_purchases_buyer ON product_purchases(buyer_member_id)")
        .execute(pool).await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_owner ON documents(owner_id)")
        .execute(pool).await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_admin_logs_target ON admin_logs(target_user_id)")
        .execute(pool).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_schema_is_idempotent() {
        let pool = init_memory_db().await.unwrap();
        create_schema(&pool).await.unwrap();

        let tables: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .unwrap();
        let names: Vec<&str> = tables.iter().map(|(n,)| n.as_str()).collect();
        assert!(names.contains(&"members"));
        assert!(names.contains(&"transactions"));
        assert!(names.contains(&"clone_pages"));
        assert!(names.contains(&"training_progress"));
    }
}
