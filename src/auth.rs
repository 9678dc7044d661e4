//! Authentication
//! Password hashing, bearer sessions and the request extractors built on them

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use base64::Engine;
use rand::rngs::OsRng;
use rand::Rng;
use sqlx::SqliteConnection;
use std::sync::Arc;

use crate::error::{ApiError, ApiResult};
use crate::models::Member;
use crate::AppState;

const MIN_PASSWORD_LEN: usize = 6;

// ========================================
// Password hashing
// ========================================

/// Argon2id with library defaults, stored as a PHC string
pub fn hash_password(password: &str) -> ApiResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ApiError::Internal(format!("Password hashing failed: {}", e)))
}

pub fn verify_password(password: &str, stored: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

/// `hash_password` off the async workers
pub async fn hash_password_blocking(password: String) -> ApiResult<String> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| ApiError::Internal(format!("Password hashing task failed: {}", e)))?
}

/// `verify_password` off the async workers
pub async fn verify_password_blocking(password: String, stored: String) -> ApiResult<bool> {
    tokio::task::spawn_blocking(move || verify_password(&password, &stored))
        .await
        .map_err(|e| ApiError::Internal(format!("Password check task failed: {}", e)))
}

/// Registration rule from the signup wizard: matching passwords, minimum length
pub fn validate_new_password(password: &str, confirm: &str) -> ApiResult<()> {
    if password != confirm {
        return Err(ApiError::bad_request("Passwords do not match"));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::bad_request(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

// ========================================
// Sessions
// ========================================

pub fn generate_token() -> String {
    let bytes: [u8; 32] = rand::thread_rng().gen();
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

pub async fn create_session(
    conn: &mut SqliteConnection,
    member_id: &str,
    now_ms: i64,
    ttl_ms: i64,
) -> ApiResult<String> {
    let token = generate_token();
    sqlx::query(
        "INSERT INTO sessions (token, member_id, created_at_ms, expires_at_ms) VALUES (?, ?, ?, ?)",
    )
    .bind(&token)
    .bind(member_id)
    .bind(now_ms)
    .bind(now_ms + ttl_ms)
    .execute(&mut *conn)
    .await?;
    Ok(token)
}

pub async fn revoke_session(conn: &mut SqliteConnection, token: &str) -> ApiResult<()> {
    sqlx::query("DELETE FROM sessions WHERE token = ?")
        .bind(token)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

// ========================================
// Extractors
// ========================================

/// Any signed-in member
pub struct AuthUser {
    pub member: Member,
    pub token: String,
}

/// Signed-in member with the admin role
pub struct AdminUser(pub Member);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)
            .ok_or_else(|| ApiError::Unauthorized("Missing bearer token".to_string()))?
            .to_string();
        let now_ms = chrono::Utc::now().timestamp_millis();

        let member: Option<Member> = sqlx::query_as(
            r#"
            SELECT m.* FROM sessions s
            JOIN members m ON m.id = s.member_id
            WHERE s.token = ? AND s.expires_at_ms > ? AND m.is_deleted = 0
            "#,
        )
        .bind(&token)
        .bind(now_ms)
        .fetch_optional(&state.db)
        .await?;

        let member =
            member.ok_or_else(|| ApiError::Unauthorized("Invalid or expired session".to_string()))?;
        Ok(AuthUser { member, token })
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let AuthUser { member, .. } = AuthUser::from_request_parts(parts, state).await?;
        if !member.is_admin() {
            return Err(ApiError::forbidden("Admin role required"));
        }
        Ok(AdminUser(member))
    }
}

/// Members may read/write their own records; admins any record.
pub fn ensure_self_or_admin(user: &Member, target_id: &str) -> ApiResult<()> {
    if user.id == target_id || user.is_admin() {
        Ok(())
    } else {
        Err(ApiError::forbidden("Not allowed to access another member"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_roundtrip_and_salt() {
        let a = hash_password("secret1").unwrap();
        let b = hash_password("secret1").unwrap();
        assert_ne!(a, b);
        assert!(a.starts_with("$argon2id$"));
        assert!(verify_password("secret1", &a));
        assert!(!verify_password("secret2", &a));
    }

    #[test]
    fn test_verify_rejects_malformed() {
        assert!(!verify_password("x", ""));
        assert!(!verify_password("x", "md5$1$00$00"));
        assert!(!verify_password("x", "$argon2id$v=19$garbage"));
    }

    #[tokio::test]
    async fn test_blocking_helpers_agree() {
        let stored = hash_password_blocking("secret1".to_string()).await.unwrap();
        assert!(verify_password_blocking("secret1".to_string(), stored.clone())
            .await
            .unwrap());
        assert!(!verify_password_blocking("nope".to_string(), stored)
            .await
            .unwrap());
    }

    #[test]
    fn test_registration_password_rules() {
        assert!(validate_new_password("abcdef", "abcdef").is_ok());
        assert!(validate_new_password("abcdef", "abcdeg").is_err());
        assert!(validate_new_password("abcde", "abcde").is_err());
    }

    #[test]
    fn test_tokens_are_unique_urlsafe() {
        let t = generate_token();
        assert_eq!(t.len(), 43);
        assert!(!t.contains('+') && !t.contains('/'));
        assert_ne!(t, generate_token());
    }
}
