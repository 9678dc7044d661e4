//! Configuration
//! Environment-driven settings with local defaults

use anyhow::{Context, Result};
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_path: String,
    pub bind_addr: String,
    pub data_dir: PathBuf,
    pub public_base_url: String,
    pub session_ttl_hours: i64,
    pub max_upload_mb: usize,
    pub expiry_sweep_secs: u64,
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: "data/monoline.db".to_string(),
            bind_addr: "0.0.0.0:3000".to_string(),
            data_dir: PathBuf::from("data"),
            public_base_url: "http://localhost:3000".to_string(),
            session_ttl_hours: 168,
            max_upload_mb: 10,
            expiry_sweep_secs: 300,
            admin_email: None,
            admin_password: None,
        }
    }
}

impl AppConfig {
    /// Read settings from the process environment (after `.env` is loaded)
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env`, but with an injectable lookup so tests don't touch
    /// the real environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let session_ttl_hours = match lookup("SESSION_TTL_HOURS") {
            Some(v) => v.parse().context("SESSION_TTL_HOURS must be an integer")?,
            None => defaults.session_ttl_hours,
        };
        let max_upload_mb = match lookup("MAX_UPLOAD_MB") {
            Some(v) => v.parse().context("MAX_UPLOAD_MB must be an integer")?,
            None => defaults.max_upload_mb,
        };
        let expiry_sweep_secs = match lookup("EXPIRY_SWEEP_SECS") {
            Some(v) => v.parse().context("EXPIRY_SWEEP_SECS must be an integer")?,
            None => defaults.expiry_sweep_secs,
        };

        if session_ttl_hours <= 0 {
            anyhow::bail!("SESSION_TTL_HOURS must be positive");
        }
        if expiry_sweep_secs == 0 {
            anyhow::bail!("EXPIRY_SWEEP_SECS must be positive");
        }

        Ok(Self {
            database_path: lookup("DATABASE_PATH").unwrap_or(defaults.database_path),
            bind_addr: lookup("BIND_ADDR").unwrap_or(defaults.bind_addr),
            data_dir: lookup("DATA_DIR").map(PathBuf::from).unwrap_or(defaults.data_dir),
            public_base_url: lookup("PUBLIC_BASE_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(defaults.public_base_url),
            session_ttl_hours,
            max_upload_mb,
            expiry_sweep_secs,
            admin_email: lookup("ADMIN_EMAIL").filter(|v| !v.is_empty()),
            admin_password: lookup("ADMIN_PASSWORD").filter(|v| !v.is_empty()),
        })
    }

    pub fn session_ttl_ms(&self) -> i64 {
        self.session_ttl_hours * 60 * 60 * 1000
    }
}
