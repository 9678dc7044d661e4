use anyhow::Context;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use monoline_api::config::AppConfig;
use monoline_api::db::init_db;
use monoline_api::{bootstrap_admin, build_router, jobs, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env is optional
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sqlx=warn".into()),
        )
        .init();

    let config = AppConfig::from_env()?;

    tokio::fs::create_dir_all(config.data_dir.join("documents"))
        .await
        .with_context(|| format!("cannot create data dir {}", config.data_dir.display()))?;
    if let Some(parent) = Path::new(&config.database_path).parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    let db = init_db(&config.database_path).await?;
    let state = Arc::new(AppState { db, config });

    bootstrap_admin(&state).await?;
    let _maintenance = jobs::spawn_maintenance(state.clone());

    let app = build_router(state.clone());

    let addr = state.config.bind_addr.clone();
    info!("Monoline API listening on {}", addr);
    info!("Max upload size: {}MB", state.config.max_upload_mb);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("cannot bind {}", addr))?;
    axum::serve(listener, app).await?;
    Ok(())
}
