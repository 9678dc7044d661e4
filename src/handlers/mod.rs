//! HTTP handlers, one module per API area

pub mod admin;
pub mod auth;
pub mod clone_pages;
pub mod documents;
pub mod members;
pub mod mlm;
pub mod products;
pub mod transactions;

use axum::response::Json;
use serde::Serialize;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

impl MessageResponse {
    pub fn ok(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            success: true,
            message: message.into(),
        })
    }
}

/// GET /api/health - Health check
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Router-level helpers: real router over an in-memory database

    use axum::{
        body::{to_bytes, Body},
        http::{header, Method, Request, StatusCode},
        Router,
    };
    use serde_json::Value;
    use std::sync::Arc;
    use tower::ServiceExt;

    use crate::auth::create_session;
    use crate::config::AppConfig;
    use crate::db::init_memory_db;
    use crate::models::Member;
    use crate::{build_router, AppState};

    pub struct TestApp {
        pub state: Arc<AppState>,
        pub router: Router,
        _data_dir: tempfile::TempDir,
    }

    impl TestApp {
        pub async fn new() -> Self {
            let data_dir = tempfile::tempdir().unwrap();
            let config = AppConfig {
                data_dir: data_dir.path().to_path_buf(),
                ..AppConfig::default()
            };
            let state = Arc::new(AppState {
                db: init_memory_db().await.unwrap(),
                config,
            });
            let router = build_router(state.clone());
            Self {
                state,
                router,
                _data_dir: data_dir,
            }
        }

        pub async fn token_for(&self, member: &Member) -> String {
            let mut conn = self.state.db.acquire().await.unwrap();
            create_session(&mut conn, &member.id, super::now_ms(), 3_600_000)
                .await
                .unwrap()
        }

        pub async fn request(
            &self,
            method: Method,
            uri: &str,
            token: Option<&str>,
            body: Option<Value>,
        ) -> (StatusCode, Value) {
            let mut builder = Request::builder().method(method).uri(uri);
            if let Some(token) = token {
                builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
            }
            let request = match body {
                Some(json) => builder
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(json.to_string()))
                    .unwrap(),
                None => builder.body(Body::empty()).unwrap(),
            };
            let response = self.router.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
            (status, value)
        }

        pub async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
            self.request(Method::GET, uri, token, None).await
        }

        pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
            self.request(Method::POST, uri, token, Some(body)).await
        }

        pub async fn put(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
            self.request(Method::PUT, uri, token, Some(body)).await
        }

        pub async fn delete(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
            self.request(Method::DELETE, uri, token, None).await
        }
    }
}
