//! Documents API Handlers
//! Payment receipts, KYC files and admin-shared documents: upload, review, download

use axum::{
    body::Body,
    extract::{Multipart, Path, Query, State},
    http::header,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use sha2::{Digest, Sha256};
use sqlx::SqliteConnection;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::{info, warn};

use crate::auth::{AdminUser, AuthUser};
use crate::engine::MembershipType;
use crate::error::{ApiError, ApiResult};
use crate::models::{
    doc_kind, doc_status, kyc_status, ApproveDocumentRequest, Document, DocumentResponse,
    ListDocumentsQuery, RejectDocumentRequest,
};
use crate::network::activate_member;
use crate::store::{log_admin, require_member};
use crate::AppState;

use super::{now_ms, MessageResponse};

// ========================================
// Response Types
// ========================================

#[derive(Serialize)]
pub struct DocumentListResponse {
    pub success: bool,
    pub documents: Vec<DocumentResponse>,
    pub total: usize,
}

#[derive(Serialize)]
pub struct DocumentDetailResponse {
    pub success: bool,
    pub document: DocumentResponse,
}

// ========================================
// Upload helpers
// ========================================

/// Parsed multipart upload
pub struct Upload {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub kind: Option<String>,
    pub note: Option<String>,
}

async fn read_upload(mut multipart: Multipart) -> ApiResult<Upload> {
    let mut bytes: Option<Vec<u8>> = None;
    let mut file_name: Option<String> = None;
    let mut kind = None;
    let mut note = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        warn!("Field read error: {:?}", e);
        ApiError::bad_request(format!("Field read error: {}", e))
    })? {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" => {
                file_name = field.file_name().map(|s| s.to_string());
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("File read error: {}", e)))?;
                bytes = Some(data.to_vec());
            }
            "kind" | "note" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("{} error: {}", name, e)))?;
                if name == "kind" {
                    kind = Some(text);
                } else {
                    note = Some(text);
                }
            }
            _ => warn!("Unknown field: {}", name),
        }
    }

    let bytes = bytes.ok_or_else(|| ApiError::bad_request("No file uploaded"))?;
    if bytes.is_empty() {
        return Err(ApiError::bad_request("Uploaded file is empty"));
    }
    Ok(Upload {
        bytes,
        file_name: file_name.unwrap_or_else(|| "upload".to_string()),
        kind,
        note,
    })
}

/// Content type from the leading bytes; only images and PDFs are accepted
pub fn sniff_mime(bytes: &[u8]) -> Option<(&'static str, &'static str)> {
    use image::ImageFormat;

    if bytes.starts_with(b"%PDF-") {
        return Some(("application/pdf", "pdf"));
    }
    match image::guess_format(bytes).ok()? {
        ImageFormat::Png => Some(("image/png", "png")),
        ImageFormat::Jpeg => Some(("image/jpeg", "jpg")),
        ImageFormat::WebP => Some(("image/webp", "webp")),
        ImageFormat::Gif => Some(("image/gif", "gif")),
        _ => None,
    }
}

/// Header-safe version of a client file name
fn safe_file_name(name: &str) -> String {
    let cleaned: String = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or("")
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || "._-".contains(c) { c } else { '_' })
        .take(120)
        .collect();
    if cleaned.trim_matches('.').is_empty() {
        "document".to_string()
    } else {
        cleaned
    }
}

fn documents_dir(state: &AppState) -> PathBuf {
    state.config.data_dir.join("documents")
}

/// Writes the file under DATA_DIR/documents and inserts its row
async fn store_document(
    state: &AppState,
    owner_id: Option<&str>,
    kind: &str,
    status: &str,
    upload: &Upload,
    now_ms: i64,
) -> ApiResult<Document> {
    let (mime, ext) = sniff_mime(&upload.bytes).ok_or_else(|| {
        ApiError::bad_request("Unsupported file type (PNG, JPEG, WebP, GIF or PDF)")
    })?;
    let id = uuid::Uuid::new_v4().to_string();
    let sha256 = hex::encode(Sha256::digest(&upload.bytes));

    let dir = documents_dir(state);
    fs::create_dir_all(&dir).await?;
    let path = dir.join(format!("{}.{}", id, ext));
    let mut file = fs::File::create(&path).await?;
    file.write_all(&upload.bytes).await?;
    file.flush().await?;

    let storage_path = path.to_string_lossy().to_string();
    let inserted = sqlx::query(r#"
        INSERT INTO documents (
            id, owner_id, kind, file_name, mime, size_bytes, sha256,
            storage_path, status, note, created_at_ms
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
    "#)
    .bind(&id)
    .bind(owner_id)
    .bind(kind)
    .bind(safe_file_name(&upload.file_name))
    .bind(mime)
    .bind(upload.bytes.len() as i64)
    .bind(&sha256)
    .bind(&storage_path)
    .bind(status)
    .bind(&upload.note)
    .bind(now_ms)
    .execute(&state.db)
    .await;

    if let Err(e) = inserted {
        let _ = fs::remove_file(&path).await;
        return Err(e.into());
    }

    info!("Document stored: {} kind={} {} bytes", id, kind, upload.bytes.len());
    let mut conn = state.db.acquire().await?;
    require_document(&mut conn, &id).await
}

async fn require_document(conn: &mut SqliteConnection, id: &str) -> ApiResult<Document> {
    sqlx::query_as("SELECT * FROM documents WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Document not found: {}", id)))
}

fn to_responses(state: &AppState, docs: &[Document]) -> Vec<DocumentResponse> {
    docs.iter()
        .map(|d| DocumentResponse::from_document(d, &state.config.public_base_url))
        .collect()
}

// ========================================
// Member handlers
// ========================================

/// POST /api/auth/upload-receipt - Upload a payment receipt (or KYC file)
pub async fn upload_receipt(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    multipart: Multipart,
) -> ApiResult<Json<DocumentDetailResponse>> {
    let upload = read_upload(multipart).await?;
    let kind = match upload.kind.as_deref() {
        None | Some(doc_kind::PAYMENT_RECEIPT) => doc_kind::PAYMENT_RECEIPT,
        Some(doc_kind::KYC) => doc_kind::KYC,
        Some(other) => {
            return Err(ApiError::bad_request(format!("Unknown document kind: {}", other)))
        }
    };

    let doc = store_document(
        &state,
        Some(&user.member.id),
        kind,
        doc_status::PENDING,
        &upload,
        now_ms(),
    )
    .await?;

    Ok(Json(DocumentDetailResponse {
        success: true,
        document: DocumentResponse::from_document(&doc, &state.config.public_base_url),
    }))
}

/// GET /api/auth/member/documents - Own documents plus shared documents
pub async fn member_documents(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> ApiResult<Json<DocumentListResponse>> {
    let docs: Vec<Document> = sqlx::query_as(
        "SELECT * FROM documents WHERE owner_id = ? OR kind = ? ORDER BY created_at_ms DESC",
    )
    .bind(&user.member.id)
    .bind(doc_kind::SHARED)
    .fetch_all(&state.db)
    .await?;

    let documents = to_responses(&state, &docs);
    let total = documents.len();
    Ok(Json(DocumentListResponse {
        success: true,
        documents,
        total,
    }))
}

/// GET /api/documents/:id/file - Stream a document
pub async fn download(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let mut conn = state.db.acquire().await?;
    let doc = require_document(&mut conn, &id).await?;
    drop(conn);

    let allowed = doc.kind == doc_kind::SHARED
        || user.member.is_admin()
        || doc.owner_id.as_deref() == Some(user.member.id.as_str());
    if !allowed {
        return Err(ApiError::forbidden("Not allowed to read this document"));
    }

    let file = fs::File::open(&doc.storage_path).await.map_err(|e| {
        warn!("Document file missing: {} ({})", doc.storage_path, e);
        ApiError::not_found("Document file not found")
    })?;
    let body = Body::from_stream(ReaderStream::new(file));

    Ok((
        [
            (header::CONTENT_TYPE, doc.mime.clone()),
            (
                header::CONTENT_DISPOSITION,
                format!("inline; filename=\"{}\"", safe_file_name(&doc.file_name)),
            ),
        ],
        body,
    )
        .into_response())
}

// ========================================
// Admin handlers
// ========================================

/// GET /api/auth/admin/documents - List documents by kind / status
pub async fn admin_list(
    State(state): State<Arc<AppState>>,
    AdminUser(_admin): AdminUser,
    Query(query): Query<ListDocumentsQuery>,
) -> ApiResult<Json<DocumentListResponse>> {
    let docs: Vec<Document> = sqlx::query_as(r#"
        SELECT * FROM documents
        WHERE (?1 IS NULL OR kind = ?1) AND (?2 IS NULL OR status = ?2)
        ORDER BY created_at_ms DESC
    "#)
    .bind(&query.kind)
    .bind(&query.status)
    .fetch_all(&state.db)
    .await?;

    let documents = to_responses(&state, &docs);
    let total = documents.len();
    Ok(Json(DocumentListResponse {
        success: true,
        documents,
        total,
    }))
}

async fn require_pending(conn: &mut SqliteConnection, id: &str) -> ApiResult<Document> {
    let doc = require_document(conn, id).await?;
    if doc.status != doc_status::PENDING {
        return Err(ApiError::conflict(format!("Document is already {}", doc.status)));
    }
    Ok(doc)
}

async fn mark_reviewed(
    conn: &mut SqliteConnection,
    id: &str,
    status: &str,
    note: Option<&str>,
    admin_id: &str,
    now_ms: i64,
) -> ApiResult<()> {
    sqlx::query(
        "UPDATE documents SET status = ?, note = COALESCE(?, note), reviewed_at_ms = ?, reviewed_by = ? WHERE id = ?",
    )
    .bind(status)
    .bind(note)
    .bind(now_ms)
    .bind(admin_id)
    .bind(id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// POST /api/auth/admin/documents/:id/approve - Approve; a receipt activates its owner
pub async fn approve(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
    body: Option<Json<ApproveDocumentRequest>>,
) -> ApiResult<Json<DocumentDetailResponse>> {
    let now_ms = now_ms();
    let requested = body.and_then(|Json(b)| b.membership_type);

    let mut tx = state.db.begin().await?;
    let doc = require_pending(&mut tx, &id).await?;
    mark_reviewed(&mut tx, &doc.id, doc_status::APPROVED, None, &admin.id, now_ms).await?;

    let mut details = serde_json::json!({ "documentId": doc.id, "kind": doc.kind });
    if let Some(owner_id) = doc.owner_id.as_deref() {
        match doc.kind.as_str() {
            doc_kind::PAYMENT_RECEIPT => {
                let owner = require_member(&mut tx, owner_id).await?;
                let membership: MembershipType = requested
                    .as_deref()
                    .unwrap_or(owner.membership_type.as_str())
                    .parse()
                    .map_err(ApiError::BadRequest)?;
                let outcome = activate_member(&mut tx, owner_id, membership, now_ms).await?;
                details["membershipType"] = membership.as_str().into();
                details["activeUntil"] = outcome.active_until.into();
            }
            doc_kind::KYC => {
                sqlx::query("UPDATE members SET kyc_status = ?, updated_at_ms = ? WHERE id = ?")
                    .bind(kyc_status::VERIFIED)
                    .bind(now_ms)
                    .bind(owner_id)
                    .execute(&mut *tx)
                    .await?;
            }
            _ => {}
        }
    }

    log_admin(&mut tx, &admin.id, "document_approve", doc.owner_id.as_deref(), details, now_ms)
        .await?;
    let doc = require_document(&mut tx, &doc.id).await?;
    tx.commit().await?;

    info!("Document approved: {} by {}", doc.id, admin.member_id);
    Ok(Json(DocumentDetailResponse {
        success: true,
        document: DocumentResponse::from_document(&doc, &state.config.public_base_url),
    }))
}

/// POST /api/auth/admin/documents/:id/reject - Reject with an optional note
pub async fn reject(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
    body: Option<Json<RejectDocumentRequest>>,
) -> ApiResult<Json<DocumentDetailResponse>> {
    let now_ms = now_ms();
    let note = body.and_then(|Json(b)| b.note);

    let mut tx = state.db.begin().await?;
    let doc = require_pending(&mut tx, &id).await?;
    mark_reviewed(&mut tx, &doc.id, doc_status::REJECTED, note.as_deref(), &admin.id, now_ms)
        .await?;
    if doc.kind == doc_kind::KYC {
        if let Some(owner_id) = doc.owner_id.as_deref() {
            sqlx::query("UPDATE members SET kyc_status = ?, updated_at_ms = ? WHERE id = ?")
                .bind(kyc_status::REJECTED)
                .bind(now_ms)
                .bind(owner_id)
                .execute(&mut *tx)
                .await?;
        }
    }
    log_admin(
        &mut tx,
        &admin.id,
        "document_reject",
        doc.owner_id.as_deref(),
        serde_json::json!({ "documentId": doc.id, "note": note }),
        now_ms,
    )
    .await?;
    let doc = require_document(&mut tx, &doc.id).await?;
    tx.commit().await?;

    Ok(Json(DocumentDetailResponse {
        success: true,
        document: DocumentResponse::from_document(&doc, &state.config.public_base_url),
    }))
}

/// POST /api/auth/admin/documents/shared - Publish a document to every member
pub async fn upload_shared(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    multipart: Multipart,
) -> ApiResult<Json<DocumentDetailResponse>> {
    let upload = read_upload(multipart).await?;
    let now_ms = now_ms();
    let doc = store_document(&state, None, doc_kind::SHARED, doc_status::APPROVED, &upload, now_ms)
        .await?;

    let mut conn = state.db.acquire().await?;
    log_admin(
        &mut conn,
        &admin.id,
        "document_share",
        None,
        serde_json::json!({ "documentId": doc.id, "fileName": doc.file_name }),
        now_ms,
    )
    .await?;

    Ok(Json(DocumentDetailResponse {
        success: true,
        document: DocumentResponse::from_document(&doc, &state.config.public_base_url),
    }))
}

/// DELETE /api/auth/admin/documents/:id - Remove a document and its file
pub async fn admin_delete(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
) -> ApiResult<Json<MessageResponse>> {
    let now_ms = now_ms();
    let mut tx = state.db.begin().await?;
    let doc = require_document(&mut tx, &id).await?;
    sqlx::query("DELETE FROM documents WHERE id = ?")
        .bind(&doc.id)
        .execute(&mut *tx)
        .await?;
    log_admin(
        &mut tx,
        &admin.id,
        "document_delete",
        doc.owner_id.as_deref(),
        serde_json::json!({ "documentId": doc.id, "kind": doc.kind }),
        now_ms,
    )
    .await?;
    tx.commit().await?;

    if let Err(e) = fs::remove_file(&doc.storage_path).await {
        warn!("Failed to remove document file (not critical): {}", e);
    }
    info!("Document deleted: {}", doc.id);
    Ok(MessageResponse::ok(format!("Deleted {}", doc.id)))
}
