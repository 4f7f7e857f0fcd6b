//! HTTP surface: upload, workspace editing, stored files and templates.

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{delete, get, patch, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use ingest::{
    ingest, template_csv, template_xlsx, CellValue, IngestResult, NewFileRecord,
    SemanticFieldMap,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::error::ApiError;
use crate::store::{FileStore, StoreError};
use crate::workspace::{is_local, local_file_id, EditError, Workspace, Workspaces};

const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

// ============================================================================
// State
// ============================================================================

pub struct AppState {
    pub store: Arc<dyn FileStore>,
    pub workspaces: Workspaces,
}

impl AppState {
    pub fn new(store: Arc<dyn FileStore>) -> Self {
        Self {
            store,
            workspaces: Workspaces::default(),
        }
    }
}

impl From<EditError> for ApiError {
    fn from(err: EditError) -> Self {
        ApiError::NotFound(err.to_string())
    }
}

// ============================================================================
// Request / response types
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    ok: bool,
    version: &'static str,
    storage: &'static str,
}

#[derive(Serialize)]
struct UploadResponse {
    workspace_id: Uuid,
    file_id: String,
    file_name: String,
    size: u64,
    persisted: bool,
    total_rows: usize,
    sheets: IngestResult,
    warnings: Vec<String>,
}

#[derive(Serialize)]
struct WorkspaceResponse {
    workspace_id: Uuid,
    #[serde(flatten)]
    workspace: Workspace,
}

#[derive(Serialize)]
struct SaveResponse {
    workspace_id: Uuid,
    file_id: String,
    created: bool,
    rows: usize,
}

#[derive(Serialize)]
struct FileResponse {
    id: String,
    name: String,
    size: u64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    sheets: IngestResult,
}

#[derive(Deserialize)]
struct CellEdit {
    sheet: String,
    row: usize,
    column: String,
    value: CellValue,
}

// ============================================================================
// Upload
// ============================================================================

struct Upload {
    file_name: String,
    mime: Option<String>,
    bytes: Vec<u8>,
}

async fn read_upload(multipart: &mut Multipart) -> Result<Upload, ApiError> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or("upload").to_string();
        let mime = field.content_type().map(str::to_string);
        let bytes = field.bytes().await.map_err(multipart_error)?.to_vec();
        return Ok(Upload {
            file_name,
            mime,
            bytes,
        });
    }
    Err(ApiError::BadRequest("missing multipart field 'file'".to_string()))
}

fn multipart_error(err: axum::extract::multipart::MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(err.body_text())
    } else {
        ApiError::BadRequest(err.body_text())
    }
}

async fn upload_handler(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let upload = read_upload(&mut multipart).await?;
    tracing::info!(file = %upload.file_name, bytes = upload.bytes.len(), "upload received");

    let ingestion = tokio::task::spawn_blocking(move || {
        ingest(&upload.bytes, &upload.file_name, upload.mime.as_deref())
    })
    .await
    .map_err(|e| ApiError::Internal(format!("ingestion task failed: {e}")))??;

    let mut warnings: Vec<String> = ingestion.warnings.iter().map(ToString::to_string).collect();

    let (file_id, persisted) = if ingestion.is_empty() {
        (local_file_id(), false)
    } else {
        match state.store.create(&NewFileRecord::from_ingestion(&ingestion)).await {
            Ok(id) => (id, true),
            Err(e) => {
                tracing::error!(
                    file = %ingestion.file_name,
                    error = %e,
                    "could not persist upload"
                );
                warnings.push(format!(
                    "the file was processed but could not be saved ({e}); use save to retry"
                ));
                (local_file_id(), false)
            }
        }
    };

    let total_rows = ingestion.total_rows();
    let workspace = Workspace::new(file_id, persisted, ingestion);
    let workspace_id = state.workspaces.insert(workspace.clone()).await;

    Ok(Json(UploadResponse {
        workspace_id,
        file_id: workspace.file_id,
        file_name: workspace.file_name,
        size: workspace.size,
        persisted,
        total_rows,
        sheets: workspace.sheets,
        warnings,
    }))
}

// ============================================================================
// Workspaces
// ============================================================================

fn workspace_not_found(id: Uuid) -> ApiError {
    ApiError::NotFound(format!("workspace {id} not found"))
}

async fn workspace_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<WorkspaceResponse>, ApiError> {
    let workspace = state
        .workspaces
        .snapshot(id)
        .await
        .ok_or_else(|| workspace_not_found(id))?;

    Ok(Json(WorkspaceResponse {
        workspace_id: id,
        workspace,
    }))
}

async fn edit_cell_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(edit): Json<CellEdit>,
) -> Result<StatusCode, ApiError> {
    state
        .workspaces
        .update(id, |ws| ws.edit_cell(&edit.sheet, edit.row, &edit.column, edit.value))
        .await
        .ok_or_else(|| workspace_not_found(id))??;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_row_handler(
    State(state): State<Arc<AppState>>,
    Path((id, sheet, row)): Path<(Uuid, String, usize)>,
) -> Result<StatusCode, ApiError> {
    state
        .workspaces
        .update(id, |ws| ws.delete_row(&sheet, row))
        .await
        .ok_or_else(|| workspace_not_found(id))??;
    Ok(StatusCode::NO_CONTENT)
}

/// Closing drops unsaved edits; the stored file is left alone.
async fn close_workspace_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let workspace = state
        .workspaces
        .remove(id)
        .await
        .ok_or_else(|| workspace_not_found(id))?;

    tracing::info!(workspace = %id, dirty = workspace.dirty, "workspace closed");
    Ok(StatusCode::NO_CONTENT)
}

/// Create the file when it was never stored, replace its rows otherwise.
/// A stored file that was deleted meanwhile is created again.
async fn save_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<SaveResponse>, ApiError> {
    let save_lock = state
        .workspaces
        .save_lock(id)
        .await
        .ok_or_else(|| workspace_not_found(id))?;
    let _saving = save_lock.lock().await;

    // Taken under the lock so a save that just finished is seen.
    let workspace = state
        .workspaces
        .snapshot(id)
        .await
        .ok_or_else(|| workspace_not_found(id))?;

    let record = workspace.record();
    let (file_id, created) = if is_local(&workspace.file_id) {
        (state.store.create(&record).await?, true)
    } else {
        match state.store.replace(&workspace.file_id, &record).await {
            Ok(()) => (workspace.file_id.clone(), false),
            Err(StoreError::NotFound(_)) => {
                tracing::warn!(
                    workspace = %id,
                    file = %workspace.file_id,
                    "stored file is gone, saving as a new file"
                );
                (state.store.create(&record).await?, true)
            }
            Err(e) => return Err(e.into()),
        }
    };

    let revision = workspace.revision();
    state
        .workspaces
        .update(id, |ws| ws.mark_saved(file_id.clone(), revision))
        .await
        .ok_or_else(|| workspace_not_found(id))?;

    tracing::info!(workspace = %id, file = %file_id, created, "workspace saved");
    Ok(Json(SaveResponse {
        workspace_id: id,
        file_id,
        created,
        rows: record.rows.len(),
    }))
}

async fn case_handler(
    State(state): State<Arc<AppState>>,
    Path((id, sheet, row)): Path<(Uuid, String, usize)>,
) -> Result<Json<SemanticFieldMap>, ApiError> {
    let workspace = state
        .workspaces
        .snapshot(id)
        .await
        .ok_or_else(|| workspace_not_found(id))?;

    Ok(Json(SemanticFieldMap::from_row(workspace.row(&sheet, row)?)))
}

// ============================================================================
// Stored files
// ============================================================================

async fn file_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<FileResponse>, ApiError> {
    let stored = state
        .store
        .get(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("file {id} not found")))?;

    Ok(Json(FileResponse {
        sheets: stored.record.regroup(),
        id: stored.id,
        name: stored.record.name,
        size: stored.record.size,
        created_at: stored.created_at,
        updated_at: stored.updated_at,
    }))
}

async fn delete_file_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.store.delete(&id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("file {id} not found")))
    }
}

// ============================================================================
// Misc
// ============================================================================

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        version: env!("CARGO_PKG_VERSION"),
        storage: state.store.kind(),
    })
}

async fn template_csv_handler() -> Result<impl IntoResponse, ApiError> {
    let body = template_csv()?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"modelo.csv\""),
        ],
        body,
    ))
}

async fn template_xlsx_handler() -> Result<impl IntoResponse, ApiError> {
    let body = template_xlsx()?;
    Ok((
        [
            (header::CONTENT_TYPE, XLSX_MIME),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"modelo.xlsx\""),
        ],
        body,
    ))
}

pub fn router(state: Arc<AppState>, max_upload_bytes: usize) -> Router {
    // CORS for web frontend
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/upload", post(upload_handler))
        .route(
            "/workspaces/:id",
            get(workspace_handler).delete(close_workspace_handler),
        )
        .route("/workspaces/:id/cells", patch(edit_cell_handler))
        .route("/workspaces/:id/save", post(save_handler))
        .route(
            "/workspaces/:id/sheets/:sheet/rows/:row",
            delete(delete_row_handler),
        )
        .route(
            "/workspaces/:id/sheets/:sheet/rows/:row/case",
            get(case_handler),
        )
        .route("/files/:id", get(file_handler).delete(delete_file_handler))
        .route("/template.csv", get(template_csv_handler))
        .route("/template.xlsx", get(template_xlsx_handler))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
