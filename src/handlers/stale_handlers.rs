//! Uploads that delete themselves unless kept.

use axum::{
    Json,
    extract::{Multipart, Path, State},
    response::IntoResponse,
};
use serde_json::json;
use tracing::debug;

use crate::{
    errors::AppError, handlers::file_handlers::read_upload, models::document::FileDocument,
    services::file_service::FileService, state::AppState,
};

/// POST `/stale` — store an upload and schedule its deletion.
pub async fn stale_file(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<FileDocument>, AppError> {
    let upload = read_upload(multipart, state.max_file_size).await?;
    let kind = FileService::kind_for(&upload.content_type)?;
    let document = state
        .files
        .upload(kind, upload.body, &upload.content_type, &upload.filename)
        .await?;

    state
        .scheduler
        .schedule(kind, &document.file_id, state.stale_delay);
    Ok(Json(document))
}

/// POST `/stale/persist/{file_id}` and `/stale/keep/{file_id}` — cancel a
/// pending deletion. 404 when nothing is pending.
pub async fn persist_file(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    state.scheduler.cancel(&file_id)?;
    debug!(file_id, "kept staled file");
    Ok(Json(json!({
        "detail": "file successfully persisted",
        "file_id": file_id,
    })))
}
