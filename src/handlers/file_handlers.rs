//! HTTP handlers for uploads, metadata lookups, crops, deletes and raw
//! object reads.

use axum::{
    Json,
    body::Body,
    extract::{
        Multipart, Path, Query, State,
        rejection::{PathRejection, QueryRejection},
    },
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use serde::Deserialize;
use serde_json::json;
use std::path::Path as FsPath;

use crate::{
    errors::{AppError, FileError},
    models::{
        document::{FileDocument, ObjectStat},
        file_kind::FileKind,
    },
    services::{file_service::VariantCreated, transform::CropBox},
    state::AppState,
};

/// A parsed multipart upload: the `file` part plus the optional `fileName` field.
#[derive(Debug)]
pub struct Upload {
    pub body: Bytes,
    pub content_type: String,
    pub filename: String,
}

/// Query accepted by the crop endpoint: `?dimensions=WxH&offset=X,Y`.
#[derive(Debug, Deserialize)]
pub struct CropQuery {
    pub dimensions: String,
    pub offset: Option<String>,
}

/// Name the upload is stored under.
///
/// A custom `fileName` keeps the extension of the uploaded file's own name.
pub fn final_filename(custom: Option<&str>, original: Option<&str>) -> String {
    let original = original.map(str::trim).filter(|name| !name.is_empty());
    let extension = original
        .and_then(|name| FsPath::new(name).extension())
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();

    match (custom.map(str::trim).filter(|name| !name.is_empty()), original) {
        (Some(custom), _) => format!("{}{}", custom, extension),
        (None, Some(original)) => original.to_string(),
        (None, None) => "upload".to_string(),
    }
}

/// Pull the `file` part and optional `fileName` field out of a multipart body.
pub async fn read_upload(mut multipart: Multipart, max_file_size: usize) -> Result<Upload, AppError> {
    let mut file: Option<(Bytes, Option<String>, Option<String>)> = None;
    let mut custom_name: Option<String> = None;

    while let Some(field) = multipart.next_field().await? {
        match field.name() {
            Some("file") => {
                let content_type = field.content_type().map(str::to_string);
                let original = field.file_name().map(str::to_string);
                let body = field.bytes().await?;
                file = Some((body, content_type, original));
            }
            Some("fileName") => custom_name = Some(field.text().await?),
            _ => {}
        }
    }

    let (body, content_type, original) =
        file.ok_or_else(|| AppError::bad_request("No file provided"))?;
    if body.len() > max_file_size {
        return Err(AppError::new(
            StatusCode::PAYLOAD_TOO_LARGE,
            format!("File too large: {} bytes exceeds {} bytes", body.len(), max_file_size),
        ));
    }
    let content_type =
        content_type.ok_or_else(|| AppError::bad_request("File has no content type"))?;

    Ok(Upload {
        body,
        content_type,
        filename: final_filename(custom_name.as_deref(), original.as_deref()),
    })
}

/// POST `/files` — store an upload, filing it under the kind of its content type.
pub async fn upload_file(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<FileDocument>, AppError> {
    let upload = read_upload(multipart, state.max_file_size).await?;
    let document = state
        .files
        .upload_detected(upload.body, &upload.content_type, &upload.filename)
        .await?;
    Ok(Json(document))
}

/// POST `/files/kind/{kind}` — store an upload that must belong to `kind`.
pub async fn upload_file_of_kind(
    State(state): State<AppState>,
    kind: Result<Path<FileKind>, PathRejection>,
    multipart: Multipart,
) -> Result<Json<FileDocument>, AppError> {
    let Path(kind) = kind?;
    let upload = read_upload(multipart, state.max_file_size).await?;
    let document = state
        .files
        .upload(kind, upload.body, &upload.content_type, &upload.filename)
        .await?;
    Ok(Json(document))
}

/// GET `/files/{file_id}` — the metadata document.
pub async fn get_file(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
) -> Result<Json<FileDocument>, AppError> {
    Ok(Json(state.files.describe(&file_id).await?))
}

/// DELETE `/files/{file_id}` — remove the upload, its variants and its metadata.
pub async fn delete_file(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    state.files.delete_by_id(&file_id).await?;
    Ok(Json(json!({
        "message": "File deleted successfully",
        "file_id": file_id,
    })))
}

/// POST `/files/{file_id}/crop?dimensions=WxH&offset=X,Y` — derive a crop.
pub async fn crop_file(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
    query: Result<Query<CropQuery>, QueryRejection>,
) -> Result<Json<VariantCreated>, AppError> {
    let Query(query) = query?;
    let crop = CropBox::parse(&query.dimensions, query.offset.as_deref()).map_err(FileError::from)?;
    let kind = state.files.find_kind(&file_id).await?;
    if kind != FileKind::Images {
        return Err(FileError::TypeMismatch {
            expected: FileKind::Images,
            actual: kind.to_string(),
        }
        .into());
    }
    let created = state.files.create_variant(kind, &file_id, crop).await?;
    Ok(Json(created))
}

/// GET `/objects/{*key}` — raw blob bytes.
pub async fn get_object(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Response, AppError> {
    let blob = state.files.fetch(&key).await?;

    let mut response = Response::new(Body::from(blob.body));
    *response.status_mut() = StatusCode::OK;
    set_object_headers(response.headers_mut(), &blob.stat);
    if let Some(value) = blob
        .etag
        .and_then(|etag| HeaderValue::from_str(&format!("\"{}\"", etag)).ok())
    {
        response.headers_mut().insert(header::ETAG, value);
    }
    Ok(response)
}

fn set_object_headers(headers: &mut HeaderMap, stat: &ObjectStat) {
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&stat.content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(stat.size));
    if let Ok(value) = HeaderValue::from_str(&stat.last_modified.to_rfc2822()) {
        headers.insert(header::LAST_MODIFIED, value);
    }
}
