//! Upload endpoints.

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, HeaderValue},
    response::{IntoResponse, Response},
};

use super::extract::RawBody;
use super::{created, error, success, ApiResult};
use crate::errors::AppError;
use crate::models::{FileMeta, MessageBody};
use crate::AppState;

/// Optional header carrying the client-side file name.
pub const FILE_NAME_HEADER: &str = "x-file-name";

/// POST /api/files - Store the raw request body as a file.
pub async fn upload_file(
    State(state): State<AppState>,
    headers: HeaderMap,
    RawBody(body): RawBody,
) -> ApiResult<FileMeta> {
    let Some(content_type) = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
    else {
        return error(AppError::Validation(
            "Content-Type header is required".to_string(),
        ));
    };
    let name = headers.get(FILE_NAME_HEADER).and_then(|v| v.to_str().ok());

    match state.files.save(&body, content_type, name).await {
        Ok(meta) => created(meta),
        Err(e) => error(e),
    }
}

/// GET /api/files/{id} - File metadata.
pub async fn get_file(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<FileMeta> {
    match state.files.get(&id).await {
        Ok(Some(meta)) => success(meta),
        Ok(None) => error(file_not_found(&id)),
        Err(e) => error(e),
    }
}

/// GET /api/files/{id}/raw - File content with its stored content type.
pub async fn download_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let (meta, bytes) = state
        .files
        .read(&id)
        .await?
        .ok_or_else(|| file_not_found(&id))?;

    let content_type = HeaderValue::from_str(&meta.content_type)
        .unwrap_or(HeaderValue::from_static("application/octet-stream"));
    Ok(([(header::CONTENT_TYPE, content_type)], bytes).into_response())
}

/// DELETE /api/files/{id} - Remove a file and its metadata.
pub async fn delete_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<MessageBody> {
    match state.files.delete(&id).await {
        Ok(true) => success(MessageBody::new("File deleted")),
        Ok(false) => error(file_not_found(&id)),
        Err(e) => error(e),
    }
}

fn file_not_found(id: &str) -> AppError {
    AppError::NotFound(format!("File {} not found", id))
}
