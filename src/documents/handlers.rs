use axum::{
    extract::{DefaultBodyLimit, Multipart},
    routing::post,
    Json, Router,
};
use serde::Serialize;
use tracing::{info, instrument};

use super::extract::extract_text;
use crate::{
    error::{AppError, AppResult},
    state::AppState,
};

pub fn document_routes() -> Router<AppState> {
    Router::new()
        .route("/documents/upload", post(upload))
        .layer(DefaultBodyLimit::max(20 * 1024 * 1024)) // 20MB
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub content: String,
}

/// POST /documents/upload (multipart, field `file`).
#[instrument(skip(mp))]
pub async fn upload(mut mp: Multipart) -> AppResult<Json<UploadResponse>> {
    while let Some(field) = mp
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Invalid multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let content_type = field
            .content_type()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "application/octet-stream".into());
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::Validation(format!("Could not read file: {e}")))?;

        info!(content_type = %content_type, size = data.len(), "file uploaded");
        let content = extract_text(&data, &content_type)?;
        return Ok(Json(UploadResponse { content }));
    }

    Err(AppError::Validation("file field is required".into()))
}
