// src/routes/upload.rs
//! `POST /upload-csv`: multipart CSV upload.
//!
//! The CSV is read from the multipart field named `file`. A request without
//! that field, or one that is not multipart at all, is answered with
//! `400 missing file`. The body size is capped by the gateway-provided limit.

use axum::{
    body::Bytes,
    extract::{multipart::MultipartRejection, DefaultBodyLimit, Multipart, State},
    routing::post,
    Json, Router,
};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::AppError;
use crate::ingest::ingest_csv;
use crate::storage::SharedRepository;

const FILE_FIELD: &str = "file";

// ---

#[derive(Debug, Serialize)]
struct UploadResponse {
    message: &'static str,
    upload_id: i64,
}

pub fn router(max_upload_bytes: usize) -> Router<SharedRepository> {
    // ---
    Router::new()
        .route("/upload-csv", post(handler))
        .route("/upload-csv/", post(handler))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
}

async fn handler(
    State(repo): State<SharedRepository>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, AppError> {
    // ---
    info!("POST /upload-csv");

    let file = match multipart {
        Ok(multipart) => read_file_field(multipart).await?,
        Err(rejection) => {
            warn!("Upload is not a multipart form: {}", rejection);
            None
        }
    };

    let batch = ingest_csv(repo.as_ref(), file.as_deref()).await?;

    Ok(Json(UploadResponse {
        message: "CSV uploaded successfully",
        upload_id: batch.id,
    }))
}

/// Bytes of the `file` field, if the form has one.
async fn read_file_field(mut multipart: Multipart) -> Result<Option<Bytes>, AppError> {
    // ---
    let malformed = |e: axum::extract::multipart::MultipartError| {
        AppError::Validation(format!("malformed upload: {}", e.body_text()))
    };

    while let Some(field) = multipart.next_field().await.map_err(malformed)? {
        if field.name() == Some(FILE_FIELD) {
            let data = field.bytes().await.map_err(malformed)?;
            info!("Received CSV upload of {} bytes", data.len());
            return Ok(Some(data));
        }
    }
    Ok(None)
}
