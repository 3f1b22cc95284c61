use axum::{
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use tracing::info;

use crate::error::{parse_upload_id, AppError};
use crate::report::{render_report, CONTENT_TYPE};
use crate::storage::SharedRepository;

// ---

pub fn router() -> Router<SharedRepository> {
    // ---
    Router::new()
        .route("/report", get(handler))
        .route("/report/", get(handler))
}

#[derive(Debug, Deserialize)]
pub struct ReportQuery {
    upload_id: Option<String>,
}

/// Download the PDF report as an attachment.
///
/// Errors are returned as JSON bodies, never as a partial document.
async fn handler(
    Query(params): Query<ReportQuery>,
    State(repo): State<SharedRepository>,
) -> Result<Response, AppError> {
    // ---
    info!("GET /report: {:?}", params);

    let batch_id = parse_upload_id(params.upload_id.as_deref())?
        .ok_or_else(|| AppError::Validation("upload_id required".to_string()))?;

    let report = render_report(repo.as_ref(), batch_id).await?;
    info!(
        "Serving {} ({} pages, {} bytes)",
        report.filename,
        report.pages,
        report.bytes.len()
    );
    let disposition = format!("attachment; filename=\"{}\"", report.filename);

    Ok((
        [
            (header::CONTENT_TYPE, CONTENT_TYPE.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        report.bytes,
    )
        .into_response())
}
