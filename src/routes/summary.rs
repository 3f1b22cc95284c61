use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tracing::info;

use crate::error::{parse_upload_id, AppError};
use crate::query::{summary, Summary};
use crate::storage::SharedRepository;

// ---

pub fn router() -> Router<SharedRepository> {
    // ---
    Router::new()
        .route("/summary", get(handler))
        .route("/summary/", get(handler))
}

#[derive(Debug, Deserialize)]
pub struct SummaryQuery {
    upload_id: Option<String>,
}

/// Live statistics for one upload, or across all uploads without `upload_id`.
async fn handler(
    Query(params): Query<SummaryQuery>,
    State(repo): State<SharedRepository>,
) -> Result<Json<Summary>, AppError> {
    // ---
    info!("GET /summary: {:?}", params);
    let batch_id = parse_upload_id(params.upload_id.as_deref())?;
    Ok(Json(summary(repo.as_ref(), batch_id).await?))
}
