use axum::{extract::State, routing::get, Json, Router};
use tracing::info;

use crate::error::AppError;
use crate::query::{history, HistoryEntry, HISTORY_LIMIT};
use crate::storage::SharedRepository;

// ---

/// `GET /uploads` and its alias `GET /history`.
pub fn router() -> Router<SharedRepository> {
    // ---
    Router::new()
        .route("/uploads", get(handler))
        .route("/uploads/", get(handler))
        .route("/history", get(handler))
        .route("/history/", get(handler))
}

async fn handler(
    State(repo): State<SharedRepository>,
) -> Result<Json<Vec<HistoryEntry>>, AppError> {
    // ---
    info!("GET /uploads");
    let entries = history(repo.as_ref(), HISTORY_LIMIT).await?;
    Ok(Json(entries))
}
