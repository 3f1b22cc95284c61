use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tracing::info;

use crate::error::{parse_upload_id, AppError};
use crate::models::EquipmentRecord;
use crate::query::{filter, records_for_batch};
use crate::storage::SharedRepository;

// ---

pub fn router() -> Router<SharedRepository> {
    // ---
    Router::new()
        .route("/equipment", get(list_all))
        .route("/equipment/", get(list_all))
        .route("/filter-equipment", get(filter_handler))
        .route("/filter-equipment/", get(filter_handler))
        .route("/equipment-by-upload/{upload_id}", get(by_upload))
        .route("/equipment-by-upload/{upload_id}/", get(by_upload))
}

/// Query parameters for `GET /filter-equipment`
#[derive(Debug, Deserialize)]
pub struct FilterQuery {
    upload_id: Option<String>,
    #[serde(rename = "type")]
    equipment_type: Option<String>,
}

async fn list_all(
    State(repo): State<SharedRepository>,
) -> Result<Json<Vec<EquipmentRecord>>, AppError> {
    // ---
    info!("GET /equipment");
    Ok(Json(filter(repo.as_ref(), None, None).await?))
}

async fn filter_handler(
    Query(params): Query<FilterQuery>,
    State(repo): State<SharedRepository>,
) -> Result<Json<Vec<EquipmentRecord>>, AppError> {
    // ---
    info!("GET /filter-equipment: {:?}", params);

    let batch_id = parse_upload_id(params.upload_id.as_deref())?;
    let equipment_type = params
        .equipment_type
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());

    Ok(Json(filter(repo.as_ref(), batch_id, equipment_type).await?))
}

async fn by_upload(
    Path(upload_id): Path<String>,
    State(repo): State<SharedRepository>,
) -> Result<Json<Vec<EquipmentRecord>>, AppError> {
    // ---
    info!("GET /equipment-by-upload/{}", upload_id);

    let batch_id = parse_upload_id(Some(&upload_id))?
        .ok_or_else(|| AppError::Validation("upload_id required".to_string()))?;

    Ok(Json(records_for_batch(repo.as_ref(), batch_id).await?))
}
