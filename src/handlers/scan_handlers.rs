use crate::{
    error::ApiError,
    models::{Scan, ScanStartRequest, ScanStarted, Screenshot},
    AppState,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct ScanListQuery {
    pub root_domain_id: Option<Uuid>,
}

/// Queue a scan. The response only acknowledges the request; the scan's
/// progress is read back through `GET /api/scans/:id`.
pub async fn create_scan(
    State(app_state): State<AppState>,
    Json(payload): Json<ScanStartRequest>,
) -> Result<(StatusCode, Json<ScanStarted>), ApiError> {
    let started = app_state.scan_service.start_scan(payload).await?;
    Ok((StatusCode::ACCEPTED, Json(started)))
}

pub async fn get_scan(
    State(app_state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Scan>, ApiError> {
    let scan = app_state
        .scan_service
        .get_scan(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Scan {} not found", id)))?;
    Ok(Json(scan))
}

pub async fn list_scans(
    State(app_state): State<AppState>,
    Query(query): Query<ScanListQuery>,
) -> Result<Json<Vec<Scan>>, ApiError> {
    let root_domain_id = query
        .root_domain_id
        .ok_or_else(|| ApiError::validation("root_domain_id query parameter is required"))?;
    let scans = app_state.scan_service.list_scans(&root_domain_id).await?;
    Ok(Json(scans))
}

pub async fn list_scan_screenshots(
    State(app_state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Screenshot>>, ApiError> {
    if app_state.scan_service.get_scan(&id).await?.is_none() {
        return Err(ApiError::not_found(format!("Scan {} not found", id)));
    }
    let screenshots = app_state.repos.screenshots.list_by_scan(&id).await?;
    Ok(Json(screenshots))
}
