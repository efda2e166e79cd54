use crate::{error::ApiError, models::ScanTemplate, AppState};
use axum::{
    extract::{Path, State},
    response::Json,
};
use uuid::Uuid;

pub async fn list_templates(State(app_state): State<AppState>) -> Result<Json<Vec<ScanTemplate>>, ApiError> {
    let templates = app_state.repos.templates.list().await?;
    Ok(Json(templates))
}

pub async fn get_template(
    State(app_state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ScanTemplate>, ApiError> {
    let template = app_state
        .repos
        .templates
        .get_by_id(&id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Scan template {} not found", id)))?;
    Ok(Json(template))
}
