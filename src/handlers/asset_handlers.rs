use crate::{
    error::ApiError,
    models::{DetectedTechnology, Endpoint, Subdomain},
    AppState,
};
use axum::{
    extract::{Path, State},
    response::Json,
};
use uuid::Uuid;

pub async fn list_subdomains(
    State(app_state): State<AppState>,
    Path(root_domain_id): Path<Uuid>,
) -> Result<Json<Vec<Subdomain>>, ApiError> {
    if app_state.repos.root_domains.get_by_id(&root_domain_id).await?.is_none() {
        return Err(ApiError::not_found(format!("Root domain {} not found", root_domain_id)));
    }
    let subdomains = app_state.repos.subdomains.list_by_root_domain(&root_domain_id).await?;
    Ok(Json(subdomains))
}

async fn require_subdomain(app_state: &AppState, id: &Uuid) -> Result<(), ApiError> {
    match app_state.repos.subdomains.get_by_id(id).await? {
        Some(_) => Ok(()),
        None => Err(ApiError::not_found(format!("Subdomain {} not found", id))),
    }
}

pub async fn list_endpoints(
    State(app_state): State<AppState>,
    Path(subdomain_id): Path<Uuid>,
) -> Result<Json<Vec<Endpoint>>, ApiError> {
    require_subdomain(&app_state, &subdomain_id).await?;
    let endpoints = app_state.repos.endpoints.list_by_subdomain(&subdomain_id).await?;
    Ok(Json(endpoints))
}

pub async fn list_technologies(
    State(app_state): State<AppState>,
    Path(subdomain_id): Path<Uuid>,
) -> Result<Json<Vec<DetectedTechnology>>, ApiError> {
    require_subdomain(&app_state, &subdomain_id).await?;
    let technologies = app_state.repos.technologies.list_by_subdomain(&subdomain_id).await?;
    Ok(Json(technologies))
}
