use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
};
use serde_json::{json, Value};
use std::time::Instant;
use crate::{AppState, error::ApiError};

/// Health check with database connectivity and scan queue state
pub async fn health_check(State(app_state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let db_status = check_database_health(&app_state).await;
    let healthy = db_status["healthy"].as_bool().unwrap_or(false);

    if !healthy {
        return Err(ApiError::internal("Service is unhealthy"));
    }

    let active_scans = app_state.task_manager.get_active_tasks().await.len();
    Ok(Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
        "service": "surface-backend",
        "checks": {
            "database": db_status,
            "scans": {
                "healthy": true,
                "active": active_scans,
                "max_concurrent": app_state.task_manager.max_concurrent(),
            }
        }
    })))
}

/// Simple health check endpoint for load balancers
pub async fn health_check_simple() -> Result<&'static str, StatusCode> {
    Ok("OK")
}

async fn check_database_health(app_state: &AppState) -> Value {
    let started = Instant::now();
    match crate::database::health_check(&app_state.db_pool).await {
        Ok(()) => json!({
            "healthy": true,
            "message": "Database connection successful",
            "response_time_ms": started.elapsed().as_millis() as u64,
        }),
        Err(e) => {
            tracing::error!(error = %e, "database health check failed");
            json!({
                "healthy": false,
                "message": "Database connection failed",
                "error": e.to_string()
            })
        }
    }
}

/// Readiness check endpoint for Kubernetes
pub async fn readiness_check(State(app_state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let db_ready = check_database_health(&app_state).await;
    let ready = db_ready["healthy"].as_bool().unwrap_or(false);

    if !ready {
        return Err(ApiError::internal("Service is not ready"));
    }

    Ok(Json(json!({
        "ready": ready,
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "checks": {
            "database": db_ready
        }
    })))
}

/// Liveness check endpoint for Kubernetes
pub async fn liveness_check() -> Json<Value> {
    Json(json!({
        "alive": true,
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}
