use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;

use crate::{
    config::{SecretStore, Settings},
    database::DatabasePool,
    error::ApiError,
    repositories::ScanRepositories,
    services::{
        external::{
            HeadlessCapture, HttpAnalyzer, HttpConfig, LinkCrawler, PassiveEnumerator, ScanProviders,
            SignatureFingerprinter,
        },
        pipeline::PipelineSettings,
        ScanService, TaskManager,
    },
};

pub mod config;
pub mod database;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod repositories;
pub mod services;

/// Shared application state containing all dependencies
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Settings>,
    pub db_pool: DatabasePool,
    pub repos: ScanRepositories,
    pub scan_service: Arc<ScanService>,
    pub task_manager: Arc<TaskManager>,
    pub secrets: Arc<SecretStore>,
}

impl AppState {
    /// Connect to the database, load the secret store and wire the production providers.
    pub async fn new(config: Settings) -> Result<Self, ApiError> {
        let db_pool = crate::database::create_connection_pool(&config.database_url).await?;
        let secrets = Arc::new(SecretStore::load(&config.secrets_file).await);
        let providers = Self::default_providers(&config, secrets.clone())?;
        let repos = ScanRepositories::from_pool(db_pool.clone());
        Ok(Self::from_parts(config, db_pool, repos, providers, secrets))
    }

    /// Assemble state from explicit parts. Tests use this to swap in their own
    /// repositories and providers.
    pub fn from_parts(
        config: Settings,
        db_pool: DatabasePool,
        repos: ScanRepositories,
        providers: ScanProviders,
        secrets: Arc<SecretStore>,
    ) -> Self {
        let task_manager = Arc::new(TaskManager::new(config.max_concurrent_scans as usize));
        let scan_service = Arc::new(ScanService::new(
            repos.clone(),
            providers,
            task_manager.clone(),
            PipelineSettings::from_settings(&config),
        ));

        Self {
            config: Arc::new(config),
            db_pool,
            repos,
            scan_service,
            task_manager,
            secrets,
        }
    }

    pub fn default_providers(config: &Settings, secrets: Arc<SecretStore>) -> Result<ScanProviders, ApiError> {
        let http_analyzer = Arc::new(HttpAnalyzer::new(HttpConfig {
            fetch_timeout: Duration::from_secs(config.fingerprint_timeout_seconds),
            max_body_bytes: config.fingerprint_max_body_bytes as usize,
            ..HttpConfig::default()
        })?);

        Ok(ScanProviders {
            enumerator: Arc::new(PassiveEnumerator::new(secrets)?),
            prober: http_analyzer.clone(),
            crawler: Arc::new(LinkCrawler::default()),
            fetcher: http_analyzer,
            fingerprinter: Arc::new(SignatureFingerprinter::new()?),
            capture: Arc::new(HeadlessCapture::new()),
        })
    }
}

/// All API routes with the global middleware stack applied.
pub fn create_router(app_state: AppState) -> Router {
    let cors_layer = middleware::create_cors_layer(&app_state.config.cors_allow_origins);

    Router::new()
        // Health check endpoints
        .route("/api/health", get(handlers::health_check))
        .route("/api/health/simple", get(handlers::health_check_simple))
        .route("/api/health/ready", get(handlers::readiness_check))
        .route("/api/health/live", get(handlers::liveness_check))
        // Scan endpoints
        .route(
            "/api/scans",
            post(handlers::scan_handlers::create_scan).get(handlers::scan_handlers::list_scans),
        )
        .route("/api/scans/:id", get(handlers::scan_handlers::get_scan))
        .route("/api/scans/:id/screenshots", get(handlers::scan_handlers::list_scan_screenshots))
        // Asset endpoints
        .route(
            "/api/root-domains/:id/subdomains",
            get(handlers::asset_handlers::list_subdomains),
        )
        .route("/api/subdomains/:id/endpoints", get(handlers::asset_handlers::list_endpoints))
        .route(
            "/api/subdomains/:id/technologies",
            get(handlers::asset_handlers::list_technologies),
        )
        // Template endpoints
        .route("/api/templates", get(handlers::template_handlers::list_templates))
        .route("/api/templates/:id", get(handlers::template_handlers::get_template))
        // Settings endpoints
        .route(
            "/api/settings/secrets",
            get(handlers::settings_handlers::get_secrets).put(handlers::settings_handlers::update_secrets),
        )
        .with_state(app_state)
        .layer(axum::middleware::from_fn(middleware::request_logging_middleware))
        .layer(middleware::create_logging_layer())
        .layer(cors_layer)
}
