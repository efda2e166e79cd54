pub mod domain_repo;
pub mod endpoint_repo;
pub mod scan_repo;
pub mod screenshot_repo;
pub mod technology_repo;
pub mod template_repo;

use std::sync::Arc;

pub use domain_repo::{RootDomainRepository, SqlxRootDomainRepository, SqlxSubdomainRepository, SubdomainRepository};
pub use endpoint_repo::{EndpointRepository, SqlxEndpointRepository};
pub use scan_repo::{ScanRepository, SqlxScanRepository};
pub use screenshot_repo::{ScreenshotRepository, SqlxScreenshotRepository};
pub use technology_repo::{SqlxTechnologyRepository, TechnologyRepository};
pub use template_repo::{SqlxTemplateRepository, TemplateRepository};

use crate::database::DatabasePool;

/// Store handles shared by the orchestrator, the pipeline phases and the handlers.
pub struct ScanRepositories {
    pub scans: Arc<dyn ScanRepository + Send + Sync>,
    pub root_domains: Arc<dyn RootDomainRepository + Send + Sync>,
    pub subdomains: Arc<dyn SubdomainRepository + Send + Sync>,
    pub endpoints: Arc<dyn EndpointRepository + Send + Sync>,
    pub technologies: Arc<dyn TechnologyRepository + Send + Sync>,
    pub screenshots: Arc<dyn ScreenshotRepository + Send + Sync>,
    pub templates: Arc<dyn TemplateRepository + Send + Sync>,
}

impl ScanRepositories {
    pub fn from_pool(pool: DatabasePool) -> Self {
        Self {
            scans: Arc::new(SqlxScanRepository::new(pool.clone())),
            root_domains: Arc::new(SqlxRootDomainRepository::new(pool.clone())),
            subdomains: Arc::new(SqlxSubdomainRepository::new(pool.clone())),
            endpoints: Arc::new(SqlxEndpointRepository::new(pool.clone())),
            technologies: Arc::new(SqlxTechnologyRepository::new(pool.clone())),
            screenshots: Arc::new(SqlxScreenshotRepository::new(pool.clone())),
            templates: Arc::new(SqlxTemplateRepository::new(pool)),
        }
    }
}

impl Clone for ScanRepositories {
    fn clone(&self) -> Self {
        Self {
            scans: Arc::clone(&self.scans),
            root_domains: Arc::clone(&self.root_domains),
            subdomains: Arc::clone(&self.subdomains),
            endpoints: Arc::clone(&self.endpoints),
            technologies: Arc::clone(&self.technologies),
            screenshots: Arc::clone(&self.screenshots),
            templates: Arc::clone(&self.templates),
        }
    }
}
