use async_trait::async_trait;
use uuid::Uuid;

use crate::{database::DatabasePool, error::ApiError, models::ScanTemplate};

#[async_trait]
pub trait TemplateRepository {
    async fn get_by_id(&self, id: &Uuid) -> Result<Option<ScanTemplate>, ApiError>;
    async fn list(&self) -> Result<Vec<ScanTemplate>, ApiError>;
}

pub struct SqlxTemplateRepository {
    pool: DatabasePool,
}

impl SqlxTemplateRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TemplateRepository for SqlxTemplateRepository {
    async fn get_by_id(&self, id: &Uuid) -> Result<Option<ScanTemplate>, ApiError> {
        let template = sqlx::query_as::<_, ScanTemplate>(
            r#"
            SELECT id, name, description, subdomain_scan_config, url_scan_config, parameter_scan_config,
                   tech_detect_enabled, screenshot_enabled, created_at, updated_at
            FROM scan_templates
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(template)
    }

    async fn list(&self) -> Result<Vec<ScanTemplate>, ApiError> {
        let templates = sqlx::query_as::<_, ScanTemplate>(
            r#"
            SELECT id, name, description, subdomain_scan_config, url_scan_config, parameter_scan_config,
                   tech_detect_enabled, screenshot_enabled, created_at, updated_at
            FROM scan_templates
            ORDER BY name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(templates)
    }
}
