use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::{
    database::DatabasePool,
    error::ApiError,
    models::{Screenshot, ScreenshotCreate},
};

#[async_trait]
pub trait ScreenshotRepository {
    async fn create(&self, screenshot: &ScreenshotCreate) -> Result<Screenshot, ApiError>;
    async fn list_by_scan(&self, scan_id: &Uuid) -> Result<Vec<Screenshot>, ApiError>;
}

pub struct SqlxScreenshotRepository {
    pool: DatabasePool,
}

impl SqlxScreenshotRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ScreenshotRepository for SqlxScreenshotRepository {
    async fn create(&self, screenshot: &ScreenshotCreate) -> Result<Screenshot, ApiError> {
        let row = sqlx::query_as::<_, Screenshot>(
            r#"
            INSERT INTO screenshots (id, subdomain_id, endpoint_id, url, file_path, scan_id, captured_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, subdomain_id, endpoint_id, url, file_path, scan_id, captured_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(screenshot.target.subdomain_id())
        .bind(screenshot.target.endpoint_id())
        .bind(&screenshot.url)
        .bind(&screenshot.file_path)
        .bind(screenshot.scan_id)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    async fn list_by_scan(&self, scan_id: &Uuid) -> Result<Vec<Screenshot>, ApiError> {
        let rows = sqlx::query_as::<_, Screenshot>(
            r#"
            SELECT id, subdomain_id, endpoint_id, url, file_path, scan_id, captured_at
            FROM screenshots
            WHERE scan_id = $1
            ORDER BY captured_at
            "#,
        )
        .bind(scan_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}
