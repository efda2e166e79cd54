use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::{
    database::DatabasePool,
    error::ApiError,
    models::{Scan, ScanCreate, ScanStatus},
};

#[async_trait]
pub trait ScanRepository {
    async fn create(&self, scan: &ScanCreate) -> Result<Scan, ApiError>;
    async fn get_by_id(&self, id: &Uuid) -> Result<Option<Scan>, ApiError>;
    async fn list_by_root_domain(&self, root_domain_id: &Uuid) -> Result<Vec<Scan>, ApiError>;
    /// `pending` -> `running`, restamping `started_at`.
    async fn mark_running(&self, id: &Uuid) -> Result<(), ApiError>;
    /// Terminal transition: status, completion time and summary in one write.
    async fn finish(&self, id: &Uuid, status: ScanStatus, summary: &str) -> Result<(), ApiError>;
}

pub struct SqlxScanRepository {
    pool: DatabasePool,
}

impl SqlxScanRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

const SCAN_COLUMNS: &str = "id, root_domain_id, subdomain_id, scan_type, status, started_at, \
                            completed_at, results_summary, scan_template_id";

#[async_trait]
impl ScanRepository for SqlxScanRepository {
    async fn create(&self, scan: &ScanCreate) -> Result<Scan, ApiError> {
        let sql = format!(
            r#"
            INSERT INTO scans (id, root_domain_id, subdomain_id, scan_type, status, started_at, scan_template_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {}
            "#,
            SCAN_COLUMNS
        );

        let created = sqlx::query_as::<_, Scan>(&sql)
            .bind(Uuid::new_v4())
            .bind(scan.root_domain_id)
            .bind(scan.subdomain_id)
            .bind(scan.kind.as_str())
            .bind(ScanStatus::Pending)
            .bind(Utc::now())
            .bind(scan.scan_template_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(created)
    }

    async fn get_by_id(&self, id: &Uuid) -> Result<Option<Scan>, ApiError> {
        let sql = format!("SELECT {} FROM scans WHERE id = $1", SCAN_COLUMNS);
        let scan = sqlx::query_as::<_, Scan>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(scan)
    }

    async fn list_by_root_domain(&self, root_domain_id: &Uuid) -> Result<Vec<Scan>, ApiError> {
        let sql = format!(
            "SELECT {} FROM scans WHERE root_domain_id = $1 ORDER BY started_at DESC",
            SCAN_COLUMNS
        );
        let scans = sqlx::query_as::<_, Scan>(&sql)
            .bind(root_domain_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(scans)
    }

    async fn mark_running(&self, id: &Uuid) -> Result<(), ApiError> {
        let result = sqlx::query(
            r#"
            UPDATE scans
            SET status = $1, started_at = $2
            WHERE id = $3
            "#,
        )
        .bind(ScanStatus::Running)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ApiError::not_found(format!("Scan with id {} not found", id)));
        }

        Ok(())
    }

    async fn finish(&self, id: &Uuid, status: ScanStatus, summary: &str) -> Result<(), ApiError> {
        let result = sqlx::query(
            r#"
            UPDATE scans
            SET status = $1, completed_at = $2, results_summary = $3
            WHERE id = $4
            "#,
        )
        .bind(status)
        .bind(Utc::now())
        .bind(summary)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ApiError::not_found(format!("Scan with id {} not found", id)));
        }

        Ok(())
    }
}
