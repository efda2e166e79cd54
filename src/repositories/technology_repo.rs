use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Postgres, Transaction};
use std::collections::HashMap;
use uuid::Uuid;

use crate::{
    database::DatabasePool,
    error::ApiError,
    models::{DetectedTechnology, DetectionSaveSummary, HostDetections},
};

#[async_trait]
pub trait TechnologyRepository {
    /// Persist a whole fingerprint pass in one transaction. Any failure rolls
    /// back every association written by the call.
    ///
    /// Hostnames are resolved against the root domain's subdomains. The apex
    /// hostname is created when missing; other unknown hostnames are skipped
    /// and reported in the summary.
    async fn save_detections(
        &self,
        root_domain_id: &Uuid,
        scan_id: &Uuid,
        detections: &[HostDetections],
    ) -> Result<DetectionSaveSummary, ApiError>;

    async fn list_by_subdomain(&self, subdomain_id: &Uuid) -> Result<Vec<DetectedTechnology>, ApiError>;
}

pub struct SqlxTechnologyRepository {
    pool: DatabasePool,
}

impl SqlxTechnologyRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    async fn find_or_create_technology(
        tx: &mut Transaction<'_, Postgres>,
        name: &str,
        summary: &mut DetectionSaveSummary,
    ) -> Result<Uuid, ApiError> {
        let inserted: Option<(Uuid,)> = sqlx::query_as(
            r#"
            INSERT INTO technologies (id, name)
            VALUES ($1, $2)
            ON CONFLICT (name) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .fetch_optional(&mut **tx)
        .await?;

        if let Some((id,)) = inserted {
            summary.technologies_created += 1;
            return Ok(id);
        }

        let (id,): (Uuid,) = sqlx::query_as("SELECT id FROM technologies WHERE name = $1")
            .bind(name)
            .fetch_one(&mut **tx)
            .await?;

        Ok(id)
    }

    async fn ensure_apex(
        tx: &mut Transaction<'_, Postgres>,
        root_domain_id: &Uuid,
        scan_id: &Uuid,
        apex: &str,
    ) -> Result<Uuid, ApiError> {
        sqlx::query(
            r#"
            INSERT INTO subdomains (id, root_domain_id, hostname, is_active, discovered_at, scan_id)
            VALUES ($1, $2, $3, TRUE, $4, $5)
            ON CONFLICT (hostname, root_domain_id) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(root_domain_id)
        .bind(apex)
        .bind(Utc::now())
        .bind(scan_id)
        .execute(&mut **tx)
        .await?;

        let (id,): (Uuid,) =
            sqlx::query_as("SELECT id FROM subdomains WHERE root_domain_id = $1 AND hostname = $2")
                .bind(root_domain_id)
                .bind(apex)
                .fetch_one(&mut **tx)
                .await?;

        Ok(id)
    }
}

#[async_trait]
impl TechnologyRepository for SqlxTechnologyRepository {
    async fn save_detections(
        &self,
        root_domain_id: &Uuid,
        scan_id: &Uuid,
        detections: &[HostDetections],
    ) -> Result<DetectionSaveSummary, ApiError> {
        let mut summary = DetectionSaveSummary::default();
        if detections.iter().all(|d| d.technologies.is_empty()) {
            return Ok(summary);
        }

        let mut tx = self.pool.begin().await?;

        let apex: Option<(String,)> = sqlx::query_as("SELECT domain FROM root_domains WHERE id = $1")
            .bind(root_domain_id)
            .fetch_optional(&mut *tx)
            .await?;
        let apex = match apex {
            Some((domain,)) => domain.to_lowercase(),
            None => {
                return Err(ApiError::not_found(format!(
                    "Root domain with id {} not found",
                    root_domain_id
                )))
            }
        };

        let rows: Vec<(String, Uuid)> =
            sqlx::query_as("SELECT hostname, id FROM subdomains WHERE root_domain_id = $1")
                .bind(root_domain_id)
                .fetch_all(&mut *tx)
                .await?;
        let mut hosts: HashMap<String, Uuid> = rows
            .into_iter()
            .map(|(hostname, id)| (hostname.to_lowercase(), id))
            .collect();

        let mut technology_ids: HashMap<String, Uuid> = HashMap::new();
        let now = Utc::now();

        for detection in detections.iter().filter(|d| !d.technologies.is_empty()) {
            let hostname = detection.hostname.to_lowercase();
            let subdomain_id = match hosts.get(&hostname) {
                Some(id) => *id,
                None if hostname == apex => {
                    let id = Self::ensure_apex(&mut tx, root_domain_id, scan_id, &apex).await?;
                    summary.apex_created = true;
                    hosts.insert(hostname.clone(), id);
                    id
                }
                None => {
                    tracing::warn!(
                        scan_id = %scan_id,
                        hostname = %hostname,
                        "skipping detections for hostname without a subdomain record"
                    );
                    if !summary.skipped_hosts.contains(&hostname) {
                        summary.skipped_hosts.push(hostname);
                    }
                    continue;
                }
            };

            for name in &detection.technologies {
                let name = name.to_lowercase();
                let technology_id = match technology_ids.get(&name) {
                    Some(id) => *id,
                    None => {
                        let id = Self::find_or_create_technology(&mut tx, &name, &mut summary).await?;
                        technology_ids.insert(name.clone(), id);
                        id
                    }
                };

                let linked = sqlx::query(
                    r#"
                    INSERT INTO subdomain_technologies (subdomain_id, technology_id, detected_at)
                    VALUES ($1, $2, $3)
                    ON CONFLICT (subdomain_id, technology_id) DO NOTHING
                    "#,
                )
                .bind(subdomain_id)
                .bind(technology_id)
                .bind(now)
                .execute(&mut *tx)
                .await?;
                summary.subdomain_links += linked.rows_affected() as usize;

                if let Some(endpoint_id) = detection.endpoint_id {
                    let linked = sqlx::query(
                        r#"
                        INSERT INTO endpoint_technologies (endpoint_id, technology_id, detected_at)
                        VALUES ($1, $2, $3)
                        ON CONFLICT (endpoint_id, technology_id) DO NOTHING
                        "#,
                    )
                    .bind(endpoint_id)
                    .bind(technology_id)
                    .bind(now)
                    .execute(&mut *tx)
                    .await?;
                    summary.endpoint_links += linked.rows_affected() as usize;
                }
            }
        }

        tx.commit().await?;

        Ok(summary)
    }

    async fn list_by_subdomain(&self, subdomain_id: &Uuid) -> Result<Vec<DetectedTechnology>, ApiError> {
        let rows = sqlx::query_as::<_, DetectedTechnology>(
            r#"
            SELECT t.id, t.name, t.category, st.detected_at
            FROM subdomain_technologies st
            JOIN technologies t ON t.id = st.technology_id
            WHERE st.subdomain_id = $1
            ORDER BY t.name
            "#,
        )
        .bind(subdomain_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}
