use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::{
    database::DatabasePool,
    error::ApiError,
    models::{HostIndex, RootDomain, Subdomain},
};

#[async_trait]
pub trait RootDomainRepository {
    async fn get_by_id(&self, id: &Uuid) -> Result<Option<RootDomain>, ApiError>;
    async fn touch_last_scanned(&self, id: &Uuid) -> Result<(), ApiError>;
}

#[async_trait]
pub trait SubdomainRepository {
    async fn get_by_id(&self, id: &Uuid) -> Result<Option<Subdomain>, ApiError>;

    /// Insert hostnames under a root domain, leaving existing rows untouched.
    /// Returns how many rows were actually created; identifiers of pre-existing
    /// rows are not reported, read them back through [`Self::hostname_map`].
    async fn insert_ignore_conflicts(
        &self,
        root_domain_id: &Uuid,
        scan_id: &Uuid,
        hostnames: &[String],
    ) -> Result<u64, ApiError>;

    /// Every hostname currently stored for the root domain.
    async fn hostname_map(&self, root_domain_id: &Uuid) -> Result<HostIndex, ApiError>;

    async fn list_by_root_domain(&self, root_domain_id: &Uuid) -> Result<Vec<Subdomain>, ApiError>;
}

pub struct SqlxRootDomainRepository {
    pool: DatabasePool,
}

impl SqlxRootDomainRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RootDomainRepository for SqlxRootDomainRepository {
    async fn get_by_id(&self, id: &Uuid) -> Result<Option<RootDomain>, ApiError> {
        let root = sqlx::query_as::<_, RootDomain>(
            r#"
            SELECT id, organization_id, domain, created_at, last_scanned_at
            FROM root_domains
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(root)
    }

    async fn touch_last_scanned(&self, id: &Uuid) -> Result<(), ApiError> {
        sqlx::query("UPDATE root_domains SET last_scanned_at = $1 WHERE id = $2")
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

pub struct SqlxSubdomainRepository {
    pool: DatabasePool,
}

impl SqlxSubdomainRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubdomainRepository for SqlxSubdomainRepository {
    async fn get_by_id(&self, id: &Uuid) -> Result<Option<Subdomain>, ApiError> {
        let subdomain = sqlx::query_as::<_, Subdomain>(
            r#"
            SELECT id, root_domain_id, hostname, ip_address, is_active, discovered_at, scan_id
            FROM subdomains
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(subdomain)
    }

    async fn insert_ignore_conflicts(
        &self,
        root_domain_id: &Uuid,
        scan_id: &Uuid,
        hostnames: &[String],
    ) -> Result<u64, ApiError> {
        if hostnames.is_empty() {
            return Ok(0);
        }

        let ids: Vec<Uuid> = hostnames.iter().map(|_| Uuid::new_v4()).collect();

        let result = sqlx::query(
            r#"
            INSERT INTO subdomains (id, root_domain_id, hostname, is_active, discovered_at, scan_id)
            SELECT t.id, $2, t.hostname, TRUE, $4, $5
            FROM UNNEST($1::uuid[], $3::text[]) AS t(id, hostname)
            ON CONFLICT (hostname, root_domain_id) DO NOTHING
            "#,
        )
        .bind(&ids)
        .bind(root_domain_id)
        .bind(hostnames)
        .bind(Utc::now())
        .bind(scan_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn hostname_map(&self, root_domain_id: &Uuid) -> Result<HostIndex, ApiError> {
        let rows: Vec<(String, Uuid)> =
            sqlx::query_as("SELECT hostname, id FROM subdomains WHERE root_domain_id = $1")
                .bind(root_domain_id)
                .fetch_all(&self.pool)
                .await?;

        Ok(rows.into_iter().collect())
    }

    async fn list_by_root_domain(&self, root_domain_id: &Uuid) -> Result<Vec<Subdomain>, ApiError> {
        let subdomains = sqlx::query_as::<_, Subdomain>(
            r#"
            SELECT id, root_domain_id, hostname, ip_address, is_active, discovered_at, scan_id
            FROM subdomains
            WHERE root_domain_id = $1
            ORDER BY hostname
            "#,
        )
        .bind(root_domain_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(subdomains)
    }
}
