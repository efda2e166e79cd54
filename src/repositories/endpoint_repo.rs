use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::{
    database::DatabasePool,
    error::ApiError,
    models::{Endpoint, EndpointUpsert, ParamKind, Parameter},
};

#[async_trait]
pub trait EndpointRepository {
    /// Insert or refresh the endpoint identified by (subdomain, path, method).
    async fn upsert_endpoint(&self, endpoint: &EndpointUpsert) -> Result<Endpoint, ApiError>;

    /// Insert or refresh the parameter identified by (endpoint, name, kind).
    async fn upsert_parameter(
        &self,
        endpoint_id: &Uuid,
        name: &str,
        kind: ParamKind,
    ) -> Result<Parameter, ApiError>;

    async fn list_by_subdomain(&self, subdomain_id: &Uuid) -> Result<Vec<Endpoint>, ApiError>;

    async fn list_by_subdomains(&self, subdomain_ids: &[Uuid]) -> Result<Vec<Endpoint>, ApiError>;
}

pub struct SqlxEndpointRepository {
    pool: DatabasePool,
}

impl SqlxEndpointRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EndpointRepository for SqlxEndpointRepository {
    async fn upsert_endpoint(&self, endpoint: &EndpointUpsert) -> Result<Endpoint, ApiError> {
        if endpoint.subdomain_id.is_nil() {
            return Err(ApiError::validation("endpoint upsert without a subdomain id"));
        }

        let row = sqlx::query_as::<_, Endpoint>(
            r#"
            INSERT INTO endpoints (id, subdomain_id, path, method, status_code, content_type, discovered_at, scan_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (subdomain_id, path, method) DO UPDATE
            SET status_code = EXCLUDED.status_code,
                content_type = EXCLUDED.content_type,
                discovered_at = EXCLUDED.discovered_at,
                scan_id = EXCLUDED.scan_id
            RETURNING id, subdomain_id, path, method, status_code, content_type, discovered_at, scan_id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(endpoint.subdomain_id)
        .bind(&endpoint.path)
        .bind(&endpoint.method)
        .bind(endpoint.status_code)
        .bind(&endpoint.content_type)
        .bind(Utc::now())
        .bind(endpoint.scan_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    async fn upsert_parameter(
        &self,
        endpoint_id: &Uuid,
        name: &str,
        kind: ParamKind,
    ) -> Result<Parameter, ApiError> {
        if endpoint_id.is_nil() {
            return Err(ApiError::validation("parameter upsert without an endpoint id"));
        }

        let row = sqlx::query_as::<_, Parameter>(
            r#"
            INSERT INTO parameters (id, endpoint_id, name, param_type, discovered_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (endpoint_id, name, param_type) DO UPDATE
            SET discovered_at = EXCLUDED.discovered_at
            RETURNING id, endpoint_id, name, param_type, discovered_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(endpoint_id)
        .bind(name)
        .bind(kind.as_str())
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    async fn list_by_subdomain(&self, subdomain_id: &Uuid) -> Result<Vec<Endpoint>, ApiError> {
        self.list_by_subdomains(std::slice::from_ref(subdomain_id)).await
    }

    async fn list_by_subdomains(&self, subdomain_ids: &[Uuid]) -> Result<Vec<Endpoint>, ApiError> {
        if subdomain_ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, Endpoint>(
            r#"
            SELECT id, subdomain_id, path, method, status_code, content_type, discovered_at, scan_id
            FROM endpoints
            WHERE subdomain_id = ANY($1)
            ORDER BY subdomain_id, path, method
            "#,
        )
        .bind(subdomain_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}
