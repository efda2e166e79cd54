use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Endpoint {
    pub id: Uuid,
    pub subdomain_id: Uuid,
    pub path: String,
    pub method: String,
    pub status_code: Option<i32>,
    pub content_type: Option<String>,
    pub discovered_at: DateTime<Utc>,
    pub scan_id: Option<Uuid>,
}

/// Endpoint values observed by a crawl, keyed by (subdomain, path, method).
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointUpsert {
    pub subdomain_id: Uuid,
    pub path: String,
    pub method: String,
    pub status_code: Option<i32>,
    pub content_type: Option<String>,
    pub scan_id: Uuid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    Query,
    Body,
    Cookie,
    Header,
}

impl ParamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamKind::Query => "query",
            ParamKind::Body => "body",
            ParamKind::Cookie => "cookie",
            ParamKind::Header => "header",
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Parameter {
    pub id: Uuid,
    pub endpoint_id: Uuid,
    pub name: String,
    pub param_type: String,
    pub discovered_at: DateTime<Utc>,
}
