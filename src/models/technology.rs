use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::BTreeSet;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Technology {
    pub id: Uuid,
    pub name: String,
    pub category: Option<String>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SubdomainTechnology {
    pub subdomain_id: Uuid,
    pub technology_id: Uuid,
    pub confidence: Option<f64>,
    pub detected_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct EndpointTechnology {
    pub endpoint_id: Uuid,
    pub technology_id: Uuid,
    pub confidence: Option<f64>,
    pub detected_at: DateTime<Utc>,
}

/// Technology joined with its detection time for one subdomain.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DetectedTechnology {
    pub id: Uuid,
    pub name: String,
    pub category: Option<String>,
    pub detected_at: DateTime<Utc>,
}

/// Detections for one fingerprinted URL, written as part of a single transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct HostDetections {
    pub hostname: String,
    pub endpoint_id: Option<Uuid>,
    /// Lower-cased technology names.
    pub technologies: BTreeSet<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DetectionSaveSummary {
    pub technologies_created: usize,
    pub subdomain_links: usize,
    pub endpoint_links: usize,
    pub skipped_hosts: Vec<String>,
    pub apex_created: bool,
}
