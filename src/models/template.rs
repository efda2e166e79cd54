use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::HashMap;
use uuid::Uuid;

/// Reusable scan configuration. The three `*_scan_config` columns hold serialized
/// [`ScanSectionConfig`] documents and may be empty or malformed.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ScanTemplate {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub subdomain_scan_config: Option<String>,
    pub url_scan_config: Option<String>,
    pub parameter_scan_config: Option<String>,
    pub tech_detect_enabled: bool,
    pub screenshot_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanSectionConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub tools: HashMap<String, ScanToolConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanToolConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub options: Vec<String>,
}
