use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "scan_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl ScanStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ScanStatus::Completed | ScanStatus::Failed)
    }
}

/// What a scan targets. Stored as text in `scans.scan_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanKind {
    RootDomain,
    Subdomain,
}

impl ScanKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanKind::RootDomain => "root_domain",
            ScanKind::Subdomain => "subdomain",
        }
    }
}

impl std::fmt::Display for ScanKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ScanKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "root_domain" => Ok(ScanKind::RootDomain),
            "subdomain" => Ok(ScanKind::Subdomain),
            other => Err(format!("Unknown scanType '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Scan {
    pub id: Uuid,
    pub root_domain_id: Uuid,
    pub subdomain_id: Option<Uuid>,
    pub scan_type: String,
    pub status: ScanStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub results_summary: Option<String>,
    pub scan_template_id: Option<Uuid>,
}

/// Values for a new `pending` scan row.
#[derive(Debug, Clone)]
pub struct ScanCreate {
    pub root_domain_id: Uuid,
    pub subdomain_id: Option<Uuid>,
    pub kind: ScanKind,
    pub scan_template_id: Option<Uuid>,
}

/// Body of `POST /api/scans`.
#[derive(Debug, Clone, Deserialize)]
pub struct ScanStartRequest {
    pub root_domain_id: Uuid,
    #[serde(default)]
    pub subdomain_id: Option<Uuid>,
    #[serde(default)]
    pub scan_template_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanStarted {
    pub message: String,
    pub scan_id: Uuid,
}
