use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Screenshot {
    pub id: Uuid,
    pub subdomain_id: Option<Uuid>,
    pub endpoint_id: Option<Uuid>,
    pub url: String,
    pub file_path: String,
    pub scan_id: Uuid,
    pub captured_at: DateTime<Utc>,
}

/// The entity a screenshot is attached to. Exactly one per row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotTarget {
    Subdomain(Uuid),
    Endpoint(Uuid),
}

impl SnapshotTarget {
    pub fn subdomain_id(&self) -> Option<Uuid> {
        match self {
            SnapshotTarget::Subdomain(id) => Some(*id),
            SnapshotTarget::Endpoint(_) => None,
        }
    }

    pub fn endpoint_id(&self) -> Option<Uuid> {
        match self {
            SnapshotTarget::Endpoint(id) => Some(*id),
            SnapshotTarget::Subdomain(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScreenshotCreate {
    pub target: SnapshotTarget,
    pub url: String,
    pub file_path: String,
    pub scan_id: Uuid,
}
