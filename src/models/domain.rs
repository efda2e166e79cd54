use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::HashMap;
use uuid::Uuid;

/// Authoritative hostname -> subdomain id mapping for one root domain.
pub type HostIndex = HashMap<String, Uuid>;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Organization {
    pub id: Uuid,
    pub name: String,
    pub notes: Option<String>,
    pub bug_bounty_link: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A registrable domain under management.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct RootDomain {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub domain: String,
    pub created_at: DateTime<Utc>,
    pub last_scanned_at: Option<DateTime<Utc>>,
}

/// A hostname observed under a root domain. The apex itself is stored as one of these.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Subdomain {
    pub id: Uuid,
    pub root_domain_id: Uuid,
    pub hostname: String,
    pub ip_address: Option<String>,
    pub is_active: bool,
    pub discovered_at: DateTime<Utc>,
    pub scan_id: Option<Uuid>,
}
