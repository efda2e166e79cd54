use std::sync::Arc;
use uuid::Uuid;

use super::ScanRun;
use crate::error::ApiError;
use crate::models::HostIndex;
use crate::repositories::SubdomainRepository;

/// Writes hostnames as subdomain rows and rebuilds the hostname index from
/// the store afterwards. The conflict-ignoring insert does not report ids
/// for rows that already existed, so the index is always re-read in full.
pub struct Reconciler {
    subdomains: Arc<dyn SubdomainRepository + Send + Sync>,
}

impl Reconciler {
    pub fn new(subdomains: Arc<dyn SubdomainRepository + Send + Sync>) -> Self {
        Self { subdomains }
    }

    pub async fn persist<'a, I>(&self, run: &ScanRun, hostnames: I) -> Result<HostIndex, ApiError>
    where
        I: IntoIterator<Item = &'a String>,
    {
        let hostnames: Vec<String> = hostnames.into_iter().cloned().collect();
        let root_domain_id = run.root_domain.id;

        if hostnames.is_empty() {
            tracing::debug!(scan_id = %run.scan_id, "no hostnames to persist");
        } else {
            let created = self
                .subdomains
                .insert_ignore_conflicts(&root_domain_id, &run.scan_id, &hostnames)
                .await?;
            tracing::info!(
                scan_id = %run.scan_id,
                submitted = hostnames.len(),
                created,
                "subdomains saved"
            );
        }

        self.refresh(&root_domain_id).await
    }

    /// Authoritative hostname -> id map for the root domain. Rows with a nil
    /// id are never handed to later phases.
    pub async fn refresh(&self, root_domain_id: &Uuid) -> Result<HostIndex, ApiError> {
        let mut index = self.subdomains.hostname_map(root_domain_id).await?;
        index.retain(|hostname, id| {
            let usable = !id.is_nil();
            if !usable {
                tracing::warn!(hostname = %hostname, "ignoring subdomain row with nil id");
            }
            usable
        });
        Ok(index)
    }
}
