use std::fmt::Display;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::ScanStatus;
use crate::repositories::{RootDomainRepository, ScanRepositories, ScanRepository};

pub const SUCCESS_SUMMARY: &str = "Scan completed successfully";
pub const INTERRUPTED_SUMMARY: &str = "Internal error: scan interrupted by server shutdown";

pub const ENUMERATION_ERROR: &str = "Subdomain enumeration";
pub const VERIFICATION_ERROR: &str = "Subdomain verification";
pub const SAVE_ERROR: &str = "Subdomain Save/ID Fetch";
pub const URL_SCAN_ERROR: &str = "URL Scan";
pub const TECH_DETECT_ERROR: &str = "Tech Detect";
pub const TECH_TARGET_ERROR: &str = "Tech Detect Target Fetch";

/// Per-scan list of non-fatal failures, shared by every phase and task of
/// one scan.
#[derive(Debug, Clone, Default)]
pub struct ErrorLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl ErrorLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, prefix: &str, error: impl Display) {
        let entry = format!("{}: {}", prefix, error);
        tracing::warn!(error = %entry, "scan error recorded");
        self.entries
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(entry);
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Terminal status and summary for a finished scan: `failed` with the
/// joined errors iff anything was recorded.
pub fn scan_outcome(errors: &[String]) -> (ScanStatus, String) {
    if errors.is_empty() {
        (ScanStatus::Completed, SUCCESS_SUMMARY.to_string())
    } else {
        (ScanStatus::Failed, errors.join("; "))
    }
}

pub struct StatusTracker {
    scans: Arc<dyn ScanRepository + Send + Sync>,
    root_domains: Arc<dyn RootDomainRepository + Send + Sync>,
}

impl StatusTracker {
    pub fn new(repos: &ScanRepositories) -> Self {
        Self {
            scans: Arc::clone(&repos.scans),
            root_domains: Arc::clone(&repos.root_domains),
        }
    }

    pub async fn mark_running(&self, scan_id: &Uuid) -> Result<(), ApiError> {
        self.scans.mark_running(scan_id).await?;
        tracing::info!(scan_id = %scan_id, "scan running");
        Ok(())
    }

    pub async fn finalize(
        &self,
        scan_id: &Uuid,
        root_domain_id: &Uuid,
        errors: &ErrorLog,
    ) -> Result<ScanStatus, ApiError> {
        let (status, summary) = scan_outcome(&errors.entries());
        self.scans.finish(scan_id, status, &summary).await?;
        self.touch_root(root_domain_id).await;

        match status {
            ScanStatus::Completed => tracing::info!(scan_id = %scan_id, "scan completed"),
            _ => tracing::warn!(scan_id = %scan_id, errors = errors.len(), summary = %summary, "scan finished with errors"),
        }
        Ok(status)
    }

    /// Invariant violation: the scan goes straight to `failed` and no
    /// further phase runs.
    pub async fn fail_fatal(
        &self,
        scan_id: &Uuid,
        root_domain_id: Option<&Uuid>,
        message: &str,
    ) -> Result<(), ApiError> {
        tracing::error!(scan_id = %scan_id, error = %message, "scan aborted");
        self.scans.finish(scan_id, ScanStatus::Failed, message).await?;
        if let Some(root_domain_id) = root_domain_id {
            self.touch_root(root_domain_id).await;
        }
        Ok(())
    }

    async fn touch_root(&self, root_domain_id: &Uuid) {
        if let Err(e) = self.root_domains.touch_last_scanned(root_domain_id).await {
            tracing::warn!(root_domain_id = %root_domain_id, error = %e, "failed to stamp last_scanned_at");
        }
    }
}
