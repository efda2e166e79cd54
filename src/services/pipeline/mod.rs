//! The scan pipeline: discovery, reconciliation, crawl, fingerprint and
//! snapshot phases, plus the status tracker that closes a scan out.
//!
//! Phases never abort each other. Provider and store failures are recorded
//! in the scan's [`ErrorLog`] and surface only in the final summary.

pub mod crawl;
pub mod discovery;
pub mod fingerprint;
pub mod reconcile;
pub mod snapshot;
pub mod status;

use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

pub use crawl::{crawl_seeds, in_scope, CrawlPhase, CrawlSummary};
pub use discovery::DiscoveryPhase;
pub use fingerprint::{FingerprintPhase, FingerprintTarget};
pub use reconcile::Reconciler;
pub use snapshot::{sanitize_filename, should_screenshot, SnapshotService};
pub use status::{scan_outcome, ErrorLog, StatusTracker, SUCCESS_SUMMARY};

use crate::config::{ResolvedScanConfig, Settings};
use crate::models::{RootDomain, ScanKind, Subdomain};
use crate::services::external::LivenessOptions;

/// Everything the phases need to know about the scan being executed.
#[derive(Debug, Clone)]
pub struct ScanRun {
    pub scan_id: Uuid,
    pub kind: ScanKind,
    pub root_domain: RootDomain,
    /// Present only for subdomain-targeted scans.
    pub target: Option<Subdomain>,
    pub config: ResolvedScanConfig,
}

impl ScanRun {
    pub fn root_hostname(&self) -> String {
        normalize_hostname(&self.root_domain.domain)
    }

    /// The host the scan was started against: the target subdomain when
    /// there is one, otherwise the root domain.
    pub fn target_hostname(&self) -> String {
        match &self.target {
            Some(subdomain) => normalize_hostname(&subdomain.hostname),
            None => self.root_hostname(),
        }
    }
}

pub fn normalize_hostname(raw: &str) -> String {
    raw.trim().trim_end_matches('.').to_lowercase()
}

/// `http://` and `https://` variants of a host, optionally with a path.
pub fn host_urls(hostname: &str, path: &str) -> [String; 2] {
    let path = if path.is_empty() || path == "/" {
        String::new()
    } else if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    };
    [
        format!("http://{}{}", hostname, path),
        format!("https://{}{}", hostname, path),
    ]
}

/// Process-level knobs the phases read, lifted out of [`Settings`].
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub discovery_timeout: Duration,
    pub liveness: LivenessOptions,
    pub capture_timeout: Duration,
    pub screenshot_dir: PathBuf,
    pub screenshot_spawn_delay: Duration,
    pub crawl_channel_capacity: usize,
    pub crawl_output_dir: PathBuf,
}

impl PipelineSettings {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            discovery_timeout: Duration::from_secs(settings.discovery_timeout_seconds),
            liveness: LivenessOptions {
                timeout: Duration::from_secs(settings.liveness_timeout_seconds),
                concurrency: settings.liveness_concurrency.max(1) as usize,
                ..LivenessOptions::default()
            },
            capture_timeout: Duration::from_secs(settings.capture_timeout_seconds),
            screenshot_dir: PathBuf::from(&settings.screenshot_dir),
            screenshot_spawn_delay: Duration::from_millis(settings.screenshot_spawn_delay_ms),
            crawl_channel_capacity: settings.crawl_channel_capacity.max(1) as usize,
            crawl_output_dir: std::env::temp_dir(),
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            discovery_timeout: Duration::from_secs(900),
            liveness: LivenessOptions::default(),
            capture_timeout: Duration::from_secs(120),
            screenshot_dir: PathBuf::from("./data/screenshots"),
            screenshot_spawn_delay: Duration::from_secs(1),
            crawl_channel_capacity: 100,
            crawl_output_dir: std::env::temp_dir(),
        }
    }
}
