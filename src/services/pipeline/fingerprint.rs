use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use uuid::Uuid;

use super::status::{ErrorLog, TECH_DETECT_ERROR, TECH_TARGET_ERROR};
use super::{host_urls, normalize_hostname, ScanRun};
use crate::error::ApiError;
use crate::models::{DetectionSaveSummary, HostDetections, HostIndex, ScanKind};
use crate::repositories::{EndpointRepository, SubdomainRepository, TechnologyRepository};
use crate::services::external::{Fingerprinter, PageFetcher};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct FingerprintTarget {
    pub url: String,
    pub hostname: String,
    pub endpoint_id: Option<Uuid>,
}

/// Sequential fetch + fingerprint over known hosts and endpoints, persisted
/// as one transactional batch.
pub struct FingerprintPhase {
    fetcher: Arc<dyn PageFetcher + Send + Sync>,
    fingerprinter: Arc<dyn Fingerprinter + Send + Sync>,
    subdomains: Arc<dyn SubdomainRepository + Send + Sync>,
    endpoints: Arc<dyn EndpointRepository + Send + Sync>,
    technologies: Arc<dyn TechnologyRepository + Send + Sync>,
}

impl FingerprintPhase {
    pub fn new(
        fetcher: Arc<dyn PageFetcher + Send + Sync>,
        fingerprinter: Arc<dyn Fingerprinter + Send + Sync>,
        subdomains: Arc<dyn SubdomainRepository + Send + Sync>,
        endpoints: Arc<dyn EndpointRepository + Send + Sync>,
        technologies: Arc<dyn TechnologyRepository + Send + Sync>,
    ) -> Self {
        Self {
            fetcher,
            fingerprinter,
            subdomains,
            endpoints,
            technologies,
        }
    }

    /// Deduplicated URLs to fingerprint, ordered by URL.
    pub async fn gather_targets(&self, run: &ScanRun, index: &HostIndex) -> Result<Vec<FingerprintTarget>, ApiError> {
        let mut targets: BTreeMap<String, FingerprintTarget> = BTreeMap::new();
        let mut add = |hostname: &str, path: &str, endpoint_id: Option<Uuid>| {
            for url in host_urls(hostname, path) {
                targets.entry(url.clone()).or_insert(FingerprintTarget {
                    url,
                    hostname: hostname.to_string(),
                    endpoint_id,
                });
            }
        };

        match run.kind {
            ScanKind::RootDomain => {
                let subdomains = self.subdomains.list_by_root_domain(&run.root_domain.id).await?;
                let hostnames: HashMap<Uuid, String> = subdomains
                    .iter()
                    .map(|s| (s.id, normalize_hostname(&s.hostname)))
                    .collect();
                for hostname in hostnames.values() {
                    add(hostname, "", None);
                }

                let ids: Vec<Uuid> = hostnames.keys().copied().collect();
                if !ids.is_empty() {
                    for endpoint in self.endpoints.list_by_subdomains(&ids).await? {
                        if let Some(hostname) = hostnames.get(&endpoint.subdomain_id) {
                            if !endpoint.path.is_empty() {
                                add(hostname, &endpoint.path, Some(endpoint.id));
                            }
                        }
                    }
                }
            }
            ScanKind::Subdomain => {
                let target = run.target_hostname();
                add(&target, "", None);

                let subdomain_id = index
                    .get(&target)
                    .copied()
                    .or_else(|| run.target.as_ref().map(|s| s.id));
                match subdomain_id {
                    Some(id) => {
                        for endpoint in self.endpoints.list_by_subdomain(&id).await? {
                            if !endpoint.path.is_empty() {
                                add(&target, &endpoint.path, Some(endpoint.id));
                            }
                        }
                    }
                    None => tracing::warn!(
                        scan_id = %run.scan_id,
                        target = %target,
                        "no id for target subdomain, fingerprinting host only"
                    ),
                }
            }
        }

        Ok(targets.into_values().collect())
    }

    pub async fn run(&self, run: &ScanRun, index: &HostIndex, errors: &ErrorLog) -> Option<DetectionSaveSummary> {
        let targets = match self.gather_targets(run, index).await {
            Ok(targets) => targets,
            Err(e) => {
                errors.record(TECH_TARGET_ERROR, e);
                return None;
            }
        };
        if targets.is_empty() {
            tracing::info!(scan_id = %run.scan_id, "no fingerprint targets, skipping");
            return None;
        }

        tracing::info!(scan_id = %run.scan_id, urls = targets.len(), "technology detection started");

        let mut failures: Vec<String> = Vec::new();
        let mut grouped: BTreeMap<(String, Option<Uuid>), BTreeSet<String>> = BTreeMap::new();

        for target in &targets {
            let page = match self.fetcher.fetch(&target.url).await {
                Ok(page) => page,
                Err(e) => {
                    tracing::warn!(scan_id = %run.scan_id, url = %target.url, error = %e, "fingerprint fetch failed");
                    failures.push(format!("url {}: {}", target.url, e));
                    continue;
                }
            };

            let detected = self.fingerprinter.fingerprint(&page.headers, &page.body);
            if detected.is_empty() {
                tracing::debug!(url = %target.url, status = page.status, "no technologies detected");
                continue;
            }
            tracing::debug!(url = %target.url, found = detected.len(), "technologies detected");

            grouped
                .entry((target.hostname.clone(), target.endpoint_id))
                .or_default()
                .extend(
                    detected
                        .into_iter()
                        .map(|name| name.trim().to_lowercase())
                        .filter(|name| !name.is_empty()),
                );
        }

        let detections: Vec<HostDetections> = grouped
            .into_iter()
            .map(|((hostname, endpoint_id), technologies)| HostDetections {
                hostname,
                endpoint_id,
                technologies,
            })
            .collect();

        let mut saved = None;
        if !detections.is_empty() {
            match self
                .technologies
                .save_detections(&run.root_domain.id, &run.scan_id, &detections)
                .await
            {
                Ok(summary) => {
                    tracing::info!(
                        scan_id = %run.scan_id,
                        subdomain_links = summary.subdomain_links,
                        endpoint_links = summary.endpoint_links,
                        skipped = summary.skipped_hosts.len(),
                        "technologies saved"
                    );
                    saved = Some(summary);
                }
                Err(e) => failures.push(format!("failed to save technologies: {}", e)),
            }
        }

        if let Some(first) = failures.first() {
            errors.record(
                TECH_DETECT_ERROR,
                format!(
                    "technology detection encountered {} error(s), first: {}",
                    failures.len(),
                    first
                ),
            );
        }
        saved
    }
}
