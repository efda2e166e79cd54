use std::collections::BTreeSet;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use super::status::{ErrorLog, ENUMERATION_ERROR, VERIFICATION_ERROR};
use super::{normalize_hostname, PipelineSettings, ScanRun};
use crate::config::EnumerationOptions;
use crate::models::ScanKind;
use crate::services::external::{
    HostCollector, LivenessOptions, LivenessProber, ProbeCallback, ScanProviders, SubdomainEnumerator,
};

/// Produces the set of active hostnames a scan works on.
pub struct DiscoveryPhase {
    enumerator: Arc<dyn SubdomainEnumerator + Send + Sync>,
    prober: Arc<dyn LivenessProber + Send + Sync>,
    liveness: LivenessOptions,
    stage_timeout: Duration,
}

impl DiscoveryPhase {
    pub fn new(providers: &ScanProviders, settings: &PipelineSettings) -> Self {
        Self {
            enumerator: Arc::clone(&providers.enumerator),
            prober: Arc::clone(&providers.prober),
            liveness: settings.liveness.clone(),
            stage_timeout: settings.discovery_timeout,
        }
    }

    pub async fn run(&self, run: &ScanRun, errors: &ErrorLog) -> BTreeSet<String> {
        let active = match run.kind {
            ScanKind::Subdomain => {
                let target = run.target_hostname();
                tracing::info!(scan_id = %run.scan_id, target = %target, "targeting single subdomain");
                BTreeSet::from([target])
            }
            ScanKind::RootDomain => self.discover_root(run, errors).await,
        };

        let active = without_ip_addresses(active);
        tracing::info!(scan_id = %run.scan_id, active = active.len(), "discovery finished");
        active
    }

    async fn discover_root(&self, run: &ScanRun, errors: &ErrorLog) -> BTreeSet<String> {
        let root = run.root_hostname();
        let candidates = Arc::new(HostCollector::new());
        let responsive = Arc::new(HostCollector::new());

        let stage = self.enumerate_and_verify(run, &root, candidates.clone(), responsive.clone(), errors);
        if tokio::time::timeout(self.stage_timeout, stage).await.is_err() {
            errors.record(
                VERIFICATION_ERROR,
                format!(
                    "discovery stage timed out after {}s, keeping {} responsive of {} candidate hosts",
                    self.stage_timeout.as_secs(),
                    responsive.len(),
                    candidates.len()
                ),
            );
        }

        let mut active: BTreeSet<String> = responsive
            .snapshot()
            .iter()
            .map(|host| normalize_hostname(host))
            .filter(|host| !host.is_empty())
            .collect();

        // The apex is always a candidate, so it is always kept.
        if !active.contains(&root) {
            tracing::debug!(scan_id = %run.scan_id, root = %root, "re-adding root domain to active set");
            active.insert(root);
        }
        active
    }

    async fn enumerate_and_verify(
        &self,
        run: &ScanRun,
        root: &str,
        candidates: Arc<HostCollector>,
        responsive: Arc<HostCollector>,
        errors: &ErrorLog,
    ) {
        if run.config.enumeration_enabled {
            self.enumerate(run, root, &run.config.enumeration, candidates.clone(), errors)
                .await;
        } else {
            tracing::info!(scan_id = %run.scan_id, "subdomain enumeration disabled for this scan");
        }

        candidates.push([root.to_string()]);
        let hosts: Vec<String> = candidates
            .snapshot()
            .iter()
            .map(|host| normalize_hostname(host))
            .filter(|host| !host.is_empty())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        tracing::info!(scan_id = %run.scan_id, candidates = hosts.len(), "verifying candidate hosts");

        let sink = responsive.clone();
        let on_result: ProbeCallback = Arc::new(move |outcome| {
            if outcome.is_responsive() {
                sink.push([outcome.host]);
            } else {
                tracing::trace!(host = %outcome.host, error = ?outcome.error, "host not responsive");
            }
        });

        if let Err(e) = self.prober.probe(hosts, &self.liveness, on_result).await {
            errors.record(VERIFICATION_ERROR, e);
        }
    }

    async fn enumerate(
        &self,
        run: &ScanRun,
        root: &str,
        options: &EnumerationOptions,
        collector: Arc<HostCollector>,
        errors: &ErrorLog,
    ) {
        let deadline = options.deadline();
        tracing::info!(
            scan_id = %run.scan_id,
            domain = %root,
            deadline_secs = deadline.as_secs(),
            "running subdomain enumeration"
        );

        let enumeration = self.enumerator.enumerate(root, options, collector.clone());
        match tokio::time::timeout(deadline, enumeration).await {
            Ok(Ok(())) => {
                tracing::info!(scan_id = %run.scan_id, found = collector.len(), "enumeration finished");
            }
            Ok(Err(e)) => errors.record(ENUMERATION_ERROR, e),
            Err(_) => errors.record(
                ENUMERATION_ERROR,
                format!(
                    "timed out after {}s, keeping {} partial results",
                    deadline.as_secs(),
                    collector.len()
                ),
            ),
        }
    }
}

/// Hostnames only: anything that parses as an IP address (with or without
/// a port or brackets) is dropped.
pub fn without_ip_addresses(hosts: BTreeSet<String>) -> BTreeSet<String> {
    hosts
        .into_iter()
        .filter(|host| {
            let bare = host.trim_start_matches('[').trim_end_matches(']');
            let is_ip = bare.parse::<IpAddr>().is_ok() || host.parse::<SocketAddr>().is_ok();
            if is_ip {
                tracing::debug!(host = %host, "skipping IP address in active set");
            }
            !is_ip
        })
        .collect()
}
