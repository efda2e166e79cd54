use futures::stream::{self, StreamExt};
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use url::Url;

use super::reconcile::Reconciler;
use super::snapshot::{join_captures, should_screenshot, SnapshotService};
use super::status::{ErrorLog, URL_SCAN_ERROR};
use super::{host_urls, normalize_hostname, PipelineSettings, ScanRun};
use crate::models::{EndpointUpsert, HostIndex, ParamKind, ScanKind, SnapshotTarget};
use crate::repositories::EndpointRepository;
use crate::services::external::{CrawlEngine, CrawlResult};

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct CrawlSummary {
    pub results_received: usize,
    pub accepted: usize,
    pub out_of_scope: usize,
    pub rejected_status: usize,
    pub new_hosts: usize,
    pub unresolved: usize,
    pub endpoints_saved: usize,
    pub parameters_saved: usize,
    pub screenshots: usize,
}

/// Seeds for the crawl engine: both schemes of the root and every active
/// host for a root-domain scan, only the target's for a subdomain scan.
pub fn crawl_seeds(run: &ScanRun, active: &BTreeSet<String>) -> Vec<String> {
    match run.kind {
        ScanKind::Subdomain => host_urls(&run.target_hostname(), "").to_vec(),
        ScanKind::RootDomain => {
            let root = run.root_hostname();
            let mut seeds = host_urls(&root, "").to_vec();
            for host in active.iter().filter(|host| **host != root) {
                seeds.extend(host_urls(host, ""));
            }
            seeds
        }
    }
}

/// True when `hostname`'s registrable domain is exactly `root_domain`.
pub fn in_scope(hostname: &str, root_domain: &str) -> bool {
    let hostname = normalize_hostname(hostname);
    let registrable = psl::domain_str(&hostname).unwrap_or(hostname.as_str());
    registrable == normalize_hostname(root_domain)
}

/// One accepted crawl observation waiting for a subdomain id.
#[derive(Debug, Clone)]
struct Observation {
    hostname: String,
    url: String,
    path: String,
    method: String,
    status_code: Option<i32>,
    content_type: Option<String>,
    query_params: BTreeSet<String>,
}

fn normalize_path(raw: &str) -> String {
    let path = match Url::parse(raw) {
        Ok(url) => url.path().to_string(),
        Err(_) => raw.split(['?', '#']).next().unwrap_or_default().to_string(),
    };
    if path.is_empty() {
        "/".to_string()
    } else if path.starts_with('/') {
        path
    } else {
        format!("/{}", path)
    }
}

pub struct CrawlPhase {
    crawler: Arc<dyn CrawlEngine + Send + Sync>,
    endpoints: Arc<dyn EndpointRepository + Send + Sync>,
    reconciler: Arc<Reconciler>,
    snapshots: SnapshotService,
    channel_capacity: usize,
    spawn_delay: Duration,
    output_dir: PathBuf,
}

impl CrawlPhase {
    pub fn new(
        crawler: Arc<dyn CrawlEngine + Send + Sync>,
        endpoints: Arc<dyn EndpointRepository + Send + Sync>,
        reconciler: Arc<Reconciler>,
        snapshots: SnapshotService,
        settings: &PipelineSettings,
    ) -> Self {
        Self {
            crawler,
            endpoints,
            reconciler,
            snapshots,
            channel_capacity: settings.crawl_channel_capacity,
            spawn_delay: settings.screenshot_spawn_delay,
            output_dir: settings.crawl_output_dir.clone(),
        }
    }

    pub fn output_file(&self, run: &ScanRun) -> PathBuf {
        self.output_dir
            .join(format!("scan_{}_crawl_results.txt", run.scan_id))
    }

    pub async fn run(
        &self,
        run: &ScanRun,
        active: &BTreeSet<String>,
        index: &HostIndex,
        errors: &ErrorLog,
    ) -> CrawlSummary {
        let seeds = crawl_seeds(run, active);
        let mut summary = CrawlSummary::default();
        if seeds.is_empty() {
            tracing::info!(scan_id = %run.scan_id, "no crawl seeds, skipping");
            return summary;
        }

        tracing::info!(scan_id = %run.scan_id, seeds = seeds.len(), "crawl started");

        let (tx, mut rx) = mpsc::channel::<CrawlResult>(self.channel_capacity);
        let producer = self.spawn_producer(run, seeds, tx, errors.clone());

        let root = run.root_hostname();
        let mut output = self.open_output(run).await;
        let mut observations: Vec<Observation> = Vec::new();
        let mut positions: HashMap<(String, String, String), usize> = HashMap::new();
        let mut new_hosts: BTreeSet<String> = BTreeSet::new();

        while let Some(result) = rx.recv().await {
            summary.results_received += 1;
            let Some(observation) = self.accept(&root, result, &mut summary) else {
                continue;
            };

            if let Some(file) = output.as_mut() {
                if let Err(e) = file.write_all(format!("{}\n", observation.url).as_bytes()).await {
                    tracing::warn!(error = %e, "failed to append crawl result, disabling output file");
                    output = None;
                }
            }

            if !index.contains_key(&observation.hostname) && observation.hostname != root {
                new_hosts.insert(observation.hostname.clone());
            }

            let key = (
                observation.hostname.clone(),
                observation.path.clone(),
                observation.method.clone(),
            );
            match positions.get(&key) {
                Some(&position) => {
                    let existing = &mut observations[position];
                    existing.query_params.extend(observation.query_params);
                    existing.status_code = observation.status_code;
                    existing.content_type = observation.content_type;
                }
                None => {
                    positions.insert(key, observations.len());
                    observations.push(observation);
                }
            }
        }

        if let Err(e) = producer.await {
            errors.record(URL_SCAN_ERROR, format!("crawl task failed: {}", e));
        }
        if let Some(mut file) = output {
            if let Err(e) = file.flush().await {
                tracing::warn!(error = %e, "failed to flush crawl output file");
            }
        }

        summary.new_hosts = new_hosts.len();
        let refreshed = self.register_new_hosts(run, &new_hosts).await;

        let mut captures = JoinSet::new();
        for observation in observations {
            let subdomain_id = refreshed
                .get(&observation.hostname)
                .or_else(|| index.get(&observation.hostname))
                .copied()
                .filter(|id| !id.is_nil());
            let Some(subdomain_id) = subdomain_id else {
                tracing::warn!(
                    scan_id = %run.scan_id,
                    hostname = %observation.hostname,
                    path = %observation.path,
                    "dropping crawl result for unresolved host"
                );
                summary.unresolved += 1;
                continue;
            };

            let upsert = EndpointUpsert {
                subdomain_id,
                path: observation.path.clone(),
                method: observation.method.clone(),
                status_code: observation.status_code,
                content_type: observation.content_type.clone(),
                scan_id: run.scan_id,
            };
            let endpoint = match self.endpoints.upsert_endpoint(&upsert).await {
                Ok(endpoint) => endpoint,
                Err(e) => {
                    tracing::warn!(
                        scan_id = %run.scan_id,
                        method = %upsert.method,
                        path = %upsert.path,
                        error = %e,
                        "failed to save endpoint"
                    );
                    continue;
                }
            };
            summary.endpoints_saved += 1;

            for name in &observation.query_params {
                match self
                    .endpoints
                    .upsert_parameter(&endpoint.id, name, ParamKind::Query)
                    .await
                {
                    Ok(_) => summary.parameters_saved += 1,
                    Err(e) => tracing::warn!(
                        endpoint_id = %endpoint.id,
                        parameter = %name,
                        error = %e,
                        "failed to save parameter"
                    ),
                }
            }

            if run.config.screenshot_enabled && should_screenshot(&observation.url) {
                self.snapshots.spawn(
                    &mut captures,
                    observation.url.clone(),
                    run.scan_id,
                    SnapshotTarget::Endpoint(endpoint.id),
                );
                tokio::time::sleep(self.spawn_delay).await;
            }
        }

        summary.screenshots = join_captures(captures).await;
        tracing::info!(
            scan_id = %run.scan_id,
            received = summary.results_received,
            accepted = summary.accepted,
            endpoints = summary.endpoints_saved,
            unresolved = summary.unresolved,
            "crawl finished"
        );
        summary
    }

    fn spawn_producer(
        &self,
        run: &ScanRun,
        seeds: Vec<String>,
        tx: mpsc::Sender<CrawlResult>,
        errors: ErrorLog,
    ) -> tokio::task::JoinHandle<()> {
        let crawler = Arc::clone(&self.crawler);
        let options = run.config.crawl.clone();
        let parallelism = options.parallelism.max(1) as usize;

        tokio::spawn(async move {
            stream::iter(seeds)
                .map(|seed| {
                    let crawler = Arc::clone(&crawler);
                    let tx = tx.clone();
                    let options = &options;
                    async move {
                        let result = crawler.crawl(&seed, options, tx).await;
                        (seed, result)
                    }
                })
                .buffer_unordered(parallelism)
                .for_each(|(seed, result)| {
                    if let Err(e) = result {
                        errors.record(URL_SCAN_ERROR, format!("{}: {}", seed, e));
                    }
                    futures::future::ready(())
                })
                .await;
        })
    }

    /// Success and scope filter. Returns `None` for anything not persisted.
    fn accept(&self, root: &str, result: CrawlResult, summary: &mut CrawlSummary) -> Option<Observation> {
        let status = match result.status_code {
            Some(status) if (200..400).contains(&status) => status,
            _ => {
                summary.rejected_status += 1;
                return None;
            }
        };

        let hostname = match Url::parse(&result.url).ok().and_then(|u| u.host_str().map(normalize_hostname)) {
            Some(hostname) if !hostname.is_empty() => hostname,
            _ => {
                tracing::debug!(url = %result.url, "crawl result without a host");
                summary.rejected_status += 1;
                return None;
            }
        };

        if !in_scope(&hostname, root) {
            tracing::debug!(url = %result.url, root = %root, "crawl result out of scope");
            summary.out_of_scope += 1;
            return None;
        }

        let method = match result.method.trim() {
            "" => "GET".to_string(),
            method => method.to_uppercase(),
        };
        let path_source = if result.path.is_empty() { &result.url } else { &result.path };

        summary.accepted += 1;
        Some(Observation {
            hostname,
            path: normalize_path(path_source),
            method,
            status_code: Some(i32::from(status)),
            content_type: result.headers.get("content-type").cloned(),
            query_params: result
                .query_params
                .into_iter()
                .filter(|name| !name.is_empty())
                .collect(),
            url: result.url,
        })
    }

    async fn register_new_hosts(&self, run: &ScanRun, new_hosts: &BTreeSet<String>) -> HostIndex {
        if new_hosts.is_empty() {
            return HostIndex::new();
        }

        tracing::info!(scan_id = %run.scan_id, hosts = new_hosts.len(), "saving hosts found while crawling");
        match self.reconciler.persist(run, new_hosts).await {
            Ok(index) => index,
            Err(e) => {
                tracing::warn!(scan_id = %run.scan_id, error = %e, "failed to save crawled hosts");
                HostIndex::new()
            }
        }
    }

    async fn open_output(&self, run: &ScanRun) -> Option<tokio::fs::File> {
        if !run.config.crawl.output_file {
            return None;
        }
        let path = self.output_file(run);
        match tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
        {
            Ok(file) => {
                tracing::info!(path = %path.display(), "writing crawl results to file");
                Some(file)
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "could not open crawl output file");
                None
            }
        }
    }
}
