#![allow(dead_code)]

//! In-memory repositories and scripted providers for driving the scan
//! pipeline without PostgreSQL or the network.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;
use uuid::Uuid;

use surface_backend::{
    config::{CrawlOptions, EnumerationOptions},
    error::ApiError,
    models::{
        DetectedTechnology, DetectionSaveSummary, Endpoint, EndpointUpsert, HostDetections, HostIndex,
        ParamKind, Parameter, RootDomain, Scan, ScanCreate, ScanStartRequest, ScanStatus, ScanTemplate,
        Screenshot, ScreenshotCreate, Subdomain,
    },
    repositories::{
        EndpointRepository, RootDomainRepository, ScanRepositories, ScanRepository, ScreenshotRepository,
        SubdomainRepository, TechnologyRepository, TemplateRepository,
    },
    services::{
        external::{
            CaptureEngine, CaptureOptions, CrawlEngine, CrawlResult, FetchedPage, Fingerprinter,
            HostCollector, LivenessOptions, LivenessProber, PageFetcher, ProbeCallback, ProbeOutcome,
            ScanProviders, SubdomainEnumerator,
        },
        pipeline::PipelineSettings,
        ScanService, TaskManager,
    },
};

pub const TECH_HEADER: &str = "x-test-tech";

#[derive(Default)]
struct State {
    root_domains: HashMap<Uuid, RootDomain>,
    subdomains: Vec<Subdomain>,
    endpoints: Vec<Endpoint>,
    parameters: Vec<Parameter>,
    technologies: HashMap<String, Uuid>,
    subdomain_technologies: BTreeSet<(Uuid, Uuid)>,
    endpoint_technologies: BTreeSet<(Uuid, Uuid)>,
    scans: HashMap<Uuid, Scan>,
    screenshots: Vec<Screenshot>,
    templates: HashMap<Uuid, ScanTemplate>,
    fail_technology_save: bool,
    fail_mark_running: bool,
    hidden_hosts: HashSet<String>,
}

/// One store standing in for every repository, with the same natural-key
/// uniqueness rules as the schema.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn repositories(self: &Arc<Self>) -> ScanRepositories {
        ScanRepositories {
            scans: self.clone(),
            root_domains: self.clone(),
            subdomains: self.clone(),
            endpoints: self.clone(),
            technologies: self.clone(),
            screenshots: self.clone(),
            templates: self.clone(),
        }
    }

    pub fn add_root_domain(&self, domain: &str) -> RootDomain {
        let root = RootDomain {
            id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            domain: domain.to_string(),
            created_at: Utc::now(),
            last_scanned_at: None,
        };
        self.state.lock().unwrap().root_domains.insert(root.id, root.clone());
        root
    }

    pub fn add_subdomain(&self, root_domain_id: Uuid, hostname: &str) -> Subdomain {
        let subdomain = Subdomain {
            id: Uuid::new_v4(),
            root_domain_id,
            hostname: hostname.to_string(),
            ip_address: None,
            is_active: true,
            discovered_at: Utc::now(),
            scan_id: None,
        };
        self.state.lock().unwrap().subdomains.push(subdomain.clone());
        subdomain
    }

    pub fn add_endpoint(&self, subdomain_id: Uuid, path: &str) -> Endpoint {
        let endpoint = Endpoint {
            id: Uuid::new_v4(),
            subdomain_id,
            path: path.to_string(),
            method: "GET".to_string(),
            status_code: Some(200),
            content_type: None,
            discovered_at: Utc::now(),
            scan_id: None,
        };
        self.state.lock().unwrap().endpoints.push(endpoint.clone());
        endpoint
    }

    pub fn add_template(&self, template: ScanTemplate) {
        self.state.lock().unwrap().templates.insert(template.id, template);
    }

    pub fn remove_template(&self, id: &Uuid) {
        self.state.lock().unwrap().templates.remove(id);
    }

    pub fn insert_scan(&self, scan: Scan) {
        self.state.lock().unwrap().scans.insert(scan.id, scan);
    }

    /// Inserts for `hostname` succeed silently but never become visible,
    /// like a row lost between the insert and the read-back.
    pub fn hide_host(&self, hostname: &str) {
        self.state.lock().unwrap().hidden_hosts.insert(hostname.to_string());
    }

    pub fn fail_technology_saves(&self) {
        self.state.lock().unwrap().fail_technology_save = true;
    }

    pub fn fail_mark_running(&self) {
        self.state.lock().unwrap().fail_mark_running = true;
    }

    pub fn scan(&self, id: &Uuid) -> Scan {
        self.state.lock().unwrap().scans[id].clone()
    }

    pub fn root_domain(&self, id: &Uuid) -> RootDomain {
        self.state.lock().unwrap().root_domains[id].clone()
    }

    pub fn hostnames(&self, root_domain_id: &Uuid) -> Vec<String> {
        let mut hosts: Vec<String> = self
            .state
            .lock()
            .unwrap()
            .subdomains
            .iter()
            .filter(|s| s.root_domain_id == *root_domain_id)
            .map(|s| s.hostname.clone())
            .collect();
        hosts.sort();
        hosts
    }

    pub fn subdomain_id(&self, hostname: &str) -> Option<Uuid> {
        self.state
            .lock()
            .unwrap()
            .subdomains
            .iter()
            .find(|s| s.hostname == hostname)
            .map(|s| s.id)
    }

    pub fn endpoints(&self) -> Vec<Endpoint> {
        self.state.lock().unwrap().endpoints.clone()
    }

    pub fn endpoint_paths(&self, hostname: &str) -> Vec<String> {
        let Some(id) = self.subdomain_id(hostname) else {
            return Vec::new();
        };
        let mut paths: Vec<String> = self
            .endpoints()
            .into_iter()
            .filter(|e| e.subdomain_id == id)
            .map(|e| e.path)
            .collect();
        paths.sort();
        paths
    }

    pub fn parameters(&self) -> Vec<Parameter> {
        self.state.lock().unwrap().parameters.clone()
    }

    pub fn technologies_for(&self, hostname: &str) -> BTreeSet<String> {
        let Some(subdomain_id) = self.subdomain_id(hostname) else {
            return BTreeSet::new();
        };
        let state = self.state.lock().unwrap();
        state
            .technologies
            .iter()
            .filter(|(_, id)| state.subdomain_technologies.contains(&(subdomain_id, **id)))
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn technology_row_count(&self) -> usize {
        self.state.lock().unwrap().technologies.len()
    }

    pub fn endpoint_technology_count(&self) -> usize {
        self.state.lock().unwrap().endpoint_technologies.len()
    }

    pub fn screenshots(&self) -> Vec<Screenshot> {
        self.state.lock().unwrap().screenshots.clone()
    }
}

#[async_trait]
impl ScanRepository for MemoryStore {
    async fn create(&self, scan: &ScanCreate) -> Result<Scan, ApiError> {
        let row = Scan {
            id: Uuid::new_v4(),
            root_domain_id: scan.root_domain_id,
            subdomain_id: scan.subdomain_id,
            scan_type: scan.kind.as_str().to_string(),
            status: ScanStatus::Pending,
            started_at: Utc::now(),
            completed_at: None,
            results_summary: None,
            scan_template_id: scan.scan_template_id,
        };
        self.state.lock().unwrap().scans.insert(row.id, row.clone());
        Ok(row)
    }

    async fn get_by_id(&self, id: &Uuid) -> Result<Option<Scan>, ApiError> {
        Ok(self.state.lock().unwrap().scans.get(id).cloned())
    }

    async fn list_by_root_domain(&self, root_domain_id: &Uuid) -> Result<Vec<Scan>, ApiError> {
        let mut scans: Vec<Scan> = self
            .state
            .lock()
            .unwrap()
            .scans
            .values()
            .filter(|s| s.root_domain_id == *root_domain_id)
            .cloned()
            .collect();
        scans.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(scans)
    }

    async fn mark_running(&self, id: &Uuid) -> Result<(), ApiError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_mark_running {
            return Err(ApiError::internal("connection reset while marking scan running"));
        }
        let scan = state
            .scans
            .get_mut(id)
            .ok_or_else(|| ApiError::not_found(format!("Scan {} not found", id)))?;
        scan.status = ScanStatus::Running;
        scan.started_at = Utc::now();
        Ok(())
    }

    async fn finish(&self, id: &Uuid, status: ScanStatus, summary: &str) -> Result<(), ApiError> {
        let mut state = self.state.lock().unwrap();
        let scan = state
            .scans
            .get_mut(id)
            .ok_or_else(|| ApiError::not_found(format!("Scan {} not found", id)))?;
        scan.status = status;
        scan.completed_at = Some(Utc::now());
        scan.results_summary = Some(summary.to_string());
        Ok(())
    }
}

#[async_trait]
impl RootDomainRepository for MemoryStore {
    async fn get_by_id(&self, id: &Uuid) -> Result<Option<RootDomain>, ApiError> {
        Ok(self.state.lock().unwrap().root_domains.get(id).cloned())
    }

    async fn touch_last_scanned(&self, id: &Uuid) -> Result<(), ApiError> {
        if let Some(root) = self.state.lock().unwrap().root_domains.get_mut(id) {
            root.last_scanned_at = Some(Utc::now());
        }
        Ok(())
    }
}

#[async_trait]
impl SubdomainRepository for MemoryStore {
    async fn get_by_id(&self, id: &Uuid) -> Result<Option<Subdomain>, ApiError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .subdomains
            .iter()
            .find(|s| s.id == *id)
            .cloned())
    }

    async fn insert_ignore_conflicts(
        &self,
        root_domain_id: &Uuid,
        scan_id: &Uuid,
        hostnames: &[String],
    ) -> Result<u64, ApiError> {
        let mut state = self.state.lock().unwrap();
        let mut created = 0;
        for hostname in hostnames {
            let hostname = hostname.to_lowercase();
            if state.hidden_hosts.contains(&hostname) {
                continue;
            }
            let exists = state
                .subdomains
                .iter()
                .any(|s| s.root_domain_id == *root_domain_id && s.hostname == hostname);
            if exists {
                continue;
            }
            state.subdomains.push(Subdomain {
                id: Uuid::new_v4(),
                root_domain_id: *root_domain_id,
                hostname,
                ip_address: None,
                is_active: true,
                discovered_at: Utc::now(),
                scan_id: Some(*scan_id),
            });
            created += 1;
        }
        Ok(created)
    }

    async fn hostname_map(&self, root_domain_id: &Uuid) -> Result<HostIndex, ApiError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .subdomains
            .iter()
            .filter(|s| s.root_domain_id == *root_domain_id)
            .map(|s| (s.hostname.to_lowercase(), s.id))
            .collect())
    }

    async fn list_by_root_domain(&self, root_domain_id: &Uuid) -> Result<Vec<Subdomain>, ApiError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .subdomains
            .iter()
            .filter(|s| s.root_domain_id == *root_domain_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl EndpointRepository for MemoryStore {
    async fn upsert_endpoint(&self, endpoint: &EndpointUpsert) -> Result<Endpoint, ApiError> {
        if endpoint.subdomain_id.is_nil() {
            return Err(ApiError::validation("endpoint upsert without a subdomain id"));
        }
        let mut state = self.state.lock().unwrap();
        if let Some(existing) = state.endpoints.iter_mut().find(|e| {
            e.subdomain_id == endpoint.subdomain_id && e.path == endpoint.path && e.method == endpoint.method
        }) {
            existing.status_code = endpoint.status_code;
            existing.content_type = endpoint.content_type.clone();
            existing.scan_id = Some(endpoint.scan_id);
            return Ok(existing.clone());
        }
        let row = Endpoint {
            id: Uuid::new_v4(),
            subdomain_id: endpoint.subdomain_id,
            path: endpoint.path.clone(),
            method: endpoint.method.clone(),
            status_code: endpoint.status_code,
            content_type: endpoint.content_type.clone(),
            discovered_at: Utc::now(),
            scan_id: Some(endpoint.scan_id),
        };
        state.endpoints.push(row.clone());
        Ok(row)
    }

    async fn upsert_parameter(
        &self,
        endpoint_id: &Uuid,
        name: &str,
        kind: ParamKind,
    ) -> Result<Parameter, ApiError> {
        if endpoint_id.is_nil() {
            return Err(ApiError::validation("parameter upsert without an endpoint id"));
        }
        let mut state = self.state.lock().unwrap();
        if let Some(existing) = state
            .parameters
            .iter()
            .find(|p| p.endpoint_id == *endpoint_id && p.name == name && p.param_type == kind.as_str())
        {
            return Ok(existing.clone());
        }
        let row = Parameter {
            id: Uuid::new_v4(),
            endpoint_id: *endpoint_id,
            name: name.to_string(),
            param_type: kind.as_str().to_string(),
            discovered_at: Utc::now(),
        };
        state.parameters.push(row.clone());
        Ok(row)
    }

    async fn list_by_subdomain(&self, subdomain_id: &Uuid) -> Result<Vec<Endpoint>, ApiError> {
        self.list_by_subdomains(&[*subdomain_id]).await
    }

    async fn list_by_subdomains(&self, subdomain_ids: &[Uuid]) -> Result<Vec<Endpoint>, ApiError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .endpoints
            .iter()
            .filter(|e| subdomain_ids.contains(&e.subdomain_id))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl TechnologyRepository for MemoryStore {
    async fn save_detections(
        &self,
        root_domain_id: &Uuid,
        scan_id: &Uuid,
        detections: &[HostDetections],
    ) -> Result<DetectionSaveSummary, ApiError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_technology_save {
            return Err(ApiError::internal("technology write failed"));
        }

        // Work on copies so a failure leaves nothing behind.
        let apex = match state.root_domains.get(root_domain_id) {
            Some(root) => root.domain.to_lowercase(),
            None => return Err(ApiError::not_found(format!("Root domain with id {} not found", root_domain_id))),
        };
        let mut hosts: HashMap<String, Uuid> = state
            .subdomains
            .iter()
            .filter(|s| s.root_domain_id == *root_domain_id)
            .map(|s| (s.hostname.to_lowercase(), s.id))
            .collect();
        let mut summary = DetectionSaveSummary::default();
        let mut new_subdomains = Vec::new();
        let mut technologies = state.technologies.clone();
        let mut subdomain_links = state.subdomain_technologies.clone();
        let mut endpoint_links = state.endpoint_technologies.clone();

        for detection in detections.iter().filter(|d| !d.technologies.is_empty()) {
            let hostname = detection.hostname.to_lowercase();
            let subdomain_id = match hosts.get(&hostname) {
                Some(id) => *id,
                None if hostname == apex => {
                    let id = Uuid::new_v4();
                    new_subdomains.push(Subdomain {
                        id,
                        root_domain_id: *root_domain_id,
                        hostname: hostname.clone(),
                        ip_address: None,
                        is_active: true,
                        discovered_at: Utc::now(),
                        scan_id: Some(*scan_id),
                    });
                    summary.apex_created = true;
                    hosts.insert(hostname, id);
                    id
                }
                None => {
                    if !summary.skipped_hosts.contains(&hostname) {
                        summary.skipped_hosts.push(hostname);
                    }
                    continue;
                }
            };

            for name in &detection.technologies {
                let name = name.to_lowercase();
                let technology_id = *technologies.entry(name).or_insert_with(|| {
                    summary.technologies_created += 1;
                    Uuid::new_v4()
                });
                if subdomain_links.insert((subdomain_id, technology_id)) {
                    summary.subdomain_links += 1;
                }
                if let Some(endpoint_id) = detection.endpoint_id {
                    if endpoint_links.insert((endpoint_id, technology_id)) {
                        summary.endpoint_links += 1;
                    }
                }
            }
        }

        state.subdomains.extend(new_subdomains);
        state.technologies = technologies;
        state.subdomain_technologies = subdomain_links;
        state.endpoint_technologies = endpoint_links;
        Ok(summary)
    }

    async fn list_by_subdomain(&self, subdomain_id: &Uuid) -> Result<Vec<DetectedTechnology>, ApiError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .technologies
            .iter()
            .filter(|(_, id)| state.subdomain_technologies.contains(&(*subdomain_id, **id)))
            .map(|(name, id)| DetectedTechnology {
                id: *id,
                name: name.clone(),
                category: None,
                detected_at: Utc::now(),
            })
            .collect())
    }
}

#[async_trait]
impl ScreenshotRepository for MemoryStore {
    async fn create(&self, screenshot: &ScreenshotCreate) -> Result<Screenshot, ApiError> {
        let row = Screenshot {
            id: Uuid::new_v4(),
            subdomain_id: screenshot.target.subdomain_id(),
            endpoint_id: screenshot.target.endpoint_id(),
            url: screenshot.url.clone(),
            file_path: screenshot.file_path.clone(),
            scan_id: screenshot.scan_id,
            captured_at: Utc::now(),
        };
        self.state.lock().unwrap().screenshots.push(row.clone());
        Ok(row)
    }

    async fn list_by_scan(&self, scan_id: &Uuid) -> Result<Vec<Screenshot>, ApiError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .screenshots
            .iter()
            .filter(|s| s.scan_id == *scan_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl TemplateRepository for MemoryStore {
    async fn get_by_id(&self, id: &Uuid) -> Result<Option<ScanTemplate>, ApiError> {
        Ok(self.state.lock().unwrap().templates.get(id).cloned())
    }

    async fn list(&self) -> Result<Vec<ScanTemplate>, ApiError> {
        let mut templates: Vec<ScanTemplate> = self.state.lock().unwrap().templates.values().cloned().collect();
        templates.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(templates)
    }
}

/// Pushes a fixed host list, then fails, hangs or returns.
#[derive(Default)]
pub struct FakeEnumerator {
    pub hosts: Vec<String>,
    pub error: Option<String>,
    pub hang: bool,
    pub panic: Option<String>,
}

#[async_trait]
impl SubdomainEnumerator for FakeEnumerator {
    async fn enumerate(
        &self,
        _domain: &str,
        _options: &EnumerationOptions,
        collector: Arc<HostCollector>,
    ) -> Result<(), ApiError> {
        collector.push(self.hosts.iter().cloned());
        if let Some(message) = &self.panic {
            panic!("{}", message);
        }
        if self.hang {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        match &self.error {
            Some(message) => Err(ApiError::external_service(message.clone())),
            None => Ok(()),
        }
    }
}

/// Every host answers 200 unless listed as unresponsive.
#[derive(Default)]
pub struct FakeProber {
    pub unresponsive: HashSet<String>,
    pub error: Option<String>,
    pub probed: Mutex<Vec<String>>,
}

#[async_trait]
impl LivenessProber for FakeProber {
    async fn probe(
        &self,
        hosts: Vec<String>,
        _options: &LivenessOptions,
        on_result: ProbeCallback,
    ) -> Result<(), ApiError> {
        for host in hosts {
            self.probed.lock().unwrap().push(host.clone());
            let outcome = if self.unresponsive.contains(&host) {
                ProbeOutcome {
                    host,
                    status_code: None,
                    error: Some("connection refused".to_string()),
                }
            } else {
                ProbeOutcome {
                    host,
                    status_code: Some(200),
                    error: None,
                }
            };
            on_result(outcome);
        }
        match &self.error {
            Some(message) => Err(ApiError::external_service(message.clone())),
            None => Ok(()),
        }
    }
}

/// Replays scripted results per seed and remembers which seeds it saw.
#[derive(Default)]
pub struct FakeCrawler {
    pub results: HashMap<String, Vec<CrawlResult>>,
    pub seeds: Mutex<Vec<String>>,
}

impl FakeCrawler {
    pub fn with(results: Vec<(&str, Vec<CrawlResult>)>) -> Self {
        Self {
            results: results
                .into_iter()
                .map(|(seed, pages)| (seed.to_string(), pages))
                .collect(),
            seeds: Mutex::new(Vec::new()),
        }
    }

    pub fn seen_seeds(&self) -> Vec<String> {
        self.seeds.lock().unwrap().clone()
    }
}

#[async_trait]
impl CrawlEngine for FakeCrawler {
    async fn crawl(
        &self,
        seed: &str,
        _options: &CrawlOptions,
        results: mpsc::Sender<CrawlResult>,
    ) -> Result<(), ApiError> {
        self.seeds.lock().unwrap().push(seed.to_string());
        for result in self.results.get(seed).cloned().unwrap_or_default() {
            if results.send(result).await.is_err() {
                break;
            }
        }
        Ok(())
    }
}

pub fn crawl_result(raw: &str, status: u16) -> CrawlResult {
    let parsed = url::Url::parse(raw).unwrap();
    CrawlResult {
        url: raw.to_string(),
        method: "GET".to_string(),
        status_code: Some(status),
        headers: HashMap::new(),
        path: parsed.path().to_string(),
        query_params: parsed.query_pairs().map(|(k, _)| k.into_owned()).collect(),
    }
}

/// Serves scripted pages; any other URL behaves like a refused connection.
#[derive(Default)]
pub struct FakeFetcher {
    pub pages: HashMap<String, FetchedPage>,
}

impl FakeFetcher {
    pub fn with(pages: Vec<(&str, &[&str])>) -> Self {
        Self {
            pages: pages
                .into_iter()
                .map(|(url, technologies)| (url.to_string(), page(technologies)))
                .collect(),
        }
    }
}

pub fn page(technologies: &[&str]) -> FetchedPage {
    let mut headers = HashMap::new();
    headers.insert(TECH_HEADER.to_string(), technologies.join(","));
    FetchedPage {
        status: 200,
        headers,
        body: b"<html></html>".to_vec(),
    }
}

#[async_trait]
impl PageFetcher for FakeFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, ApiError> {
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| ApiError::external_service(format!("connection refused: {}", url)))
    }
}

/// Reads technology names straight out of a test header.
pub struct HeaderFingerprinter;

impl Fingerprinter for HeaderFingerprinter {
    fn fingerprint(&self, headers: &HashMap<String, String>, _body: &[u8]) -> HashSet<String> {
        headers
            .get(TECH_HEADER)
            .map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Default)]
pub struct FakeCapture {
    pub fail: bool,
    pub captured: Mutex<Vec<String>>,
}

impl FakeCapture {
    pub fn captured_urls(&self) -> BTreeSet<String> {
        self.captured.lock().unwrap().iter().cloned().collect()
    }
}

#[async_trait]
impl CaptureEngine for FakeCapture {
    async fn capture(&self, url: &str, _options: &CaptureOptions) -> Result<Vec<u8>, ApiError> {
        self.captured.lock().unwrap().push(url.to_string());
        if self.fail {
            return Err(ApiError::timeout(format!("capture of {} timed out", url)));
        }
        Ok(vec![0x89, b'P', b'N', b'G'])
    }
}

#[derive(Default)]
pub struct Fakes {
    pub enumerator: FakeEnumerator,
    pub prober: FakeProber,
    pub crawler: FakeCrawler,
    pub fetcher: FakeFetcher,
    pub capture: FakeCapture,
}

pub fn test_settings(dir: &TempDir) -> PipelineSettings {
    PipelineSettings {
        discovery_timeout: Duration::from_secs(2),
        capture_timeout: Duration::from_secs(5),
        screenshot_dir: dir.path().join("screenshots"),
        screenshot_spawn_delay: Duration::ZERO,
        crawl_channel_capacity: 16,
        crawl_output_dir: dir.path().to_path_buf(),
        ..PipelineSettings::default()
    }
}

/// A scan service over a fresh in-memory store with scripted providers.
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub service: ScanService,
    pub task_manager: Arc<TaskManager>,
    pub prober: Arc<FakeProber>,
    pub crawler: Arc<FakeCrawler>,
    pub capture: Arc<FakeCapture>,
    pub dir: TempDir,
}

impl Harness {
    pub fn new(fakes: Fakes) -> Self {
        Self::with_store(MemoryStore::new(), fakes)
    }

    pub fn with_store(store: Arc<MemoryStore>, fakes: Fakes) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let prober = Arc::new(fakes.prober);
        let crawler = Arc::new(fakes.crawler);
        let capture = Arc::new(fakes.capture);
        let providers = ScanProviders {
            enumerator: Arc::new(fakes.enumerator),
            prober: prober.clone(),
            crawler: crawler.clone(),
            fetcher: Arc::new(fakes.fetcher),
            fingerprinter: Arc::new(HeaderFingerprinter),
            capture: capture.clone(),
        };
        let task_manager = Arc::new(TaskManager::new(2));
        let service = ScanService::new(
            store.repositories(),
            providers,
            task_manager.clone(),
            test_settings(&dir),
        );

        Self {
            store,
            service,
            task_manager,
            prober,
            crawler,
            capture,
            dir,
        }
    }

    /// Start a scan through the task manager and wait until it is done.
    pub async fn run(&self, root_domain_id: Uuid, subdomain_id: Option<Uuid>, template_id: Option<Uuid>) -> Scan {
        let started = self
            .service
            .start_scan(ScanStartRequest {
                root_domain_id,
                subdomain_id,
                scan_template_id: template_id,
            })
            .await
            .unwrap();
        self.task_manager.wait_for_all_tasks().await;
        self.store.scan(&started.scan_id)
    }
}

pub fn template(
    subdomain_config: Option<&str>,
    url_config: Option<&str>,
    tech_detect_enabled: bool,
    screenshot_enabled: bool,
) -> ScanTemplate {
    ScanTemplate {
        id: Uuid::new_v4(),
        name: "test template".to_string(),
        description: None,
        subdomain_scan_config: subdomain_config.map(str::to_string),
        url_scan_config: url_config.map(str::to_string),
        parameter_scan_config: None,
        tech_detect_enabled,
        screenshot_enabled,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

pub const ENUMERATION_OFF: &str = r#"{"enabled": false, "tools": {}}"#;
pub const ENUMERATION_ON: &str = r#"{"enabled": true, "tools": {"enumerator": {"enabled": true, "options": ["--timeout=5"]}}}"#;
pub const CRAWL_ON: &str = r#"{"enabled": true, "tools": {"crawler": {"enabled": true, "options": ["--max-depth=2"]}}}"#;
pub const CRAWL_OFF: &str = r#"{"enabled": false, "tools": {}}"#;

pub fn providers(fakes: Fakes) -> ScanProviders {
    ScanProviders {
        enumerator: Arc::new(fakes.enumerator),
        prober: Arc::new(fakes.prober),
        crawler: Arc::new(fakes.crawler),
        fetcher: Arc::new(fakes.fetcher),
        fingerprinter: Arc::new(HeaderFingerprinter),
        capture: Arc::new(fakes.capture),
    }
}
