use futures::FutureExt;
use serde_json::json;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    config::ResolvedScanConfig,
    error::ApiError,
    models::{
        HostIndex, RootDomain, Scan, ScanCreate, ScanKind, ScanStartRequest, ScanStarted, ScanStatus,
        SnapshotTarget, Subdomain,
    },
    repositories::ScanRepositories,
    services::{
        external::ScanProviders,
        pipeline::{
            host_urls,
            status::{INTERRUPTED_SUMMARY, SAVE_ERROR},
            CrawlPhase, DiscoveryPhase, ErrorLog, FingerprintPhase, PipelineSettings, Reconciler, ScanRun,
            SnapshotService, StatusTracker,
        },
        task_manager::{panic_message, TaskContext, TaskManager, TaskStatus, TaskType},
    },
};

/// Starts scans and drives them through every pipeline phase.
pub struct ScanService {
    repos: ScanRepositories,
    task_manager: Arc<TaskManager>,
    tracker: Arc<StatusTracker>,
    discovery: Arc<DiscoveryPhase>,
    reconciler: Arc<Reconciler>,
    crawl: Arc<CrawlPhase>,
    fingerprint: Arc<FingerprintPhase>,
    snapshots: SnapshotService,
}

impl ScanService {
    pub fn new(
        repos: ScanRepositories,
        providers: ScanProviders,
        task_manager: Arc<TaskManager>,
        settings: PipelineSettings,
    ) -> Self {
        let snapshots = SnapshotService::new(
            Arc::clone(&providers.capture),
            Arc::clone(&repos.screenshots),
            settings.screenshot_dir.clone(),
            settings.capture_timeout,
        );
        let reconciler = Arc::new(Reconciler::new(Arc::clone(&repos.subdomains)));
        let crawl = CrawlPhase::new(
            Arc::clone(&providers.crawler),
            Arc::clone(&repos.endpoints),
            Arc::clone(&reconciler),
            snapshots.clone(),
            &settings,
        );
        let fingerprint = FingerprintPhase::new(
            Arc::clone(&providers.fetcher),
            Arc::clone(&providers.fingerprinter),
            Arc::clone(&repos.subdomains),
            Arc::clone(&repos.endpoints),
            Arc::clone(&repos.technologies),
        );

        Self {
            tracker: Arc::new(StatusTracker::new(&repos)),
            discovery: Arc::new(DiscoveryPhase::new(&providers, &settings)),
            crawl: Arc::new(crawl),
            fingerprint: Arc::new(fingerprint),
            reconciler,
            snapshots,
            task_manager,
            repos,
        }
    }

    /// Validate the request, create the scan in `pending` and hand it to the
    /// task manager. Returns as soon as the scan is queued.
    pub async fn start_scan(&self, request: ScanStartRequest) -> Result<ScanStarted, ApiError> {
        let root_domain = self
            .repos
            .root_domains
            .get_by_id(&request.root_domain_id)
            .await?
            .ok_or_else(|| ApiError::not_found(format!("Root domain {} not found", request.root_domain_id)))?;

        let target = match request.subdomain_id {
            Some(subdomain_id) => {
                let subdomain = self
                    .repos
                    .subdomains
                    .get_by_id(&subdomain_id)
                    .await?
                    .filter(|s| s.root_domain_id == root_domain.id)
                    .ok_or_else(|| {
                        ApiError::not_found(format!(
                            "Subdomain {} not found under root domain {}",
                            subdomain_id, root_domain.domain
                        ))
                    })?;
                Some(subdomain)
            }
            None => None,
        };

        if let Some(template_id) = request.scan_template_id {
            if self.repos.templates.get_by_id(&template_id).await?.is_none() {
                return Err(ApiError::not_found(format!("Scan template {} not found", template_id)));
            }
        }

        let kind = if target.is_some() {
            ScanKind::Subdomain
        } else {
            ScanKind::RootDomain
        };
        let scan = self
            .repos
            .scans
            .create(&ScanCreate {
                root_domain_id: root_domain.id,
                subdomain_id: target.as_ref().map(|s| s.id),
                kind,
                scan_template_id: request.scan_template_id,
            })
            .await?;

        let target_host = target
            .as_ref()
            .map(|s| s.hostname.clone())
            .unwrap_or_else(|| root_domain.domain.clone());

        if let Err(e) = self.submit(&scan, kind, &target_host).await {
            self.tracker
                .fail_fatal(&scan.id, Some(&root_domain.id), &format!("Internal error: {}", e))
                .await?;
            return Err(e);
        }

        let mut message = format!("Scan started for {}", target_host);
        if let Some(template_id) = request.scan_template_id {
            message.push_str(&format!(" using template ID {}", template_id));
        }
        tracing::info!(scan_id = %scan.id, target = %target_host, kind = %kind, "scan queued");

        Ok(ScanStarted {
            message,
            scan_id: scan.id,
        })
    }

    async fn submit(&self, scan: &Scan, kind: ScanKind, target: &str) -> Result<Uuid, ApiError> {
        let service = self.clone();
        let scan_id = scan.id;
        let metadata = json!({
            "scan_id": scan_id,
            "root_domain_id": scan.root_domain_id,
            "target": target,
            "scan_type": kind.as_str(),
        });

        self.task_manager
            .submit_task(TaskType::from(kind), metadata, move |ctx| {
                Box::pin(async move {
                    let outcome = AssertUnwindSafe(service.run_scan(&scan_id, Some(&ctx)))
                        .catch_unwind()
                        .await;
                    match outcome {
                        Ok(result) => result.map(|_| ()),
                        Err(payload) => {
                            let message = format!(
                                "Internal error: scan task panicked: {}",
                                panic_message(payload.as_ref())
                            );
                            service.abandon(&scan_id, &message).await;
                            Err(ApiError::internal(message))
                        }
                    }
                })
            })
            .await
    }

    /// Best-effort terminal write for a scan whose run could not finish normally.
    async fn abandon(&self, scan_id: &Uuid, message: &str) {
        if let Err(e) = self.tracker.fail_fatal(scan_id, None, message).await {
            tracing::error!(scan_id = %scan_id, error = %e, "could not mark scan as failed");
        }
    }

    /// Stop every queued or running scan and close each one out as failed.
    pub async fn shutdown(&self) {
        let queued: Vec<(Uuid, Uuid, Option<Uuid>)> = self
            .task_manager
            .get_active_tasks()
            .await
            .into_iter()
            .filter_map(|task| {
                let scan_id = metadata_uuid(&task.metadata, "scan_id")?;
                Some((task.id, scan_id, metadata_uuid(&task.metadata, "root_domain_id")))
            })
            .collect();

        self.task_manager.shutdown().await;

        for (task_id, scan_id, root_domain_id) in queued {
            let cancelled = self
                .task_manager
                .get_task(task_id)
                .await
                .is_some_and(|task| task.status == TaskStatus::Cancelled);
            if !cancelled {
                continue;
            }
            if let Err(e) = self
                .tracker
                .fail_fatal(&scan_id, root_domain_id.as_ref(), INTERRUPTED_SUMMARY)
                .await
            {
                tracing::error!(scan_id = %scan_id, error = %e, "could not close out interrupted scan");
            }
        }
    }

    pub async fn get_scan(&self, id: &Uuid) -> Result<Option<Scan>, ApiError> {
        self.repos.scans.get_by_id(id).await
    }

    pub async fn list_scans(&self, root_domain_id: &Uuid) -> Result<Vec<Scan>, ApiError> {
        self.repos.scans.list_by_root_domain(root_domain_id).await
    }

    /// Execute every enabled phase for a stored scan and write its terminal
    /// status. Only invariant violations stop a scan early; a store error
    /// still leaves the scan `failed` when the store accepts the write.
    pub async fn run_scan(&self, scan_id: &Uuid, ctx: Option<&TaskContext>) -> Result<ScanStatus, ApiError> {
        match self.execute(scan_id, ctx).await {
            Ok(status) => Ok(status),
            Err(e) => {
                self.abandon(scan_id, &format!("Internal error: {}", e)).await;
                Err(e)
            }
        }
    }

    async fn execute(&self, scan_id: &Uuid, ctx: Option<&TaskContext>) -> Result<ScanStatus, ApiError> {
        let scan = self
            .repos
            .scans
            .get_by_id(scan_id)
            .await?
            .ok_or_else(|| ApiError::not_found(format!("Scan {} not found", scan_id)))?;

        let run = match self.prepare(&scan).await? {
            Ok(run) => run,
            Err(message) => {
                self.tracker
                    .fail_fatal(&scan.id, Some(&scan.root_domain_id), &message)
                    .await?;
                return Ok(ScanStatus::Failed);
            }
        };

        self.tracker.mark_running(&run.scan_id).await?;
        tracing::info!(
            scan_id = %run.scan_id,
            kind = %run.kind,
            target = %run.target_hostname(),
            "scan started"
        );
        let errors = ErrorLog::new();

        if run.config.screenshot_enabled {
            report(ctx, 0.05, "Capturing existing assets").await;
            self.snapshot_existing_assets(&run).await;
        }

        report(ctx, 0.1, "Discovering hosts").await;
        let active = self.discovery.run(&run, &errors).await;

        report(ctx, 0.3, "Saving hosts").await;
        let index = match self.reconciler.persist(&run, &active).await {
            Ok(index) => index,
            Err(e) => {
                errors.record(SAVE_ERROR, e);
                HostIndex::new()
            }
        };

        if run.config.screenshot_enabled && !index.is_empty() {
            report(ctx, 0.4, "Capturing hosts").await;
            let targets = index
                .iter()
                .flat_map(|(hostname, id)| {
                    host_urls(hostname, "")
                        .into_iter()
                        .map(move |url| (url, SnapshotTarget::Subdomain(*id)))
                })
                .collect();
            let saved = self.snapshots.capture_all(run.scan_id, targets).await;
            tracing::info!(scan_id = %run.scan_id, saved, "host screenshots finished");
        }

        if run.config.url_scan_enabled {
            report(ctx, 0.5, "Crawling").await;
            self.crawl.run(&run, &active, &index, &errors).await;
        } else {
            tracing::info!(scan_id = %run.scan_id, "URL scan disabled for this scan");
        }

        if run.config.tech_detect_enabled {
            report(ctx, 0.75, "Detecting technologies").await;
            self.fingerprint.run(&run, &index, &errors).await;
        } else {
            tracing::info!(scan_id = %run.scan_id, "technology detection disabled for this scan");
        }

        let status = self
            .tracker
            .finalize(&run.scan_id, &run.root_domain.id, &errors)
            .await?;
        report(ctx, 1.0, &format!("Scan {}", status_label(status))).await;
        Ok(status)
    }

    /// Load everything a run needs. The inner `Err` is an invariant
    /// violation that fails the scan; the outer one is a store error.
    async fn prepare(&self, scan: &Scan) -> Result<Result<ScanRun, String>, ApiError> {
        let kind = match scan.scan_type.parse::<ScanKind>() {
            Ok(kind) => kind,
            Err(message) => return Ok(Err(format!("Internal error: {}", message))),
        };

        let root_domain: RootDomain = match self.repos.root_domains.get_by_id(&scan.root_domain_id).await? {
            Some(root_domain) => root_domain,
            None => {
                return Ok(Err(format!(
                    "Internal error: Root domain {} not found",
                    scan.root_domain_id
                )))
            }
        };

        let target: Option<Subdomain> = match kind {
            ScanKind::RootDomain => None,
            ScanKind::Subdomain => {
                let subdomain = match scan.subdomain_id {
                    Some(id) => self.repos.subdomains.get_by_id(&id).await?,
                    None => None,
                };
                match subdomain {
                    Some(subdomain) => Some(subdomain),
                    None => return Ok(Err("Internal error: Target subdomain missing".to_string())),
                }
            }
        };

        let template = match scan.scan_template_id {
            Some(template_id) => match self.repos.templates.get_by_id(&template_id).await? {
                Some(template) => Some(template),
                None => return Ok(Err("Internal error: Scan template missing".to_string())),
            },
            None => None,
        };

        Ok(Ok(ScanRun {
            scan_id: scan.id,
            kind,
            root_domain,
            target,
            config: ResolvedScanConfig::resolve(template.as_ref(), kind),
        }))
    }

    /// Screenshot every host and endpoint already stored for the root domain
    /// before discovery starts.
    async fn snapshot_existing_assets(&self, run: &ScanRun) {
        let subdomains = match self.repos.subdomains.list_by_root_domain(&run.root_domain.id).await {
            Ok(subdomains) => subdomains,
            Err(e) => {
                tracing::warn!(scan_id = %run.scan_id, error = %e, "failed to load existing subdomains");
                return;
            }
        };

        let mut targets: Vec<(String, SnapshotTarget)> = Vec::new();
        for subdomain in &subdomains {
            for url in host_urls(&subdomain.hostname, "") {
                targets.push((url, SnapshotTarget::Subdomain(subdomain.id)));
            }
        }

        let ids: Vec<Uuid> = subdomains.iter().map(|s| s.id).collect();
        if !ids.is_empty() {
            match self.repos.endpoints.list_by_subdomains(&ids).await {
                Ok(endpoints) => {
                    for endpoint in endpoints {
                        let Some(subdomain) = subdomains.iter().find(|s| s.id == endpoint.subdomain_id) else {
                            continue;
                        };
                        if endpoint.path.is_empty() {
                            continue;
                        }
                        for url in host_urls(&subdomain.hostname, &endpoint.path) {
                            targets.push((url, SnapshotTarget::Endpoint(endpoint.id)));
                        }
                    }
                }
                Err(e) => tracing::warn!(scan_id = %run.scan_id, error = %e, "failed to load existing endpoints"),
            }
        }

        tracing::info!(scan_id = %run.scan_id, targets = targets.len(), "capturing existing assets");
        let saved = self.snapshots.capture_all(run.scan_id, targets).await;
        tracing::info!(scan_id = %run.scan_id, saved, "existing asset screenshots finished");
    }
}

impl Clone for ScanService {
    fn clone(&self) -> Self {
        Self {
            repos: self.repos.clone(),
            task_manager: Arc::clone(&self.task_manager),
            tracker: Arc::clone(&self.tracker),
            discovery: Arc::clone(&self.discovery),
            reconciler: Arc::clone(&self.reconciler),
            crawl: Arc::clone(&self.crawl),
            fingerprint: Arc::clone(&self.fingerprint),
            snapshots: self.snapshots.clone(),
        }
    }
}

async fn report(ctx: Option<&TaskContext>, progress: f32, message: &str) {
    if let Some(ctx) = ctx {
        ctx.update_progress(progress, Some(message.to_string())).await;
    }
}

fn metadata_uuid(metadata: &serde_json::Value, key: &str) -> Option<Uuid> {
    metadata.get(key)?.as_str()?.parse().ok()
}

fn status_label(status: ScanStatus) -> &'static str {
    match status {
        ScanStatus::Pending => "pending",
        ScanStatus::Running => "running",
        ScanStatus::Completed => "completed",
        ScanStatus::Failed => "failed",
    }
}
