use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::models::{Screenshot, ScreenshotCreate, SnapshotTarget};
use crate::repositories::ScreenshotRepository;
use crate::services::external::{random_user_agent, CaptureEngine, CaptureOptions};

const EXCLUDED_EXTENSIONS: &[&str] = &[
    ".js", ".css", ".json", ".xml", ".txt", ".pdf", ".doc", ".docx", ".xls", ".xlsx", ".ppt",
    ".pptx", ".zip", ".rar", ".tar", ".gz", ".7z", ".jpg", ".jpeg", ".gif", ".png", ".svg",
    ".ico", ".woff", ".woff2", ".ttf", ".eot", ".mp4", ".mp3", ".avi", ".mov", ".csv", ".map",
    ".yaml", ".yml", ".md",
];

const MAX_FILENAME_STEM: usize = 100;

/// Everything renders except URLs whose path ends in a static asset or
/// document extension. The query string is ignored.
pub fn should_screenshot(url: &str) -> bool {
    let lower = url.to_lowercase();
    let path = lower.split(['?', '#']).next().unwrap_or_default();
    !EXCLUDED_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

pub fn sanitize_filename(url: &str) -> String {
    url.replace("://", "_")
        .replace(['/', ':', '?', '&'], "_")
        .chars()
        .take(MAX_FILENAME_STEM)
        .collect()
}

/// Captures pages and records them as screenshot rows. A failed capture is
/// logged and yields no artifact; it never fails the owning scan.
#[derive(Clone)]
pub struct SnapshotService {
    capture: Arc<dyn CaptureEngine + Send + Sync>,
    screenshots: Arc<dyn ScreenshotRepository + Send + Sync>,
    base_dir: PathBuf,
    timeout: Duration,
}

impl SnapshotService {
    pub fn new(
        capture: Arc<dyn CaptureEngine + Send + Sync>,
        screenshots: Arc<dyn ScreenshotRepository + Send + Sync>,
        base_dir: PathBuf,
        timeout: Duration,
    ) -> Self {
        Self {
            capture,
            screenshots,
            base_dir,
            timeout,
        }
    }

    pub fn scan_dir(&self, scan_id: &Uuid) -> PathBuf {
        self.base_dir.join(format!("scan_{}", scan_id))
    }

    pub async fn capture(&self, url: &str, scan_id: Uuid, target: SnapshotTarget) -> Option<Screenshot> {
        if !should_screenshot(url) {
            tracing::debug!(url = %url, "skipping non-renderable URL");
            return None;
        }

        let dir = self.scan_dir(&scan_id);
        if let Err(e) = tokio::fs::create_dir_all(&dir).await {
            tracing::warn!(dir = %dir.display(), error = %e, "failed to create screenshot directory");
            return None;
        }

        let options = CaptureOptions {
            timeout: self.timeout,
            user_agent: Some(random_user_agent().to_string()),
        };
        let image = match self.capture.capture(url, &options).await {
            Ok(image) => image,
            Err(e) => {
                tracing::warn!(url = %url, scan_id = %scan_id, error = %e, "screenshot capture failed");
                return None;
            }
        };

        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let path = dir.join(format!("{}_{}.png", sanitize_filename(url), nanos));
        if let Err(e) = tokio::fs::write(&path, &image).await {
            tracing::warn!(path = %path.display(), error = %e, "failed to write screenshot");
            return None;
        }

        let record = ScreenshotCreate {
            target,
            url: url.to_string(),
            file_path: path.to_string_lossy().into_owned(),
            scan_id,
        };
        match self.screenshots.create(&record).await {
            Ok(screenshot) => {
                tracing::info!(url = %url, path = %record.file_path, "screenshot saved");
                Some(screenshot)
            }
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "failed to record screenshot");
                None
            }
        }
    }

    /// Start a capture on `tasks` without waiting for it.
    pub fn spawn(
        &self,
        tasks: &mut JoinSet<Option<Screenshot>>,
        url: String,
        scan_id: Uuid,
        target: SnapshotTarget,
    ) {
        let service = self.clone();
        tasks.spawn(async move { service.capture(&url, scan_id, target).await });
    }

    /// Capture every target concurrently and wait for all of them. Returns
    /// how many screenshots were stored.
    pub async fn capture_all(&self, scan_id: Uuid, targets: Vec<(String, SnapshotTarget)>) -> usize {
        let mut tasks = JoinSet::new();
        for (url, target) in targets {
            if should_screenshot(&url) {
                self.spawn(&mut tasks, url, scan_id, target);
            }
        }
        join_captures(tasks).await
    }
}

pub async fn join_captures(mut tasks: JoinSet<Option<Screenshot>>) -> usize {
    let mut saved = 0;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Some(_)) => saved += 1,
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "screenshot task panicked"),
        }
    }
    saved
}
