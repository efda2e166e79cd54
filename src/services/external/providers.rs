//! Capability providers the scan pipeline composes. Each trait is a black box
//! with a fixed result shape; the concrete implementations live next door.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::config::{CrawlOptions, EnumerationOptions};
use crate::error::ApiError;

/// Shared sink for enumerated hostnames. Sources push as they finish so a
/// caller that gives up on a timeout still sees whatever already arrived.
#[derive(Debug, Default)]
pub struct HostCollector {
    hosts: Mutex<HashSet<String>>,
}

impl HostCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push<I>(&self, hosts: I)
    where
        I: IntoIterator<Item = String>,
    {
        let mut guard = self.hosts.lock().unwrap_or_else(|p| p.into_inner());
        guard.extend(hosts);
    }

    pub fn len(&self) -> usize {
        self.hosts.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> HashSet<String> {
        self.hosts.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

#[async_trait]
pub trait SubdomainEnumerator {
    /// Stream candidate hostnames for `domain` into `collector`. May be
    /// cancelled at any await point; partial results stay in the collector.
    async fn enumerate(
        &self,
        domain: &str,
        options: &EnumerationOptions,
        collector: Arc<HostCollector>,
    ) -> Result<(), ApiError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct LivenessOptions {
    pub timeout: Duration,
    pub retries: u32,
    pub concurrency: usize,
}

impl Default for LivenessOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            retries: 2,
            concurrency: 50,
        }
    }
}

/// One probed host: a status code, an error, or (rarely) neither.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeOutcome {
    pub host: String,
    pub status_code: Option<u16>,
    pub error: Option<String>,
}

impl ProbeOutcome {
    pub fn is_responsive(&self) -> bool {
        self.status_code.is_some() && self.error.is_none()
    }
}

pub type ProbeCallback = Arc<dyn Fn(ProbeOutcome) + Send + Sync>;

#[async_trait]
pub trait LivenessProber {
    /// Probe every host and report each outcome through `on_result`.
    async fn probe(
        &self,
        hosts: Vec<String>,
        options: &LivenessOptions,
        on_result: ProbeCallback,
    ) -> Result<(), ApiError>;
}

/// A single page observed by the crawl engine.
#[derive(Debug, Clone, PartialEq)]
pub struct CrawlResult {
    pub url: String,
    pub method: String,
    pub status_code: Option<u16>,
    /// Lower-cased header names.
    pub headers: HashMap<String, String>,
    pub path: String,
    pub query_params: Vec<String>,
}

#[async_trait]
pub trait CrawlEngine {
    /// Crawl from `seed`, sending every observed page. Returns once the crawl is
    /// exhausted. Only an unusable seed is an error.
    async fn crawl(
        &self,
        seed: &str,
        options: &CrawlOptions,
        results: mpsc::Sender<CrawlResult>,
    ) -> Result<(), ApiError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchedPage {
    pub status: u16,
    /// Lower-cased header names; repeated headers are joined with `, `.
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

#[async_trait]
pub trait PageFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, ApiError>;
}

pub trait Fingerprinter {
    /// Canonical technology names found in a response.
    fn fingerprint(&self, headers: &HashMap<String, String>, body: &[u8]) -> HashSet<String>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaptureOptions {
    pub timeout: Duration,
    pub user_agent: Option<String>,
}

#[async_trait]
pub trait CaptureEngine {
    /// Render `url` and return PNG bytes.
    async fn capture(&self, url: &str, options: &CaptureOptions) -> Result<Vec<u8>, ApiError>;
}

/// Every provider one scan needs.
pub struct ScanProviders {
    pub enumerator: Arc<dyn SubdomainEnumerator + Send + Sync>,
    pub prober: Arc<dyn LivenessProber + Send + Sync>,
    pub crawler: Arc<dyn CrawlEngine + Send + Sync>,
    pub fetcher: Arc<dyn PageFetcher + Send + Sync>,
    pub fingerprinter: Arc<dyn Fingerprinter + Send + Sync>,
    pub capture: Arc<dyn CaptureEngine + Send + Sync>,
}

impl Clone for ScanProviders {
    fn clone(&self) -> Self {
        Self {
            enumerator: Arc::clone(&self.enumerator),
            prober: Arc::clone(&self.prober),
            crawler: Arc::clone(&self.crawler),
            fetcher: Arc::clone(&self.fetcher),
            fingerprinter: Arc::clone(&self.fingerprinter),
            capture: Arc::clone(&self.capture),
        }
    }
}
