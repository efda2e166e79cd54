pub mod capture;
pub mod certspotter;
pub mod crawler;
pub mod crtsh;
pub mod enumeration;
pub mod fingerprint;
pub mod http;
pub mod providers;
pub mod rate_limited_client;
pub mod virustotal;

pub use capture::HeadlessCapture;
pub use certspotter::CertSpotterClient;
pub use crawler::{CrawlerConfig, LinkCrawler};
pub use crtsh::CrtShClient;
pub use enumeration::{PassiveEnumerator, SourceEndpoints, CERTSPOTTER_API_TOKEN, VIRUSTOTAL_API_KEY};
pub use fingerprint::SignatureFingerprinter;
pub use http::{random_user_agent, HttpAnalyzer, HttpConfig};
pub use providers::{
    CaptureEngine, CaptureOptions, CrawlEngine, CrawlResult, FetchedPage, Fingerprinter, HostCollector,
    LivenessOptions, LivenessProber, PageFetcher, ProbeCallback, ProbeOutcome, ScanProviders,
    SubdomainEnumerator,
};
pub use rate_limited_client::RateLimitedClient;
pub use virustotal::VirusTotalClient;
