use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use governor::{clock::DefaultClock, state::direct::NotKeyed, state::InMemoryState, Quota, RateLimiter};
use rand::seq::SliceRandom;
use reqwest::{Client, ClientBuilder};
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use super::providers::{FetchedPage, LivenessOptions, LivenessProber, PageFetcher, ProbeCallback, ProbeOutcome};
use crate::error::ApiError;

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36 Edg/124.0.0.0",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_4 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Mobile/15E148 Safari/604.1",
];

/// A browser user agent picked at random for each request.
pub fn random_user_agent() -> &'static str {
    USER_AGENTS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(USER_AGENTS[0])
}

#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Requests per second across all liveness probes.
    pub probe_rate_limit: u32,
    pub fetch_timeout: Duration,
    pub max_body_bytes: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            probe_rate_limit: 150,
            fetch_timeout: Duration::from_secs(30),
            max_body_bytes: 1024 * 1024,
        }
    }
}

/// Liveness probing and single-page fetching over plain `reqwest`.
pub struct HttpAnalyzer {
    config: HttpConfig,
    fetch_client: Client,
    rate_limiter: Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
}

impl HttpAnalyzer {
    pub fn new(config: HttpConfig) -> Result<Self, ApiError> {
        let fetch_client = ClientBuilder::new()
            .timeout(config.fetch_timeout)
            .redirect(reqwest::redirect::Policy::none())
            .danger_accept_invalid_certs(true)
            .build()?;

        let quota = Quota::per_second(
            NonZeroU32::new(config.probe_rate_limit)
                .ok_or_else(|| ApiError::validation("probe_rate_limit must be greater than 0"))?,
        );

        Ok(Self {
            config,
            fetch_client,
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        })
    }

    fn probe_client(timeout: Duration) -> Result<Client, ApiError> {
        Ok(ClientBuilder::new()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .danger_accept_invalid_certs(true)
            .build()?)
    }

    /// `https://` first, then `http://`, each retried on transport errors.
    async fn probe_host(&self, client: &Client, host: String, retries: u32) -> ProbeOutcome {
        let mut last_error = None;

        for scheme in ["https", "http"] {
            let url = format!("{}://{}", scheme, host);
            for _ in 0..=retries {
                self.rate_limiter.until_ready().await;
                match client
                    .get(&url)
                    .header(reqwest::header::USER_AGENT, random_user_agent())
                    .send()
                    .await
                {
                    Ok(response) => {
                        return ProbeOutcome {
                            host,
                            status_code: Some(response.status().as_u16()),
                            error: None,
                        }
                    }
                    Err(e) => {
                        tracing::trace!(url = %url, error = %e, "probe attempt failed");
                        last_error = Some(e.to_string());
                    }
                }
            }
        }

        ProbeOutcome {
            host,
            status_code: None,
            error: last_error,
        }
    }
}

#[async_trait]
impl LivenessProber for HttpAnalyzer {
    async fn probe(
        &self,
        hosts: Vec<String>,
        options: &LivenessOptions,
        on_result: ProbeCallback,
    ) -> Result<(), ApiError> {
        let client = Self::probe_client(options.timeout)?;
        let total = hosts.len();

        stream::iter(hosts)
            .map(|host| self.probe_host(&client, host, options.retries))
            .buffer_unordered(options.concurrency.max(1))
            .for_each(|outcome| {
                on_result(outcome);
                futures::future::ready(())
            })
            .await;

        tracing::debug!(hosts = total, "liveness probing finished");
        Ok(())
    }
}

#[async_trait]
impl PageFetcher for HttpAnalyzer {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, ApiError> {
        let mut response = self
            .fetch_client
            .get(url)
            .header(reqwest::header::USER_AGENT, random_user_agent())
            .send()
            .await?;

        let status = response.status().as_u16();
        let mut headers: HashMap<String, String> = HashMap::new();
        for (name, value) in response.headers() {
            let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
            headers
                .entry(name.as_str().to_lowercase())
                .and_modify(|existing| {
                    existing.push_str(", ");
                    existing.push_str(&value);
                })
                .or_insert(value);
        }

        let body = read_capped(&mut response, self.config.max_body_bytes).await?;

        Ok(FetchedPage { status, headers, body })
    }
}

/// Read at most `limit` bytes of a response body, whatever Content-Length says.
pub(crate) async fn read_capped(response: &mut reqwest::Response, limit: usize) -> Result<Vec<u8>, reqwest::Error> {
    let mut body = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        let remaining = limit.saturating_sub(body.len());
        if chunk.len() >= remaining {
            body.extend_from_slice(&chunk[..remaining]);
            break;
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}
