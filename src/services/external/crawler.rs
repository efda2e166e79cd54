use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use reqwest::{Client, ClientBuilder};
use scraper::{Html, Selector};
use std::collections::{HashMap, HashSet, VecDeque};
use std::num::NonZeroU32;
use tokio::sync::mpsc;
use url::Url;

use super::http::{random_user_agent, read_capped};
use super::providers::{CrawlEngine, CrawlResult};
use crate::config::CrawlOptions;
use crate::error::ApiError;

const LINK_SELECTORS: &[(&str, &str)] = &[
    ("a[href]", "href"),
    ("link[href]", "href"),
    ("script[src]", "src"),
    ("form[action]", "action"),
    ("iframe[src]", "src"),
];

#[derive(Debug, Clone)]
pub struct CrawlerConfig {
    /// Hard ceiling on fetched pages per seed.
    pub max_pages: usize,
    /// Only the first `max_body_bytes` of a page are parsed for links.
    pub max_body_bytes: usize,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_pages: 500,
            max_body_bytes: 2 * 1024 * 1024,
        }
    }
}

/// Breadth-first, same-host crawler built on `reqwest` and `scraper`.
pub struct LinkCrawler {
    config: CrawlerConfig,
}

struct Fetched {
    url: Url,
    depth: u32,
    status: u16,
    headers: HashMap<String, String>,
    body: Option<String>,
}

impl LinkCrawler {
    pub fn new(config: CrawlerConfig) -> Self {
        Self { config }
    }

    fn build_client(options: &CrawlOptions) -> Result<Client, ApiError> {
        Ok(ClientBuilder::new()
            .timeout(options.timeout)
            .redirect(reqwest::redirect::Policy::none())
            .danger_accept_invalid_certs(true)
            .build()?)
    }

    fn parse_seed(seed: &str) -> Result<Url, ApiError> {
        let url = Url::parse(seed)
            .map_err(|e| ApiError::validation(format!("invalid crawl seed '{}': {}", seed, e)))?;
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return Err(ApiError::validation(format!(
                "invalid crawl seed '{}': expected an http(s) URL with a host",
                seed
            )));
        }
        Ok(url)
    }

    async fn fetch(&self, client: &Client, url: Url, depth: u32) -> Option<Fetched> {
        let mut response = match client
            .get(url.clone())
            .header(reqwest::header::USER_AGENT, random_user_agent())
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!(url = %url, error = %e, "crawl fetch failed");
                return None;
            }
        };

        let status = response.status().as_u16();
        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_lowercase(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();

        let is_html = headers
            .get("content-type")
            .map(|ct| ct.contains("html"))
            .unwrap_or(true);
        let body = if is_html {
            match read_capped(&mut response, self.config.max_body_bytes).await {
                Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
                Err(e) => {
                    tracing::debug!(url = %url, error = %e, "crawl body read failed");
                    None
                }
            }
        } else {
            None
        };

        Some(Fetched {
            url,
            depth,
            status,
            headers,
            body,
        })
    }

    /// Same-host links found in a page. Parsing is synchronous and the
    /// document never lives across an await.
    fn extract_links(base: &Url, body: &str) -> Vec<Url> {
        let document = Html::parse_document(body);
        let mut links = Vec::new();

        for (css, attr) in LINK_SELECTORS {
            let selector = match Selector::parse(css) {
                Ok(selector) => selector,
                Err(_) => continue,
            };
            for element in document.select(&selector) {
                if let Some(value) = element.value().attr(attr) {
                    if let Some(link) = Self::resolve_link(base, value) {
                        links.push(link);
                    }
                }
            }
        }

        links
    }

    fn resolve_link(base: &Url, raw: &str) -> Option<Url> {
        let raw = raw.trim();
        if raw.is_empty() || raw.starts_with('#') || raw.starts_with("javascript:") || raw.starts_with("mailto:") {
            return None;
        }

        let mut url = base.join(raw).ok()?;
        url.set_fragment(None);

        let same_host = url.host_str() == base.host_str();
        (matches!(url.scheme(), "http" | "https") && same_host).then_some(url)
    }

    fn to_result(fetched: &Fetched) -> CrawlResult {
        let mut seen = HashSet::new();
        let query_params = fetched
            .url
            .query_pairs()
            .map(|(name, _)| name.into_owned())
            .filter(|name| !name.is_empty() && seen.insert(name.clone()))
            .collect();

        CrawlResult {
            url: fetched.url.to_string(),
            method: "GET".to_string(),
            status_code: Some(fetched.status),
            headers: fetched.headers.clone(),
            path: fetched.url.path().to_string(),
            query_params,
        }
    }
}

impl Default for LinkCrawler {
    fn default() -> Self {
        Self::new(CrawlerConfig::default())
    }
}

#[async_trait]
impl CrawlEngine for LinkCrawler {
    async fn crawl(
        &self,
        seed: &str,
        options: &CrawlOptions,
        results: mpsc::Sender<CrawlResult>,
    ) -> Result<(), ApiError> {
        let seed = Self::parse_seed(seed)?;
        let client = Self::build_client(options)?;
        let rate = NonZeroU32::new(options.rate_limit).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = RateLimiter::direct(Quota::per_second(rate));
        let batch_size = options.concurrency.max(1) as usize;

        let mut queue: VecDeque<(Url, u32)> = VecDeque::from([(seed.clone(), 0)]);
        let mut visited: HashSet<String> = HashSet::from([seed.to_string()]);
        let mut fetched_pages = 0usize;

        tracing::debug!(seed = %seed, max_depth = options.max_depth, "crawl started");

        while !queue.is_empty() && fetched_pages < self.config.max_pages {
            let take = batch_size
                .min(queue.len())
                .min(self.config.max_pages - fetched_pages);
            let batch: Vec<(Url, u32)> = queue.drain(..take).collect();
            fetched_pages += batch.len();

            let fetches = batch.into_iter().map(|(url, depth)| {
                let client = &client;
                let rate_limiter = &rate_limiter;
                async move {
                    rate_limiter.until_ready().await;
                    self.fetch(client, url, depth).await
                }
            });
            let pages = futures::future::join_all(fetches).await;

            for page in pages.into_iter().flatten() {
                if results.send(Self::to_result(&page)).await.is_err() {
                    tracing::debug!(seed = %seed, "crawl consumer went away, stopping");
                    return Ok(());
                }

                if page.depth >= options.max_depth {
                    continue;
                }

                let mut next: Vec<Url> = page
                    .body
                    .as_deref()
                    .map(|body| Self::extract_links(&page.url, body))
                    .unwrap_or_default();
                if (300..400).contains(&page.status) {
                    if let Some(location) = page
                        .headers
                        .get("location")
                        .and_then(|l| Self::resolve_link(&page.url, l))
                    {
                        next.push(location);
                    }
                }

                for link in next {
                    if visited.insert(link.to_string()) {
                        queue.push_back((link, page.depth + 1));
                    }
                }
            }
        }

        tracing::debug!(seed = %seed, pages = fetched_pages, "crawl finished");
        Ok(())
    }
}
