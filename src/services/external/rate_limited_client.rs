use crate::error::ApiError;
use governor::{clock::DefaultClock, state::direct::NotKeyed, state::InMemoryState, Quota, RateLimiter};
use reqwest::{Client, RequestBuilder, Response};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

/// Rate-limited HTTP client with exponential backoff on transport and 5xx errors.
pub struct RateLimitedClient {
    client: Client,
    rate_limiter: Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
    max_retries: u32,
    base_delay: Duration,
}

impl RateLimitedClient {
    pub fn new(requests_per_second: u32, max_retries: u32, timeout: Duration) -> Result<Self, ApiError> {
        let quota = Quota::per_second(NonZeroU32::new(requests_per_second).ok_or_else(|| {
            ApiError::validation("requests_per_second must be greater than 0")
        })?);

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("surface-backend/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
            max_retries,
            base_delay: Duration::from_millis(1000),
        })
    }

    /// Shorten the backoff base, mostly for tests.
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub async fn get(&self, url: &str) -> Result<Response, ApiError> {
        self.make_request(|client| client.get(url)).await
    }

    pub async fn get_with_headers(
        &self,
        url: &str,
        headers: reqwest::header::HeaderMap,
    ) -> Result<Response, ApiError> {
        self.make_request(|client| client.get(url).headers(headers.clone()))
            .await
    }

    async fn make_request<F>(&self, request_builder: F) -> Result<Response, ApiError>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let mut attempt = 0;
        loop {
            self.rate_limiter.until_ready().await;
            let delay = self.base_delay * 2_u32.pow(attempt);

            match request_builder(&self.client).send().await {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) if response.status().is_server_error() && attempt < self.max_retries => {
                    tracing::warn!(
                        status = %response.status(),
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        "server error, retrying"
                    );
                }
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    return Err(ApiError::external_service(format!(
                        "HTTP {} error: {}",
                        status, body
                    )));
                }
                Err(e) if attempt < self.max_retries => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "request failed, retrying"
                    );
                }
                Err(e) => return Err(ApiError::HttpClient(e)),
            }

            sleep(delay).await;
            attempt += 1;
        }
    }
}
