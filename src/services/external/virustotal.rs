use super::rate_limited_client::RateLimitedClient;
use crate::error::ApiError;
use serde::Deserialize;
use std::time::Duration;

pub const VIRUSTOTAL_BASE_URL: &str = "https://www.virustotal.com";

#[derive(Debug, Deserialize)]
struct VirusTotalObject {
    id: String,
}

#[derive(Debug, Deserialize)]
struct VirusTotalListResponse {
    data: Vec<VirusTotalObject>,
}

/// VirusTotal subdomain relationship lookup. Requires an API key.
pub struct VirusTotalClient {
    client: RateLimitedClient,
    base_url: String,
    api_key: String,
}

impl VirusTotalClient {
    pub fn new(api_key: String, timeout: Duration) -> Result<Self, ApiError> {
        Self::with_base_url(VIRUSTOTAL_BASE_URL, api_key, timeout)
    }

    pub fn with_base_url(base_url: &str, api_key: String, timeout: Duration) -> Result<Self, ApiError> {
        // Free tier allows 4 requests per minute.
        Ok(Self {
            client: RateLimitedClient::new(1, 3, timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    pub async fn get_subdomains(&self, domain: &str) -> Result<Vec<String>, ApiError> {
        if domain.is_empty() {
            return Err(ApiError::validation("Domain cannot be empty"));
        }

        let url = format!(
            "{}/api/v3/domains/{}/subdomains?limit=40",
            self.base_url,
            urlencoding::encode(domain)
        );

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "x-apikey",
            reqwest::header::HeaderValue::from_str(&self.api_key)
                .map_err(|e| ApiError::validation(format!("Invalid API key format: {}", e)))?,
        );

        tracing::debug!(domain = %domain, "querying VirusTotal subdomains");
        let text = self.client.get_with_headers(&url, headers).await?.text().await?;

        let response: VirusTotalListResponse = serde_json::from_str(&text).map_err(|e| {
            ApiError::external_service(format!(
                "Failed to parse VirusTotal subdomains response: {}",
                e
            ))
        })?;

        Ok(response.data.into_iter().map(|object| object.id).collect())
    }
}
