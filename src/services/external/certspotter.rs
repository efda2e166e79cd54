use super::rate_limited_client::RateLimitedClient;
use crate::error::ApiError;
use serde::Deserialize;
use std::time::Duration;

pub const CERTSPOTTER_BASE_URL: &str = "https://api.certspotter.com";

#[derive(Debug, Deserialize)]
struct CertSpotterIssuance {
    #[serde(default)]
    dns_names: Vec<String>,
}

/// CertSpotter issuance search. Works without a token at a lower quota.
pub struct CertSpotterClient {
    client: RateLimitedClient,
    base_url: String,
    api_token: Option<String>,
}

impl CertSpotterClient {
    pub fn new(api_token: Option<String>, timeout: Duration) -> Result<Self, ApiError> {
        Self::with_base_url(CERTSPOTTER_BASE_URL, api_token, timeout)
    }

    pub fn with_base_url(
        base_url: &str,
        api_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        Ok(Self {
            client: RateLimitedClient::new(1, 3, timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token,
        })
    }

    pub fn is_configured(&self) -> bool {
        self.api_token.is_some()
    }

    /// DNS names from every issuance covering the domain and its subdomains.
    pub async fn get_subdomains(&self, domain: &str) -> Result<Vec<String>, ApiError> {
        if domain.is_empty() {
            return Err(ApiError::validation("Domain cannot be empty"));
        }

        let url = format!(
            "{}/v1/issuances?domain={}&include_subdomains=true&expand=dns_names",
            self.base_url,
            urlencoding::encode(domain)
        );

        let mut headers = reqwest::header::HeaderMap::new();
        if let Some(token) = &self.api_token {
            let value = reqwest::header::HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| ApiError::validation(format!("Invalid CertSpotter token: {}", e)))?;
            headers.insert(reqwest::header::AUTHORIZATION, value);
        }

        tracing::debug!(domain = %domain, "querying CertSpotter issuances");
        let text = self.client.get_with_headers(&url, headers).await?.text().await?;

        let issuances: Vec<CertSpotterIssuance> = serde_json::from_str(&text).map_err(|e| {
            ApiError::external_service(format!("Failed to parse CertSpotter response: {}", e))
        })?;

        Ok(issuances.into_iter().flat_map(|i| i.dns_names).collect())
    }
}
