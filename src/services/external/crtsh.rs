use super::rate_limited_client::RateLimitedClient;
use crate::error::ApiError;
use serde::Deserialize;
use std::time::Duration;

pub const CRTSH_BASE_URL: &str = "https://crt.sh";

#[derive(Debug, Deserialize)]
struct CrtShEntry {
    name_value: String,
    common_name: Option<String>,
}

/// Certificate Transparency search through crt.sh. Needs no credentials.
pub struct CrtShClient {
    client: RateLimitedClient,
    base_url: String,
}

impl CrtShClient {
    pub fn new(timeout: Duration) -> Result<Self, ApiError> {
        Self::with_base_url(CRTSH_BASE_URL, timeout)
    }

    pub fn with_base_url(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        Ok(Self {
            client: RateLimitedClient::new(2, 3, timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Raw names from every certificate matching `%.domain`. Entries may hold
    /// several names separated by newlines and are returned uncleaned.
    pub async fn search_domain(&self, domain: &str) -> Result<Vec<String>, ApiError> {
        if domain.is_empty() {
            return Err(ApiError::validation("Domain cannot be empty"));
        }

        let url = format!(
            "{}/?q={}&output=json",
            self.base_url,
            urlencoding::encode(&format!("%.{}", domain))
        );
        tracing::debug!(url = %url, "querying crt.sh");

        let text = self.client.get(&url).await?.text().await?;
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let entries: Vec<CrtShEntry> = serde_json::from_str(&text).map_err(|e| {
            ApiError::external_service(format!("Failed to parse crt.sh response: {}", e))
        })?;

        let names = entries
            .into_iter()
            .flat_map(|entry| {
                let mut names: Vec<String> = entry.name_value.split('\n').map(str::to_string).collect();
                names.extend(entry.common_name);
                names
            })
            .collect();

        Ok(names)
    }
}
