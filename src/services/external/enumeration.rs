use async_trait::async_trait;
use regex::Regex;
use std::sync::Arc;

use super::certspotter::{CertSpotterClient, CERTSPOTTER_BASE_URL};
use super::crtsh::{CrtShClient, CRTSH_BASE_URL};
use super::providers::{HostCollector, SubdomainEnumerator};
use super::virustotal::{VirusTotalClient, VIRUSTOTAL_BASE_URL};
use crate::config::{EnumerationOptions, SecretProvider};
use crate::error::ApiError;

pub const VIRUSTOTAL_API_KEY: &str = "VIRUSTOTAL_API_KEY";
pub const CERTSPOTTER_API_TOKEN: &str = "CERTSPOTTER_API_TOKEN";

#[derive(Debug, Clone)]
pub struct SourceEndpoints {
    pub crtsh: String,
    pub certspotter: String,
    pub virustotal: String,
}

impl Default for SourceEndpoints {
    fn default() -> Self {
        Self {
            crtsh: CRTSH_BASE_URL.to_string(),
            certspotter: CERTSPOTTER_BASE_URL.to_string(),
            virustotal: VIRUSTOTAL_BASE_URL.to_string(),
        }
    }
}

/// Passive hostname enumeration over certificate transparency and VirusTotal.
///
/// Credentials are read on every run so keys saved through the settings API
/// apply to the next scan without a restart.
pub struct PassiveEnumerator {
    secrets: Arc<dyn SecretProvider + Send + Sync>,
    endpoints: SourceEndpoints,
    domain_regex: Regex,
}

impl PassiveEnumerator {
    pub fn new(secrets: Arc<dyn SecretProvider + Send + Sync>) -> Result<Self, ApiError> {
        Self::with_endpoints(secrets, SourceEndpoints::default())
    }

    pub fn with_endpoints(
        secrets: Arc<dyn SecretProvider + Send + Sync>,
        endpoints: SourceEndpoints,
    ) -> Result<Self, ApiError> {
        let domain_regex = Regex::new(
            r"^[a-z0-9]([a-z0-9\-]{0,61}[a-z0-9])?(\.[a-z0-9]([a-z0-9\-]{0,61}[a-z0-9])?)*$",
        )
        .map_err(|e| ApiError::internal(format!("Failed to compile domain regex: {}", e)))?;

        Ok(Self {
            secrets,
            endpoints,
            domain_regex,
        })
    }

    /// Normalise a raw certificate/API name and keep it only if it lies under `base_domain`.
    pub fn clean_candidate(&self, raw: &str, base_domain: &str) -> Option<String> {
        let mut candidate = raw.trim().trim_end_matches('.').to_lowercase();
        if let Some(stripped) = candidate.strip_prefix("*.") {
            candidate = stripped.to_string();
        }

        if candidate.is_empty() || candidate.contains('*') || candidate.contains(char::is_whitespace) {
            return None;
        }

        let base = base_domain.trim().trim_end_matches('.').to_lowercase();
        if candidate != base && !candidate.ends_with(&format!(".{}", base)) {
            return None;
        }

        self.domain_regex.is_match(&candidate).then_some(candidate)
    }

    fn accept(&self, source: &str, domain: &str, names: Vec<String>, collector: &HostCollector) {
        let cleaned: Vec<String> = names
            .iter()
            .filter_map(|name| self.clean_candidate(name, domain))
            .collect();
        tracing::info!(source, domain = %domain, found = cleaned.len(), "enumeration source finished");
        collector.push(cleaned);
    }
}

#[async_trait]
impl SubdomainEnumerator for PassiveEnumerator {
    async fn enumerate(
        &self,
        domain: &str,
        options: &EnumerationOptions,
        collector: Arc<HostCollector>,
    ) -> Result<(), ApiError> {
        let timeout = options.timeout;
        let certspotter_token = self.secrets.get(CERTSPOTTER_API_TOKEN);
        let virustotal_key = self.secrets.get(VIRUSTOTAL_API_KEY);

        let crtsh = async {
            let client = CrtShClient::with_base_url(&self.endpoints.crtsh, timeout)?;
            let names = client.search_domain(domain).await?;
            self.accept("crt.sh", domain, names, &collector);
            Ok::<(), ApiError>(())
        };

        let certspotter = async {
            let client =
                CertSpotterClient::with_base_url(&self.endpoints.certspotter, certspotter_token, timeout)?;
            let names = client.get_subdomains(domain).await?;
            self.accept("certspotter", domain, names, &collector);
            Ok::<(), ApiError>(())
        };

        let virustotal = async {
            let key = match virustotal_key {
                Some(key) => key,
                None => {
                    tracing::debug!("VirusTotal key not configured, skipping source");
                    return Ok::<bool, ApiError>(false);
                }
            };
            let client = VirusTotalClient::with_base_url(&self.endpoints.virustotal, key, timeout)?;
            let names = client.get_subdomains(domain).await?;
            self.accept("virustotal", domain, names, &collector);
            Ok(true)
        };

        let (crtsh, certspotter, virustotal) = futures::join!(crtsh, certspotter, virustotal);

        let mut attempted = 2;
        let mut failures = Vec::new();
        if let Err(e) = crtsh {
            tracing::warn!(domain = %domain, error = %e, "crt.sh enumeration failed");
            failures.push(format!("crt.sh: {}", e));
        }
        if let Err(e) = certspotter {
            tracing::warn!(domain = %domain, error = %e, "CertSpotter enumeration failed");
            failures.push(format!("certspotter: {}", e));
        }
        match virustotal {
            Ok(true) => attempted += 1,
            Ok(false) => {}
            Err(e) => {
                attempted += 1;
                tracing::warn!(domain = %domain, error = %e, "VirusTotal enumeration failed");
                failures.push(format!("virustotal: {}", e));
            }
        }

        if failures.len() == attempted {
            return Err(ApiError::external_service(format!(
                "all enumeration sources failed ({})",
                failures.join(", ")
            )));
        }

        Ok(())
    }
}
