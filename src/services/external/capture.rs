use anyhow::Context;
use async_trait::async_trait;
use headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption;
use headless_chrome::{Browser, LaunchOptions};
use std::time::Duration;

use super::providers::{CaptureEngine, CaptureOptions};
use crate::error::ApiError;

/// Renders pages in headless Chrome. The browser API is synchronous, so each
/// capture runs on the blocking pool under an async timeout.
#[derive(Debug, Clone, Default)]
pub struct HeadlessCapture;

impl HeadlessCapture {
    pub fn new() -> Self {
        Self
    }

    fn capture_sync(url: &str, timeout: Duration, user_agent: Option<&str>) -> Result<Vec<u8>, ApiError> {
        let launch = LaunchOptions::default_builder()
            .headless(true)
            .sandbox(false)
            .ignore_certificate_errors(true)
            .idle_browser_timeout(timeout)
            .build()
            .map_err(|e| ApiError::external_service(format!("Browser launch options error: {}", e)))?;

        let browser = Browser::new(launch)
            .map_err(|e| ApiError::external_service(format!("Failed to launch Chrome: {}", e)))?;
        let tab = browser
            .new_tab()
            .map_err(|e| ApiError::external_service(format!("Failed to open tab: {}", e)))?;
        tab.set_default_timeout(timeout);

        if let Some(user_agent) = user_agent {
            tab.set_user_agent(user_agent, None, None)
                .map_err(|e| ApiError::external_service(format!("Failed to set user agent: {}", e)))?;
        }

        tab.navigate_to(url)
            .and_then(|tab| tab.wait_until_navigated())
            .with_context(|| format!("navigation to {} failed", url))?;
        tab.wait_for_element("body")
            .with_context(|| format!("no body rendered for {}", url))?;

        tab.capture_screenshot(CaptureScreenshotFormatOption::Png, Some(80), None, true)
            .map_err(|e| ApiError::external_service(format!("Screenshot of {} failed: {}", url, e)))
    }
}

#[async_trait]
impl CaptureEngine for HeadlessCapture {
    async fn capture(&self, url: &str, options: &CaptureOptions) -> Result<Vec<u8>, ApiError> {
        if url.trim().is_empty() {
            return Err(ApiError::validation("Capture URL cannot be empty"));
        }

        let url_owned = url.to_string();
        let timeout = options.timeout;
        let user_agent = options.user_agent.clone();

        let task = tokio::task::spawn_blocking(move || {
            Self::capture_sync(&url_owned, timeout, user_agent.as_deref())
        });

        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(ApiError::internal(format!(
                "Headless browser task panicked: {}",
                join_error
            ))),
            Err(_) => Err(ApiError::timeout(format!(
                "Screenshot of {} timed out after {}s",
                url,
                timeout.as_secs()
            ))),
        }
    }
}
