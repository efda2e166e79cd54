//! Turns a stored scan template into typed, defaulted per-phase options.
//!
//! Resolution never fails: malformed or missing configuration falls back to
//! the built-in defaults and is logged.

use std::collections::HashMap;
use std::time::Duration;

use crate::models::{ScanKind, ScanSectionConfig, ScanTemplate};

/// Tool key for hostname enumeration inside the subdomain section.
pub const ENUMERATION_TOOL: &str = "enumerator";
/// Tool key for the crawler inside the url section.
pub const CRAWL_TOOL: &str = "crawler";

#[derive(Debug, Clone, PartialEq)]
pub enum OptionValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
}

impl OptionValue {
    /// Integer view: ints, floats (truncated) and numeric strings.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            OptionValue::Int(i) => Some(*i),
            OptionValue::Float(f) => Some(*f as i64),
            OptionValue::Str(s) => s.trim().parse::<i64>().ok(),
            OptionValue::Bool(_) => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            OptionValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

pub type ToolOptions = HashMap<String, OptionValue>;

/// Parse `--key=value` style options into a typed map.
///
/// Leading dashes are stripped, kebab and snake case keys become camelCase,
/// values are tried as int, float, bool and finally string. A bare flag is `true`.
pub fn parse_tool_options(raw: &[String]) -> ToolOptions {
    let mut parsed = ToolOptions::new();
    for opt in raw {
        let (key, value) = match opt.split_once('=') {
            Some((k, v)) => (k, Some(v)),
            None => (opt.as_str(), None),
        };
        let key = normalize_key(key);
        if key.is_empty() {
            continue;
        }
        let value = match value {
            Some(v) => parse_value(v),
            None => OptionValue::Bool(true),
        };
        parsed.insert(key, value);
    }
    parsed
}

fn normalize_key(raw: &str) -> String {
    let trimmed = raw.trim().trim_start_matches('-').trim();
    let mut key = String::with_capacity(trimmed.len());
    let mut upper_next = false;
    for c in trimmed.chars() {
        if c == '-' || c == '_' {
            upper_next = !key.is_empty();
            continue;
        }
        if upper_next {
            key.extend(c.to_uppercase());
            upper_next = false;
        } else {
            key.push(c);
        }
    }
    key
}

fn parse_value(raw: &str) -> OptionValue {
    let value = raw.trim();
    if let Ok(i) = value.parse::<i64>() {
        OptionValue::Int(i)
    } else if let Ok(f) = value.parse::<f64>() {
        OptionValue::Float(f)
    } else if let Ok(b) = value.parse::<bool>() {
        OptionValue::Bool(b)
    } else {
        OptionValue::Str(value.trim_matches('"').trim_matches('\'').to_string())
    }
}

/// Longest enumeration runtime a template may ask for: one week.
pub const MAX_ENUMERATION_MINUTES: u64 = 7 * 24 * 60;
/// Ceiling for per-request timeouts: one day.
pub const MAX_TIMEOUT_SECS: u64 = 24 * 60 * 60;

fn int_option(options: &ToolOptions, key: &str, default: u64) -> u64 {
    options
        .get(key)
        .and_then(OptionValue::as_int)
        .filter(|v| *v >= 0)
        .map(|v| v as u64)
        .unwrap_or(default)
}

fn u32_option(options: &ToolOptions, key: &str, default: u32) -> u32 {
    u32::try_from(int_option(options, key, u64::from(default))).unwrap_or(u32::MAX)
}

fn secs_option(options: &ToolOptions, key: &str, default: u64) -> Duration {
    Duration::from_secs(int_option(options, key, default).min(MAX_TIMEOUT_SECS))
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumerationOptions {
    pub threads: u32,
    pub timeout: Duration,
    pub max_enumeration_time: Duration,
}

impl Default for EnumerationOptions {
    fn default() -> Self {
        Self {
            threads: 10,
            timeout: Duration::from_secs(30),
            max_enumeration_time: Duration::from_secs(5 * 60),
        }
    }
}

impl EnumerationOptions {
    pub fn from_options(options: &ToolOptions) -> Self {
        Self {
            threads: u32_option(options, "threads", 10).max(1),
            timeout: secs_option(options, "timeout", 30),
            max_enumeration_time: Duration::from_secs(
                int_option(options, "maxEnumerationTime", 5)
                    .min(MAX_ENUMERATION_MINUTES)
                    .saturating_mul(60),
            ),
        }
    }

    /// Hard cap for one enumeration run: the configured runtime plus a minute of grace.
    pub fn deadline(&self) -> Duration {
        self.max_enumeration_time.saturating_add(Duration::from_secs(60))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CrawlOptions {
    pub max_depth: u32,
    pub concurrency: u32,
    pub parallelism: u32,
    pub rate_limit: u32,
    pub timeout: Duration,
    pub output_file: bool,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            max_depth: 3,
            concurrency: 10,
            parallelism: 10,
            rate_limit: 150,
            timeout: Duration::from_secs(10),
            output_file: false,
        }
    }
}

impl CrawlOptions {
    pub fn from_options(options: &ToolOptions, raw: &[String]) -> Self {
        Self {
            max_depth: u32_option(options, "maxDepth", 3),
            concurrency: u32_option(options, "concurrency", 10).max(1),
            parallelism: u32_option(options, "parallelism", 10).max(1),
            rate_limit: u32_option(options, "rateLimit", 150).max(1),
            timeout: secs_option(options, "timeout", 10).max(Duration::from_secs(1)),
            output_file: raw
                .iter()
                .any(|opt| opt.trim_start_matches('-').starts_with("outputFile")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedScanConfig {
    pub enumeration_enabled: bool,
    pub enumeration: EnumerationOptions,
    pub url_scan_enabled: bool,
    pub crawl: CrawlOptions,
    /// Parsed but not driving any phase yet.
    pub parameter_section: Option<ScanSectionConfig>,
    pub tech_detect_enabled: bool,
    pub screenshot_enabled: bool,
}

impl ResolvedScanConfig {
    /// Configuration used when a scan is started without a template.
    pub fn defaults(kind: ScanKind) -> Self {
        Self {
            enumeration_enabled: kind == ScanKind::RootDomain,
            enumeration: EnumerationOptions::default(),
            url_scan_enabled: true,
            crawl: CrawlOptions::default(),
            parameter_section: None,
            tech_detect_enabled: true,
            screenshot_enabled: false,
        }
    }

    pub fn resolve(template: Option<&ScanTemplate>, kind: ScanKind) -> Self {
        let template = match template {
            Some(t) => t,
            None => return Self::defaults(kind),
        };

        let mut resolved = Self::defaults(kind);
        resolved.tech_detect_enabled = template.tech_detect_enabled;
        resolved.screenshot_enabled = template.screenshot_enabled;

        if kind == ScanKind::RootDomain {
            if let Some(section) = parse_section(template, "subdomain", template.subdomain_scan_config.as_deref()) {
                if !section.enabled {
                    resolved.enumeration_enabled = false;
                    tracing::info!(template = %template.id, "subdomain discovery disabled by template");
                } else {
                    match section.tools.get(ENUMERATION_TOOL) {
                        Some(tool) if tool.enabled => {
                            let options = parse_tool_options(&tool.options);
                            resolved.enumeration = EnumerationOptions::from_options(&options);
                        }
                        _ => {
                            resolved.enumeration_enabled = false;
                            tracing::info!(template = %template.id, "subdomain discovery disabled, enumeration tool not enabled");
                        }
                    }
                }
            }
        } else {
            resolved.enumeration_enabled = false;
        }

        if let Some(section) = parse_section(template, "url", template.url_scan_config.as_deref()) {
            resolved.url_scan_enabled = section.enabled;
            if section.enabled {
                match section.tools.get(CRAWL_TOOL) {
                    Some(tool) if tool.enabled => {
                        let options = parse_tool_options(&tool.options);
                        resolved.crawl = CrawlOptions::from_options(&options, &tool.options);
                    }
                    _ => {
                        resolved.url_scan_enabled = false;
                        tracing::info!(template = %template.id, "url scanning disabled, crawler tool not enabled");
                    }
                }
            } else {
                tracing::info!(template = %template.id, "url scanning disabled by template");
            }
        }

        resolved.parameter_section =
            parse_section(template, "parameter", template.parameter_scan_config.as_deref());

        resolved
    }
}

fn parse_section(template: &ScanTemplate, name: &str, raw: Option<&str>) -> Option<ScanSectionConfig> {
    let raw = raw.map(str::trim).filter(|s| !s.is_empty())?;
    match serde_json::from_str::<ScanSectionConfig>(raw) {
        Ok(section) => Some(section),
        Err(e) => {
            tracing::warn!(
                template = %template.id,
                section = name,
                error = %e,
                "failed to parse template section, using defaults"
            );
            None
        }
    }
}
