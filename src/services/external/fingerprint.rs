use regex::Regex;
use scraper::{Html, Selector};
use std::collections::{HashMap, HashSet};

use super::providers::Fingerprinter;
use crate::error::ApiError;

/// Where a signature looks for evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Header(&'static str),
    Cookie,
    Generator,
    Body,
}

struct Signature {
    name: &'static str,
    source: Source,
    pattern: Regex,
}

const SIGNATURES: &[(&str, Source, &str)] = &[
    // Servers
    ("nginx", Source::Header("server"), r"nginx"),
    ("apache", Source::Header("server"), r"apache"),
    ("microsoft-iis", Source::Header("server"), r"microsoft-iis"),
    ("litespeed", Source::Header("server"), r"litespeed"),
    ("caddy", Source::Header("server"), r"caddy"),
    ("openresty", Source::Header("server"), r"openresty"),
    ("apache tomcat", Source::Header("server"), r"tomcat|coyote"),
    ("envoy", Source::Header("server"), r"envoy"),
    ("cloudflare", Source::Header("server"), r"cloudflare"),
    ("amazon s3", Source::Header("server"), r"amazons3"),
    // Languages and frameworks announced in headers
    ("php", Source::Header("x-powered-by"), r"php"),
    ("asp.net", Source::Header("x-powered-by"), r"asp\.net"),
    ("asp.net", Source::Header("x-aspnet-version"), r"."),
    ("express", Source::Header("x-powered-by"), r"express"),
    ("next.js", Source::Header("x-powered-by"), r"next\.js"),
    ("nuxt.js", Source::Header("x-powered-by"), r"nuxt"),
    ("servlet", Source::Header("x-powered-by"), r"servlet"),
    ("drupal", Source::Header("x-generator"), r"drupal"),
    ("drupal", Source::Header("x-drupal-cache"), r"."),
    ("varnish", Source::Header("via"), r"varnish"),
    ("varnish", Source::Header("x-varnish"), r"."),
    // CDNs and WAFs
    ("cloudflare", Source::Header("cf-ray"), r"."),
    ("amazon cloudfront", Source::Header("x-amz-cf-id"), r"."),
    ("amazon cloudfront", Source::Header("via"), r"cloudfront"),
    ("fastly", Source::Header("x-fastly-request-id"), r"."),
    ("fastly", Source::Header("x-served-by"), r"cache-"),
    ("akamai", Source::Header("x-akamai-transformed"), r"."),
    ("azure cdn", Source::Header("x-azure-ref"), r"."),
    ("vercel", Source::Header("x-vercel-id"), r"."),
    ("netlify", Source::Header("x-nf-request-id"), r"."),
    ("sucuri", Source::Header("x-sucuri-id"), r"."),
    // Cookies
    ("php", Source::Cookie, r"phpsessid"),
    ("java", Source::Cookie, r"jsessionid"),
    ("asp.net", Source::Cookie, r"asp\.net_sessionid|__requestverificationtoken"),
    ("laravel", Source::Cookie, r"laravel_session"),
    ("django", Source::Cookie, r"csrftoken"),
    ("wordpress", Source::Cookie, r"wordpress_|wp-settings"),
    ("cloudflare", Source::Cookie, r"__cf_bm|cf_clearance"),
    // Generator meta tag
    ("wordpress", Source::Generator, r"wordpress"),
    ("drupal", Source::Generator, r"drupal"),
    ("joomla", Source::Generator, r"joomla"),
    ("wix", Source::Generator, r"wix"),
    ("squarespace", Source::Generator, r"squarespace"),
    ("ghost", Source::Generator, r"ghost"),
    ("hugo", Source::Generator, r"hugo"),
    ("jekyll", Source::Generator, r"jekyll"),
    ("gatsby", Source::Generator, r"gatsby"),
    ("docusaurus", Source::Generator, r"docusaurus"),
    // Body markers
    ("wordpress", Source::Body, r"/wp-content/|/wp-includes/"),
    ("shopify", Source::Body, r"cdn\.shopify\.com"),
    ("next.js", Source::Body, r"__next_data__|/_next/static/"),
    ("nuxt.js", Source::Body, r"__nuxt|/_nuxt/"),
    ("react", Source::Body, r"data-reactroot|react(?:\.production)?(?:\.min)?\.js"),
    ("angular", Source::Body, r"ng-version=|ng-app"),
    ("vue.js", Source::Body, r"data-v-[0-9a-f]{8}|vue(?:\.min)?\.js"),
    ("jquery", Source::Body, r"jquery[.-][0-9.]*(?:min\.)?js|jquery\.min\.js"),
    ("bootstrap", Source::Body, r"bootstrap(?:\.bundle)?(?:\.min)?\.(?:css|js)"),
    ("google analytics", Source::Body, r"google-analytics\.com/|gtag\(|googletagmanager\.com/gtag"),
    ("google tag manager", Source::Body, r"googletagmanager\.com/gtm\.js"),
    ("recaptcha", Source::Body, r"google\.com/recaptcha"),
    ("font awesome", Source::Body, r"font-?awesome"),
];

/// Signature based technology detection over response headers and HTML.
pub struct SignatureFingerprinter {
    signatures: Vec<Signature>,
    generator_selector: Selector,
}

impl SignatureFingerprinter {
    pub fn new() -> Result<Self, ApiError> {
        let signatures = SIGNATURES
            .iter()
            .map(|(name, source, pattern)| {
                Regex::new(&format!("(?i){}", pattern))
                    .map(|pattern| Signature {
                        name,
                        source: *source,
                        pattern,
                    })
                    .map_err(|e| ApiError::internal(format!("Invalid signature for {}: {}", name, e)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let generator_selector = Selector::parse("meta[name='generator']")
            .map_err(|e| ApiError::internal(format!("Invalid generator selector: {:?}", e)))?;

        Ok(Self {
            signatures,
            generator_selector,
        })
    }

    fn generators(&self, body: &str) -> Vec<String> {
        let document = Html::parse_document(body);
        document
            .select(&self.generator_selector)
            .filter_map(|element| element.value().attr("content").map(str::to_string))
            .collect()
    }
}

impl Fingerprinter for SignatureFingerprinter {
    fn fingerprint(&self, headers: &HashMap<String, String>, body: &[u8]) -> HashSet<String> {
        let body = String::from_utf8_lossy(body);
        let cookies = headers.get("set-cookie").map(String::as_str).unwrap_or_default();
        let generators = self.generators(&body);

        let mut detected = HashSet::new();
        for signature in &self.signatures {
            let matched = match signature.source {
                Source::Header(name) => headers
                    .get(name)
                    .map(|value| signature.pattern.is_match(value))
                    .unwrap_or(false),
                Source::Cookie => signature.pattern.is_match(cookies),
                Source::Generator => generators.iter().any(|g| signature.pattern.is_match(g)),
                Source::Body => signature.pattern.is_match(&body),
            };
            if matched {
                detected.insert(signature.name.to_string());
            }
        }
        detected
    }
}
