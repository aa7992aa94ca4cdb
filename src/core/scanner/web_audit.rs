// src/core/scanner/web_audit.rs

use async_trait::async_trait;
use reqwest::header::{ACCESS_CONTROL_ALLOW_ORIGIN, ALLOW, HeaderMap, ORIGIN};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::core::models::{Context, Finding, Severity};
use crate::core::module::{Capabilities, ProbeModule, ProbeOutcome};
use crate::core::scanner::http_client;

const NAME: &str = "WebAudit";

/// Origin sent in the CORS probe; a server reflecting it trusts anyone.
const PROBE_ORIGIN: &str = "https://evil.com";

const REQUIRED_HEADERS: &[&str] = &[
    "X-Frame-Options",
    "Content-Security-Policy",
    "X-Content-Type-Options",
    "Strict-Transport-Security",
];

const DANGEROUS_METHODS: &[&str] = &["PUT", "DELETE", "TRACE"];

/// HTTP-level audit of the context url: CORS policy, robots.txt exposure,
/// missing security headers and dangerous methods advertised by OPTIONS.
pub struct WebAudit {
    timeout: Duration,
}

impl WebAudit {
    /// Creates the audit. The HTTP client is built per scan from `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for WebAudit {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

#[async_trait]
impl ProbeModule for WebAudit {
    fn name(&self) -> &str {
        NAME
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::SCAN
    }

    async fn scan(&self, ctx: &Context) -> ProbeOutcome<Finding> {
        let Some(url) = ctx.url() else {
            debug!("No url in context, skipping web audit.");
            return ProbeOutcome::Empty;
        };
        info!(url, "Starting web audit.");

        let client = match http_client(self.timeout) {
            Ok(c) => c,
            Err(e) => return ProbeOutcome::Failed(format!("Failed to build HTTP client: {e}")),
        };

        let checks = [
            check_cors(&client, url).await,
            check_robots(&client, url).await,
            check_security_headers(&client, url).await,
            check_http_methods(&client, url).await,
        ];

        let mut findings = Vec::new();
        let mut errors = Vec::new();
        for check in checks {
            match check {
                Ok(found) => findings.extend(found),
                Err(e) => errors.push(e),
            }
        }

        if errors.len() == 4 {
            return ProbeOutcome::Failed(format!("every web check failed: {}", errors.join("; ")));
        }
        info!(findings = findings.len(), failed_checks = errors.len(), "Web audit finished.");
        ProbeOutcome::from_items(findings)
    }
}

async fn check_cors(client: &Client, url: &str) -> Result<Vec<Finding>, String> {
    let response = client
        .get(url)
        .header(ORIGIN, PROBE_ORIGIN)
        .send()
        .await
        .map_err(|e| request_failed("CORS", url, e))?;
    let acao = response.headers().get(ACCESS_CONTROL_ALLOW_ORIGIN).and_then(|v| v.to_str().ok());
    Ok(evaluate_cors(url, acao).into_iter().collect())
}

async fn check_robots(client: &Client, url: &str) -> Result<Vec<Finding>, String> {
    let robots_url = format!("{}/robots.txt", url.trim_end_matches('/'));
    let response = client.get(&robots_url).send().await.map_err(|e| request_failed("robots.txt", url, e))?;
    let status = response.status();
    let body = response.text().await.map_err(|e| request_failed("robots.txt", url, e))?;
    Ok(evaluate_robots(url, status, &body).into_iter().collect())
}

async fn check_security_headers(client: &Client, url: &str) -> Result<Vec<Finding>, String> {
    let response = client.get(url).send().await.map_err(|e| request_failed("headers", url, e))?;
    debug!(status = %response.status(), "Received HTTP response for header check.");
    Ok(missing_security_headers(url, response.headers()))
}

async fn check_http_methods(client: &Client, url: &str) -> Result<Vec<Finding>, String> {
    let response = client
        .request(reqwest::Method::OPTIONS, url)
        .send()
        .await
        .map_err(|e| request_failed("OPTIONS", url, e))?;
    Ok(response
        .headers()
        .get(ALLOW)
        .and_then(|v| v.to_str().ok())
        .map(|allow| dangerous_methods(url, allow))
        .unwrap_or_default())
}

fn request_failed(check: &str, url: &str, e: reqwest::Error) -> String {
    warn!(check, url, error = %e, "Web audit request failed.");
    format!("{check} check failed: {e}")
}

fn evaluate_cors(url: &str, acao: Option<&str>) -> Option<Finding> {
    let acao = acao?;
    (acao == "*" || acao == PROBE_ORIGIN).then(|| {
        Finding::new(
            NAME,
            url,
            Severity::High,
            "CORS misconfiguration",
            format!("Access-Control-Allow-Origin set to: {acao}"),
        )
    })
}

fn evaluate_robots(url: &str, status: StatusCode, body: &str) -> Option<Finding> {
    (status == StatusCode::OK && body.contains("Disallow")).then(|| {
        Finding::new(
            NAME,
            url,
            Severity::Info,
            "robots.txt exposed",
            "Review disallowed paths for sensitive endpoints",
        )
    })
}

fn missing_security_headers(url: &str, headers: &HeaderMap) -> Vec<Finding> {
    REQUIRED_HEADERS
        .iter()
        .filter(|name| !headers.contains_key(**name))
        .map(|name| {
            debug!(header_name = name, "Security header missing.");
            Finding::new(
                NAME,
                url,
                Severity::Medium,
                format!("Missing security header: {name}"),
                "Header not found in response",
            )
        })
        .collect()
}

fn dangerous_methods(url: &str, allow: &str) -> Vec<Finding> {
    DANGEROUS_METHODS
        .iter()
        .filter(|method| allow.contains(**method))
        .map(|method| {
            Finding::new(
                NAME,
                url,
                Severity::High,
                format!("Dangerous HTTP method enabled: {method}"),
                format!("Allow header: {allow}"),
            )
        })
        .collect()
}
