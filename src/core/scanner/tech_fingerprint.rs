// src/core/scanner/tech_fingerprint.rs

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::{HeaderMap, SET_COOKIE};
use scraper::{Html, Selector};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::core::models::{Context, Fact};
use crate::core::module::{Capabilities, ProbeModule, ProbeOutcome};
use crate::core::scanner::http_client;

const NAME: &str = "TechFingerprint";

/// Where in the response a rule looks for its signature.
enum Check<'a> {
    Header(&'a str, &'a Lazy<Regex>),
    MetaTag(&'a str, &'a Lazy<Regex>),
    Body(&'a Lazy<Regex>),
    ScriptSrc(&'a Lazy<Regex>),
    LinkHref(&'a Lazy<Regex>),
    Cookie(&'a Lazy<Regex>),
}

struct FingerprintRule<'a> {
    tech_name: &'a str,
    category: &'a str,
    check: Check<'a>,
}

// Capture group 1, when present, is the version.
static RE_NGINX: Lazy<Regex> = Lazy::new(|| Regex::new(r"nginx/([\d\.]+)").unwrap());
static RE_NGINX_ERROR: Lazy<Regex> = Lazy::new(|| Regex::new(r"<hr><center>nginx</center>").unwrap());
static RE_APACHE: Lazy<Regex> = Lazy::new(|| Regex::new(r"Apache/([\d\.]+)").unwrap());
static RE_IIS: Lazy<Regex> = Lazy::new(|| Regex::new(r"Microsoft-IIS/([\d\.]+)").unwrap());
static RE_CLOUDFLARE: Lazy<Regex> = Lazy::new(|| Regex::new(r"cloudflare").unwrap());
static RE_WORDPRESS: Lazy<Regex> = Lazy::new(|| Regex::new(r"WordPress ([\d\.]+)").unwrap());
static RE_WP_EMBED: Lazy<Regex> = Lazy::new(|| Regex::new(r"/wp-content/|/wp-includes/").unwrap());
static RE_JOOMLA: Lazy<Regex> = Lazy::new(|| Regex::new(r"Joomla!").unwrap());
static RE_DRUPAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"Drupal ([\d\.]+)").unwrap());
static RE_PHP: Lazy<Regex> = Lazy::new(|| Regex::new(r"PHP/([\d\.]+)").unwrap());
static RE_PHPSESSID: Lazy<Regex> = Lazy::new(|| Regex::new(r"PHPSESSID").unwrap());
static RE_ASPNET: Lazy<Regex> = Lazy::new(|| Regex::new(r"([\d\.]+)").unwrap());
static RE_JSESSIONID: Lazy<Regex> = Lazy::new(|| Regex::new(r"JSESSIONID").unwrap());
static RE_DJANGO_CSRF: Lazy<Regex> = Lazy::new(|| Regex::new(r"csrftoken").unwrap());
static RE_EXPRESS: Lazy<Regex> = Lazy::new(|| Regex::new(r"Express").unwrap());
static RE_NEXTJS_SCRIPT: Lazy<Regex> = Lazy::new(|| Regex::new(r"/_next/static/").unwrap());
static RE_ANGULAR: Lazy<Regex> = Lazy::new(|| Regex::new(r#"ng-version="([\d\.]+)""#).unwrap());
static RE_REACT: Lazy<Regex> = Lazy::new(|| Regex::new(r"react-dom|data-reactroot").unwrap());
static RE_JQUERY: Lazy<Regex> = Lazy::new(|| Regex::new(r"jquery[-.]?([\d\.]+)?(\.min)?\.js").unwrap());
static RE_BOOTSTRAP: Lazy<Regex> = Lazy::new(|| Regex::new(r"bootstrap(?:\.min)?\.css").unwrap());

static RULES: &[FingerprintRule] = &[
    FingerprintRule { tech_name: "Nginx", category: "Web Server", check: Check::Header("server", &RE_NGINX) },
    FingerprintRule { tech_name: "Nginx", category: "Web Server", check: Check::Body(&RE_NGINX_ERROR) },
    FingerprintRule { tech_name: "Apache", category: "Web Server", check: Check::Header("server", &RE_APACHE) },
    FingerprintRule { tech_name: "IIS", category: "Web Server", check: Check::Header("server", &RE_IIS) },
    FingerprintRule { tech_name: "Cloudflare", category: "CDN / WAF", check: Check::Header("server", &RE_CLOUDFLARE) },
    FingerprintRule { tech_name: "WordPress", category: "CMS", check: Check::MetaTag("generator", &RE_WORDPRESS) },
    FingerprintRule { tech_name: "WordPress", category: "CMS", check: Check::Body(&RE_WP_EMBED) },
    FingerprintRule { tech_name: "Joomla", category: "CMS", check: Check::MetaTag("generator", &RE_JOOMLA) },
    FingerprintRule { tech_name: "Drupal", category: "CMS", check: Check::MetaTag("generator", &RE_DRUPAL) },
    FingerprintRule { tech_name: "PHP", category: "Language", check: Check::Header("x-powered-by", &RE_PHP) },
    FingerprintRule { tech_name: "PHP", category: "Language", check: Check::Cookie(&RE_PHPSESSID) },
    FingerprintRule { tech_name: "ASP.NET", category: "Framework", check: Check::Header("x-aspnet-version", &RE_ASPNET) },
    FingerprintRule { tech_name: "Java", category: "Language", check: Check::Cookie(&RE_JSESSIONID) },
    FingerprintRule { tech_name: "Python/Django", category: "Framework", check: Check::Cookie(&RE_DJANGO_CSRF) },
    FingerprintRule { tech_name: "Express", category: "Framework", check: Check::Header("x-powered-by", &RE_EXPRESS) },
    FingerprintRule { tech_name: "Next.js", category: "JS Framework", check: Check::ScriptSrc(&RE_NEXTJS_SCRIPT) },
    FingerprintRule { tech_name: "Angular", category: "JS Framework", check: Check::Body(&RE_ANGULAR) },
    FingerprintRule { tech_name: "React", category: "JS Library", check: Check::Body(&RE_REACT) },
    FingerprintRule { tech_name: "jQuery", category: "JS Library", check: Check::ScriptSrc(&RE_JQUERY) },
    FingerprintRule { tech_name: "Bootstrap", category: "UI Framework", check: Check::LinkHref(&RE_BOOTSTRAP) },
];

#[derive(Debug, Clone, PartialEq, Eq)]
struct Technology {
    name: String,
    category: String,
    version: Option<String>,
}

impl Technology {
    fn into_fact(self, url: &str) -> Fact {
        let fact = Fact::new("technology", self.name)
            .with("category", self.category)
            .with("url", url);
        match self.version {
            Some(version) => fact.with("version", version),
            None => fact,
        }
    }
}

/// Identifies the server software and front-end stack behind the context url.
/// Produces `technology` facts; severity judgements are left to analyzers.
pub struct TechFingerprint {
    timeout: Duration,
}

impl TechFingerprint {
    /// # Arguments
    /// * `timeout` - Timeout for the single GET issued against the url.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for TechFingerprint {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

#[async_trait]
impl ProbeModule for TechFingerprint {
    fn name(&self) -> &str {
        NAME
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::COLLECT
    }

    async fn collect(&self, ctx: &Context) -> ProbeOutcome<Fact> {
        let Some(url) = ctx.url() else {
            return ProbeOutcome::Empty;
        };
        info!(url, "Starting fingerprint collection.");

        let client = match http_client(self.timeout) {
            Ok(c) => c,
            Err(e) => {
                error!(error = %e, "Failed to build HTTP client");
                return ProbeOutcome::Failed(format!("HTTP client error: {e}"));
            }
        };

        let response = match client.get(url).send().await {
            Ok(res) => {
                info!(status = %res.status(), "Received HTTP response.");
                res
            }
            Err(e) => {
                error!(url, error = %e, "HTTP request failed");
                return ProbeOutcome::Failed(format!("HTTP request failed: {e}"));
            }
        };

        let headers = response.headers().clone();
        let body = match response.text().await {
            Ok(text) => text,
            Err(e) => return ProbeOutcome::Failed(format!("Failed to read response body: {e}")),
        };
        debug!(bytes = body.len(), "Read response body.");

        let facts: Vec<Fact> = identify_technologies(&headers, &body)
            .into_iter()
            .map(|tech| tech.into_fact(url))
            .collect();
        info!(count = facts.len(), "Fingerprint collection finished.");
        ProbeOutcome::from_items(facts)
    }
}

/// Applies every rule; a later rule may only add a version, never replace one.
///
/// # Arguments
/// * `headers` - Response headers, cookies included.
/// * `body` - The response body, parsed as HTML for meta, script and link rules.
///
/// # Returns
/// The detected technologies, sorted by name.
fn identify_technologies(headers: &HeaderMap, body: &str) -> Vec<Technology> {
    let cookies = headers
        .get_all(SET_COOKIE)
        .into_iter()
        .filter_map(|v| v.to_str().ok())
        .collect::<Vec<_>>()
        .join("; ");
    let document = Html::parse_document(body);

    let mut found: BTreeMap<&str, Technology> = BTreeMap::new();
    for rule in RULES {
        let version = match &rule.check {
            Check::Header(name, re) => check_with_regex(headers.get(*name).and_then(|v| v.to_str().ok()), re),
            Check::MetaTag(name, re) => check_meta_tag(&document, name, re),
            Check::Body(re) => check_with_regex(Some(body), re),
            Check::ScriptSrc(re) => check_attribute(&document, "script[src]", "src", re),
            Check::LinkHref(re) => check_attribute(&document, "link[href]", "href", re),
            Check::Cookie(re) => check_with_regex(Some(&cookies), re),
        };
        let Some(version) = version else { continue };
        debug!(tech = rule.tech_name, version = ?version, "Rule matched.");

        let entry = found.entry(rule.tech_name).or_insert_with(|| Technology {
            name: rule.tech_name.to_string(),
            category: rule.category.to_string(),
            version: None,
        });
        if entry.version.is_none() {
            entry.version = version;
        }
    }
    found.into_values().collect()
}

/// `Some(Some(v))` matched with a version, `Some(None)` matched without one.
fn check_with_regex(text: Option<&str>, re: &Regex) -> Option<Option<String>> {
    text.and_then(|text| {
        re.captures(text)
            .map(|caps| caps.get(1).map(|m| m.as_str().to_string()).filter(|s| !s.is_empty()))
    })
}

fn check_meta_tag(doc: &Html, name: &str, re: &Regex) -> Option<Option<String>> {
    let selector = Selector::parse(&format!("meta[name='{name}']")).ok()?;
    let content = doc.select(&selector).next().and_then(|el| el.value().attr("content"));
    check_with_regex(content, re)
}

fn check_attribute(doc: &Html, selector: &str, attribute: &str, re: &Regex) -> Option<Option<String>> {
    let selector = Selector::parse(selector).ok()?;
    doc.select(&selector)
        .filter_map(|el| el.value().attr(attribute))
        .find_map(|value| check_with_regex(Some(value), re))
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn names(techs: &[Technology]) -> Vec<&str> {
        techs.iter().map(|t| t.name.as_str()).collect()
    }

    #[test]
    fn server_header_yields_version() {
        let mut headers = HeaderMap::new();
        headers.insert("server", HeaderValue::from_static("nginx/1.25.3"));
        let techs = identify_technologies(&headers, "<html></html>");
        assert_eq!(
            techs,
            [Technology { name: "Nginx".into(), category: "Web Server".into(), version: Some("1.25.3".into()) }]
        );
    }

    #[test]
    fn html_rules_detect_cms_and_libraries() {
        let body = r#"<html><head>
            <meta name="generator" content="WordPress 6.4.2">
            <link rel="stylesheet" href="/css/bootstrap.min.css">
            <script src="/js/jquery-3.7.1.min.js"></script>
            </head><body><img src="/wp-content/uploads/a.png"></body></html>"#;
        let techs = identify_technologies(&HeaderMap::new(), body);
        assert_eq!(names(&techs), ["Bootstrap", "WordPress", "jQuery"]);
        let wp = techs.iter().find(|t| t.name == "WordPress").unwrap();
        assert_eq!(wp.version.as_deref(), Some("6.4.2"));
        let jquery = techs.iter().find(|t| t.name == "jQuery").unwrap();
        assert_eq!(jquery.version.as_deref(), Some("3.7.1"));
    }

    #[test]
    fn cookies_identify_backend_language() {
        let mut headers = HeaderMap::new();
        headers.append(SET_COOKIE, HeaderValue::from_static("PHPSESSID=abc; path=/"));
        headers.append(SET_COOKIE, HeaderValue::from_static("csrftoken=xyz"));
        let techs = identify_technologies(&headers, "");
        assert_eq!(names(&techs), ["PHP", "Python/Django"]);
    }

    #[test]
    fn technology_becomes_fact() {
        let fact = Technology { name: "PHP".into(), category: "Language".into(), version: Some("8.2".into()) }
            .into_fact("https://site.test");
        assert_eq!(fact.kind(), "technology");
        assert_eq!(fact.subject(), "PHP");
        assert_eq!(fact.str_attribute("version"), Some("8.2"));
        assert_eq!(fact.str_attribute("url"), Some("https://site.test"));
    }
}
