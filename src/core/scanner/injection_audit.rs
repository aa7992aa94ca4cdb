// src/core/scanner/injection_audit.rs

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use tracing::{debug, info};

use crate::core::models::{Context, Finding, Severity};
use crate::core::module::{AnalysisInput, Capabilities, ProbeModule, ProbeOutcome};

const NAME: &str = "InjectionAudit";

const PROMPT_INJECTION_PATTERNS: &[&str] = &[
    r"ignore previous rules",
    r"bypass security",
    r"override system",
    r"godmode",
    r"delete all",
    r"shutdown",
    r"format disk",
];

const SQL_INJECTION_PATTERNS: &[&str] = &[
    r"union select",
    r"drop table",
    r"insert into",
    r"update .* set",
    r"delete from",
    r"--",
    r";",
    r"' or '1'='1",
    r#"" or "1"="1"#,
    r"or 1=1",
    r"exec\(",
    r"benchmark\(",
];

fn compile(patterns: &[&'static str]) -> Vec<(&'static str, Regex)> {
    patterns
        .iter()
        .map(|p| (*p, RegexBuilder::new(p).case_insensitive(true).build().unwrap()))
        .collect()
}

static PROMPT_RULES: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| compile(PROMPT_INJECTION_PATTERNS));
static SQL_RULES: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| compile(SQL_INJECTION_PATTERNS));

/// Flags prompt-injection phrases and SQL injection fragments in free text.
///
/// Scan looks at everything the caller supplied in the context; analyze
/// looks at the textual values of facts other modules collected.
#[derive(Debug, Default)]
pub struct InjectionAudit;

#[async_trait]
impl ProbeModule for InjectionAudit {
    fn name(&self) -> &str {
        NAME
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::SCAN | Capabilities::ANALYZE
    }

    async fn scan(&self, ctx: &Context) -> ProbeOutcome<Finding> {
        let inputs = ctx.inputs();
        debug!(inputs = inputs.len(), "Inspecting context inputs for injection patterns.");
        let findings = inspect(&inputs, ctx.url());
        if !findings.is_empty() {
            info!(count = findings.len(), "Injection patterns found in context inputs.");
        }
        ProbeOutcome::from_items(findings)
    }

    async fn analyze(&self, input: &AnalysisInput, ctx: &Context) -> ProbeOutcome<Finding> {
        let values: Vec<String> = input.facts.iter().flat_map(|fact| fact.text_values()).collect();
        ProbeOutcome::from_items(inspect(&values, ctx.url()))
    }
}

/// Every matching pattern yields its own finding, prompt patterns first.
///
/// # Arguments
/// * `items` - Free-text values to inspect.
/// * `url` - Finding target when present; otherwise the input class is used.
fn inspect(items: &[String], url: Option<&str>) -> Vec<Finding> {
    let mut findings = Vec::new();
    for item in items {
        for (pattern, re) in PROMPT_RULES.iter() {
            if re.is_match(item) {
                findings.push(matched(url.unwrap_or("LLM_INPUT"), "Prompt Injection Detected", pattern, item));
            }
        }
        for (pattern, re) in SQL_RULES.iter() {
            if re.is_match(item) {
                findings.push(matched(url.unwrap_or("SQL_INPUT"), "SQL Injection Attempt Detected", pattern, item));
            }
        }
    }
    findings
}

fn matched(target: &str, issue: &str, pattern: &str, item: &str) -> Finding {
    Finding::new(
        NAME,
        target,
        Severity::High,
        issue,
        format!("Matched pattern: '{pattern}' in input: '{item}'"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::Fact;
    use serde_json::json;
    use std::sync::Arc;

    fn items(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn prompt_injection_is_case_insensitive() {
        let findings = inspect(&items(&["Please IGNORE PREVIOUS RULES now"]), None);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].issue(), "Prompt Injection Detected");
        assert_eq!(findings[0].target(), "LLM_INPUT");
        assert_eq!(
            findings[0].details(),
            "Matched pattern: 'ignore previous rules' in input: 'Please IGNORE PREVIOUS RULES now'"
        );
    }

    #[test]
    fn each_sql_pattern_matches_separately() {
        let findings = inspect(&items(&["1; DROP TABLE users"]), Some("https://site.test"));
        let details: Vec<_> = findings.iter().map(Finding::details).collect();
        assert_eq!(findings.len(), 2);
        assert!(details[0].contains("'drop table'"));
        assert!(details[1].contains("';'"));
        assert!(findings.iter().all(|f| f.target() == "https://site.test" && f.severity() == Severity::High));
    }

    #[test]
    fn wildcard_pattern_and_escaped_parenthesis() {
        assert_eq!(inspect(&items(&["UPDATE users SET admin=1"]), None).len(), 1);
        assert_eq!(inspect(&items(&["select benchmark(1000000,md5(1))"]), None).len(), 1);
        assert!(inspect(&items(&["benchmark results"]), None).is_empty());
    }

    #[test]
    fn clean_input_yields_nothing() {
        assert!(inspect(&items(&["https://site.test/products?page=2"]), None).is_empty());
    }

    #[tokio::test]
    async fn scan_reads_nested_params() {
        let ctx = Context::for_url("https://site.test").with_param("form", json!({"q": "x' or '1'='1"}));
        let findings = InjectionAudit.scan(&ctx).await.into_items();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].issue(), "SQL Injection Attempt Detected");
    }

    #[tokio::test]
    async fn analyze_reads_fact_values() {
        let input = AnalysisInput {
            producer: "DeviceInventory".into(),
            findings: Arc::from(Vec::new()),
            facts: Arc::from(vec![Fact::new("device", "router").with("note", "godmode enabled")]),
        };
        let findings = InjectionAudit.analyze(&input, &Context::new()).await.into_items();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].target(), "LLM_INPUT");
    }
}
