// src/core/scanner/dns_audit.rs

use async_trait::async_trait;
use hickory_resolver::TokioAsyncResolver;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::error::{ResolveError, ResolveErrorKind};
use hickory_resolver::proto::rr::RecordType;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::core::models::{Context, Finding, Severity};
use crate::core::module::{Capabilities, ProbeModule, ProbeOutcome};

const NAME: &str = "DnsAudit";

/// Common DKIM selectors tried when the real one is unknown.
const COMMON_DKIM_SELECTORS: &[&str] = &["google", "selector1", "selector2", "default", "dkim"];

/// `Ok(None)` means the lookup succeeded but nothing relevant exists.
type Lookup<T> = Result<Option<T>, String>;

#[derive(Debug)]
struct DmarcData {
    policy: Option<String>,
}

#[derive(Debug)]
struct DnsRecords {
    spf: Lookup<String>,
    dmarc: Lookup<DmarcData>,
    dkim: Lookup<Vec<String>>,
    caa: Lookup<Vec<String>>,
}

impl DnsRecords {
    fn all_failed(&self) -> bool {
        self.spf.is_err() && self.dmarc.is_err() && self.dkim.is_err() && self.caa.is_err()
    }
}

/// Email-authentication and CAA posture of the url's domain.
pub struct DnsAudit {
    timeout: Duration,
}

impl DnsAudit {
    /// Creates the audit.
    ///
    /// # Arguments
    /// * `timeout` - Per-query resolver timeout. Each query is attempted once.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for DnsAudit {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

#[async_trait]
impl ProbeModule for DnsAudit {
    fn name(&self) -> &str {
        NAME
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::SCAN
    }

    async fn scan(&self, ctx: &Context) -> ProbeOutcome<Finding> {
        let Some(host) = ctx.host() else {
            return ProbeOutcome::Empty;
        };
        // These records live on the registrable domain, not the www host.
        let domain = host.strip_prefix("www.").unwrap_or(&host).to_string();
        info!(target = %domain, "Starting DNS audit.");

        let mut opts = ResolverOpts::default();
        opts.timeout = self.timeout;
        opts.attempts = 1;
        let resolver = TokioAsyncResolver::tokio(ResolverConfig::default(), opts);

        let (spf, dmarc, dkim, caa) = tokio::join!(
            lookup_spf(&resolver, &domain),
            lookup_dmarc(&resolver, &domain),
            lookup_dkim(&resolver, &domain),
            lookup_caa(&resolver, &domain)
        );
        let records = DnsRecords { spf, dmarc, dkim, caa };
        if records.all_failed() {
            return ProbeOutcome::Failed(format!("every DNS lookup failed for {domain}"));
        }

        let findings = analyze_dns_records(&domain, &records);
        info!(findings = findings.len(), "DNS audit finished.");
        ProbeOutcome::from_items(findings)
    }
}

/// Turns the raw lookup results into findings.
///
/// # Arguments
/// * `domain` - The audited domain, used as the finding target.
/// * `records` - One lookup result per record type.
///
/// # Returns
/// A vector of findings, DMARC first, then SPF, DKIM and CAA. A lookup that
/// failed contributes nothing; only a lookup that found no record is reported.
fn analyze_dns_records(domain: &str, records: &DnsRecords) -> Vec<Finding> {
    let mut findings = Vec::new();
    let mut push = |severity, issue: &str, details: &str| {
        findings.push(Finding::new(NAME, domain, severity, issue, details));
    };

    match &records.dmarc {
        Ok(Some(dmarc)) if dmarc.policy.as_deref() == Some("none") => {
            debug!("DMARC analysis: found policy 'none'.");
            push(Severity::Medium, "DMARC policy is 'none'", "Spoofed mail is reported but not blocked");
        }
        Ok(Some(_)) | Err(_) => {}
        Ok(None) => push(Severity::High, "DMARC record missing", "No TXT record at _dmarc"),
    }

    match &records.spf {
        Ok(Some(spf)) if spf.ends_with("~all") => {
            push(Severity::Low, "SPF policy is 'softfail'", spf.as_str());
        }
        Ok(Some(spf)) if spf.ends_with("?all") => {
            push(Severity::Low, "SPF policy is 'neutral'", spf.as_str());
        }
        Ok(Some(_)) | Err(_) => {}
        Ok(None) => push(Severity::Medium, "SPF record missing", "No v=spf1 TXT record"),
    }

    if let Ok(None) = &records.dkim {
        push(Severity::Info, "DKIM record missing", "No DKIM key found for common selectors");
    }

    if let Ok(None) = &records.caa {
        push(Severity::Info, "CAA record missing", "Any certificate authority may issue for this domain");
    }

    findings
}

/// Pulls the `p=` tag out of a DMARC record.
fn dmarc_policy(record: &str) -> Option<String> {
    record
        .split(';')
        .find(|s| s.trim().starts_with("p="))
        .and_then(|s| s.trim().split('=').nth(1))
        .map(|s| s.trim().to_string())
}

async fn lookup_spf(resolver: &TokioAsyncResolver, domain: &str) -> Lookup<String> {
    match resolver.txt_lookup(domain).await {
        Ok(txt_records) => Ok(txt_records
            .iter()
            .map(|r| r.to_string())
            .find(|r| r.starts_with("v=spf1"))),
        Err(e) => absent_or_failed("SPF", domain, e),
    }
}

async fn lookup_dmarc(resolver: &TokioAsyncResolver, domain: &str) -> Lookup<DmarcData> {
    let dmarc_target = format!("_dmarc.{domain}");
    match resolver.txt_lookup(&dmarc_target).await {
        Ok(txt_records) => Ok(txt_records.iter().next().map(|record| DmarcData {
            policy: dmarc_policy(&record.to_string()),
        })),
        Err(e) => absent_or_failed("DMARC", &dmarc_target, e),
    }
}

async fn lookup_dkim(resolver: &TokioAsyncResolver, domain: &str) -> Lookup<Vec<String>> {
    let mut found = Vec::new();
    for selector in COMMON_DKIM_SELECTORS {
        let dkim_target = format!("{selector}._domainkey.{domain}");
        match resolver.txt_lookup(&dkim_target).await {
            Ok(txt_records) => found.extend(
                txt_records
                    .iter()
                    .map(|r| r.to_string())
                    .filter(|r| r.starts_with("v=DKIM1")),
            ),
            // Most selectors simply do not exist.
            Err(e) => debug!(selector, error = %e, "DKIM lookup for this selector failed."),
        }
    }
    Ok((!found.is_empty()).then_some(found))
}

async fn lookup_caa(resolver: &TokioAsyncResolver, domain: &str) -> Lookup<Vec<String>> {
    match resolver.lookup(domain, RecordType::CAA).await {
        Ok(caa_lookup) => {
            let records: Vec<String> = caa_lookup.iter().map(|r| r.to_string()).collect();
            Ok((!records.is_empty()).then_some(records))
        }
        Err(e) => absent_or_failed("CAA", domain, e),
    }
}

/// An empty answer (NXDOMAIN or NOERROR without data) means the record does
/// not exist. Every other resolver error is a failed lookup.
fn absent_or_failed<T>(record: &str, name: &str, error: ResolveError) -> Lookup<T> {
    if matches!(error.kind(), ResolveErrorKind::NoRecordsFound { .. }) {
        debug!(record, target = name, "No records found.");
        return Ok(None);
    }
    warn!(record, target = name, error = %error, "DNS lookup failed.");
    Err(format!("DNS Error: {error}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records(spf: Lookup<String>, dmarc: Lookup<DmarcData>) -> DnsRecords {
        DnsRecords { spf, dmarc, dkim: Ok(Some(vec!["v=DKIM1; k=rsa".into()])), caa: Ok(Some(vec!["0 issue \"letsencrypt.org\"".into()])) }
    }

    fn issues(findings: &[Finding]) -> Vec<(&str, Severity)> {
        findings.iter().map(|f| (f.issue(), f.severity())).collect()
    }

    #[test]
    fn missing_dmarc_and_spf() {
        let findings = analyze_dns_records("site.test", &records(Ok(None), Ok(None)));
        assert_eq!(
            issues(&findings),
            [("DMARC record missing", Severity::High), ("SPF record missing", Severity::Medium)]
        );
    }

    #[test]
    fn weak_policies_are_flagged() {
        let findings = analyze_dns_records(
            "site.test",
            &records(
                Ok(Some("v=spf1 include:_spf.google.com ~all".into())),
                Ok(Some(DmarcData { policy: Some("none".into()) })),
            ),
        );
        assert_eq!(
            issues(&findings),
            [("DMARC policy is 'none'", Severity::Medium), ("SPF policy is 'softfail'", Severity::Low)]
        );
    }

    #[test]
    fn strict_configuration_is_clean() {
        let findings = analyze_dns_records(
            "site.test",
            &records(Ok(Some("v=spf1 -all".into())), Ok(Some(DmarcData { policy: Some("reject".into()) }))),
        );
        assert!(findings.is_empty());
    }

    #[test]
    fn lookup_errors_produce_no_findings() {
        let findings = analyze_dns_records("site.test", &records(Err("timeout".into()), Err("timeout".into())));
        assert!(findings.is_empty());
    }

    #[test]
    fn missing_dkim_and_caa_are_informational() {
        let record = DnsRecords {
            spf: Ok(Some("v=spf1 -all".into())),
            dmarc: Ok(Some(DmarcData { policy: Some("quarantine".into()) })),
            dkim: Ok(None),
            caa: Ok(None),
        };
        let findings = analyze_dns_records("site.test", &record);
        assert_eq!(
            issues(&findings),
            [("DKIM record missing", Severity::Info), ("CAA record missing", Severity::Info)]
        );
    }

    fn no_records(name: &str) -> ResolveError {
        use hickory_resolver::proto::op::{Query, ResponseCode};
        use hickory_resolver::proto::rr::Name;

        ResolveError::from(ResolveErrorKind::NoRecordsFound {
            query: Box::new(Query::query(Name::from_ascii(name).unwrap(), RecordType::TXT)),
            soa: None,
            negative_ttl: None,
            response_code: ResponseCode::NXDomain,
            trusted: true,
        })
    }

    #[test]
    fn empty_answer_counts_as_missing_record() {
        let spf: Lookup<String> = absent_or_failed("SPF", "site.test", no_records("site.test."));
        assert_eq!(spf, Ok(None));

        let findings = analyze_dns_records("site.test", &records(spf, Ok(Some(DmarcData { policy: Some("reject".into()) }))));
        assert_eq!(issues(&findings), [("SPF record missing", Severity::Medium)]);
    }

    #[test]
    fn other_resolver_errors_are_failures() {
        let refused = ResolveError::from(ResolveErrorKind::Message("connection refused"));
        let caa: Lookup<Vec<String>> = absent_or_failed("CAA", "site.test", refused);
        assert!(caa.unwrap_err().contains("connection refused"));

        let timeout = ResolveError::from(ResolveErrorKind::Timeout);
        assert!(absent_or_failed::<String>("SPF", "site.test", timeout).is_err());
    }

    #[test]
    fn dmarc_policy_extraction() {
        assert_eq!(dmarc_policy("v=DMARC1; p=reject; rua=mailto:x@y").as_deref(), Some("reject"));
        assert_eq!(dmarc_policy("v=DMARC1;p=none").as_deref(), Some("none"));
        assert_eq!(dmarc_policy("v=DMARC1"), None);
    }
}
