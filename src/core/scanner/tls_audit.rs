// src/core/scanner/tls_audit.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use native_tls::TlsConnector;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;
use tokio::task::spawn_blocking;
use tracing::{debug, error, info};
use x509_parser::prelude::*;

use crate::core::models::{Context, Finding, Severity};
use crate::core::module::{Capabilities, ProbeModule, ProbeOutcome};

const NAME: &str = "TlsAudit";

/// Certificates expiring within this many days are flagged.
const EXPIRY_WARNING_DAYS: i64 = 30;

#[derive(Debug, Clone)]
struct CertificateInfo {
    subject_name: String,
    issuer_name: String,
    not_after: DateTime<Utc>,
    days_until_expiry: i64,
    is_valid: bool,
}

/// What the handshake produced, before analysis.
#[derive(Debug)]
enum TlsObservation {
    Certificate(CertificateInfo),
    NoCertificate,
    HandshakeFailed(String),
}

/// Certificate audit of the url host on port 443.
pub struct TlsAudit {
    timeout: Duration,
}

impl TlsAudit {
    /// # Arguments
    /// * `timeout` - Bound on the TCP connect and on each socket read or write.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for TlsAudit {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

#[async_trait]
impl ProbeModule for TlsAudit {
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
        info!(target = %host, "Starting TLS audit.");

        let timeout = self.timeout;
        let target = host.clone();
        debug!("Spawning blocking task for TLS connection.");
        let observation = match spawn_blocking(move || perform_tls_scan(&target, timeout)).await {
            Ok(Ok(observation)) => observation,
            Ok(Err(reason)) => return ProbeOutcome::Failed(reason),
            Err(e) => {
                error!(panic = %e, "Blocking TLS task panicked!");
                return ProbeOutcome::Failed(format!("Task panicked: {e}"));
            }
        };

        let findings = analyze_observation(&host, &observation);
        info!(findings = findings.len(), "TLS audit finished.");
        ProbeOutcome::from_items(findings)
    }
}

/// `Err` is reserved for failures to reach the host at all.
///
/// The connector verifies the chain, so a server presenting an expired
/// certificate normally ends up as `HandshakeFailed` (reported HIGH) rather
/// than reaching the expiry analysis.
fn perform_tls_scan(target: &str, timeout: Duration) -> Result<TlsObservation, String> {
    let connector = TlsConnector::new().map_err(|e| {
        error!(error = %e, "Failed to create TlsConnector");
        format!("TlsConnector Error: {e}")
    })?;

    let address = (target, 443)
        .to_socket_addrs()
        .map_err(|e| format!("DNS resolution failed: {e}"))?
        .next()
        .ok_or_else(|| format!("no address for {target}"))?;

    debug!(target, "Connecting TCP stream to port 443.");
    let stream = TcpStream::connect_timeout(&address, timeout).map_err(|e| {
        error!(error = %e, "TCP connection failed");
        format!("TCP Connection Error: {e}")
    })?;
    stream.set_read_timeout(Some(timeout)).map_err(|e| e.to_string())?;
    stream.set_write_timeout(Some(timeout)).map_err(|e| e.to_string())?;

    debug!(target, "Performing TLS handshake.");
    let stream = match connector.connect(target, stream) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "TLS handshake failed");
            return Ok(TlsObservation::HandshakeFailed(e.to_string()));
        }
    };

    let cert = match stream.peer_certificate() {
        Ok(Some(c)) => c,
        Ok(None) => return Ok(TlsObservation::NoCertificate),
        Err(e) => return Err(format!("Could not get peer certificate: {e}")),
    };
    let cert_der = cert.to_der().map_err(|e| format!("Could not convert certificate to DER: {e}"))?;
    let (_, x509) = parse_x509_certificate(&cert_der).map_err(|e| format!("X.509 Parse Error: {e}"))?;

    info!(subject = %x509.subject(), issuer = %x509.issuer(), "Successfully parsed certificate.");
    let validity = x509.validity();
    let not_after = asn1_time_to_chrono_utc(&validity.not_after);
    let not_before = asn1_time_to_chrono_utc(&validity.not_before);
    let now = Utc::now();

    Ok(TlsObservation::Certificate(CertificateInfo {
        subject_name: x509.subject().to_string(),
        issuer_name: x509.issuer().to_string(),
        not_after,
        days_until_expiry: not_after.signed_duration_since(now).num_days(),
        is_valid: now > not_before && now < not_after,
    }))
}

fn asn1_time_to_chrono_utc(time: &ASN1Time) -> DateTime<Utc> {
    DateTime::from_timestamp(time.timestamp(), 0).unwrap_or_default()
}

/// Grades a handshake observation.
///
/// # Arguments
/// * `host` - The audited host, used as the finding target.
/// * `observation` - What the handshake produced.
///
/// # Returns
/// HIGH for a failed handshake, MEDIUM for a missing certificate, CRITICAL for
/// a certificate outside its validity window, and MEDIUM for a valid one
/// expiring within `EXPIRY_WARNING_DAYS`. A healthy certificate yields nothing.
fn analyze_observation(host: &str, observation: &TlsObservation) -> Vec<Finding> {
    let mut findings = Vec::new();
    match observation {
        TlsObservation::HandshakeFailed(reason) => {
            findings.push(Finding::new(NAME, host, Severity::High, "TLS handshake failed", reason.as_str()));
        }
        TlsObservation::NoCertificate => {
            findings.push(Finding::new(
                NAME,
                host,
                Severity::Medium,
                "No TLS certificate presented",
                "Handshake completed without a peer certificate",
            ));
        }
        TlsObservation::Certificate(info) => {
            let details = format!(
                "subject: {}; issuer: {}; expires: {}",
                info.subject_name, info.issuer_name, info.not_after
            );
            if !info.is_valid {
                debug!(expiry_date = %info.not_after, "Certificate is outside its validity window.");
                findings.push(Finding::new(NAME, host, Severity::Critical, "TLS certificate expired or not yet valid", details.clone()));
            }
            if info.is_valid && (0..=EXPIRY_WARNING_DAYS).contains(&info.days_until_expiry) {
                debug!(days_left = info.days_until_expiry, "Certificate is expiring soon.");
                findings.push(Finding::new(
                    NAME,
                    host,
                    Severity::Medium,
                    format!("TLS certificate expires in {} days", info.days_until_expiry),
                    details,
                ));
            }
        }
    }
    findings
}
