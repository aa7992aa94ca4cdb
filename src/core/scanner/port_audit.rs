// src/core/scanner/port_audit.rs

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::core::models::{Context, Fact, Finding, Severity};
use crate::core::module::{AnalysisInput, Capabilities, ProbeModule, ProbeOutcome};

const NAME: &str = "PortAudit";

/// Context param listing the ports to probe.
pub const PORTS_PARAM: &str = "ports";

pub const OPEN_PORT_FACT: &str = "open_port";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(1);
const BANNER_TIMEOUT: Duration = Duration::from_secs(2);
const BANNER_LIMIT: usize = 1024;
const MAX_IN_FLIGHT: usize = 64;

/// Ports whose exposure is worth more than an informational note.
const SUSPICIOUS_PORTS: &[u16] = &[23, 445, 3389];

/// Probed when the context does not name any ports.
const DEFAULT_PORTS: &[u16] = &[21, 22, 23, 25, 53, 80, 135, 139, 443, 445, 3389];

/// Conventional service name for a well-known port.
///
/// # Arguments
/// * `port` - TCP port number.
///
/// # Returns
/// The service label, or `"Unknown"` for ports outside the table.
pub fn service_name(port: u16) -> &'static str {
    match port {
        21 => "FTP",
        22 => "SSH",
        25 => "SMTP",
        53 => "DNS",
        80 => "HTTP",
        135 => "RPC",
        139 => "NetBIOS",
        443 => "HTTPS",
        445 => "SMB",
        _ => "Unknown",
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct OpenPort {
    host: String,
    port: u16,
    banner: Option<String>,
}

impl OpenPort {
    fn into_fact(self) -> Fact {
        let fact = Fact::new(OPEN_PORT_FACT, format!("{}:{}", self.host, self.port))
            .with("host", self.host)
            .with("port", self.port)
            .with("service", service_name(self.port));
        match self.banner {
            Some(banner) => fact.with("banner", banner),
            None => fact,
        }
    }
}

/// TCP connect scan of the context targets. Open ports are published as
/// facts during collect and graded during analyze.
#[derive(Debug, Default)]
pub struct PortAudit;

#[async_trait]
impl ProbeModule for PortAudit {
    fn name(&self) -> &str {
        NAME
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::COLLECT | Capabilities::ANALYZE
    }

    async fn collect(&self, ctx: &Context) -> ProbeOutcome<Fact> {
        let hosts = scan_hosts(ctx);
        if hosts.is_empty() {
            return ProbeOutcome::Empty;
        }
        let ports = match requested_ports(ctx) {
            Ok(ports) => ports,
            Err(reason) => return ProbeOutcome::Failed(reason),
        };
        info!(hosts = hosts.len(), ports = ports.len(), "Starting port scan.");

        let open = scan(&hosts, &ports).await;
        info!(open = open.len(), "Port scan finished.");
        ProbeOutcome::from_items(open.into_iter().map(OpenPort::into_fact).collect())
    }

    async fn analyze(&self, input: &AnalysisInput, _ctx: &Context) -> ProbeOutcome<Finding> {
        input
            .facts
            .iter()
            .filter(|fact| fact.kind() == OPEN_PORT_FACT)
            .filter_map(grade_open_port)
            .collect::<Vec<_>>()
            .into()
    }
}

/// Explicit targets win; otherwise the url host is scanned.
fn scan_hosts(ctx: &Context) -> Vec<String> {
    if !ctx.targets().is_empty() {
        return ctx.targets().to_vec();
    }
    ctx.host().into_iter().collect()
}

fn requested_ports(ctx: &Context) -> Result<Vec<u16>, String> {
    let Some(value) = ctx.param(PORTS_PARAM) else {
        return Ok(DEFAULT_PORTS.to_vec());
    };
    let entries = value.as_array().ok_or_else(|| format!("'{PORTS_PARAM}' must be an array"))?;
    entries
        .iter()
        .map(|v| {
            v.as_u64()
                .and_then(|p| u16::try_from(p).ok())
                .ok_or_else(|| format!("invalid port in '{PORTS_PARAM}': {v}"))
        })
        .collect()
}

/// Results come back in host-major, port-minor order regardless of timing.
async fn scan(hosts: &[String], ports: &[u16]) -> Vec<OpenPort> {
    let permits = Arc::new(Semaphore::new(MAX_IN_FLIGHT));
    let mut tasks = JoinSet::new();
    let mut index = 0usize;
    for host in hosts {
        for &port in ports {
            let host = host.clone();
            let permits = Arc::clone(&permits);
            let slot = index;
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await.ok()?;
                probe(&host, port).await.map(|open| (slot, open))
            });
            index += 1;
        }
    }

    let mut slots: Vec<Option<OpenPort>> = vec![None; index];
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Some((slot, open))) => slots[slot] = Some(open),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Port probe task failed."),
        }
    }
    slots.into_iter().flatten().collect()
}

async fn probe(host: &str, port: u16) -> Option<OpenPort> {
    let mut stream = match tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect((host, port))).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            debug!(host, port, error = %e, "Port closed.");
            return None;
        }
        Err(_) => {
            debug!(host, port, "Connect timed out.");
            return None;
        }
    };
    debug!(host, port, "Port open, reading banner.");

    let mut buf = vec![0u8; BANNER_LIMIT];
    let banner = match tokio::time::timeout(BANNER_TIMEOUT, stream.read(&mut buf)).await {
        Ok(Ok(n)) if n > 0 => normalize_banner(&buf[..n]),
        _ => None,
    };
    Some(OpenPort { host: host.to_string(), port, banner })
}

fn normalize_banner(raw: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(raw).trim().to_string();
    (!text.is_empty()).then_some(text)
}

fn grade_open_port(fact: &Fact) -> Option<Finding> {
    let port = fact.attribute("port").and_then(Value::as_u64).and_then(|p| u16::try_from(p).ok())?;
    let service = service_name(port);
    let details = match fact.str_attribute("banner") {
        Some(banner) => format!("Service: {service}; banner: {banner}"),
        None => format!("Service: {service}"),
    };
    let (severity, issue) = if SUSPICIOUS_PORTS.contains(&port) {
        (Severity::Medium, format!("Suspicious port {port} open"))
    } else {
        (Severity::Info, format!("Port {port} open"))
    };
    Some(Finding::new(NAME, fact.subject(), severity, issue, details))
}
