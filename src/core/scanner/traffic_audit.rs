// src/core/scanner/traffic_audit.rs

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::core::models::{Context, Finding, Severity};
use crate::core::module::{Capabilities, ProbeModule, ProbeOutcome};

const NAME: &str = "TrafficAudit";

/// Context param holding captured packet summaries.
pub const PACKETS_PARAM: &str = "packets";

const SUSPICIOUS_PORTS: &[u16] = &[23, 445, 3389];

/// Anything above a standard Ethernet MTU.
const MAX_NORMAL_LENGTH: u64 = 1500;

/// Summary of one captured packet. Capture itself happens elsewhere.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PacketSummary {
    #[serde(default)]
    pub src_ip: Option<String>,
    #[serde(default)]
    pub dst_ip: Option<String>,
    #[serde(default)]
    pub dst_port: Option<u16>,
    #[serde(default)]
    pub length: u64,
    #[serde(default)]
    pub protocol_name: Option<String>,
}

impl PacketSummary {
    /// Severity of a single packet.
    ///
    /// # Returns
    /// HIGH for oversized packets, MEDIUM for traffic to a suspicious port,
    /// LOW otherwise. Size wins over port.
    pub fn classify(&self) -> Severity {
        if self.length > MAX_NORMAL_LENGTH {
            Severity::High
        } else if self.dst_port.is_some_and(|p| SUSPICIOUS_PORTS.contains(&p)) {
            Severity::Medium
        } else {
            Severity::Low
        }
    }

    fn destination(&self) -> String {
        let ip = self.dst_ip.as_deref().unwrap_or("unknown");
        match self.dst_port {
            Some(port) => format!("{ip}:{port}"),
            None => ip.to_string(),
        }
    }
}

/// Grades captured traffic; only packets above LOW are reported.
#[derive(Debug, Default)]
pub struct TrafficAudit;

#[async_trait]
impl ProbeModule for TrafficAudit {
    fn name(&self) -> &str {
        NAME
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::SCAN
    }

    async fn scan(&self, ctx: &Context) -> ProbeOutcome<Finding> {
        let Some(packets) = ctx.param(PACKETS_PARAM) else {
            return ProbeOutcome::Empty;
        };
        let Some(entries) = packets.as_array() else {
            return ProbeOutcome::Failed(format!("'{PACKETS_PARAM}' must be an array"));
        };

        let summaries: Vec<PacketSummary> = entries.iter().filter_map(parse_packet).collect();
        let findings: Vec<Finding> = summaries.iter().filter_map(packet_finding).collect();
        info!(packets = summaries.len(), flagged = findings.len(), "Traffic classified.");
        ProbeOutcome::from_items(findings)
    }
}

fn parse_packet(entry: &Value) -> Option<PacketSummary> {
    match PacketSummary::deserialize(entry) {
        Ok(packet) => Some(packet),
        Err(e) => {
            warn!(error = %e, "Skipping malformed packet summary.");
            None
        }
    }
}

fn packet_finding(packet: &PacketSummary) -> Option<Finding> {
    let severity = packet.classify();
    let issue = match severity {
        Severity::High => "Large packet anomaly".to_string(),
        Severity::Medium => format!("Traffic to suspicious port {}", packet.dst_port.unwrap_or_default()),
        _ => return None,
    };
    debug!(destination = %packet.destination(), %severity, "Packet flagged.");
    let details = format!(
        "{} {} -> {} ({} bytes)",
        packet.protocol_name.as_deref().unwrap_or("IP"),
        packet.src_ip.as_deref().unwrap_or("unknown"),
        packet.destination(),
        packet.length
    );
    Some(Finding::new(NAME, packet.destination(), severity, issue, details))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn packet(dst_port: Option<u16>, length: u64) -> PacketSummary {
        PacketSummary { dst_ip: Some("10.0.0.9".into()), dst_port, length, ..Default::default() }
    }

    #[test]
    fn classification_rules() {
        assert_eq!(packet(Some(443), 60).classify(), Severity::Low);
        assert_eq!(packet(Some(3389), 60).classify(), Severity::Medium);
        assert_eq!(packet(Some(443), 1501).classify(), Severity::High);
        assert_eq!(packet(Some(445), 9000).classify(), Severity::High);
        assert_eq!(packet(None, 1500).classify(), Severity::Low);
    }

    #[tokio::test]
    async fn only_flagged_packets_become_findings() {
        let ctx = Context::new().with_param(
            PACKETS_PARAM,
            json!([
                {"src_ip": "10.0.0.2", "dst_ip": "10.0.0.9", "dst_port": 23, "length": 80, "protocol_name": "TCP"},
                {"src_ip": "10.0.0.2", "dst_ip": "10.0.0.9", "dst_port": 443, "length": 80},
                {"dst_ip": "10.0.0.7", "length": 4000, "protocol_name": "ICMP"},
                {"dst_port": "not-a-port"}
            ]),
        );
        let findings = TrafficAudit.scan(&ctx).await.into_items();
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].severity(), Severity::Medium);
        assert_eq!(findings[0].issue(), "Traffic to suspicious port 23");
        assert_eq!(findings[0].details(), "TCP 10.0.0.2 -> 10.0.0.9:23 (80 bytes)");
        assert_eq!(findings[1].severity(), Severity::High);
        assert_eq!(findings[1].target(), "10.0.0.7");
    }
}
