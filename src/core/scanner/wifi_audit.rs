// src/core/scanner/wifi_audit.rs

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::core::models::{Context, Finding, Severity};
use crate::core::module::{Capabilities, ProbeModule, ProbeOutcome};

const NAME: &str = "WifiAudit";

/// Context param carrying pre-captured `netsh` output; skips the live command.
pub const SCAN_OUTPUT_PARAM: &str = "wifi_scan_output";

const DEFAULT_SSID_PATTERNS: &[&str] = &["TP-Link", "D-Link", "NETGEAR", "ACT", "Airtel", "JioFiber", "Huawei"];

const FACTORY_DEFAULT_ISSUE: &str = "SSID resembles factory default (verify credentials changed)";

static RE_SSID_SPLIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\r?\nSSID \d+ : ").unwrap());
static RE_BSSID: Lazy<Regex> = Lazy::new(|| Regex::new(r"BSSID \d+ *: ([\w:]+)").unwrap());
static RE_AUTH: Lazy<Regex> = Lazy::new(|| Regex::new(r"Authentication\s+:\s+(.*)").unwrap());
static RE_ENC: Lazy<Regex> = Lazy::new(|| Regex::new(r"Encryption\s+:\s+(.*)").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
struct WirelessNetwork {
    ssid: String,
    bssid: String,
    authentication: String,
    encryption: String,
}

/// Audits nearby wireless networks as reported by `netsh wlan`.
pub struct WifiAudit {
    timeout: Duration,
}

impl WifiAudit {
    /// # Arguments
    /// * `timeout` - How long the `netsh` command may run before it is abandoned.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn scan_output(&self, ctx: &Context) -> Result<String, String> {
        if let Some(output) = ctx.param(SCAN_OUTPUT_PARAM).and_then(|v| v.as_str()) {
            debug!("Using supplied wireless scan output.");
            return Ok(output.to_string());
        }

        let command = Command::new("netsh")
            .args(["wlan", "show", "networks", "mode=bssid"])
            .kill_on_drop(true)
            .output();
        let output = tokio::time::timeout(self.timeout, command)
            .await
            .map_err(|_| format!("netsh did not answer within {:?}", self.timeout))?
            .map_err(|e| format!("Error running netsh: {e}"))?;
        if !output.status.success() {
            return Err(format!("netsh exited with {}", output.status));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Default for WifiAudit {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

#[async_trait]
impl ProbeModule for WifiAudit {
    fn name(&self) -> &str {
        NAME
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::SCAN
    }

    async fn scan(&self, ctx: &Context) -> ProbeOutcome<Finding> {
        let output = match self.scan_output(ctx).await {
            Ok(output) => output,
            Err(reason) => {
                warn!(reason = %reason, "Wireless scan unavailable.");
                return ProbeOutcome::Failed(reason);
            }
        };

        let networks = parse_networks(&output);
        info!(networks = networks.len(), "Wireless networks parsed.");
        ProbeOutcome::from_items(networks.iter().map(evaluate_network).collect())
    }
}

/// Splits `netsh wlan show networks mode=bssid` output into networks.
///
/// # Arguments
/// * `output` - Raw command output.
///
/// # Returns
/// One entry per SSID block. Fields the block does not carry read "Unknown".
fn parse_networks(output: &str) -> Vec<WirelessNetwork> {
    // Prefix a newline so a leading "SSID 1 : " block is split like the rest.
    let normalized = format!("\n{output}");
    RE_SSID_SPLIT
        .split(&normalized)
        .skip(1)
        .filter_map(|block| {
            let ssid = block.lines().next().map(str::trim).unwrap_or_default();
            if ssid.is_empty() {
                return None;
            }
            let capture = |re: &Regex| {
                re.captures(block)
                    .and_then(|c| c.get(1))
                    .map(|m| m.as_str().trim().to_string())
                    .unwrap_or_else(|| "Unknown".to_string())
            };
            Some(WirelessNetwork {
                ssid: ssid.to_string(),
                bssid: capture(&RE_BSSID),
                authentication: capture(&RE_AUTH),
                encryption: capture(&RE_ENC),
            })
        })
        .collect()
}

fn evaluate_network(network: &WirelessNetwork) -> Finding {
    let auth = network.authentication.as_str();
    let (mut severity, mut issue) = if auth.contains("Open") {
        (Severity::Critical, "Open WiFi network detected".to_string())
    } else if auth.contains("WEP") {
        (Severity::Critical, "WEP encryption detected (deprecated)".to_string())
    } else if auth.contains("WPA") && !auth.contains("WPA3") {
        (Severity::Medium, "WPA/WPA2 detected (check for legacy support)".to_string())
    } else {
        (Severity::Low, "Secure configuration".to_string())
    };

    if resembles_factory_default(&network.ssid) {
        severity = severity.max(Severity::Medium);
        issue.push_str("; ");
        issue.push_str(FACTORY_DEFAULT_ISSUE);
    }

    Finding::new(
        NAME,
        network.ssid.as_str(),
        severity,
        issue,
        format!("{} / {} (BSSID {})", network.authentication, network.encryption, network.bssid),
    )
}

fn resembles_factory_default(ssid: &str) -> bool {
    let ssid = ssid.to_lowercase();
    DEFAULT_SSID_PATTERNS.iter().any(|p| ssid.contains(&p.to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const NETSH_OUTPUT: &str = "\r\nInterface name : Wi-Fi \r\nThere are 3 networks currently visible. \r\n\r\n\
SSID 1 : HomeNet\r\n    Network type            : Infrastructure\r\n    Authentication          : WPA3-Personal\r\n    Encryption              : CCMP \r\n    BSSID 1                 : aa:bb:cc:dd:ee:01\r\n\r\n\
SSID 2 : TP-Link_5G\r\n    Network type            : Infrastructure\r\n    Authentication          : WPA2-Personal\r\n    Encryption              : CCMP \r\n    BSSID 1                 : aa:bb:cc:dd:ee:02\r\n\r\n\
SSID 3 : CoffeeShop\r\n    Network type            : Infrastructure\r\n    Authentication          : Open\r\n    Encryption              : None \r\n";

    #[test]
    fn parses_every_ssid_block() {
        let networks = parse_networks(NETSH_OUTPUT);
        assert_eq!(networks.len(), 3);
        assert_eq!(networks[0].ssid, "HomeNet");
        assert_eq!(networks[0].bssid, "aa:bb:cc:dd:ee:01");
        assert_eq!(networks[1].authentication, "WPA2-Personal");
        assert_eq!(networks[2].encryption, "None");
        assert_eq!(networks[2].bssid, "Unknown");
    }

    #[test]
    fn output_starting_with_ssid_is_parsed() {
        let networks = parse_networks("SSID 1 : Lab\n    Authentication : WEP\n");
        assert_eq!(networks.len(), 1);
        assert_eq!(evaluate_network(&networks[0]).severity(), Severity::Critical);
    }

    #[test]
    fn severities_follow_authentication() {
        let findings: Vec<_> = parse_networks(NETSH_OUTPUT).iter().map(evaluate_network).collect();
        assert_eq!(findings[0].severity(), Severity::Low);
        assert_eq!(findings[0].issue(), "Secure configuration");
        assert_eq!(findings[2].severity(), Severity::Critical);
        assert_eq!(findings[2].issue(), "Open WiFi network detected");
        assert!(findings[0].details().contains("BSSID aa:bb:cc:dd:ee:01"));
    }

    #[test]
    fn factory_default_ssid_appends_issue() {
        let findings: Vec<_> = parse_networks(NETSH_OUTPUT).iter().map(evaluate_network).collect();
        assert_eq!(findings[1].severity(), Severity::Medium);
        assert_eq!(
            findings[1].issue(),
            "WPA/WPA2 detected (check for legacy support); SSID resembles factory default (verify credentials changed)"
        );
    }

    #[test]
    fn factory_default_never_lowers_severity() {
        let open = WirelessNetwork {
            ssid: "netgear-guest".into(),
            bssid: "Unknown".into(),
            authentication: "Open".into(),
            encryption: "None".into(),
        };
        assert_eq!(evaluate_network(&open).severity(), Severity::Critical);

        let secure = WirelessNetwork { authentication: "WPA3-Personal".into(), ..open };
        assert_eq!(evaluate_network(&secure).severity(), Severity::Medium);
    }

    #[tokio::test]
    async fn supplied_output_skips_netsh() {
        let ctx = Context::new().with_param(SCAN_OUTPUT_PARAM, NETSH_OUTPUT);
        let findings = WifiAudit::default().scan(&ctx).await.into_items();
        assert_eq!(findings.len(), 3);
        assert_eq!(findings[1].target(), "TP-Link_5G");
    }
}
