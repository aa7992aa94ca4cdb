// src/core/scanner/mod.rs

// Concrete probe modules. Each one implements `ProbeModule` and is
// registered with the engine through `default_modules`.
pub mod config_audit;
pub mod device_inventory;
pub mod dns_audit;
pub mod encryption_check;
pub mod injection_audit;
pub mod port_audit;
pub mod redteam;
pub mod tech_fingerprint;
pub mod tls_audit;
pub mod traffic_audit;
pub mod web_audit;
pub mod wifi_audit;

use std::sync::Arc;
use std::time::Duration;

use crate::core::module::ProbeModule;
use self::config_audit::ConfigAudit;
use self::device_inventory::DeviceInventory;
use self::dns_audit::DnsAudit;
use self::encryption_check::EncryptionCheck;
use self::injection_audit::InjectionAudit;
use self::port_audit::PortAudit;
use self::redteam::RedTeam;
use self::tech_fingerprint::TechFingerprint;
use self::tls_audit::TlsAudit;
use self::traffic_audit::TrafficAudit;
use self::web_audit::WebAudit;
use self::wifi_audit::WifiAudit;

const USER_AGENT: &str = "VanguardRS/0.1";

/// Builds the HTTP client shared by the web-facing modules.
///
/// # Arguments
/// * `timeout` - Total per-request timeout, connect included.
///
/// # Returns
/// A `reqwest::Client` sending the crate's user agent, or the builder error if
/// the TLS backend could not be initialised.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder().user_agent(USER_AGENT).timeout(timeout).build()
}

/// The full module list, in registration order.
///
/// Order matters: it is the order findings are merged in, and the order
/// analyzers run in.
///
/// # Arguments
/// * `timeout` - Network timeout handed to every module that talks to a remote host.
///
/// # Returns
/// Twelve modules, ready to be registered with the engine.
pub fn default_modules(timeout: Duration) -> Vec<Arc<dyn ProbeModule>> {
    vec![
        Arc::new(WebAudit::new(timeout)),
        Arc::new(RedTeam),
        Arc::new(InjectionAudit),
        Arc::new(WifiAudit::new(timeout)),
        Arc::new(ConfigAudit),
        Arc::new(EncryptionCheck),
        Arc::new(DeviceInventory),
        Arc::new(TechFingerprint::new(timeout)),
        Arc::new(TlsAudit::new(timeout)),
        Arc::new(DnsAudit::new(timeout)),
        Arc::new(PortAudit),
        Arc::new(TrafficAudit),
    ]
}
