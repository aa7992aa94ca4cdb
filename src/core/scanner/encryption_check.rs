// src/core/scanner/encryption_check.rs

use async_trait::async_trait;

use crate::core::models::{Context, Finding, Severity};
use crate::core::module::{AnalysisInput, Capabilities, ProbeModule, ProbeOutcome};
use crate::core::scanner::device_inventory::DEVICE_FACT;

const NAME: &str = "EncryptionCheck";

const WEAK_ENCRYPTION: &[&str] = &["WEP", "WPA"];

/// Flags devices configured with legacy wireless encryption.
#[derive(Debug, Default)]
pub struct EncryptionCheck;

#[async_trait]
impl ProbeModule for EncryptionCheck {
    fn name(&self) -> &str {
        NAME
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::ANALYZE
    }

    async fn analyze(&self, input: &AnalysisInput, _ctx: &Context) -> ProbeOutcome<Finding> {
        input
            .facts
            .iter()
            .filter(|fact| fact.kind() == DEVICE_FACT)
            .filter_map(|device| {
                let encryption = device.str_attribute("encryption")?;
                WEAK_ENCRYPTION.contains(&encryption).then(|| {
                    Finding::new(
                        NAME,
                        device.subject(),
                        Severity::High,
                        "Weak WiFi encryption detected",
                        format!("Encryption: {encryption}"),
                    )
                })
            })
            .collect::<Vec<_>>()
            .into()
    }
}
