// src/core/scanner/config_audit.rs

use async_trait::async_trait;

use crate::core::models::{Context, Finding, Severity};
use crate::core::module::{AnalysisInput, Capabilities, ProbeModule, ProbeOutcome};
use crate::core::scanner::device_inventory::DEVICE_FACT;

const NAME: &str = "ConfigAudit";

/// Reports whether each known device still runs on factory credentials.
#[derive(Debug, Default)]
pub struct ConfigAudit;

#[async_trait]
impl ProbeModule for ConfigAudit {
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
            .map(|device| {
                let name = device.subject();
                if device.bool_attribute("default_password") {
                    Finding::new(
                        NAME,
                        name,
                        Severity::High,
                        "Default credentials detected",
                        format!("Device {name} is using default username/password"),
                    )
                } else {
                    Finding::new(
                        NAME,
                        name,
                        Severity::Low,
                        "Credentials changed",
                        format!("Device {name} does not use default credentials"),
                    )
                }
            })
            .collect::<Vec<_>>()
            .into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::Fact;
    use std::sync::Arc;

    fn input(facts: Vec<Fact>) -> AnalysisInput {
        AnalysisInput { producer: "DeviceInventory".into(), findings: Arc::from(Vec::new()), facts: Arc::from(facts) }
    }

    #[tokio::test]
    async fn default_password_is_high_otherwise_low() {
        let facts = vec![
            Fact::new(DEVICE_FACT, "router").with("default_password", true),
            Fact::new(DEVICE_FACT, "camera"),
            Fact::new("technology", "Nginx"),
        ];
        let findings = ConfigAudit.analyze(&input(facts), &Context::new()).await.into_items();
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].severity(), Severity::High);
        assert_eq!(findings[0].issue(), "Default credentials detected");
        assert_eq!(findings[0].details(), "Device router is using default username/password");
        assert_eq!(findings[1].severity(), Severity::Low);
        assert_eq!(findings[1].target(), "camera");
    }

    #[tokio::test]
    async fn no_devices_no_findings() {
        let outcome = ConfigAudit.analyze(&input(Vec::new()), &Context::new()).await;
        assert_eq!(outcome, ProbeOutcome::Empty);
    }
}
