// src/core/scanner/device_inventory.rs

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::core::models::{Context, Fact};
use crate::core::module::{Capabilities, ProbeModule, ProbeOutcome};

const NAME: &str = "DeviceInventory";

/// Context param holding the device list.
pub const DEVICES_PARAM: &str = "devices";

/// Fact kind consumed by the device analyzers.
pub const DEVICE_FACT: &str = "device";

const UNKNOWN_DEVICE: &str = "Unknown Device";

/// Publishes the caller's device list as `device` facts so the
/// configuration analyzers have something to look at.
#[derive(Debug, Default)]
pub struct DeviceInventory;

#[async_trait]
impl ProbeModule for DeviceInventory {
    fn name(&self) -> &str {
        NAME
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::COLLECT
    }

    async fn collect(&self, ctx: &Context) -> ProbeOutcome<Fact> {
        let Some(devices) = ctx.param(DEVICES_PARAM) else {
            return ProbeOutcome::Empty;
        };
        let Some(entries) = devices.as_array() else {
            return ProbeOutcome::Failed(format!("'{DEVICES_PARAM}' must be an array"));
        };

        let facts: Vec<Fact> = entries.iter().filter_map(device_fact).collect();
        debug!(devices = facts.len(), "Device facts collected.");
        ProbeOutcome::from_items(facts)
    }
}

fn device_fact(entry: &Value) -> Option<Fact> {
    let Some(device) = entry.as_object() else {
        warn!(entry = %entry, "Skipping device entry that is not an object.");
        return None;
    };
    let name = device.get("name").and_then(Value::as_str).unwrap_or(UNKNOWN_DEVICE);
    let mut fact = Fact::new(DEVICE_FACT, name);
    for (key, value) in device.iter().filter(|(key, _)| key.as_str() != "name") {
        fact = fact.with(key, value.clone());
    }
    Some(fact)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn devices_become_facts() {
        let ctx = Context::new().with_param(
            DEVICES_PARAM,
            json!([
                {"name": "router", "default_password": true, "encryption": "WEP"},
                {"default_password": false},
                "not-a-device"
            ]),
        );
        let facts = DeviceInventory.collect(&ctx).await.into_items();
        assert_eq!(facts.len(), 2);
        assert_eq!(facts[0].subject(), "router");
        assert!(facts[0].bool_attribute("default_password"));
        assert_eq!(facts[0].str_attribute("encryption"), Some("WEP"));
        assert_eq!(facts[1].subject(), UNKNOWN_DEVICE);
        assert!(facts.iter().all(|f| f.kind() == DEVICE_FACT));
    }

    #[tokio::test]
    async fn missing_or_malformed_param() {
        assert_eq!(DeviceInventory.collect(&Context::new()).await, ProbeOutcome::Empty);
        let ctx = Context::new().with_param(DEVICES_PARAM, "router");
        assert!(DeviceInventory.collect(&ctx).await.is_failure());
    }
}
