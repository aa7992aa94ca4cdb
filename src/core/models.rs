// src/core/models.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use strum::{Display, EnumString};
use url::Url;

// --- Severity ---

/// Closed severity scale shared by every probe module.
///
/// Ordering follows the scale, so `max` picks the stricter of two severities.
/// Unknown or missing severities never fail: they collapse to `Info`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Display, EnumString,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum Severity {
    #[default]
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Parses a severity label, treating anything unrecognised as `Info`.
    pub fn parse_lenient(raw: &str) -> Self {
        raw.trim().parse().unwrap_or_default()
    }
}

impl<'de> Deserialize<'de> for Severity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // Numbers, booleans and other non-labels are unknown severities, not errors.
        Ok(match Value::deserialize(deserializer)? {
            Value::String(label) => Severity::parse_lenient(&label),
            _ => Severity::Info,
        })
    }
}

// --- Finding ---

/// One reported observation. Fields are private so a finding can only be
/// copied, never edited, once a module has produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    source_module: String,
    target: String,
    #[serde(default)]
    severity: Severity,
    issue: String,
    #[serde(default)]
    details: String,
}

impl Finding {
    pub fn new(
        source_module: impl Into<String>,
        target: impl Into<String>,
        severity: Severity,
        issue: impl Into<String>,
        details: impl Into<String>,
    ) -> Self {
        Self {
            source_module: source_module.into(),
            target: target.into(),
            severity,
            issue: issue.into(),
            details: details.into(),
        }
    }

    pub fn source_module(&self) -> &str {
        &self.source_module
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn issue(&self) -> &str {
        &self.issue
    }

    pub fn details(&self) -> &str {
        &self.details
    }
}

// --- Fact ---

/// Raw data gathered during the collect phase. Facts are not findings: they
/// carry no severity and are only turned into findings by analyzers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    kind: String,
    subject: String,
    #[serde(default)]
    attributes: Map<String, Value>,
}

impl Fact {
    pub fn new(kind: impl Into<String>, subject: impl Into<String>) -> Self {
        Self { kind: kind.into(), subject: subject.into(), attributes: Map::new() }
    }

    /// Builder-style attribute setter, used while the fact is still owned by its producer.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    pub fn str_attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(Value::as_str)
    }

    pub fn bool_attribute(&self, key: &str) -> bool {
        self.attributes.get(key).and_then(Value::as_bool).unwrap_or(false)
    }

    /// Every string value carried by the fact, subject included.
    pub fn text_values(&self) -> Vec<String> {
        let mut values = vec![self.subject.clone()];
        for value in self.attributes.values() {
            collect_strings(value, &mut values);
        }
        values
    }
}

// --- Context ---

/// Read-only input shared by every module of one engine run.
///
/// There are no `&mut` accessors: a module that needs a variant for a
/// sub-call derives a new value with the `with_*` builders on a clone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Context {
    url: Option<String>,
    #[serde(default)]
    targets: Vec<String>,
    #[serde(default)]
    params: BTreeMap<String, Value>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_url(url: impl Into<String>) -> Self {
        Self { url: Some(url.into()), ..Default::default() }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_targets<I, S>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.targets = targets.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_param(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn targets(&self) -> &[String] {
        &self.targets
    }

    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }

    /// Host component of the url, if the url parses and has one.
    pub fn host(&self) -> Option<String> {
        let raw = self.url.as_deref()?;
        Url::parse(raw).ok().and_then(|u| u.host_str().map(String::from))
    }

    /// Flattened textual inputs: url, targets, then every string found in the params.
    pub fn inputs(&self) -> Vec<String> {
        let mut inputs = Vec::new();
        if let Some(url) = &self.url {
            inputs.push(url.clone());
        }
        inputs.extend(self.targets.iter().cloned());
        for value in self.params.values() {
            collect_strings(value, &mut inputs);
        }
        inputs
    }
}

fn collect_strings(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) => out.push(s.clone()),
        Value::Array(items) => items.iter().for_each(|v| collect_strings(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_strings(v, out)),
        Value::Null => {}
        other => out.push(other.to_string()),
    }
}

// --- Risk verdict ---

/// Qualitative band derived from a total score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskBand {
    Secure,
    ModerateRisk,
    HighRisk,
    CriticalRisk,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskVerdict {
    pub total_score: u32,
    pub band: RiskBand,
}

// --- Fingerprint & corpus records ---

/// Technical identifiers discovered for one asset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    #[serde(default)]
    pub services: BTreeSet<String>,
    #[serde(default)]
    pub characteristics: BTreeSet<String>,
}

impl Fingerprint {
    pub fn new<S, C>(services: S, characteristics: C) -> Self
    where
        S: IntoIterator,
        S::Item: Into<String>,
        C: IntoIterator,
        C::Item: Into<String>,
    {
        Self {
            services: services.into_iter().map(Into::into).collect(),
            characteristics: characteristics.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty() && self.characteristics.is_empty()
    }
}

/// A known vulnerability, as stored in the corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VulnerabilityRecord {
    pub id: String,
    pub description: String,
    pub published: Option<DateTime<Utc>>,
    pub last_modified: Option<DateTime<Utc>>,
    pub cvss: Option<f64>,
}

/// Who or what an assessment report is about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetIdentity {
    pub name: String,
    pub address: String,
    pub rssi: Option<i16>,
}

impl AssetIdentity {
    pub fn device(name: impl Into<String>, address: impl Into<String>, rssi: Option<i16>) -> Self {
        Self { name: name.into(), address: address.into(), rssi }
    }

    pub fn url(url: impl Into<String>) -> Self {
        let url = url.into();
        Self { name: url.clone(), address: url, rssi: None }
    }

    pub fn is_empty(&self) -> bool {
        self.name.trim().is_empty() && self.address.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn severity_parses_case_insensitively() {
        assert_eq!(Severity::parse_lenient("high"), Severity::High);
        assert_eq!(Severity::parse_lenient(" CRITICAL "), Severity::Critical);
        assert_eq!(Severity::parse_lenient("Medium"), Severity::Medium);
    }

    #[test]
    fn unknown_severity_becomes_info() {
        assert_eq!(Severity::parse_lenient("SEVERE"), Severity::Info);
        assert_eq!(Severity::parse_lenient(""), Severity::Info);
    }

    #[test]
    fn finding_without_severity_deserializes_as_info() {
        let finding: Finding = serde_json::from_value(json!({
            "source_module": "WebAudit",
            "target": "https://site.test",
            "issue": "robots.txt exposed"
        }))
        .unwrap();
        assert_eq!(finding.severity(), Severity::Info);

        let finding: Finding = serde_json::from_value(json!({
            "source_module": "WebAudit",
            "target": "https://site.test",
            "severity": "bogus",
            "issue": "x",
            "details": ""
        }))
        .unwrap();
        assert_eq!(finding.severity(), Severity::Info);
    }

    #[test]
    fn non_string_severity_deserializes_as_info() {
        for severity in [json!(3), json!(true), json!(2.5), json!({"level": "HIGH"}), json!(["HIGH"]), Value::Null] {
            let finding: Finding = serde_json::from_value(json!({
                "source_module": "WebAudit",
                "target": "https://site.test",
                "severity": severity.clone(),
                "issue": "x"
            }))
            .unwrap();
            assert_eq!(finding.severity(), Severity::Info, "severity {severity}");
        }

        let finding: Finding = serde_json::from_str(
            r#"{"source_module":"WebAudit","target":"t","severity":3,"issue":"x","details":""}"#,
        )
        .unwrap();
        assert_eq!(finding.severity(), Severity::Info);
    }

    #[test]
    fn severity_serializes_uppercase() {
        assert_eq!(serde_json::to_value(Severity::Medium).unwrap(), json!("MEDIUM"));
        assert_eq!(Severity::High.to_string(), "HIGH");
    }

    #[test]
    fn severity_order_follows_scale() {
        assert!(Severity::Info < Severity::Low);
        assert!(Severity::High < Severity::Critical);
        assert_eq!(Severity::Low.max(Severity::Medium), Severity::Medium);
    }

    #[test]
    fn band_serializes_with_underscores() {
        assert_eq!(serde_json::to_value(RiskBand::ModerateRisk).unwrap(), json!("MODERATE_RISK"));
        assert_eq!(RiskBand::CriticalRisk.to_string(), "CRITICAL_RISK");
    }

    #[test]
    fn context_builders_leave_original_untouched() {
        let base = Context::for_url("https://site.test/login");
        let derived = base.clone().with_param("user", "admin");
        assert!(base.param("user").is_none());
        assert_eq!(derived.param("user"), Some(&json!("admin")));
        assert_eq!(base.host().as_deref(), Some("site.test"));
    }

    #[test]
    fn context_inputs_flatten_nested_params() {
        let ctx = Context::for_url("https://site.test")
            .with_targets(["10.0.0.1"])
            .with_param("query", json!({"q": "drop table users", "page": 2}))
            .with_param("tags", json!(["a", "b"]));
        let inputs = ctx.inputs();
        assert_eq!(inputs[0], "https://site.test");
        assert_eq!(inputs[1], "10.0.0.1");
        assert!(inputs.contains(&"drop table users".to_string()));
        assert!(inputs.contains(&"2".to_string()));
        assert!(inputs.contains(&"b".to_string()));
    }

    #[test]
    fn fact_attributes_and_text_values() {
        let fact = Fact::new("device", "router")
            .with("default_password", true)
            .with("encryption", "WEP");
        assert!(fact.bool_attribute("default_password"));
        assert!(!fact.bool_attribute("missing"));
        assert_eq!(fact.str_attribute("encryption"), Some("WEP"));
        let values = fact.text_values();
        assert!(values.contains(&"router".to_string()));
        assert!(values.contains(&"WEP".to_string()));
    }

    #[test]
    fn asset_identity_emptiness() {
        assert!(AssetIdentity::device(" ", "", None).is_empty());
        assert!(!AssetIdentity::url("https://site.test").is_empty());
    }
}
