// src/core/report.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::matcher::aggregate_score;
use crate::core::models::{AssetIdentity, Fingerprint, VulnerabilityRecord};

pub const RECOMMENDATION: &str =
    "Patch firmware, enforce LE Secure Connections, disable legacy pairing, restrict discoverability.";

/// Final record for one assessed asset. Built once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentReport {
    pub timestamp: DateTime<Utc>,
    pub device: AssetIdentity,
    pub services_detected: Vec<String>,
    pub matched_cves_count: usize,
    pub vulnerabilities: Vec<VulnerabilityRecord>,
    pub aggregate_risk_score: f64,
    pub recommendation: String,
}

impl AssessmentReport {
    /// # Panics
    ///
    /// If `device` has neither a name nor an address. That is a caller bug,
    /// not a runtime condition.
    pub fn new(device: AssetIdentity, fingerprint: &Fingerprint, matched: Vec<VulnerabilityRecord>) -> Self {
        assert!(!device.is_empty(), "assessment report requires an asset identity");
        Self {
            timestamp: Utc::now(),
            services_detected: fingerprint.services.iter().cloned().collect(),
            matched_cves_count: matched.len(),
            aggregate_risk_score: aggregate_score(&matched),
            vulnerabilities: matched,
            recommendation: RECOMMENDATION.to_string(),
            device,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, cvss: Option<f64>) -> VulnerabilityRecord {
        VulnerabilityRecord {
            id: id.to_string(),
            description: "bluetooth".to_string(),
            published: None,
            last_modified: None,
            cvss,
        }
    }

    #[test]
    fn report_combines_identity_services_and_score() {
        let device = AssetIdentity::device("Headset", "AA:BB:CC:DD:EE:FF", Some(-60));
        let fingerprint = Fingerprint::new(["0000180f-0000", "0000180a-0000"], ["00002a19"]);
        let before = Utc::now();
        let report = AssessmentReport::new(
            device.clone(),
            &fingerprint,
            vec![record("CVE-1", Some(7.5)), record("CVE-2", None), record("CVE-3", Some(2.25))],
        );

        assert_eq!(report.device, device);
        assert_eq!(report.services_detected, ["0000180a-0000", "0000180f-0000"]);
        assert_eq!(report.matched_cves_count, 3);
        assert_eq!(report.aggregate_risk_score, 9.75);
        assert_eq!(report.recommendation, RECOMMENDATION);
        assert!(report.timestamp >= before);
    }

    #[test]
    fn report_serializes_expected_field_names() {
        let report = AssessmentReport::new(AssetIdentity::url("https://site.test"), &Fingerprint::default(), Vec::new());
        let json = serde_json::to_value(&report).unwrap();
        for field in [
            "timestamp",
            "device",
            "services_detected",
            "matched_cves_count",
            "vulnerabilities",
            "aggregate_risk_score",
            "recommendation",
        ] {
            assert!(json.get(field).is_some(), "missing field {field}");
        }
        assert_eq!(json["aggregate_risk_score"], 0.0);
    }

    #[test]
    #[should_panic(expected = "asset identity")]
    fn empty_identity_is_a_programming_error() {
        AssessmentReport::new(AssetIdentity::device("", "", None), &Fingerprint::default(), Vec::new());
    }
}
