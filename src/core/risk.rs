// src/core/risk.rs

use tracing::debug;

use crate::core::models::{Finding, RiskBand, RiskVerdict, Severity};

/// Reduces findings to a severity-weighted score and a qualitative band.
///
/// Weights: INFO 0, LOW 1, MEDIUM 3, HIGH 6, CRITICAL 10. Duplicates count
/// individually. Bands are half-open: `<5` secure, `[5,15)` moderate,
/// `[15,30)` high, `>=30` critical.
#[derive(Debug, Clone, Copy, Default)]
pub struct RiskScorer;

impl RiskScorer {
    pub fn new() -> Self {
        Self
    }

    pub fn weight(severity: Severity) -> u32 {
        match severity {
            Severity::Info => 0,
            Severity::Low => 1,
            Severity::Medium => 3,
            Severity::High => 6,
            Severity::Critical => 10,
        }
    }

    pub fn band(total_score: u32) -> RiskBand {
        match total_score {
            0..5 => RiskBand::Secure,
            5..15 => RiskBand::ModerateRisk,
            15..30 => RiskBand::HighRisk,
            _ => RiskBand::CriticalRisk,
        }
    }

    pub fn calculate(&self, findings: &[Finding]) -> RiskVerdict {
        let total_score = findings
            .iter()
            .map(|f| Self::weight(f.severity()))
            .fold(0u32, u32::saturating_add);
        let band = Self::band(total_score);
        debug!(findings = findings.len(), total_score, %band, "Risk score calculated.");
        RiskVerdict { total_score, band }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn findings(severities: &[Severity]) -> Vec<Finding> {
        severities
            .iter()
            .map(|&s| Finding::new("Test", "host", s, "issue", ""))
            .collect()
    }

    #[test]
    fn band_boundaries() {
        assert_eq!(RiskScorer::band(0), RiskBand::Secure);
        assert_eq!(RiskScorer::band(4), RiskBand::Secure);
        assert_eq!(RiskScorer::band(5), RiskBand::ModerateRisk);
        assert_eq!(RiskScorer::band(14), RiskBand::ModerateRisk);
        assert_eq!(RiskScorer::band(15), RiskBand::HighRisk);
        assert_eq!(RiskScorer::band(29), RiskBand::HighRisk);
        assert_eq!(RiskScorer::band(30), RiskBand::CriticalRisk);
        assert_eq!(RiskScorer::band(u32::MAX), RiskBand::CriticalRisk);
    }

    #[test]
    fn band_is_monotonic() {
        let mut previous = RiskScorer::band(0);
        for score in 1..100 {
            let band = RiskScorer::band(score);
            assert!(band >= previous, "band regressed at {score}");
            previous = band;
        }
    }

    #[test]
    fn score_sums_weights() {
        let verdict = RiskScorer::new().calculate(&findings(&[
            Severity::Info,
            Severity::Low,
            Severity::Medium,
            Severity::High,
            Severity::Critical,
        ]));
        assert_eq!(verdict.total_score, 20);
        assert_eq!(verdict.band, RiskBand::HighRisk);
    }

    #[test]
    fn duplicates_are_not_collapsed() {
        let verdict = RiskScorer::new().calculate(&findings(&[Severity::High, Severity::High]));
        assert_eq!(verdict.total_score, 12);
        assert_eq!(verdict.band, RiskBand::ModerateRisk);
    }

    #[test]
    fn order_does_not_matter() {
        let scorer = RiskScorer::new();
        let mut list = findings(&[Severity::Critical, Severity::Low, Severity::Medium, Severity::High]);
        let forward = scorer.calculate(&list);
        list.reverse();
        assert_eq!(scorer.calculate(&list), forward);
    }

    #[test]
    fn single_high_finding_is_moderate() {
        let verdict = RiskScorer::new().calculate(&[Finding::new(
            "WebAudit",
            "https://site.test",
            Severity::parse_lenient("HIGH"),
            "Missing security header: X",
            "",
        )]);
        assert_eq!(verdict.total_score, 6);
        assert_eq!(verdict.band, RiskBand::ModerateRisk);
    }

    #[test]
    fn empty_findings_are_secure() {
        let verdict = RiskScorer::new().calculate(&[]);
        assert_eq!(verdict, RiskVerdict { total_score: 0, band: RiskBand::Secure });
    }
}
