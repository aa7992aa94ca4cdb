// src/core/matcher.rs

//! Correlates an asset fingerprint with the vulnerability corpus.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::corpus::VulnerabilityCorpus;
use crate::core::error::CorpusError;
use crate::core::models::{Fingerprint, VulnerabilityRecord};

/// Number of leading characters of a service identifier compared against descriptions.
pub const SERVICE_PREFIX_LEN: usize = 8;

pub const DEFAULT_DOMAIN_KEYWORD: &str = "bluetooth";

/// What to do with a domain-relevant record whose description does not
/// mention any fingerprint service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPolicy {
    /// Keep it anyway. Every record passing the keyword filter is returned,
    /// so the fingerprint never narrows the result.
    #[default]
    IncludeDomainRelevant,
    /// Keep only records where a service prefix appears in the description.
    RequirePrefixMatch,
}

#[derive(Debug, Clone)]
pub struct FingerprintMatcher {
    keyword: String,
    policy: MatchPolicy,
}

impl Default for FingerprintMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_DOMAIN_KEYWORD, MatchPolicy::default())
    }
}

impl FingerprintMatcher {
    pub fn new(keyword: impl Into<String>, policy: MatchPolicy) -> Self {
        Self { keyword: keyword.into(), policy }
    }

    pub fn policy(&self) -> MatchPolicy {
        self.policy
    }

    /// Returns the corpus records relevant to `fingerprint`, in corpus order.
    ///
    /// Corpus failures are returned to the caller, never mapped to "no matches".
    pub fn match_fingerprint(
        &self,
        fingerprint: &Fingerprint,
        corpus: &dyn VulnerabilityCorpus,
    ) -> Result<Vec<VulnerabilityRecord>, CorpusError> {
        let candidates = corpus.records_matching(&self.keyword)?;
        let prefixes: Vec<String> = fingerprint.services.iter().map(|s| service_prefix(s)).collect();

        let mut matched = Vec::with_capacity(candidates.len());
        let mut prefix_hits = 0usize;
        for record in candidates {
            let description = record.description.to_lowercase();
            let hit = prefixes.iter().any(|p| description.contains(p.as_str()));
            if hit {
                prefix_hits += 1;
                matched.push(record);
            } else if self.policy == MatchPolicy::IncludeDomainRelevant {
                debug!(cve = %record.id, "No service prefix in description; included as domain-relevant.");
                matched.push(record);
            }
        }

        info!(
            keyword = %self.keyword,
            services = fingerprint.services.len(),
            prefix_hits,
            matched = matched.len(),
            policy = ?self.policy,
            "Fingerprint matched against corpus."
        );
        Ok(matched)
    }
}

/// Lower-cased first [`SERVICE_PREFIX_LEN`] characters of a service id.
fn service_prefix(service: &str) -> String {
    service.chars().take(SERVICE_PREFIX_LEN).collect::<String>().to_lowercase()
}

/// Sum of CVSS scores (absent scores count as zero), rounded to two decimals.
pub fn aggregate_score(matched: &[VulnerabilityRecord]) -> f64 {
    let total: f64 = matched.iter().map(|r| r.cvss.unwrap_or(0.0).max(0.0)).sum();
    (total * 100.0).round() / 100.0
}
