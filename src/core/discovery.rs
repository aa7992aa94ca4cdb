// src/core/discovery.rs

//! Discovery-and-fingerprint flow: one assessment report per discovered asset.
//!
//! Assets are independent, so each one is fingerprinted and matched on its
//! own task behind a semaphore. Reports come back in discovery order.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::{JoinSet, spawn_blocking};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::core::corpus::VulnerabilityCorpus;
use crate::core::error::{CorpusError, DiscoveryError};
use crate::core::matcher::FingerprintMatcher;
use crate::core::models::{AssetIdentity, Fingerprint};
use crate::core::report::AssessmentReport;

/// An asset found by enumeration, before fingerprinting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredAsset {
    pub name: Option<String>,
    pub address: String,
    pub rssi: Option<i16>,
}

impl DiscoveredAsset {
    pub fn identity(&self) -> AssetIdentity {
        let name = self.name.clone().filter(|n| !n.trim().is_empty()).unwrap_or_else(|| "Unknown".to_string());
        AssetIdentity::device(name, self.address.clone(), self.rssi)
    }
}

/// Enumeration backend (e.g. a BLE scanner).
#[async_trait]
pub trait AssetSource: Send + Sync {
    async fn discover(&self) -> Result<Vec<DiscoveredAsset>, DiscoveryError>;

    /// Enumerates an asset's services. `index` is the asset's position in the
    /// last `discover` result, so two assets sharing an address stay distinct.
    /// An `Err` carries the reason the asset could not be enumerated; the flow
    /// then continues with an empty fingerprint.
    async fn fingerprint(&self, index: usize, asset: &DiscoveredAsset) -> Result<Fingerprint, String>;
}

/// One entry of a JSON asset inventory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryAsset {
    #[serde(default)]
    pub name: Option<String>,
    pub address: String,
    #[serde(default)]
    pub rssi: Option<i16>,
    #[serde(default)]
    pub services: Vec<String>,
    #[serde(default)]
    pub characteristics: Vec<String>,
}

/// Asset source backed by a previously captured inventory.
#[derive(Debug, Clone, Default)]
pub struct InventorySource {
    assets: Vec<DiscoveredAsset>,
    /// Parallel to `assets`.
    fingerprints: Vec<Fingerprint>,
}

impl InventorySource {
    pub fn new(entries: Vec<InventoryAsset>) -> Self {
        let mut source = Self::default();
        for entry in entries {
            source.fingerprints.push(Fingerprint::new(entry.services, entry.characteristics));
            source.assets.push(DiscoveredAsset { name: entry.name, address: entry.address, rssi: entry.rssi });
        }
        source
    }

    pub fn from_json(raw: &str) -> Result<Self, DiscoveryError> {
        Ok(Self::new(serde_json::from_str(raw)?))
    }

    pub fn from_path(path: &Path) -> Result<Self, DiscoveryError> {
        let raw = std::fs::read_to_string(path)?;
        let source = Self::from_json(&raw)?;
        info!(path = %path.display(), assets = source.assets.len(), "Loaded asset inventory.");
        Ok(source)
    }
}

#[async_trait]
impl AssetSource for InventorySource {
    async fn discover(&self) -> Result<Vec<DiscoveredAsset>, DiscoveryError> {
        Ok(self.assets.clone())
    }

    async fn fingerprint(&self, index: usize, asset: &DiscoveredAsset) -> Result<Fingerprint, String> {
        match (self.assets.get(index), self.fingerprints.get(index)) {
            (Some(known), Some(fingerprint)) if known.address == asset.address => Ok(fingerprint.clone()),
            _ => Err(format!("device {} disappeared", asset.address)),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AssessOptions {
    pub max_concurrent: usize,
    pub fingerprint_timeout: Duration,
}

impl Default for AssessOptions {
    fn default() -> Self {
        Self { max_concurrent: 4, fingerprint_timeout: Duration::from_secs(10) }
    }
}

/// Discovers assets, fingerprints and matches each one, and builds a report per asset.
///
/// A corpus failure aborts the whole flow; a fingerprinting failure only
/// empties that asset's fingerprint. Cancellation drops every in-flight asset.
pub async fn assess_assets(
    source: Arc<dyn AssetSource>,
    corpus: Arc<dyn VulnerabilityCorpus>,
    matcher: FingerprintMatcher,
    options: AssessOptions,
    cancel: &CancellationToken,
) -> Result<Vec<AssessmentReport>, DiscoveryError> {
    let assets = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(DiscoveryError::Cancelled),
        assets = source.discover() => assets?,
    };
    info!(assets = assets.len(), max_concurrent = options.max_concurrent, "Starting asset assessment.");

    let semaphore = Arc::new(Semaphore::new(options.max_concurrent.max(1)));
    let mut workers = JoinSet::new();
    let total = assets.len();
    for (index, asset) in assets.into_iter().enumerate() {
        let source = Arc::clone(&source);
        let corpus = Arc::clone(&corpus);
        let matcher = matcher.clone();
        let semaphore = Arc::clone(&semaphore);
        workers.spawn(async move {
            let _permit = semaphore.acquire_owned().await.map_err(|_| DiscoveryError::Cancelled)?;
            let report = assess_one(source, corpus, matcher, index, asset, options.fingerprint_timeout).await?;
            Ok::<_, DiscoveryError>((index, report))
        });
    }

    let mut slots: Vec<Option<AssessmentReport>> = vec![None; total];
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!("Asset assessment cancelled, discarding partial reports.");
                workers.abort_all();
                return Err(DiscoveryError::Cancelled);
            }
            joined = workers.join_next() => match joined {
                None => break,
                Some(Ok(Ok((index, report)))) => slots[index] = Some(report),
                Some(Ok(Err(e))) => {
                    error!(error = %e, "Asset assessment aborted.");
                    return Err(e);
                }
                Some(Err(e)) => error!(error = %e, "Asset worker panicked; asset skipped."),
            },
        }
    }

    let reports: Vec<_> = slots.into_iter().flatten().collect();
    info!(reports = reports.len(), "Asset assessment finished.");
    Ok(reports)
}

async fn assess_one(
    source: Arc<dyn AssetSource>,
    corpus: Arc<dyn VulnerabilityCorpus>,
    matcher: FingerprintMatcher,
    index: usize,
    asset: DiscoveredAsset,
    timeout: Duration,
) -> Result<AssessmentReport, DiscoveryError> {
    debug!(address = %asset.address, "Fingerprinting asset.");
    let fingerprint = match tokio::time::timeout(timeout, source.fingerprint(index, &asset)).await {
        Ok(Ok(fingerprint)) => fingerprint,
        Ok(Err(reason)) => {
            warn!(address = %asset.address, reason = %reason, "Enumeration failed; using empty fingerprint.");
            Fingerprint::default()
        }
        Err(_) => {
            warn!(address = %asset.address, ?timeout, "Enumeration timed out; using empty fingerprint.");
            Fingerprint::default()
        }
    };

    let query_fingerprint = fingerprint.clone();
    let matched = spawn_blocking(move || matcher.match_fingerprint(&query_fingerprint, corpus.as_ref()))
        .await
        .map_err(|e| CorpusError::Unavailable(format!("corpus query task failed: {e}")))??;

    Ok(AssessmentReport::new(asset.identity(), &fingerprint, matched))
}
