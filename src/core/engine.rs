// src/core/engine.rs

//! Three-phase orchestration: collect, then scan, then analyze.
//!
//! Within a phase every eligible module is spawned as its own task so that a
//! slow or panicking probe stays isolated, but results are always merged in
//! the caller-supplied module order. Completion order never leaks into the
//! output.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tokio_util::task::AbortOnDropHandle;
use tracing::{debug, error, info, warn};

use crate::core::error::EngineError;
use crate::core::models::{Context, Finding, RiskVerdict};
use crate::core::module::{AnalysisInput, Capabilities, ProbeModule, ProbeOutcome};
use crate::core::risk::RiskScorer;
use crate::core::store::{FactStore, FindingStore};

/// Per-run engine limits.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// Upper bound on any single collect/scan/analyze call.
    pub probe_timeout: Duration,
    /// Optional bound on the whole run.
    pub run_deadline: Option<Duration>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { probe_timeout: Duration::from_secs(10), run_deadline: None }
    }
}

/// Everything one run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub verdict: RiskVerdict,
    pub findings: Vec<Finding>,
    pub facts: FactStore,
}

struct RegisteredModule {
    module: Arc<dyn ProbeModule>,
    capabilities: Capabilities,
}

pub struct OrchestrationEngine {
    modules: Vec<RegisteredModule>,
    scorer: RiskScorer,
    config: EngineConfig,
}

impl OrchestrationEngine {
    /// Registers `modules` in order. Capabilities are read here, once.
    pub fn new(modules: Vec<Arc<dyn ProbeModule>>, config: EngineConfig) -> Self {
        let modules = modules
            .into_iter()
            .map(|module| {
                let capabilities = module.capabilities();
                debug!(module = module.name(), ?capabilities, "Registered probe module.");
                RegisteredModule { module, capabilities }
            })
            .collect();
        Self { modules, scorer: RiskScorer::new(), config }
    }

    pub fn module_names(&self) -> Vec<&str> {
        self.modules.iter().map(|m| m.module.name()).collect()
    }

    /// Runs all three phases against `ctx`.
    ///
    /// Cancelling `cancel`, or hitting the configured run deadline, aborts
    /// every in-flight probe and discards partial results.
    pub async fn run(&self, ctx: Context, cancel: &CancellationToken) -> Result<RunOutcome, EngineError> {
        let ctx = Arc::new(ctx);
        let guarded = async {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    warn!("Assessment run cancelled, discarding partial results.");
                    Err(EngineError::Cancelled)
                }
                outcome = self.run_phases(ctx) => Ok(outcome),
            }
        };

        match self.config.run_deadline {
            Some(deadline) => tokio::time::timeout(deadline, guarded).await.unwrap_or_else(|_| {
                warn!(?deadline, "Assessment run exceeded its deadline.");
                Err(EngineError::DeadlineExceeded(deadline))
            }),
            None => guarded.await,
        }
    }

    async fn run_phases(&self, ctx: Arc<Context>) -> RunOutcome {
        info!(url = ?ctx.url(), modules = self.modules.len(), "Starting assessment run.");
        let mut facts = FactStore::new();
        let mut store = FindingStore::new();

        // Collect
        let jobs = self
            .with_capability(|c| c.collect)
            .map(|module| {
                let ctx = Arc::clone(&ctx);
                (module.name().to_string(), async move { module.collect(&ctx).await })
            })
            .collect();
        for (name, collected) in self.dispatch("collect", jobs).await {
            if let Some(collected) = collected.filter(|items| !items.is_empty()) {
                facts.append(&name, collected);
                store.ensure_key(&name);
            }
        }

        // Scan
        let jobs = self
            .with_capability(|c| c.scan)
            .map(|module| {
                let ctx = Arc::clone(&ctx);
                (module.name().to_string(), async move { module.scan(&ctx).await })
            })
            .collect();
        for (name, scanned) in self.dispatch("scan", jobs).await {
            if let Some(scanned) = scanned {
                store.append(&name, accept_findings(&name, scanned));
            }
        }

        // Analyze: every analyzer sees every key, in key order.
        for analyzer in self.with_capability(|c| c.analyze) {
            let analyzer_name = analyzer.name().to_string();
            let jobs = store
                .keys()
                .into_iter()
                .map(|key| {
                    let input = AnalysisInput {
                        producer: key.clone(),
                        findings: store.snapshot(&key),
                        facts: facts.snapshot(&key),
                    };
                    let module = Arc::clone(&analyzer);
                    let ctx = Arc::clone(&ctx);
                    (key, async move { module.analyze(&input, &ctx).await })
                })
                .collect();
            for (key, analyzed) in self.dispatch("analyze", jobs).await {
                if let Some(analyzed) = analyzed {
                    store.append(&key, accept_findings(&analyzer_name, analyzed));
                }
            }
        }

        let findings = store.flatten();
        let verdict = self.scorer.calculate(&findings);
        info!(
            findings = findings.len(),
            total_score = verdict.total_score,
            band = %verdict.band,
            "Assessment run finished."
        );
        RunOutcome { verdict, findings, facts }
    }

    fn with_capability<'a>(
        &'a self,
        wanted: impl Fn(&Capabilities) -> bool + 'a,
    ) -> impl Iterator<Item = Arc<dyn ProbeModule>> + 'a {
        self.modules
            .iter()
            .filter(move |m| wanted(&m.capabilities))
            .map(|m| Arc::clone(&m.module))
    }

    /// Spawns every job, then gathers results in job order.
    ///
    /// `None` marks a job that failed, timed out or panicked.
    async fn dispatch<T, Fut>(&self, phase: &'static str, jobs: Vec<(String, Fut)>) -> Vec<(String, Option<Vec<T>>)>
    where
        T: Send + 'static,
        Fut: Future<Output = ProbeOutcome<T>> + Send + 'static,
    {
        debug!(phase, jobs = jobs.len(), "Dispatching phase.");
        let timeout = self.config.probe_timeout;
        let handles: Vec<_> = jobs
            .into_iter()
            .map(|(key, job)| (key, AbortOnDropHandle::new(tokio::spawn(tokio::time::timeout(timeout, job)))))
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for (key, handle) in handles {
            let items = match handle.await {
                Ok(Ok(ProbeOutcome::Success(items))) => Some(items),
                Ok(Ok(ProbeOutcome::Empty)) => Some(Vec::new()),
                Ok(Ok(ProbeOutcome::Failed(reason))) => {
                    warn!(phase, key = %key, reason = %reason, "Probe failed; it contributes nothing.");
                    None
                }
                Ok(Err(_)) => {
                    warn!(phase, key = %key, ?timeout, "Probe timed out; it contributes nothing.");
                    None
                }
                Err(e) => {
                    error!(phase, key = %key, error = %e, "Probe task aborted or panicked.");
                    None
                }
            };
            results.push((key, items));
        }
        results
    }
}

/// Drops records that break the finding contract. Loud in debug builds.
fn accept_findings(module: &str, findings: Vec<Finding>) -> Vec<Finding> {
    findings
        .into_iter()
        .filter(|finding| {
            let valid = !finding.issue().trim().is_empty();
            if !valid {
                error!(module, target = finding.target(), "Module returned a finding without an issue; skipping it.");
                debug_assert!(valid, "module {module} returned a finding without an issue");
            }
            valid
        })
        .collect()
}
