// src/main.rs

use chrono::{DateTime, Utc};
use color_eyre::eyre::{Result, WrapErr};
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use vanguard_assess::config::AppConfig;
use vanguard_assess::core::corpus::SqliteCorpus;
use vanguard_assess::core::discovery::{InventorySource, assess_assets};
use vanguard_assess::core::engine::{OrchestrationEngine, RunOutcome};
use vanguard_assess::core::error::EngineError;
use vanguard_assess::core::report::AssessmentReport;
use vanguard_assess::core::scanner::default_modules;
use vanguard_assess::logging;

#[derive(Serialize)]
struct UrlAssessment {
    url: Option<String>,
    #[serde(flatten)]
    outcome: RunOutcome,
}

#[derive(Serialize)]
struct AssessmentDocument {
    generated_at: DateTime<Utc>,
    url_assessments: Vec<UrlAssessment>,
    asset_reports: Vec<AssessmentReport>,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let log_path = logging::initialize_logging()?;
    let config = AppConfig::load().wrap_err("failed to load configuration")?;
    info!(log = %log_path.display(), urls = config.urls.len(), "Configuration loaded.");

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, cancelling.");
                cancel.cancel();
            }
        }
    });

    let url_assessments = run_url_assessments(&config, &cancel).await?;
    let asset_reports = run_asset_assessment(&config, &cancel).await?;

    for assessment in &url_assessments {
        println!(
            "{:<40} {:>4} {}",
            assessment.url.as_deref().unwrap_or("(context)"),
            assessment.outcome.verdict.total_score,
            assessment.outcome.verdict.band
        );
    }
    for report in &asset_reports {
        println!(
            "{:<40} {:>4} matched, aggregate {:.2}",
            report.device.name, report.matched_cves_count, report.aggregate_risk_score
        );
    }

    let document = AssessmentDocument { generated_at: Utc::now(), url_assessments, asset_reports };
    let json = serde_json::to_string_pretty(&document)?;
    std::fs::write(&config.output, json)
        .wrap_err_with(|| format!("failed to write {}", config.output.display()))?;
    println!("Report written to {}", config.output.display());
    info!(output = %config.output.display(), "Report written.");
    Ok(())
}

/// One engine run per configured url. With no urls, a single run over the
/// targets and params still happens if there is anything to look at.
async fn run_url_assessments(config: &AppConfig, cancel: &CancellationToken) -> Result<Vec<UrlAssessment>> {
    let engine = OrchestrationEngine::new(default_modules(config.probe_timeout()), config.engine_config());
    info!(modules = ?engine.module_names(), "Engine ready.");

    let mut runs: Vec<Option<String>> = config.urls.iter().cloned().map(Some).collect();
    if runs.is_empty() && (!config.targets.is_empty() || !config.params.is_empty()) {
        runs.push(None);
    }

    let mut assessments = Vec::with_capacity(runs.len());
    for url in runs {
        let ctx = config.context_for(url.as_deref());
        match engine.run(ctx, cancel).await {
            Ok(outcome) => assessments.push(UrlAssessment { url, outcome }),
            Err(EngineError::DeadlineExceeded(deadline)) => {
                error!(url = ?url, ?deadline, "Run abandoned after deadline.");
            }
            Err(e @ EngineError::Cancelled) => return Err(e.into()),
        }
    }
    Ok(assessments)
}

async fn run_asset_assessment(config: &AppConfig, cancel: &CancellationToken) -> Result<Vec<AssessmentReport>> {
    let (corpus_path, inventory_path) = match (&config.corpus_path, &config.inventory_path) {
        (Some(corpus), Some(inventory)) => (corpus, inventory),
        (None, None) => return Ok(Vec::new()),
        _ => {
            warn!("Asset assessment needs both a corpus and an inventory; skipping.");
            return Ok(Vec::new());
        }
    };

    let corpus = SqliteCorpus::open(corpus_path)
        .wrap_err_with(|| format!("failed to open corpus {}", corpus_path.display()))?;
    let source = InventorySource::from_path(inventory_path)?;
    let matcher = config.matcher();
    info!(policy = ?matcher.policy(), "Matching fingerprints against the corpus.");
    let reports = assess_assets(
        Arc::new(source),
        Arc::new(corpus),
        matcher,
        config.assess_options(),
        cancel,
    )
    .await?;
    Ok(reports)
}
