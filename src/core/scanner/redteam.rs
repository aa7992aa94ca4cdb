// src/core/scanner/redteam.rs

use async_trait::async_trait;
use tracing::info;

use crate::core::models::{Context, Finding, Severity};
use crate::core::module::{Capabilities, ProbeModule, ProbeOutcome};

const NAME: &str = "RedTeam";

/// Marks that a simulated adversary pass ran against the url.
#[derive(Debug, Default)]
pub struct RedTeam;

#[async_trait]
impl ProbeModule for RedTeam {
    fn name(&self) -> &str {
        NAME
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::SCAN
    }

    async fn scan(&self, ctx: &Context) -> ProbeOutcome<Finding> {
        let Some(url) = ctx.url() else {
            return ProbeOutcome::Empty;
        };
        info!(url, "Red team simulation executed.");
        ProbeOutcome::Success(vec![Finding::new(
            NAME,
            url,
            Severity::Info,
            "Red Team Simulation Executed",
            format!("Simulated analysis against {url}"),
        )])
    }
}
