// src/config.rs

//! Run configuration: a JSON file plus a handful of environment overrides.
//!
//! The file path comes from `<CRATE>_CONFIG`, falling back to `config.json`
//! in the data directory. A missing file is not an error; every field has a
//! default.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::core::discovery::AssessOptions;
use crate::core::engine::EngineConfig;
use crate::core::error::ConfigError;
use crate::core::matcher::{DEFAULT_DOMAIN_KEYWORD, FingerprintMatcher, MatchPolicy};
use crate::core::models::Context;
use crate::core::scanner::port_audit::PORTS_PARAM;
use crate::logging::{PROJECT_NAME, get_data_dir};

const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub urls: Vec<String>,
    pub targets: Vec<String>,
    pub ports: Vec<u16>,
    pub probe_timeout_secs: u64,
    pub run_deadline_secs: Option<u64>,
    pub max_concurrent_assets: usize,
    pub corpus_path: Option<PathBuf>,
    pub inventory_path: Option<PathBuf>,
    pub domain_keyword: String,
    pub match_policy: MatchPolicy,
    pub output: PathBuf,
    /// Free-form scan parameters copied verbatim into every run's context.
    pub params: BTreeMap<String, Value>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            urls: Vec::new(),
            targets: Vec::new(),
            ports: Vec::new(),
            probe_timeout_secs: 5,
            run_deadline_secs: None,
            max_concurrent_assets: 4,
            corpus_path: None,
            inventory_path: None,
            domain_keyword: DEFAULT_DOMAIN_KEYWORD.to_string(),
            match_policy: MatchPolicy::default(),
            output: PathBuf::from("report.json"),
            params: BTreeMap::new(),
        }
    }
}

impl AppConfig {
    /// Loads the config file (if any) and applies environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var(env_key("CONFIG"))
            .map(PathBuf::from)
            .unwrap_or_else(|_| get_data_dir().join(CONFIG_FILE));
        let mut config = Self::from_path(&path)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            info!(path = %path.display(), "No config file, using defaults.");
            return Ok(Self::default());
        }
        debug!(path = %path.display(), "Reading config file.");
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// `lookup` receives full variable names such as `VANGUARD_ASSESS_TIMEOUT`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(urls) = lookup(&env_key("URLS")) {
            self.urls = urls.split(',').map(str::trim).filter(|u| !u.is_empty()).map(String::from).collect();
        }
        if let Some(raw) = lookup(&env_key("TIMEOUT")) {
            self.probe_timeout_secs = parse_number(&env_key("TIMEOUT"), &raw)?;
        }
        if let Some(output) = lookup(&env_key("OUTPUT")) {
            self.output = PathBuf::from(output);
        }
        if let Some(corpus) = lookup(&env_key("CORPUS")) {
            self.corpus_path = Some(PathBuf::from(corpus));
        }
        if let Some(inventory) = lookup(&env_key("INVENTORY")) {
            self.inventory_path = Some(PathBuf::from(inventory));
        }
        Ok(())
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    /// Engine per-call bound is twice the probes' own network timeout.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            probe_timeout: self.probe_timeout() * 2,
            run_deadline: self.run_deadline_secs.map(Duration::from_secs),
        }
    }

    pub fn matcher(&self) -> FingerprintMatcher {
        FingerprintMatcher::new(self.domain_keyword.clone(), self.match_policy)
    }

    pub fn assess_options(&self) -> AssessOptions {
        AssessOptions {
            max_concurrent: self.max_concurrent_assets,
            fingerprint_timeout: self.probe_timeout() * 2,
        }
    }

    /// Context for one run. `url` is `None` for runs driven only by params
    /// and targets.
    pub fn context_for(&self, url: Option<&str>) -> Context {
        let mut ctx = Context::new().with_targets(self.targets.iter().cloned());
        if let Some(url) = url {
            ctx = ctx.with_url(url);
        }
        if !self.ports.is_empty() {
            ctx = ctx.with_param(PORTS_PARAM, self.ports.clone());
        }
        for (key, value) in &self.params {
            ctx = ctx.with_param(key, value.clone());
        }
        ctx
    }
}

fn env_key(suffix: &str) -> String {
    format!("{}_{suffix}", PROJECT_NAME.as_str())
}

fn parse_number(key: &str, raw: &str) -> Result<u64, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue { key: key.to_string(), value: raw.to_string() })
}
