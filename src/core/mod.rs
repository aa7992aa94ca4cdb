// src/core/mod.rs

/// Shared data types: severities, findings, facts, the run context and
/// the asset/vulnerability records used by reports.
pub mod models;

pub mod error;

/// The `ProbeModule` capability contract.
pub mod module;

/// Insertion-ordered, keyed accumulation of findings and facts.
pub mod store;

/// Three-phase orchestration of probe modules.
pub mod engine;

pub mod risk;

/// Known-vulnerability storage (SQLite or in-memory).
pub mod corpus;

pub mod matcher;

pub mod report;

/// Per-asset fingerprint, match and report flow.
pub mod discovery;

/// Concrete probe modules.
pub mod scanner;
