// src/core/module.rs

//! The capability contract every probe module implements.
//!
//! A module advertises which of the three phases it takes part in through
//! [`Capabilities`]. The engine reads that set once, when the module is
//! registered, and never calls a method the module did not advertise.

use async_trait::async_trait;
use std::ops::BitOr;
use std::sync::Arc;

use crate::core::models::{Context, Fact, Finding};

/// The subset of {collect, scan, analyze} a module provides.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub collect: bool,
    pub scan: bool,
    pub analyze: bool,
}

impl Capabilities {
    pub const NONE: Self = Self { collect: false, scan: false, analyze: false };
    pub const COLLECT: Self = Self { collect: true, scan: false, analyze: false };
    pub const SCAN: Self = Self { collect: false, scan: true, analyze: false };
    pub const ANALYZE: Self = Self { collect: false, scan: false, analyze: true };
}

impl BitOr for Capabilities {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self {
            collect: self.collect || rhs.collect,
            scan: self.scan || rhs.scan,
            analyze: self.analyze || rhs.analyze,
        }
    }
}

/// Result of a single probe call.
///
/// `Failed` carries the reason; the engine logs it and treats the call as
/// having contributed nothing.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeOutcome<T> {
    Success(Vec<T>),
    Empty,
    Failed(String),
}

impl<T> ProbeOutcome<T> {
    pub fn from_items(items: Vec<T>) -> Self {
        if items.is_empty() { Self::Empty } else { Self::Success(items) }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    pub fn into_items(self) -> Vec<T> {
        match self {
            Self::Success(items) => items,
            Self::Empty | Self::Failed(_) => Vec::new(),
        }
    }
}

impl<T> From<Vec<T>> for ProbeOutcome<T> {
    fn from(items: Vec<T>) -> Self {
        Self::from_items(items)
    }
}

/// Immutable view handed to an analyzer: one producer's findings and facts
/// as they stood when the analyzer was invoked.
#[derive(Debug, Clone)]
pub struct AnalysisInput {
    pub producer: String,
    pub findings: Arc<[Finding]>,
    pub facts: Arc<[Fact]>,
}

/// A unit of assessment logic.
///
/// Implementations catch their own failures and report them as
/// [`ProbeOutcome::Failed`]; every network call inside a probe carries its
/// own timeout on top of the engine's per-call bound.
#[async_trait]
pub trait ProbeModule: Send + Sync {
    /// Identity under which this module's facts and findings are keyed.
    fn name(&self) -> &str;

    fn capabilities(&self) -> Capabilities;

    async fn collect(&self, _ctx: &Context) -> ProbeOutcome<Fact> {
        ProbeOutcome::Empty
    }

    async fn scan(&self, _ctx: &Context) -> ProbeOutcome<Finding> {
        ProbeOutcome::Empty
    }

    async fn analyze(&self, _input: &AnalysisInput, _ctx: &Context) -> ProbeOutcome<Finding> {
        ProbeOutcome::Empty
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capabilities_combine() {
        let caps = Capabilities::COLLECT | Capabilities::SCAN;
        assert!(caps.collect && caps.scan && !caps.analyze);
        assert_eq!(Capabilities::NONE | Capabilities::ANALYZE, Capabilities::ANALYZE);
    }

    #[test]
    fn outcome_from_empty_vec_is_empty() {
        let outcome: ProbeOutcome<u8> = Vec::new().into();
        assert_eq!(outcome, ProbeOutcome::Empty);
        assert_eq!(ProbeOutcome::from_items(vec![1, 2]).into_items(), vec![1, 2]);
    }

    #[test]
    fn failed_outcome_yields_nothing() {
        let outcome: ProbeOutcome<u8> = ProbeOutcome::Failed("connection refused".into());
        assert!(outcome.is_failure());
        assert!(outcome.into_items().is_empty());
    }
}
