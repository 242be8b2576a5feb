//! Per-item failures collected during a reconciliation pass.

use std::fmt;

use domains::{DomainError, ErrorKind};
use serde::Serialize;

/// The sub-step a failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    DnsSync,
    Readiness,
    NamespaceCreation,
    ConfigFetch,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::DnsSync => "dns sync",
            Stage::Readiness => "readiness",
            Stage::NamespaceCreation => "namespace creation",
            Stage::ConfigFetch => "config fetch",
        };
        f.write_str(name)
    }
}

/// One failed item: which stage, what it was working on, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemError {
    pub stage: Stage,
    /// Node name, namespace, email, or zone
    pub subject: String,
    pub kind: ErrorKind,
    pub message: String,
}

impl ItemError {
    pub fn new(stage: Stage, subject: impl Into<String>, err: &DomainError) -> Self {
        Self {
            stage,
            subject: subject.into(),
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl fmt::Display for ItemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.stage, self.subject, self.message)
    }
}
