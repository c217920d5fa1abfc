// SPDX-License-Identifier: MIT OR Apache-2.0
//! Validation diagnostics.
//!
//! Nothing in the graph core aborts on a diagnostic: warnings and errors are
//! handed to a [`DiagnosticSink`] and the graph stays editable.

use crate::node::NodeId;
use std::fmt;

/// Diagnostic severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    /// Non-fatal, the operation proceeded
    Warning,
    /// The node is in error
    Error,
}

/// A message attached to a node (or to the whole graph)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Severity
    pub severity: Severity,
    /// Node the message is about
    pub node: Option<NodeId>,
    /// Message text
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        match self.node {
            Some(node) => write!(f, "{level} [{}]: {}", node.0, self.message),
            None => write!(f, "{level}: {}", self.message),
        }
    }
}

/// Receives diagnostics produced by graph operations
pub trait DiagnosticSink {
    /// Report a diagnostic
    fn report(&mut self, diagnostic: Diagnostic);

    /// Report a warning
    fn warning(&mut self, node: Option<NodeId>, message: String) {
        self.report(Diagnostic {
            severity: Severity::Warning,
            node,
            message,
        });
    }

    /// Report an error
    fn error(&mut self, node: Option<NodeId>, message: String) {
        self.report(Diagnostic {
            severity: Severity::Error,
            node,
            message,
        });
    }
}

/// Sink that keeps every diagnostic
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// All diagnostics in report order
    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    /// Warnings only
    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter().filter(|d| d.severity == Severity::Warning)
    }

    /// Errors only
    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter().filter(|d| d.severity == Severity::Error)
    }

    /// Whether any error was reported
    pub fn has_errors(&self) -> bool {
        self.errors().next().is_some()
    }

    /// Whether a node has an error
    pub fn node_has_error(&self, node: NodeId) -> bool {
        self.errors().any(|d| d.node == Some(node))
    }

    /// Number of diagnostics
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing was reported
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl DiagnosticSink for Diagnostics {
    fn report(&mut self, diagnostic: Diagnostic) {
        self.entries.push(diagnostic);
    }
}
