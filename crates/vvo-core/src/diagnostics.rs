//! Validation and diagnostic reporting.
//!
//! Structural checks accumulate [`DiagnosticIssue`]s instead of failing on
//! the first problem, so a case review surfaces everything wrong at once.

use serde::Serialize;
use std::fmt;

/// How serious an issue is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Severity {
    /// Informational, no action required
    Info,
    /// Suspicious but usable data
    Warning,
    /// The case cannot be used as-is
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// A single validation finding.
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticIssue {
    pub severity: Severity,
    pub message: String,
}

/// Accumulator for validation findings.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Diagnostics {
    pub issues: Vec<DiagnosticIssue>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn info(&mut self, message: String) {
        self.issues.push(DiagnosticIssue {
            severity: Severity::Info,
            message,
        });
    }

    pub fn warning(&mut self, message: String) {
        self.issues.push(DiagnosticIssue {
            severity: Severity::Warning,
            message,
        });
    }

    pub fn error(&mut self, message: String) {
        self.issues.push(DiagnosticIssue {
            severity: Severity::Error,
            message,
        });
    }

    pub fn has_errors(&self) -> bool {
        self.issues.iter().any(|i| i.severity == Severity::Error)
    }

    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for issue in &self.issues {
            writeln!(f, "[{}] {}", issue.severity, issue.message)?;
        }
        Ok(())
    }
}
