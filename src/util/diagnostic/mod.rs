//! Runtime diagnostics
//!
//! Recoverable script errors (a suspending primitive on a thread that may
//! not suspend, a negative delay, a read of an undefined value) do not stop
//! execution. They are turned into a [`Diagnostic`], logged through
//! `tracing` at the moment they are raised, and kept by the owning
//! animation context so embedders can inspect them after a run.

use std::fmt;

use tracing::{error, warn};

use crate::util::span::Span;

/// Diagnostic severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    /// Recovered; execution continued with a default value
    Warning,
    /// Fatal; the context run was aborted
    Error,
}

impl fmt::Display for Severity {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// A single diagnostic message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Severity
    pub severity: Severity,
    /// Human readable message
    pub message: String,
    /// Where the offending primitive was called
    pub span: Span,
    /// Context and thread that raised it, e.g. `bounce#2`
    pub origin: Option<String>,
}

impl Diagnostic {
    /// Create a warning
    pub fn warning(
        message: impl Into<String>,
        span: Span,
    ) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
            span,
            origin: None,
        }
    }

    /// Create an error
    pub fn error(
        message: impl Into<String>,
        span: Span,
    ) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
            span,
            origin: None,
        }
    }

    /// Attach the origin (context/thread) of the diagnostic
    pub fn with_origin(
        mut self,
        origin: impl Into<String>,
    ) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// Log the diagnostic
    pub fn emit(&self) {
        match self.severity {
            Severity::Warning => warn!("{}", self),
            Severity::Error => error!("{}", self),
        }
    }

    /// Check if this is a warning
    #[inline]
    pub fn is_warning(&self) -> bool {
        self.severity == Severity::Warning
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}: {}: {}", self.span, self.severity, self.message)?;
        if let Some(origin) = &self.origin {
            write!(f, " [{}]", origin)?;
        }
        Ok(())
    }
}
