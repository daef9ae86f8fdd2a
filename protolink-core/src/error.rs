//! Diagnostics collection and the small set of hard (non-recoverable) errors.

use std::fmt;

use crate::position::Span;

/// Hard failures that abort a compilation outright rather than being
/// collected as diagnostics: these are the cases `spec.md` §7 calls out as
/// always fatal (import cycles) or that are programmer/provider errors
/// rather than malformed input.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("cycle found in imports: {0}")]
    ImportCycle(String),

    #[error("import recursion limit ({0}) exceeded")]
    RecursionLimitExceeded(u32),

    #[error("file provider failed to resolve \"{path}\": {reason}")]
    ProviderFailed { path: String, reason: String },

    #[error("\"{0}\" was not provided and is not a built-in well-known file")]
    FileNotFound(String),
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Warning,
    Error,
}

/// One collected diagnostic, per `spec.md` §7: severity, a primary span, a
/// message, and optional secondary spans (e.g. "previously defined here").
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub span: Span,
    pub message: String,
    pub secondary: Vec<(Span, String)>,
}

impl Diagnostic {
    pub fn error(span: Span, message: impl Into<String>) -> Self {
        Diagnostic {
            severity: Severity::Error,
            span,
            message: message.into(),
            secondary: Vec::new(),
        }
    }

    pub fn warning(span: Span, message: impl Into<String>) -> Self {
        Diagnostic {
            severity: Severity::Warning,
            span,
            message: message.into(),
            secondary: Vec::new(),
        }
    }

    pub fn with_secondary(mut self, span: Span, message: impl Into<String>) -> Self {
        self.secondary.push((span, message.into()));
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        write!(f, "{}: {}: {}", self.span, kind, self.message)?;
        for (span, msg) in &self.secondary {
            write!(f, "\n    {}: note: {}", span, msg)?;
        }
        Ok(())
    }
}

/// How the pipeline behaves once an error-severity diagnostic has been
/// recorded. Mirrors `spec.md` §6's `error_mode` option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorMode {
    FailFast,
    CollectAll,
}

/// The diagnostics sink threaded through every pipeline stage. Lex/parse
/// errors are always collected (the parser recovers and keeps going);
/// link/option/semantic stages consult `should_continue` to decide whether
/// to keep compiling after recording an error, per `error_mode`.
#[derive(Debug, Default)]
pub struct ErrorHandler {
    mode: Option<ErrorMode>,
    diagnostics: Vec<Diagnostic>,
}

impl ErrorHandler {
    pub fn new(mode: ErrorMode) -> Self {
        ErrorHandler {
            mode: Some(mode),
            diagnostics: Vec::new(),
        }
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        log::debug!("{}", diagnostic);
        self.diagnostics.push(diagnostic);
    }

    pub fn push_error(&mut self, span: Span, message: impl Into<String>) {
        self.push(Diagnostic::error(span, message));
    }

    pub fn push_warning(&mut self, span: Span, message: impl Into<String>) {
        self.push(Diagnostic::warning(span, message));
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }

    /// Whether a pass should keep processing further elements after the
    /// diagnostic it just pushed. Fail-fast still finishes the current file
    /// (parse recovery already happened) but stops before the *next* stage.
    pub fn should_continue(&self) -> bool {
        match self.mode {
            Some(ErrorMode::FailFast) => !self.has_errors(),
            Some(ErrorMode::CollectAll) | None => true,
        }
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }

    pub fn extend(&mut self, other: impl IntoIterator<Item = Diagnostic>) {
        self.diagnostics.extend(other);
    }
}
