use std::fmt;

use thiserror::Error;

/// Represents a byte span within a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourceSpan {
    pub start: usize,
    pub end: usize,
}

impl SourceSpan {
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn to(self, other: SourceSpan) -> Self {
        Self {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    /// One-based line of `start` within `source`, if the span lies inside it.
    pub fn line(&self, source: &str) -> Option<usize> {
        let prefix = source.get(..self.start)?;
        Some(prefix.matches('\n').count() + 1)
    }
}

/// Classification of a diagnostic event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    Syntax,
    BracketMismatch,
    UnboundVariable,
    UnsupportedConstruct,
    RuntimeEvaluation,
    MissingEntryPoint,
}

impl DiagnosticKind {
    pub fn label(self) -> &'static str {
        match self {
            DiagnosticKind::Syntax => "SyntaxError",
            DiagnosticKind::BracketMismatch => "BracketMismatch",
            DiagnosticKind::UnboundVariable => "UnboundVariable",
            DiagnosticKind::UnsupportedConstruct => "UnsupportedConstruct",
            DiagnosticKind::RuntimeEvaluation => "RuntimeEvaluationError",
            DiagnosticKind::MissingEntryPoint => "MissingEntryPoint",
        }
    }
}

/// Rich diagnostic information surfaced to end users.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
    pub span: Option<SourceSpan>,
    pub notes: Vec<String>,
    /// Fatal diagnostics abort every enclosing block instead of being
    /// reported and skipped.
    pub fatal: bool,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            span: None,
            notes: Vec::new(),
            fatal: false,
        }
    }

    pub fn syntax(message: impl Into<String>) -> Self {
        Self::new(DiagnosticKind::Syntax, message)
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        Self::new(DiagnosticKind::RuntimeEvaluation, message)
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(DiagnosticKind::UnsupportedConstruct, message)
    }

    pub fn with_span(mut self, span: SourceSpan) -> Self {
        self.span = Some(span);
        self
    }

    /// Attaches `span` unless a more precise one is already present.
    pub fn or_span(mut self, span: SourceSpan) -> Self {
        if self.span.is_none() {
            self.span = Some(span);
        }
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    pub fn into_fatal(mut self) -> Self {
        self.fatal = true;
        self
    }

    /// The single console line written when this diagnostic is reported.
    pub fn render_line(&self, source: &str) -> String {
        let mut line = format!("[{}] {}", self.kind.label(), self.message);
        if let Some(number) = self.span.and_then(|span| span.line(source)) {
            line.push_str(&format!(" (line {number})"));
        }
        line
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind.label(), self.message)?;
        if let Some(span) = self.span {
            write!(f, " ({}..{})", span.start, span.end)?;
        }
        for note in &self.notes {
            write!(f, "\n  note: {note}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Diagnostic {}

/// Unified error type for the Sharpling interpreter.
#[derive(Debug, Error)]
pub enum SharplingError {
    #[error("{0}")]
    Diagnostic(#[from] Diagnostic),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SharplingError {
    pub fn diagnostic(&self) -> Option<&Diagnostic> {
        match self {
            SharplingError::Diagnostic(diag) => Some(diag),
            SharplingError::Io(_) => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, SharplingError>;
