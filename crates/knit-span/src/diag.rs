use derive_more::Display;
use owo_colors::{OwoColorize, Style};
use std::{
    fmt,
    io::{self, Write},
};

use crate::{Loc, Located, SourceManager};

/// Collects every issue and diagnostic of a compilation run.
#[derive(Debug, Clone, Default)]
pub struct Report {
    pub issues: Vec<Issue>,
    pub diagnostics: Vec<Diagnostic>,
}

impl Report {
    /// Creates a new report with empty issues and diagnostics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an issue to the report.
    pub fn add_issue(&mut self, issue: Issue) {
        self.issues.push(issue);
    }

    /// Adds a diagnostic to the report.
    pub fn add_diagnostic(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    /// Shorthand for adding an error diagnostic.
    pub fn error(&mut self, loc: Loc, code: impl Into<String>, message: impl Into<String>) {
        self.add_diagnostic(Diagnostic::error(loc, code, message));
    }

    /// Shorthand for adding a warning diagnostic.
    pub fn warn(&mut self, loc: Loc, code: impl Into<String>, message: impl Into<String>) {
        self.add_diagnostic(Diagnostic::warn(loc, code, message));
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty() && self.diagnostics.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        self.issues.iter().any(|i| i.severity == Severity::Error)
            || self.diagnostics.iter().any(Diagnostic::is_error)
    }

    pub fn error_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Error)
            .count()
            + self.diagnostics.iter().filter(|d| d.is_error()).count()
    }

    /// Codes of all issues and diagnostics in insertion order.
    pub fn codes(&self) -> Vec<&str> {
        self.issues
            .iter()
            .map(|i| i.code.as_str())
            .chain(self.diagnostics.iter().map(|d| d.code.as_str()))
            .collect()
    }

    /// Moves everything of `other` into this report.
    pub fn merge(&mut self, other: Report) {
        self.issues.extend(other.issues);
        self.diagnostics.extend(other.diagnostics);
    }

    /// Prints the report to the standard output.
    pub fn print(self, sources: &SourceManager) -> io::Result<()> {
        for issue in self.issues {
            issue.print()?;
        }
        for diagnostic in self.diagnostics {
            diagnostic.print(sources)?;
        }
        Ok(())
    }

    /// Prints the report to the standard error output.
    pub fn eprint(self, sources: &SourceManager) -> io::Result<()> {
        for issue in self.issues {
            issue.eprint()?;
        }
        for diagnostic in self.diagnostics {
            diagnostic.eprint(sources)?;
        }
        Ok(())
    }
}

/// Represents the severity of a diagnostic message.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl From<Severity> for ariadne::ReportKind<'_> {
    fn from(value: Severity) -> Self {
        match value {
            Severity::Info => ariadne::ReportKind::Advice,
            Severity::Warning => ariadne::ReportKind::Warning,
            Severity::Error => ariadne::ReportKind::Error,
        }
    }
}

/// Converts a type into an issue.
pub trait IntoIssue: fmt::Display + Sized {
    /// Converts the type into an issue.
    fn into_issue(self, code: impl Into<String>) -> Issue {
        Issue::error(code, self.to_string())
    }
}

impl IntoIssue for io::Error {}

/// A problem without a source location, for example a missing root module.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Issue {
    /// Machine-stable code of the issue.
    pub code: String,
    /// The main issue message.
    pub message: String,
    /// Optional help text that provides additional guidance.
    pub help: Option<String>,
    /// The severity of the issue (Error, Warning, or Advice).
    pub severity: Severity,
}

impl Issue {
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            help: None,
            severity: Severity::Error,
        }
    }

    pub fn warn(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::error(code, message)
        }
    }

    /// Adds help text to the issue and returns self for method chaining.
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    pub fn write(self, mut w: impl Write) -> io::Result<()> {
        let Issue {
            code,
            message,
            help,
            severity,
        } = self;

        let style = match severity {
            Severity::Info => Style::new().green(),
            Severity::Warning => Style::new().yellow(),
            Severity::Error => Style::new().red(),
        };

        writeln!(
            w,
            "{} [{}]: {message}",
            severity.style(style),
            code.style(style)
        )?;

        if let Some(help) = help {
            writeln!(w, "{} {help}", "Help:".cyan())?;
        }

        Ok(())
    }

    pub fn print(self) -> io::Result<()> {
        self.write(io::stdout())
    }

    pub fn eprint(self) -> io::Result<()> {
        self.write(io::stderr())
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.message.fmt(f)
    }
}

/// Represents a diagnostic message with source location information.
///
/// Besides the human readable message every diagnostic carries a short code
/// (for example `import:not_found:lib`) that stays stable across releases and
/// is what tests and tools match on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Diagnostic {
    /// Machine-stable code of the diagnostic.
    pub code: String,
    /// The main diagnostic message.
    pub message: String,
    /// Optional help text that provides additional guidance.
    pub help: Option<String>,
    /// The severity of the diagnostic (Error, Warning, or Advice).
    pub severity: Severity,
    /// The source code location this diagnostic refers to.
    pub loc: Loc,
    /// Additional context information with their respective locations.
    pub trace: Vec<Located<String>>,
    /// Additional notes related to the diagnostic.
    pub notes: Vec<String>,
}

impl Diagnostic {
    pub fn new(
        severity: Severity,
        loc: Loc,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            help: None,
            severity,
            loc,
            trace: Vec::new(),
            notes: Vec::new(),
        }
    }

    pub fn error(loc: Loc, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, loc, code, message)
    }

    pub fn warn(loc: Loc, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, loc, code, message)
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// Prints the diagnostic to the standard output.
    pub fn print(self, sources: &SourceManager) -> io::Result<()> {
        let report = ariadne::Report::from(self);
        report.print(sources)
    }

    /// Prints the diagnostic to the standard error output.
    pub fn eprint(self, sources: &SourceManager) -> io::Result<()> {
        let report = ariadne::Report::from(self);
        report.eprint(sources)
    }
}

impl From<Diagnostic> for ariadne::Report<'_, Loc> {
    fn from(diag: Diagnostic) -> Self {
        let Diagnostic {
            code,
            message,
            help,
            severity,
            loc,
            trace,
            notes,
        } = diag;

        let mut builder = ariadne::Report::build(severity.into(), loc)
            .with_code(code)
            .with_message(message)
            .with_label(ariadne::Label::new(loc))
            .with_labels(
                trace
                    .into_iter()
                    .map(|(label, loc)| ariadne::Label::new(loc).with_message(label)),
            );

        if let Some(help) = help {
            builder = builder.with_help(help);
        }
        for note in notes {
            builder = builder.with_note(note);
        }

        builder.finish()
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for Diagnostic {}
