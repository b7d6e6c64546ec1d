//! Source positions and diagnostics.
//!
//! Important concepts in this module include:
//!
//! - the *span*, represented by [`Span`], a byte range inside one source;
//! - the *location*, represented by [`Loc`], a span tied to a [`SourceId`];
//! - the [`SourceManager`], owning every source text of a run;
//! - the [`Report`], collecting [`Diagnostic`]s and [`Issue`]s.

mod diag;
mod loc;
mod source;
mod span;

pub use diag::{Diagnostic, IntoIssue, Issue, Report, Severity};
pub use loc::{Loc, Located};
pub use source::{Source, SourceId, SourceManager};
pub use span::{Span, Spanned};
