use std::{collections::HashSet, rc::Rc};

use knit_span::{Diagnostic, Loc, Report, SourceManager};

/// Diagnostic sink of the linker.
///
/// The same module may be linked once per external chain, so an error with
/// the same location and code is only reported the first time.
#[derive(Debug, Default)]
pub struct MessageContext {
    sources: Rc<SourceManager>,
    report: Report,
    seen: HashSet<(Loc, String)>,
}

impl MessageContext {
    pub fn new(sources: Rc<SourceManager>) -> Self {
        Self {
            sources,
            report: Report::new(),
            seen: HashSet::new(),
        }
    }

    pub fn sources(&self) -> &SourceManager {
        &self.sources
    }

    pub fn error(&mut self, loc: Loc, code: impl Into<String>, message: impl Into<String>) {
        self.add(Diagnostic::error(loc, code, message));
    }

    /// Moves the diagnostics of `report` over, dropping repeated ones.
    pub fn absorb(&mut self, report: Report) {
        self.report.issues.extend(report.issues);
        for diagnostic in report.diagnostics {
            self.add(diagnostic);
        }
    }

    fn add(&mut self, diagnostic: Diagnostic) {
        if self.seen.insert((diagnostic.loc, diagnostic.code.clone())) {
            self.report.add_diagnostic(diagnostic);
        }
    }

    /// `path(line:column)`
    pub fn pos(&self, loc: Loc) -> String {
        self.sources.describe(loc)
    }

    /// `path:line`
    pub fn line(&self, loc: Loc) -> String {
        self.sources.describe_line(loc)
    }

    pub fn report(&self) -> &Report {
        &self.report
    }

    pub fn into_report(self) -> Report {
        self.report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_errors_are_reported_once() {
        let mut sources = SourceManager::new();
        let id = sources.insert("a.knit", "module;\nentity e;");
        let loc = Loc::from_range(id, 8..14);

        let mut ctx = MessageContext::new(Rc::new(sources));
        ctx.error(loc, "x:y", "first");
        ctx.error(loc, "x:y", "again");
        ctx.error(loc, "x:z", "other");

        let mut other = Report::new();
        other.error(loc, "x:z", "absorbed");
        other.error(loc, "x:w", "absorbed");
        ctx.absorb(other);

        assert_eq!(ctx.pos(loc), "a.knit(2:1)");
        assert_eq!(ctx.line(loc), "a.knit:2");
        assert_eq!(ctx.into_report().codes(), vec!["x:y", "x:z", "x:w"]);
    }
}
