use std::{fmt, ops::Index, sync::Arc};

use ariadne::Cache;
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexSet;
use knit_utils::define_id;

use crate::Loc;

define_id!(SourceId);

pub type Source = ariadne::Source<Arc<str>>;

#[derive(Debug, Clone)]
struct SourceEntry {
    source: Source,
    text: Arc<str>,
    line_starts: Vec<usize>,
}

impl SourceEntry {
    fn new(text: Arc<str>) -> Self {
        let line_starts = std::iter::once(0)
            .chain(text.match_indices('\n').map(|(i, _)| i + 1))
            .collect();

        Self {
            source: Source::from(text.clone()),
            text,
            line_starts,
        }
    }

    /// One-based line and column of a byte offset.
    fn line_col(&self, offset: usize) -> (usize, usize) {
        let line = self.line_starts.partition_point(|&start| start <= offset);
        let start = self.line_starts[line.saturating_sub(1)];
        let column = self.text[start..offset.min(self.text.len())].chars().count();
        (line.max(1), column + 1)
    }
}

/// Owns every source text of a compilation run, addressed by [`SourceId`].
///
/// Paths are relative to the source root and interned on first insertion.
#[derive(Debug, Clone, Default)]
pub struct SourceManager {
    paths: IndexSet<Utf8PathBuf>,
    sources: Vec<SourceEntry>,
}

impl SourceManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the text of `path`, replacing a previous text for the same path.
    pub fn insert(&mut self, path: impl Into<Utf8PathBuf>, text: impl Into<Arc<str>>) -> SourceId {
        let entry = SourceEntry::new(text.into());
        let (index, fresh) = self.paths.insert_full(path.into());

        if fresh {
            self.sources.push(entry);
        } else {
            self.sources[index] = entry;
        }

        SourceId::from_usize(index)
    }

    pub fn lookup(&self, path: &Utf8Path) -> Option<SourceId> {
        self.paths.get_index_of(path).map(SourceId::from_usize)
    }

    pub fn contains(&self, path: &Utf8Path) -> bool {
        self.paths.contains(path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn get(&self, id: SourceId) -> Option<&Source> {
        self.sources.get(id.as_usize()).map(|entry| &entry.source)
    }

    pub fn path(&self, id: SourceId) -> &Utf8Path {
        &self.paths[id.as_usize()]
    }

    pub fn text(&self, id: SourceId) -> &str {
        &self.sources[id.as_usize()].text
    }

    /// One-based line and column of the start of `loc`.
    pub fn line_col(&self, loc: Loc) -> (usize, usize) {
        self.sources[loc.source.as_usize()].line_col(loc.span.start)
    }

    /// `path(line:column)`, the stable position format used in diagnostic codes.
    pub fn describe(&self, loc: Loc) -> String {
        let (line, column) = self.line_col(loc);
        format!("{}({line}:{column})", self.path(loc.source))
    }

    /// `path:line`, the short position format used in messages.
    pub fn describe_line(&self, loc: Loc) -> String {
        let (line, _) = self.line_col(loc);
        format!("{}:{line}", self.path(loc.source))
    }
}

impl Cache<SourceId> for &SourceManager {
    type Storage = Arc<str>;

    fn fetch(&mut self, id: &SourceId) -> Result<&Source, impl fmt::Debug> {
        self.get(*id).ok_or("Source id not found")
    }

    fn display<'a>(&self, id: &'a SourceId) -> Option<impl fmt::Display + 'a> {
        self.paths.get_index(id.as_usize()).map(|p| p.to_string())
    }
}

impl Index<SourceId> for SourceManager {
    type Output = str;

    fn index(&self, index: SourceId) -> &Self::Output {
        self.text(index)
    }
}
