//! Loaded modules, before they are bound to a chain.

use camino::Utf8PathBuf;
use std::{fmt, rc::Rc};

use knit_span::{Loc, SourceId};
use knit_syntax::ast;

use crate::{
    modifiers::{ModifierValues, MountAnnotation},
    ModuleName, MountName,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MidHeader {
    /// Location of the `module` keyword.
    pub loc: Loc,
    pub mount: Option<MountAnnotation>,
    pub is_abstract: Option<Loc>,
    pub external: bool,
    pub test: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MidModule {
    pub name: ModuleName,
    /// Nearest loaded ancestor, never set for test modules.
    pub parent: Option<ModuleName>,
    pub mount: MountName,
    pub header: Option<MidHeader>,
    pub files: Vec<MidFile>,
    pub directory: bool,
    pub test_dependency: bool,
    pub selected: bool,
}

impl MidModule {
    pub fn is_test(&self) -> bool {
        self.header.as_ref().is_some_and(|h| h.test)
    }

    pub fn is_abstract(&self) -> bool {
        self.abstract_loc().is_some()
    }

    pub fn abstract_loc(&self) -> Option<Loc> {
        self.header.as_ref().and_then(|h| h.is_abstract)
    }

    pub fn is_external(&self) -> bool {
        self.header.as_ref().is_some_and(|h| h.external)
    }

    /// Where the module begins: its header, else its first file.
    pub fn start_loc(&self) -> Option<Loc> {
        self.header
            .as_ref()
            .map(|h| h.loc)
            .or_else(|| self.files.iter().find_map(|f| f.start))
    }
}

impl fmt::Display for MidModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.name.fmt(f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MidFile {
    pub path: Utf8PathBuf,
    pub source: Option<SourceId>,
    pub start: Option<Loc>,
    pub members: Vec<MidMember>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MidMember {
    Definition(Rc<MidDefinition>),
    Import(Rc<MidImport>),
    Namespace(Rc<MidNamespace>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MidDefinition {
    pub def: ast::Definition,
    pub modifiers: ModifierValues,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MidImport {
    pub loc: Loc,
    pub alias: Option<ast::Ident>,
    /// Module named by the import path.
    pub module: ModuleName,
    pub path: ast::Path,
    pub target: ast::ImportTarget,
    pub modifiers: ModifierValues,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MidNamespace {
    pub loc: Loc,
    pub name: Option<ast::Path>,
    pub modifiers: ModifierValues,
    pub members: Vec<MidMember>,
}
