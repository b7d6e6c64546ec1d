use camino::Utf8PathBuf;
use indexmap::IndexMap;
use std::rc::Rc;

use knit_modules::{ModuleKey, ModuleName};
use knit_span::Loc;

use crate::{
    function::{AbstractFunction, OverrideFunction},
    mount::MountTables,
    scope::ScopeId,
};

/// Import of a module that exists, as seen by the override checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleImport {
    pub module: ModuleKey,
    /// Location of the `import` keyword.
    pub loc: Loc,
}

#[derive(Debug, Clone, Default)]
pub struct FileInfo {
    pub path: Utf8PathBuf,
    pub imports: Vec<ModuleImport>,
    pub abstracts: Vec<Rc<AbstractFunction>>,
    pub overrides: Vec<Rc<OverrideFunction>>,
    /// Mounted definitions of this file, before any conflict check.
    pub mounts: MountTables,
}

/// A module compiled for one chain.
#[derive(Debug, Clone)]
pub struct ModuleInfo {
    pub key: ModuleKey,
    pub root: ScopeId,
    pub is_abstract: bool,
    pub files: Vec<FileInfo>,
}

impl ModuleInfo {
    pub fn name(&self) -> &ModuleName {
        &self.key.name
    }
}

pub type Modules = IndexMap<ModuleKey, ModuleInfo>;
