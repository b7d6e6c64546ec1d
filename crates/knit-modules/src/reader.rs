use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, trace};
use owo_colors::OwoColorize;
use std::{collections::HashMap, rc::Rc};
use thiserror::Error;

use knit_span::{IntoIssue, Report, SourceId, SourceManager};
use knit_syntax::{ast, FileParser, OutlineParser};
use knit_vfs::SourceTree;

use crate::{is_valid_name, ModuleName, FILE_SUFFIX, MODULE_FILE};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ModuleReadError {
    #[error("Module '{0}' is a file and a directory at the same time")]
    FileAndDirectory(ModuleName),
}

impl ModuleReadError {
    pub fn code(&self) -> String {
        match self {
            ModuleReadError::FileAndDirectory(name) => format!("import:file_dir:{name}"),
        }
    }
}

impl IntoIssue for ModuleReadError {}

/// One source file with its outline, `ast` is `None` if it did not parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFile {
    pub path: Utf8PathBuf,
    pub source: Option<SourceId>,
    pub ast: Option<ast::File>,
}

impl ParsedFile {
    pub fn header(&self) -> Option<&ast::ModuleHeader> {
        self.ast.as_ref().and_then(|ast| ast.header.as_ref())
    }
}

/// The files making up one module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleSource {
    pub name: ModuleName,
    pub directory: bool,
    pub files: Vec<Rc<ParsedFile>>,
    /// Index of `module.knit` of a directory module.
    pub main_file: Option<usize>,
}

impl ModuleSource {
    /// Header of a file module, or of the main file of a directory module.
    pub fn header(&self) -> Option<&ast::ModuleHeader> {
        if self.directory {
            self.main_file.and_then(|i| self.files[i].header())
        } else {
            self.files.first().and_then(|f| f.header())
        }
    }
}

fn module_dir(parts: &[ecow::EcoString]) -> Utf8PathBuf {
    parts.iter().fold(Utf8PathBuf::new(), |path, part| path.join(part.as_str()))
}

/// Maps module names onto a [`SourceTree`].
///
/// `a/b.knit` with a `module` header is the file module `a.b`. Every other
/// file of directory `a/b` belongs to the directory module `a.b`. Parsed files
/// and results per module name are cached, failures included.
pub struct ModuleReader<T, P = OutlineParser> {
    tree: T,
    parser: P,
    sources: SourceManager,
    report: Report,
    files: HashMap<Utf8PathBuf, Rc<ParsedFile>>,
    modules: HashMap<ModuleName, Result<Option<Rc<ModuleSource>>, ModuleReadError>>,
}

impl<T: SourceTree> ModuleReader<T> {
    pub fn new(tree: T) -> Self {
        Self::with_parser(tree, OutlineParser)
    }
}

impl<T: SourceTree, P: FileParser> ModuleReader<T, P> {
    pub fn with_parser(tree: T, parser: P) -> Self {
        Self {
            tree,
            parser,
            sources: SourceManager::new(),
            report: Report::new(),
            files: HashMap::new(),
            modules: HashMap::new(),
        }
    }

    pub fn sources(&self) -> &SourceManager {
        &self.sources
    }

    pub fn report_mut(&mut self) -> &mut Report {
        &mut self.report
    }

    pub fn into_parts(self) -> (SourceManager, Report) {
        (self.sources, self.report)
    }

    /// Whether the directory of `name` exists.
    pub fn dir_exists(&self, name: &ModuleName) -> bool {
        self.tree.is_dir(&module_dir(name.parts()))
    }

    /// Reads module `name`. `Ok(None)` if there is no such module.
    pub fn read_module(&mut self, name: &ModuleName) -> Result<Option<Rc<ModuleSource>>, ModuleReadError> {
        if let Some(cached) = self.modules.get(name) {
            return cached.clone();
        }

        let result = self.read_module_uncached(name);
        self.modules.insert(name.clone(), result.clone());
        result
    }

    fn read_module_uncached(&mut self, name: &ModuleName) -> Result<Option<Rc<ModuleSource>>, ModuleReadError> {
        let Some((tail, head)) = name.parts().split_last() else {
            return Ok(self.read_dir_module(name, Utf8Path::new("")).flatten());
        };

        let dir = module_dir(head);
        if !self.tree.is_dir(&dir) {
            return Ok(None);
        }

        let file = self.read_file_module(name, &dir.join(format!("{tail}{FILE_SUFFIX}")));
        let sub_dir = self.read_dir_module(name, &dir.join(tail.as_str()));

        // Existence decides the conflict, whether either one is a valid module does not matter
        if file.is_some() && sub_dir.is_some() {
            return Err(ModuleReadError::FileAndDirectory(name.clone()));
        }

        Ok(file.flatten().or(sub_dir.flatten()))
    }

    /// `None` if the file does not exist, `Some(None)` if it exists but is not
    /// a file module.
    fn read_file_module(&mut self, name: &ModuleName, path: &Utf8Path) -> Option<Option<Rc<ModuleSource>>> {
        if !self.tree.is_file(path) {
            return None;
        }

        let file = self.parse_file(path);
        if file.ast.is_some() && file.header().is_none() {
            return Some(None);
        }

        Some(Some(Rc::new(ModuleSource {
            name: name.clone(),
            directory: false,
            files: vec![file],
            main_file: None,
        })))
    }

    /// `None` if the directory does not exist or holds no source files,
    /// `Some(None)` if all of its files are file modules.
    fn read_dir_module(&mut self, name: &ModuleName, dir: &Utf8Path) -> Option<Option<Rc<ModuleSource>>> {
        if !self.tree.is_dir(dir) {
            return None;
        }

        let names = self.source_files(dir);
        if names.is_empty() {
            return None;
        }

        let mut files = Vec::new();
        let mut main_file = None;

        for file_name in names {
            let file = self.parse_file(&dir.join(&file_name));
            let is_main = file_name == MODULE_FILE;

            if is_main || file.ast.is_none() || file.header().is_none() {
                if is_main {
                    main_file = Some(files.len());
                }
                files.push(file);
            }
        }

        if files.is_empty() {
            return Some(None);
        }

        trace!("Directory module {name}: {} files", files.len());

        Some(Some(Rc::new(ModuleSource {
            name: name.clone(),
            directory: true,
            files,
            main_file,
        })))
    }

    /// File modules directly inside the directory of `name`, sorted by name.
    pub fn file_sub_modules(&mut self, name: &ModuleName) -> Vec<Rc<ModuleSource>> {
        let dir = module_dir(name.parts());
        if !self.tree.is_dir(&dir) {
            return Vec::new();
        }

        let mut modules = Vec::new();

        for file_name in self.source_files(&dir) {
            let stem = &file_name[..file_name.len() - FILE_SUFFIX.len()];
            if file_name == MODULE_FILE || !is_valid_name(stem) {
                continue;
            }

            let sub_name = name.child(stem);
            if let Some(Some(source)) = self.read_file_module(&sub_name, &dir.join(&file_name)) {
                modules.push(source);
            }
        }

        modules.sort_by(|a, b| a.name.cmp(&b.name));
        modules
    }

    /// Sub-directories of the directory of `name` usable as module names.
    pub fn dir_sub_modules(&mut self, name: &ModuleName) -> Vec<ModuleName> {
        let dir = module_dir(name.parts());
        let dirs = match self.tree.dirs(&dir) {
            Ok(dirs) => dirs,
            Err(_) => return Vec::new(),
        };

        let mut modules = dirs
            .iter()
            .filter(|d| is_valid_name(d))
            .map(|d| name.child(d.as_str()))
            .collect::<Vec<_>>();
        modules.sort();
        modules
    }

    fn source_files(&mut self, dir: &Utf8Path) -> Vec<String> {
        match self.tree.files(dir) {
            Ok(mut files) => {
                files.retain(|f| f.ends_with(FILE_SUFFIX));
                files.sort();
                files
            }
            Err(e) => {
                self.report.add_issue(e.into_issue("file:list"));
                Vec::new()
            }
        }
    }

    fn parse_file(&mut self, path: &Utf8Path) -> Rc<ParsedFile> {
        if let Some(file) = self.files.get(path) {
            return file.clone();
        }

        let file = match self.tree.read_file(path) {
            Ok(text) => {
                let source = self.sources.insert(path.to_owned(), text.clone());
                debug!("{} {path}", "Source".bold().bright_white());
                let ast = self.parser.parse_file(source, &text, &mut self.report);
                ParsedFile {
                    path: path.to_owned(),
                    source: Some(source),
                    ast,
                }
            }
            Err(e) => {
                self.report
                    .add_issue(e.into_issue("file:read").with_help(format!("while reading {path}")));
                ParsedFile {
                    path: path.to_owned(),
                    source: None,
                    ast: None,
                }
            }
        };

        let file = Rc::new(file);
        self.files.insert(path.to_owned(), file.clone());
        file
    }
}
