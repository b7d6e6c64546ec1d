//! Runs the whole pipeline over a source tree: modules are loaded, compiled
//! and linked, and every diagnostic ends up in one [`Report`].

pub mod config;

use camino::Utf8PathBuf;
use log::debug;
use owo_colors::OwoColorize;
use std::rc::Rc;
use thiserror::Error;

use knit_link::{AppLinker, LinkedApp};
use knit_modules::{MidMember, MidModule, ModuleLoader, ModuleName, ModuleReadError};
use knit_span::{Issue, Report, SourceManager};
use knit_utils::graph::DependencyGraph;
use knit_vfs::{CachedSourceTree, DiskSourceTree, SourceTree};

pub use config::{DriverOptions, OptionsError};

#[derive(Debug, Error)]
pub enum DriverError {
    #[error(transparent)]
    Read(#[from] ModuleReadError),
    #[error("Invalid module name '{0}'")]
    InvalidModuleName(String),
    #[error("Source directory '{0}' does not exist")]
    MissingSourceDir(Utf8PathBuf),
}

/// Modules loaded from a source tree, before linking.
#[derive(Debug)]
pub struct Loaded {
    pub modules: Vec<MidModule>,
    pub sources: SourceManager,
    pub report: Report,
}

/// Outcome of a full run. `report` holds the diagnostics of every stage.
#[derive(Debug)]
pub struct Checked {
    pub app: LinkedApp,
    pub sources: Rc<SourceManager>,
    pub report: Report,
}

#[derive(Debug, Clone, Default)]
pub struct Driver {
    options: DriverOptions,
}

impl Driver {
    pub fn new(options: DriverOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &DriverOptions {
        &self.options
    }

    fn disk_tree(&self) -> Result<CachedSourceTree<DiskSourceTree>, DriverError> {
        let dir = &self.options.source_dir;
        if !dir.is_dir() {
            return Err(DriverError::MissingSourceDir(dir.clone()));
        }
        Ok(CachedSourceTree::new(DiskSourceTree::new(dir.clone())))
    }

    /// Loads the configured modules from the source directory.
    pub fn load_dir(&self) -> Result<Loaded, DriverError> {
        self.load(self.disk_tree()?)
    }

    /// Loads and links the configured modules from the source directory.
    pub fn check_dir(&self) -> Result<Checked, DriverError> {
        self.check(self.disk_tree()?)
    }

    pub fn load<T: SourceTree>(&self, tree: T) -> Result<Loaded, DriverError> {
        let names = self.module_names()?;
        let mut loader = ModuleLoader::new(tree);
        let mut missing = Vec::new();

        if self.options.all {
            loader.load_all_modules(&ModuleName::root(), false)?;
        } else {
            for name in &names {
                if !loader.load_module(name)? {
                    missing.push(name.clone());
                }
            }
        }

        if self.options.test {
            if self.options.all {
                loader.load_all_modules(&ModuleName::root(), true)?;
            } else {
                for name in &names {
                    loader.load_test_modules(name)?;
                }
            }
        }

        let modules = loader.finish();
        let (sources, mut report) = loader.into_parts();

        for name in missing {
            report.add_issue(Issue::error(
                format!("module:not_found:{name}"),
                format!("Module '{name}' not found"),
            ));
        }

        debug!("{} {} modules", "Loaded".bold().bright_white(), modules.len());
        Ok(Loaded {
            modules,
            sources,
            report,
        })
    }

    pub fn check<T: SourceTree>(&self, tree: T) -> Result<Checked, DriverError> {
        let Loaded {
            modules,
            sources,
            mut report,
        } = self.load(tree)?;

        let sources = Rc::new(sources);
        let mut app = AppLinker::new(self.options.compiler.clone()).link(modules, sources.clone());
        report.merge(std::mem::take(&mut app.report));

        debug!("{} {} errors", "Checked".bold().bright_white(), report.error_count());
        Ok(Checked {
            app,
            sources,
            report,
        })
    }

    fn module_names(&self) -> Result<Vec<ModuleName>, DriverError> {
        if self.options.modules.is_empty() {
            return Ok(vec![ModuleName::root()]);
        }

        self.options
            .modules
            .iter()
            .map(|s| ModuleName::parse(s).ok_or_else(|| DriverError::InvalidModuleName(s.clone())))
            .collect()
    }
}

/// Edges point from a module to the loaded modules it imports.
pub fn module_graph(modules: &[MidModule]) -> DependencyGraph<ModuleName> {
    let mut graph = DependencyGraph::new();
    for module in modules {
        graph.add_node(module.name.clone());
    }

    for module in modules {
        let mut imports = Vec::new();
        for file in &module.files {
            collect_imports(&file.members, &mut imports);
        }

        for import in imports {
            if graph.contains(&import) {
                graph.add_dependency(module.name.clone(), import);
            }
        }
    }

    graph
}

fn collect_imports(members: &[MidMember], out: &mut Vec<ModuleName>) {
    for member in members {
        match member {
            MidMember::Import(import) => out.push(import.module.clone()),
            MidMember::Namespace(ns) => collect_imports(&ns.members, out),
            MidMember::Definition(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use knit_vfs::MemorySourceTree;

    fn tree(files: &[(&str, &str)]) -> MemorySourceTree {
        let mut tree = MemorySourceTree::new();
        for (path, text) in files {
            tree.add_file(*path, *text);
        }
        tree
    }

    fn driver(modules: &[&str]) -> Driver {
        Driver::new(DriverOptions {
            modules: modules.iter().map(|m| m.to_string()).collect(),
            ..DriverOptions::default()
        })
    }

    #[test]
    fn check_collects_every_stage() {
        let files = tree(&[
            ("app.knit", "module;\nimport lib;\nimport nope;\nentity user {}"),
            ("lib.knit", "module;\n@mount(\"user\") entity account {}"),
        ]);

        let checked = driver(&["app", "missing"]).check(files).unwrap();
        let mut codes = checked.report.codes();
        codes.sort();
        assert_eq!(
            codes,
            vec![
                "import:not_found:nope",
                "mnt_conflict:user:[app:user]:user:ENTITY:[lib:account]:lib.knit(2:23)",
                "mnt_conflict:user:[lib:account]:user:ENTITY:[app:user]:app.knit(4:8)",
                "module:not_found:missing",
            ]
        );
        assert_eq!(checked.report.error_count(), 4);
        assert!(checked.report.has_errors());
        assert!(checked.app.find("lib:account").is_some());
    }

    #[test]
    fn missing_override_is_reported_once_whatever_the_module_order() {
        let files = tree(&[
            ("core.knit", "abstract module;\nabstract function f();"),
            ("app.knit", "module;\nimport core;"),
        ]);

        let checked = driver(&["core", "app"]).check(files).unwrap();
        assert_eq!(checked.report.codes(), vec!["override:missing:[core:f]:[core.knit:2]"]);
    }

    #[test]
    fn invalid_module_names_are_rejected() {
        let err = driver(&["a..b"]).check(tree(&[])).unwrap_err();
        assert!(matches!(err, DriverError::InvalidModuleName(name) if name == "a..b"));
    }

    #[test]
    fn all_modules_with_tests() {
        let files = tree(&[
            ("app.knit", "module;"),
            ("lib/module.knit", "module;"),
            ("lib/tests.knit", "@test module;\nimport lib;"),
        ]);

        let options = DriverOptions {
            all: true,
            test: true,
            ..DriverOptions::default()
        };
        let loaded = Driver::new(options).load(files).unwrap();

        let mut names = loaded.modules.iter().map(|m| m.name.to_string()).collect::<Vec<_>>();
        names.sort();
        assert_eq!(names, vec!["app", "lib", "lib.tests"]);
        assert!(loaded.modules.iter().all(|m| m.selected));
    }

    #[test]
    fn module_graph_orders_imports_first() {
        let files = tree(&[
            ("app.knit", "module;\nnamespace ns { import lib; }"),
            ("lib.knit", "module;\nimport util;"),
            ("util.knit", "module;"),
        ]);

        let loaded = driver(&["app"]).load(files).unwrap();
        let order = module_graph(&loaded.modules)
            .topological_sort()
            .unwrap()
            .into_iter()
            .map(|name| name.to_string())
            .collect::<Vec<_>>();
        assert_eq!(order, vec!["util", "lib", "app"]);
    }

    #[test]
    fn check_dir_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("module.knit"), "module;\nentity block {}").unwrap();

        let options = DriverOptions {
            source_dir: Utf8PathBuf::from_path_buf(dir.path().to_owned()).unwrap(),
            ..DriverOptions::default()
        };
        let checked = Driver::new(options).check_dir().unwrap();
        assert_eq!(checked.report.codes(), vec!["mnt_conflict:sys:[block]:block"]);

        let missing = DriverOptions {
            source_dir: Utf8PathBuf::from("/nonexistent/knit"),
            ..DriverOptions::default()
        };
        assert!(matches!(
            Driver::new(missing).check_dir(),
            Err(DriverError::MissingSourceDir(_))
        ));
    }
}
