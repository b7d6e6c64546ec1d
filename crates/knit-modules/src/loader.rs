use indexmap::IndexMap;
use log::debug;
use owo_colors::OwoColorize;
use std::{
    collections::{HashSet, VecDeque},
    rc::Rc,
};

use knit_span::{Loc, Report, SourceManager};
use knit_syntax::{
    ast::{self, DefinitionKind},
    FileParser, OutlineParser,
};
use knit_vfs::SourceTree;

use crate::{
    mid::{MidDefinition, MidFile, MidHeader, MidImport, MidMember, MidModule, MidNamespace},
    modifiers::{ModifierTarget, ModifierValues},
    reader::{ModuleReadError, ModuleReader, ModuleSource},
    ModuleName, MountName,
};

enum ModuleState {
    Pending(Rc<ModuleSource>),
    Loading,
    Loaded(MidModule),
}

/// Loads modules and everything they import, each module exactly once.
///
/// Newly discovered modules go through a FIFO queue drained before the public
/// operations return. A module is built only after its parent module, parents
/// being strict ancestors this ordering cannot cycle.
pub struct ModuleLoader<T, P = OutlineParser> {
    reader: ModuleReader<T, P>,
    states: IndexMap<ModuleName, ModuleState>,
    queue: VecDeque<ModuleName>,
    selected: HashSet<ModuleName>,
    loading_test_dependencies: bool,
    done: bool,
}

impl<T: SourceTree> ModuleLoader<T> {
    pub fn new(tree: T) -> Self {
        Self::from_reader(ModuleReader::new(tree))
    }
}

impl<T: SourceTree, P: FileParser> ModuleLoader<T, P> {
    pub fn from_reader(reader: ModuleReader<T, P>) -> Self {
        Self {
            reader,
            states: IndexMap::new(),
            queue: VecDeque::new(),
            selected: HashSet::new(),
            loading_test_dependencies: false,
            done: false,
        }
    }

    pub fn reader(&self) -> &ModuleReader<T, P> {
        &self.reader
    }

    pub fn report_mut(&mut self) -> &mut Report {
        self.reader.report_mut()
    }

    pub fn into_parts(self) -> (SourceManager, Report) {
        self.reader.into_parts()
    }

    pub fn is_loaded(&self, name: &ModuleName) -> bool {
        self.states.contains_key(name)
    }

    /// Selects and loads module `name` with everything it imports.
    ///
    /// Returns `false` if the module does not exist.
    pub fn load_module(&mut self, name: &ModuleName) -> Result<bool, ModuleReadError> {
        assert!(
            !self.loading_test_dependencies,
            "regular modules must be loaded before test modules"
        );
        self.load(name, true)
    }

    /// Selects and loads every test module in the subtree of `root`.
    pub fn load_test_modules(&mut self, root: &ModuleName) -> Result<(), ModuleReadError> {
        assert!(!self.done, "module loader already finished");
        self.loading_test_dependencies = true;
        self.discover_tree(root, true)?;
        self.drain();
        Ok(())
    }

    /// Selects and loads every module in the subtree of `root` that is a test
    /// module exactly when `test` is set.
    pub fn load_all_modules(&mut self, root: &ModuleName, test: bool) -> Result<(), ModuleReadError> {
        assert!(!self.done, "module loader already finished");
        if test {
            self.loading_test_dependencies = true;
        }
        self.discover_tree(root, test)?;
        self.drain();
        Ok(())
    }

    /// Hands out the loaded modules in loading order.
    ///
    /// # Panics
    ///
    /// Panics if called more than once.
    pub fn finish(&mut self) -> Vec<MidModule> {
        assert!(!self.done, "module loader already finished");
        self.done = true;
        self.drain();

        let states = std::mem::take(&mut self.states);
        states
            .into_iter()
            .filter_map(|(name, state)| match state {
                ModuleState::Loaded(mut module) => {
                    module.selected = self.selected.contains(&name);
                    Some(module)
                }
                _ => None,
            })
            .collect()
    }

    fn load(&mut self, name: &ModuleName, select: bool) -> Result<bool, ModuleReadError> {
        assert!(!self.done, "module loader already finished");

        if select {
            self.selected.insert(name.clone());
        }

        let found = self.add_if_exists(name)?;
        if found {
            self.drain();
        }
        Ok(found)
    }

    fn add_if_exists(&mut self, name: &ModuleName) -> Result<bool, ModuleReadError> {
        if self.is_loaded(name) {
            return Ok(true);
        }

        match self.reader.read_module(name)? {
            Some(source) => {
                self.add_module(source);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn add_module(&mut self, source: Rc<ModuleSource>) {
        let name = source.name.clone();
        debug!("{} {name}", "Module".bold().bright_white());
        self.states.insert(name.clone(), ModuleState::Pending(source));
        self.queue.push_back(name);
    }

    fn drain(&mut self) {
        while let Some(name) = self.queue.pop_front() {
            self.build(&name);
        }
    }

    fn discover_tree(&mut self, root: &ModuleName, test: bool) -> Result<(), ModuleReadError> {
        let source = self.reader.read_module(root)?;
        let is_file_module = source.as_ref().is_some_and(|s| !s.directory);

        if let Some(source) = source {
            self.discovered(source, root, test);
        }

        if !is_file_module {
            self.discover_sub_tree(root, root, test)?;
        }
        Ok(())
    }

    fn discover_sub_tree(&mut self, name: &ModuleName, root: &ModuleName, test: bool) -> Result<(), ModuleReadError> {
        for source in self.reader.file_sub_modules(name) {
            self.discovered(source, root, test);
        }

        for sub_name in self.reader.dir_sub_modules(name) {
            if let Some(source) = self.reader.read_module(&sub_name)? {
                self.discovered(source, root, test);
            }
            self.discover_sub_tree(&sub_name, root, test)?;
        }
        Ok(())
    }

    fn discovered(&mut self, source: Rc<ModuleSource>, root: &ModuleName, test: bool) {
        let is_test = source
            .header()
            .is_some_and(|h| h.modifiers.annotations.iter().any(|a| a.name.as_str() == "test"));

        let matches = is_test == test;
        if matches {
            self.selected.insert(source.name.clone());
        }

        if (matches || source.name == *root) && !self.is_loaded(&source.name) {
            self.add_module(source);
        }
    }

    /// Nearest existing ancestor of `name`, loading it if necessary. Failures
    /// while probing ancestors are ignored.
    fn find_parent(&mut self, name: &ModuleName) -> Option<ModuleName> {
        for ancestor in name.ancestors() {
            if self.is_loaded(&ancestor) {
                return Some(ancestor);
            }

            if let Ok(Some(source)) = self.reader.read_module(&ancestor) {
                self.add_module(source);
                return Some(ancestor);
            }
        }
        None
    }

    fn build(&mut self, name: &ModuleName) {
        let source = match self.states.get(name) {
            Some(ModuleState::Pending(source)) => source.clone(),
            _ => return,
        };
        self.states.insert(name.clone(), ModuleState::Loading);

        let header = source.header().map(|header| {
            let values = ModifierValues::compile(&header.modifiers, ModifierTarget::Module, self.reader.report_mut());
            (header.loc, values)
        });

        let is_test = header.as_ref().is_some_and(|(_, v)| v.test.is_some());
        let parent = if is_test { None } else { self.find_parent(name) };

        let parent_mount = match &parent {
            Some(parent) => {
                self.build(parent);
                match self.states.get(parent) {
                    Some(ModuleState::Loaded(module)) => module.mount.clone(),
                    _ => MountName::empty(),
                }
            }
            None => MountName::empty(),
        };

        let mut mount = parent_mount.clone();
        let mid_header = header.map(|(loc, values)| {
            if let Some(annotation) = &values.mount {
                if is_test {
                    self.reader.report_mut().error(
                        annotation.loc,
                        "ann:mount:test_module",
                        "Cannot specify a mount name for a test module",
                    );
                } else if let Some(m) =
                    annotation.calculate(&parent_mount, name.last(), ModifierTarget::Module, self.reader.report_mut())
                {
                    mount = m;
                }
            }

            MidHeader {
                loc,
                mount: values.mount.clone(),
                is_abstract: values.is_abstract,
                external: values.external.is_some(),
                test: is_test,
            }
        });

        let mut imports = Vec::new();
        let files = source
            .files
            .iter()
            .map(|file| {
                let members = match &file.ast {
                    Some(ast) => self.mid_members(&ast.members, &mut imports),
                    None => Vec::new(),
                };
                MidFile {
                    path: file.path.clone(),
                    source: file.source,
                    start: file.ast.as_ref().map(|ast| ast.loc),
                    members,
                }
            })
            .collect();

        let module = MidModule {
            name: name.clone(),
            parent,
            mount,
            header: mid_header,
            files,
            directory: source.directory,
            test_dependency: self.loading_test_dependencies,
            selected: false,
        };

        self.states.insert(name.clone(), ModuleState::Loaded(module));

        for (target, loc) in imports {
            self.load_import(&target, loc);
        }
    }

    /// Loads the import target, or its deepest existing ancestor.
    fn load_import(&mut self, target: &ModuleName, loc: Loc) {
        let mut current = target.clone();
        loop {
            match self.add_if_exists(&current) {
                Ok(true) => return,
                Ok(false) => match current.parent() {
                    Some(parent) => current = parent,
                    None => return,
                },
                Err(e) => {
                    self.reader.report_mut().error(loc, e.code(), e.to_string());
                    return;
                }
            }
        }
    }

    fn mid_members(&mut self, members: &[ast::Member], imports: &mut Vec<(ModuleName, Loc)>) -> Vec<MidMember> {
        members
            .iter()
            .map(|member| self.mid_member(member, imports))
            .collect()
    }

    fn mid_member(&mut self, member: &ast::Member, imports: &mut Vec<(ModuleName, Loc)>) -> MidMember {
        let report = self.reader.report_mut();

        match member {
            ast::Member::Definition(def) => {
                let target = match def.kind {
                    DefinitionKind::Function => ModifierTarget::Function,
                    DefinitionKind::Entity => ModifierTarget::Entity,
                    DefinitionKind::Struct => ModifierTarget::Struct,
                    DefinitionKind::Operation => ModifierTarget::Operation,
                    DefinitionKind::Query => ModifierTarget::Query,
                };
                let modifiers = ModifierValues::compile(&def.modifiers, target, report);

                if def.name.len() > 1 && modifiers.is_override.is_none() {
                    report.error(
                        def.name.loc(),
                        format!("def:name:qualified:{}", def.name),
                        format!("Name of {} '{}' cannot be qualified", def.kind, def.name),
                    );
                }

                MidMember::Definition(Rc::new(MidDefinition {
                    def: def.clone(),
                    modifiers,
                }))
            }
            ast::Member::Import(import) => {
                let modifiers = ModifierValues::compile(&import.modifiers, ModifierTarget::Import, report);
                let module = ModuleName::from_parts(import.path.strs());
                imports.push((module.clone(), import.loc));

                MidMember::Import(Rc::new(MidImport {
                    loc: import.loc,
                    alias: import.alias.clone(),
                    module,
                    path: import.path.clone(),
                    target: import.target.clone(),
                    modifiers,
                }))
            }
            ast::Member::Namespace(ns) => {
                let modifiers = ModifierValues::compile(&ns.modifiers, ModifierTarget::Namespace, report);
                let members = self.mid_members(&ns.members, imports);

                MidMember::Namespace(Rc::new(MidNamespace {
                    loc: ns.loc,
                    name: ns.name.clone(),
                    modifiers,
                    members,
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use knit_vfs::MemorySourceTree;

    fn loader(files: &[(&str, &str)]) -> ModuleLoader<MemorySourceTree> {
        let mut tree = MemorySourceTree::new();
        for (path, text) in files {
            tree.add_file(*path, *text);
        }
        ModuleLoader::new(tree)
    }

    fn name(s: &str) -> ModuleName {
        ModuleName::parse(s).unwrap()
    }

    fn names(modules: &[MidModule]) -> Vec<String> {
        modules.iter().map(|m| m.name.to_string()).collect()
    }

    fn find<'a>(modules: &'a [MidModule], n: &str) -> &'a MidModule {
        modules.iter().find(|m| m.name.to_string() == n).unwrap()
    }

    #[test]
    fn loads_imports_transitively_once() {
        let mut loader = loader(&[
            ("app.knit", "module; import a; import b;"),
            ("a.knit", "module; import c;"),
            ("b.knit", "module; import c; import b;"),
            ("c.knit", "module; import a;"),
        ]);

        assert!(loader.load_module(&name("app")).unwrap());
        assert!(!loader.load_module(&name("missing")).unwrap());

        let modules = loader.finish();
        assert_eq!(names(&modules), vec!["app", "a", "b", "c"]);
        assert!(find(&modules, "app").selected);
        assert!(!find(&modules, "c").selected);
    }

    #[test]
    fn loading_twice_is_idempotent() {
        let mut loader = loader(&[("app.knit", "module; import a;"), ("a.knit", "module;")]);

        assert!(loader.load_module(&name("app")).unwrap());
        assert!(loader.load_module(&name("app")).unwrap());
        assert!(loader.load_module(&name("a")).unwrap());

        let modules = loader.finish();
        assert_eq!(names(&modules), vec!["app", "a"]);
        assert!(find(&modules, "a").selected);
    }

    #[test]
    fn links_nearest_existing_ancestor() {
        let mut loader = loader(&[
            ("lib/module.knit", "@mount(\"lib\") module;"),
            ("lib/x/y.knit", "module; entity e;"),
        ]);

        loader.load_module(&name("lib.x.y")).unwrap();
        let modules = loader.finish();

        let y = find(&modules, "lib.x.y");
        assert_eq!(y.parent, Some(name("lib")));
        assert_eq!(y.mount.to_string(), "lib");
        assert!(find(&modules, "lib").parent.is_none());
    }

    #[test]
    fn module_mount_is_relative_to_parent() {
        let mut loader = loader(&[
            ("module.knit", "@mount(\"root\") module;"),
            ("a.knit", "@mount(\".a\") module;"),
            ("b.knit", "@mount(\"top.\") module;"),
        ]);

        loader.load_module(&name("a")).unwrap();
        loader.load_module(&name("b")).unwrap();
        let modules = loader.finish();

        assert_eq!(find(&modules, "a").mount.to_string(), "root.a");
        assert_eq!(find(&modules, "b").mount.to_string(), "top.b");
        assert_eq!(find(&modules, "").mount.to_string(), "root");
    }

    #[test]
    fn loads_test_modules_of_a_subtree() {
        let mut loader = loader(&[
            ("lib.knit", "module; function f() {}"),
            ("tests/t1.knit", "@test module; import lib;"),
            ("tests/t2.knit", "@test module;"),
            ("tests/helper.knit", "module;"),
            ("other/t3.knit", "@test module;"),
        ]);

        loader.load_test_modules(&name("tests")).unwrap();
        let modules = loader.finish();

        assert_eq!(names(&modules), vec!["tests.t1", "tests.t2", "lib"]);
        let t1 = find(&modules, "tests.t1");
        assert!(t1.selected && t1.is_test() && t1.parent.is_none());
        assert!(t1.test_dependency);
        assert!(!find(&modules, "lib").selected);
    }

    #[test]
    fn loads_all_regular_modules() {
        let mut loader = loader(&[
            ("main.knit", "function f() {}"),
            ("lib/a.knit", "module;"),
            ("lib/b/module.knit", "module;"),
            ("t.knit", "@test module;"),
        ]);

        loader.load_all_modules(&ModuleName::root(), false).unwrap();
        let modules = loader.finish();

        let mut loaded = names(&modules);
        loaded.sort();
        assert_eq!(loaded, vec!["", "lib.a", "lib.b"]);
        assert!(modules.iter().all(|m| m.selected));
    }

    #[test]
    fn import_of_missing_module_loads_deepest_ancestor() {
        let mut loader = loader(&[("app.knit", "module; import lib.x.y;"), ("lib.knit", "module;")]);

        loader.load_module(&name("app")).unwrap();
        let modules = loader.finish();

        assert_eq!(names(&modules), vec!["app", "lib"]);
    }

    #[test]
    fn reports_file_dir_conflict_at_import() {
        let mut loader = loader(&[
            ("app.knit", "module; import lib;"),
            ("lib.knit", "module;"),
            ("lib/a.knit", "function f() {}"),
        ]);

        loader.load_module(&name("app")).unwrap();
        loader.finish();

        assert_eq!(loader.report_mut().codes(), vec!["import:file_dir:lib"]);
    }

    #[test]
    fn header_modifiers_are_compiled_once() {
        let mut loader = loader(&[
            ("lib.knit", "@test @mount(\"x\") abstract module; override function f();"),
            ("app.knit", "module; import lib;"),
        ]);

        loader.load_module(&name("app")).unwrap();
        let modules = loader.finish();

        let lib = find(&modules, "lib");
        assert!(lib.is_test() && lib.is_abstract());
        assert_eq!(loader.report_mut().codes(), vec!["ann:mount:test_module"]);
    }

    #[test]
    #[should_panic(expected = "already finished")]
    fn finish_twice_panics() {
        let mut loader = loader(&[]);
        loader.finish();
        loader.finish();
    }
}
