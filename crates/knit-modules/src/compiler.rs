use camino::Utf8PathBuf;
use indexmap::IndexMap;
use log::trace;
use std::{
    collections::{HashSet, VecDeque},
    rc::Rc,
};

use knit_span::{Loc, Report, SourceId};

use crate::{
    mid::{MidDefinition, MidImport, MidMember, MidModule, MidNamespace},
    modifiers::MountAnnotation,
    ChainName, ModuleKey, ModuleName,
};

/// A module bound to the chain it was imported under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtModule {
    pub module: Rc<MidModule>,
    pub chain: Option<ChainName>,
    pub files: Vec<ExtFile>,
}

impl ExtModule {
    pub fn key(&self) -> ModuleKey {
        ModuleKey::new(self.module.name.clone(), self.chain.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtFile {
    pub path: Utf8PathBuf,
    pub source: Option<SourceId>,
    pub members: Vec<ExtMember>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtMember {
    Definition {
        def: Rc<MidDefinition>,
        chain: Option<ChainName>,
    },
    Import(ExtImport),
    Namespace(ExtNamespace),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtImport {
    pub import: Rc<MidImport>,
    /// Chain the target module is imported under.
    pub chain: Option<ChainName>,
    /// Whether the target module exists.
    pub found: bool,
}

impl ExtImport {
    pub fn target_key(&self) -> ModuleKey {
        ModuleKey::new(self.import.module.clone(), self.chain.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtNamespace {
    pub ns: Rc<MidNamespace>,
    pub mount: Option<MountAnnotation>,
    pub chain: Option<ChainName>,
    pub members: Vec<ExtMember>,
}

/// Importing side of an import, for the checks that depend on it.
#[derive(Clone, Copy)]
struct ImportContext {
    test: bool,
    external: bool,
    repl: bool,
}

/// Turns loaded modules into [`ExtModule`]s, one per module and chain.
///
/// Every pair is processed at most once. Importing a module queues it with
/// the chain active at the import, its ancestors are queued first without a
/// chain.
#[derive(Debug)]
pub struct MidModuleCompiler {
    modules: IndexMap<ModuleName, Rc<MidModule>>,
    compiled: HashSet<ModuleKey>,
    queue: VecDeque<(Rc<MidModule>, Option<ChainName>)>,
    ext_modules: Vec<ExtModule>,
}

impl MidModuleCompiler {
    pub fn new(modules: impl IntoIterator<Item = MidModule>) -> Self {
        let modules = modules
            .into_iter()
            .map(|m| (m.name.clone(), Rc::new(m)))
            .collect();

        Self {
            modules,
            compiled: HashSet::new(),
            queue: VecDeque::new(),
            ext_modules: Vec::new(),
        }
    }

    pub fn module(&self, name: &ModuleName) -> Option<&Rc<MidModule>> {
        self.modules.get(name)
    }

    pub fn modules(&self) -> impl Iterator<Item = &Rc<MidModule>> {
        self.modules.values()
    }

    /// Compiles module `name` for `chain` together with its ancestors and
    /// everything it imports. Unknown modules are ignored.
    pub fn compile_module(&mut self, name: &ModuleName, chain: Option<ChainName>, report: &mut Report) {
        self.import_module(name, chain);
        self.process_queue(report);
    }

    /// Compiles members living outside of any module, such as an interactive
    /// session. Imports found there are compiled as well.
    pub fn compile_members(&mut self, members: &[MidMember], report: &mut Report) -> Vec<ExtMember> {
        let ctx = ImportContext {
            test: false,
            external: false,
            repl: true,
        };
        let members = self.compile_member_list(members, None, ctx, report);
        self.process_queue(report);
        members
    }

    pub fn finish(self) -> Vec<ExtModule> {
        self.ext_modules
    }

    fn import_module(&mut self, name: &ModuleName, chain: Option<ChainName>) {
        let Some(module) = self.modules.get(name).cloned() else {
            return;
        };

        let mut ancestors = Vec::new();
        let mut current = module.parent.as_ref().and_then(|p| self.modules.get(p));
        while let Some(parent) = current {
            ancestors.push(parent.clone());
            current = parent.parent.as_ref().and_then(|p| self.modules.get(p));
        }

        for ancestor in ancestors.into_iter().rev() {
            self.enqueue(ancestor, None);
        }
        self.enqueue(module, chain);
    }

    fn enqueue(&mut self, module: Rc<MidModule>, chain: Option<ChainName>) {
        let key = ModuleKey::new(module.name.clone(), chain.clone());
        if self.compiled.insert(key) {
            self.queue.push_back((module, chain));
        }
    }

    fn process_queue(&mut self, report: &mut Report) {
        while let Some((module, chain)) = self.queue.pop_front() {
            trace!("Compiling module {}", ModuleKey::new(module.name.clone(), chain.clone()));

            let ctx = ImportContext {
                test: module.is_test(),
                external: module.is_external(),
                repl: false,
            };

            let files = module
                .files
                .iter()
                .map(|file| ExtFile {
                    path: file.path.clone(),
                    source: file.source,
                    members: self.compile_member_list(&file.members, chain.clone(), ctx, report),
                })
                .collect();

            self.ext_modules.push(ExtModule {
                module,
                chain,
                files,
            });
        }
    }

    fn compile_member_list(
        &mut self,
        members: &[MidMember],
        chain: Option<ChainName>,
        ctx: ImportContext,
        report: &mut Report,
    ) -> Vec<ExtMember> {
        members
            .iter()
            .map(|member| self.compile_member(member, chain.clone(), ctx, report))
            .collect()
    }

    fn compile_member(
        &mut self,
        member: &MidMember,
        chain: Option<ChainName>,
        ctx: ImportContext,
        report: &mut Report,
    ) -> ExtMember {
        match member {
            MidMember::Definition(def) => ExtMember::Definition {
                def: def.clone(),
                chain,
            },
            MidMember::Import(import) => {
                let chain = import.modifiers.external_chain().cloned().or(chain);
                self.import_module(&import.module, chain.clone());
                let found = self.check_import(import, chain.is_some(), ctx, report);

                ExtMember::Import(ExtImport {
                    import: import.clone(),
                    chain,
                    found,
                })
            }
            MidMember::Namespace(ns) => {
                let chain = ns.modifiers.external_chain().cloned().or(chain);
                let members = self.compile_member_list(&ns.members, chain.clone(), ctx, report);

                ExtMember::Namespace(ExtNamespace {
                    ns: ns.clone(),
                    mount: ns.modifiers.mount.clone(),
                    chain,
                    members,
                })
            }
        }
    }

    fn check_import(&self, import: &MidImport, chained: bool, ctx: ImportContext, report: &mut Report) -> bool {
        let name = &import.module;
        let loc: Loc = import.loc;

        let Some(target) = self.modules.get(name) else {
            report.error(loc, format!("import:not_found:{name}"), format!("Module '{name}' not found"));
            return false;
        };

        if (chained || ctx.external) && !target.is_external() {
            report.error(
                loc,
                format!("import:module_not_external:{name}"),
                format!("Module '{name}' is not external"),
            );
        }

        if target.is_test() && !(ctx.test || ctx.repl) {
            report.error(
                loc,
                format!("import:module_test:{name}"),
                format!("Cannot import a test module '{name}' from a non-test module"),
            );
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ModuleLoader;
    use knit_vfs::MemorySourceTree;

    fn load(files: &[(&str, &str)], roots: &[&str]) -> (Vec<MidModule>, Report) {
        let mut tree = MemorySourceTree::new();
        for (path, text) in files {
            tree.add_file(*path, *text);
        }

        let mut loader = ModuleLoader::new(tree);
        for root in roots {
            loader.load_module(&ModuleName::parse(root).unwrap()).unwrap();
        }
        let modules = loader.finish();
        let (_, report) = loader.into_parts();
        (modules, report)
    }

    fn keys(modules: &[ExtModule]) -> Vec<String> {
        modules.iter().map(|m| m.key().to_string()).collect()
    }

    #[test]
    fn compiles_each_key_once() {
        let (modules, _) = load(
            &[
                ("app.knit", "module; import lib; import lib; @external(\"other\") import lib;"),
                ("lib.knit", "@external module; import app;"),
            ],
            &["app"],
        );

        let mut compiler = MidModuleCompiler::new(modules);
        let mut report = Report::new();
        compiler.compile_module(&ModuleName::parse("app").unwrap(), None, &mut report);

        let ext = compiler.finish();
        assert_eq!(keys(&ext), vec!["app", "lib", "lib[other]", "app[other]"]);
    }

    #[test]
    fn ancestors_come_first_without_chain() {
        let (modules, _) = load(
            &[
                ("module.knit", "module;"),
                ("a/module.knit", "module;"),
                ("a/b.knit", "@external module;"),
            ],
            &["a.b"],
        );

        let mut compiler = MidModuleCompiler::new(modules);
        let mut report = Report::new();
        let chain = Some(ChainName::new("c"));
        compiler.compile_module(&ModuleName::parse("a.b").unwrap(), chain, &mut report);

        assert_eq!(keys(&compiler.finish()), vec!["", "a", "a.b[c]"]);
        assert!(report.is_empty());
    }

    #[test]
    fn namespaces_carry_their_chain() {
        let (modules, _) = load(
            &[
                ("app.knit", "module; @external(\"x\") namespace ns { import lib; entity e; }"),
                ("lib.knit", "@external module;"),
            ],
            &["app"],
        );

        let mut compiler = MidModuleCompiler::new(modules);
        let mut report = Report::new();
        compiler.compile_module(&ModuleName::parse("app").unwrap(), None, &mut report);
        let ext = compiler.finish();

        let ExtMember::Namespace(ns) = &ext[0].files[0].members[0] else {
            panic!("expected a namespace");
        };
        assert_eq!(ns.chain, Some(ChainName::new("x")));

        let ExtMember::Import(import) = &ns.members[0] else {
            panic!("expected an import");
        };
        assert_eq!(import.target_key().to_string(), "lib[x]");
        assert!(import.found);

        let ExtMember::Definition { chain, .. } = &ns.members[1] else {
            panic!("expected a definition");
        };
        assert_eq!(chain, &Some(ChainName::new("x")));
        assert_eq!(keys(&ext), vec!["app", "lib[x]"]);
    }

    #[test]
    fn reports_import_errors() {
        let (modules, _) = load(
            &[
                ("app.knit", "module; import missing; import t; @external(\"x\") import lib;"),
                ("lib.knit", "module;"),
                ("t.knit", "@test module;"),
            ],
            &["app"],
        );

        let mut compiler = MidModuleCompiler::new(modules);
        let mut report = Report::new();
        compiler.compile_module(&ModuleName::parse("app").unwrap(), None, &mut report);

        assert_eq!(
            report.codes(),
            vec![
                "import:not_found:missing",
                "import:module_test:t",
                "import:module_not_external:lib",
            ]
        );
    }

    #[test]
    fn session_members_may_import_test_modules() {
        let (modules, _) = load(&[("t.knit", "@test module;")], &["t"]);
        let import = MidMember::Import(Rc::new(MidImport {
            loc: modules[0].header.as_ref().unwrap().loc,
            alias: None,
            module: ModuleName::parse("t").unwrap(),
            path: knit_syntax::ast::Path::new(vec![knit_syntax::ast::Ident::new(
                "t",
                modules[0].header.as_ref().unwrap().loc,
            )]),
            target: knit_syntax::ast::ImportTarget::Module,
            modifiers: Default::default(),
        }));

        let mut compiler = MidModuleCompiler::new(modules);
        let mut report = Report::new();
        let members = compiler.compile_members(&[import], &mut report);

        assert_eq!(members.len(), 1);
        assert!(report.is_empty());
        assert_eq!(keys(&compiler.finish()), vec!["t"]);
    }
}
