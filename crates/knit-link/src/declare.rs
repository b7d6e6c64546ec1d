//! Declaration of the compiled modules.
//!
//! Every [`ExtModule`] gets a root scope, then its members are entered:
//! definitions into the [`Definitions`] arena and their scope, namespaces as
//! merged sub-scopes, imports as module entries, exact imports or wildcards.
//! Everything referring to other names (override targets, attribute types)
//! is only recorded here and resolved once all modules are declared.

use ecow::EcoString;
use indexmap::IndexMap;
use log::{debug, trace};
use owo_colors::OwoColorize;
use std::{collections::HashMap, rc::Rc};

use knit_modules::{
    ChainName, ExtImport, ExtMember, ExtModule, ExtNamespace, MidDefinition, ModifierTarget, ModuleKey, MountAnnotation,
    MountName,
};
use knit_pass::Executor;
use knit_span::{Loc, Report};
use knit_syntax::ast::{Attribute, DefinitionKind, Ident, ImportTarget, Path};

use crate::{
    context::MessageContext,
    def::{DefId, Definition, Definitions, QualifiedName, Stamp},
    function::{AbstractFunction, OverrideFunction},
    module::{FileInfo, ModuleImport, ModuleInfo, Modules},
    mount::{MountEntry, MountKind},
    scope::{Entry, EntryKind, ExactId, ExactImport, ScopeId, Scopes},
};

/// `override function p.f()`, to be resolved from `scope`.
#[derive(Debug, Clone)]
pub struct OverrideRef {
    pub scope: ScopeId,
    pub path: Path,
    pub function: Rc<OverrideFunction>,
}

/// Attribute of an entity or struct whose type is looked up from `scope`.
#[derive(Debug, Clone)]
pub struct AttributeRef {
    pub scope: ScopeId,
    pub owner: DefId,
    pub attribute: Attribute,
}

/// Everything declared for a run.
#[derive(Debug, Default)]
pub struct Declarations {
    pub defs: Definitions,
    pub scopes: Scopes,
    pub exacts: Vec<ExactImport>,
    pub modules: Modules,
    pub overrides: Vec<OverrideRef>,
    pub attributes: Vec<AttributeRef>,
    pub abstracts: IndexMap<DefId, Rc<AbstractFunction>>,
}

#[derive(Debug, Clone)]
struct MemberContext {
    module: ModuleKey,
    is_abstract: bool,
    scope: ScopeId,
    mount: MountName,
}

pub struct Declarer<'a> {
    executor: &'a Executor,
    stamp: Stamp,
    ctx: &'a mut MessageContext,
    decls: Declarations,
    roots: HashMap<ModuleKey, ScopeId>,
}

impl<'a> Declarer<'a> {
    pub fn new(executor: &'a Executor, stamp: Stamp, ctx: &'a mut MessageContext) -> Self {
        Self {
            executor,
            stamp,
            ctx,
            decls: Declarations::default(),
            roots: HashMap::new(),
        }
    }

    /// Declares `modules`. Must run before [`knit_pass::Pass::Members`].
    pub fn declare(mut self, modules: &[ExtModule]) -> Declarations {
        debug!("{} {} modules", "Declaring".bold().bright_white(), modules.len());

        for module in modules {
            let key = module.key();
            let root = self.decls.scopes.add(key.clone(), None, QualifiedName::new());
            self.roots.insert(key, root);
        }

        for module in modules {
            self.declare_module(module);
        }

        self.decls
    }

    fn declare_module(&mut self, module: &ExtModule) {
        let key = module.key();
        let root = self.roots[&key];
        trace!("Declaring module {key}");

        let ctx = MemberContext {
            module: key.clone(),
            is_abstract: module.module.is_abstract(),
            scope: root,
            mount: module.module.mount.clone(),
        };

        let files = module
            .files
            .iter()
            .map(|file| {
                let mut info = FileInfo {
                    path: file.path.clone(),
                    ..FileInfo::default()
                };
                self.declare_members(&ctx, &file.members, &mut info);
                info
            })
            .collect();

        self.decls.modules.insert(
            key.clone(),
            ModuleInfo {
                key,
                root,
                is_abstract: ctx.is_abstract,
                files,
            },
        );
    }

    fn declare_members(&mut self, ctx: &MemberContext, members: &[ExtMember], file: &mut FileInfo) {
        for member in members {
            match member {
                ExtMember::Definition { def, chain } => self.declare_definition(ctx, def, chain.as_ref(), file),
                ExtMember::Import(import) => self.declare_import(ctx, import, file),
                ExtMember::Namespace(ns) => self.declare_namespace(ctx, ns, file),
            }
        }
    }

    fn declare_definition(
        &mut self,
        ctx: &MemberContext,
        mid: &MidDefinition,
        chain: Option<&ChainName>,
        file: &mut FileInfo,
    ) {
        let def = &mid.def;
        let name = def.name.last().clone();
        let is_override = def.kind == DefinitionKind::Function && mid.modifiers.is_override.is_some();

        let qualified = def
            .name
            .parts
            .iter()
            .fold(self.decls.scopes[ctx.scope].path.clone(), |q, part| q.child(part.text.clone()));

        let mount = mount_kind(def.kind).and_then(|_| self.definition_mount(ctx, mid, &name));

        let stamp = self.stamp;
        let id = self.decls.defs.insert_with(|id| Definition {
            id,
            kind: def.kind,
            name: name.clone(),
            qualified,
            module: ctx.module.clone(),
            chain: chain.cloned(),
            mount: mount.clone(),
            attributes: def.attributes.clone(),
            stamp,
        });

        if is_override {
            let function = Rc::new(OverrideFunction::new(self.executor, id, def.name.first().loc));
            file.overrides.push(function.clone());
            self.decls.overrides.push(OverrideRef {
                scope: ctx.scope,
                path: def.name.clone(),
                function,
            });
            return;
        }

        self.decls.scopes.add_entry(
            ctx.scope,
            Entry {
                name: name.clone(),
                kind: EntryKind::Def(id),
            },
        );

        match def.kind {
            DefinitionKind::Function => {
                if let Some(loc) = mid.modifiers.is_abstract {
                    self.declare_abstract(ctx, id, def.body, loc, file);
                }
            }
            DefinitionKind::Entity | DefinitionKind::Struct => {
                for attribute in &def.attributes {
                    self.decls.attributes.push(AttributeRef {
                        scope: ctx.scope,
                        owner: id,
                        attribute: attribute.clone(),
                    });
                }
            }
            DefinitionKind::Operation | DefinitionKind::Query => {}
        }

        if let (Some(kind), Some(mount)) = (mount_kind(def.kind), mount) {
            let chain = match kind {
                MountKind::Entity => chain,
                MountKind::Operation | MountKind::Query => None,
            };

            file.mounts.add(
                chain,
                MountEntry {
                    kind,
                    def_name: self.decls.defs[id].app_level_name(),
                    simple_name: name.text.clone(),
                    loc: Some(name.loc),
                    mount,
                    stamp,
                    def: Some(id),
                },
            );
        }
    }

    fn declare_abstract(
        &mut self,
        ctx: &MemberContext,
        id: DefId,
        has_body: bool,
        loc: Loc,
        file: &mut FileInfo,
    ) {
        let def = &self.decls.defs[id];

        if !ctx.is_abstract {
            self.ctx.error(
                loc,
                format!("fn:abstract:non_abstract_module:{}:{}", ctx.module.name, def.qualified),
                "Abstract function can be defined only in abstract module",
            );
            return;
        }

        let function = Rc::new(AbstractFunction::new(
            self.executor,
            id,
            def.app_level_name(),
            def.loc(),
            has_body,
        ));
        file.abstracts.push(function.clone());
        self.decls.abstracts.insert(id, function);
    }

    /// Mount name from the `@mount` annotation, else the namespace mount
    /// followed by the simple name.
    fn definition_mount(&mut self, ctx: &MemberContext, mid: &MidDefinition, name: &Ident) -> Option<MountName> {
        let target = match mid.def.kind {
            DefinitionKind::Entity => ModifierTarget::Entity,
            DefinitionKind::Operation => ModifierTarget::Operation,
            DefinitionKind::Query => ModifierTarget::Query,
            DefinitionKind::Function => ModifierTarget::Function,
            DefinitionKind::Struct => ModifierTarget::Struct,
        };

        match &mid.modifiers.mount {
            Some(annotation) => self.calculate_mount(annotation, &ctx.mount, Some(name.as_str()), target),
            None => Some(ctx.mount.child(name.text.clone())),
        }
    }

    fn calculate_mount(
        &mut self,
        annotation: &MountAnnotation,
        parent: &MountName,
        name: Option<&str>,
        target: ModifierTarget,
    ) -> Option<MountName> {
        let mut report = Report::new();
        let mount = annotation.calculate(parent, name, target, &mut report);
        self.ctx.absorb(report);
        mount
    }

    fn declare_import(&mut self, ctx: &MemberContext, import: &ExtImport, file: &mut FileInfo) {
        if !import.found {
            return;
        }

        let key = import.target_key();
        let Some(&root) = self.roots.get(&key) else {
            return;
        };

        let mid = &import.import;
        file.imports.push(ModuleImport {
            module: key.clone(),
            loc: mid.loc,
        });

        match &mid.target {
            ImportTarget::Module => {
                let name = mid.alias.clone().unwrap_or_else(|| mid.path.last().clone());
                self.decls.scopes.add_entry(
                    ctx.scope,
                    Entry {
                        name,
                        kind: EntryKind::Module(root),
                    },
                );
            }
            ImportTarget::Exact(items) => {
                let scope = self.import_scope(ctx, mid.alias.as_ref());
                for item in items {
                    let id = ExactId::from_usize(self.decls.exacts.len());
                    self.decls.exacts.push(ExactImport {
                        id,
                        module: key.clone(),
                        root,
                        path: item.path.parts.clone(),
                    });
                    self.decls.scopes.add_entry(
                        scope,
                        Entry {
                            name: item.visible_name().clone(),
                            kind: EntryKind::Exact(id),
                        },
                    );
                }
            }
            ImportTarget::Wildcard(_) => {
                let scope = self.import_scope(ctx, mid.alias.as_ref());
                self.decls.scopes[scope].add_wildcard(root);
            }
        }
    }

    /// `import a: m.{..}` and `import a: m.*` declare into namespace `a`.
    fn import_scope(&mut self, ctx: &MemberContext, alias: Option<&Ident>) -> ScopeId {
        match alias {
            Some(alias) => self.decls.scopes.namespace(ctx.scope, alias),
            None => ctx.scope,
        }
    }

    fn declare_namespace(&mut self, ctx: &MemberContext, ns: &ExtNamespace, file: &mut FileInfo) {
        let name = ns.ns.name.as_ref();

        let mut scope = ctx.scope;
        for part in name.into_iter().flat_map(|path| &path.parts) {
            scope = self.decls.scopes.namespace(scope, part);
        }

        let default_mount = || {
            let parts = name.into_iter().flat_map(|path| path.strs()).map(EcoString::from);
            ctx.mount.append(&MountName::from_parts(parts))
        };

        let mount = match &ns.mount {
            Some(annotation) => {
                let last = name.map(|path| path.last().as_str());
                self.calculate_mount(annotation, &ctx.mount, last, ModifierTarget::Namespace)
                    .unwrap_or_else(default_mount)
            }
            None => default_mount(),
        };

        let inner = MemberContext {
            module: ctx.module.clone(),
            is_abstract: ctx.is_abstract,
            scope,
            mount,
        };
        self.declare_members(&inner, &ns.members, file);
    }
}

fn mount_kind(kind: DefinitionKind) -> Option<MountKind> {
    match kind {
        DefinitionKind::Entity => Some(MountKind::Entity),
        DefinitionKind::Operation => Some(MountKind::Operation),
        DefinitionKind::Query => Some(MountKind::Query),
        DefinitionKind::Function | DefinitionKind::Struct => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use knit_modules::{MidModuleCompiler, ModuleLoader, ModuleName};
    use knit_pass::Scheduler;
    use knit_vfs::MemorySourceTree;

    struct Declared {
        decls: Declarations,
        report: Report,
    }

    fn declare(files: &[(&str, &str)], root: &str) -> Declared {
        let mut tree = MemorySourceTree::new();
        for (path, text) in files {
            tree.add_file(*path, *text);
        }

        let name = ModuleName::parse(root).unwrap();
        let mut loader = ModuleLoader::new(tree);
        loader.load_module(&name).unwrap();
        let modules = loader.finish();
        let (sources, mut report) = loader.into_parts();

        let mut compiler = MidModuleCompiler::new(modules);
        compiler.compile_module(&name, None, &mut report);
        let ext = compiler.finish();

        let scheduler = Scheduler::new();
        let mut ctx = MessageContext::new(Rc::new(sources));
        let decls = Declarer::new(scheduler.executor(), Stamp::from_usize(0), &mut ctx).declare(&ext);
        report.merge(ctx.into_report());

        Declared { decls, report }
    }

    fn def<'d>(decls: &'d Declarations, qualified: &str) -> &'d Definition {
        decls
            .defs
            .iter()
            .find(|d| d.qualified.to_string() == qualified)
            .unwrap()
    }

    #[test]
    fn namespaces_nest_scopes_and_mounts() {
        let d = declare(
            &[(
                "app.knit",
                "module;\n\
                 namespace a.b { entity user { name: text; } }\n\
                 @mount(\"x\") namespace c { operation op() {} }\n\
                 query q() {}",
            )],
            "app",
        );
        assert!(d.report.is_empty(), "{:?}", d.report.codes());

        let decls = &d.decls;
        let user = def(decls, "a.b.user");
        assert_eq!(user.mount.as_ref().unwrap().to_string(), "a.b.user");
        assert_eq!(def(decls, "c.op").mount.as_ref().unwrap().to_string(), "x.op");
        assert_eq!(def(decls, "q").mount.as_ref().unwrap().to_string(), "q");

        let root = decls.modules[0].root;
        let EntryKind::Namespace(a) = decls.scopes[root].kinds("a")[0] else {
            panic!("a is not a namespace");
        };
        assert_eq!(decls.scopes[a].kinds("b").len(), 1);

        assert_eq!(decls.attributes.len(), 1);
        assert_eq!(decls.attributes[0].owner, user.id);
    }

    #[test]
    fn imports_declare_entries() {
        let d = declare(
            &[
                (
                    "app.knit",
                    "module;\n\
                     import lib;\n\
                     import l: lib;\n\
                     import lib.{f, g: h};\n\
                     import w: lib.*;",
                ),
                ("lib.knit", "module; function f() {} function h() {}"),
            ],
            "app",
        );
        assert!(d.report.is_empty(), "{:?}", d.report.codes());

        let decls = &d.decls;
        let app = &decls.modules[&ModuleKey::local(ModuleName::parse("app").unwrap())];
        let lib = &decls.modules[&ModuleKey::local(ModuleName::parse("lib").unwrap())];
        let scope = &decls.scopes[app.root];

        assert_eq!(scope.kinds("lib"), vec![EntryKind::Module(lib.root)]);
        assert_eq!(scope.kinds("l"), vec![EntryKind::Module(lib.root)]);
        assert!(matches!(scope.kinds("f")[..], [EntryKind::Exact(_)]));
        assert!(matches!(scope.kinds("g")[..], [EntryKind::Exact(_)]));

        let EntryKind::Namespace(w) = scope.kinds("w")[0] else {
            panic!("w is not a namespace");
        };
        assert_eq!(decls.scopes[w].wildcards, vec![lib.root]);

        assert_eq!(decls.exacts.len(), 2);
        assert_eq!(decls.exacts[1].full_name(), "lib!h");
        assert_eq!(app.files[0].imports.len(), 4);
    }

    #[test]
    fn functions_and_overrides() {
        let d = declare(
            &[
                (
                    "app.knit",
                    "module;\nimport lib;\nabstract function a();\noverride function lib.f() {}",
                ),
                ("lib.knit", "abstract module; abstract function f(); abstract function g() {}"),
            ],
            "app",
        );

        assert_eq!(d.report.codes(), vec!["fn:abstract:non_abstract_module:app:a"]);

        let decls = &d.decls;
        assert_eq!(decls.abstracts.len(), 2);
        let names = decls.abstracts.values().map(|f| f.name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["lib:f", "lib:g"]);
        assert!(!decls.abstracts.values().next().unwrap().has_body);

        assert_eq!(decls.overrides.len(), 1);
        assert_eq!(decls.overrides[0].path.to_string(), "lib.f");

        let app = &decls.modules[0];
        assert_eq!(app.files[0].overrides.len(), 1);
        assert!(decls.scopes[app.root].entries.get("f").is_none());
    }

    #[test]
    fn mounted_definitions_enter_the_tables() {
        let d = declare(
            &[(
                "app.knit",
                "module;\n\
                 entity user {}\n\
                 @mount(\"accounts.\") operation create() {}\n\
                 @external(\"other\") namespace ext { entity remote {} query q() {} }",
            )],
            "app",
        );
        assert!(d.report.is_empty(), "{:?}", d.report.codes());

        let mounts = &d.decls.modules[0].files[0].mounts;
        let local = mounts.chain("").unwrap();
        let entities = local
            .entries(MountKind::Entity)
            .iter()
            .map(|e| e.mount.to_string())
            .collect::<Vec<_>>();
        assert_eq!(entities, vec!["user"]);
        assert_eq!(local.entries(MountKind::Operation)[0].mount.to_string(), "accounts.create");
        assert_eq!(local.entries(MountKind::Query)[0].mount.to_string(), "ext.q");

        let other = mounts.chain("other").unwrap();
        assert_eq!(other.entries(MountKind::Entity)[0].def_name, "app:ext.remote");
    }
}
