//! Linking of a whole program.
//!
//! The work is split over the passes of a [`Scheduler`]:
//!
//! - `Imports`: selected mid modules are compiled into external modules
//! - `Modules`: every external module is declared
//! - `Members`: name conflicts, exact imports, override targets and
//!   attribute types are resolved
//! - `AbstractOverride`: overrides are bound to abstract functions
//! - `Expressions`: abstract functions fix their implementation
//! - `Validation`: entity cycles and mount name conflicts are checked

use indexmap::IndexMap;
use log::debug;
use owo_colors::OwoColorize;
use std::{cell::RefCell, rc::Rc};

use knit_modules::{ExtModule, MidModule, MidModuleCompiler};
use knit_pass::{Executor, Pass, Scheduler};
use knit_span::{Report, SourceManager};
use knit_syntax::ast::DefinitionKind;

use crate::{
    abstracts::OverrideResolver,
    context::MessageContext,
    declare::{Declarations, Declarer},
    def::{DefId, Definition, Definitions, Stamp},
    entity::{is_builtin_type, EntityGraph},
    imports::{ExactCache, ImportResolver},
    module::Modules,
    mount::{MountResolver, MountTables},
    options::CompilerOptions,
    scope::{check_conflicts, EntryKind},
};

/// Result of linking a program.
#[derive(Debug, Default)]
pub struct LinkedApp {
    pub defs: Definitions,
    pub modules: Modules,
    /// Surviving mount entries per chain and kind.
    pub mounts: MountTables,
    /// Entities with referenced entities first, `None` when they form a cycle.
    pub entity_order: Option<Vec<DefId>>,
    /// Effective implementation of every abstract function.
    pub implementations: IndexMap<DefId, Option<DefId>>,
    pub report: Report,
}

impl LinkedApp {
    /// Looks a definition up by its program-wide name, e.g. `lib:ns.f`.
    pub fn find(&self, app_level_name: &str) -> Option<&Definition> {
        self.defs.iter().find(|def| def.app_level_name() == app_level_name)
    }
}

#[derive(Debug, Default)]
struct LinkState {
    ctx: MessageContext,
    mid: Vec<MidModule>,
    ext: Vec<ExtModule>,
    decls: Declarations,
    entities: EntityGraph,
    mounts: MountTables,
    entity_order: Option<Vec<DefId>>,
}

#[derive(Debug, Clone)]
pub struct AppLinker {
    options: CompilerOptions,
    stamp: Stamp,
}

impl AppLinker {
    pub fn new(options: CompilerOptions) -> Self {
        Self {
            options,
            stamp: Stamp::from_usize(0),
        }
    }

    pub fn options(&self) -> &CompilerOptions {
        &self.options
    }

    /// Links the selected modules of `modules` and everything they import.
    pub fn link(&self, modules: Vec<MidModule>, sources: Rc<SourceManager>) -> LinkedApp {
        debug!("{} {} modules", "Linking".bold().bright_white(), modules.len());

        let scheduler = Scheduler::new();
        let executor = scheduler.executor().clone();

        let state = Rc::new(RefCell::new(LinkState {
            ctx: MessageContext::new(sources),
            mid: modules,
            ..LinkState::default()
        }));

        self.schedule(&executor, &state);
        scheduler.run();

        let LinkState {
            ctx,
            decls,
            mounts,
            entity_order,
            ..
        } = state.take();

        let implementations = decls
            .abstracts
            .iter()
            .map(|(&id, function)| (id, function.implementation().get()))
            .collect();

        LinkedApp {
            defs: decls.defs,
            modules: decls.modules,
            mounts,
            entity_order,
            implementations,
            report: ctx.into_report(),
        }
    }

    fn schedule(&self, executor: &Executor, state: &Rc<RefCell<LinkState>>) {
        {
            let state = state.clone();
            executor.on_pass(Pass::Imports, move || compile_modules(&mut state.borrow_mut()));
        }
        {
            let (state, task_executor, stamp) = (state.clone(), executor.clone(), self.stamp);
            executor.on_pass(Pass::Modules, move || {
                let state = &mut *state.borrow_mut();
                let ext = std::mem::take(&mut state.ext);
                state.decls = Declarer::new(&task_executor, stamp, &mut state.ctx).declare(&ext);
            });
        }
        {
            let state = state.clone();
            executor.on_pass(Pass::Members, move || resolve_members(&mut state.borrow_mut()));
        }
        {
            let (state, options) = (state.clone(), self.options.clone());
            executor.on_pass(Pass::AbstractOverride, move || {
                let state = &mut *state.borrow_mut();
                let overridden = OverrideResolver::new(&state.decls.modules, &options, &mut state.ctx).resolve();
                debug!("{} {} abstract functions", "Overridden".bold().bright_white(), overridden.len());
            });
        }
        {
            let state = state.clone();
            executor.on_pass(Pass::Expressions, move || {
                for function in state.borrow().decls.abstracts.values() {
                    function.resolve_implementation();
                }
            });
        }
        {
            let (state, options, stamp) = (state.clone(), self.options.clone(), self.stamp);
            executor.on_pass(Pass::Validation, move || {
                let state = &mut *state.borrow_mut();

                if state.entities.check_cycles(&state.decls.defs, &mut state.ctx) {
                    state.entity_order = state.entities.order();
                }

                state.mounts = MountResolver::new(&options, stamp, &mut state.ctx)
                    .resolve_modules(&state.decls.modules);
            });
        }
    }
}

fn compile_modules(state: &mut LinkState) {
    let modules = std::mem::take(&mut state.mid);
    let selected = modules
        .iter()
        .filter(|module| module.selected)
        .map(|module| module.name.clone())
        .collect::<Vec<_>>();

    let mut compiler = MidModuleCompiler::new(modules);
    let mut report = Report::new();
    for name in &selected {
        compiler.compile_module(name, None, &mut report);
    }

    state.ctx.absorb(report);
    state.ext = compiler.finish();
    debug!("{} {} external modules", "Compiled".bold().bright_white(), state.ext.len());
}

fn resolve_members(state: &mut LinkState) {
    let LinkState {
        ctx, decls, entities, ..
    } = state;

    check_conflicts(&decls.scopes, &decls.defs, ctx);

    let mut cache = ExactCache::new();
    let mut resolver = ImportResolver::new(&decls.scopes, &decls.exacts, &mut cache, ctx);
    resolver.resolve_all();

    for over in &decls.overrides {
        let target = match resolver.lookup(over.scope, &over.path) {
            Some(EntryKind::Def(id)) if decls.defs[id].kind == DefinitionKind::Function => {
                match decls.abstracts.get(&id) {
                    Some(function) => Some(function.clone()),
                    None => {
                        let name = decls.defs[id].app_level_name();
                        resolver.ctx().error(
                            over.path.first().loc,
                            format!("fn:override:not_abstract:[{name}]"),
                            format!("Function is not abstract: '{name}'"),
                        );
                        None
                    }
                }
            }
            Some(_) => {
                let path = &over.path;
                resolver.ctx().error(
                    path.first().loc,
                    format!("fn:override:not_found:{path}"),
                    format!("Function not found: '{path}'"),
                );
                None
            }
            None => None,
        };
        over.function.set_target(target);
    }

    for def in decls.defs.iter() {
        if def.kind == DefinitionKind::Entity {
            entities.add_entity(def.id);
        }
    }

    for attr in &decls.attributes {
        let ty = &attr.attribute.ty;
        if ty.len() == 1 && is_builtin_type(ty.first().as_str()) {
            continue;
        }

        match resolver.lookup(attr.scope, ty) {
            Some(EntryKind::Def(id)) if matches!(decls.defs[id].kind, DefinitionKind::Entity | DefinitionKind::Struct) => {
                let owner = &decls.defs[attr.owner];
                if owner.kind == DefinitionKind::Entity && decls.defs[id].kind == DefinitionKind::Entity {
                    entities.add_reference(owner.id, id);
                }
            }
            Some(_) => {
                resolver.ctx().error(
                    ty.first().loc,
                    format!("unknown_type:{ty}"),
                    format!("Unknown type: '{ty}'"),
                );
            }
            None => {}
        }
    }
}
