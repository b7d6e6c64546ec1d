//! Binding of overrides to abstract functions.
//!
//! Overrides are collected per file from the file itself and from every
//! module reachable through its imports. Conflicts are reported per file,
//! per module and finally for the whole program, where the first override of
//! each abstract function is bound. Abstract functions without a default
//! body that no override reaches are reported at the imports bringing them in.

use indexmap::{map::Entry, IndexMap};
use log::debug;
use owo_colors::OwoColorize;
use std::{collections::HashSet, rc::Rc};

use knit_modules::{ModuleKey, ModuleName};
use knit_span::Loc;
use knit_utils::graph::walk;

use crate::{
    context::MessageContext,
    def::DefId,
    function::{AbstractFunction, OverrideFunction},
    module::{FileInfo, ModuleImport, ModuleInfo, Modules},
    options::CompilerOptions,
};

/// Where an override was found, directly or through an import.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Location {
    import: Option<(ModuleName, Loc)>,
    fn_module: ModuleName,
    fn_loc: Loc,
}

#[derive(Debug, Clone)]
struct OverrideEntry {
    target: Rc<AbstractFunction>,
    over: Rc<OverrideFunction>,
    locations: Vec<Location>,
}

pub struct OverrideResolver<'a> {
    modules: &'a Modules,
    options: &'a CompilerOptions,
    ctx: &'a mut MessageContext,
    error_locations: HashSet<Location>,
    error_overrides: HashSet<DefId>,
    error_abstracts: HashSet<DefId>,
}

impl<'a> OverrideResolver<'a> {
    pub fn new(modules: &'a Modules, options: &'a CompilerOptions, ctx: &'a mut MessageContext) -> Self {
        Self {
            modules,
            options,
            ctx,
            error_locations: HashSet::new(),
            error_overrides: HashSet::new(),
            error_abstracts: HashSet::new(),
        }
    }

    /// Binds overrides and reports conflicts and missing overrides. Returns
    /// the abstract functions that got an override.
    ///
    /// Must run during [`knit_pass::Pass::AbstractOverride`].
    pub fn resolve(mut self) -> HashSet<DefId> {
        debug!("{} {} modules", "Overrides".bold().bright_white(), self.modules.len());

        let overridden = self.process_app();

        let modules = self.modules;
        for module in modules.values().filter(|m| !m.is_abstract) {
            self.process_non_abstract_module(module);
        }

        // Runs after every importer, so abstracts already reported at an
        // import are skipped.
        if !self.options.ide {
            for module in modules.values().filter(|m| m.is_abstract) {
                for file in &module.files {
                    self.process_file_extra(file, &overridden);
                }
            }
        }

        overridden
    }

    fn process_app(&mut self) -> HashSet<DefId> {
        let modules = self.modules;

        let mut entries = Vec::new();
        for module in modules.values() {
            entries.extend(self.process_module(module));
        }

        let mut overridden = HashSet::new();
        for entry in self.process_conflicts(entries, true) {
            if let Some(target) = entry.over.bind() {
                overridden.insert(target.def);
            }
        }
        overridden
    }

    fn process_module(&mut self, module: &ModuleInfo) -> Vec<OverrideEntry> {
        let mut entries = Vec::new();
        for file in &module.files {
            let collected = self.collect_overrides(module, file);
            entries.extend(self.process_conflicts(collected, false));
        }
        self.process_conflicts(entries, false)
    }

    fn collect_overrides(&self, module: &ModuleInfo, file: &FileInfo) -> Vec<OverrideEntry> {
        let mut visited = HashSet::from([module.key.clone()]);
        let mut entries = Vec::new();

        for import in &file.imports {
            let mut found = Vec::new();
            for imported in self.imported_modules(import, &mut visited, false) {
                for imported_file in &imported.files {
                    direct_overrides(Some(import), imported, imported_file, &mut found);
                }
            }

            let mut targets = HashSet::new();
            entries.extend(found.into_iter().filter(|e| targets.insert(e.target.def)));
        }

        direct_overrides(None, module, file, &mut entries);
        entries
    }

    /// Reports every group of overrides of one abstract function and keeps
    /// the first of each group.
    fn process_conflicts(&mut self, entries: Vec<OverrideEntry>, app_level: bool) -> Vec<OverrideEntry> {
        let mut pairs = IndexMap::<(DefId, DefId), OverrideEntry>::new();
        for entry in entries {
            match pairs.entry((entry.target.def, entry.over.def)) {
                Entry::Occupied(mut e) => e.get_mut().locations.extend(entry.locations),
                Entry::Vacant(e) => {
                    e.insert(entry);
                }
            }
        }

        let mut groups = IndexMap::<DefId, Vec<OverrideEntry>>::new();
        for entry in pairs.into_values() {
            groups.entry(entry.target.def).or_default().push(entry);
        }

        let mut survivors = Vec::new();
        for group in groups.into_values() {
            if group.len() >= 2 {
                for (i, entry) in group.iter().enumerate() {
                    if !self.error_overrides.insert(entry.over.def) && app_level {
                        continue;
                    }
                    let other = if i == 0 { &group[1] } else { &group[0] };
                    self.process_conflict(entry, other);
                }
            }
            survivors.extend(group.into_iter().next());
        }
        survivors
    }

    fn process_conflict(&mut self, entry: &OverrideEntry, other: &OverrideEntry) {
        let other_location = &other.locations[0];
        for location in &entry.locations {
            if !self.error_locations.insert(location.clone()) {
                continue;
            }

            let f = &entry.target.name;
            let code1 = self.location_code(location);
            let code2 = self.location_code(other_location);
            let msg2 = self.location_msg(other_location);
            let message = match &location.import {
                Some(_) => format!(
                    "Override conflict: override for function '{f}' defined at {} and at {msg2}",
                    self.location_msg(location)
                ),
                None => format!("Override conflict: override for function '{f}' defined at {msg2}"),
            };

            let loc = location.import.as_ref().map_or(location.fn_loc, |(_, loc)| *loc);
            self.ctx
                .error(loc, format!("override:conflict:[{f}]:[{code1}]:[{code2}]"), message);
        }
    }

    fn location_code(&self, location: &Location) -> String {
        let import = match &location.import {
            Some((module, _)) => format!("import:{module}"),
            None => "direct".to_owned(),
        };
        format!("{import}:{}:{}", location.fn_module, self.ctx.line(location.fn_loc))
    }

    fn location_msg(&self, location: &Location) -> String {
        let line = self.ctx.line(location.fn_loc);
        match &location.import {
            Some((module, loc)) => format!("{line} (via import {module} at {})", self.ctx.line(*loc)),
            None => line,
        }
    }

    fn process_non_abstract_module(&mut self, module: &ModuleInfo) {
        let mut all = HashSet::new();
        for file in &module.files {
            all.extend(override_targets(file));
            for (_, imported) in self.imported_files(file, false) {
                all.extend(override_targets(imported));
            }
        }

        for file in &module.files {
            for (import, imported) in self.imported_files(file, true) {
                for target in &imported.abstracts {
                    if !target.has_body && !all.contains(&target.def) {
                        self.missing_override(import, target);
                    }
                }
            }
        }
    }

    fn missing_override(&mut self, import: &ModuleImport, target: &AbstractFunction) {
        let f = &target.name;
        let line = self.ctx.line(target.loc);
        self.ctx.error(
            import.loc,
            format!("override:missing:[{f}]:[{line}]"),
            format!("No override for abstract function '{f}' (defined at {line})"),
        );
        self.error_abstracts.insert(target.def);
    }

    fn process_file_extra(&mut self, file: &FileInfo, overridden: &HashSet<DefId>) {
        for target in &file.abstracts {
            if target.has_body || overridden.contains(&target.def) || self.error_abstracts.contains(&target.def) {
                continue;
            }
            let f = &target.name;
            self.ctx.error(
                target.loc,
                format!("override:missing:[{f}]"),
                format!("No override for abstract function '{f}'"),
            );
        }
    }

    /// Files of the modules reachable from the imports of `file`, paired with
    /// the import they were reached through.
    fn imported_files<'f>(&self, file: &'f FileInfo, abstract_only: bool) -> Vec<(&'f ModuleImport, &'a FileInfo)> {
        let mut visited = HashSet::new();
        let mut files = Vec::new();
        for import in &file.imports {
            for module in self.imported_modules(import, &mut visited, abstract_only) {
                files.extend(module.files.iter().map(|f| (import, f)));
            }
        }
        files
    }

    /// Modules reachable through `import` not visited yet, in depth first
    /// order. With `abstract_only` non-abstract modules end the walk.
    fn imported_modules(
        &self,
        import: &ModuleImport,
        visited: &mut HashSet<ModuleKey>,
        abstract_only: bool,
    ) -> Vec<&'a ModuleInfo> {
        let modules = self.modules;

        let keys = walk([import.module.clone()], visited, |key| {
            let module = modules.get(key)?;
            if abstract_only && !module.is_abstract {
                return None;
            }
            Some(
                module
                    .files
                    .iter()
                    .flat_map(|f| f.imports.iter().map(|i| i.module.clone()))
                    .collect(),
            )
        });

        keys.iter().filter_map(|key| modules.get(key)).collect()
    }
}

fn direct_overrides(
    import: Option<&ModuleImport>,
    module: &ModuleInfo,
    file: &FileInfo,
    out: &mut Vec<OverrideEntry>,
) {
    for over in &file.overrides {
        let Some(target) = over.target() else {
            continue;
        };

        out.push(OverrideEntry {
            target,
            over: over.clone(),
            locations: vec![Location {
                import: import.map(|i| (i.module.name.clone(), i.loc)),
                fn_module: module.name().clone(),
                fn_loc: over.loc,
            }],
        });
    }
}

fn override_targets(file: &FileInfo) -> impl Iterator<Item = DefId> + '_ {
    file.overrides.iter().filter_map(|over| over.target()).map(|target| target.def)
}

#[cfg(test)]
mod tests {
    use super::*;
    use knit_modules::ModuleName;
    use knit_pass::{Pass, Scheduler};
    use knit_span::{Report, SourceId, SourceManager, Span};
    use std::cell::RefCell;

    use crate::scope::ScopeId;

    const LINE: usize = 5;

    fn key(name: &str) -> ModuleKey {
        ModuleKey::local(ModuleName::parse(name).unwrap())
    }

    fn at(source: SourceId, line: usize) -> Loc {
        let start = (line - 1) * LINE;
        Loc::new(source, Span::new(start, start + 1))
    }

    struct Fixture {
        scheduler: Scheduler,
        sources: SourceManager,
        modules: Modules,
        defs: usize,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                scheduler: Scheduler::new(),
                sources: SourceManager::new(),
                modules: Modules::new(),
                defs: 0,
            }
        }

        /// Single file module, importing `imports` on its first lines.
        fn module(&mut self, name: &str, is_abstract: bool, imports: &[&str]) -> SourceId {
            let path = format!("{name}.knit");
            let source = self.sources.insert(path.as_str(), "line\n".repeat(10));

            let imports = imports
                .iter()
                .enumerate()
                .map(|(i, module)| ModuleImport {
                    module: key(module),
                    loc: at(source, i + 1),
                })
                .collect();

            self.modules.insert(
                key(name),
                ModuleInfo {
                    key: key(name),
                    root: ScopeId::from_usize(self.modules.len()),
                    is_abstract,
                    files: vec![FileInfo {
                        path: path.into(),
                        imports,
                        ..FileInfo::default()
                    }],
                },
            );
            source
        }

        fn next_def(&mut self) -> DefId {
            self.defs += 1;
            DefId::from_usize(self.defs)
        }

        fn abstract_fn(&mut self, module: &str, name: &str, line: usize, has_body: bool) -> Rc<AbstractFunction> {
            let def = self.next_def();
            let source = self.source(module);
            let function = Rc::new(AbstractFunction::new(
                self.scheduler.executor(),
                def,
                format!("{module}:{name}"),
                at(source, line),
                has_body,
            ));
            self.modules[&key(module)].files[0].abstracts.push(function.clone());
            function
        }

        fn override_fn(&mut self, module: &str, line: usize, target: &Rc<AbstractFunction>) -> Rc<OverrideFunction> {
            let def = self.next_def();
            let source = self.source(module);
            let over = Rc::new(OverrideFunction::new(self.scheduler.executor(), def, at(source, line)));

            let (task_over, target) = (over.clone(), target.clone());
            self.scheduler
                .executor()
                .on_pass(Pass::Members, move || task_over.set_target(Some(target)));

            self.modules[&key(module)].files[0].overrides.push(over.clone());
            over
        }

        fn source(&self, module: &str) -> SourceId {
            let path = format!("{module}.knit");
            self.sources.lookup(camino::Utf8Path::new(&path)).unwrap()
        }

        fn run(self, options: CompilerOptions) -> Report {
            let Fixture {
                scheduler,
                sources,
                modules,
                ..
            } = self;

            let report = Rc::new(RefCell::new(Report::new()));
            {
                let report = report.clone();
                scheduler.executor().on_pass(Pass::AbstractOverride, move || {
                    let mut ctx = MessageContext::new(Rc::new(sources));
                    OverrideResolver::new(&modules, &options, &mut ctx).resolve();
                    *report.borrow_mut() = ctx.into_report();
                });
            }
            scheduler.run();
            report.take()
        }
    }

    #[test]
    fn overrides_reached_through_two_imports_conflict() {
        let mut fx = Fixture::new();
        fx.module("app", false, &["imp1", "imp2"]);
        fx.module("imp1", false, &["lib"]);
        fx.module("imp2", false, &["lib"]);
        fx.module("lib", true, &[]);

        let f = fx.abstract_fn("lib", "f", 2, false);
        let o1 = fx.override_fn("imp1", 2, &f);
        fx.override_fn("imp2", 2, &f);

        let report = fx.run(CompilerOptions::default());

        assert_eq!(
            report.codes(),
            vec![
                "override:conflict:[lib:f]:[import:imp1:imp1:imp1.knit:2]:[import:imp2:imp2:imp2.knit:2]",
                "override:conflict:[lib:f]:[import:imp2:imp2:imp2.knit:2]:[import:imp1:imp1:imp1.knit:2]",
            ]
        );
        assert_eq!(
            report.diagnostics[0].message,
            "Override conflict: override for function 'lib:f' defined at imp1.knit:2 \
             (via import imp1 at app.knit:1) and at imp2.knit:2 (via import imp2 at app.knit:2)"
        );
        assert_eq!(f.overridden(), Some(o1.def));
    }

    #[test]
    fn two_overrides_in_one_file_conflict() {
        let mut fx = Fixture::new();
        fx.module("app", false, &["lib"]);
        fx.module("lib", true, &[]);

        let f = fx.abstract_fn("lib", "f", 2, false);
        let o1 = fx.override_fn("app", 2, &f);
        fx.override_fn("app", 3, &f);

        let report = fx.run(CompilerOptions::default());

        assert_eq!(
            report.codes(),
            vec![
                "override:conflict:[lib:f]:[direct:app:app.knit:2]:[direct:app:app.knit:3]",
                "override:conflict:[lib:f]:[direct:app:app.knit:3]:[direct:app:app.knit:2]",
            ]
        );
        assert_eq!(
            report.diagnostics[0].message,
            "Override conflict: override for function 'lib:f' defined at app.knit:3"
        );
        assert_eq!(f.overridden(), Some(o1.def));
    }

    #[test]
    fn missing_overrides_are_reported_at_the_import() {
        let mut fx = Fixture::new();
        fx.module("app", false, &["lib"]);
        fx.module("lib", true, &[]);
        fx.module("lib2", true, &[]);

        fx.abstract_fn("lib", "f", 2, false);
        fx.abstract_fn("lib", "g", 3, true);
        fx.abstract_fn("lib2", "h", 2, false);

        let report = fx.run(CompilerOptions::default());
        assert_eq!(
            report.codes(),
            vec!["override:missing:[lib:f]:[lib.knit:2]", "override:missing:[lib2:h]"]
        );
        assert_eq!(
            report.diagnostics[0].message,
            "No override for abstract function 'lib:f' (defined at lib.knit:2)"
        );
    }

    #[test]
    fn abstract_module_before_its_importer() {
        let mut fx = Fixture::new();
        fx.module("lib", true, &[]);
        fx.module("app", false, &["lib"]);

        fx.abstract_fn("lib", "f", 2, false);

        let report = fx.run(CompilerOptions::default());
        assert_eq!(report.codes(), vec!["override:missing:[lib:f]:[lib.knit:2]"]);
    }

    #[test]
    fn override_reached_through_a_diamond_does_not_conflict() {
        let mut fx = Fixture::new();
        fx.module("app", false, &["x", "y"]);
        fx.module("x", false, &["imp"]);
        fx.module("y", false, &["imp"]);
        fx.module("imp", false, &["lib"]);
        fx.module("lib", true, &[]);

        let f = fx.abstract_fn("lib", "f", 2, false);
        let over = fx.override_fn("imp", 2, &f);

        let report = fx.run(CompilerOptions::default());
        assert!(report.codes().is_empty());
        assert_eq!(f.overridden(), Some(over.def));
    }

    #[test]
    fn conflict_reached_through_a_diamond_is_reported_once() {
        let mut fx = Fixture::new();
        fx.module("app", false, &["x", "y"]);
        fx.module("x", false, &["imp"]);
        fx.module("y", false, &["imp"]);
        fx.module("imp", false, &["lib"]);
        fx.module("lib", true, &[]);

        let f = fx.abstract_fn("lib", "f", 2, false);
        let o1 = fx.override_fn("imp", 2, &f);
        fx.override_fn("app", 3, &f);

        let report = fx.run(CompilerOptions::default());
        assert_eq!(
            report.codes(),
            vec![
                "override:conflict:[lib:f]:[import:x:imp:imp.knit:2]:[direct:app:app.knit:3]",
                "override:conflict:[lib:f]:[direct:app:app.knit:3]:[import:x:imp:imp.knit:2]",
            ]
        );
        assert_eq!(f.overridden(), Some(o1.def));
    }

    #[test]
    fn unreached_abstract_functions_are_not_reported_in_ide_mode() {
        let mut fx = Fixture::new();
        fx.module("app", false, &["lib"]);
        fx.module("lib", true, &[]);
        fx.module("lib2", true, &[]);

        fx.abstract_fn("lib", "f", 2, false);
        fx.abstract_fn("lib2", "h", 2, false);

        let options = CompilerOptions {
            ide: true,
            ..CompilerOptions::default()
        };
        assert_eq!(fx.run(options).codes(), vec!["override:missing:[lib:f]:[lib.knit:2]"]);
    }

    #[test]
    fn override_must_be_reachable_from_the_importing_module() {
        let mut fx = Fixture::new();
        fx.module("app", false, &["lib"]);
        fx.module("imp", false, &["lib"]);
        fx.module("lib", true, &[]);

        let f = fx.abstract_fn("lib", "f", 2, false);
        let over = fx.override_fn("imp", 2, &f);

        let report = fx.run(CompilerOptions::default());

        assert_eq!(report.codes(), vec!["override:missing:[lib:f]:[lib.knit:2]"]);
        assert_eq!(f.overridden(), Some(over.def));
    }
}
