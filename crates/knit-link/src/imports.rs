//! Resolution of names through scopes and imports.
//!
//! Own entries of a scope shadow whatever wildcard imports bring in. Exact
//! imports are resolved lazily and memoized, a chain of exact imports leading
//! back to its start is reported as a recursion on the import it started at.

use log::trace;
use std::collections::{HashMap, HashSet, VecDeque};

use knit_syntax::ast::{Ident, Path};

use crate::{
    context::MessageContext,
    scope::{EntryKind, ExactId, ExactImport, ScopeId, Scopes},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FindError {
    Unknown,
    Ambiguous,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExactError {
    /// Already reported.
    Failed,
    /// The import is being resolved further up the stack.
    InProgress,
}

/// Memoized results of exact imports, kept across resolver instances.
#[derive(Debug, Default)]
pub struct ExactCache {
    done: HashMap<ExactId, Option<EntryKind>>,
}

impl ExactCache {
    pub fn new() -> Self {
        Self::default()
    }
}

pub struct ImportResolver<'a> {
    scopes: &'a Scopes,
    exacts: &'a [ExactImport],
    cache: &'a mut ExactCache,
    ctx: &'a mut MessageContext,
    resolving: HashSet<ExactId>,
}

impl<'a> ImportResolver<'a> {
    pub fn new(
        scopes: &'a Scopes,
        exacts: &'a [ExactImport],
        cache: &'a mut ExactCache,
        ctx: &'a mut MessageContext,
    ) -> Self {
        Self {
            scopes,
            exacts,
            cache,
            ctx,
            resolving: HashSet::new(),
        }
    }

    pub fn ctx(&mut self) -> &mut MessageContext {
        self.ctx
    }

    /// Resolves every exact import, reporting what cannot be resolved.
    pub fn resolve_all(&mut self) {
        let exacts = self.exacts;
        for exact in exacts {
            let _ = self.resolve_exact(exact.id);
        }
    }

    /// What exact import `id` finally denotes, `None` if it failed.
    pub fn exact_target(&mut self, id: ExactId) -> Option<EntryKind> {
        self.resolve_exact(id).ok()
    }

    /// Resolves a reference written in `scope`: the first part is looked up
    /// in `scope` and its parents, the rest inside namespaces. Failures are
    /// reported as unknown names.
    pub fn lookup(&mut self, scope: ScopeId, path: &Path) -> Option<EntryKind> {
        let first = path.first();

        let mut current = Some(scope);
        let mut found = None;
        while let Some(s) = current {
            match self.find(s, first.as_str()) {
                Ok(kind) => {
                    found = Some(kind);
                    break;
                }
                Err(FindError::Ambiguous) => break,
                Err(FindError::Unknown) => current = self.scopes[s].parent,
            }
        }

        let Some(kind) = found else {
            self.unknown_name(path, 0);
            return None;
        };
        let mut kind = self.follow(kind)?;

        for (i, part) in path.parts.iter().enumerate().skip(1) {
            let Some(ns) = kind.scope() else {
                self.unknown_name(path, i);
                return None;
            };
            let Ok(next) = self.find(ns, part.as_str()) else {
                self.unknown_name(path, i);
                return None;
            };
            kind = self.follow(next)?;
        }

        Some(kind)
    }

    fn unknown_name(&mut self, path: &Path, index: usize) {
        let name = path.parts[..=index]
            .iter()
            .map(Ident::as_str)
            .collect::<Vec<_>>()
            .join(".");

        self.ctx.error(
            path.parts[index].loc,
            format!("unknown_name:{name}"),
            format!("Unknown name: '{name}'"),
        );
    }

    /// Replaces an exact import by its target.
    fn follow(&mut self, kind: EntryKind) -> Option<EntryKind> {
        match kind {
            EntryKind::Exact(id) => self.resolve_exact(id).ok(),
            kind => Some(kind),
        }
    }

    /// Own entries of `scope`, else a breadth first search through wildcard
    /// imports that stops once two candidates are known.
    fn find(&self, scope: ScopeId, name: &str) -> Result<EntryKind, FindError> {
        let own = self.scopes[scope].kinds(name);
        match own.as_slice() {
            [kind] => return Ok(*kind),
            [_, _, ..] => return Err(FindError::Ambiguous),
            [] => {}
        }

        let mut visited = HashSet::from([scope]);
        let mut queue = self.scopes[scope].wildcards.iter().copied().collect::<VecDeque<_>>();
        let mut found = Vec::new();

        while found.len() < 2 {
            let Some(current) = queue.pop_front() else {
                break;
            };
            if !visited.insert(current) {
                continue;
            }

            queue.extend(self.scopes[current].wildcards.iter().copied());
            for kind in self.scopes[current].kinds(name) {
                if !found.contains(&kind) {
                    found.push(kind);
                }
            }
        }

        match found.as_slice() {
            [kind] => Ok(*kind),
            [] => Err(FindError::Unknown),
            _ => Err(FindError::Ambiguous),
        }
    }

    fn find_reported(&mut self, scope: ScopeId, name: &Ident) -> Option<EntryKind> {
        match self.find(scope, name.as_str()) {
            Ok(kind) => Some(kind),
            Err(FindError::Unknown) => {
                self.ctx.error(
                    name.loc,
                    format!("import:name_unknown:{name}"),
                    format!("Unknown name: '{name}'"),
                );
                None
            }
            Err(FindError::Ambiguous) => {
                self.ctx.error(
                    name.loc,
                    format!("import:name_ambig:{name}"),
                    format!("Name '{name}' is ambiguous"),
                );
                None
            }
        }
    }

    /// Namespace or module named `name` inside `scope`.
    fn resolve_namespace(&mut self, scope: ScopeId, name: &Ident) -> Option<ScopeId> {
        let kind = match self.find_reported(scope, name)? {
            EntryKind::Exact(id) => match self.resolve_exact(id) {
                Ok(kind) => kind,
                Err(ExactError::InProgress) => {
                    self.ctx.error(
                        name.loc,
                        format!("import:recursion:{name}"),
                        format!("Name '{name}' is a recursive definition"),
                    );
                    return None;
                }
                Err(ExactError::Failed) => {
                    self.ctx.error(
                        name.loc,
                        format!("import:name_unresolved:{name}"),
                        format!("Cannot resolve name '{name}'"),
                    );
                    return None;
                }
            },
            kind => kind,
        };

        let ns = kind.scope();
        if ns.is_none() {
            self.ctx.error(
                name.loc,
                format!("import:not_ns:{name}"),
                format!("Name '{name}' is not a namespace"),
            );
        }
        ns
    }

    fn resolve_exact(&mut self, id: ExactId) -> Result<EntryKind, ExactError> {
        if let Some(done) = self.cache.done.get(&id) {
            return done.ok_or(ExactError::Failed);
        }
        if !self.resolving.insert(id) {
            return Err(ExactError::InProgress);
        }

        let result = self.resolve_exact_chain(id);
        self.resolving.remove(&id);

        trace!("Exact import {} resolved to {result:?}", self.exacts[id.as_usize()].full_name());
        self.cache.done.insert(id, result);
        result.ok_or(ExactError::Failed)
    }

    /// Follows exact imports pointing at other exact imports until something
    /// else is found.
    fn resolve_exact_chain(&mut self, id: ExactId) -> Option<EntryKind> {
        let exacts = self.exacts;
        let import = &exacts[id.as_usize()];

        let mut seen = HashSet::from([id]);
        let mut current = id;

        loop {
            let Some(kind) = self.resolve_exact_direct(current) else {
                if current != id {
                    self.exact_unresolved(import);
                }
                return None;
            };

            let EntryKind::Exact(next) = kind else {
                return Some(kind);
            };

            if next == id {
                let full = import.full_name();
                self.ctx.error(
                    import.loc(),
                    format!("import:exact:recursion:{full}"),
                    format!("Recursive import: '{full}' points to itself"),
                );
                return None;
            }

            if !seen.insert(next) {
                self.exact_unresolved(import);
                return None;
            }

            current = next;
        }
    }

    fn exact_unresolved(&mut self, import: &ExactImport) {
        let full = import.full_name();
        self.ctx.error(
            import.loc(),
            format!("import:exact:unresolved:{full}"),
            format!("Cannot resolve import: '{full}'"),
        );
    }

    /// The entry an exact import names in its module, possibly another exact
    /// import.
    fn resolve_exact_direct(&mut self, id: ExactId) -> Option<EntryKind> {
        let exacts = self.exacts;
        let import = &exacts[id.as_usize()];

        let (last, namespaces) = import.path.split_last()?;

        let mut scope = import.root;
        for part in namespaces {
            scope = self.resolve_namespace(scope, part)?;
        }

        self.find_reported(scope, last)
    }
}
