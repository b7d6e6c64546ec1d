//! Name tables of modules and namespaces.

use ecow::EcoString;
use indexmap::IndexMap;
use std::{
    collections::HashSet,
    ops::{Index, IndexMut},
};

use knit_modules::ModuleKey;
use knit_span::Loc;
use knit_syntax::ast::Ident;
use knit_utils::define_id;

use crate::{
    context::MessageContext,
    def::{DeclarationType, DefId, Definitions, QualifiedName},
};

define_id!(ScopeId);
define_id!(ExactId);

/// What a name stands for. Two entries denote the same thing exactly when
/// their kinds are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    Def(DefId),
    /// User namespace, merged across files and declarations.
    Namespace(ScopeId),
    /// Imported module, the root scope of its table.
    Module(ScopeId),
    /// Not yet resolved exact import.
    Exact(ExactId),
}

impl EntryKind {
    pub fn scope(self) -> Option<ScopeId> {
        match self {
            EntryKind::Namespace(scope) | EntryKind::Module(scope) => Some(scope),
            _ => None,
        }
    }

    pub fn declaration_type(self, defs: &Definitions) -> DeclarationType {
        match self {
            EntryKind::Def(def) => defs[def].declaration_type(),
            EntryKind::Namespace(_) => DeclarationType::Namespace,
            EntryKind::Module(_) | EntryKind::Exact(_) => DeclarationType::Import,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub name: Ident,
    pub kind: EntryKind,
}

#[derive(Debug, Clone)]
pub struct Scope {
    pub id: ScopeId,
    pub module: ModuleKey,
    pub parent: Option<ScopeId>,
    pub path: QualifiedName,
    pub entries: IndexMap<EcoString, Vec<Entry>>,
    /// Root scopes of wildcard imported modules, consulted for names without
    /// an own entry.
    pub wildcards: Vec<ScopeId>,
}

impl Scope {
    /// Distinct kinds declared under `name`, in declaration order.
    pub fn kinds(&self, name: &str) -> Vec<EntryKind> {
        let mut kinds = Vec::new();
        for entry in self.entries.get(name).into_iter().flatten() {
            if !kinds.contains(&entry.kind) {
                kinds.push(entry.kind);
            }
        }
        kinds
    }

    pub fn add_wildcard(&mut self, scope: ScopeId) {
        if !self.wildcards.contains(&scope) {
            self.wildcards.push(scope);
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Scopes {
    scopes: Vec<Scope>,
}

impl Scopes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, module: ModuleKey, parent: Option<ScopeId>, path: QualifiedName) -> ScopeId {
        let id = ScopeId::from_usize(self.scopes.len());
        self.scopes.push(Scope {
            id,
            module,
            parent,
            path,
            entries: IndexMap::new(),
            wildcards: Vec::new(),
        });
        id
    }

    pub fn add_entry(&mut self, scope: ScopeId, entry: Entry) {
        self[scope]
            .entries
            .entry(entry.name.text.clone())
            .or_default()
            .push(entry);
    }

    /// Namespace `name` inside `scope`, merged with an earlier namespace of
    /// the same name. Every declaration gets its own entry, located at its name.
    pub fn namespace(&mut self, scope: ScopeId, name: &Ident) -> ScopeId {
        let existing = self[scope]
            .entries
            .get(name.as_str())
            .into_iter()
            .flatten()
            .find_map(|entry| match entry.kind {
                EntryKind::Namespace(ns) => Some(ns),
                _ => None,
            });

        let ns = existing.unwrap_or_else(|| {
            let module = self[scope].module.clone();
            let path = self[scope].path.child(name.text.clone());
            self.add(module, Some(scope), path)
        });

        self.add_entry(
            scope,
            Entry {
                name: name.clone(),
                kind: EntryKind::Namespace(ns),
            },
        );
        ns
    }

    pub fn get(&self, id: ScopeId) -> Option<&Scope> {
        self.scopes.get(id.as_usize())
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Scope> {
        self.scopes.iter()
    }
}

impl Index<ScopeId> for Scopes {
    type Output = Scope;

    fn index(&self, id: ScopeId) -> &Self::Output {
        &self.scopes[id.as_usize()]
    }
}

impl IndexMut<ScopeId> for Scopes {
    fn index_mut(&mut self, id: ScopeId) -> &mut Self::Output {
        &mut self.scopes[id.as_usize()]
    }
}

/// `import m.{a.b}` or `import m.{x: a.b}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExactImport {
    pub id: ExactId,
    /// Module the path is resolved in.
    pub module: ModuleKey,
    /// Root scope of `module`.
    pub root: ScopeId,
    pub path: Vec<Ident>,
}

impl ExactImport {
    pub fn loc(&self) -> Loc {
        self.last().loc
    }

    pub fn last(&self) -> &Ident {
        &self.path[self.path.len() - 1]
    }

    /// `module!a.b`, or just `a.b` for the root module.
    pub fn full_name(&self) -> String {
        let path = self
            .path
            .iter()
            .map(Ident::as_str)
            .collect::<Vec<_>>()
            .join(".");

        let module = self.module.to_string();
        if module.is_empty() {
            path
        } else {
            format!("{module}!{path}")
        }
    }
}

/// Reports names declared more than once in one scope with different
/// meanings. Both sides of a conflict are reported, each position at most
/// once.
pub fn check_conflicts(scopes: &Scopes, defs: &Definitions, ctx: &mut MessageContext) {
    for scope in scopes.iter() {
        let mut reported = HashSet::<Loc>::new();

        for entries in scope.entries.values() {
            let Some((old, rest)) = entries.split_first() else {
                continue;
            };

            for entry in rest {
                if old.kind == entry.kind {
                    continue;
                }

                if reported.insert(old.name.loc) {
                    report_conflict(old, entry, defs, ctx);
                }
                if reported.insert(entry.name.loc) {
                    report_conflict(entry, old, defs, ctx);
                }
            }
        }
    }
}

fn report_conflict(entry: &Entry, other: &Entry, defs: &Definitions, ctx: &mut MessageContext) {
    let name = &entry.name;
    let kind = other.kind.declaration_type(defs);
    let other_pos = ctx.pos(other.name.loc);
    let other_line = ctx.line(other.name.loc);

    ctx.error(
        name.loc,
        format!("name_conflict:user:{name}:{kind}:{other_pos}"),
        format!("Name conflict: {} '{name}' defined at {other_line}", kind.msg()),
    );
}
