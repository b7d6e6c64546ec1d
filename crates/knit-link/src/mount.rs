//! Mount name tables and their conflicts.
//!
//! Every external chain (the local one keyed `""`) has one table per
//! [`MountKind`]. System entries have no location and always win; among user
//! entries sharing a mount name the first one survives and every other one is
//! reported. Tables are resolved per file, then per module and last for the
//! whole program, each stage seeing only the survivors of the one before.

use derive_more::Display;
use ecow::EcoString;
use indexmap::IndexMap;
use log::debug;

use knit_modules::{ChainName, MountName};
use knit_span::Loc;

use crate::{
    context::MessageContext,
    def::{DefId, Stamp},
    module::Modules,
    options::CompilerOptions,
};

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MountKind {
    #[display("ENTITY")]
    Entity,
    #[display("OPERATION")]
    Operation,
    #[display("QUERY")]
    Query,
}

impl MountKind {
    pub const ALL: [MountKind; 3] = [MountKind::Entity, MountKind::Operation, MountKind::Query];

    pub fn msg(self) -> &'static str {
        match self {
            MountKind::Entity => "entity",
            MountKind::Operation => "operation",
            MountKind::Query => "query",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    pub kind: MountKind,
    /// Program-wide name of the definition.
    pub def_name: String,
    pub simple_name: EcoString,
    /// Absent for system definitions.
    pub loc: Option<Loc>,
    pub mount: MountName,
    pub stamp: Stamp,
    pub def: Option<DefId>,
}

impl MountEntry {
    pub fn system(kind: MountKind, name: &str, stamp: Stamp) -> Self {
        Self {
            kind,
            def_name: name.to_owned(),
            simple_name: name.into(),
            loc: None,
            mount: MountName::from_parts([name]),
            stamp,
            def: None,
        }
    }

    pub fn is_system(&self) -> bool {
        self.loc.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChainMounts {
    tables: IndexMap<MountKind, Vec<MountEntry>>,
}

impl ChainMounts {
    pub fn entries(&self, kind: MountKind) -> &[MountEntry] {
        self.tables.get(&kind).map(Vec::as_slice).unwrap_or_default()
    }

    fn push(&mut self, entry: MountEntry) {
        self.tables.entry(entry.kind).or_default().push(entry);
    }
}

/// Mount entries of a whole program, per chain and kind, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MountTables {
    chains: IndexMap<EcoString, ChainMounts>,
}

impl MountTables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tables with the system entities `block` and `transaction` registered
    /// for the local chain.
    pub fn with_system_entities(stamp: Stamp) -> Self {
        let mut tables = Self::new();
        for name in ["block", "transaction"] {
            tables.add(None, MountEntry::system(MountKind::Entity, name, stamp));
        }
        tables
    }

    pub fn add(&mut self, chain: Option<&ChainName>, entry: MountEntry) {
        let key = chain.map(|c| c.0.clone()).unwrap_or_default();
        self.chains.entry(key).or_default().push(entry);
    }

    /// Appends every entry of `other`, keeping its order.
    pub fn merge(&mut self, other: MountTables) {
        for (chain, mounts) in other.chains {
            let target = self.chains.entry(chain).or_default();
            for entry in mounts.tables.into_values().flatten() {
                target.push(entry);
            }
        }
    }

    pub fn chain(&self, chain: &str) -> Option<&ChainMounts> {
        self.chains.get(chain)
    }

    pub fn chains(&self) -> impl Iterator<Item = (&str, &ChainMounts)> {
        self.chains.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Looks up the surviving entry for `mount`.
    pub fn find(&self, chain: &str, kind: MountKind, mount: &MountName) -> Option<&MountEntry> {
        self.chain(chain)?
            .entries(kind)
            .iter()
            .find(|entry| &entry.mount == mount)
    }
}

pub struct MountResolver<'a> {
    options: &'a CompilerOptions,
    stamp: Stamp,
    ctx: &'a mut MessageContext,
}

impl<'a> MountResolver<'a> {
    pub fn new(options: &'a CompilerOptions, stamp: Stamp, ctx: &'a mut MessageContext) -> Self {
        Self { options, stamp, ctx }
    }

    /// Resolves the tables of every file, then the merged tables of each
    /// module and finally those of all modules plus the system entities.
    pub fn resolve_modules(&mut self, modules: &Modules) -> MountTables {
        let mut app = MountTables::with_system_entities(self.stamp);

        for module in modules.values() {
            let mut merged = MountTables::new();
            for file in &module.files {
                merged.merge(self.resolve(&file.mounts));
            }
            app.merge(self.resolve(&merged));
        }

        self.resolve(&app)
    }

    /// Reports conflicts and keeps one winner per mount name. System entries
    /// sharing a mount name are all kept.
    pub fn resolve(&mut self, tables: &MountTables) -> MountTables {
        let mut resolved = MountTables::new();

        for (chain, mounts) in &tables.chains {
            let mut out = ChainMounts::default();

            for (&kind, entries) in &mounts.tables {
                let entries = if kind == MountKind::Entity {
                    self.reject_system_mounts(chain, entries)
                } else {
                    entries.iter().collect()
                };

                let survivors = self.resolve_table(chain, entries);
                debug!("Mount table {kind} of chain '{chain}' has {} entries", survivors.len());
                out.tables.insert(kind, survivors);
            }

            resolved.chains.insert(chain.clone(), out);
        }

        resolved
    }

    fn reject_system_mounts<'e>(&mut self, chain: &str, entries: &'e [MountEntry]) -> Vec<&'e MountEntry> {
        entries
            .iter()
            .filter(|entry| {
                let Some(loc) = entry.loc else {
                    return true;
                };
                let mount = entry.mount.to_string();
                let enabled =
                    self.options.mount_conflict_error && self.options.mount_conflict_system;
                if !enabled || !self.options.is_system_mount(&mount) {
                    return true;
                }

                self.ctx.error(
                    loc,
                    format!("mnt_conflict:sys:[{}]:{mount}", entry.def_name),
                    format!("Mount name conflict{}: '{mount}' is a system mount name", chain_msg(chain)),
                );
                false
            })
            .collect()
    }

    fn resolve_table(&mut self, chain: &str, entries: Vec<&MountEntry>) -> Vec<MountEntry> {
        let mut groups = IndexMap::<&MountName, Vec<&MountEntry>>::new();
        for entry in entries {
            groups.entry(&entry.mount).or_default().push(entry);
        }

        let mut survivors = Vec::new();

        for group in groups.values() {
            if group.len() > 1 {
                for (i, entry) in group.iter().enumerate() {
                    if entry.is_system() {
                        continue;
                    }
                    let other = if i == 0 { group[1] } else { group[0] };
                    self.conflict(chain, entry, other);
                }
            }

            let system = group.iter().filter(|e| e.is_system()).collect::<Vec<_>>();
            if system.is_empty() {
                survivors.push(group[0].clone());
            } else {
                survivors.extend(system.into_iter().map(|e| (*e).clone()));
            }
        }

        survivors
    }

    fn conflict(&mut self, chain: &str, entry: &MountEntry, other: &MountEntry) {
        let Some(loc) = entry.loc else {
            return;
        };

        if entry.def_name == other.def_name || entry.stamp != self.stamp {
            return;
        }
        if !self.options.mount_conflict_error {
            return;
        }

        let mount = &entry.mount;
        let def = &entry.def_name;
        let kind = other.kind;
        let chain_msg = chain_msg(chain);

        match other.loc {
            Some(other_loc) => {
                let other_pos = self.ctx.pos(other_loc);
                let other_line = self.ctx.line(other_loc);
                self.ctx.error(
                    loc,
                    format!("mnt_conflict:user:[{def}]:{mount}:{kind}:[{}]:{other_pos}", other.def_name),
                    format!(
                        "Mount name conflict{chain_msg}: {} '{}' has mount name '{mount}' (defined at {other_line})",
                        kind.msg(),
                        other.simple_name,
                    ),
                );
            }
            None => {
                self.ctx.error(
                    loc,
                    format!("mnt_conflict:sys:[{def}]:{mount}:{kind}:[{}]", other.def_name),
                    format!(
                        "Mount name conflict{chain_msg}: system {} '{}' has mount name '{mount}'",
                        kind.msg(),
                        other.simple_name,
                    ),
                );
            }
        }
    }
}

fn chain_msg(chain: &str) -> String {
    if chain.is_empty() {
        String::new()
    } else {
        format!(" (external chain '{chain}')")
    }
}
