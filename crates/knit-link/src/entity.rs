//! Entities referring to each other through their attribute types.

use knit_utils::graph::DependencyGraph;

use crate::{
    context::MessageContext,
    def::{DefId, Definitions},
};

/// Type names resolved without a name table lookup.
pub const BUILTIN_TYPES: &[&str] = &[
    "boolean",
    "integer",
    "big_integer",
    "decimal",
    "text",
    "byte_array",
    "rowid",
    "json",
    "gtv",
    "timestamp",
    "pubkey",
    "name",
    "list",
    "set",
    "map",
    "range",
    "block",
    "transaction",
];

pub fn is_builtin_type(name: &str) -> bool {
    BUILTIN_TYPES.contains(&name)
}

/// Edges point from an entity to the entities its attributes refer to.
#[derive(Debug, Clone, Default)]
pub struct EntityGraph {
    graph: DependencyGraph<DefId>,
}

impl EntityGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_entity(&mut self, entity: DefId) {
        self.graph.add_node(entity);
    }

    pub fn add_reference(&mut self, from: DefId, to: DefId) {
        self.graph.add_dependency(from, to);
    }

    pub fn len(&self) -> usize {
        self.graph.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.is_empty()
    }

    /// Reports every cycle at its first entity. Returns whether the graph is
    /// acyclic.
    pub fn check_cycles(&self, defs: &Definitions, ctx: &mut MessageContext) -> bool {
        let cycles = self.graph.find_cycles();

        for cycle in &cycles {
            let names = cycle.iter().map(|&id| defs[id].app_level_name()).collect::<Vec<_>>();
            ctx.error(
                defs[cycle[0]].loc(),
                format!("entity_cycle:{}", names.join(",")),
                format!("Entity cycle, not allowed: {}", names.join(", ")),
            );
        }

        cycles.is_empty()
    }

    /// Entities with the referenced ones first, `None` if there is a cycle.
    pub fn order(&self) -> Option<Vec<DefId>> {
        self.graph.topological_sort().ok()
    }
}
