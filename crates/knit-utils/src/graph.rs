//! Directed graphs over hashable nodes and the algorithms the linker needs:
//! topological ordering, cycle search, transposition and reachability.
//!
//! All iteration follows insertion order so that every result is stable for a
//! fixed input.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    fmt,
    hash::Hash,
};

use indexmap::{IndexMap, IndexSet};

use crate::visit::{VisitMap, VisitState};

/// Error representing a dependency cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleError<T>(Vec<T>);

impl<T> CycleError<T> {
    /// Create a new cycle error
    pub fn new(path: Vec<T>) -> Self {
        Self(path)
    }

    /// Get the cycle path, the first node is repeated at the end
    pub fn path(&self) -> &[T] {
        &self.0
    }
}

impl<T: fmt::Display> fmt::Display for CycleError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Dependency cycle detected: ")?;

        let mut iter = self.0.iter();

        if let Some(first) = iter.next() {
            write!(f, "{}", first)?;
        }

        for el in iter {
            write!(f, " -> {}", el)?;
        }

        Ok(())
    }
}

/// Graph of dependencies between nodes.
///
/// An edge `from -> to` reads as "`from` depends on `to`".
#[derive(Debug, Clone)]
pub struct DependencyGraph<T> {
    /// Forward dependencies (node -> dependencies)
    forward: IndexMap<T, IndexSet<T>>,

    /// Reverse dependencies (node -> dependents)
    reverse: IndexMap<T, IndexSet<T>>,
}

impl<T> Default for DependencyGraph<T> {
    fn default() -> Self {
        Self {
            forward: IndexMap::default(),
            reverse: IndexMap::default(),
        }
    }
}

impl<T> DependencyGraph<T> {
    /// Create a new empty dependency graph
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    /// All nodes in insertion order
    pub fn nodes(&self) -> impl Iterator<Item = &T> {
        self.forward.keys()
    }
}

impl<T: Eq + Hash + Clone> DependencyGraph<T> {
    /// Builds a graph from an adjacency list.
    pub fn from_adjacency<I, D>(adjacency: I) -> Self
    where
        I: IntoIterator<Item = (T, D)>,
        D: IntoIterator<Item = T>,
    {
        let mut graph = Self::new();
        for (from, deps) in adjacency {
            graph.add_node(from.clone());
            for to in deps {
                graph.add_dependency(from.clone(), to);
            }
        }
        graph
    }

    pub fn add_node(&mut self, item: T) {
        // Ensure the item exists in both forward and reverse maps
        self.forward.entry(item.clone()).or_default();
        self.reverse.entry(item).or_default();
    }

    /// Add a dependency edge
    pub fn add_dependency(&mut self, from: T, to: T) {
        self.add_node(from.clone());
        self.add_node(to.clone());

        self.forward.entry(from.clone()).or_default().insert(to.clone());
        self.reverse.entry(to).or_default().insert(from);
    }

    pub fn contains(&self, item: &T) -> bool {
        self.forward.contains_key(item)
    }

    /// Get dependencies of an item
    pub fn dependencies_of(&self, item: &T) -> impl Iterator<Item = &T> {
        self.forward.get(item).into_iter().flatten()
    }

    /// Get dependents of an item
    pub fn dependents_of(&self, item: &T) -> impl Iterator<Item = &T> {
        self.reverse.get(item).into_iter().flatten()
    }

    /// Perform a topological sort, dependencies come before their dependents.
    pub fn topological_sort(&self) -> Result<Vec<T>, CycleError<T>> {
        enum Frame<T> {
            Enter(T),
            Exit(T),
        }

        let mut visited = VisitMap::new();
        let mut order = Vec::with_capacity(self.len());
        let mut path = Vec::new();

        for root in self.nodes() {
            if !visited.is_unvisited(root) {
                continue;
            }

            let mut stack = vec![Frame::Enter(root.clone())];

            while let Some(frame) = stack.pop() {
                match frame {
                    Frame::Enter(node) => {
                        // Stale entries were pushed before the node got visited elsewhere
                        if !visited.is_unvisited(&node) {
                            continue;
                        }

                        visited.set(node.clone(), VisitState::Visiting);
                        path.push(node.clone());
                        stack.push(Frame::Exit(node.clone()));

                        let deps = self.dependencies_of(&node).collect::<Vec<_>>();
                        for dep in deps.into_iter().rev() {
                            match visited.get(dep) {
                                VisitState::Unvisited => stack.push(Frame::Enter(dep.clone())),
                                VisitState::Visiting => {
                                    let start = path.iter().position(|n| n == dep).unwrap_or(0);
                                    let mut cycle = path[start..].to_vec();
                                    cycle.push(dep.clone());
                                    return Err(CycleError::new(cycle));
                                }
                                VisitState::Visited => {}
                            }
                        }
                    }
                    Frame::Exit(node) => {
                        visited.set(node.clone(), VisitState::Visited);
                        path.pop();
                        order.push(node);
                    }
                }
            }
        }

        Ok(order)
    }

    /// Finds some cycles of the graph such that every node lying on any cycle
    /// is part of at least one returned cycle.
    ///
    /// Each cycle is listed once, starting at its earliest inserted node and
    /// without repeating it at the end.
    pub fn find_cycles(&self) -> Vec<Vec<T>> {
        let mut covered = HashSet::new();
        let mut cycles = Vec::new();

        for node in self.nodes() {
            if covered.contains(node) {
                continue;
            }

            if let Some(cycle) = self.shortest_cycle_through(node) {
                covered.extend(cycle.iter().cloned());
                cycles.push(cycle);
            }
        }

        cycles
    }

    /// Nodes that lie on at least one cycle, in insertion order.
    pub fn cyclic_nodes(&self) -> IndexSet<T> {
        let cycles = self.find_cycles();
        let members = cycles.into_iter().flatten().collect::<HashSet<_>>();

        self.nodes()
            .filter(|node| members.contains(*node))
            .cloned()
            .collect()
    }

    fn shortest_cycle_through(&self, start: &T) -> Option<Vec<T>> {
        let mut parents: HashMap<&T, &T> = HashMap::new();
        let mut queue = VecDeque::from([start]);

        while let Some(node) = queue.pop_front() {
            for dep in self.dependencies_of(node) {
                if dep == start {
                    let mut cycle = vec![node.clone()];
                    let mut cursor = node;
                    while let Some(&parent) = parents.get(cursor) {
                        cycle.push(parent.clone());
                        cursor = parent;
                    }
                    cycle.reverse();
                    return Some(cycle);
                }

                if !parents.contains_key(dep) {
                    parents.insert(dep, node);
                    queue.push_back(dep);
                }
            }
        }

        None
    }

    /// Same nodes with every edge reversed.
    pub fn transpose(&self) -> Self {
        Self {
            forward: self.reverse.clone(),
            reverse: self.forward.clone(),
        }
    }

    /// Every node reachable from `roots`, roots included, in breadth-first order.
    pub fn closure<'a, I>(&'a self, roots: I) -> Vec<T>
    where
        I: IntoIterator<Item = &'a T>,
        T: 'a,
    {
        let mut seen = HashSet::new();
        let mut order = Vec::new();
        let mut queue = VecDeque::new();

        for root in roots {
            if seen.insert(root) {
                queue.push_back(root);
            }
        }

        while let Some(node) = queue.pop_front() {
            order.push(node.clone());
            for dep in self.dependencies_of(node) {
                if seen.insert(dep) {
                    queue.push_back(dep);
                }
            }
        }

        order
    }
}

/// Depth-first pre-order walk from `roots` that shares its `visited` set with
/// the caller, so repeated walks never yield a node twice.
///
/// `expand` is called once per newly visited node: `None` rejects the node
/// (it is neither yielded nor expanded), `Some(next)` yields it and continues
/// with `next`.
pub fn walk<T, I, F>(roots: I, visited: &mut HashSet<T>, mut expand: F) -> Vec<T>
where
    T: Eq + Hash + Clone,
    I: IntoIterator<Item = T>,
    F: FnMut(&T) -> Option<Vec<T>>,
{
    let mut order = Vec::new();
    let mut stack = roots.into_iter().collect::<Vec<_>>();
    stack.reverse();

    while let Some(node) = stack.pop() {
        if !visited.insert(node.clone()) {
            continue;
        }

        let Some(next) = expand(&node) else {
            continue;
        };

        order.push(node);
        stack.extend(next.into_iter().rev());
    }

    order
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(edges: &[(&'static str, &[&'static str])]) -> DependencyGraph<&'static str> {
        DependencyGraph::from_adjacency(edges.iter().map(|(from, to)| (*from, to.iter().copied())))
    }

    #[test]
    fn topological_sort_puts_dependencies_first() {
        let g = graph(&[("app", &["lib", "util"]), ("lib", &["util"]), ("util", &[])]);
        let order = g.topological_sort().unwrap();

        assert_eq!(order, vec!["util", "lib", "app"]);
    }

    #[test]
    fn topological_sort_reports_cycle_path() {
        let g = graph(&[("a", &["b"]), ("b", &["c"]), ("c", &["a"])]);
        let err = g.topological_sort().unwrap_err();

        assert_eq!(err.path(), &["a", "b", "c", "a"]);
        assert_eq!(err.to_string(), "Dependency cycle detected: a -> b -> c -> a");
    }

    #[test]
    fn topological_sort_handles_diamonds() {
        let g = graph(&[("top", &["l", "r"]), ("l", &["base"]), ("r", &["base"])]);
        let order = g.topological_sort().unwrap();

        let pos = |n| order.iter().position(|x| *x == n).unwrap();
        assert_eq!(order.len(), 4);
        assert!(pos("base") < pos("l"));
        assert!(pos("base") < pos("r"));
        assert!(pos("l") < pos("top"));
        assert!(pos("r") < pos("top"));
    }

    #[test]
    fn find_cycles_covers_every_cyclic_node() {
        let g = graph(&[
            ("a", &["b"]),
            ("b", &["a", "c"]),
            ("c", &["d"]),
            ("d", &["c"]),
            ("e", &["a"]),
            ("s", &["s"]),
        ]);

        let cycles = g.find_cycles();
        assert_eq!(cycles, vec![vec!["a", "b"], vec!["c", "d"], vec!["s"]]);

        let cyclic = g.cyclic_nodes().into_iter().collect::<Vec<_>>();
        assert_eq!(cyclic, vec!["a", "b", "c", "d", "s"]);
    }

    #[test]
    fn find_cycles_is_empty_for_dag() {
        let g = graph(&[("a", &["b"]), ("b", &["c"])]);
        assert!(g.find_cycles().is_empty());
        assert!(g.cyclic_nodes().is_empty());
    }

    #[test]
    fn transpose_reverses_edges() {
        let g = graph(&[("a", &["b", "c"])]);
        let t = g.transpose();

        assert_eq!(t.dependencies_of(&"b").collect::<Vec<_>>(), vec![&"a"]);
        assert_eq!(t.dependencies_of(&"c").collect::<Vec<_>>(), vec![&"a"]);
        assert_eq!(t.dependencies_of(&"a").count(), 0);
        assert_eq!(t.len(), 3);
    }

    #[test]
    fn closure_includes_roots_and_reachable_nodes() {
        let g = graph(&[("a", &["b"]), ("b", &["c"]), ("c", &["a"]), ("x", &["y"])]);

        assert_eq!(g.closure([&"b"]), vec!["b", "c", "a"]);
        assert_eq!(g.closure([&"x", &"y"]), vec!["x", "y"]);
    }

    #[test]
    fn walk_shares_visited_set_and_can_reject_nodes() {
        let g = graph(&[("a", &["b", "d"]), ("b", &["c"]), ("c", &["a"]), ("d", &[])]);
        let expand = |n: &&'static str| {
            (*n != "d").then(|| g.dependencies_of(n).copied().collect::<Vec<_>>())
        };

        let mut visited = HashSet::new();
        assert_eq!(walk(["a"], &mut visited, expand), vec!["a", "b", "c"]);
        assert!(visited.contains("d"));
        assert!(walk(["b"], &mut visited, expand).is_empty());
    }
}
