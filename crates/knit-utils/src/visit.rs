use std::{collections::HashMap, hash::Hash};

use derive_more::Display;

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum VisitState {
    Unvisited,
    Visiting,
    Visited,
}

#[derive(Debug, Clone)]
pub struct VisitMap<T>(HashMap<T, VisitState>);

impl<T> VisitMap<T>
where
    T: Eq + Hash,
{
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    pub fn get(&self, key: &T) -> VisitState {
        self.0.get(key).copied().unwrap_or(VisitState::Unvisited)
    }

    pub fn set(&mut self, key: T, state: VisitState) {
        self.0.insert(key, state);
    }

    pub fn is_unvisited(&self, key: &T) -> bool {
        self.get(key) == VisitState::Unvisited
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<T> Default for VisitMap<T>
where
    T: Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}
