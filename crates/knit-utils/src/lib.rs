pub mod graph;
pub mod id;
pub mod visit;
