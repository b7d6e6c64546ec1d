//! Read-only views of a source tree.
//!
//! Every path handed to a [`SourceTree`] is relative to the tree root; the
//! root itself is the empty path.

mod cache;
mod tree;

pub use cache::CachedSourceTree;
pub use tree::{DiskSourceTree, MemorySourceTree, SourceTree};
