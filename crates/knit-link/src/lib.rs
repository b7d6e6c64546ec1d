//! Linking of compiled modules into one program.
//!
//! Important concepts in this crate include:
//!
//! - the [`Declarer`], entering the members of every external module into
//!   [`Scopes`] and the [`Definitions`] arena;
//! - the [`ImportResolver`], following exact and wildcard imports;
//! - the [`OverrideResolver`], binding overrides to abstract functions;
//! - the [`MountResolver`], keeping one entity, operation or query per mount
//!   name and chain;
//! - the [`AppLinker`], running all of the above over the passes of a
//!   [`knit_pass::Scheduler`].

pub mod abstracts;
pub mod app;
pub mod context;
pub mod declare;
pub mod def;
pub mod entity;
pub mod function;
pub mod imports;
pub mod module;
pub mod mount;
pub mod options;
pub mod scope;

pub use abstracts::OverrideResolver;
pub use app::{AppLinker, LinkedApp};
pub use context::MessageContext;
pub use declare::{Declarations, Declarer};
pub use def::{DeclarationType, DefId, Definition, Definitions, QualifiedName, Stamp};
pub use entity::EntityGraph;
pub use function::{AbstractFunction, OverrideFunction};
pub use imports::{ExactCache, ImportResolver};
pub use module::{FileInfo, ModuleImport, ModuleInfo, Modules};
pub use mount::{MountEntry, MountKind, MountResolver, MountTables};
pub use options::CompilerOptions;
pub use scope::{EntryKind, ScopeId, Scopes};
