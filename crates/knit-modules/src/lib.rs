//! Module discovery and the module graph.
//!
//! Important concepts in this crate include:
//!
//! - the [`ModuleReader`], mapping module names onto files of a source tree;
//! - the [`ModuleLoader`], loading the transitive closure of imported modules
//!   into a list of [`MidModule`]s;
//! - the [`MidModuleCompiler`], turning mid modules into [`ExtModule`]s keyed
//!   by module name and external chain.

pub mod compiler;
pub mod loader;
pub mod mid;
pub mod modifiers;
pub mod name;
pub mod reader;

pub use compiler::{ExtFile, ExtImport, ExtMember, ExtModule, ExtNamespace, MidModuleCompiler};
pub use loader::ModuleLoader;
pub use mid::{MidDefinition, MidFile, MidHeader, MidImport, MidMember, MidModule, MidNamespace};
pub use modifiers::{ModifierTarget, ModifierValues, MountAnnotation, MountPath};
pub use name::{is_valid_name, ChainName, ModuleKey, ModuleName, MountName};
pub use reader::{ModuleReadError, ModuleReader, ModuleSource, ParsedFile};

/// Extension of source files.
pub const FILE_SUFFIX: &str = ".knit";

/// Main file of a directory module.
pub const MODULE_FILE: &str = "module.knit";
