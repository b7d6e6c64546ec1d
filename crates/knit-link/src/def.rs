use derive_more::Display;
use ecow::EcoString;
use std::{fmt, ops::Index};

use knit_modules::{ChainName, ModuleKey, MountName};
use knit_span::Loc;
use knit_syntax::ast::{Attribute, DefinitionKind, Ident};
use knit_utils::define_id;

define_id!(DefId);
define_id!(Stamp);

/// Kind of a named entry as shown in diagnostic codes.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeclarationType {
    #[display("NAMESPACE")]
    Namespace,
    #[display("IMPORT")]
    Import,
    #[display("FUNCTION")]
    Function,
    #[display("ENTITY")]
    Entity,
    #[display("STRUCT")]
    Struct,
    #[display("OPERATION")]
    Operation,
    #[display("QUERY")]
    Query,
}

impl DeclarationType {
    /// Lower case word used in messages.
    pub fn msg(self) -> &'static str {
        match self {
            DeclarationType::Namespace => "namespace",
            DeclarationType::Import => "import",
            DeclarationType::Function => "function",
            DeclarationType::Entity => "entity",
            DeclarationType::Struct => "struct",
            DeclarationType::Operation => "operation",
            DeclarationType::Query => "query",
        }
    }
}

impl From<DefinitionKind> for DeclarationType {
    fn from(kind: DefinitionKind) -> Self {
        match kind {
            DefinitionKind::Function => DeclarationType::Function,
            DefinitionKind::Entity => DeclarationType::Entity,
            DefinitionKind::Struct => DeclarationType::Struct,
            DefinitionKind::Operation => DeclarationType::Operation,
            DefinitionKind::Query => DeclarationType::Query,
        }
    }
}

/// Dotted name of a definition inside its module.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QualifiedName(Vec<EcoString>);

impl QualifiedName {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn child(&self, name: impl Into<EcoString>) -> Self {
        let mut parts = self.0.clone();
        parts.push(name.into());
        Self(parts)
    }

    pub fn parts(&self) -> &[EcoString] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, part) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            f.write_str(part)?;
        }
        Ok(())
    }
}

impl fmt::Debug for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "QualifiedName({self})")
    }
}

/// Program-wide name of a definition: `module:qualified`, or just the
/// qualified name for the root module.
pub fn app_level_name(module: &ModuleKey, qualified: impl fmt::Display) -> String {
    let module = module.to_string();
    if module.is_empty() {
        qualified.to_string()
    } else {
        format!("{module}:{qualified}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Definition {
    pub id: DefId,
    pub kind: DefinitionKind,
    /// Simple name, located at the declaration.
    pub name: Ident,
    pub qualified: QualifiedName,
    pub module: ModuleKey,
    /// External chain the definition is compiled for.
    pub chain: Option<ChainName>,
    /// Mount name of entities, operations and queries.
    pub mount: Option<MountName>,
    pub attributes: Vec<Attribute>,
    pub stamp: Stamp,
}

impl Definition {
    pub fn loc(&self) -> Loc {
        self.name.loc
    }

    pub fn app_level_name(&self) -> String {
        app_level_name(&self.module, &self.qualified)
    }

    pub fn declaration_type(&self) -> DeclarationType {
        self.kind.into()
    }
}

/// Arena of every definition of a run, addressed by [`DefId`].
#[derive(Debug, Clone, Default)]
pub struct Definitions {
    defs: Vec<Definition>,
}

impl Definitions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a definition built for the next id.
    pub fn insert_with(&mut self, f: impl FnOnce(DefId) -> Definition) -> DefId {
        let id = DefId::from_usize(self.defs.len());
        let def = f(id);
        debug_assert_eq!(def.id, id);
        self.defs.push(def);
        id
    }

    pub fn get(&self, id: DefId) -> Option<&Definition> {
        self.defs.get(id.as_usize())
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Definition> {
        self.defs.iter()
    }
}

impl Index<DefId> for Definitions {
    type Output = Definition;

    fn index(&self, id: DefId) -> &Self::Output {
        &self.defs[id.as_usize()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use knit_modules::ModuleName;
    use knit_span::{SourceId, Span};

    fn loc() -> Loc {
        Loc::new(SourceId::from_usize(0), Span::new(0, 1))
    }

    fn def(id: DefId, module: &str, name: &str) -> Definition {
        Definition {
            id,
            kind: DefinitionKind::Entity,
            name: Ident::new(name, loc()),
            qualified: QualifiedName::new().child("ns").child(name),
            module: ModuleKey::local(ModuleName::parse(module).unwrap()),
            chain: None,
            mount: None,
            attributes: Vec::new(),
            stamp: Stamp::from_usize(0),
        }
    }

    #[test]
    fn app_level_name_omits_root_module() {
        let defs = [def(DefId::from_usize(0), "", "user"), def(DefId::from_usize(1), "lib.a", "user")];

        assert_eq!(defs[0].app_level_name(), "ns.user");
        assert_eq!(defs[1].app_level_name(), "lib.a:ns.user");

        let chained = ModuleKey::new(ModuleName::parse("lib").unwrap(), Some(ChainName::new("c")));
        assert_eq!(app_level_name(&chained, "f"), "lib[c]:f");
    }

    #[test]
    fn arena_hands_out_dense_ids() {
        let mut defs = Definitions::new();
        let a = defs.insert_with(|id| def(id, "", "a"));
        let b = defs.insert_with(|id| def(id, "", "b"));

        assert_eq!(a.as_usize(), 0);
        assert_eq!(b.as_usize(), 1);
        assert_eq!(defs[b].name.as_str(), "b");
        assert_eq!(defs.len(), 2);
    }

    #[test]
    fn declaration_types_render_upper_case() {
        assert_eq!(DeclarationType::from(DefinitionKind::Query).to_string(), "QUERY");
        assert_eq!(DeclarationType::Import.msg(), "import");
    }
}
