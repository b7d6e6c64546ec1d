//! Outline syntax tree: module headers, imports, namespaces and definition
//! signatures. Bodies are not represented.

use derive_more::Display;
use ecow::EcoString;
use std::fmt;

use knit_span::Loc;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ident {
    pub text: EcoString,
    pub loc: Loc,
}

impl Ident {
    pub fn new(text: impl Into<EcoString>, loc: Loc) -> Self {
        Self {
            text: text.into(),
            loc,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.text.fmt(f)
    }
}

/// Dotted sequence of identifiers, never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Path {
    pub parts: Vec<Ident>,
}

impl Path {
    pub fn new(parts: Vec<Ident>) -> Self {
        debug_assert!(!parts.is_empty());
        Self { parts }
    }

    pub fn first(&self) -> &Ident {
        &self.parts[0]
    }

    pub fn last(&self) -> &Ident {
        &self.parts[self.parts.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn loc(&self) -> Loc {
        self.first().loc.union(self.last().loc)
    }

    pub fn strs(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().map(Ident::as_str)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, part) in self.parts.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            f.write_str(part.as_str())?;
        }
        Ok(())
    }
}

/// `@name` or `@name("arg")`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Annotation {
    pub name: Ident,
    pub arg: Option<(EcoString, Loc)>,
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeywordModifier {
    #[display("abstract")]
    Abstract,
    #[display("override")]
    Override,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Modifiers {
    pub annotations: Vec<Annotation>,
    pub keywords: Vec<(KeywordModifier, Loc)>,
}

impl Modifiers {
    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty() && self.keywords.is_empty()
    }

    pub fn keyword(&self, keyword: KeywordModifier) -> Option<Loc> {
        self.keywords
            .iter()
            .find(|(k, _)| *k == keyword)
            .map(|(_, loc)| *loc)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModuleHeader {
    pub modifiers: Modifiers,
    /// Location of the `module` keyword.
    pub loc: Loc,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct File {
    pub header: Option<ModuleHeader>,
    pub members: Vec<Member>,
    /// Start of the file.
    pub loc: Loc,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Member {
    Definition(Definition),
    Import(Import),
    Namespace(Namespace),
}

impl Member {
    pub fn loc(&self) -> Loc {
        match self {
            Member::Definition(d) => d.loc,
            Member::Import(i) => i.loc,
            Member::Namespace(n) => n.loc,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Import {
    pub modifiers: Modifiers,
    pub alias: Option<Ident>,
    pub path: Path,
    pub target: ImportTarget,
    /// Location of the `import` keyword.
    pub loc: Loc,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ImportTarget {
    /// `import a.b;`
    Module,
    /// `import a.b.{x, y: z};`
    Exact(Vec<ExactItem>),
    /// `import a.b.*;`
    Wildcard(Loc),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExactItem {
    pub alias: Option<Ident>,
    pub path: Path,
}

impl ExactItem {
    /// Name the item is visible under in the importing scope.
    pub fn visible_name(&self) -> &Ident {
        self.alias.as_ref().unwrap_or_else(|| self.path.last())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    pub modifiers: Modifiers,
    pub name: Option<Path>,
    pub members: Vec<Member>,
    pub loc: Loc,
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DefinitionKind {
    #[display("function")]
    Function,
    #[display("entity")]
    Entity,
    #[display("struct")]
    Struct,
    #[display("operation")]
    Operation,
    #[display("query")]
    Query,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Attribute {
    pub name: Ident,
    pub ty: Path,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Definition {
    pub modifiers: Modifiers,
    pub kind: DefinitionKind,
    pub name: Path,
    /// Whether a function-like definition has a body.
    pub body: bool,
    /// Attributes of entities and structs.
    pub attributes: Vec<Attribute>,
    /// Location of the definition keyword.
    pub loc: Loc,
}
