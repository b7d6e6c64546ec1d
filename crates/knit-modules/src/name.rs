use ecow::EcoString;
use std::fmt;

/// Whether `s` can be used as one segment of a module, chain or mount name.
pub fn is_valid_name(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn write_dotted(parts: &[EcoString], f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            f.write_str(".")?;
        }
        f.write_str(part)?;
    }
    Ok(())
}

/// Dotted name of a module. The empty name is the root module.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModuleName {
    parts: Vec<EcoString>,
}

impl ModuleName {
    pub fn root() -> Self {
        Self::default()
    }

    /// Parses `a.b.c`. The empty string is the root module.
    pub fn parse(s: &str) -> Option<Self> {
        if s.is_empty() {
            return Some(Self::root());
        }

        let parts = s
            .split('.')
            .map(|part| is_valid_name(part).then(|| EcoString::from(part)))
            .collect::<Option<Vec<_>>>()?;

        Some(Self { parts })
    }

    pub fn from_parts<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<EcoString>,
    {
        let parts = parts.into_iter().map(Into::into).collect::<Vec<_>>();
        debug_assert!(parts.iter().all(|p| is_valid_name(p)));
        Self { parts }
    }

    pub fn parts(&self) -> &[EcoString] {
        &self.parts
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn last(&self) -> Option<&str> {
        self.parts.last().map(EcoString::as_str)
    }

    /// The enclosing module, `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        let (_, head) = self.parts.split_last()?;
        Some(Self {
            parts: head.to_vec(),
        })
    }

    pub fn child(&self, name: impl Into<EcoString>) -> Self {
        let mut parts = self.parts.clone();
        parts.push(name.into());
        Self { parts }
    }

    /// Strict ancestry: a name is not its own ancestor.
    pub fn is_ancestor_of(&self, other: &Self) -> bool {
        self.parts.len() < other.parts.len() && other.parts.starts_with(&self.parts)
    }

    /// Strict ancestors from the nearest to the root.
    pub fn ancestors(&self) -> impl Iterator<Item = ModuleName> + '_ {
        (0..self.parts.len()).rev().map(|n| Self {
            parts: self.parts[..n].to_vec(),
        })
    }
}

impl fmt::Display for ModuleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_dotted(&self.parts, f)
    }
}

impl fmt::Debug for ModuleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ModuleName({self})")
    }
}

/// Name of an external chain a module can be imported under.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChainName(pub EcoString);

impl ChainName {
    pub fn new(name: impl Into<EcoString>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChainName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A module as compiled for one chain. The same module imported under two
/// chains yields two distinct keys.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModuleKey {
    pub name: ModuleName,
    pub chain: Option<ChainName>,
}

impl ModuleKey {
    pub fn new(name: ModuleName, chain: Option<ChainName>) -> Self {
        Self { name, chain }
    }

    pub fn local(name: ModuleName) -> Self {
        Self { name, chain: None }
    }
}

impl fmt::Display for ModuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.chain {
            Some(chain) => write!(f, "{}[{chain}]", self.name),
            None => self.name.fmt(f),
        }
    }
}

/// Program-wide export name of an entity, operation or query.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MountName {
    parts: Vec<EcoString>,
}

impl MountName {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn parse(s: &str) -> Option<Self> {
        ModuleName::parse(s).map(|name| Self { parts: name.parts })
    }

    pub fn from_parts<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<EcoString>,
    {
        Self {
            parts: parts.into_iter().map(Into::into).collect(),
        }
    }

    pub fn parts(&self) -> &[EcoString] {
        &self.parts
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn first(&self) -> Option<&str> {
        self.parts.first().map(EcoString::as_str)
    }

    pub fn child(&self, name: impl Into<EcoString>) -> Self {
        let mut parts = self.parts.clone();
        parts.push(name.into());
        Self { parts }
    }

    pub fn append(&self, other: &MountName) -> Self {
        let mut parts = self.parts.clone();
        parts.extend(other.parts.iter().cloned());
        Self { parts }
    }

    /// Drops `n` trailing segments, `None` if there are fewer.
    pub fn up(&self, n: usize) -> Option<Self> {
        let keep = self.parts.len().checked_sub(n)?;
        Some(Self {
            parts: self.parts[..keep].to_vec(),
        })
    }
}

impl fmt::Display for MountName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_dotted(&self.parts, f)
    }
}

impl fmt::Debug for MountName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MountName({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> ModuleName {
        ModuleName::parse(s).unwrap()
    }

    #[test]
    fn validates_names() {
        assert!(is_valid_name("lib"));
        assert!(is_valid_name("_x9"));
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("9lib"));
        assert!(!is_valid_name("a-b"));

        assert!(ModuleName::parse("a.b").is_some());
        assert!(ModuleName::parse("a..b").is_none());
        assert!(ModuleName::parse("a.").is_none());
        assert!(ModuleName::parse("").unwrap().is_empty());
    }

    #[test]
    fn walks_the_hierarchy() {
        let abc = name("a.b.c");

        assert_eq!(abc.parent(), Some(name("a.b")));
        assert_eq!(ModuleName::root().parent(), None);
        assert_eq!(name("a.b").child("c"), abc);
        assert_eq!(abc.last(), Some("c"));

        let ancestors = abc.ancestors().map(|n| n.to_string()).collect::<Vec<_>>();
        assert_eq!(ancestors, vec!["a.b", "a", ""]);
    }

    #[test]
    fn ancestry_is_strict() {
        assert!(ModuleName::root().is_ancestor_of(&name("a")));
        assert!(name("a").is_ancestor_of(&name("a.b.c")));
        assert!(!name("a").is_ancestor_of(&name("a")));
        assert!(!name("a.b").is_ancestor_of(&name("a.c")));
        assert!(!name("ab").is_ancestor_of(&name("a.b")));
    }

    #[test]
    fn orders_by_segments() {
        let mut names = vec![name("b"), name("a.c"), name("a"), ModuleName::root()];
        names.sort();
        let names = names.iter().map(ToString::to_string).collect::<Vec<_>>();
        assert_eq!(names, vec!["", "a", "a.c", "b"]);
    }

    #[test]
    fn keys_show_their_chain() {
        let key = ModuleKey::new(name("lib"), Some(ChainName::new("other")));
        assert_eq!(key.to_string(), "lib[other]");
        assert_eq!(ModuleKey::local(name("lib")).to_string(), "lib");
    }

    #[test]
    fn mount_names_go_up() {
        let mount = MountName::parse("a.b.c").unwrap();
        assert_eq!(mount.up(1).unwrap().to_string(), "a.b");
        assert!(mount.up(3).unwrap().is_empty());
        assert!(mount.up(4).is_none());
        assert_eq!(mount.append(&MountName::parse("d").unwrap()).to_string(), "a.b.c.d");
        assert_eq!(mount.first(), Some("a"));
    }
}
