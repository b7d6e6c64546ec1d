//! Annotations and keyword modifiers, and the mount path language of
//! `@mount`.

use derive_more::Display;
use ecow::EcoString;

use knit_span::{Loc, Report};
use knit_syntax::ast::{KeywordModifier, Modifiers};

use crate::name::{is_valid_name, ChainName, MountName};

/// What a set of modifiers is attached to.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModifierTarget {
    #[display("MODULE")]
    Module,
    #[display("IMPORT")]
    Import,
    #[display("NAMESPACE")]
    Namespace,
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

impl ModifierTarget {
    /// Modules and namespaces may mount at the empty name.
    fn allows_empty_mount(self) -> bool {
        matches!(self, ModifierTarget::Module | ModifierTarget::Namespace)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Arg {
    None,
    Required,
}

struct AnnotationRule {
    name: &'static str,
    targets: &'static [(ModifierTarget, Arg)],
}

const ANNOTATIONS: &[AnnotationRule] = &[
    AnnotationRule {
        name: "mount",
        targets: &[
            (ModifierTarget::Module, Arg::Required),
            (ModifierTarget::Namespace, Arg::Required),
            (ModifierTarget::Entity, Arg::Required),
            (ModifierTarget::Operation, Arg::Required),
            (ModifierTarget::Query, Arg::Required),
        ],
    },
    AnnotationRule {
        name: "external",
        targets: &[
            (ModifierTarget::Module, Arg::None),
            (ModifierTarget::Import, Arg::Required),
            (ModifierTarget::Namespace, Arg::Required),
        ],
    },
    AnnotationRule {
        name: "test",
        targets: &[(ModifierTarget::Module, Arg::None)],
    },
];

/// Parsed `@mount` argument.
///
/// `a.b` is absolute, a leading `.` is relative to the enclosing mount name,
/// every leading `^` goes one segment up, a trailing `.` appends the name of
/// the annotated definition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MountPath {
    text: EcoString,
    up: Option<usize>,
    path: Vec<EcoString>,
    tail: bool,
}

impl MountPath {
    pub fn parse(s: &str) -> Option<Self> {
        let text = EcoString::from(s);

        if s.is_empty() {
            return Some(Self {
                text,
                up: None,
                path: Vec::new(),
                tail: false,
            });
        }

        let mut tokens = s.split('.').collect::<Vec<_>>();

        let up = match tokens.first() {
            Some(&"") => {
                tokens.remove(0);
                Some(0)
            }
            Some(first) if first.chars().all(|c| c == '^') => {
                let up = first.len();
                tokens.remove(0);
                Some(up)
            }
            _ => None,
        };

        let tail = !tokens.is_empty() && tokens.last() == Some(&"");
        if tail {
            tokens.pop();
        }

        if !tokens.iter().all(|t| is_valid_name(t)) {
            return None;
        }

        let path = tokens.into_iter().map(EcoString::from).collect::<Vec<_>>();

        if up == Some(0) && path.is_empty() {
            return None;
        }

        Some(Self {
            text,
            up,
            path,
            tail,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Computes the mount name relative to `parent`, `name` being the name of
    /// the annotated definition if it has one.
    pub fn calculate(
        &self,
        parent: &MountName,
        name: Option<&str>,
        target: ModifierTarget,
        loc: Loc,
        report: &mut Report,
    ) -> Option<MountName> {
        let base = match self.up {
            Some(up) => match parent.up(up) {
                Some(base) => base,
                None => {
                    report.error(
                        loc,
                        format!("ann:mount:up:{}:{up}", parent.len()),
                        format!("Cannot go up by {up}, current mount path is '{parent}'"),
                    );
                    return None;
                }
            },
            None => MountName::empty(),
        };

        let allow_empty = target.allows_empty_mount();

        if !allow_empty && self.up.is_some() && self.path.is_empty() && !self.tail {
            report.error(
                loc,
                format!("ann:mount:invalid:{}:{target}", self.text),
                format!("Mount path '{}' is invalid here", self.text),
            );
            return None;
        }

        let mut mount = base.append(&MountName::from_parts(self.path.iter().cloned()));

        if self.tail {
            let Some(name) = name else {
                report.error(
                    loc,
                    format!("ann:mount:tail:no_name:{}:{target}", self.text),
                    format!("Mount path '{}' needs a name to append", self.text),
                );
                return None;
            };
            mount = mount.child(name);
        }

        if mount.is_empty() && !allow_empty {
            report.error(
                loc,
                format!("ann:mount:empty:{target}"),
                "Mount name cannot be empty",
            );
            return None;
        }

        Some(mount)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MountAnnotation {
    pub path: MountPath,
    pub loc: Loc,
}

impl MountAnnotation {
    pub fn calculate(
        &self,
        parent: &MountName,
        name: Option<&str>,
        target: ModifierTarget,
        report: &mut Report,
    ) -> Option<MountName> {
        self.path.calculate(parent, name, target, self.loc, report)
    }
}

/// Validated modifier values of one declaration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ModifierValues {
    pub mount: Option<MountAnnotation>,
    /// `@external` with its chain argument, if any.
    pub external: Option<(Option<ChainName>, Loc)>,
    pub test: Option<Loc>,
    pub is_abstract: Option<Loc>,
    pub is_override: Option<Loc>,
}

impl ModifierValues {
    /// Checks `modifiers` against `target`, reporting invalid, misplaced and
    /// duplicate modifiers. Rejected modifiers leave no value behind.
    pub fn compile(modifiers: &Modifiers, target: ModifierTarget, report: &mut Report) -> Self {
        let mut values = Self::default();
        let mut seen = Vec::<String>::new();

        for (keyword, loc) in &modifiers.keywords {
            let code = format!("kw:{keyword}");
            if check_dup(&mut seen, &code, *loc, report) {
                continue;
            }

            let allowed = match keyword {
                KeywordModifier::Abstract => {
                    matches!(target, ModifierTarget::Module | ModifierTarget::Function)
                }
                KeywordModifier::Override => target == ModifierTarget::Function,
            };

            if !allowed {
                report.error(
                    *loc,
                    format!("modifier:target_type:{code}:{target}"),
                    format!("Cannot specify '{keyword}' for {}", target_text(target)),
                );
                continue;
            }

            match keyword {
                KeywordModifier::Abstract => values.is_abstract = Some(*loc),
                KeywordModifier::Override => values.is_override = Some(*loc),
            }
        }

        if let (Some(_), Some(loc)) = (values.is_abstract, values.is_override) {
            report.error(
                loc,
                "modifier:bad_combination:kw:abstract,kw:override",
                "Modifiers 'abstract' and 'override' cannot be combined",
            );
            values.is_override = None;
        }

        for annotation in &modifiers.annotations {
            let name = annotation.name.as_str();
            let loc = annotation.name.loc;
            let code = format!("ann:{name}");

            let Some(rule) = ANNOTATIONS.iter().find(|rule| rule.name == name) else {
                report.error(
                    loc,
                    format!("modifier:invalid:{code}"),
                    format!("Annotation '@{name}' is invalid"),
                );
                continue;
            };

            if check_dup(&mut seen, &code, loc, report) {
                continue;
            }

            let Some((_, arg)) = rule.targets.iter().find(|(t, _)| *t == target) else {
                report.error(
                    loc,
                    format!("modifier:target_type:{code}:{target}"),
                    format!("Cannot specify '@{name}' for {}", target_text(target)),
                );
                continue;
            };

            let value = annotation.arg.as_ref();
            match (arg, value) {
                (Arg::None, Some(_)) => {
                    report.error(
                        loc,
                        format!("ann:{name}:arg_count:1"),
                        format!("Annotation '@{name}' takes no arguments"),
                    );
                    continue;
                }
                (Arg::Required, None) => {
                    report.error(
                        loc,
                        format!("ann:{name}:arg_count:0"),
                        format!("Annotation '@{name}' needs one argument"),
                    );
                    continue;
                }
                _ => {}
            }

            match name {
                "mount" => {
                    let Some((text, arg_loc)) = value else { continue };
                    match MountPath::parse(text) {
                        Some(path) => values.mount = Some(MountAnnotation { path, loc: *arg_loc }),
                        None => report.error(
                            *arg_loc,
                            format!("ann:mount:invalid:{text}"),
                            format!("Invalid mount name: '{text}'"),
                        ),
                    }
                }
                "external" => match value {
                    Some((text, arg_loc)) if !is_valid_name(text) => report.error(
                        *arg_loc,
                        format!("ann:external:invalid:{text}"),
                        format!("Invalid chain name: '{text}'"),
                    ),
                    Some((text, _)) => {
                        values.external = Some((Some(ChainName::new(text.clone())), loc));
                    }
                    None => values.external = Some((None, loc)),
                },
                "test" => values.test = Some(loc),
                _ => unreachable!("annotation table and handlers out of sync: {name}"),
            }
        }

        values
    }

    /// Chain named by `@external("chain")`.
    pub fn external_chain(&self) -> Option<&ChainName> {
        self.external.as_ref().and_then(|(chain, _)| chain.as_ref())
    }
}

fn check_dup(seen: &mut Vec<String>, code: &str, loc: Loc, report: &mut Report) -> bool {
    if seen.iter().any(|c| c == code) {
        report.error(
            loc,
            format!("modifier:dup:{code}"),
            format!("Modifier '{code}' specified multiple times"),
        );
        true
    } else {
        seen.push(code.to_owned());
        false
    }
}

fn target_text(target: ModifierTarget) -> &'static str {
    match target {
        ModifierTarget::Module => "module",
        ModifierTarget::Import => "import",
        ModifierTarget::Namespace => "namespace",
        ModifierTarget::Function => "function",
        ModifierTarget::Entity => "entity",
        ModifierTarget::Struct => "struct",
        ModifierTarget::Operation => "operation",
        ModifierTarget::Query => "query",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use knit_span::SourceId;
    use knit_syntax::ast::{Annotation, Ident};

    fn loc() -> Loc {
        Loc::from_range(SourceId::from_usize(0), 0..1)
    }

    fn mount(parent: &str, path: &str, name: Option<&str>, target: ModifierTarget) -> Result<String, Vec<String>> {
        let mut report = Report::new();
        let parent = MountName::parse(parent).unwrap();
        let Some(path) = MountPath::parse(path) else {
            return Err(vec!["parse".to_owned()]);
        };

        match path.calculate(&parent, name, target, loc(), &mut report) {
            Some(m) => Ok(m.to_string()),
            None => Err(report.codes().into_iter().map(str::to_owned).collect()),
        }
    }

    fn annotation(name: &str, arg: Option<&str>) -> Annotation {
        Annotation {
            name: Ident::new(name, loc()),
            arg: arg.map(|a| (EcoString::from(a), loc())),
        }
    }

    #[test]
    fn absolute_and_relative_paths() {
        use ModifierTarget::*;

        assert_eq!(mount("x.y", "a.b", Some("e"), Entity), Ok("a.b".into()));
        assert_eq!(mount("x.y", ".a", Some("e"), Entity), Ok("x.y.a".into()));
        assert_eq!(mount("x.y", "^.a", Some("e"), Entity), Ok("x.a".into()));
        assert_eq!(mount("x.y", "^^.a", Some("e"), Entity), Ok("a".into()));
        assert_eq!(mount("x.y", "a.", Some("e"), Entity), Ok("a.e".into()));
        assert_eq!(mount("x.y", ".", Some("e"), Entity), Err(vec!["parse".into()]));
        assert_eq!(mount("x", "", None, Namespace), Ok("".into()));
    }

    #[test]
    fn path_errors() {
        use ModifierTarget::*;

        assert_eq!(mount("x", "^^.a", Some("e"), Query), Err(vec!["ann:mount:up:1:2".into()]));
        assert_eq!(mount("x", "", Some("e"), Query), Err(vec!["ann:mount:empty:QUERY".into()]));
        assert_eq!(mount("x", "^", Some("e"), Entity), Err(vec!["ann:mount:invalid:^:ENTITY".into()]));
        assert_eq!(mount("x", "^", None, Namespace), Ok("".into()));
        assert_eq!(
            mount("", "foo.", None, Namespace),
            Err(vec!["ann:mount:tail:no_name:foo.:NAMESPACE".into()])
        );

        for bad in ["foo bar", "foo-bar", "3", "7foo", "a..b"] {
            assert!(MountPath::parse(bad).is_none(), "{bad}");
        }
    }

    #[test]
    fn compiles_valid_modifiers() {
        let mut report = Report::new();
        let modifiers = Modifiers {
            annotations: vec![annotation("mount", Some("app")), annotation("test", None)],
            keywords: vec![(KeywordModifier::Abstract, loc())],
        };

        let values = ModifierValues::compile(&modifiers, ModifierTarget::Module, &mut report);

        assert!(report.is_empty(), "{:?}", report.codes());
        assert_eq!(values.mount.unwrap().path.as_str(), "app");
        assert!(values.test.is_some());
        assert!(values.is_abstract.is_some());
    }

    #[test]
    fn reports_invalid_modifiers() {
        let mut report = Report::new();
        let modifiers = Modifiers {
            annotations: vec![
                annotation("foo", None),
                annotation("mount", Some("f")),
                annotation("external", None),
                annotation("external", Some("c")),
            ],
            keywords: vec![(KeywordModifier::Override, loc())],
        };

        let values = ModifierValues::compile(&modifiers, ModifierTarget::Import, &mut report);

        assert_eq!(
            report.codes(),
            vec![
                "modifier:target_type:kw:override:IMPORT",
                "modifier:invalid:ann:foo",
                "modifier:target_type:ann:mount:IMPORT",
                "ann:external:arg_count:0",
                "modifier:dup:ann:external",
            ]
        );
        assert_eq!(values, ModifierValues::default());
    }

    #[test]
    fn external_chain_is_read_from_the_argument() {
        let mut report = Report::new();
        let modifiers = Modifiers {
            annotations: vec![annotation("external", Some("other"))],
            keywords: vec![],
        };

        let values = ModifierValues::compile(&modifiers, ModifierTarget::Namespace, &mut report);

        assert!(report.is_empty());
        assert_eq!(values.external_chain(), Some(&ChainName::new("other")));
    }
}
