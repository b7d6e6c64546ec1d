use chumsky::prelude::*;

use knit_span::Loc;

use super::{
    primitives::{ctrl, group, ident, kw, path, plain, statement_tail, string},
    KnitParser, Locator,
};
use crate::{
    ast::*,
    token::{Delimiter, Keyword, Token},
};

/// A member as parsed, before misplaced headers are split off.
#[derive(Debug, Clone)]
pub enum Item {
    Import(Import),
    Definition(Definition),
    Namespace {
        modifiers: Modifiers,
        name: Option<Path>,
        items: Vec<Item>,
        loc: Loc,
    },
    MisplacedHeader(Loc),
    Skipped,
}

impl Item {
    fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        match &mut self {
            Item::Import(import) => import.modifiers = modifiers,
            Item::Definition(def) => def.modifiers = modifiers,
            Item::Namespace { modifiers: m, .. } => *m = modifiers,
            Item::MisplacedHeader(_) | Item::Skipped => {}
        }
        self
    }
}

#[derive(Debug, Clone)]
enum Modifier {
    Annotation(Annotation),
    Keyword(KeywordModifier, Loc),
}

pub fn file_parser<'t>(
    at: Locator<'t>,
) -> impl KnitParser<'t, (Option<ModuleHeader>, Vec<Item>)> {
    header_parser(at)
        .or_not()
        .then(item_parser(at).repeated().collect())
        .then_ignore(end())
}

/// `@a @b("x") abstract override`
pub fn modifiers_parser<'t>(at: Locator<'t>) -> impl KnitParser<'t, Modifiers> {
    let annotation = ctrl(Token::At)
        .ignore_then(ident(at))
        .then(
            string(at)
                .delimited_by(
                    ctrl(Token::Open(Delimiter::Paren)),
                    ctrl(Token::Close(Delimiter::Paren)),
                )
                .or_not(),
        )
        .map(|(name, arg)| Modifier::Annotation(Annotation { name, arg }));

    let keyword = choice((
        kw(at, Keyword::Abstract).map(|loc| Modifier::Keyword(KeywordModifier::Abstract, loc)),
        kw(at, Keyword::Override).map(|loc| Modifier::Keyword(KeywordModifier::Override, loc)),
    ));

    choice((annotation, keyword))
        .repeated()
        .collect::<Vec<_>>()
        .map(|list| {
            let mut modifiers = Modifiers::default();
            for modifier in list {
                match modifier {
                    Modifier::Annotation(a) => modifiers.annotations.push(a),
                    Modifier::Keyword(k, loc) => modifiers.keywords.push((k, loc)),
                }
            }
            modifiers
        })
}

pub fn header_parser<'t>(at: Locator<'t>) -> impl KnitParser<'t, ModuleHeader> {
    modifiers_parser(at)
        .then(kw(at, Keyword::Module))
        .then_ignore(
            ctrl(Token::Semicolon)
                .labelled("';'")
                .recover_with(via_parser(empty())),
        )
        .map(|(modifiers, loc)| ModuleHeader { modifiers, loc })
}

/// `import [alias:] a.b [.* | .{f, g: h}];`
pub fn import_parser<'t>(at: Locator<'t>) -> impl KnitParser<'t, Import> {
    let alias = ident(at).then_ignore(ctrl(Token::Colon));

    let exact = alias
        .clone()
        .or_not()
        .then(path(at))
        .map(|(alias, path)| ExactItem { alias, path })
        .separated_by(ctrl(Token::Comma))
        .allow_trailing()
        .collect::<Vec<_>>()
        .delimited_by(
            ctrl(Token::Open(Delimiter::Brace)),
            ctrl(Token::Close(Delimiter::Brace)),
        )
        .map(ImportTarget::Exact);

    let wildcard = just(Token::Star).map_with(move |_, e| ImportTarget::Wildcard(at.loc(e.span())));

    let target = ctrl(Token::Dot)
        .ignore_then(choice((wildcard, exact)))
        .or_not()
        .map(|target| target.unwrap_or(ImportTarget::Module));

    kw(at, Keyword::Import)
        .then(alias.or_not())
        .then(path(at))
        .then(target)
        .then_ignore(ctrl(Token::Semicolon).labelled("';'"))
        .map(|(((loc, alias), path), target)| Import {
            modifiers: Modifiers::default(),
            alias,
            path,
            target,
            loc,
        })
}

/// `(params) [: type] ( {body} | = expr ; | ; )`, whether a body exists.
pub fn function_body<'t>() -> impl KnitParser<'t, bool> {
    let signature = group()
        .and_is(ctrl(Token::Open(Delimiter::Brace)).not())
        .or(plain(&[Token::Semicolon, Token::Op('=')]))
        .repeated();

    let body = choice((
        ctrl(Token::Semicolon).to(false),
        ctrl(Token::Op('=')).ignore_then(statement_tail()).to(true),
        group().to(true),
    ))
    .labelled("function body or ';'");

    signature.ignore_then(body)
}

/// `;` or `{ name: type [tail]; other; }`. Attribute tails are not part of the outline.
pub fn attributes_parser<'t>(at: Locator<'t>) -> impl KnitParser<'t, Vec<Attribute>> {
    let attribute = ident(at)
        .then_ignore(ctrl(Token::Colon))
        .then(path(at))
        .then_ignore(statement_tail())
        .map(|(name, ty)| Some(Attribute { name, ty }));

    let body = choice((attribute, statement_tail().to(None)))
        .repeated()
        .collect::<Vec<_>>()
        .delimited_by(
            ctrl(Token::Open(Delimiter::Brace)),
            ctrl(Token::Close(Delimiter::Brace)),
        )
        .map(|attributes| attributes.into_iter().flatten().collect());

    choice((ctrl(Token::Semicolon).to(Vec::new()), body))
}

pub fn definition_parser<'t>(at: Locator<'t>) -> impl KnitParser<'t, Definition> {
    let function_like = select! {
        Token::Keyword(Keyword::Function) => DefinitionKind::Function,
        Token::Keyword(Keyword::Operation) => DefinitionKind::Operation,
        Token::Keyword(Keyword::Query) => DefinitionKind::Query,
    }
    .map_with(move |kind, e| (kind, at.loc(e.span())))
    .then(path(at))
    .then(function_body())
    .map(|(((kind, loc), name), body)| Definition {
        modifiers: Modifiers::default(),
        kind,
        name,
        body,
        attributes: Vec::new(),
        loc,
    });

    let record_like = select! {
        Token::Keyword(Keyword::Entity) => DefinitionKind::Entity,
        Token::Keyword(Keyword::Struct) => DefinitionKind::Struct,
    }
    .map_with(move |kind, e| (kind, at.loc(e.span())))
    .then(path(at))
    .then(attributes_parser(at))
    .map(|(((kind, loc), name), attributes)| Definition {
        modifiers: Modifiers::default(),
        kind,
        name,
        body: false,
        attributes,
        loc,
    });

    choice((function_like, record_like))
}

/// Skips the rest of a broken member: up to the next `;` or `{..}` at this level.
/// Never consumes a closing delimiter, those belong to an enclosing namespace.
pub fn skip_member<'t>() -> impl KnitParser<'t, ()> {
    let filler = group()
        .and_is(ctrl(Token::Open(Delimiter::Brace)).not())
        .or(plain(&[Token::Semicolon]));

    choice((
        filler
            .clone()
            .repeated()
            .then(choice((ctrl(Token::Semicolon), group())))
            .ignored(),
        filler.repeated().at_least(1).ignored(),
    ))
}

pub fn item_parser<'t>(at: Locator<'t>) -> impl KnitParser<'t, Item> {
    recursive(|item| {
        let namespace = kw(at, Keyword::Namespace)
            .then(path(at).or_not())
            .then(
                item.repeated()
                    .collect::<Vec<_>>()
                    .delimited_by(
                        ctrl(Token::Open(Delimiter::Brace)),
                        ctrl(Token::Close(Delimiter::Brace)),
                    ),
            )
            .map(|((loc, name), items)| Item::Namespace {
                modifiers: Modifiers::default(),
                name,
                items,
                loc,
            });

        let misplaced_header = kw(at, Keyword::Module)
            .then_ignore(ctrl(Token::Semicolon).or_not())
            .map(Item::MisplacedHeader);

        modifiers_parser(at)
            .then(
                choice((
                    import_parser(at).map(Item::Import),
                    namespace,
                    definition_parser(at).map(Item::Definition),
                    misplaced_header,
                ))
                .labelled("declaration"),
            )
            .map(|(modifiers, item)| item.with_modifiers(modifiers))
            .recover_with(via_parser(skip_member().to(Item::Skipped)))
    })
    .boxed()
}
