use chumsky::prelude::*;
use ecow::EcoString;

use knit_span::Loc;

use super::{KnitParser, Locator};
use crate::{
    ast::{Ident, Path},
    token::{Delimiter, Keyword, Token},
};

pub fn kw<'t>(at: Locator<'t>, keyword: Keyword) -> impl KnitParser<'t, Loc> {
    just(Token::Keyword(keyword)).map_with(move |_, e| at.loc(e.span()))
}

pub fn ctrl<'t>(token: Token<'t>) -> impl KnitParser<'t, ()> {
    just(token).ignored()
}

pub fn ident<'t>(at: Locator<'t>) -> impl KnitParser<'t, Ident> {
    select! { Token::Ident(name) => name }
        .map_with(move |name, e| Ident::new(name, at.loc(e.span())))
        .labelled("identifier")
}

pub fn string<'t>(at: Locator<'t>) -> impl KnitParser<'t, (EcoString, Loc)> {
    select! { Token::Str(s) => s }
        .map_with(move |s, e| (EcoString::from(s), at.loc(e.span())))
        .labelled("string")
}

/// `a.b.c`. A dot not followed by a name is left for the caller.
pub fn path<'t>(at: Locator<'t>) -> impl KnitParser<'t, Path> {
    ident(at)
        .then(
            ctrl(Token::Dot)
                .ignore_then(ident(at))
                .repeated()
                .collect::<Vec<_>>(),
        )
        .map(|(first, rest)| {
            let mut parts = vec![first];
            parts.extend(rest);
            Path::new(parts)
        })
}

/// Any token that is neither a delimiter nor one of `stop`.
pub fn plain<'t>(stop: &'static [Token<'static>]) -> impl KnitParser<'t, ()> {
    any()
        .filter(move |t: &Token<'t>| {
            !matches!(t, Token::Open(_) | Token::Close(_)) && !stop.iter().any(|s| s == t)
        })
        .ignored()
}

/// A balanced `(..)`, `[..]` or `{..}` group, its contents are not looked at.
pub fn group<'t>() -> impl KnitParser<'t, ()> {
    recursive(|group| {
        let inner = group.or(plain(&[])).repeated();

        choice([Delimiter::Paren, Delimiter::Bracket, Delimiter::Brace].map(|d| {
            inner
                .clone()
                .delimited_by(ctrl(Token::Open(d)), ctrl(Token::Close(d)))
        }))
    })
    .boxed()
}

/// Everything up to and including the next `;` outside of groups.
pub fn statement_tail<'t>() -> impl KnitParser<'t, ()> {
    group()
        .or(plain(&[Token::Semicolon]))
        .repeated()
        .then_ignore(ctrl(Token::Semicolon).labelled("';'"))
}
