use chumsky::prelude::*;
use log::debug;
use owo_colors::OwoColorize;

use knit_span::{Diagnostic, Loc, Report, SourceId};

use crate::token::{Delimiter, Keyword, Token, Tokens};

pub type Span = SimpleSpan<usize>;
pub type Extra<'src> = extra::Err<Rich<'src, char, Span>>;

/// Tokenizes `input`, reporting lexing errors against `source`.
///
/// Returns `None` if any error occurred.
pub fn tokenize<'src>(source: SourceId, input: &'src str, report: &mut Report) -> Option<Tokens<'src>> {
    let (tokens, errors) = lexer().parse(input).into_output_errors();

    let failed = !errors.is_empty();
    for e in errors {
        let loc = Loc::from_range(source, e.span().into_range());
        report.add_diagnostic(Diagnostic::error(loc, "syntax:token", e.to_string()));
    }

    let tokens = tokens?
        .into_iter()
        .map(|(token, span)| (token, knit_span::Span::from(span.into_range())))
        .collect::<Tokens>();

    debug!(
        "{} {source:?}: {} tokens",
        "Tokens".bold().bright_white(),
        tokens.len()
    );

    (!failed).then_some(tokens)
}

pub fn lexer<'src>() -> impl Parser<'src, &'src str, Vec<(Token<'src>, Span)>, Extra<'src>> {
    let num = text::int(10)
        .then(just('.').then(text::digits(10)).or_not())
        .to_slice()
        .map(Token::Num);

    let escape = just('\\').then(any()).ignored();

    let string = just('"')
        .ignore_then(
            any()
                .filter(|c| *c != '\\' && *c != '"')
                .ignored()
                .or(escape.clone())
                .repeated()
                .to_slice(),
        )
        .then_ignore(just('"'))
        .map(Token::Str);

    // Single-quoted strings are only ever skipped, reuse the same token
    let quoted = just('\'')
        .ignore_then(
            any()
                .filter(|c| *c != '\\' && *c != '\'')
                .ignored()
                .or(escape)
                .repeated()
                .to_slice(),
        )
        .then_ignore(just('\''))
        .map(Token::Str);

    let ctrl = choice((
        just('@').to(Token::At),
        just('.').to(Token::Dot),
        just(':').to(Token::Colon),
        just(';').to(Token::Semicolon),
        just(',').to(Token::Comma),
        just('*').to(Token::Star),
    ));

    let delim = choice((
        just('(').to(Token::Open(Delimiter::Paren)),
        just(')').to(Token::Close(Delimiter::Paren)),
        just('[').to(Token::Open(Delimiter::Bracket)),
        just(']').to(Token::Close(Delimiter::Bracket)),
        just('{').to(Token::Open(Delimiter::Brace)),
        just('}').to(Token::Close(Delimiter::Brace)),
    ));

    let op = one_of("=+-<>!&|%^~?/$#").map(Token::Op);

    // Keywords and identifiers
    let word = text::ident().map(|ident: &str| match Keyword::from_ident(ident) {
        Some(keyword) => Token::Keyword(keyword),
        None => Token::Ident(ident),
    });

    let token = choice((num, string, quoted, ctrl, delim, word, op));

    let line_comment = just("//")
        .then(any().and_is(just('\n').not()).repeated())
        .ignored();

    let block_comment = just("/*")
        .then(any().and_is(just("*/").not()).repeated())
        .then(just("*/"))
        .ignored();

    let comment = line_comment.or(block_comment).padded();

    token
        .map_with(|t, e| (t, e.span()))
        .padded_by(comment.repeated())
        .padded()
        // If we encounter an error, skip and attempt to lex the next character as a token instead
        .recover_with(skip_then_retry_until(any().ignored(), end()))
        .repeated()
        .collect()
}
