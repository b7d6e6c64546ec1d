//! Chumsky parsers over the token stream. Only the outline of a file is
//! kept; parameter lists, return types and bodies are skipped by balancing
//! delimiters.

use chumsky::prelude::*;
use log::debug;
use owo_colors::OwoColorize;

use knit_span::{Loc, Report, SourceId, Span, Spanned};

use crate::{
    ast::{File, Member, Namespace},
    token::Token,
};

mod primitives;
mod rules;

use rules::Item;

pub type TokenInput<'t> = &'t [Token<'t>];
pub type Error<'t> = Rich<'t, Token<'t>>;
pub type Extra<'t> = extra::Err<Error<'t>>;

pub trait KnitParser<'t, O>: Parser<'t, TokenInput<'t>, O, Extra<'t>> + Clone {}

impl<'t, O, P> KnitParser<'t, O> for P where P: Parser<'t, TokenInput<'t>, O, Extra<'t>> + Clone {}

/// Maps token indices back to source locations.
#[derive(Debug, Clone, Copy)]
pub struct Locator<'t> {
    source: SourceId,
    spans: &'t [Span],
    eof: Span,
}

impl<'t> Locator<'t> {
    pub fn new(source: SourceId, spans: &'t [Span], text_len: usize) -> Self {
        Self {
            source,
            spans,
            eof: Span::new(text_len, text_len),
        }
    }

    /// Location of the first token of `span`, or the end of file.
    pub fn loc(&self, span: SimpleSpan) -> Loc {
        let span = self.spans.get(span.start).copied().unwrap_or(self.eof);
        Loc::new(self.source, span)
    }
}

/// Parses the tokens of one file. Returns `None` if any syntax error was reported.
pub fn parse_file(
    source: SourceId,
    tokens: &[Spanned<Token<'_>>],
    text_len: usize,
    report: &mut Report,
) -> Option<File> {
    let (kinds, spans): (Vec<_>, Vec<_>) = tokens.iter().copied().unzip();
    let at = Locator::new(source, &spans, text_len);

    let (output, errors) = rules::file_parser(at)
        .parse(kinds.as_slice())
        .into_output_errors();

    let mut failed = !errors.is_empty();
    for e in &errors {
        report.error(at.loc(*e.span()), "syntax:unexpected", e.to_string());
    }

    let (header, items) = output?;

    let mut misplaced = Vec::new();
    let members = lower(items, &mut misplaced);
    for loc in misplaced {
        failed = true;
        report.error(
            loc,
            "syntax:module_header",
            "Module header must be the first declaration of a file",
        );
    }

    debug!(
        "{} {source:?}: {} members, {} errors",
        "Parsed".bold().bright_white(),
        members.len(),
        errors.len()
    );

    (!failed).then(|| File {
        header,
        members,
        loc: at.loc(SimpleSpan::from(0..0)),
    })
}

fn lower(items: Vec<Item>, misplaced: &mut Vec<Loc>) -> Vec<Member> {
    items
        .into_iter()
        .filter_map(|item| match item {
            Item::Import(import) => Some(Member::Import(import)),
            Item::Definition(def) => Some(Member::Definition(def)),
            Item::Namespace {
                modifiers,
                name,
                items,
                loc,
            } => Some(Member::Namespace(Namespace {
                modifiers,
                name,
                members: lower(items, misplaced),
                loc,
            })),
            Item::MisplacedHeader(loc) => {
                misplaced.push(loc);
                None
            }
            Item::Skipped => None,
        })
        .collect()
}
