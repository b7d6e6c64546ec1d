//! Outline syntax of knit source files.

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod token;

use knit_span::{Report, SourceId};

/// Turns the text of one source file into its outline.
///
/// Syntax errors are reported into `report`; `None` means the file could not
/// be parsed at all.
pub trait FileParser {
    fn parse_file(&self, source: SourceId, text: &str, report: &mut Report) -> Option<ast::File>;
}

/// The default [`FileParser`]: chumsky lexer followed by the outline parser.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct OutlineParser;

impl FileParser for OutlineParser {
    fn parse_file(&self, source: SourceId, text: &str, report: &mut Report) -> Option<ast::File> {
        let tokens = lexer::tokenize(source, text, report)?;
        parser::parse_file(source, &tokens, text.len(), report)
    }
}

pub mod prelude {
    pub use crate::ast::*;
    pub use crate::lexer::tokenize;
    pub use crate::{FileParser, OutlineParser};
}
