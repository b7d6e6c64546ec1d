use derive_more::Display;
use std::fmt;

use knit_span::Spanned;

pub type Tokens<'a> = Vec<Spanned<Token<'a>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Delimiter {
    Paren,
    Bracket,
    Brace,
}

impl Delimiter {
    pub fn open(self) -> char {
        match self {
            Delimiter::Paren => '(',
            Delimiter::Bracket => '[',
            Delimiter::Brace => '{',
        }
    }

    pub fn close(self) -> char {
        match self {
            Delimiter::Paren => ')',
            Delimiter::Bracket => ']',
            Delimiter::Brace => '}',
        }
    }
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Keyword {
    #[display("module")]
    Module,
    #[display("abstract")]
    Abstract,
    #[display("override")]
    Override,
    #[display("import")]
    Import,
    #[display("namespace")]
    Namespace,
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

impl Keyword {
    pub fn from_ident(ident: &str) -> Option<Self> {
        Some(match ident {
            "module" => Keyword::Module,
            "abstract" => Keyword::Abstract,
            "override" => Keyword::Override,
            "import" => Keyword::Import,
            "namespace" => Keyword::Namespace,
            "function" => Keyword::Function,
            "entity" => Keyword::Entity,
            "struct" => Keyword::Struct,
            "operation" => Keyword::Operation,
            "query" => Keyword::Query,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Token<'src> {
    Ident(&'src str),
    Keyword(Keyword),
    Str(&'src str),
    Num(&'src str),
    At,
    Dot,
    Colon,
    Semicolon,
    Comma,
    Star,
    /// Any other operator character, only meaningful inside skipped bodies.
    Op(char),
    Open(Delimiter),
    Close(Delimiter),
}

impl fmt::Display for Token<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Ident(s) => write!(f, "{s}"),
            Token::Keyword(k) => write!(f, "{k}"),
            Token::Str(s) => write!(f, "\"{s}\""),
            Token::Num(n) => write!(f, "{n}"),
            Token::At => write!(f, "@"),
            Token::Dot => write!(f, "."),
            Token::Colon => write!(f, ":"),
            Token::Semicolon => write!(f, ";"),
            Token::Comma => write!(f, ","),
            Token::Star => write!(f, "*"),
            Token::Op(c) => write!(f, "{c}"),
            Token::Open(d) => write!(f, "{}", d.open()),
            Token::Close(d) => write!(f, "{}", d.close()),
        }
    }
}
