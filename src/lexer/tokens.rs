//! Token definitions for the fpc lexer

use crate::common::Span;
use logos::Logos;
use serde::{Deserialize, Serialize};

/// A token with its kind, span, and text
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
    pub text: String,
}

/// Token kinds recognized by the lexer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Logos, Serialize, Deserialize)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(skip r"//[^\n]*")]
#[logos(skip r"/\*([^*]|\*+[^*/])*\*+/")]
pub enum TokenKind {
    // Keywords
    #[token("fn")]
    Fn,
    #[token("let")]
    Let,
    #[token("return")]
    Return,
    #[token("namespace")]
    Namespace,
    #[token("as")]
    As,

    /// A whole `#pragma ...` line; the directive is parsed separately
    #[regex(r"#[ \t]*pragma[^\n]*")]
    Pragma,

    // Literals
    #[regex(r"[0-9]+\.[0-9]+([eE][+-]?[0-9]+)?(_?(f16|f32|f64|f80|f128))?")]
    #[regex(r"[0-9]+_?(f16|f32|f64|f80|f128)")]
    FloatLit,
    #[regex(r"[0-9]+")]
    IntLit,

    // Identifiers
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*")]
    Ident,

    // Delimiters
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,

    // Punctuation
    #[token(",")]
    Comma,
    #[token(";")]
    Semi,
    #[token(":")]
    Colon,
    #[token("::")]
    ColonColon,
    #[token("->")]
    Arrow,
    #[token("|")]
    Pipe,

    // Operators
    #[token("=")]
    Eq,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("+=")]
    PlusEq,
    #[token("-=")]
    MinusEq,
    #[token("*=")]
    StarEq,
    #[token("/=")]
    SlashEq,

    /// End of input, appended by [`lex`](super::lex)
    Eof,
}

impl TokenKind {
    /// Human-readable name used in diagnostics
    pub fn describe(self) -> &'static str {
        match self {
            TokenKind::Fn => "`fn`",
            TokenKind::Let => "`let`",
            TokenKind::Return => "`return`",
            TokenKind::Namespace => "`namespace`",
            TokenKind::As => "`as`",
            TokenKind::Pragma => "`#pragma`",
            TokenKind::FloatLit => "float literal",
            TokenKind::IntLit => "integer literal",
            TokenKind::Ident => "identifier",
            TokenKind::LParen => "`(`",
            TokenKind::RParen => "`)`",
            TokenKind::LBrace => "`{`",
            TokenKind::RBrace => "`}`",
            TokenKind::Lt => "`<`",
            TokenKind::Gt => "`>`",
            TokenKind::Comma => "`,`",
            TokenKind::Semi => "`;`",
            TokenKind::Colon => "`:`",
            TokenKind::ColonColon => "`::`",
            TokenKind::Arrow => "`->`",
            TokenKind::Pipe => "`|`",
            TokenKind::Eq => "`=`",
            TokenKind::Plus => "`+`",
            TokenKind::Minus => "`-`",
            TokenKind::Star => "`*`",
            TokenKind::Slash => "`/`",
            TokenKind::Percent => "`%`",
            TokenKind::PlusEq => "`+=`",
            TokenKind::MinusEq => "`-=`",
            TokenKind::StarEq => "`*=`",
            TokenKind::SlashEq => "`/=`",
            TokenKind::Eof => "end of file",
        }
    }
}
