//! Lexer for fpc source files

mod tokens;

pub use tokens::{Token, TokenKind};

use crate::common::Span;
use crate::diagnostics::{CompileError, SourceFile};
use logos::Logos;

/// Tokenize `source`, reporting errors against an anonymous file
pub fn lex(source: &str) -> miette::Result<Vec<Token>> {
    lex_file(&SourceFile::new("<input>", source)).map_err(Into::into)
}

/// Tokenize a source file. The result always ends with [`TokenKind::Eof`].
pub fn lex_file(file: &SourceFile) -> Result<Vec<Token>, CompileError> {
    let source: &str = &file.content;
    let mut lexer = TokenKind::lexer(source);
    let mut tokens = Vec::new();

    while let Some(result) = lexer.next() {
        let span = Span::from(lexer.span());
        match result {
            Ok(kind) => tokens.push(Token {
                kind,
                span,
                text: lexer.slice().to_string(),
            }),
            Err(()) => {
                return Err(CompileError::InvalidToken {
                    text: lexer.slice().to_string(),
                    span: span.into(),
                    src: file.to_named_source(),
                });
            }
        }
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        span: Span::new(source.len(), source.len()),
        text: String::new(),
    });
    tracing::trace!(count = tokens.len(), file = %file.name, "lexed");
    Ok(tokens)
}
