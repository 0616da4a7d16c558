//! Lexer tests

use fpc::lexer::{TokenKind, lex};

fn kinds(source: &str) -> Vec<TokenKind> {
    lex(source).unwrap().into_iter().map(|t| t.kind).collect()
}

#[test]
fn test_lex_empty() {
    let tokens = lex("").unwrap();
    assert_eq!(tokens.len(), 1);
    assert_eq!(tokens[0].kind, TokenKind::Eof);
}

#[test]
fn test_lex_whitespace_and_comments() {
    let tokens = lex("  // line comment\n /* block\n comment */ \t").unwrap();
    assert_eq!(tokens.len(), 1);
    assert_eq!(tokens[0].kind, TokenKind::Eof);
}

#[test]
fn test_lex_function_header() {
    assert_eq!(
        kinds("fn f(a: f32) -> f32"),
        vec![
            TokenKind::Fn,
            TokenKind::Ident,
            TokenKind::LParen,
            TokenKind::Ident,
            TokenKind::Colon,
            TokenKind::Ident,
            TokenKind::RParen,
            TokenKind::Arrow,
            TokenKind::Ident,
            TokenKind::Eof,
        ]
    );
}

#[test]
fn test_lex_keywords() {
    assert_eq!(
        kinds("fn let return namespace as"),
        vec![
            TokenKind::Fn,
            TokenKind::Let,
            TokenKind::Return,
            TokenKind::Namespace,
            TokenKind::As,
            TokenKind::Eof,
        ]
    );
}

#[test]
fn test_lex_float_literals() {
    let tokens = lex("1.0 2.5e-3 1.0f32 3f64 7.25_f80 42").unwrap();
    assert_eq!(tokens[0].kind, TokenKind::FloatLit);
    assert_eq!(tokens[1].kind, TokenKind::FloatLit);
    assert_eq!(tokens[1].text, "2.5e-3");
    assert_eq!(tokens[2].kind, TokenKind::FloatLit);
    assert_eq!(tokens[2].text, "1.0f32");
    assert_eq!(tokens[3].kind, TokenKind::FloatLit);
    assert_eq!(tokens[4].kind, TokenKind::FloatLit);
    assert_eq!(tokens[5].kind, TokenKind::IntLit);
}

#[test]
fn test_lex_pragma_is_one_token() {
    let tokens = lex("#pragma float_control(except, on, push)\nfn").unwrap();
    assert_eq!(tokens[0].kind, TokenKind::Pragma);
    assert_eq!(tokens[0].text, "#pragma float_control(except, on, push)");
    assert_eq!(tokens[1].kind, TokenKind::Fn);
}

#[test]
fn test_lex_indented_pragma() {
    let tokens = lex("{\n    #  pragma clang fp eval_method(double)\n}").unwrap();
    assert_eq!(tokens[1].kind, TokenKind::Pragma);
    assert_eq!(tokens[2].kind, TokenKind::RBrace);
}

#[test]
fn test_lex_operators() {
    assert_eq!(
        kinds("+ - * / % += -= *= /= = :: | < >"),
        vec![
            TokenKind::Plus,
            TokenKind::Minus,
            TokenKind::Star,
            TokenKind::Slash,
            TokenKind::Percent,
            TokenKind::PlusEq,
            TokenKind::MinusEq,
            TokenKind::StarEq,
            TokenKind::SlashEq,
            TokenKind::Eq,
            TokenKind::ColonColon,
            TokenKind::Pipe,
            TokenKind::Lt,
            TokenKind::Gt,
            TokenKind::Eof,
        ]
    );
}

#[test]
fn test_lex_spans() {
    let tokens = lex("let  x").unwrap();
    assert_eq!(tokens[0].span.start, 0);
    assert_eq!(tokens[0].span.end, 3);
    assert_eq!(tokens[1].span.start, 5);
    assert_eq!(tokens[2].span.start, 6);
}

#[test]
fn test_lex_invalid_character() {
    assert!(lex("fn f() { a $ b }").is_err());
}
