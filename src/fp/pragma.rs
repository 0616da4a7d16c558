//! Floating-point pragma directives
//!
//! The lexer hands over the raw text that follows `#pragma`; this module
//! turns it into [`FpPragma`] directives. Pragmas that do not concern
//! floating point (`#pragma once`, `#pragma clang diagnostic ...`) come back
//! as [`PragmaDirective::Unrecognized`] so the caller can warn and move on.

use super::mode::{EvalMethod, ExceptBehavior, FpContract};
use logos::Logos;
use thiserror::Error;

/// A single floating-point control directive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FpPragma {
    /// `float_control(precise, on|off[, push])`
    Precise { on: bool, push: bool },
    /// `float_control(except, on|off[, push])`
    Except { on: bool, push: bool },
    /// `float_control(push)`
    Push,
    /// `float_control(pop)`
    Pop,
    /// `float_control(source|double|extended)` or `clang fp eval_method(..)`
    EvalMethod(EvalMethod),
    /// `clang fp contract(..)` or `STDC FP_CONTRACT ..`
    Contract(FpContract),
    /// `clang fp exceptions(..)`
    Exceptions(ExceptBehavior),
    /// `STDC FENV_ACCESS ON|OFF|DEFAULT`
    FenvAccess(bool),
}

/// Result of classifying a `#pragma` line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PragmaDirective {
    /// One or more floating-point directives, applied in order
    Float(Vec<FpPragma>),
    /// A pragma this compiler does not handle, named by its first word
    Unrecognized(String),
}

/// Pragma parse failure
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PragmaError {
    #[error("malformed `#pragma {pragma}`: {reason}")]
    Malformed { pragma: String, reason: String },
}

#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"[ \t\r\n]+")]
enum PragmaToken {
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*")]
    Word,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token(",")]
    Comma,
}

/// Parse the text that follows `#pragma`
pub fn parse_pragma(text: &str) -> Result<PragmaDirective, PragmaError> {
    let text = text.trim();
    let tokens = tokenize(text)?;
    let mut cursor = Cursor {
        tokens: &tokens,
        pos: 0,
        text,
    };

    let Some(head) = cursor.word() else {
        return Ok(PragmaDirective::Unrecognized(String::new()));
    };

    match head {
        "float_control" => parse_float_control(&mut cursor),
        "clang" if cursor.peek_word() == Some("fp") => {
            cursor.word();
            parse_clang_fp(&mut cursor)
        }
        "STDC" => parse_stdc(&mut cursor),
        other => Ok(PragmaDirective::Unrecognized(other.to_string())),
    }
}

fn tokenize(text: &str) -> Result<Vec<(PragmaToken, &str)>, PragmaError> {
    let mut lexer = PragmaToken::lexer(text);
    let mut tokens = Vec::new();
    while let Some(result) = lexer.next() {
        match result {
            Ok(token) => tokens.push((token, lexer.slice())),
            Err(()) => {
                return Err(malformed(
                    text,
                    format!("unexpected character `{}`", lexer.slice()),
                ));
            }
        }
    }
    Ok(tokens)
}

fn malformed(text: &str, reason: impl Into<String>) -> PragmaError {
    PragmaError::Malformed {
        pragma: text.to_string(),
        reason: reason.into(),
    }
}

struct Cursor<'a> {
    tokens: &'a [(PragmaToken, &'a str)],
    pos: usize,
    text: &'a str,
}

impl<'a> Cursor<'a> {
    fn peek(&self) -> Option<PragmaToken> {
        self.tokens.get(self.pos).map(|(kind, _)| *kind)
    }

    fn peek_word(&self) -> Option<&'a str> {
        match self.tokens.get(self.pos) {
            Some((PragmaToken::Word, text)) => Some(*text),
            _ => None,
        }
    }

    fn word(&mut self) -> Option<&'a str> {
        let word = self.peek_word()?;
        self.pos += 1;
        Some(word)
    }

    fn expect_word(&mut self, what: &str) -> Result<&'a str, PragmaError> {
        self.word()
            .ok_or_else(|| malformed(self.text, format!("expected {what}")))
    }

    fn expect(&mut self, token: PragmaToken, what: &str) -> Result<(), PragmaError> {
        if self.peek() == Some(token) {
            self.pos += 1;
            Ok(())
        } else {
            Err(malformed(self.text, format!("expected `{what}`")))
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn expect_end(&self) -> Result<(), PragmaError> {
        if self.at_end() {
            Ok(())
        } else {
            Err(malformed(self.text, "unexpected trailing tokens"))
        }
    }

    /// `( word {, word} )`
    fn argument_list(&mut self) -> Result<Vec<&'a str>, PragmaError> {
        self.expect(PragmaToken::LParen, "(")?;
        let mut args = vec![self.expect_word("an argument")?];
        while self.peek() == Some(PragmaToken::Comma) {
            self.pos += 1;
            args.push(self.expect_word("an argument after `,`")?);
        }
        self.expect(PragmaToken::RParen, ")")?;
        Ok(args)
    }
}

fn on_off(text: &str, word: &str) -> Result<bool, PragmaError> {
    match word {
        "on" => Ok(true),
        "off" => Ok(false),
        other => Err(malformed(
            text,
            format!("expected `on` or `off`, found `{other}`"),
        )),
    }
}

fn parse_float_control(cursor: &mut Cursor<'_>) -> Result<PragmaDirective, PragmaError> {
    let args = cursor.argument_list()?;
    cursor.expect_end()?;
    let text = cursor.text;

    let directive = match args.as_slice() {
        ["push"] => FpPragma::Push,
        ["pop"] => FpPragma::Pop,
        [kind @ ("precise" | "except"), state, rest @ ..] => {
            let on = on_off(text, state)?;
            let push = match rest {
                [] => false,
                ["push"] => true,
                _ => return Err(malformed(text, "only `push` may follow the on/off state")),
            };
            if *kind == "precise" {
                FpPragma::Precise { on, push }
            } else {
                FpPragma::Except { on, push }
            }
        }
        [method] => match method.parse::<EvalMethod>() {
            Ok(method) => FpPragma::EvalMethod(method),
            Err(err) => return Err(malformed(text, err.to_string())),
        },
        _ => {
            return Err(malformed(
                text,
                "expected `precise`, `except`, `push`, `pop` or an evaluation method",
            ));
        }
    };

    Ok(PragmaDirective::Float(vec![directive]))
}

fn parse_clang_fp(cursor: &mut Cursor<'_>) -> Result<PragmaDirective, PragmaError> {
    let text = cursor.text;
    let mut directives = Vec::new();

    while !cursor.at_end() {
        let option = cursor.expect_word("a `clang fp` option")?;
        let args = cursor.argument_list()?;
        let [arg] = args.as_slice() else {
            return Err(malformed(text, format!("`{option}` takes one argument")));
        };
        let directive = match option {
            "eval_method" => arg.parse().map(FpPragma::EvalMethod),
            "contract" => arg.parse().map(FpPragma::Contract),
            "exceptions" => arg.parse().map(FpPragma::Exceptions),
            other => {
                return Err(malformed(text, format!("unknown `clang fp` option `{other}`")));
            }
        };
        directives.push(directive.map_err(|err| malformed(text, err.to_string()))?);
    }

    if directives.is_empty() {
        return Err(malformed(text, "expected at least one option"));
    }
    Ok(PragmaDirective::Float(directives))
}

fn parse_stdc(cursor: &mut Cursor<'_>) -> Result<PragmaDirective, PragmaError> {
    let text = cursor.text;
    let name = cursor.expect_word("a STDC pragma name")?;
    if !matches!(name, "FENV_ACCESS" | "FP_CONTRACT") {
        return Ok(PragmaDirective::Unrecognized(format!("STDC {name}")));
    }

    let state = cursor.expect_word("ON, OFF or DEFAULT")?;
    cursor.expect_end()?;
    let on = match state {
        "ON" => true,
        "OFF" | "DEFAULT" => false,
        other => {
            return Err(malformed(
                text,
                format!("expected ON, OFF or DEFAULT, found `{other}`"),
            ));
        }
    };

    let directive = match name {
        "FENV_ACCESS" => FpPragma::FenvAccess(on),
        _ if on || state == "DEFAULT" => FpPragma::Contract(FpContract::On),
        _ => FpPragma::Contract(FpContract::Off),
    };
    Ok(PragmaDirective::Float(vec![directive]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single(text: &str) -> FpPragma {
        match parse_pragma(text).unwrap() {
            PragmaDirective::Float(mut directives) => {
                assert_eq!(directives.len(), 1);
                directives.remove(0)
            }
            other => panic!("expected a float directive, got {other:?}"),
        }
    }

    #[test]
    fn test_float_control_forms() {
        assert_eq!(
            single("float_control(precise, off)"),
            FpPragma::Precise {
                on: false,
                push: false
            }
        );
        assert_eq!(
            single("float_control( except, on, push)"),
            FpPragma::Except { on: true, push: true }
        );
        assert_eq!(single("float_control(push)"), FpPragma::Push);
        assert_eq!(single("float_control(pop)"), FpPragma::Pop);
        assert_eq!(
            single("float_control(extended)"),
            FpPragma::EvalMethod(EvalMethod::Extended)
        );
    }

    #[test]
    fn test_clang_fp_multiple_options() {
        let parsed = parse_pragma("clang fp eval_method(double) contract(fast)").unwrap();
        assert_eq!(
            parsed,
            PragmaDirective::Float(vec![
                FpPragma::EvalMethod(EvalMethod::Double),
                FpPragma::Contract(FpContract::Fast),
            ])
        );
    }

    #[test]
    fn test_stdc_pragmas() {
        assert_eq!(single("STDC FENV_ACCESS ON"), FpPragma::FenvAccess(true));
        assert_eq!(single("STDC FENV_ACCESS DEFAULT"), FpPragma::FenvAccess(false));
        assert_eq!(
            single("STDC FP_CONTRACT OFF"),
            FpPragma::Contract(FpContract::Off)
        );
        assert_eq!(
            parse_pragma("STDC CX_LIMITED_RANGE ON").unwrap(),
            PragmaDirective::Unrecognized("STDC CX_LIMITED_RANGE".to_string())
        );
    }

    #[test]
    fn test_unrelated_pragmas_are_unrecognized() {
        assert_eq!(
            parse_pragma("once").unwrap(),
            PragmaDirective::Unrecognized("once".to_string())
        );
        assert_eq!(
            parse_pragma("clang diagnostic push").unwrap(),
            PragmaDirective::Unrecognized("clang".to_string())
        );
    }

    #[test]
    fn test_malformed_arguments() {
        assert!(parse_pragma("float_control(precise, maybe)").is_err());
        assert!(parse_pragma("float_control(quad)").is_err());
        assert!(parse_pragma("float_control(precise, on, pop)").is_err());
        assert!(parse_pragma("float_control(push").is_err());
        assert!(parse_pragma("clang fp reassociate(on)").is_err());
        assert!(parse_pragma("float_control(push) extra").is_err());
    }
}
