//! Parser for fpc source files
//!
//! A recursive descent parser that produces an AST from a token stream.
//! Binary expressions use precedence climbing.

use crate::ast::*;
use crate::common::{IdGenerator, NodeId, Span};
use crate::diagnostics::{CompileError, SourceFile};
use crate::fp::FloatKind;
use crate::lexer::{Token, TokenKind};

type Result<T> = std::result::Result<T, CompileError>;

/// Parentheses, unary minus, blocks and namespaces nested beyond this are rejected
pub const MAX_NESTING_DEPTH: usize = 128;

/// Parse a token stream into an AST
pub fn parse(tokens: &[Token], source: &str) -> miette::Result<Ast> {
    let file = SourceFile::new("<input>", source);
    parse_file(tokens, &file).map_err(Into::into)
}

/// Parse a token stream, reporting errors against `file`
pub fn parse_file(tokens: &[Token], file: &SourceFile) -> Result<Ast> {
    let mut parser = Parser::new(tokens, file);
    parser.parse_program()
}

/// Parser state
struct Parser<'a> {
    tokens: &'a [Token],
    file: &'a SourceFile,
    pos: usize,
    depth: usize,
    id_gen: IdGenerator,
    eof: Token,
}

impl<'a> Parser<'a> {
    fn new(tokens: &'a [Token], file: &'a SourceFile) -> Self {
        let end = file.content.len();
        Self {
            tokens,
            file,
            pos: 0,
            depth: 0,
            id_gen: IdGenerator::new(),
            eof: Token {
                kind: TokenKind::Eof,
                span: Span::new(end, end),
                text: String::new(),
            },
        }
    }

    fn next_id(&mut self) -> NodeId {
        self.id_gen.next()
    }

    fn current(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&self.eof)
    }

    fn peek(&self) -> TokenKind {
        self.current().kind
    }

    fn peek_n(&self, n: usize) -> TokenKind {
        self.tokens
            .get(self.pos + n)
            .map(|t| t.kind)
            .unwrap_or(TokenKind::Eof)
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.peek() == kind
    }

    fn advance(&mut self) -> Token {
        let tok = self.current().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.at(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token> {
        if self.at(kind) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(kind.describe()))
        }
    }

    fn unexpected(&self, expected: &str) -> CompileError {
        let tok = self.current();
        if tok.kind == TokenKind::Eof {
            CompileError::UnexpectedEof {
                span: tok.span.into(),
                src: self.file.to_named_source(),
            }
        } else {
            CompileError::UnexpectedToken {
                expected: expected.to_string(),
                found: tok.kind.describe().to_string(),
                span: tok.span.into(),
                src: self.file.to_named_source(),
            }
        }
    }

    fn span(&self) -> Span {
        self.current().span
    }

    /// Run `parse` one nesting level deeper
    fn nested<T>(&mut self, parse: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(CompileError::NestingTooDeep {
                limit: MAX_NESTING_DEPTH,
                span: self.span().into(),
                src: self.file.to_named_source(),
            });
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    /// Span of the most recently consumed token
    fn prev_span(&self) -> Span {
        self.pos
            .checked_sub(1)
            .and_then(|i| self.tokens.get(i))
            .map(|t| t.span)
            .unwrap_or_default()
    }

    fn parse_ident(&mut self) -> Result<String> {
        Ok(self.expect(TokenKind::Ident)?.text)
    }

    // ==================== PROGRAM ====================

    fn parse_program(&mut self) -> Result<Ast> {
        let mut items = Vec::new();
        while !self.at(TokenKind::Eof) {
            items.push(self.parse_item()?);
        }
        Ok(Ast { items })
    }

    // ==================== ITEMS ====================

    fn parse_item(&mut self) -> Result<Item> {
        match self.peek() {
            TokenKind::Fn => Ok(Item::Function(self.parse_fn()?)),
            TokenKind::Namespace => self.parse_namespace(),
            TokenKind::Pragma => Ok(Item::Pragma(self.parse_pragma())),
            _ => Err(self.unexpected("`fn`, `namespace` or `#pragma`")),
        }
    }

    fn parse_pragma(&mut self) -> PragmaLine {
        let tok = self.advance();
        let text = tok
            .text
            .trim_start_matches('#')
            .trim_start()
            .trim_start_matches("pragma")
            .trim()
            .to_string();
        PragmaLine {
            text,
            span: tok.span,
        }
    }

    fn parse_namespace(&mut self) -> Result<Item> {
        let start = self.span();
        self.expect(TokenKind::Namespace)?;
        let name = self.parse_ident()?;
        self.expect(TokenKind::LBrace)?;

        let mut items = Vec::new();
        while !self.at(TokenKind::RBrace) {
            if self.at(TokenKind::Eof) {
                return Err(self.unexpected("`}`"));
            }
            items.push(self.nested(Self::parse_item)?);
        }
        self.expect(TokenKind::RBrace)?;

        Ok(Item::Namespace(NamespaceDef {
            id: self.next_id(),
            name,
            items,
            span: start.merge(self.prev_span()),
        }))
    }

    // ==================== FUNCTIONS ====================

    fn parse_fn(&mut self) -> Result<FnDef> {
        let start = self.span();
        self.expect(TokenKind::Fn)?;

        let name = self.parse_ident()?;
        let generics = self.parse_generics()?;
        self.expect(TokenKind::LParen)?;
        let params = self.parse_params(TokenKind::RParen)?;
        self.expect(TokenKind::RParen)?;
        let return_type = self.parse_return_type()?;
        let body = self.parse_block()?;

        Ok(FnDef {
            id: self.next_id(),
            name,
            generics,
            params,
            return_type,
            body,
            span: start.merge(self.prev_span()),
        })
    }

    fn parse_generics(&mut self) -> Result<Vec<String>> {
        let mut generics = Vec::new();
        if !self.eat(TokenKind::Lt) {
            return Ok(generics);
        }
        loop {
            generics.push(self.parse_ident()?);
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::Gt)?;
        Ok(generics)
    }

    /// Comma separated `name: Type` list up to (not including) `close`
    fn parse_params(&mut self, close: TokenKind) -> Result<Vec<Param>> {
        let mut params = Vec::new();
        while !self.at(close) {
            let start = self.span();
            let name = self.parse_ident()?;
            self.expect(TokenKind::Colon)?;
            let ty = self.parse_type()?;
            params.push(Param {
                id: self.next_id(),
                name,
                ty,
                span: start.merge(self.prev_span()),
            });
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        Ok(params)
    }

    fn parse_return_type(&mut self) -> Result<Option<TypeExpr>> {
        if self.eat(TokenKind::Arrow) {
            Ok(Some(self.parse_type()?))
        } else {
            Ok(None)
        }
    }

    // ==================== TYPES ====================

    fn parse_type(&mut self) -> Result<TypeExpr> {
        if self.at(TokenKind::LParen) && self.peek_n(1) == TokenKind::RParen {
            let start = self.advance().span;
            let end = self.advance().span;
            return Ok(TypeExpr {
                kind: TypeKind::Void,
                span: start.merge(end),
            });
        }

        let tok = self.expect(TokenKind::Ident)?;
        let kind = match tok.text.as_str() {
            "i32" => TypeKind::I32,
            "void" => TypeKind::Void,
            name => match name.parse::<FloatKind>() {
                Ok(kind) if name.starts_with('f') => TypeKind::Float(kind),
                _ => TypeKind::Named(name.to_string()),
            },
        };
        Ok(TypeExpr {
            kind,
            span: tok.span,
        })
    }

    // ==================== STATEMENTS ====================

    fn parse_block(&mut self) -> Result<Block> {
        let start = self.span();
        self.expect(TokenKind::LBrace)?;
        let mut stmts = Vec::new();

        while !self.at(TokenKind::RBrace) {
            if self.at(TokenKind::Eof) {
                return Err(self.unexpected("`}`"));
            }
            stmts.push(self.nested(Self::parse_stmt)?);
        }

        self.expect(TokenKind::RBrace)?;
        Ok(Block {
            stmts,
            span: start.merge(self.prev_span()),
        })
    }

    fn parse_stmt(&mut self) -> Result<Stmt> {
        match self.peek() {
            TokenKind::Let => self.parse_let_stmt(),
            TokenKind::Return => self.parse_return_stmt(),
            TokenKind::LBrace => Ok(Stmt::Block(self.parse_block()?)),
            TokenKind::Pragma => Ok(Stmt::Pragma(self.parse_pragma())),
            TokenKind::Semi => {
                self.advance();
                Ok(Stmt::Empty)
            }
            TokenKind::Ident if self.assignment_op_at(1).is_some() => self.parse_assign_stmt(),
            _ => {
                let expr = self.parse_expr()?;
                let has_semi = self.eat(TokenKind::Semi);
                Ok(Stmt::Expr { expr, has_semi })
            }
        }
    }

    fn assignment_op_at(&self, n: usize) -> Option<AssignOp> {
        match self.peek_n(n) {
            TokenKind::Eq => Some(AssignOp::Assign),
            TokenKind::PlusEq => Some(AssignOp::AddAssign),
            TokenKind::MinusEq => Some(AssignOp::SubAssign),
            TokenKind::StarEq => Some(AssignOp::MulAssign),
            TokenKind::SlashEq => Some(AssignOp::DivAssign),
            _ => None,
        }
    }

    fn parse_assign_stmt(&mut self) -> Result<Stmt> {
        let start = self.span();
        let target = self.parse_ident()?;
        let op = self
            .assignment_op_at(0)
            .ok_or_else(|| self.unexpected("assignment operator"))?;
        self.advance();
        let value = self.parse_expr()?;
        self.expect(TokenKind::Semi)?;
        Ok(Stmt::Assign {
            target,
            op,
            value,
            span: start.merge(self.prev_span()),
        })
    }

    fn parse_let_stmt(&mut self) -> Result<Stmt> {
        let start = self.span();
        self.expect(TokenKind::Let)?;
        let name = self.parse_ident()?;
        let ty = if self.eat(TokenKind::Colon) {
            Some(self.parse_type()?)
        } else {
            None
        };
        let init = if self.eat(TokenKind::Eq) {
            Some(self.parse_expr()?)
        } else {
            None
        };
        self.expect(TokenKind::Semi)?;

        Ok(Stmt::Let {
            id: self.next_id(),
            name,
            ty,
            init,
            span: start.merge(self.prev_span()),
        })
    }

    fn parse_return_stmt(&mut self) -> Result<Stmt> {
        let start = self.span();
        self.expect(TokenKind::Return)?;
        let value = if self.at(TokenKind::Semi) || self.at(TokenKind::RBrace) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.eat(TokenKind::Semi);
        Ok(Stmt::Return {
            value,
            span: start.merge(self.prev_span()),
        })
    }

    // ==================== EXPRESSIONS ====================

    fn parse_expr(&mut self) -> Result<Expr> {
        self.nested(|p| p.parse_expr_with_precedence(0))
    }

    fn parse_expr_with_precedence(&mut self, min_prec: u8) -> Result<Expr> {
        let mut left = self.parse_cast()?;

        // All arithmetic operators are left associative
        while let Some((op, prec)) = self.binary_op_info() {
            if prec < min_prec {
                break;
            }

            self.advance();
            let right = self.parse_expr_with_precedence(prec + 1)?;
            let span = left.span().merge(right.span());

            left = Expr::Binary {
                id: self.next_id(),
                op,
                left: Box::new(left),
                right: Box::new(right),
                span,
            };
        }

        Ok(left)
    }

    fn binary_op_info(&self) -> Option<(BinaryOp, u8)> {
        let info = match self.peek() {
            TokenKind::Plus => (BinaryOp::Add, 9),
            TokenKind::Minus => (BinaryOp::Sub, 9),
            TokenKind::Star => (BinaryOp::Mul, 10),
            TokenKind::Slash => (BinaryOp::Div, 10),
            TokenKind::Percent => (BinaryOp::Rem, 10),
            _ => return None,
        };
        Some(info)
    }

    /// `unary ('as' type)*`
    fn parse_cast(&mut self) -> Result<Expr> {
        let mut expr = self.parse_unary()?;
        while self.eat(TokenKind::As) {
            let ty = self.parse_type()?;
            let span = expr.span().merge(ty.span);
            expr = Expr::Cast {
                expr: Box::new(expr),
                ty,
                span,
            };
        }
        Ok(expr)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        if self.at(TokenKind::Minus) {
            let start = self.advance().span;
            let expr = self.nested(Self::parse_unary)?;
            let span = start.merge(expr.span());
            return Ok(Expr::Unary {
                op: UnaryOp::Neg,
                expr: Box::new(expr),
                span,
            });
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr> {
        let mut expr = self.parse_primary()?;
        while self.at(TokenKind::LParen) {
            self.advance();
            let args = self.parse_args()?;
            let span = expr.span().merge(self.prev_span());
            expr = match expr {
                Expr::Var { name, .. } => Expr::Call {
                    path: vec![name],
                    args,
                    span,
                },
                callee => Expr::Invoke {
                    callee: Box::new(callee),
                    args,
                    span,
                },
            };
        }
        Ok(expr)
    }

    /// Arguments after `(`, consuming the closing `)`
    fn parse_args(&mut self) -> Result<Vec<Expr>> {
        let mut args = Vec::new();
        while !self.at(TokenKind::RParen) {
            args.push(self.parse_expr()?);
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParen)?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        match self.peek() {
            TokenKind::FloatLit => self.parse_float_lit(),
            TokenKind::IntLit => {
                let tok = self.advance();
                let value = tok.text.parse::<i64>().map_err(|_| CompileError::InvalidLiteral {
                    text: tok.text.clone(),
                    span: tok.span.into(),
                    src: self.file.to_named_source(),
                })?;
                Ok(Expr::IntLit {
                    value,
                    span: tok.span,
                })
            }
            TokenKind::Ident => self.parse_path_expr(),
            TokenKind::LParen => {
                self.advance();
                let expr = self.parse_expr()?;
                self.expect(TokenKind::RParen)?;
                Ok(expr)
            }
            TokenKind::Pipe => Ok(Expr::Lambda(self.parse_lambda()?)),
            _ => Err(self.unexpected("expression")),
        }
    }

    fn parse_float_lit(&mut self) -> Result<Expr> {
        let tok = self.advance();
        let text = tok.text.as_str();
        let (digits, suffix) = match text.find('f') {
            Some(idx) => (&text[..idx], Some(&text[idx..])),
            None => (text, None),
        };
        let invalid = || CompileError::InvalidLiteral {
            text: tok.text.clone(),
            span: tok.span.into(),
            src: self.file.to_named_source(),
        };

        let value = digits
            .trim_end_matches('_')
            .parse::<f64>()
            .map_err(|_| invalid())?;
        let suffix = suffix
            .map(|s| s.parse::<FloatKind>().map_err(|_| invalid()))
            .transpose()?;

        Ok(Expr::FloatLit {
            value,
            suffix,
            span: tok.span,
        })
    }

    /// `ident` or `ident :: ident ...`; a path is only valid as a callee
    fn parse_path_expr(&mut self) -> Result<Expr> {
        let first = self.expect(TokenKind::Ident)?;
        if !self.at(TokenKind::ColonColon) {
            return Ok(Expr::Var {
                name: first.text,
                span: first.span,
            });
        }

        let mut path = vec![first.text];
        while self.eat(TokenKind::ColonColon) {
            path.push(self.parse_ident()?);
        }
        self.expect(TokenKind::LParen)?;
        let args = self.parse_args()?;
        Ok(Expr::Call {
            path,
            args,
            span: first.span.merge(self.prev_span()),
        })
    }

    fn parse_lambda(&mut self) -> Result<LambdaExpr> {
        let start = self.span();
        self.expect(TokenKind::Pipe)?;
        let params = self.parse_params(TokenKind::Pipe)?;
        self.expect(TokenKind::Pipe)?;
        let return_type = self.parse_return_type()?;
        let body = self.parse_block()?;

        Ok(LambdaExpr {
            id: self.next_id(),
            params,
            return_type,
            body,
            span: start.merge(self.prev_span()),
        })
    }
}
