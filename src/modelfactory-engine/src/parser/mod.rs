// Copyright 2026 The Model Factory Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Hand-written recursive descent parser for the expression language.
//!
//! The grammar is deliberately small: numbers, identifiers, `p.<name>`
//! parameter references, the four arithmetic operators plus `**`, unary
//! signs, parentheses and calls.  Anything else is rejected here or in
//! the lexer, so no other construct can ever reach the resolver.
//!
//! ```text
//! expr           := additive
//! additive       := multiplicative (('+' | '-') multiplicative)*
//! multiplicative := unary (('*' | '/') unary)*
//! unary          := ('+' | '-') unary | power
//! power          := postfix ('**' unary)?
//! postfix        := primary
//! primary        := NUM | IDENT '(' args ')' | 'p' '.' IDENT | IDENT | '(' expr ')'
//! ```

use crate::ast::{BinaryOp, Expr0, UnaryOp};
use crate::builtins::{Loc, UntypedBuiltinFn};
use crate::common::{EquationError, ErrorCode};
use crate::token::{Lexer, Spanned, Token};


/// Expressions longer than this many bytes are rejected before lexing.
pub const MAX_EXPRESSION_LEN: usize = 4096;

/// Parentheses, call arguments, unary signs and exponents may nest at
/// most this deep.
pub const MAX_NESTING: usize = 64;

/// Parsed trees are at most this many levels deep, counting every
/// operator and call node.  Long `+ - * /` chains build left-deep trees,
/// so this also caps the number of terms in a single chain.
pub const MAX_DEPTH: usize = 256;

/// TokenKind discriminant for efficient peek comparisons without payload matching
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TokenKind {
    Plus,
    Minus,
    Mul,
    Pow,
    Div,
    LParen,
    RParen,
    Comma,
    Dot,
    Ident,
    Num,
}

impl<'a> From<&Token<'a>> for TokenKind {
    fn from(token: &Token<'a>) -> Self {
        match token {
            Token::Plus => TokenKind::Plus,
            Token::Minus => TokenKind::Minus,
            Token::Mul => TokenKind::Mul,
            Token::Pow => TokenKind::Pow,
            Token::Div => TokenKind::Div,
            Token::LParen => TokenKind::LParen,
            Token::RParen => TokenKind::RParen,
            Token::Comma => TokenKind::Comma,
            Token::Dot => TokenKind::Dot,
            Token::Ident(_) => TokenKind::Ident,
            Token::Num(_) => TokenKind::Num,
        }
    }
}

fn error(code: ErrorCode, start: usize, end: usize) -> EquationError {
    EquationError {
        start: start as u16,
        end: end as u16,
        code,
    }
}

/// Parser state holding tokenized input
struct Parser<'input> {
    tokens: Vec<Spanned<Token<'input>>>,
    pos: usize,
    depth: usize,
}

impl<'input> Parser<'input> {
    /// Create a new parser from a lexer, collecting all tokens up front.
    /// Returns an error if the lexer produces any errors.
    fn new(lexer: Lexer<'input>) -> Result<Self, EquationError> {
        let tokens = lexer.collect::<Result<Vec<_>, _>>()?;
        Ok(Parser {
            tokens,
            pos: 0,
            depth: 0,
        })
    }

    fn peek(&self) -> Option<Spanned<Token<'input>>> {
        self.tokens.get(self.pos).copied()
    }

    fn peek_kind(&self) -> Option<TokenKind> {
        self.peek().map(|(_, tok, _)| TokenKind::from(&tok))
    }

    fn peek_kind_at(&self, offset: usize) -> Option<TokenKind> {
        self.tokens
            .get(self.pos + offset)
            .map(|(_, tok, _)| TokenKind::from(tok))
    }

    /// Advance to the next token and return the consumed token
    fn advance(&mut self) -> Option<Spanned<Token<'input>>> {
        let tok = self.peek()?;
        self.pos += 1;
        Some(tok)
    }

    /// Get the position for EOF errors
    fn eof_position(&self) -> usize {
        if let Some((_, _, end)) = self.tokens.last() {
            *end
        } else {
            0
        }
    }

    fn eof_error(&self) -> EquationError {
        let pos = self.eof_position();
        error(ErrorCode::UnrecognizedEof, pos, pos + 1)
    }

    /// Expect the current token to match the expected kind, returning an error if not
    fn expect(&mut self, expected: TokenKind) -> Result<Spanned<Token<'input>>, EquationError> {
        match self.peek() {
            Some(tok) if TokenKind::from(&tok.1) == expected => {
                self.pos += 1;
                Ok(tok)
            }
            Some((start, _, end)) => Err(error(ErrorCode::UnrecognizedToken, start, end)),
            None => Err(self.eof_error()),
        }
    }

    fn descend(&mut self, start: usize, end: usize) -> Result<(), EquationError> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(error(ErrorCode::TooDeeplyNested, start, end));
        }
        Ok(())
    }

    fn ascend(&mut self) {
        self.depth -= 1;
    }

    /// checked rejects `expr` if it is deeper than MAX_DEPTH.  Every
    /// subtree was checked as it was built, so measuring never recurses
    /// past the limit.
    fn checked(expr: Expr0) -> Result<Expr0, EquationError> {
        if expr.depth() > MAX_DEPTH {
            let loc = expr.get_loc();
            return Err(error(
                ErrorCode::TooDeeplyNested,
                loc.start as usize,
                loc.end as usize,
            ));
        }
        Ok(expr)
    }

    /// Parse an expression from the token stream.
    /// Returns Ok(None) for empty or whitespace-only input.
    fn parse_equation(&mut self) -> Result<Option<Expr0>, EquationError> {
        if self.tokens.is_empty() {
            return Ok(None);
        }

        let expr = self.parse_expr()?;

        if let Some((start, _, end)) = self.peek() {
            return Err(error(ErrorCode::ExtraToken, start, end));
        }

        Ok(Some(expr))
    }

    fn parse_expr(&mut self) -> Result<Expr0, EquationError> {
        self.parse_additive()
    }

    /// Parse additive operators (+, -)
    fn parse_additive(&mut self) -> Result<Expr0, EquationError> {
        let mut left = self.parse_multiplicative()?;

        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Plus) => BinaryOp::Add,
                Some(TokenKind::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            let loc = left.get_loc().union(&right.get_loc());
            left = Self::checked(Expr0::Op2(op, Box::new(left), Box::new(right), loc))?;
        }

        Ok(left)
    }

    /// Parse multiplicative operators (*, /)
    fn parse_multiplicative(&mut self) -> Result<Expr0, EquationError> {
        let mut left = self.parse_unary()?;

        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Mul) => BinaryOp::Mul,
                Some(TokenKind::Div) => BinaryOp::Div,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            let loc = left.get_loc().union(&right.get_loc());
            left = Self::checked(Expr0::Op2(op, Box::new(left), Box::new(right), loc))?;
        }

        Ok(left)
    }

    /// Parse unary operators (+, -).  They bind looser than `**`, so
    /// `-2 ** 2` is `-(2 ** 2)`.
    fn parse_unary(&mut self) -> Result<Expr0, EquationError> {
        let op = match self.peek_kind() {
            Some(TokenKind::Plus) => UnaryOp::Positive,
            Some(TokenKind::Minus) => UnaryOp::Negative,
            _ => return self.parse_power(),
        };
        let Some((lpos, _, end)) = self.advance() else {
            return Err(self.eof_error());
        };
        self.descend(lpos, end)?;
        let operand = self.parse_unary()?;
        self.ascend();
        let rpos = operand.get_loc().end as usize;
        Self::checked(Expr0::Op1(op, Box::new(operand), Loc::new(lpos, rpos)))
    }

    /// Parse exponentiation (**).  Right associative, and the exponent may
    /// carry its own sign: `2 ** -1`.
    fn parse_power(&mut self) -> Result<Expr0, EquationError> {
        let left = self.parse_postfix()?;

        if self.peek_kind() != Some(TokenKind::Pow) {
            return Ok(left);
        }
        let Some((start, _, end)) = self.advance() else {
            return Err(self.eof_error());
        };
        self.descend(start, end)?;
        let right = self.parse_unary()?;
        self.ascend();
        let loc = left.get_loc().union(&right.get_loc());
        Self::checked(Expr0::Op2(BinaryOp::Exp, Box::new(left), Box::new(right), loc))
    }

    /// Attribute access is only ever valid as `p.<name>`, which
    /// parse_atom handles; a dot after any other operand is rejected.
    fn parse_postfix(&mut self) -> Result<Expr0, EquationError> {
        let expr = self.parse_atom()?;

        if self.peek_kind() == Some(TokenKind::Dot) {
            let start = expr.get_loc().start as usize;
            let end = self.attribute_end();
            return Err(error(ErrorCode::AttributeNotAllowed, start, end));
        }

        Ok(expr)
    }

    /// end of an offending `.attr` suffix starting at the current dot
    fn attribute_end(&self) -> usize {
        let dot_end = self.peek().map(|(_, _, end)| end).unwrap_or(0);
        match self.tokens.get(self.pos + 1) {
            Some((_, Token::Ident(_), end)) => *end,
            _ => dot_end,
        }
    }

    /// Parse an atomic expression (number, identifier, parameter
    /// reference, call, parenthesized expression)
    fn parse_atom(&mut self) -> Result<Expr0, EquationError> {
        let Some((lpos, tok, rpos)) = self.peek() else {
            return Err(self.eof_error());
        };

        match tok {
            Token::Num(s) => {
                self.advance();
                match s.parse::<f64>() {
                    Ok(n) if n.is_finite() => {
                        Ok(Expr0::Const(s.to_string(), n, Loc::new(lpos, rpos)))
                    }
                    _ => Err(error(ErrorCode::ExpectedNumber, lpos, rpos)),
                }
            }
            Token::Ident(name) if self.peek_kind_at(1) == Some(TokenKind::LParen) => {
                self.advance();
                self.advance(); // consume '('
                self.descend(lpos, rpos)?;
                let args = self.parse_comma_separated_exprs()?;
                self.ascend();
                let (_, _, end) = self.expect(TokenKind::RParen)?;
                Self::checked(Expr0::App(
                    UntypedBuiltinFn(name.to_string(), args),
                    Loc::new(lpos, end),
                ))
            }
            Token::Ident("p") if self.peek_kind_at(1) == Some(TokenKind::Dot) => {
                self.advance();
                match self.tokens.get(self.pos + 1).copied() {
                    Some((_, Token::Ident(param), end)) => {
                        self.advance(); // consume '.'
                        self.advance();
                        Ok(Expr0::ParamRef(param.to_string(), Loc::new(lpos, end)))
                    }
                    _ => {
                        let end = self.attribute_end();
                        Err(error(ErrorCode::AttributeNotAllowed, lpos, end))
                    }
                }
            }
            Token::Ident(name) => {
                self.advance();
                Ok(Expr0::Var(name.to_string(), Loc::new(lpos, rpos)))
            }
            Token::LParen => {
                self.advance();
                self.descend(lpos, rpos)?;
                let expr = self.parse_expr()?;
                self.ascend();
                self.expect(TokenKind::RParen)?;
                Ok(expr)
            }
            _ => Err(error(ErrorCode::UnrecognizedToken, lpos, rpos)),
        }
    }

    /// Parse comma-separated expressions (for function arguments)
    fn parse_comma_separated_exprs(&mut self) -> Result<Vec<Expr0>, EquationError> {
        let mut exprs = Vec::new();

        // Handle empty list
        if self.peek_kind() == Some(TokenKind::RParen) {
            return Ok(exprs);
        }

        exprs.push(self.parse_expr()?);

        while self.peek_kind() == Some(TokenKind::Comma) {
            self.advance(); // consume ','

            // Handle trailing comma
            if self.peek_kind() == Some(TokenKind::RParen) {
                break;
            }

            exprs.push(self.parse_expr()?);
        }

        Ok(exprs)
    }
}

/// Parse expression text into an untyped AST.
///
/// Returns:
/// - `Ok(Some(expr))` for well-formed expressions
/// - `Ok(None)` for empty or whitespace-only input
/// - `Err(error)` for the first lexing or parsing error
pub fn parse(input: &str) -> Result<Option<Expr0>, EquationError> {
    if input.len() > MAX_EXPRESSION_LEN {
        return Err(error(
            ErrorCode::ExpressionTooLong,
            MAX_EXPRESSION_LEN,
            MAX_EXPRESSION_LEN,
        ));
    }

    let lexer = Lexer::new(input);
    let mut parser = Parser::new(lexer)?;
    parser.parse_equation()
}
