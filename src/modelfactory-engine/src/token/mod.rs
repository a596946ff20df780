// Copyright 2026 The Model Factory Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

// derived from both the LALRPOP whitespace tokenizer, and LALRPOP's
// internal tokenizer

use std::str::CharIndices;

use lazy_static::lazy_static;
use unicode_xid::UnicodeXID;

use self::Token::*;
use crate::common::ErrorCode::*;
use crate::common::{EquationError, ErrorCode};


#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Token<'input> {
    Plus,
    Minus,
    Mul,
    Pow,
    Div,
    LParen,
    RParen,
    Comma,
    Dot,
    Ident(&'input str),
    Num(&'input str),
}

fn error<T>(code: ErrorCode, start: usize, end: usize) -> Result<T, EquationError> {
    Err(EquationError {
        start: start as u16,
        end: end as u16,
        code,
    })
}

pub type Spanned<T> = (usize, T, usize);

pub struct Lexer<'input> {
    text: &'input str,
    chars: CharIndices<'input>,
    lookahead: Option<(usize, char)>,
}

impl<'input> Lexer<'input> {
    pub fn new(input: &'input str) -> Self {
        let mut t = Lexer {
            text: input,
            chars: input.char_indices(),
            lookahead: None,
        };
        t.bump();
        t
    }

    fn bump(&mut self) -> Option<(usize, char)> {
        self.bump_n(1)
    }

    fn bump_n(&mut self, n: usize) -> Option<(usize, char)> {
        debug_assert!(n > 0);
        self.lookahead = self.chars.nth(n - 1);
        self.lookahead
    }

    /// the character after the current lookahead, without consuming anything
    fn peek_second(&self, i: usize, c: char) -> Option<char> {
        self.text[i + c.len_utf8()..].chars().next()
    }

    fn take_while<F>(&mut self, mut keep_going: F) -> Option<usize>
    where
        F: FnMut(char) -> bool,
    {
        loop {
            match self.lookahead {
                None => {
                    return None;
                }
                Some((idx1, c)) => {
                    if keep_going(c) {
                        self.bump();
                    } else {
                        return Some(idx1);
                    }
                }
            }
        }
    }

    fn identifier(&mut self, idx0: usize) -> Spanned<Token<'input>> {
        match self.take_while(is_identifier_continue) {
            Some(end) => (idx0, Ident(&self.text[idx0..end]), end),
            None => (idx0, Ident(&self.text[idx0..]), self.text.len()),
        }
    }

    fn number(&mut self, idx0: usize) -> Spanned<Token<'input>> {
        use regex::Regex;

        lazy_static! {
            static ref NUMBER_RE: Regex = Regex::new(r"^\d*(\.\d*)?([eE][-+]?\d+)?").unwrap();
        }

        // number() is only entered on a digit, or a '.' followed by a
        // digit, so the match is never empty.
        let len = NUMBER_RE
            .find(&self.text[idx0..])
            .map(|m| m.end())
            .unwrap_or(1)
            .max(1);

        // the match is ASCII-only, so bytes and chars line up
        self.bump_n(len);

        let end = idx0 + len;
        (idx0, Num(&self.text[idx0..end]), end)
    }

    /// operators outside the grammar get a dedicated error code so the
    /// author learns that comparisons and logic are off-limits, rather
    /// than seeing a generic syntax error.
    fn disallowed_operator(
        &mut self,
        i: usize,
        c: char,
    ) -> Option<Result<Spanned<Token<'input>>, EquationError>> {
        let doubled = matches!(
            (c, self.peek_second(i, c)),
            ('<', Some('='))
                | ('>', Some('='))
                | ('=', Some('='))
                | ('!', Some('='))
                | ('&', Some('&'))
                | ('|', Some('|'))
                | ('<', Some('>'))
        );
        let len = if doubled { 2 } else { 1 };
        self.bump_n(len);
        Some(error(OperatorNotAllowed, i, i + len))
    }

    #[allow(clippy::unnecessary_wraps)]
    fn consume(
        &mut self,
        i: usize,
        tok: Token<'input>,
        len: usize,
    ) -> Option<Result<Spanned<Token<'input>>, EquationError>> {
        self.bump_n(len);
        Some(Ok((i, tok, i + len)))
    }
}

impl<'input> Iterator for Lexer<'input> {
    type Item = Result<Spanned<Token<'input>>, EquationError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            return match self.lookahead {
                Some((i, '*')) => {
                    if self.peek_second(i, '*') == Some('*') {
                        self.consume(i, Pow, 2)
                    } else {
                        self.consume(i, Mul, 1)
                    }
                }
                Some((i, '/')) => self.consume(i, Div, 1),
                Some((i, '-')) => self.consume(i, Minus, 1),
                Some((i, '+')) => self.consume(i, Plus, 1),
                Some((i, '(')) => self.consume(i, LParen, 1),
                Some((i, ')')) => self.consume(i, RParen, 1),
                Some((i, ',')) => self.consume(i, Comma, 1),
                Some((i, '.')) => match self.peek_second(i, '.') {
                    Some(c) if is_digit(c) => Some(Ok(self.number(i))),
                    _ => self.consume(i, Dot, 1),
                },
                Some((i, c @ ('<' | '>' | '=' | '!' | '&' | '|' | '^' | '%' | '~'))) => {
                    self.disallowed_operator(i, c)
                }
                Some((i, c)) if is_identifier_start(c) => Some(Ok(self.identifier(i))),
                Some((i, c)) if is_digit(c) => Some(Ok(self.number(i))),
                Some((_, c)) if c.is_whitespace() => {
                    self.bump();
                    continue;
                }
                Some((i, _)) => {
                    self.bump(); // eat whatever is killing us
                    let end = match self.lookahead {
                        Some((end, _)) => end,
                        None => self.text.len(),
                    };
                    Some(error(UnrecognizedToken, i, end))
                }
                None => None,
            };
        }
    }
}

fn is_digit(c: char) -> bool {
    c.is_ascii_digit()
}

fn is_identifier_start(c: char) -> bool {
    UnicodeXID::is_xid_start(c) || c == '_'
}

fn is_identifier_continue(c: char) -> bool {
    UnicodeXID::is_xid_continue(c)
}
