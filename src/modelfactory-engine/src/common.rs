// Copyright 2026 The Model Factory Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::fmt;
use std::{error, result};

use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    NoError,      // will never be produced
    DoesNotExist, // the named entity doesn't exist
    Generic,
    // expression syntax
    InvalidToken,
    UnrecognizedEof,
    UnrecognizedToken,
    ExtraToken,
    ExpectedNumber,
    EmptyEquation,
    ExpressionTooLong,
    TooDeeplyNested,
    OperatorNotAllowed,
    AttributeNotAllowed,
    UnknownBuiltin,
    BadBuiltinArgs,
    UnknownIdent,
    UnknownParameter,
    // evaluation
    UnboundSymbol,
    DomainError,
    // model structure
    DuplicateSymbol,
    DuplicateId,
    UnknownState,
    UnknownDependency,
    OrphanEquation,
    MissingEquation,
    ShadowedParameter,
    OutOfRange,
    InvalidBounds,
    NonFiniteValue,
    EmptyKey,
    // drafts
    ChangeIndexOutOfRange,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use ErrorCode::*;
        let name = match self {
            NoError => "no_error",
            DoesNotExist => "does_not_exist",
            Generic => "generic",
            InvalidToken => "invalid_token",
            UnrecognizedEof => "unrecognized_eof",
            UnrecognizedToken => "unrecognized_token",
            ExtraToken => "extra_token",
            ExpectedNumber => "expected_number",
            EmptyEquation => "empty_equation",
            ExpressionTooLong => "expression_too_long",
            TooDeeplyNested => "too_deeply_nested",
            OperatorNotAllowed => "operator_not_allowed",
            AttributeNotAllowed => "attribute_not_allowed",
            UnknownBuiltin => "unknown_builtin",
            BadBuiltinArgs => "bad_builtin_args",
            UnknownIdent => "unknown_ident",
            UnknownParameter => "unknown_parameter",
            UnboundSymbol => "unbound_symbol",
            DomainError => "domain_error",
            DuplicateSymbol => "duplicate_symbol",
            DuplicateId => "duplicate_id",
            UnknownState => "unknown_state",
            UnknownDependency => "unknown_dependency",
            OrphanEquation => "orphan_equation",
            MissingEquation => "missing_equation",
            ShadowedParameter => "shadowed_parameter",
            OutOfRange => "out_of_range",
            InvalidBounds => "invalid_bounds",
            NonFiniteValue => "non_finite_value",
            EmptyKey => "empty_key",
            ChangeIndexOutOfRange => "change_index_out_of_range",
        };

        write!(f, "{name}")
    }
}

/// EquationError is produced by the lexer and parser; start and end
/// are byte offsets into the expression text.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EquationError {
    pub start: u16,
    pub end: u16,
    pub code: ErrorCode,
}

impl fmt::Display for EquationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}:{}", self.start, self.end, self.code)
    }
}

impl From<Error> for EquationError {
    fn from(err: Error) -> Self {
        EquationError {
            code: err.code,
            start: 0,
            end: 0,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Expression,
    Model,
    Change,
    Draft,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    pub kind: ErrorKind,
    pub code: ErrorCode,
    pub details: Option<String>,
}

impl Error {
    pub fn new(kind: ErrorKind, code: ErrorCode, details: Option<String>) -> Self {
        Error {
            kind,
            code,
            details,
        }
    }

    pub fn get_details(&self) -> Option<String> {
        self.details.clone()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let kind = match self.kind {
            ErrorKind::Expression => "ExpressionError",
            ErrorKind::Model => "ModelError",
            ErrorKind::Change => "ChangeError",
            ErrorKind::Draft => "DraftError",
        };
        match self.details {
            Some(ref details) => write!(f, "{}{{{}: {}}}", kind, self.code, details),
            None => write!(f, "{}{{{}}}", kind, self.code),
        }
    }
}

impl error::Error for Error {}

pub type Result<T> = result::Result<T, Error>;
pub type EquationResult<T> = result::Result<T, EquationError>;

#[macro_export]
macro_rules! eqn_err(
    ($code:tt, $start:expr, $end:expr) => {{
        use $crate::common::{EquationError, ErrorCode};
        Err(EquationError{ start: $start, end: $end, code: ErrorCode::$code})
    }}
);

#[macro_export]
macro_rules! model_err(
    ($code:tt, $str:expr) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(
            ErrorKind::Model,
            ErrorCode::$code,
            Some($str),
        ))
    }}
);

#[macro_export]
macro_rules! change_err {
    ($code:tt, $str:expr) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(
            ErrorKind::Change,
            ErrorCode::$code,
            Some($str),
        ))
    }};
    ($code:tt) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(ErrorKind::Change, ErrorCode::$code, None))
    }};
}

#[macro_export]
macro_rules! draft_err(
    ($code:tt, $str:expr) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(
            ErrorKind::Draft,
            ErrorCode::$code,
            Some($str),
        ))
    }}
);

#[test]
fn test_error_display() {
    let err = Error::new(
        ErrorKind::Change,
        ErrorCode::DoesNotExist,
        Some("state Z".to_string()),
    );
    assert_eq!("ChangeError{does_not_exist: state Z}", format!("{err}"));

    let err = Error::new(ErrorKind::Model, ErrorCode::Generic, None);
    assert_eq!("ModelError{generic}", format!("{err}"));
}

#[test]
fn test_equation_error_display() {
    let err = EquationError {
        start: 3,
        end: 7,
        code: ErrorCode::UnknownIdent,
    };
    assert_eq!("3:7:unknown_ident", format!("{err}"));
}

#[test]
fn test_error_code_serializes_like_display() {
    for code in [
        ErrorCode::UnknownBuiltin,
        ErrorCode::OutOfRange,
        ErrorCode::ChangeIndexOutOfRange,
    ] {
        let json = serde_json::to_string(&code).unwrap();
        assert_eq!(format!("\"{code}\""), json);
    }
}
