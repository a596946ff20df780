// Copyright 2026 The Model Factory Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! A restricted equation language and a draft/merge engine for system
//! dynamics models.
//!
//! Expressions are parsed against a small fixed grammar and resolved
//! against the model's states and parameters; nothing user-authored is
//! ever executed.  Edits to a model are collected as ordered drafts of
//! [`ChangeOperation`]s and merged onto an immutable base model to
//! produce a new effective model.

#![forbid(unsafe_code)]

#[macro_use]
pub mod common;
pub mod ast;
pub mod builtins;
pub mod change;
pub mod check;
pub mod datamodel;
pub mod draft;
pub mod eval;
pub mod merge;
pub mod parser;
pub mod store;
pub mod system;
mod token;
pub mod validate;

#[cfg(test)]
mod expr_proptest;
#[cfg(test)]
mod test_common;

pub use self::ast::{Expr0, Expr1, print_eqn};
pub use self::builtins::Loc;
pub use self::change::{ChangeKind, ChangeOperation};
#[cfg(feature = "schema")]
pub use self::change::{generate_schema, generate_schema_json};
pub use self::check::{EntityKind, EntityRef, ModelIssue, ValidationReport, validate_model};
pub use self::common::{Error, ErrorCode, ErrorKind, Result};
pub use self::datamodel::Model;
pub use self::draft::{Draft, DraftId, DraftSummary};
pub use self::eval::{Bindings, EvaluationError, evaluate};
pub use self::merge::{MergeMode, MergeOptions, MergeResult, MergeSkip, MergeWarning, merge};
pub use self::store::{DraftStore, StoreError};
pub use self::system::{CompiledSystem, Derivatives};
pub use self::validate::{
    Dependencies, ExpressionCheck, Scope, ValidatedExpression, ValidationError, check_equations,
    check_expression, unresolved_symbols, validate_expression,
};
