// Copyright 2026 The Model Factory Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Expression validation: parse, resolve every name against a scope, and
//! report which states and parameters an expression depends on.
//!
//! Validation is an allowlist.  Text either parses into the small grammar
//! in [`crate::parser`] and resolves completely, or it is rejected with a
//! [`ValidationError`] naming the offending token and its byte span.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ast::{Expr0, Expr1};
use crate::builtins::Loc;
use crate::common::{EquationError, ErrorCode};
use crate::datamodel::Model;
use crate::parser::parse;

const TARGET_SUFFIX: &str = "_target";

/// The names an expression may refer to.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Scope {
    known_states: BTreeSet<String>,
    known_parameters: BTreeSet<String>,
    governs: Option<String>,
    no_targets: bool,
}

/// What a bare identifier resolved to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Binding {
    State,
    Parameter,
    // the implicit `<S>_target` value, holding S
    Target(String),
}

impl Scope {
    pub fn new<S, P>(states: S, parameters: P) -> Self
    where
        S: IntoIterator,
        S::Item: Into<String>,
        P: IntoIterator,
        P::Item: Into<String>,
    {
        Scope {
            known_states: states.into_iter().map(Into::into).collect(),
            known_parameters: parameters.into_iter().map(Into::into).collect(),
            governs: None,
            no_targets: false,
        }
    }

    pub fn from_model(model: &Model) -> Self {
        Scope::new(model.state_symbols(), model.parameter_names())
    }

    /// governing marks the state whose equation is being validated.
    /// References to that state are bound by the integrator and are not
    /// reported as dependencies.
    pub fn governing(mut self, symbol: &str) -> Self {
        self.governs = Some(symbol.to_owned());
        self
    }

    /// without_targets drops the implicit `<S>_target` bindings.  Target
    /// expressions are evaluated before any target is known, so they may
    /// not refer to one.
    pub fn without_targets(mut self) -> Self {
        self.no_targets = true;
        self
    }

    pub fn governs(&self) -> Option<&str> {
        self.governs.as_deref()
    }

    pub fn has_state(&self, symbol: &str) -> bool {
        self.known_states.contains(symbol)
    }

    pub fn has_parameter(&self, name: &str) -> bool {
        self.known_parameters.contains(name)
    }

    /// bare identifiers resolve to a state first, then a parameter, then
    /// the implicit target of a state.
    pub(crate) fn resolve(&self, ident: &str) -> Option<Binding> {
        if self.has_state(ident) {
            return Some(Binding::State);
        }
        if self.has_parameter(ident) {
            return Some(Binding::Parameter);
        }
        match ident.strip_suffix(TARGET_SUFFIX) {
            Some(symbol) if !self.no_targets && self.has_state(symbol) => {
                Some(Binding::Target(symbol.to_owned()))
            }
            _ => None,
        }
    }
}

/// The states and parameters an expression reads.  Implicit
/// `<S>_target` bindings are never included.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependencies {
    pub stocks: BTreeSet<String>,
    pub parameters: BTreeSet<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ValidatedExpression {
    pub text: String,
    pub ast: Expr1,
    pub dependencies: Dependencies,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub code: ErrorCode,
    pub loc: Loc,
    /// the offending source text
    pub token: String,
}

impl ValidationError {
    fn new(text: &str, err: EquationError) -> Self {
        let token = text
            .get(err.start as usize..err.end as usize)
            .unwrap_or_default()
            .to_owned();
        ValidationError {
            code: err.code,
            loc: Loc {
                start: err.start,
                end: err.end,
            },
            token,
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.token.is_empty() {
            write!(f, "{} at {}", self.code, self.loc)
        } else {
            write!(f, "{} at {}: `{}`", self.code, self.loc, self.token)
        }
    }
}

impl std::error::Error for ValidationError {}

fn parse_nonempty(text: &str) -> Result<Expr0, ValidationError> {
    match parse(text) {
        Ok(Some(expr)) => Ok(expr),
        Ok(None) => Err(ValidationError {
            code: ErrorCode::EmptyEquation,
            loc: Loc::new(0, text.len()),
            token: String::new(),
        }),
        Err(err) => Err(ValidationError::new(text, err)),
    }
}

fn dependencies_of(ast: &Expr1, governs: Option<&str>) -> Dependencies {
    let mut deps = Dependencies::default();
    ast.walk(&mut |expr| match expr {
        Expr1::State(symbol, _) if Some(symbol.as_str()) != governs => {
            deps.stocks.insert(symbol.clone());
        }
        Expr1::Param(name, _) => {
            deps.parameters.insert(name.clone());
        }
        _ => {}
    });
    deps
}

/// validate_expression parses `text`, resolves every name against
/// `scope`, and extracts its dependencies.
pub fn validate_expression(
    text: &str,
    scope: &Scope,
) -> Result<ValidatedExpression, ValidationError> {
    let expr = parse_nonempty(text)?;
    let ast = Expr1::from(expr, scope).map_err(|err| ValidationError::new(text, err))?;
    let dependencies = dependencies_of(&ast, scope.governs());

    Ok(ValidatedExpression {
        text: text.to_owned(),
        ast,
        dependencies,
    })
}

/// unresolved_symbols lists every identifier and `p.<name>` reference in
/// `text` that does not resolve against `scope`, in source order without
/// repeats.  `p.<name>` references are reported with their prefix.
/// Syntax errors are returned as-is.
pub fn unresolved_symbols(text: &str, scope: &Scope) -> Result<Vec<String>, ValidationError> {
    let expr = parse_nonempty(text)?;

    let mut seen = BTreeSet::new();
    let mut missing = Vec::new();
    expr.for_each_ident(&mut |name, namespaced, _loc| {
        let resolved = if namespaced {
            scope.has_parameter(name)
        } else {
            scope.resolve(name).is_some()
        };
        if !resolved {
            let symbol = if namespaced {
                format!("p.{name}")
            } else {
                name.to_owned()
            };
            if seen.insert(symbol.clone()) {
                missing.push(symbol);
            }
        }
    });

    Ok(missing)
}

/// The serializable result of checking one expression, as returned to an
/// editor checking text as it is typed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpressionCheck {
    pub valid: bool,
    pub dependencies: Dependencies,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ValidationError>,
}

impl From<Result<ValidatedExpression, ValidationError>> for ExpressionCheck {
    fn from(result: Result<ValidatedExpression, ValidationError>) -> Self {
        match result {
            Ok(validated) => ExpressionCheck {
                valid: true,
                dependencies: validated.dependencies,
                error: None,
            },
            Err(err) => ExpressionCheck {
                valid: false,
                dependencies: Dependencies::default(),
                error: Some(err),
            },
        }
    }
}

pub fn check_expression(text: &str, scope: &Scope) -> ExpressionCheck {
    validate_expression(text, scope).into()
}

/// check_equations validates a batch of candidate expressions, keyed by
/// caller-chosen labels, against the states and parameters of `model`.
pub fn check_equations(
    model: &Model,
    equations: &BTreeMap<String, String>,
) -> BTreeMap<String, ExpressionCheck> {
    let scope = Scope::from_model(model);
    equations
        .iter()
        .map(|(label, text)| (label.clone(), check_expression(text, &scope)))
        .collect()
}
