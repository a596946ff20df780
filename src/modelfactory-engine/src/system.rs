// Copyright 2026 The Model Factory Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::check::validate_model;
use crate::common::{Error, ErrorKind, Result};
use crate::datamodel::Model;
use crate::eval::{Bindings, EvalResult};
use crate::model_err;
use crate::validate::{Scope, ValidatedExpression, validate_expression};

struct CompiledEquation {
    state: String,
    target: ValidatedExpression,
    rate: ValidatedExpression,
}

/// The right-hand side of the model at one point in state space.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Derivatives {
    /// target value of every state that has an equation
    pub targets: BTreeMap<String, f64>,
    /// rate of change of every state; states without an equation hold
    /// steady at 0
    pub rates: BTreeMap<String, f64>,
}

/// A validated model with every equation parsed and resolved, ready to
/// be evaluated repeatedly by an integrator.
pub struct CompiledSystem {
    states: Vec<String>,
    equations: Vec<CompiledEquation>,
}

impl CompiledSystem {
    pub fn new(model: &Model) -> Result<Self> {
        let report = validate_model(model);
        if let Some(issue) = report.errors.first() {
            return Err(Error::new(
                ErrorKind::Model,
                issue.code,
                Some(issue.to_string()),
            ));
        }

        let scope = Scope::from_model(model);
        let mut equations = Vec::with_capacity(model.equations.len());
        for equation in model.equations.iter() {
            let rate_scope = scope.clone().governing(&equation.state);
            let target_scope = rate_scope.clone().without_targets();
            let compile = |scope: &Scope, field: &str, text: &str| {
                match validate_expression(text, scope) {
                    Ok(expr) => Ok(expr),
                    Err(err) => model_err!(
                        Generic,
                        format!("equation {}: {field}: {err}", equation.state)
                    ),
                }
            };
            equations.push(CompiledEquation {
                state: equation.state.clone(),
                target: compile(&target_scope, "target_expr", &equation.target_expr)?,
                rate: compile(&rate_scope, "rate_expr", &equation.rate_expr)?,
            });
        }

        Ok(CompiledSystem {
            states: model.state_symbols().map(|s| s.to_owned()).collect(),
            equations,
        })
    }

    /// state symbols in model order
    pub fn states(&self) -> &[String] {
        &self.states
    }

    /// derivatives evaluates every target expression, then every rate
    /// expression with the targets bound as `<S>_target`.
    pub fn derivatives(
        &self,
        states: &BTreeMap<String, f64>,
        parameters: &BTreeMap<String, f64>,
    ) -> EvalResult<Derivatives> {
        let bindings = Bindings::new(states, parameters);

        let mut targets = BTreeMap::new();
        for equation in self.equations.iter() {
            let value = equation.target.evaluate(&bindings)?;
            targets.insert(equation.state.clone(), value);
        }

        let mut rates: BTreeMap<String, f64> =
            self.states.iter().map(|s| (s.clone(), 0.0)).collect();
        let bindings = bindings.with_targets(&targets);
        for equation in self.equations.iter() {
            let value = equation.rate.evaluate(&bindings)?;
            rates.insert(equation.state.clone(), value);
        }

        Ok(Derivatives { targets, rates })
    }
}
