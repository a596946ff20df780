// Copyright 2026 The Model Factory Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Common test infrastructure for building test models
//!
//! This module provides a builder-based API for creating models that can
//! be used by the validator, merge and evaluation test modules.

use crate::change::{ChangeOperation, EquationData, ParameterData, RelationData, StateData};
use crate::check::{ValidationReport, validate_model};
use crate::common::ErrorCode;
use crate::datamodel::{Coefficient, Equation, Model, Parameter, Relation, Scenario, State};
use crate::validate::Scope;

/// Builder for creating test models
pub struct TestModel {
    model: Model,
}

impl TestModel {
    pub fn new(name: &str) -> Self {
        Self {
            model: Model {
                name: name.to_string(),
                ..Default::default()
            },
        }
    }

    #[allow(dead_code)]
    pub fn version(mut self, version: &str) -> Self {
        self.model.version = Some(version.to_string());
        self
    }

    pub fn state(mut self, symbol: &str, initial: f64) -> Self {
        self.model.states.push(State::new(symbol, symbol, initial));
        self
    }

    #[allow(dead_code)]
    pub fn bounded_state(mut self, symbol: &str, initial: f64, min: f64, max: f64) -> Self {
        let mut state = State::new(symbol, symbol, initial);
        state.min = Some(min);
        state.max = Some(max);
        self.model.states.push(state);
        self
    }

    pub fn param(mut self, name: &str, value: f64) -> Self {
        self.model.parameters.push(Parameter::new(name, value));
        self
    }

    #[allow(dead_code)]
    pub fn bounded_param(mut self, name: &str, value: f64, min: f64, max: f64) -> Self {
        let mut param = Parameter::new(name, value);
        param.min = Some(min);
        param.max = Some(max);
        self.model.parameters.push(param);
        self
    }

    pub fn relation(mut self, id: &str, source: Option<&str>, target: &str) -> Self {
        self.model.relations.push(Relation {
            id: id.to_string(),
            source: source.map(|s| s.to_string()),
            target: target.to_string(),
            coefficient: Some(Coefficient::Value(1.0)),
            polarity: Default::default(),
            description: None,
        });
        self
    }

    pub fn equation(mut self, symbol: &str, target_expr: &str, rate_expr: &str) -> Self {
        self.model.equations.push(Equation {
            state: symbol.to_string(),
            target_expr: target_expr.to_string(),
            rate_expr: rate_expr.to_string(),
            description: None,
        });
        self
    }

    #[allow(dead_code)]
    pub fn scenario(
        mut self,
        name: &str,
        parameter_overrides: &[(&str, f64)],
        initial_overrides: &[(&str, f64)],
    ) -> Self {
        let to_map = |overrides: &[(&str, f64)]| {
            overrides
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect()
        };
        self.model.scenarios.push(Scenario {
            name: name.to_string(),
            description: None,
            parameter_overrides: to_map(parameter_overrides),
            initial_overrides: to_map(initial_overrides),
        });
        self
    }

    pub fn build(&self) -> Model {
        self.model.clone()
    }

    #[allow(dead_code)]
    pub fn scope(&self) -> Scope {
        Scope::from_model(&self.model)
    }

    #[allow(dead_code)]
    pub fn report(&self) -> ValidationReport {
        validate_model(&self.model)
    }

    #[allow(dead_code)]
    pub fn assert_valid(&self) {
        let report = self.report();
        assert!(report.valid, "expected a valid model, got {:?}", report.errors);
    }

    /// assert the model fails validation with (at least) the given code
    #[allow(dead_code)]
    pub fn assert_error(&self, expected: ErrorCode) {
        let report = self.report();
        assert!(!report.valid, "expected {expected} but the model is valid");
        assert!(
            report.errors.iter().any(|issue| issue.code == expected),
            "expected {expected} in {:?}",
            report.errors
        );
    }
}

/// states T and S, parameter kT, a relation S -> T and an equation for T
#[allow(dead_code)]
pub fn targeting_model() -> TestModel {
    TestModel::new("targeting")
        .version("v1")
        .state("T", 0.3)
        .state("S", 0.4)
        .param("kT", 0.7)
        .relation("rel.S_to_T", Some("S"), "T")
        .equation("T", "clamp(0.6*S, 0, 1)", "kT*(T_target - T)")
        .equation("S", "0.4", "0.5*(S_target - S)")
}

/// Shorthand constructors for change operations.
#[allow(dead_code)]
pub mod ops {
    use super::*;

    pub fn add_state(symbol: &str, initial: f64) -> ChangeOperation {
        ChangeOperation::AddState {
            symbol: symbol.to_string(),
            data: StateData {
                id: None,
                name: symbol.to_string(),
                category: None,
                initial,
                min: None,
                max: None,
                position: None,
            },
            reason: None,
        }
    }

    pub fn remove_state(symbol: &str) -> ChangeOperation {
        ChangeOperation::RemoveState {
            symbol: symbol.to_string(),
            reason: None,
        }
    }

    pub fn remove_parameter(name: &str) -> ChangeOperation {
        ChangeOperation::RemoveParameter {
            name: name.to_string(),
            reason: None,
        }
    }

    pub fn add_parameter(name: &str, value: f64) -> ChangeOperation {
        ChangeOperation::AddParameter {
            name: name.to_string(),
            data: ParameterData {
                id: None,
                value,
                min: None,
                max: None,
                category: None,
            },
            reason: None,
        }
    }

    pub fn add_relation(id: &str, source: Option<&str>, target: &str) -> ChangeOperation {
        ChangeOperation::AddRelation {
            id: id.to_string(),
            data: RelationData {
                source: source.map(|s| s.to_string()),
                target: target.to_string(),
                coefficient: None,
                polarity: None,
                description: None,
            },
            reason: None,
        }
    }

    pub fn add_equation(symbol: &str, target_expr: &str, rate_expr: &str) -> ChangeOperation {
        ChangeOperation::AddEquation {
            symbol: symbol.to_string(),
            data: EquationData {
                target_expr: target_expr.to_string(),
                rate_expr: rate_expr.to_string(),
                description: None,
            },
            reason: None,
        }
    }
}
