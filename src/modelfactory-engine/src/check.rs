// Copyright 2026 The Model Factory Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Whole-model consistency checks.
//!
//! [`validate_model`] never stops at the first problem: every issue in the
//! model is reported, so an editor can show them all at once.  Feedback
//! loops between states are ordinary and are not reported.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::common::ErrorCode;
use crate::datamodel::{Coefficient, Model};
use crate::validate::{Scope, unresolved_symbols, validate_expression};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    State,
    Parameter,
    Relation,
    Equation,
    Scenario,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            EntityKind::State => "state",
            EntityKind::Parameter => "parameter",
            EntityKind::Relation => "relation",
            EntityKind::Equation => "equation",
            EntityKind::Scenario => "scenario",
        };
        write!(f, "{name}")
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub key: String,
}

impl EntityRef {
    pub fn new(kind: EntityKind, key: &str) -> Self {
        EntityRef {
            kind,
            key: key.to_owned(),
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.key)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelIssue {
    pub code: ErrorCode,
    pub entity: EntityRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl fmt::Display for ModelIssue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.details {
            Some(ref details) => write!(f, "{}: {} ({})", self.entity, self.code, details),
            None => write!(f, "{}: {}", self.entity, self.code),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<ModelIssue>,
    pub warnings: Vec<ModelIssue>,
}

#[derive(Default)]
struct ReportBuilder {
    errors: Vec<ModelIssue>,
    warnings: Vec<ModelIssue>,
}

impl ReportBuilder {
    fn error(&mut self, code: ErrorCode, entity: EntityRef, details: Option<String>) {
        self.errors.push(ModelIssue {
            code,
            entity,
            details,
        });
    }

    fn warning(&mut self, code: ErrorCode, entity: EntityRef, details: Option<String>) {
        self.warnings.push(ModelIssue {
            code,
            entity,
            details,
        });
    }

    fn check_finite(&mut self, entity: &EntityRef, what: &str, value: Option<f64>) -> bool {
        match value {
            Some(value) if !value.is_finite() => {
                self.error(
                    ErrorCode::NonFiniteValue,
                    entity.clone(),
                    Some(format!("{what} is {value}")),
                );
                false
            }
            _ => true,
        }
    }

    /// checks min <= max, and that `value` (if any) lies within them
    fn check_bounds(
        &mut self,
        entity: &EntityRef,
        what: &str,
        value: Option<f64>,
        min: Option<f64>,
        max: Option<f64>,
    ) {
        let finite = self.check_finite(entity, what, value)
            & self.check_finite(entity, "min", min)
            & self.check_finite(entity, "max", max);
        if !finite {
            return;
        }

        if let (Some(min), Some(max)) = (min, max) {
            if min > max {
                self.error(
                    ErrorCode::InvalidBounds,
                    entity.clone(),
                    Some(format!("min {min} > max {max}")),
                );
                return;
            }
        }

        let Some(value) = value else {
            return;
        };
        let below = min.is_some_and(|min| value < min);
        let above = max.is_some_and(|max| value > max);
        if below || above {
            let lo = min.map_or("-inf".to_owned(), |min| min.to_string());
            let hi = max.map_or("inf".to_owned(), |max| max.to_string());
            self.error(
                ErrorCode::OutOfRange,
                entity.clone(),
                Some(format!("{what} {value} outside [{lo}, {hi}]")),
            );
        }
    }

    fn check_unique<'a>(
        &mut self,
        kind: EntityKind,
        code: ErrorCode,
        what: &str,
        keys: impl Iterator<Item = (&'a str, &'a str)>,
    ) {
        let mut seen = BTreeSet::new();
        for (key, value) in keys {
            if !seen.insert(value) {
                self.error(
                    code,
                    EntityRef::new(kind, key),
                    Some(format!("duplicate {what} {value}")),
                );
            }
        }
    }

    fn finish(self) -> ValidationReport {
        ValidationReport {
            valid: self.errors.is_empty(),
            errors: self.errors,
            warnings: self.warnings,
        }
    }
}

fn check_states(model: &Model, report: &mut ReportBuilder) {
    use EntityKind::State;
    report.check_unique(
        State,
        ErrorCode::DuplicateSymbol,
        "symbol",
        model.states.iter().map(|s| (s.symbol.as_str(), s.symbol.as_str())),
    );
    report.check_unique(
        State,
        ErrorCode::DuplicateId,
        "id",
        model.states.iter().map(|s| (s.symbol.as_str(), s.id.as_str())),
    );

    for state in model.states.iter() {
        let entity = EntityRef::new(State, &state.symbol);
        if state.symbol.trim().is_empty() {
            report.error(ErrorCode::EmptyKey, entity.clone(), None);
        }
        report.check_bounds(&entity, "initial", Some(state.initial), state.min, state.max);
        if let Some(position) = state.position {
            report.check_finite(&entity, "position.x", Some(position.x));
            report.check_finite(&entity, "position.y", Some(position.y));
        }
    }
}

fn check_parameters(model: &Model, report: &mut ReportBuilder) {
    use EntityKind::Parameter;
    report.check_unique(
        Parameter,
        ErrorCode::DuplicateSymbol,
        "name",
        model.parameters.iter().map(|p| (p.name.as_str(), p.name.as_str())),
    );
    report.check_unique(
        Parameter,
        ErrorCode::DuplicateId,
        "id",
        model.parameters.iter().map(|p| (p.name.as_str(), p.id.as_str())),
    );

    for param in model.parameters.iter() {
        let entity = EntityRef::new(Parameter, &param.name);
        if param.name.trim().is_empty() {
            report.error(ErrorCode::EmptyKey, entity.clone(), None);
        }
        report.check_bounds(&entity, "value", Some(param.value), param.min, param.max);
        if model.get_state(&param.name).is_some() {
            report.warning(
                ErrorCode::ShadowedParameter,
                entity,
                Some(format!(
                    "bare `{}` refers to the state; use `p.{}`",
                    param.name, param.name
                )),
            );
        }
    }
}

fn check_relations(model: &Model, report: &mut ReportBuilder) {
    use EntityKind::Relation;
    report.check_unique(
        Relation,
        ErrorCode::DuplicateId,
        "id",
        model.relations.iter().map(|r| (r.id.as_str(), r.id.as_str())),
    );

    for relation in model.relations.iter() {
        let entity = EntityRef::new(Relation, &relation.id);
        let endpoints = relation
            .source
            .iter()
            .map(|s| ("source", s))
            .chain(std::iter::once(("target", &relation.target)));
        for (end, symbol) in endpoints {
            if model.get_state(symbol).is_none() {
                report.error(
                    ErrorCode::UnknownState,
                    entity.clone(),
                    Some(format!("{end} {symbol}")),
                );
            }
        }
        match relation.coefficient {
            Some(Coefficient::Parameter(ref name)) if model.get_parameter(name).is_none() => {
                report.error(
                    ErrorCode::UnknownParameter,
                    entity.clone(),
                    Some(format!("coefficient {name}")),
                );
            }
            Some(Coefficient::Value(value)) => {
                report.check_finite(&entity, "coefficient", Some(value));
            }
            _ => {}
        }
    }
}

fn check_equations(model: &Model, report: &mut ReportBuilder) {
    use EntityKind::Equation;
    report.check_unique(
        Equation,
        ErrorCode::DuplicateSymbol,
        "equation for",
        model.equations.iter().map(|e| (e.state.as_str(), e.state.as_str())),
    );

    let scope = Scope::from_model(model);
    for equation in model.equations.iter() {
        let entity = EntityRef::new(Equation, &equation.state);
        if model.get_state(&equation.state).is_none() {
            report.error(
                ErrorCode::OrphanEquation,
                entity.clone(),
                Some(format!("no state {}", equation.state)),
            );
        }

        let rate_scope = scope.clone().governing(&equation.state);
        let target_scope = rate_scope.clone().without_targets();
        let exprs = [
            ("target_expr", &equation.target_expr, &target_scope),
            ("rate_expr", &equation.rate_expr, &rate_scope),
        ];
        for (field, text, scope) in exprs {
            let err = match validate_expression(text, scope) {
                Ok(_) => continue,
                Err(err) => err,
            };
            let missing = match err.code {
                ErrorCode::UnknownIdent | ErrorCode::UnknownParameter => {
                    unresolved_symbols(text, scope).unwrap_or_default()
                }
                _ => vec![],
            };
            if missing.is_empty() {
                report.error(err.code, entity.clone(), Some(format!("{field}: {err}")));
            } else {
                for symbol in missing {
                    report.error(
                        ErrorCode::UnknownDependency,
                        entity.clone(),
                        Some(format!("{field}: {symbol}")),
                    );
                }
            }
        }
    }

    for state in model.states.iter() {
        if model.get_equation(&state.symbol).is_none() {
            report.warning(
                ErrorCode::MissingEquation,
                EntityRef::new(EntityKind::State, &state.symbol),
                None,
            );
        }
    }
}

/// override values must name an existing entity and respect its bounds.
/// `bounds` returns the entity's (min, max), or None when it is missing.
fn check_overrides(
    report: &mut ReportBuilder,
    entity: &EntityRef,
    field: &str,
    overrides: &BTreeMap<String, f64>,
    bounds: impl Fn(&str) -> Option<(Option<f64>, Option<f64>)>,
    missing: ErrorCode,
) {
    for (key, value) in overrides.iter() {
        let what = format!("{field}.{key}");
        match bounds(key) {
            Some((min, max)) => {
                // inverted bounds are reported on the entity itself
                let bounds_ok = min.zip(max).is_none_or(|(min, max)| min <= max);
                if bounds_ok {
                    report.check_bounds(entity, &what, Some(*value), min, max);
                } else {
                    report.check_finite(entity, &what, Some(*value));
                }
            }
            None => {
                report.error(missing, entity.clone(), Some(what));
            }
        }
    }
}

fn check_scenarios(model: &Model, report: &mut ReportBuilder) {
    use EntityKind::Scenario;
    report.check_unique(
        Scenario,
        ErrorCode::DuplicateSymbol,
        "name",
        model.scenarios.iter().map(|s| (s.name.as_str(), s.name.as_str())),
    );

    for scenario in model.scenarios.iter() {
        let entity = EntityRef::new(Scenario, &scenario.name);
        check_overrides(
            report,
            &entity,
            "parameter_overrides",
            &scenario.parameter_overrides,
            |name| model.get_parameter(name).map(|p| (p.min, p.max)),
            ErrorCode::UnknownParameter,
        );
        check_overrides(
            report,
            &entity,
            "initial_overrides",
            &scenario.initial_overrides,
            |symbol| model.get_state(symbol).map(|s| (s.min, s.max)),
            ErrorCode::UnknownState,
        );
    }
}

/// validate_model reports every structural problem with `model`.  The
/// model is valid when there are no errors; warnings never affect
/// validity.
pub fn validate_model(model: &Model) -> ValidationReport {
    let mut report = ReportBuilder::default();

    check_states(model, &mut report);
    check_parameters(model, &mut report);
    check_relations(model, &mut report);
    check_equations(model, &mut report);
    check_scenarios(model, &mut report);

    report.finish()
}
