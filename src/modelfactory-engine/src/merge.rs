// Copyright 2026 The Model Factory Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Applying a draft's changes to a base model.
//!
//! [`merge`] works on a deep copy of the base and applies the changes
//! strictly in order.  Each change checks every precondition before it
//! touches the working copy, so a change that fails is recorded as a
//! [`MergeSkip`] and leaves nothing half-applied; later changes still run.
//! Once every change has been tried the result is run through the model
//! validator.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::change::{
    ChangeKind, ChangeOperation, EquationData, EquationPatch, ParameterData, ParameterPatch,
    RelationData, RelationPatch, ScenarioData, ScenarioPatch, StateData, StatePatch,
};
use crate::change_err;
use crate::check::{ValidationReport, validate_model};
use crate::common::{Error, ErrorCode, ErrorKind, Result};
use crate::datamodel::{
    Coefficient, Equation, Model, Parameter, Relation, Scenario, State, default_parameter_id,
    default_state_id,
};
use crate::draft::Draft;
use crate::validate::{Scope, validate_expression};

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeMode {
    #[default]
    Preview,
    Commit,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeOptions {
    pub mode: MergeMode,
    /// keep the effective model even when it fails validation
    pub partial_apply: bool,
}

impl MergeOptions {
    pub fn preview() -> Self {
        MergeOptions::default()
    }

    pub fn commit() -> Self {
        MergeOptions {
            mode: MergeMode::Commit,
            partial_apply: false,
        }
    }
}

/// A change that could not be applied.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeSkip {
    /// position of the change in the draft
    pub index: usize,
    pub kind: ChangeKind,
    pub target: String,
    pub code: ErrorCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MergeWarning {
    /// removing a state also removed everything that referred to it
    CascadeRemoved {
        index: usize,
        state: String,
        relations: Vec<String>,
        equation: bool,
        /// scenarios that lost an initial override for the state
        scenario_overrides: Vec<String>,
    },
    /// removing a parameter also removed the scenario overrides of it
    ParameterCascadeRemoved {
        index: usize,
        parameter: String,
        scenario_overrides: Vec<String>,
    },
    /// the draft was forked from a different version than the base
    BaseVersionMismatch {
        draft: Option<String>,
        base: Option<String>,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MergeResult {
    pub mode: MergeMode,
    /// present when the merged model is valid, or when a partial apply
    /// was requested
    pub effective_model: Option<Model>,
    pub applied_count: usize,
    pub skipped: Vec<MergeSkip>,
    pub warnings: Vec<MergeWarning>,
    pub report: ValidationReport,
}

impl MergeResult {
    /// true when the caller asked to commit and the merged model is
    /// valid; persisting it is up to the caller.
    pub fn should_commit(&self) -> bool {
        self.mode == MergeMode::Commit && self.report.valid && self.effective_model.is_some()
    }
}

fn require_state(model: &Model, symbol: &str) -> Result<()> {
    if model.get_state(symbol).is_none() {
        return change_err!(UnknownState, format!("no state {symbol}"));
    }
    Ok(())
}

fn require_coefficient(model: &Model, coefficient: Option<&Coefficient>) -> Result<()> {
    if let Some(Coefficient::Parameter(name)) = coefficient {
        if model.get_parameter(name).is_none() {
            return change_err!(UnknownParameter, format!("no parameter {name}"));
        }
    }
    Ok(())
}

fn validate_equation_expr(scope: &Scope, field: &str, text: &str) -> Result<()> {
    match validate_expression(text, scope) {
        Ok(_) => Ok(()),
        Err(err) => Err(Error::new(
            ErrorKind::Expression,
            err.code,
            Some(format!("{field}: {err}")),
        )),
    }
}

fn require_override_keys<'a>(
    keys: impl Iterator<Item = &'a String>,
    exists: impl Fn(&str) -> bool,
    field: &str,
    code: ErrorCode,
) -> Result<()> {
    for key in keys {
        if !exists(key) {
            return Err(Error::new(
                ErrorKind::Change,
                code,
                Some(format!("{field}.{key}")),
            ));
        }
    }
    Ok(())
}

fn add_state(model: &mut Model, symbol: &str, data: &StateData) -> Result<()> {
    if model.get_state(symbol).is_some() {
        return change_err!(DuplicateSymbol, format!("state {symbol} already exists"));
    }
    let id = data.id.clone().unwrap_or_else(|| default_state_id(symbol));
    if model.states.iter().any(|s| s.id == id) {
        return change_err!(DuplicateId, format!("state id {id} already exists"));
    }

    model.states.push(State {
        symbol: symbol.to_owned(),
        id,
        name: data.name.clone(),
        category: data.category.clone(),
        initial: data.initial,
        min: data.min,
        max: data.max,
        position: data.position,
    });
    Ok(())
}

fn update_state(model: &mut Model, symbol: &str, data: &StatePatch) -> Result<()> {
    if let Some(id) = &data.id {
        if model.states.iter().any(|s| s.id == *id && s.symbol != symbol) {
            return change_err!(DuplicateId, format!("state id {id} already exists"));
        }
    }
    let Some(state) = model.get_state_mut(symbol) else {
        return change_err!(DoesNotExist, format!("state {symbol}"));
    };

    if let Some(id) = &data.id {
        state.id = id.clone();
    }
    if let Some(name) = &data.name {
        state.name = name.clone();
    }
    if let Some(category) = &data.category {
        state.category = Some(category.clone());
    }
    if let Some(initial) = data.initial {
        state.initial = initial;
    }
    if data.min.is_some() {
        state.min = data.min;
    }
    if data.max.is_some() {
        state.max = data.max;
    }
    if data.position.is_some() {
        state.position = data.position;
    }
    // clearing wins over a value given in the same patch
    if data.clear_min {
        state.min = None;
    }
    if data.clear_max {
        state.max = None;
    }
    if data.clear_position {
        state.position = None;
    }
    Ok(())
}

fn remove_state(model: &mut Model, index: usize, symbol: &str) -> Result<Option<MergeWarning>> {
    let Some(pos) = model.states.iter().position(|s| s.symbol == symbol) else {
        return change_err!(DoesNotExist, format!("state {symbol}"));
    };
    model.states.remove(pos);

    let mut relations = vec![];
    model.relations.retain(|r| {
        let touches = r.target == symbol || r.source.as_deref() == Some(symbol);
        if touches {
            relations.push(r.id.clone());
        }
        !touches
    });

    let before = model.equations.len();
    model.equations.retain(|e| e.state != symbol);
    let equation = model.equations.len() != before;

    let mut scenario_overrides = vec![];
    for scenario in model.scenarios.iter_mut() {
        if scenario.initial_overrides.remove(symbol).is_some() {
            scenario_overrides.push(scenario.name.clone());
        }
    }

    if relations.is_empty() && !equation && scenario_overrides.is_empty() {
        return Ok(None);
    }
    Ok(Some(MergeWarning::CascadeRemoved {
        index,
        state: symbol.to_owned(),
        relations,
        equation,
        scenario_overrides,
    }))
}

fn add_relation(model: &mut Model, id: &str, data: &RelationData) -> Result<()> {
    if model.get_relation(id).is_some() {
        return change_err!(DuplicateId, format!("relation {id} already exists"));
    }
    if let Some(source) = &data.source {
        require_state(model, source)?;
    }
    require_state(model, &data.target)?;
    require_coefficient(model, data.coefficient.as_ref())?;

    model.relations.push(Relation {
        id: id.to_owned(),
        source: data.source.clone(),
        target: data.target.clone(),
        coefficient: data.coefficient.clone(),
        polarity: data.polarity.unwrap_or_default(),
        description: data.description.clone(),
    });
    Ok(())
}

fn update_relation(model: &mut Model, id: &str, data: &RelationPatch) -> Result<()> {
    if model.get_relation(id).is_none() {
        return change_err!(DoesNotExist, format!("relation {id}"));
    }
    if let Some(source) = &data.source {
        require_state(model, source)?;
    }
    if let Some(target) = &data.target {
        require_state(model, target)?;
    }
    require_coefficient(model, data.coefficient.as_ref())?;

    let Some(relation) = model.get_relation_mut(id) else {
        return change_err!(DoesNotExist, format!("relation {id}"));
    };
    if data.source.is_some() {
        relation.source = data.source.clone();
    }
    if data.clear_source {
        relation.source = None;
    }
    if let Some(target) = &data.target {
        relation.target = target.clone();
    }
    if data.coefficient.is_some() {
        relation.coefficient = data.coefficient.clone();
    }
    if let Some(polarity) = data.polarity {
        relation.polarity = polarity;
    }
    if let Some(description) = &data.description {
        relation.description = Some(description.clone());
    }
    Ok(())
}

fn remove_relation(model: &mut Model, id: &str) -> Result<()> {
    let Some(pos) = model.relations.iter().position(|r| r.id == id) else {
        return change_err!(DoesNotExist, format!("relation {id}"));
    };
    model.relations.remove(pos);
    Ok(())
}

fn add_parameter(model: &mut Model, name: &str, data: &ParameterData) -> Result<()> {
    if model.get_parameter(name).is_some() {
        return change_err!(DuplicateSymbol, format!("parameter {name} already exists"));
    }
    let id = data.id.clone().unwrap_or_else(|| default_parameter_id(name));
    if model.parameters.iter().any(|p| p.id == id) {
        return change_err!(DuplicateId, format!("parameter id {id} already exists"));
    }

    model.parameters.push(Parameter {
        name: name.to_owned(),
        id,
        value: data.value,
        min: data.min,
        max: data.max,
        category: data.category.clone(),
    });
    Ok(())
}

fn update_parameter(model: &mut Model, name: &str, data: &ParameterPatch) -> Result<()> {
    if let Some(id) = &data.id {
        if model.parameters.iter().any(|p| p.id == *id && p.name != name) {
            return change_err!(DuplicateId, format!("parameter id {id} already exists"));
        }
    }
    let Some(param) = model.get_parameter_mut(name) else {
        return change_err!(DoesNotExist, format!("parameter {name}"));
    };

    if let Some(id) = &data.id {
        param.id = id.clone();
    }
    if let Some(value) = data.value {
        param.value = value;
    }
    if data.min.is_some() {
        param.min = data.min;
    }
    if data.max.is_some() {
        param.max = data.max;
    }
    if let Some(category) = &data.category {
        param.category = Some(category.clone());
    }
    if data.clear_min {
        param.min = None;
    }
    if data.clear_max {
        param.max = None;
    }
    Ok(())
}

fn remove_parameter(model: &mut Model, index: usize, name: &str) -> Result<Option<MergeWarning>> {
    let Some(pos) = model.parameters.iter().position(|p| p.name == name) else {
        return change_err!(DoesNotExist, format!("parameter {name}"));
    };
    model.parameters.remove(pos);

    let mut scenario_overrides = vec![];
    for scenario in model.scenarios.iter_mut() {
        if scenario.parameter_overrides.remove(name).is_some() {
            scenario_overrides.push(scenario.name.clone());
        }
    }

    if scenario_overrides.is_empty() {
        return Ok(None);
    }
    Ok(Some(MergeWarning::ParameterCascadeRemoved {
        index,
        parameter: name.to_owned(),
        scenario_overrides,
    }))
}

fn add_equation(model: &mut Model, symbol: &str, data: &EquationData) -> Result<()> {
    require_state(model, symbol)?;
    if model.get_equation(symbol).is_some() {
        return change_err!(DuplicateSymbol, format!("equation for {symbol} already exists"));
    }
    let scope = Scope::from_model(model).governing(symbol);
    let target_scope = scope.clone().without_targets();
    validate_equation_expr(&target_scope, "target_expr", &data.target_expr)?;
    validate_equation_expr(&scope, "rate_expr", &data.rate_expr)?;

    model.equations.push(Equation {
        state: symbol.to_owned(),
        target_expr: data.target_expr.clone(),
        rate_expr: data.rate_expr.clone(),
        description: data.description.clone(),
    });
    Ok(())
}

fn update_equation(model: &mut Model, symbol: &str, data: &EquationPatch) -> Result<()> {
    if model.get_equation(symbol).is_none() {
        return change_err!(DoesNotExist, format!("equation for {symbol}"));
    }
    let scope = Scope::from_model(model).governing(symbol);
    if let Some(text) = &data.target_expr {
        let target_scope = scope.clone().without_targets();
        validate_equation_expr(&target_scope, "target_expr", text)?;
    }
    if let Some(text) = &data.rate_expr {
        validate_equation_expr(&scope, "rate_expr", text)?;
    }

    let Some(equation) = model.get_equation_mut(symbol) else {
        return change_err!(DoesNotExist, format!("equation for {symbol}"));
    };
    if let Some(text) = &data.target_expr {
        equation.target_expr = text.clone();
    }
    if let Some(text) = &data.rate_expr {
        equation.rate_expr = text.clone();
    }
    if let Some(description) = &data.description {
        equation.description = Some(description.clone());
    }
    Ok(())
}

fn remove_equation(model: &mut Model, symbol: &str) -> Result<()> {
    let Some(pos) = model.equations.iter().position(|e| e.state == symbol) else {
        return change_err!(DoesNotExist, format!("equation for {symbol}"));
    };
    model.equations.remove(pos);
    Ok(())
}

fn require_scenario_keys(
    model: &Model,
    parameter_overrides: Option<&BTreeMap<String, f64>>,
    initial_overrides: Option<&BTreeMap<String, f64>>,
) -> Result<()> {
    if let Some(overrides) = parameter_overrides {
        require_override_keys(
            overrides.keys(),
            |name| model.get_parameter(name).is_some(),
            "parameter_overrides",
            ErrorCode::UnknownParameter,
        )?;
    }
    if let Some(overrides) = initial_overrides {
        require_override_keys(
            overrides.keys(),
            |symbol| model.get_state(symbol).is_some(),
            "initial_overrides",
            ErrorCode::UnknownState,
        )?;
    }
    Ok(())
}

fn add_scenario(model: &mut Model, name: &str, data: &ScenarioData) -> Result<()> {
    if model.get_scenario(name).is_some() {
        return change_err!(DuplicateSymbol, format!("scenario {name} already exists"));
    }
    require_scenario_keys(
        model,
        Some(&data.parameter_overrides),
        Some(&data.initial_overrides),
    )?;

    model.scenarios.push(Scenario {
        name: name.to_owned(),
        description: data.description.clone(),
        parameter_overrides: data.parameter_overrides.clone(),
        initial_overrides: data.initial_overrides.clone(),
    });
    Ok(())
}

fn update_scenario(model: &mut Model, name: &str, data: &ScenarioPatch) -> Result<()> {
    if model.get_scenario(name).is_none() {
        return change_err!(DoesNotExist, format!("scenario {name}"));
    }
    require_scenario_keys(
        model,
        data.parameter_overrides.as_ref(),
        data.initial_overrides.as_ref(),
    )?;

    let Some(scenario) = model.get_scenario_mut(name) else {
        return change_err!(DoesNotExist, format!("scenario {name}"));
    };
    if let Some(description) = &data.description {
        scenario.description = Some(description.clone());
    }
    if let Some(overrides) = &data.parameter_overrides {
        scenario.parameter_overrides.extend(overrides.clone());
    }
    if let Some(overrides) = &data.initial_overrides {
        scenario.initial_overrides.extend(overrides.clone());
    }
    for key in data.remove_parameter_overrides.iter() {
        scenario.parameter_overrides.remove(key);
    }
    for key in data.remove_initial_overrides.iter() {
        scenario.initial_overrides.remove(key);
    }
    Ok(())
}

fn remove_scenario(model: &mut Model, name: &str) -> Result<()> {
    let Some(pos) = model.scenarios.iter().position(|s| s.name == name) else {
        return change_err!(DoesNotExist, format!("scenario {name}"));
    };
    model.scenarios.remove(pos);
    Ok(())
}

/// apply a single change to `model`.  On error `model` is unchanged.
fn apply_change(
    model: &mut Model,
    index: usize,
    op: &ChangeOperation,
) -> Result<Option<MergeWarning>> {
    use ChangeOperation::*;

    op.check()?;
    match op {
        AddState { symbol, data, .. } => add_state(model, symbol, data)?,
        UpdateState { symbol, data, .. } => update_state(model, symbol, data)?,
        RemoveState { symbol, .. } => return remove_state(model, index, symbol),
        AddRelation { id, data, .. } => add_relation(model, id, data)?,
        UpdateRelation { id, data, .. } => update_relation(model, id, data)?,
        RemoveRelation { id, .. } => remove_relation(model, id)?,
        AddParameter { name, data, .. } => add_parameter(model, name, data)?,
        UpdateParameter { name, data, .. } => update_parameter(model, name, data)?,
        RemoveParameter { name, .. } => return remove_parameter(model, index, name),
        AddEquation { symbol, data, .. } => add_equation(model, symbol, data)?,
        UpdateEquation { symbol, data, .. } => update_equation(model, symbol, data)?,
        RemoveEquation { symbol, .. } => remove_equation(model, symbol)?,
        AddScenario { name, data, .. } => add_scenario(model, name, data)?,
        UpdateScenario { name, data, .. } => update_scenario(model, name, data)?,
        RemoveScenario { name, .. } => remove_scenario(model, name)?,
    }
    Ok(None)
}

/// merge applies `draft` on top of `base`, returning the effective model
/// and an account of what was applied, skipped and cascaded.  `base` is
/// never modified, and the same inputs always produce the same result.
pub fn merge(base: &Model, draft: &Draft, options: &MergeOptions) -> MergeResult {
    let mut working = base.clone();
    let mut applied_count = 0;
    let mut skipped = vec![];
    let mut warnings = vec![];

    if draft.based_on.is_some() && draft.based_on != base.version {
        warn!(
            draft = ?draft.based_on,
            base = ?base.version,
            "draft was forked from a different base version"
        );
        warnings.push(MergeWarning::BaseVersionMismatch {
            draft: draft.based_on.clone(),
            base: base.version.clone(),
        });
    }

    for (index, op) in draft.changes.iter().enumerate() {
        match apply_change(&mut working, index, op) {
            Ok(warning) => {
                debug!(index, op = %op.kind(), key = op.target(), "applied change");
                applied_count += 1;
                if let Some(warning) = warning {
                    warn!(index, op = %op.kind(), key = op.target(), "cascading removal");
                    warnings.push(warning);
                }
            }
            Err(err) => {
                warn!(
                    index,
                    op = %op.kind(),
                    key = op.target(),
                    code = %err.code,
                    "skipped change"
                );
                skipped.push(MergeSkip {
                    index,
                    kind: op.kind(),
                    target: op.target().to_owned(),
                    code: err.code,
                    details: err.details,
                });
            }
        }
    }

    let report = validate_model(&working);
    info!(
        draft = %draft.id,
        applied = applied_count,
        skipped = skipped.len(),
        valid = report.valid,
        "merged draft"
    );

    let effective_model = if report.valid || options.partial_apply {
        Some(working)
    } else {
        None
    };

    MergeResult {
        mode: options.mode,
        effective_model,
        applied_count,
        skipped,
        warnings,
        report,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::{ScenarioPatch, StatePatch};
    use crate::datamodel::Position;
    // named imports take precedence over the private appliers in `super`
    use crate::test_common::ops::{
        add_equation, add_parameter, add_relation, add_state, remove_parameter, remove_state,
    };
    use crate::test_common::{TestModel, targeting_model};

    fn draft(changes: Vec<ChangeOperation>) -> Draft {
        let mut draft = Draft::new(Some("v1"));
        draft.changes = changes;
        draft
    }

    fn preview(base: &Model, changes: Vec<ChangeOperation>) -> MergeResult {
        merge(base, &draft(changes), &MergeOptions::preview())
    }

    fn skip_codes(result: &MergeResult) -> Vec<(usize, ErrorCode)> {
        result.skipped.iter().map(|s| (s.index, s.code)).collect()
    }

    #[test]
    fn test_cascade() {
        let base = targeting_model()
            .scenario("warm", &[], &[("T", 0.5), ("S", 0.1)])
            .build();
        let result = preview(&base, vec![remove_state("T")]);

        assert_eq!(1, result.applied_count);
        assert!(result.skipped.is_empty());
        assert!(result.report.valid, "{:?}", result.report.errors);

        let model = result.effective_model.unwrap();
        assert!(model.get_state("T").is_none());
        assert!(model.get_relation("rel.S_to_T").is_none());
        assert!(model.get_equation("T").is_none());
        assert!(model.get_equation("S").is_some());
        let warm = model.get_scenario("warm").unwrap();
        assert!(!warm.initial_overrides.contains_key("T"));
        assert!(warm.initial_overrides.contains_key("S"));

        assert_eq!(
            vec![MergeWarning::CascadeRemoved {
                index: 0,
                state: "T".to_owned(),
                relations: vec!["rel.S_to_T".to_owned()],
                equation: true,
                scenario_overrides: vec!["warm".to_owned()],
            }],
            result.warnings
        );
    }

    #[test]
    fn test_parameter_cascade() {
        let base = targeting_model()
            .param("kS", 0.5)
            .scenario("warm", &[("kT", 1.5), ("kS", 0.2)], &[])
            .scenario("cold", &[("kS", 0.1)], &[])
            .build();
        let result = preview(&base, vec![remove_parameter("kS")]);
        assert!(result.report.valid, "{:?}", result.report.errors);

        let model = result.effective_model.unwrap();
        assert!(model.get_parameter("kS").is_none());
        let warm = model.get_scenario("warm").unwrap();
        assert!(!warm.parameter_overrides.contains_key("kS"));
        assert_eq!(Some(&1.5), warm.parameter_overrides.get("kT"));
        assert!(model.get_scenario("cold").unwrap().parameter_overrides.is_empty());

        assert_eq!(
            vec![MergeWarning::ParameterCascadeRemoved {
                index: 0,
                parameter: "kS".to_owned(),
                scenario_overrides: vec!["warm".to_owned(), "cold".to_owned()],
            }],
            result.warnings
        );

        // nothing to cascade, nothing to warn about
        let result = preview(&base, vec![add_parameter("kU", 1.0), remove_parameter("kU")]);
        assert_eq!(2, result.applied_count);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_cascade_leaves_dependents_invalid() {
        // S's target reads T, so removing T cascades but the model still
        // fails validation on the dangling reference
        let mut base = targeting_model().build();
        base.equations[1].target_expr = "T".to_owned();
        let result = preview(&base, vec![remove_state("T")]);
        assert_eq!(1, result.applied_count);
        assert!(!result.report.valid);
        assert_eq!(ErrorCode::UnknownDependency, result.report.errors[0].code);
        assert_eq!(None, result.effective_model);
    }

    #[test]
    fn test_partial_failure() {
        let base = targeting_model().build();
        let result = preview(
            &base,
            vec![
                add_parameter("kS", 0.2),
                add_relation("rel.Z_to_T", Some("Z"), "T"),
                add_state("U", 0.0),
            ],
        );
        assert_eq!(2, result.applied_count);
        assert_eq!(vec![(1, ErrorCode::UnknownState)], skip_codes(&result));
        assert_eq!(ChangeKind::AddRelation, result.skipped[0].kind);
        assert_eq!("rel.Z_to_T", result.skipped[0].target);
        assert!(result.report.valid);

        let model = result.effective_model.unwrap();
        assert!(model.get_parameter("kS").is_some());
        assert!(model.get_state("U").is_some());
        assert!(model.get_relation("rel.Z_to_T").is_none());
    }

    #[test]
    fn test_base_is_never_mutated_and_merge_is_deterministic() {
        let base = targeting_model().build();
        let snapshot = base.clone();
        let draft = draft(vec![
            remove_state("S"),
            add_state("U", 0.1),
            add_equation("U", "0.5", "U_target - U"),
            add_equation("T", "0", "0"),
        ]);

        let first = merge(&base, &draft, &MergeOptions::preview());
        let second = merge(&base, &draft, &MergeOptions::preview());
        assert_eq!(snapshot, base);
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first.effective_model).unwrap(),
            serde_json::to_string(&second.effective_model).unwrap()
        );
    }

    #[test]
    fn test_duplicates_are_skipped() {
        let base = targeting_model().build();
        let mut with_id = add_state("U", 0.0);
        if let ChangeOperation::AddState { data, .. } = &mut with_id {
            data.id = Some("state.T".to_owned());
        }
        let result = preview(
            &base,
            vec![
                add_state("T", 1.0),
                with_id,
                add_parameter("kT", 1.0),
                add_relation("rel.S_to_T", None, "T"),
                add_equation("T", "0", "0"),
                ChangeOperation::AddScenario {
                    name: "a".to_owned(),
                    data: Default::default(),
                    reason: None,
                },
                ChangeOperation::AddScenario {
                    name: "a".to_owned(),
                    data: Default::default(),
                    reason: None,
                },
            ],
        );
        assert_eq!(
            vec![
                (0, ErrorCode::DuplicateSymbol),
                (1, ErrorCode::DuplicateId),
                (2, ErrorCode::DuplicateSymbol),
                (3, ErrorCode::DuplicateId),
                (4, ErrorCode::DuplicateSymbol),
                (6, ErrorCode::DuplicateSymbol),
            ],
            skip_codes(&result)
        );
        assert_eq!(1, result.applied_count);
        let model = result.effective_model.unwrap();
        assert_eq!(Some(&base.states[0]), model.get_state("T"));
    }

    #[test]
    fn test_missing_targets_are_skipped() {
        let base = targeting_model().build();
        let result = preview(
            &base,
            vec![
                remove_state("Z"),
                ChangeOperation::UpdateState {
                    symbol: "Z".to_owned(),
                    data: StatePatch::default(),
                    reason: None,
                },
                ChangeOperation::RemoveRelation {
                    id: "nope".to_owned(),
                    reason: None,
                },
                ChangeOperation::RemoveParameter {
                    name: "kZ".to_owned(),
                    reason: None,
                },
                ChangeOperation::RemoveEquation {
                    symbol: "Z".to_owned(),
                    reason: None,
                },
                ChangeOperation::RemoveScenario {
                    name: "nope".to_owned(),
                    reason: None,
                },
            ],
        );
        assert_eq!(0, result.applied_count);
        assert!(
            result
                .skipped
                .iter()
                .all(|skip| skip.code == ErrorCode::DoesNotExist)
        );
        assert_eq!(6, result.skipped.len());
        assert_eq!(Some(base), result.effective_model);
    }

    #[test]
    fn test_update_state() {
        let base = targeting_model().bounded_state("B", 0.5, 0.0, 1.0).build();
        let result = preview(
            &base,
            vec![ChangeOperation::UpdateState {
                symbol: "B".to_owned(),
                data: StatePatch {
                    initial: Some(2.0),
                    max: Some(5.0),
                    clear_min: true,
                    position: Some(Position { x: 10.0, y: 20.0 }),
                    ..Default::default()
                },
                reason: Some("wider range".to_owned()),
            }],
        );
        assert!(result.skipped.is_empty());
        let model = result.effective_model.unwrap();
        let b = model.get_state("B").unwrap();
        assert_eq!(2.0, b.initial);
        assert_eq!(None, b.min);
        assert_eq!(Some(5.0), b.max);
        assert_eq!(Some(Position { x: 10.0, y: 20.0 }), b.position);
    }

    #[test]
    fn test_failed_update_leaves_no_partial_edit() {
        let base = targeting_model().build();
        let result = preview(
            &base,
            vec![ChangeOperation::UpdateState {
                symbol: "S".to_owned(),
                data: StatePatch {
                    id: Some("state.T".to_owned()),
                    initial: Some(0.9),
                    ..Default::default()
                },
                reason: None,
            }],
        );
        assert_eq!(vec![(0, ErrorCode::DuplicateId)], skip_codes(&result));
        assert_eq!(Some(base), result.effective_model);
    }

    #[test]
    fn test_relations() {
        let base = targeting_model().build();
        let result = preview(
            &base,
            vec![
                add_relation("exo", None, "S"),
                ChangeOperation::UpdateRelation {
                    id: "rel.S_to_T".to_owned(),
                    data: RelationPatch {
                        coefficient: Some(Coefficient::Parameter("kT".to_owned())),
                        clear_source: true,
                        ..Default::default()
                    },
                    reason: None,
                },
                ChangeOperation::UpdateRelation {
                    id: "exo".to_owned(),
                    data: RelationPatch {
                        coefficient: Some(Coefficient::Parameter("kZ".to_owned())),
                        ..Default::default()
                    },
                    reason: None,
                },
                ChangeOperation::UpdateRelation {
                    id: "exo".to_owned(),
                    data: RelationPatch {
                        target: Some("Q".to_owned()),
                        ..Default::default()
                    },
                    reason: None,
                },
            ],
        );
        assert_eq!(
            vec![(2, ErrorCode::UnknownParameter), (3, ErrorCode::UnknownState)],
            skip_codes(&result)
        );
        let model = result.effective_model.unwrap();
        let rel = model.get_relation("rel.S_to_T").unwrap();
        assert_eq!(None, rel.source);
        assert_eq!(Some(Coefficient::Parameter("kT".to_owned())), rel.coefficient);
        assert_eq!("S", model.get_relation("exo").unwrap().target);
    }

    #[test]
    fn test_equations_are_validated() {
        let base = targeting_model().state("U", 0.0).build();
        let result = preview(
            &base,
            vec![
                add_equation("U", "__import__('os')", "U_target - U"),
                add_equation("U", "S", "kQ * (U_target - U)"),
                add_equation("Z", "0", "0"),
                add_equation("U", "max(S, T)", "p.kT * (U_target - U)"),
                ChangeOperation::UpdateEquation {
                    symbol: "T".to_owned(),
                    data: EquationPatch {
                        rate_expr: Some("T_target > T".to_owned()),
                        ..Default::default()
                    },
                    reason: None,
                },
            ],
        );
        assert_eq!(
            vec![
                (0, ErrorCode::UnrecognizedToken),
                (1, ErrorCode::UnknownIdent),
                (2, ErrorCode::UnknownState),
                (4, ErrorCode::OperatorNotAllowed),
            ],
            skip_codes(&result)
        );
        let details = result.skipped[1].details.clone().unwrap();
        assert!(details.starts_with("rate_expr: "), "{details}");
        assert!(details.contains("kQ"), "{details}");

        assert!(result.report.valid);
        let model = result.effective_model.unwrap();
        assert_eq!("max(S, T)", model.get_equation("U").unwrap().target_expr);
        assert_eq!(
            "kT*(T_target - T)",
            model.get_equation("T").unwrap().rate_expr
        );
    }

    #[test]
    fn test_target_expressions_cannot_read_targets() {
        let base = targeting_model().state("U", 0.0).build();
        let result = preview(
            &base,
            vec![
                add_equation("U", "T_target", "U_target - U"),
                ChangeOperation::UpdateEquation {
                    symbol: "S".to_owned(),
                    data: EquationPatch {
                        target_expr: Some("S_target".to_owned()),
                        ..Default::default()
                    },
                    reason: None,
                },
                add_equation("U", "T", "U_target - U + T_target"),
            ],
        );
        assert_eq!(
            vec![(0, ErrorCode::UnknownIdent), (1, ErrorCode::UnknownIdent)],
            skip_codes(&result)
        );
        let details = result.skipped[1].details.clone().unwrap();
        assert!(details.starts_with("target_expr: "), "{details}");
        assert!(details.contains("S_target"), "{details}");

        let model = result.effective_model.unwrap();
        assert_eq!("0.4", model.get_equation("S").unwrap().target_expr);
        assert_eq!("T", model.get_equation("U").unwrap().target_expr);
    }

    #[test]
    fn test_equations_see_earlier_changes() {
        let base = TestModel::new("empty").build();
        let result = preview(
            &base,
            vec![
                add_state("T", 0.3),
                add_parameter("kT", 0.7),
                add_equation("T", "0.5", "kT*(T_target - T)"),
            ],
        );
        assert_eq!(3, result.applied_count);
        assert!(result.report.valid);
        assert!(result.report.warnings.is_empty());
    }

    #[test]
    fn test_scenarios() {
        let base = targeting_model()
            .scenario("warm", &[("kT", 0.9)], &[("T", 0.5)])
            .build();
        let result = preview(
            &base,
            vec![
                ChangeOperation::UpdateScenario {
                    name: "warm".to_owned(),
                    data: ScenarioPatch {
                        initial_overrides: Some([("S".to_owned(), 0.2)].into_iter().collect()),
                        remove_parameter_overrides: vec!["kT".to_owned()],
                        ..Default::default()
                    },
                    reason: None,
                },
                ChangeOperation::UpdateScenario {
                    name: "warm".to_owned(),
                    data: ScenarioPatch {
                        parameter_overrides: Some([("kQ".to_owned(), 1.0)].into_iter().collect()),
                        ..Default::default()
                    },
                    reason: None,
                },
            ],
        );
        assert_eq!(vec![(1, ErrorCode::UnknownParameter)], skip_codes(&result));
        let model = result.effective_model.unwrap();
        let warm = model.get_scenario("warm").unwrap();
        assert!(warm.parameter_overrides.is_empty());
        assert_eq!(
            vec![("S".to_owned(), 0.2), ("T".to_owned(), 0.5)],
            warm.initial_overrides.clone().into_iter().collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_invalid_result_and_partial_apply() {
        let base = targeting_model().build();
        // removing kT leaves T's rate expression dangling
        let changes = vec![ChangeOperation::RemoveParameter {
            name: "kT".to_owned(),
            reason: None,
        }];

        let result = preview(&base, changes.clone());
        assert_eq!(1, result.applied_count);
        assert!(!result.report.valid);
        assert_eq!(None, result.effective_model);

        let options = MergeOptions {
            mode: MergeMode::Preview,
            partial_apply: true,
        };
        let result = merge(&base, &draft(changes), &options);
        assert!(!result.report.valid);
        assert!(result.effective_model.unwrap().get_parameter("kT").is_none());
    }

    #[test]
    fn test_should_commit() {
        let base = targeting_model().build();
        let ok = draft(vec![add_state("U", 0.0)]);
        assert!(!merge(&base, &ok, &MergeOptions::preview()).should_commit());
        assert!(merge(&base, &ok, &MergeOptions::commit()).should_commit());

        let bad = draft(vec![ChangeOperation::RemoveParameter {
            name: "kT".to_owned(),
            reason: None,
        }]);
        let options = MergeOptions {
            mode: MergeMode::Commit,
            partial_apply: true,
        };
        assert!(!merge(&base, &bad, &options).should_commit());
    }

    #[test]
    fn test_base_version_mismatch() {
        let base = targeting_model().version("v2").build();
        let result = preview(&base, vec![]);
        assert_eq!(
            vec![MergeWarning::BaseVersionMismatch {
                draft: Some("v1".to_owned()),
                base: Some("v2".to_owned()),
            }],
            result.warnings
        );
        assert!(result.report.valid);
    }

    #[test]
    fn test_unchecked_changes_are_skipped() {
        // drafts read straight from JSON never went through Draft::add_change
        let base = targeting_model().build();
        let result = preview(&base, vec![add_state("U", f64::NAN), remove_state(" ")]);
        assert_eq!(
            vec![(0, ErrorCode::NonFiniteValue), (1, ErrorCode::EmptyKey)],
            skip_codes(&result)
        );
    }

    #[test]
    fn test_options_wire_form() {
        let options: MergeOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(MergeOptions::preview(), options);
        let options: MergeOptions = serde_json::from_str(r#"{"mode": "commit"}"#).unwrap();
        assert_eq!(MergeOptions::commit(), options);
    }
}
