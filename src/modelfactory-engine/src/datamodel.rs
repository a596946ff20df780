// Copyright 2026 The Model Factory Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::collections::BTreeMap;

#[cfg(feature = "schema")]
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::common::Result;
use crate::model_err;

fn is_none<T>(val: &Option<T>) -> bool {
    val.is_none()
}

pub fn default_state_id(symbol: &str) -> String {
    format!("state.{symbol}")
}

pub fn default_parameter_id(name: &str) -> String {
    format!("param.{name}")
}

/// layout hint for the graph editor; never interpreted by the engine
#[derive(Clone, Copy, PartialEq, Debug, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
#[serde(from = "StateFields")]
pub struct State {
    pub symbol: String,
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "is_none")]
    pub category: Option<String>,
    pub initial: f64,
    #[serde(skip_serializing_if = "is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "is_none")]
    pub max: Option<f64>,
    #[serde(skip_serializing_if = "is_none")]
    pub position: Option<Position>,
}

// the id is optional on the wire and defaults to `state.<symbol>`
#[derive(Deserialize)]
struct StateFields {
    symbol: String,
    id: Option<String>,
    #[serde(default)]
    name: String,
    category: Option<String>,
    initial: f64,
    min: Option<f64>,
    max: Option<f64>,
    position: Option<Position>,
}

impl From<StateFields> for State {
    fn from(fields: StateFields) -> Self {
        State {
            id: fields.id.unwrap_or_else(|| default_state_id(&fields.symbol)),
            symbol: fields.symbol,
            name: fields.name,
            category: fields.category,
            initial: fields.initial,
            min: fields.min,
            max: fields.max,
            position: fields.position,
        }
    }
}

impl State {
    pub fn new(symbol: &str, name: &str, initial: f64) -> Self {
        State {
            symbol: symbol.to_owned(),
            id: default_state_id(symbol),
            name: name.to_owned(),
            category: None,
            initial,
            min: None,
            max: None,
            position: None,
        }
    }
}

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
#[serde(from = "ParameterFields")]
pub struct Parameter {
    pub name: String,
    pub id: String,
    pub value: f64,
    #[serde(skip_serializing_if = "is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "is_none")]
    pub max: Option<f64>,
    #[serde(skip_serializing_if = "is_none")]
    pub category: Option<String>,
}

#[derive(Deserialize)]
struct ParameterFields {
    name: String,
    id: Option<String>,
    value: f64,
    min: Option<f64>,
    max: Option<f64>,
    category: Option<String>,
}

impl From<ParameterFields> for Parameter {
    fn from(fields: ParameterFields) -> Self {
        Parameter {
            id: fields.id.unwrap_or_else(|| default_parameter_id(&fields.name)),
            name: fields.name,
            value: fields.value,
            min: fields.min,
            max: fields.max,
            category: fields.category,
        }
    }
}

impl Parameter {
    pub fn new(name: &str, value: f64) -> Self {
        Parameter {
            name: name.to_owned(),
            id: default_parameter_id(name),
            value,
            min: None,
            max: None,
            category: None,
        }
    }
}

/// A relation's weight: either a literal number or the name of a
/// parameter that supplies it.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
#[serde(untagged)]
pub enum Coefficient {
    Value(f64),
    Parameter(String),
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    Positive,
    Negative,
    #[default]
    Unknown,
}

/// A declared causal edge.  Relations are bookkeeping for the editor and
/// are never evaluated.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct Relation {
    pub id: String,
    // absent for exogenous, parameter-driven edges
    #[serde(default, skip_serializing_if = "is_none")]
    pub source: Option<String>,
    pub target: String,
    #[serde(default, skip_serializing_if = "is_none")]
    pub coefficient: Option<Coefficient>,
    #[serde(default)]
    pub polarity: Polarity,
    #[serde(default, skip_serializing_if = "is_none")]
    pub description: Option<String>,
}

#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct Equation {
    /// the symbol of the governed state
    pub state: String,
    pub target_expr: String,
    pub rate_expr: String,
    #[serde(default, skip_serializing_if = "is_none")]
    pub description: Option<String>,
}

#[derive(Clone, PartialEq, Debug, Default, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    #[serde(default, skip_serializing_if = "is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub parameter_overrides: BTreeMap<String, f64>,
    #[serde(default)]
    pub initial_overrides: BTreeMap<String, f64>,
}

#[derive(Clone, PartialEq, Debug, Default, Serialize, Deserialize)]
pub struct Model {
    #[serde(default)]
    pub name: String,
    /// the version reference drafts are forked from
    #[serde(default, skip_serializing_if = "is_none")]
    pub version: Option<String>,
    #[serde(default)]
    pub states: Vec<State>,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    #[serde(default)]
    pub relations: Vec<Relation>,
    #[serde(default)]
    pub equations: Vec<Equation>,
    #[serde(default)]
    pub scenarios: Vec<Scenario>,
}

impl Model {
    pub fn get_state(&self, symbol: &str) -> Option<&State> {
        self.states.iter().find(|s| s.symbol == symbol)
    }

    pub fn get_state_mut(&mut self, symbol: &str) -> Option<&mut State> {
        self.states.iter_mut().find(|s| s.symbol == symbol)
    }

    pub fn get_parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    pub fn get_parameter_mut(&mut self, name: &str) -> Option<&mut Parameter> {
        self.parameters.iter_mut().find(|p| p.name == name)
    }

    pub fn get_relation(&self, id: &str) -> Option<&Relation> {
        self.relations.iter().find(|r| r.id == id)
    }

    pub fn get_relation_mut(&mut self, id: &str) -> Option<&mut Relation> {
        self.relations.iter_mut().find(|r| r.id == id)
    }

    pub fn get_equation(&self, symbol: &str) -> Option<&Equation> {
        self.equations.iter().find(|e| e.state == symbol)
    }

    pub fn get_equation_mut(&mut self, symbol: &str) -> Option<&mut Equation> {
        self.equations.iter_mut().find(|e| e.state == symbol)
    }

    pub fn get_scenario(&self, name: &str) -> Option<&Scenario> {
        self.scenarios.iter().find(|s| s.name == name)
    }

    pub fn get_scenario_mut(&mut self, name: &str) -> Option<&mut Scenario> {
        self.scenarios.iter_mut().find(|s| s.name == name)
    }

    pub fn state_symbols(&self) -> impl Iterator<Item = &str> {
        self.states.iter().map(|s| s.symbol.as_str())
    }

    pub fn parameter_names(&self) -> impl Iterator<Item = &str> {
        self.parameters.iter().map(|p| p.name.as_str())
    }

    fn scenario_overrides(&self, scenario: Option<&str>) -> Result<Option<&Scenario>> {
        match scenario {
            None => Ok(None),
            Some(name) => match self.get_scenario(name) {
                Some(scenario) => Ok(Some(scenario)),
                None => model_err!(DoesNotExist, format!("scenario {name}")),
            },
        }
    }

    /// initial values of every state, with the named scenario's initial
    /// overrides applied.  Override keys that name no state are ignored
    /// here; the model validator reports them.
    pub fn initial_values(&self, scenario: Option<&str>) -> Result<BTreeMap<String, f64>> {
        let scenario = self.scenario_overrides(scenario)?;
        let values = self
            .states
            .iter()
            .map(|s| {
                let value = scenario
                    .and_then(|sc| sc.initial_overrides.get(&s.symbol))
                    .copied()
                    .unwrap_or(s.initial);
                (s.symbol.clone(), value)
            })
            .collect();
        Ok(values)
    }

    /// parameter values with the named scenario's overrides applied.
    pub fn parameter_values(&self, scenario: Option<&str>) -> Result<BTreeMap<String, f64>> {
        let scenario = self.scenario_overrides(scenario)?;
        let values = self
            .parameters
            .iter()
            .map(|p| {
                let value = scenario
                    .and_then(|sc| sc.parameter_overrides.get(&p.name))
                    .copied()
                    .unwrap_or(p.value);
                (p.name.clone(), value)
            })
            .collect();
        Ok(values)
    }
}
