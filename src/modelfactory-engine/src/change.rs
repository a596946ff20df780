// Copyright 2026 The Model Factory Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! The closed set of edits a draft can propose.
//!
//! On the wire a change is a JSON object tagged by `op`, carrying the key
//! of the entity it touches (`symbol`, `id` or `name`), an op-specific
//! `data` payload and an optional free-form `reason`:
//!
//! ```json
//! {"op": "add_state", "symbol": "T", "data": {"name": "Targeting", "initial": 0.3}}
//! ```
//!
//! Unknown ops and unknown fields are rejected when deserializing.

use std::collections::BTreeMap;
use std::fmt;

#[cfg(feature = "schema")]
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::change_err;
use crate::common::Result;
use crate::datamodel::{Coefficient, Polarity, Position};

fn is_none<T>(val: &Option<T>) -> bool {
    val.is_none()
}

fn is_false(val: &bool) -> bool {
    !*val
}

fn is_empty_vec<T>(val: &[T]) -> bool {
    val.is_empty()
}

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct StateData {
    #[serde(default, skip_serializing_if = "is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "is_none")]
    pub category: Option<String>,
    pub initial: f64,
    #[serde(default, skip_serializing_if = "is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "is_none")]
    pub position: Option<Position>,
}

/// Fields to overwrite on an existing state.  Absent fields are left
/// alone; the `clear_*` flags reset an optional field to unset.
#[derive(Clone, PartialEq, Debug, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct StatePatch {
    #[serde(default, skip_serializing_if = "is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "is_none")]
    pub initial: Option<f64>,
    #[serde(default, skip_serializing_if = "is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "is_none")]
    pub position: Option<Position>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub clear_min: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub clear_max: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub clear_position: bool,
}

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct RelationData {
    #[serde(default, skip_serializing_if = "is_none")]
    pub source: Option<String>,
    pub target: String,
    #[serde(default, skip_serializing_if = "is_none")]
    pub coefficient: Option<Coefficient>,
    #[serde(default, skip_serializing_if = "is_none")]
    pub polarity: Option<Polarity>,
    #[serde(default, skip_serializing_if = "is_none")]
    pub description: Option<String>,
}

#[derive(Clone, PartialEq, Debug, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct RelationPatch {
    #[serde(default, skip_serializing_if = "is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "is_none")]
    pub coefficient: Option<Coefficient>,
    #[serde(default, skip_serializing_if = "is_none")]
    pub polarity: Option<Polarity>,
    #[serde(default, skip_serializing_if = "is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub clear_source: bool,
}

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct ParameterData {
    #[serde(default, skip_serializing_if = "is_none")]
    pub id: Option<String>,
    pub value: f64,
    #[serde(default, skip_serializing_if = "is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "is_none")]
    pub category: Option<String>,
}

#[derive(Clone, PartialEq, Debug, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct ParameterPatch {
    #[serde(default, skip_serializing_if = "is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "is_none")]
    pub value: Option<f64>,
    #[serde(default, skip_serializing_if = "is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub clear_min: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub clear_max: bool,
}

#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct EquationData {
    pub target_expr: String,
    pub rate_expr: String,
    #[serde(default, skip_serializing_if = "is_none")]
    pub description: Option<String>,
}

#[derive(Clone, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct EquationPatch {
    #[serde(default, skip_serializing_if = "is_none")]
    pub target_expr: Option<String>,
    #[serde(default, skip_serializing_if = "is_none")]
    pub rate_expr: Option<String>,
    #[serde(default, skip_serializing_if = "is_none")]
    pub description: Option<String>,
}

#[derive(Clone, PartialEq, Debug, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct ScenarioData {
    #[serde(default, skip_serializing_if = "is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub parameter_overrides: BTreeMap<String, f64>,
    #[serde(default)]
    pub initial_overrides: BTreeMap<String, f64>,
}

/// Overrides given here are merged key by key into the scenario's
/// existing overrides; the `remove_*` lists drop keys afterwards.
#[derive(Clone, PartialEq, Debug, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct ScenarioPatch {
    #[serde(default, skip_serializing_if = "is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "is_none")]
    pub parameter_overrides: Option<BTreeMap<String, f64>>,
    #[serde(default, skip_serializing_if = "is_none")]
    pub initial_overrides: Option<BTreeMap<String, f64>>,
    #[serde(default, skip_serializing_if = "is_empty_vec")]
    pub remove_parameter_overrides: Vec<String>,
    #[serde(default, skip_serializing_if = "is_empty_vec")]
    pub remove_initial_overrides: Vec<String>,
}

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
#[serde(tag = "op", rename_all = "snake_case", deny_unknown_fields)]
pub enum ChangeOperation {
    AddState {
        symbol: String,
        data: StateData,
        #[serde(default, skip_serializing_if = "is_none")]
        reason: Option<String>,
    },
    UpdateState {
        symbol: String,
        data: StatePatch,
        #[serde(default, skip_serializing_if = "is_none")]
        reason: Option<String>,
    },
    RemoveState {
        symbol: String,
        #[serde(default, skip_serializing_if = "is_none")]
        reason: Option<String>,
    },
    AddRelation {
        id: String,
        data: RelationData,
        #[serde(default, skip_serializing_if = "is_none")]
        reason: Option<String>,
    },
    UpdateRelation {
        id: String,
        data: RelationPatch,
        #[serde(default, skip_serializing_if = "is_none")]
        reason: Option<String>,
    },
    RemoveRelation {
        id: String,
        #[serde(default, skip_serializing_if = "is_none")]
        reason: Option<String>,
    },
    AddParameter {
        name: String,
        data: ParameterData,
        #[serde(default, skip_serializing_if = "is_none")]
        reason: Option<String>,
    },
    UpdateParameter {
        name: String,
        data: ParameterPatch,
        #[serde(default, skip_serializing_if = "is_none")]
        reason: Option<String>,
    },
    RemoveParameter {
        name: String,
        #[serde(default, skip_serializing_if = "is_none")]
        reason: Option<String>,
    },
    AddEquation {
        symbol: String,
        data: EquationData,
        #[serde(default, skip_serializing_if = "is_none")]
        reason: Option<String>,
    },
    UpdateEquation {
        symbol: String,
        data: EquationPatch,
        #[serde(default, skip_serializing_if = "is_none")]
        reason: Option<String>,
    },
    RemoveEquation {
        symbol: String,
        #[serde(default, skip_serializing_if = "is_none")]
        reason: Option<String>,
    },
    AddScenario {
        name: String,
        #[serde(default)]
        data: ScenarioData,
        #[serde(default, skip_serializing_if = "is_none")]
        reason: Option<String>,
    },
    UpdateScenario {
        name: String,
        data: ScenarioPatch,
        #[serde(default, skip_serializing_if = "is_none")]
        reason: Option<String>,
    },
    RemoveScenario {
        name: String,
        #[serde(default, skip_serializing_if = "is_none")]
        reason: Option<String>,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    AddState,
    UpdateState,
    RemoveState,
    AddRelation,
    UpdateRelation,
    RemoveRelation,
    AddParameter,
    UpdateParameter,
    RemoveParameter,
    AddEquation,
    UpdateEquation,
    RemoveEquation,
    AddScenario,
    UpdateScenario,
    RemoveScenario,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use ChangeKind::*;
        let name = match self {
            AddState => "add_state",
            UpdateState => "update_state",
            RemoveState => "remove_state",
            AddRelation => "add_relation",
            UpdateRelation => "update_relation",
            RemoveRelation => "remove_relation",
            AddParameter => "add_parameter",
            UpdateParameter => "update_parameter",
            RemoveParameter => "remove_parameter",
            AddEquation => "add_equation",
            UpdateEquation => "update_equation",
            RemoveEquation => "remove_equation",
            AddScenario => "add_scenario",
            UpdateScenario => "update_scenario",
            RemoveScenario => "remove_scenario",
        };

        write!(f, "{name}")
    }
}

fn check_key(what: &str, key: &str) -> Result<()> {
    if key.trim().is_empty() {
        return change_err!(EmptyKey, format!("{what} is empty"));
    }
    Ok(())
}

fn check_finite(what: &str, value: f64) -> Result<()> {
    if !value.is_finite() {
        return change_err!(NonFiniteValue, format!("{what} is {value}"));
    }
    Ok(())
}

fn check_finite_opt(what: &str, value: Option<f64>) -> Result<()> {
    match value {
        Some(value) => check_finite(what, value),
        None => Ok(()),
    }
}

fn check_position(position: Option<&Position>) -> Result<()> {
    if let Some(position) = position {
        check_finite("position.x", position.x)?;
        check_finite("position.y", position.y)?;
    }
    Ok(())
}

fn check_coefficient(coefficient: Option<&Coefficient>) -> Result<()> {
    match coefficient {
        Some(Coefficient::Value(value)) => check_finite("coefficient", *value),
        Some(Coefficient::Parameter(name)) => check_key("coefficient", name),
        None => Ok(()),
    }
}

fn check_overrides(what: &str, overrides: &BTreeMap<String, f64>) -> Result<()> {
    for (key, value) in overrides.iter() {
        check_key(what, key)?;
        check_finite(&format!("{what}.{key}"), *value)?;
    }
    Ok(())
}

impl ChangeOperation {
    pub fn kind(&self) -> ChangeKind {
        use ChangeOperation::*;
        match self {
            AddState { .. } => ChangeKind::AddState,
            UpdateState { .. } => ChangeKind::UpdateState,
            RemoveState { .. } => ChangeKind::RemoveState,
            AddRelation { .. } => ChangeKind::AddRelation,
            UpdateRelation { .. } => ChangeKind::UpdateRelation,
            RemoveRelation { .. } => ChangeKind::RemoveRelation,
            AddParameter { .. } => ChangeKind::AddParameter,
            UpdateParameter { .. } => ChangeKind::UpdateParameter,
            RemoveParameter { .. } => ChangeKind::RemoveParameter,
            AddEquation { .. } => ChangeKind::AddEquation,
            UpdateEquation { .. } => ChangeKind::UpdateEquation,
            RemoveEquation { .. } => ChangeKind::RemoveEquation,
            AddScenario { .. } => ChangeKind::AddScenario,
            UpdateScenario { .. } => ChangeKind::UpdateScenario,
            RemoveScenario { .. } => ChangeKind::RemoveScenario,
        }
    }

    /// the key of the entity this change touches
    pub fn target(&self) -> &str {
        use ChangeOperation::*;
        match self {
            AddState { symbol, .. }
            | UpdateState { symbol, .. }
            | RemoveState { symbol, .. }
            | AddEquation { symbol, .. }
            | UpdateEquation { symbol, .. }
            | RemoveEquation { symbol, .. } => symbol,
            AddRelation { id, .. } | UpdateRelation { id, .. } | RemoveRelation { id, .. } => id,
            AddParameter { name, .. }
            | UpdateParameter { name, .. }
            | RemoveParameter { name, .. }
            | AddScenario { name, .. }
            | UpdateScenario { name, .. }
            | RemoveScenario { name, .. } => name,
        }
    }

    pub fn reason(&self) -> Option<&str> {
        use ChangeOperation::*;
        let reason = match self {
            AddState { reason, .. }
            | UpdateState { reason, .. }
            | RemoveState { reason, .. }
            | AddRelation { reason, .. }
            | UpdateRelation { reason, .. }
            | RemoveRelation { reason, .. }
            | AddParameter { reason, .. }
            | UpdateParameter { reason, .. }
            | RemoveParameter { reason, .. }
            | AddEquation { reason, .. }
            | UpdateEquation { reason, .. }
            | RemoveEquation { reason, .. }
            | AddScenario { reason, .. }
            | UpdateScenario { reason, .. }
            | RemoveScenario { reason, .. } => reason,
        };
        reason.as_deref()
    }

    /// check rejects payloads that are malformed regardless of the model
    /// they are applied to: empty keys and non-finite numbers.  Whether
    /// the keys resolve is the merge engine's concern.
    pub fn check(&self) -> Result<()> {
        use ChangeOperation::*;
        check_key("key", self.target())?;
        match self {
            AddState { data, .. } => {
                if let Some(id) = &data.id {
                    check_key("id", id)?;
                }
                check_finite("initial", data.initial)?;
                check_finite_opt("min", data.min)?;
                check_finite_opt("max", data.max)?;
                check_position(data.position.as_ref())?;
            }
            UpdateState { data, .. } => {
                if let Some(id) = &data.id {
                    check_key("id", id)?;
                }
                check_finite_opt("initial", data.initial)?;
                check_finite_opt("min", data.min)?;
                check_finite_opt("max", data.max)?;
                check_position(data.position.as_ref())?;
            }
            AddRelation { data, .. } => {
                if let Some(source) = &data.source {
                    check_key("source", source)?;
                }
                check_key("target", &data.target)?;
                check_coefficient(data.coefficient.as_ref())?;
            }
            UpdateRelation { data, .. } => {
                if let Some(source) = &data.source {
                    check_key("source", source)?;
                }
                if let Some(target) = &data.target {
                    check_key("target", target)?;
                }
                check_coefficient(data.coefficient.as_ref())?;
            }
            AddParameter { data, .. } => {
                if let Some(id) = &data.id {
                    check_key("id", id)?;
                }
                check_finite("value", data.value)?;
                check_finite_opt("min", data.min)?;
                check_finite_opt("max", data.max)?;
            }
            UpdateParameter { data, .. } => {
                if let Some(id) = &data.id {
                    check_key("id", id)?;
                }
                check_finite_opt("value", data.value)?;
                check_finite_opt("min", data.min)?;
                check_finite_opt("max", data.max)?;
            }
            AddScenario { data, .. } => {
                check_overrides("parameter_overrides", &data.parameter_overrides)?;
                check_overrides("initial_overrides", &data.initial_overrides)?;
            }
            UpdateScenario { data, .. } => {
                if let Some(overrides) = &data.parameter_overrides {
                    check_overrides("parameter_overrides", overrides)?;
                }
                if let Some(overrides) = &data.initial_overrides {
                    check_overrides("initial_overrides", overrides)?;
                }
            }
            RemoveState { .. }
            | RemoveRelation { .. }
            | RemoveParameter { .. }
            | AddEquation { .. }
            | UpdateEquation { .. }
            | RemoveEquation { .. }
            | RemoveScenario { .. } => {}
        }
        Ok(())
    }
}

/// The JSON Schema of a single change operation.
#[cfg(feature = "schema")]
pub fn generate_schema() -> schemars::Schema {
    schemars::schema_for!(ChangeOperation)
}

#[cfg(feature = "schema")]
pub fn generate_schema_json() -> String {
    let schema = generate_schema();
    serde_json::to_string_pretty(&schema).expect("schema serialization should never fail")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{ErrorCode, ErrorKind};

    fn parse(json: &str) -> ChangeOperation {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_wire_form() {
        let op = parse(
            r#"{"op": "add_state", "symbol": "T", "data": {"name": "Targeting", "initial": 0.3}, "reason": "new driver"}"#,
        );
        assert_eq!(ChangeKind::AddState, op.kind());
        assert_eq!("T", op.target());
        assert_eq!(Some("new driver"), op.reason());
        match op {
            ChangeOperation::AddState { data, .. } => {
                assert_eq!("Targeting", data.name);
                assert_eq!(0.3, data.initial);
                assert_eq!(None, data.id);
            }
            _ => panic!("expected add_state"),
        }

        let op = parse(r#"{"op": "remove_relation", "id": "rel.S_to_T"}"#);
        assert_eq!(ChangeKind::RemoveRelation, op.kind());
        assert_eq!("rel.S_to_T", op.target());
        assert_eq!(None, op.reason());

        let op = parse(
            r#"{"op": "add_relation", "id": "r1", "data": {"source": "S", "target": "T", "coefficient": "kT", "polarity": "positive"}}"#,
        );
        match op {
            ChangeOperation::AddRelation { data, .. } => {
                assert_eq!(Some(Coefficient::Parameter("kT".to_owned())), data.coefficient);
                assert_eq!(Some(Polarity::Positive), data.polarity);
            }
            _ => panic!("expected add_relation"),
        }

        // scenario data is optional
        let op = parse(r#"{"op": "add_scenario", "name": "high"}"#);
        assert_eq!(ChangeKind::AddScenario, op.kind());
    }

    #[test]
    fn test_update_flags() {
        let op = parse(r#"{"op": "update_state", "symbol": "T", "data": {"initial": 0.5, "clear_max": true}}"#);
        match op {
            ChangeOperation::UpdateState { data, .. } => {
                assert_eq!(Some(0.5), data.initial);
                assert!(data.clear_max);
                assert!(!data.clear_min);
                assert_eq!(None, data.name);
            }
            _ => panic!("expected update_state"),
        }
    }

    #[test]
    fn test_rejects_unknown() {
        let bad = [
            r#"{"op": "drop_table", "symbol": "T"}"#,
            r#"{"op": "remove_state", "symbol": "T", "cascade": false}"#,
            r#"{"op": "add_state", "symbol": "T", "data": {"initial": 0.3, "code": "x"}}"#,
            r#"{"op": "update_equation", "symbol": "T", "data": {"expr": "1"}}"#,
            r#"{"op": "remove_state"}"#,
            r#"{"symbol": "T"}"#,
        ];
        for json in bad {
            assert!(
                serde_json::from_str::<ChangeOperation>(json).is_err(),
                "accepted {json}"
            );
        }
    }

    #[test]
    fn test_serialization_is_stable() {
        let op = ChangeOperation::UpdateEquation {
            symbol: "T".to_owned(),
            data: EquationPatch {
                rate_expr: Some("kT*(T_target - T)".to_owned()),
                ..Default::default()
            },
            reason: None,
        };
        let json = serde_json::to_string(&op).unwrap();
        assert_eq!(
            r#"{"op":"update_equation","symbol":"T","data":{"rate_expr":"kT*(T_target - T)"}}"#,
            json
        );
        assert_eq!(op, parse(&json));
    }

    #[test]
    fn test_kind_display_matches_tag() {
        let op = parse(r#"{"op": "update_scenario", "name": "base", "data": {}}"#);
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json["op"], op.kind().to_string());
        assert_eq!(
            serde_json::to_value(op.kind()).unwrap(),
            serde_json::Value::String("update_scenario".to_owned())
        );
    }

    #[test]
    fn test_check() {
        let ok = parse(r#"{"op": "add_parameter", "name": "kT", "data": {"value": 0.7, "min": 0, "max": 1}}"#);
        assert_eq!(Ok(()), ok.check());

        let empty = parse(r#"{"op": "remove_state", "symbol": "  "}"#);
        let err = empty.check().unwrap_err();
        assert_eq!(ErrorKind::Change, err.kind);
        assert_eq!(ErrorCode::EmptyKey, err.code);

        let empty_target = parse(r#"{"op": "add_relation", "id": "r", "data": {"target": ""}}"#);
        assert_eq!(ErrorCode::EmptyKey, empty_target.check().unwrap_err().code);

        let nan = ChangeOperation::AddState {
            symbol: "T".to_owned(),
            data: StateData {
                id: None,
                name: "T".to_owned(),
                category: None,
                initial: f64::NAN,
                min: None,
                max: None,
                position: None,
            },
            reason: None,
        };
        assert_eq!(ErrorCode::NonFiniteValue, nan.check().unwrap_err().code);

        let inf_override = ChangeOperation::UpdateScenario {
            name: "high".to_owned(),
            data: ScenarioPatch {
                parameter_overrides: Some([("kT".to_owned(), f64::INFINITY)].into_iter().collect()),
                ..Default::default()
            },
            reason: None,
        };
        assert_eq!(
            ErrorCode::NonFiniteValue,
            inf_override.check().unwrap_err().code
        );

        let inf_coefficient = ChangeOperation::UpdateRelation {
            id: "r".to_owned(),
            data: RelationPatch {
                coefficient: Some(Coefficient::Value(f64::NEG_INFINITY)),
                ..Default::default()
            },
            reason: None,
        };
        assert_eq!(
            ErrorCode::NonFiniteValue,
            inf_coefficient.check().unwrap_err().code
        );
    }
}
