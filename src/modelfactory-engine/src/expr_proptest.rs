// Copyright 2026 The Model Factory Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Property-based tests for the expression language and the merge engine.
//!
//! These tests verify that:
//! 1. Text containing a disallowed construct never validates
//! 2. Extracted dependencies are exactly the state and parameter tokens
//! 3. Evaluation is deterministic and never returns NaN or infinity
//! 4. Printing a parsed expression and parsing it again gives the same tree
//! 5. Merging is repeatable and never mutates the base model

use std::collections::{BTreeMap, BTreeSet};

use proptest::prelude::*;

use crate::ast::print_eqn;
use crate::change::ChangeOperation;
use crate::draft::Draft;
use crate::eval::Bindings;
use crate::merge::{MergeOptions, merge};
use crate::parser::parse;
use crate::test_common::ops::*;
use crate::test_common::targeting_model;
use crate::validate::{Scope, validate_expression};

const STATES: &[&str] = &["T", "S", "U"];
const PARAMS: &[&str] = &["kT", "kS"];

fn scope() -> Scope {
    Scope::new(STATES.iter().copied(), PARAMS.iter().copied())
}

/// A generated expression along with the state and parameter tokens it
/// contains.
#[derive(Clone, Debug)]
struct GenExpr {
    text: String,
    stocks: BTreeSet<String>,
    params: BTreeSet<String>,
}

impl GenExpr {
    fn lit(text: String) -> Self {
        GenExpr {
            text,
            stocks: BTreeSet::new(),
            params: BTreeSet::new(),
        }
    }

    fn state(symbol: &str) -> Self {
        let mut expr = GenExpr::lit(symbol.to_string());
        expr.stocks.insert(symbol.to_string());
        expr
    }

    fn param(name: &str, namespaced: bool) -> Self {
        let text = if namespaced {
            format!("p.{name}")
        } else {
            name.to_string()
        };
        let mut expr = GenExpr::lit(text);
        expr.params.insert(name.to_string());
        expr
    }

    fn wrap(self, open: &str, close: &str) -> Self {
        GenExpr {
            text: format!("{open}{}{close}", self.text),
            ..self
        }
    }

    fn binary(self, op: &str, rhs: GenExpr) -> Self {
        let mut out = self.wrap("(", ")");
        out.text = format!("{} {op} ({})", out.text, rhs.text);
        out.stocks.extend(rhs.stocks);
        out.params.extend(rhs.params);
        out
    }

    fn call(name: &str, args: Vec<GenExpr>) -> Self {
        let mut out = GenExpr::lit(String::new());
        let texts: Vec<_> = args.iter().map(|a| a.text.clone()).collect();
        out.text = format!("{name}({})", texts.join(", "));
        for arg in args {
            out.stocks.extend(arg.stocks);
            out.params.extend(arg.params);
        }
        out
    }
}

fn leaf_strategy() -> impl Strategy<Value = GenExpr> {
    prop_oneof![
        (0u32..1000).prop_map(|n| GenExpr::lit(n.to_string())),
        (0u32..100).prop_map(|n| GenExpr::lit(format!("{n}.25"))),
        (1u32..9).prop_map(|n| GenExpr::lit(format!("{n}e-2"))),
        prop::sample::select(STATES).prop_map(GenExpr::state),
        prop::sample::select(PARAMS).prop_map(|p| GenExpr::param(p, false)),
        prop::sample::select(PARAMS).prop_map(|p| GenExpr::param(p, true)),
        prop::sample::select(STATES).prop_map(|s| GenExpr::lit(format!("{s}_target"))),
    ]
}

fn expr_strategy() -> impl Strategy<Value = GenExpr> {
    leaf_strategy().prop_recursive(4, 32, 3, |inner| {
        prop_oneof![
            (
                inner.clone(),
                prop::sample::select(&["+", "-", "*", "/", "**"][..]),
                inner.clone()
            )
                .prop_map(|(l, op, r)| l.binary(op, r)),
            inner.clone().prop_map(|e| e.wrap("-(", ")")),
            inner.clone().prop_map(|e| e.wrap("+(", ")")),
            (inner.clone(), inner.clone(), inner.clone())
                .prop_map(|(x, lo, hi)| GenExpr::call("clamp", vec![x, lo, hi])),
            prop::collection::vec(inner.clone(), 2..4).prop_map(|args| GenExpr::call("max", args)),
            prop::collection::vec(inner.clone(), 2..4).prop_map(|args| GenExpr::call("min", args)),
            prop::collection::vec(inner.clone(), 1..3)
                .prop_map(|args| GenExpr::call("sigmoid", args)),
            prop::collection::vec(inner.clone(), 1..3).prop_map(|args| GenExpr::call("step", args)),
            prop::collection::vec(inner.clone(), 1..4)
                .prop_map(|args| GenExpr::call("smoothstep", args)),
            prop::sample::select(&["abs", "exp", "log"][..])
                .prop_flat_map(move |name| inner.clone().prop_map(move |x| GenExpr::call(name, vec![x]))),
        ]
    })
}

fn disallowed_strategy() -> impl Strategy<Value = &'static str> {
    prop::sample::select(
        &[
            "__import__('os')",
            "os.system('ls')",
            "T.__class__",
            "p.kT.real",
            "S[0]",
            "T > S",
            "T == S",
            "T != S",
            "T <= 1",
            "T and S",
            "not T",
            "T or S",
            "T % 2",
            "T ^ 2",
            "T & S",
            "~T",
            "lambda: 1",
            "eval(T)",
            "exec(T)",
            "open(T)",
            "sqrt(T)",
            "clamp(T, 0)",
            "abs(T, S)",
            "max(T)",
            "unknown_var",
            "p.unknown",
            "Z_target",
            "'text'",
            "{T: 1}",
            "T if S else 0",
            "T; S",
            "T = 1",
            "@T",
        ][..],
    )
}

fn value_strategy() -> impl Strategy<Value = f64> {
    prop_oneof![
        Just(0.0),
        Just(1.0),
        (-100i32..100).prop_map(|x| x as f64 / 10.0),
    ]
}

fn values_for(names: &[&str], values: Vec<f64>) -> BTreeMap<String, f64> {
    names
        .iter()
        .zip(values)
        .map(|(name, value)| (name.to_string(), value))
        .collect()
}

fn change_strategy() -> impl Strategy<Value = ChangeOperation> {
    let symbol = prop::sample::select(&["T", "S", "U", "V"][..]);
    let param = prop::sample::select(&["kT", "kS"][..]);
    let relation = prop::sample::select(&["rel.S_to_T", "r1", "r2"][..]);
    prop_oneof![
        (symbol.clone(), -5i32..5).prop_map(|(s, v)| add_state(s, v as f64)),
        symbol.clone().prop_map(remove_state),
        (param.clone(), 0i32..10).prop_map(|(p, v)| add_parameter(p, v as f64 / 10.0)),
        param.clone().prop_map(remove_parameter),
        (relation.clone(), symbol.clone(), symbol.clone())
            .prop_map(|(id, s, t)| add_relation(id, Some(s), t)),
        relation.prop_map(|id| ChangeOperation::RemoveRelation {
            id: id.to_string(),
            reason: None,
        }),
        (symbol.clone(), symbol.clone(), param)
            .prop_map(|(s, other, k)| add_equation(s, other, &format!("{k}*({s}_target - {s})"))),
        symbol.prop_map(|s| ChangeOperation::RemoveEquation {
            symbol: s.to_string(),
            reason: None,
        }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn disallowed_constructs_never_validate(
        valid in expr_strategy(),
        bad in disallowed_strategy(),
        before in any::<bool>(),
    ) {
        let text = if before {
            format!("{bad} + ({})", valid.text)
        } else {
            format!("({}) * {bad}", valid.text)
        };
        prop_assert!(validate_expression(&text, &scope()).is_err(), "accepted {}", text);
    }

    #[test]
    fn dependencies_are_exact(expr in expr_strategy()) {
        let validated = validate_expression(&expr.text, &scope());
        prop_assert!(validated.is_ok(), "rejected {}: {:?}", expr.text, validated.err());
        let deps = validated.unwrap().dependencies;
        prop_assert_eq!(expr.stocks, deps.stocks);
        prop_assert_eq!(expr.params, deps.parameters);
    }

    #[test]
    fn evaluation_is_deterministic_and_finite(
        expr in expr_strategy(),
        states in prop::collection::vec(value_strategy(), 3),
        params in prop::collection::vec(value_strategy(), 2),
        targets in prop::collection::vec(value_strategy(), 3),
    ) {
        let validated = validate_expression(&expr.text, &scope()).unwrap();
        let states = values_for(STATES, states);
        let params = values_for(PARAMS, params);
        let targets = values_for(STATES, targets);
        let bindings = Bindings::new(&states, &params).with_targets(&targets);

        let first = validated.evaluate(&bindings);
        let second = validated.evaluate(&bindings);
        if let Ok(value) = first {
            prop_assert!(value.is_finite());
        }
        prop_assert_eq!(first, second);
    }

    #[test]
    fn printed_expressions_reparse_identically(expr in expr_strategy()) {
        let ast = parse(&expr.text).unwrap().unwrap();
        let printed = print_eqn(&ast);
        let reparsed = parse(&printed).unwrap().unwrap();
        prop_assert_eq!(ast.strip_loc(), reparsed.strip_loc());
    }

    #[test]
    fn merge_is_repeatable_and_leaves_base_alone(
        changes in prop::collection::vec(change_strategy(), 0..12),
        partial_apply in any::<bool>(),
    ) {
        let base = targeting_model().build();
        let snapshot = base.clone();
        let mut draft = Draft::new(Some("v1"));
        draft.changes = changes;
        let options = MergeOptions {
            partial_apply,
            ..Default::default()
        };

        let first = merge(&base, &draft, &options);
        let second = merge(&base, &draft, &options);
        prop_assert_eq!(&snapshot, &base);
        prop_assert_eq!(first.applied_count + first.skipped.len(), draft.changes.len());
        prop_assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
        prop_assert_eq!(first, second);
    }
}
