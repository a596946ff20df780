// Copyright 2026 The Model Factory Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::collections::BTreeMap;

use crate::ast::{BinaryOp, Expr1, UnaryOp};
use crate::builtins::{BuiltinFn, Loc};
use crate::common::ErrorCode;
use crate::validate::ValidatedExpression;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum EvaluationError {
    #[error("unbound symbol `{name}` at {loc}")]
    UnboundSymbol { name: String, loc: Loc },
    /// an operation left its mathematical domain or produced a value
    /// that isn't finite
    #[error("domain error in `{op}` at {loc}")]
    DomainError { op: String, loc: Loc },
}

impl EvaluationError {
    pub fn code(&self) -> ErrorCode {
        match self {
            EvaluationError::UnboundSymbol { .. } => ErrorCode::UnboundSymbol,
            EvaluationError::DomainError { .. } => ErrorCode::DomainError,
        }
    }

    pub fn loc(&self) -> Loc {
        match self {
            EvaluationError::UnboundSymbol { loc, .. } => *loc,
            EvaluationError::DomainError { loc, .. } => *loc,
        }
    }
}

pub type EvalResult<T> = Result<T, EvaluationError>;

/// The values an expression is evaluated against.  Targets are keyed by
/// the state symbol, so `T_target` reads `targets["T"]`.
#[derive(Clone, Copy, Debug)]
pub struct Bindings<'a> {
    states: &'a BTreeMap<String, f64>,
    parameters: &'a BTreeMap<String, f64>,
    targets: Option<&'a BTreeMap<String, f64>>,
}

impl<'a> Bindings<'a> {
    pub fn new(states: &'a BTreeMap<String, f64>, parameters: &'a BTreeMap<String, f64>) -> Self {
        Bindings {
            states,
            parameters,
            targets: None,
        }
    }

    pub fn with_targets(mut self, targets: &'a BTreeMap<String, f64>) -> Self {
        self.targets = Some(targets);
        self
    }
}

fn domain_error<T>(op: &str, loc: Loc) -> EvalResult<T> {
    Err(EvaluationError::DomainError {
        op: op.to_owned(),
        loc,
    })
}

fn finite(op: &str, loc: Loc, value: f64) -> EvalResult<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        domain_error(op, loc)
    }
}

fn clamp(x: f64, lo: f64, hi: f64) -> f64 {
    // min(max(x, lo), hi): if lo > hi the upper bound wins
    x.max(lo).min(hi)
}

/// logistic function in a form that can't overflow for large |k*x|
fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

fn smoothstep(x: f64, edge0: f64, edge1: f64) -> f64 {
    let t = clamp((x - edge0) / (edge1 - edge0), 0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

struct Evaluator<'a> {
    bindings: &'a Bindings<'a>,
}

impl Evaluator<'_> {
    fn lookup(
        &self,
        values: Option<&BTreeMap<String, f64>>,
        key: &str,
        display: impl FnOnce() -> String,
        loc: Loc,
    ) -> EvalResult<f64> {
        match values.and_then(|values| values.get(key)) {
            Some(value) => finite(key, loc, *value),
            None => Err(EvaluationError::UnboundSymbol {
                name: display(),
                loc,
            }),
        }
    }

    fn eval_opt(&self, expr: &Option<Box<Expr1>>, default: f64) -> EvalResult<f64> {
        match expr {
            Some(expr) => self.eval(expr),
            None => Ok(default),
        }
    }

    fn eval(&self, expr: &Expr1) -> EvalResult<f64> {
        let value = match expr {
            Expr1::Const(n, _) => *n,
            Expr1::State(symbol, loc) => {
                self.lookup(Some(self.bindings.states), symbol, || symbol.clone(), *loc)?
            }
            Expr1::Param(name, loc) => {
                self.lookup(Some(self.bindings.parameters), name, || name.clone(), *loc)?
            }
            Expr1::Target(symbol, loc) => self.lookup(
                self.bindings.targets,
                symbol,
                || format!("{symbol}_target"),
                *loc,
            )?,
            Expr1::Op1(op, l, _) => {
                let l = self.eval(l)?;
                match op {
                    UnaryOp::Positive => l,
                    UnaryOp::Negative => -l,
                }
            }
            Expr1::Op2(op, l, r, loc) => {
                let l = self.eval(l)?;
                let r = self.eval(r)?;
                let result = match op {
                    BinaryOp::Add => l + r,
                    BinaryOp::Sub => l - r,
                    BinaryOp::Exp => l.powf(r),
                    BinaryOp::Mul => l * r,
                    BinaryOp::Div => {
                        if r == 0.0 {
                            return domain_error(op.symbol(), *loc);
                        }
                        l / r
                    }
                };
                finite(op.symbol(), *loc, result)?
            }
            Expr1::App(builtin, loc) => {
                let result = match builtin {
                    BuiltinFn::Abs(a) => self.eval(a)?.abs(),
                    BuiltinFn::Exp(a) => self.eval(a)?.exp(),
                    BuiltinFn::Log(a) => {
                        let a = self.eval(a)?;
                        if a <= 0.0 {
                            return domain_error(builtin.name(), *loc);
                        }
                        a.ln()
                    }
                    BuiltinFn::Clamp(x, lo, hi) => {
                        clamp(self.eval(x)?, self.eval(lo)?, self.eval(hi)?)
                    }
                    BuiltinFn::Max(args) => {
                        let mut result = f64::NEG_INFINITY;
                        for arg in args.iter() {
                            result = result.max(self.eval(arg)?);
                        }
                        result
                    }
                    BuiltinFn::Min(args) => {
                        let mut result = f64::INFINITY;
                        for arg in args.iter() {
                            result = result.min(self.eval(arg)?);
                        }
                        result
                    }
                    BuiltinFn::Sigmoid(x, k) => {
                        let x = self.eval(x)?;
                        let k = self.eval_opt(k, 1.0)?;
                        sigmoid(k * x)
                    }
                    BuiltinFn::Step(x, threshold) => {
                        let x = self.eval(x)?;
                        let threshold = self.eval_opt(threshold, 0.0)?;
                        if x >= threshold { 1.0 } else { 0.0 }
                    }
                    BuiltinFn::SmoothStep(x, edge0, edge1) => {
                        let x = self.eval(x)?;
                        let edge0 = self.eval_opt(edge0, 0.0)?;
                        let edge1 = self.eval_opt(edge1, 1.0)?;
                        if edge0 == edge1 {
                            return domain_error(builtin.name(), *loc);
                        }
                        smoothstep(x, edge0, edge1)
                    }
                };
                finite(builtin.name(), *loc, result)?
            }
        };

        Ok(value)
    }
}

/// evaluate reduces a resolved expression to a number.  The result is
/// always finite: anything that would produce NaN or an infinity is a
/// DomainError instead.
pub fn evaluate(expr: &Expr1, bindings: &Bindings) -> EvalResult<f64> {
    let evaluator = Evaluator { bindings };
    evaluator.eval(expr)
}

impl ValidatedExpression {
    pub fn evaluate(&self, bindings: &Bindings) -> EvalResult<f64> {
        evaluate(&self.ast, bindings)
    }
}
