// Copyright 2026 The Model Factory Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use super::expr0::Expr0;
use super::{BinaryOp, UnaryOp};
use crate::builtins::{BuiltinFn, Loc, UntypedBuiltinFn, walk_builtin_expr};
use crate::common::EquationResult;
use crate::eqn_err;
use crate::validate::{Binding, Scope};

/// Expr1 represents a parsed expression after calls to builtin functions
/// have been checked and every name has been resolved against a scope.
#[derive(PartialEq, Clone, Debug)]
pub enum Expr1 {
    Const(f64, Loc),
    State(String, Loc),
    Param(String, Loc),
    // `<S>_target`, holding the symbol S
    Target(String, Loc),
    App(BuiltinFn<Expr1>, Loc),
    Op1(UnaryOp, Box<Expr1>, Loc),
    Op2(BinaryOp, Box<Expr1>, Box<Expr1>, Loc),
}

impl Expr1 {
    pub(crate) fn from(expr: Expr0, scope: &Scope) -> EquationResult<Self> {
        let expr = match expr {
            Expr0::Const(_, n, loc) => Expr1::Const(n, loc),
            Expr0::Var(id, loc) => match scope.resolve(&id) {
                Some(Binding::State) => Expr1::State(id, loc),
                Some(Binding::Parameter) => Expr1::Param(id, loc),
                Some(Binding::Target(symbol)) => Expr1::Target(symbol, loc),
                None => return eqn_err!(UnknownIdent, loc.start, loc.end),
            },
            Expr0::ParamRef(id, loc) => {
                if !scope.has_parameter(&id) {
                    return eqn_err!(UnknownParameter, loc.start, loc.end);
                }
                Expr1::Param(id, loc)
            }
            Expr0::App(UntypedBuiltinFn(id, orig_args), loc) => {
                if !crate::builtins::is_builtin_fn(&id) {
                    // point at the name rather than the whole call
                    let end = loc.start + id.len() as u16;
                    return eqn_err!(UnknownBuiltin, loc.start, end);
                }

                let args: EquationResult<Vec<Expr1>> = orig_args
                    .into_iter()
                    .map(|arg| Expr1::from(arg, scope))
                    .collect();
                let mut args = args?;

                macro_rules! check_arity {
                    ($builtin_fn:tt, 1) => {{
                        if args.len() != 1 {
                            return eqn_err!(BadBuiltinArgs, loc.start, loc.end);
                        }

                        let a = args.remove(0);
                        BuiltinFn::$builtin_fn(Box::new(a))
                    }};
                    ($builtin_fn:tt, 3) => {{
                        if args.len() != 3 {
                            return eqn_err!(BadBuiltinArgs, loc.start, loc.end);
                        }

                        let c = args.remove(2);
                        let b = args.remove(1);
                        let a = args.remove(0);
                        BuiltinFn::$builtin_fn(Box::new(a), Box::new(b), Box::new(c))
                    }};
                    ($builtin_fn:tt, 1, 2) => {{
                        if args.len() == 1 {
                            let a = args.remove(0);
                            BuiltinFn::$builtin_fn(Box::new(a), None)
                        } else if args.len() == 2 {
                            let b = args.remove(1);
                            let a = args.remove(0);
                            BuiltinFn::$builtin_fn(Box::new(a), Some(Box::new(b)))
                        } else {
                            return eqn_err!(BadBuiltinArgs, loc.start, loc.end);
                        }
                    }};
                    ($builtin_fn:tt, 1, 3) => {{
                        if args.len() == 1 {
                            let a = args.remove(0);
                            BuiltinFn::$builtin_fn(Box::new(a), None, None)
                        } else if args.len() == 2 {
                            let b = args.remove(1);
                            let a = args.remove(0);
                            BuiltinFn::$builtin_fn(Box::new(a), Some(Box::new(b)), None)
                        } else if args.len() == 3 {
                            let c = args.remove(2);
                            let b = args.remove(1);
                            let a = args.remove(0);
                            BuiltinFn::$builtin_fn(
                                Box::new(a),
                                Some(Box::new(b)),
                                Some(Box::new(c)),
                            )
                        } else {
                            return eqn_err!(BadBuiltinArgs, loc.start, loc.end);
                        }
                    }};
                    ($builtin_fn:tt, variadic) => {{
                        if args.len() < 2 {
                            return eqn_err!(BadBuiltinArgs, loc.start, loc.end);
                        }

                        BuiltinFn::$builtin_fn(args)
                    }};
                }

                let builtin = match id.as_str() {
                    "abs" => check_arity!(Abs, 1),
                    "clamp" => check_arity!(Clamp, 3),
                    "exp" => check_arity!(Exp, 1),
                    "log" => check_arity!(Log, 1),
                    "max" => check_arity!(Max, variadic),
                    "min" => check_arity!(Min, variadic),
                    "sigmoid" => check_arity!(Sigmoid, 1, 2),
                    "smoothstep" => check_arity!(SmoothStep, 1, 3),
                    "step" => check_arity!(Step, 1, 2),
                    _ => {
                        let end = loc.start + id.len() as u16;
                        return eqn_err!(UnknownBuiltin, loc.start, end);
                    }
                };
                Expr1::App(builtin, loc)
            }
            Expr0::Op1(op, l, loc) => Expr1::Op1(op, Box::new(Expr1::from(*l, scope)?), loc),
            Expr0::Op2(op, l, r, loc) => Expr1::Op2(
                op,
                Box::new(Expr1::from(*l, scope)?),
                Box::new(Expr1::from(*r, scope)?),
                loc,
            ),
        };
        Ok(expr)
    }

    #[cfg(test)]
    pub(crate) fn strip_loc(self) -> Self {
        let loc = Loc::default();
        let strip = |e: Box<Expr1>| Box::new(e.strip_loc());
        let strip_opt = |e: Option<Box<Expr1>>| e.map(|e| Box::new(e.strip_loc()));
        match self {
            Expr1::Const(n, _loc) => Expr1::Const(n, loc),
            Expr1::State(v, _loc) => Expr1::State(v, loc),
            Expr1::Param(v, _loc) => Expr1::Param(v, loc),
            Expr1::Target(v, _loc) => Expr1::Target(v, loc),
            Expr1::App(builtin, _loc) => {
                let builtin = match builtin {
                    BuiltinFn::Abs(a) => BuiltinFn::Abs(strip(a)),
                    BuiltinFn::Exp(a) => BuiltinFn::Exp(strip(a)),
                    BuiltinFn::Log(a) => BuiltinFn::Log(strip(a)),
                    BuiltinFn::Clamp(a, b, c) => BuiltinFn::Clamp(strip(a), strip(b), strip(c)),
                    BuiltinFn::Max(args) => {
                        BuiltinFn::Max(args.into_iter().map(|a| a.strip_loc()).collect())
                    }
                    BuiltinFn::Min(args) => {
                        BuiltinFn::Min(args.into_iter().map(|a| a.strip_loc()).collect())
                    }
                    BuiltinFn::Sigmoid(a, b) => BuiltinFn::Sigmoid(strip(a), strip_opt(b)),
                    BuiltinFn::Step(a, b) => BuiltinFn::Step(strip(a), strip_opt(b)),
                    BuiltinFn::SmoothStep(a, b, c) => {
                        BuiltinFn::SmoothStep(strip(a), strip_opt(b), strip_opt(c))
                    }
                };
                Expr1::App(builtin, loc)
            }
            Expr1::Op1(op, r, _loc) => Expr1::Op1(op, strip(r), loc),
            Expr1::Op2(op, l, r, _loc) => Expr1::Op2(op, strip(l), strip(r), loc),
        }
    }

    pub fn get_loc(&self) -> Loc {
        match self {
            Expr1::Const(_, loc) => *loc,
            Expr1::State(_, loc) => *loc,
            Expr1::Param(_, loc) => *loc,
            Expr1::Target(_, loc) => *loc,
            Expr1::App(_, loc) => *loc,
            Expr1::Op1(_, _, loc) => *loc,
            Expr1::Op2(_, _, _, loc) => *loc,
        }
    }

    /// walk calls cb on this node and then on every child, depth first.
    pub fn walk<'a, F>(&'a self, cb: &mut F)
    where
        F: FnMut(&'a Expr1),
    {
        cb(self);
        match self {
            Expr1::Const(_, _)
            | Expr1::State(_, _)
            | Expr1::Param(_, _)
            | Expr1::Target(_, _) => {}
            Expr1::App(builtin, _) => walk_builtin_expr(builtin, |arg| arg.walk(&mut *cb)),
            Expr1::Op1(_, r, _) => r.walk(cb),
            Expr1::Op2(_, l, r, _) => {
                l.walk(cb);
                r.walk(cb);
            }
        }
    }
}

impl Default for Expr1 {
    fn default() -> Self {
        Expr1::Const(0.0, Loc::default())
    }
}
