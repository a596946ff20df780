// Copyright 2026 The Model Factory Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use super::{BinaryOp, UnaryOp};
use crate::builtins::{Loc, UntypedBuiltinFn};

/// Expr0 represents a parsed expression, before any calls to builtin
/// functions have been checked and before identifiers have been resolved
/// against a scope.
#[derive(PartialEq, Clone, Debug)]
pub enum Expr0 {
    Const(String, f64, Loc),
    Var(String, Loc),
    // `p.<name>`
    ParamRef(String, Loc),
    App(UntypedBuiltinFn<Expr0>, Loc),
    Op1(UnaryOp, Box<Expr0>, Loc),
    Op2(BinaryOp, Box<Expr0>, Box<Expr0>, Loc),
}

impl Expr0 {
    #[cfg(test)]
    pub(crate) fn strip_loc(self) -> Self {
        let loc = Loc::default();
        match self {
            Expr0::Const(s, n, _loc) => Expr0::Const(s, n, loc),
            Expr0::Var(v, _loc) => Expr0::Var(v, loc),
            Expr0::ParamRef(v, _loc) => Expr0::ParamRef(v, loc),
            Expr0::App(UntypedBuiltinFn(builtin, args), _loc) => Expr0::App(
                UntypedBuiltinFn(
                    builtin,
                    args.into_iter().map(|arg| arg.strip_loc()).collect(),
                ),
                loc,
            ),
            Expr0::Op1(op, r, _loc) => Expr0::Op1(op, Box::new(r.strip_loc()), loc),
            Expr0::Op2(op, l, r, _loc) => {
                Expr0::Op2(op, Box::new(l.strip_loc()), Box::new(r.strip_loc()), loc)
            }
        }
    }

    pub fn get_loc(&self) -> Loc {
        match self {
            Expr0::Const(_, _, loc) => *loc,
            Expr0::Var(_, loc) => *loc,
            Expr0::ParamRef(_, loc) => *loc,
            Expr0::App(_, loc) => *loc,
            Expr0::Op1(_, _, loc) => *loc,
            Expr0::Op2(_, _, _, loc) => *loc,
        }
    }

    /// number of levels in the tree; a leaf is 1
    pub(crate) fn depth(&self) -> usize {
        match self {
            Expr0::Const(_, _, _) | Expr0::Var(_, _) | Expr0::ParamRef(_, _) => 1,
            Expr0::App(UntypedBuiltinFn(_, args), _) => {
                1 + args.iter().map(|arg| arg.depth()).max().unwrap_or(0)
            }
            Expr0::Op1(_, r, _) => 1 + r.depth(),
            Expr0::Op2(_, l, r, _) => 1 + l.depth().max(r.depth()),
        }
    }

    /// visit every identifier and `p.<name>` reference in source order.
    /// The callback receives the name, whether it was written with the
    /// `p.` prefix, and where it appears.
    pub(crate) fn for_each_ident<F>(&self, cb: &mut F)
    where
        F: FnMut(&str, bool, Loc),
    {
        match self {
            Expr0::Const(_, _, _) => {}
            Expr0::Var(id, loc) => cb(id, false, *loc),
            Expr0::ParamRef(id, loc) => cb(id, true, *loc),
            Expr0::App(UntypedBuiltinFn(_, args), _) => {
                for arg in args.iter() {
                    arg.for_each_ident(cb);
                }
            }
            Expr0::Op1(_, r, _) => r.for_each_ident(cb),
            Expr0::Op2(_, l, r, _) => {
                l.for_each_ident(cb);
                r.for_each_ident(cb);
            }
        }
    }
}

impl Default for Expr0 {
    fn default() -> Self {
        Expr0::Const("0.0".to_string(), 0.0, Loc::default())
    }
}
