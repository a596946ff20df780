// Copyright 2026 The Model Factory Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Loc describes a location in an expression by the starting point and ending point.
/// Expressions are capped well below u16::MAX bytes, so u16 is long enough.
#[derive(PartialEq, Eq, Clone, Copy, Debug, Default, Hash, Serialize, Deserialize)]
pub struct Loc {
    pub start: u16,
    pub end: u16,
}

impl fmt::Display for Loc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start, self.end)
    }
}

impl Loc {
    pub fn new(start: usize, end: usize) -> Self {
        Loc {
            start: start as u16,
            end: end as u16,
        }
    }

    /// union takes a second Loc and returns the inclusive range from the
    /// start of the earlier token to the end of the later token.
    pub fn union(&self, rhs: &Self) -> Self {
        Loc {
            start: self.start.min(rhs.start),
            end: self.end.max(rhs.end),
        }
    }
}

#[test]
fn test_loc_basics() {
    let a = Loc { start: 3, end: 7 };
    assert_eq!(a, Loc::new(3, 7));

    let b = Loc { start: 4, end: 11 };
    assert_eq!(Loc::new(3, 11), a.union(&b));

    let c = Loc { start: 1, end: 5 };
    assert_eq!(Loc::new(1, 7), a.union(&c));
}

/// A call as written in the source, before the name has been checked
/// against the whitelist.
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct UntypedBuiltinFn<Expr>(pub String, pub Vec<Expr>);

/// The complete set of callable functions.  Adding a function means
/// adding a variant here; every match over it is exhaustive.
#[derive(PartialEq, Eq, Clone, Debug)]
pub enum BuiltinFn<Expr> {
    Abs(Box<Expr>),
    Clamp(Box<Expr>, Box<Expr>, Box<Expr>),
    Exp(Box<Expr>),
    Log(Box<Expr>),
    // two or more arguments
    Max(Vec<Expr>),
    Min(Vec<Expr>),
    // steepness defaults to 1
    Sigmoid(Box<Expr>, Option<Box<Expr>>),
    // edges default to 0 and 1
    SmoothStep(Box<Expr>, Option<Box<Expr>>, Option<Box<Expr>>),
    // threshold defaults to 0
    Step(Box<Expr>, Option<Box<Expr>>),
}

impl<Expr> BuiltinFn<Expr> {
    pub fn name(&self) -> &'static str {
        use BuiltinFn::*;
        match self {
            Abs(_) => "abs",
            Clamp(_, _, _) => "clamp",
            Exp(_) => "exp",
            Log(_) => "log",
            Max(_) => "max",
            Min(_) => "min",
            Sigmoid(_, _) => "sigmoid",
            SmoothStep(_, _, _) => "smoothstep",
            Step(_, _) => "step",
        }
    }
}

/// Names accepted in call position, in the order they are documented.
pub const BUILTIN_NAMES: &[&str] = &[
    "clamp",
    "min",
    "max",
    "sigmoid",
    "step",
    "smoothstep",
    "abs",
    "exp",
    "log",
];

pub fn is_builtin_fn(name: &str) -> bool {
    BUILTIN_NAMES.contains(&name)
}

pub(crate) fn walk_builtin_expr<'a, Expr, F>(builtin: &'a BuiltinFn<Expr>, mut cb: F)
where
    F: FnMut(&'a Expr),
{
    match builtin {
        BuiltinFn::Abs(a) | BuiltinFn::Exp(a) | BuiltinFn::Log(a) => cb(a),
        BuiltinFn::Clamp(a, b, c) => {
            cb(a);
            cb(b);
            cb(c);
        }
        BuiltinFn::Max(args) | BuiltinFn::Min(args) => args.iter().for_each(cb),
        BuiltinFn::Sigmoid(a, b) | BuiltinFn::Step(a, b) => {
            cb(a);
            if let Some(b) = b {
                cb(b);
            }
        }
        BuiltinFn::SmoothStep(a, b, c) => {
            cb(a);
            if let Some(b) = b {
                cb(b);
            }
            if let Some(c) = c {
                cb(c);
            }
        }
    }
}

#[test]
fn test_is_builtin_fn() {
    assert!(is_builtin_fn("clamp"));
    assert!(is_builtin_fn("smoothstep"));
    assert!(!is_builtin_fn("eval"));
    assert!(!is_builtin_fn("__import__"));
    assert!(!is_builtin_fn("Clamp"));
}

#[test]
fn test_name() {
    type Builtin = BuiltinFn<f64>;

    assert_eq!("max", Builtin::Max(vec![1.0, 2.0]).name());
    assert_eq!("sigmoid", Builtin::Sigmoid(Box::new(0.0), None).name());
    for name in BUILTIN_NAMES {
        assert!(is_builtin_fn(name));
    }
}

#[test]
fn test_walk_builtin_expr_visits_every_argument() {
    let builtin: BuiltinFn<i32> =
        BuiltinFn::SmoothStep(Box::new(1), Some(Box::new(2)), Some(Box::new(3)));
    let mut seen = vec![];
    walk_builtin_expr(&builtin, |arg| seen.push(*arg));
    assert_eq!(vec![1, 2, 3], seen);

    let builtin: BuiltinFn<i32> = BuiltinFn::Step(Box::new(7), None);
    let mut seen = vec![];
    walk_builtin_expr(&builtin, |arg| seen.push(*arg));
    assert_eq!(vec![7], seen);
}
