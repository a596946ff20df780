// Copyright 2026 The Model Factory Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

pub mod expr0;
pub mod expr1;

pub use expr0::Expr0;
pub use expr1::Expr1;

pub use crate::builtins::Loc;
use crate::builtins::UntypedBuiltinFn;

#[derive(PartialEq, Eq, Hash, Copy, Clone, Debug)]
pub enum BinaryOp {
    Add,
    Sub,
    Exp,
    Mul,
    Div,
}

impl BinaryOp {
    // higher the precedence, the tighter the binding.
    // e.g. Mul.precedence() > Add.precedence()
    pub(crate) fn precedence(&self) -> u8 {
        match self {
            BinaryOp::Add => 1,
            BinaryOp::Sub => 1,
            BinaryOp::Mul => 2,
            BinaryOp::Div => 2,
            BinaryOp::Exp => 4,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Exp => "**",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
        }
    }
}

#[derive(PartialEq, Eq, Hash, Copy, Clone, Debug)]
pub enum UnaryOp {
    Positive,
    Negative,
}

impl UnaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            UnaryOp::Positive => "+",
            UnaryOp::Negative => "-",
        }
    }
}

pub trait Visitor<T> {
    fn walk(&mut self, e: &Expr0) -> T;
}

fn child_needs_parens(parent: &Expr0, child: &Expr0) -> bool {
    match parent {
        // no children so doesn't matter
        Expr0::Const(_, _, _) | Expr0::Var(_, _) | Expr0::ParamRef(_, _) => false,
        // children are comma separated, so no ambiguity possible
        Expr0::App(_, _) => false,
        // unary minus binds looser than `**`, so any operator child
        // needs grouping to survive a round trip
        Expr0::Op1(_, _, _) => matches!(child, Expr0::Op1(_, _, _) | Expr0::Op2(_, _, _, _)),
        Expr0::Op2(parent_op, _, _, _) => match child {
            Expr0::Const(_, _, _) | Expr0::Var(_, _) | Expr0::ParamRef(_, _) | Expr0::App(_, _) => {
                false
            }
            Expr0::Op1(_, _, _) => *parent_op == BinaryOp::Exp,
            // `a - (b - c)` and `(a ** b) ** c` both need their parens, so
            // equal precedence is grouped as well
            Expr0::Op2(child_op, _, _, _) => parent_op.precedence() >= child_op.precedence(),
        },
    }
}

fn paren_if_necessary(parent: &Expr0, child: &Expr0, eqn: String) -> String {
    if child_needs_parens(parent, child) {
        format!("({eqn})")
    } else {
        eqn
    }
}

struct PrintVisitor {}

impl Visitor<String> for PrintVisitor {
    fn walk(&mut self, expr: &Expr0) -> String {
        match expr {
            Expr0::Const(s, _, _) => s.clone(),
            Expr0::Var(id, _) => id.clone(),
            Expr0::ParamRef(id, _) => format!("p.{id}"),
            Expr0::App(UntypedBuiltinFn(func, args), _) => {
                let args: Vec<String> = args.iter().map(|e| self.walk(e)).collect();
                format!("{}({})", func, args.join(", "))
            }
            Expr0::Op1(op, l, _) => {
                let l = paren_if_necessary(expr, l, self.walk(l));
                format!("{}{}", op.symbol(), l)
            }
            Expr0::Op2(op, l, r, _) => {
                let l = paren_if_necessary(expr, l, self.walk(l));
                let r = paren_if_necessary(expr, r, self.walk(r));
                format!("{} {} {}", l, op.symbol(), r)
            }
        }
    }
}

/// print_eqn renders an expression back to source text that parses to
/// the same tree (locations aside).
pub fn print_eqn(expr: &Expr0) -> String {
    let mut visitor = PrintVisitor {};
    visitor.walk(expr)
}

#[test]
fn test_print_eqn() {
    use crate::parser::parse;

    let cases: &[(&str, &str)] = &[
        ("a+b", "a + b"),
        ("a - (b - c)", "a - (b - c)"),
        ("(a - b) - c", "(a - b) - c"),
        ("2**3**2", "2 ** (3 ** 2)"),
        ("-2**2", "-(2 ** 2)"),
        ("2 ** -1", "2 ** (-1)"),
        ("p.kT*(T_target-T)", "p.kT * (T_target - T)"),
        ("clamp(0.6*S,0,1)", "clamp(0.6 * S, 0, 1)"),
    ];

    for (input, expected) in cases {
        let expr = parse(input).unwrap().unwrap();
        let printed = print_eqn(&expr);
        assert_eq!(*expected, printed);
        // the printed form parses back to the same tree
        let reparsed = parse(&printed).unwrap().unwrap();
        assert_eq!(expr.strip_loc(), reparsed.strip_loc());
    }
}
