// SPDX-License-Identifier: Apache-2.0

//! Local expression trees
//!
//! The host hands the engine its qualifiers in this shape. Column references
//! are indexes into the foreign table's column list.

use fdw_core::{LocalType, Value};
use serde::{Deserialize, Serialize};

/// Binary operators the host may use
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Like,
    NotLike,
    ILike,
    NotILike,
    ShiftLeft,
    ShiftRight,
    Plus,
    Minus,
    Multiply,
    Divide,
    /// Any operator without a dedicated variant; never pushed down.
    Other(String),
}

impl Operator {
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            Operator::Eq
                | Operator::NotEq
                | Operator::Lt
                | Operator::LtEq
                | Operator::Gt
                | Operator::GtEq
        )
    }

    pub fn is_like(&self) -> bool {
        matches!(
            self,
            Operator::Like | Operator::NotLike | Operator::ILike | Operator::NotILike
        )
    }
}

/// `IS [NOT] TRUE / FALSE / UNKNOWN`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoolTestKind {
    IsTrue,
    IsNotTrue,
    IsFalse,
    IsNotFalse,
    IsUnknown,
    IsNotUnknown,
}

/// Local expression node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expr {
    /// Column of the foreign table, by position.
    Column(usize),
    /// Host system column (row locator, OID ...); never pushed down.
    SystemColumn(String),
    Const(Value),
    /// Value supplied at execution time (outer reference of a join).
    Param { index: usize, ty: LocalType },
    Op {
        op: Operator,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Not(Box<Expr>),
    And(Vec<Expr>),
    Or(Vec<Expr>),
    NullTest { arg: Box<Expr>, negated: bool },
    BoolTest { arg: Box<Expr>, test: BoolTestKind },
    /// `arg op ANY (elements)` when `use_or`, else `arg op ALL (elements)`.
    ScalarArray {
        op: Operator,
        use_or: bool,
        arg: Box<Expr>,
        elements: Vec<Expr>,
    },
    Func { name: String, args: Vec<Expr> },
    Cast {
        arg: Box<Expr>,
        to: LocalType,
        implicit: bool,
    },
}

impl Expr {
    pub fn col(index: usize) -> Expr {
        Expr::Column(index)
    }

    pub fn lit(value: impl Into<Value>) -> Expr {
        Expr::Const(value.into())
    }

    pub fn null() -> Expr {
        Expr::Const(Value::Null)
    }

    pub fn param(index: usize, ty: LocalType) -> Expr {
        Expr::Param { index, ty }
    }

    pub fn op(op: Operator, left: Expr, right: Expr) -> Expr {
        Expr::Op {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn eq(left: Expr, right: Expr) -> Expr {
        Self::op(Operator::Eq, left, right)
    }

    pub fn negate(expr: Expr) -> Expr {
        Expr::Not(Box::new(expr))
    }

    pub fn is_null(arg: Expr) -> Expr {
        Expr::NullTest {
            arg: Box::new(arg),
            negated: false,
        }
    }

    pub fn is_not_null(arg: Expr) -> Expr {
        Expr::NullTest {
            arg: Box::new(arg),
            negated: true,
        }
    }

    pub fn bool_test(arg: Expr, test: BoolTestKind) -> Expr {
        Expr::BoolTest {
            arg: Box::new(arg),
            test,
        }
    }

    pub fn func(name: impl Into<String>, args: Vec<Expr>) -> Expr {
        Expr::Func {
            name: name.into(),
            args,
        }
    }

    pub fn in_list(arg: Expr, elements: Vec<Expr>) -> Expr {
        Expr::ScalarArray {
            op: Operator::Eq,
            use_or: true,
            arg: Box::new(arg),
            elements,
        }
    }

    pub fn not_in_list(arg: Expr, elements: Vec<Expr>) -> Expr {
        Expr::ScalarArray {
            op: Operator::NotEq,
            use_or: false,
            arg: Box::new(arg),
            elements,
        }
    }

    /// Column positions referenced anywhere in the tree.
    pub fn collect_columns(&self, out: &mut Vec<usize>) {
        match self {
            Expr::Column(i) => {
                if !out.contains(i) {
                    out.push(*i);
                }
            }
            Expr::SystemColumn(_) | Expr::Const(_) | Expr::Param { .. } => {}
            Expr::Op { left, right, .. } => {
                left.collect_columns(out);
                right.collect_columns(out);
            }
            Expr::Not(arg)
            | Expr::NullTest { arg, .. }
            | Expr::BoolTest { arg, .. }
            | Expr::Cast { arg, .. } => arg.collect_columns(out),
            Expr::And(items) | Expr::Or(items) | Expr::Func { args: items, .. } => {
                items.iter().for_each(|e| e.collect_columns(out))
            }
            Expr::ScalarArray { arg, elements, .. } => {
                arg.collect_columns(out);
                elements.iter().for_each(|e| e.collect_columns(out));
            }
        }
    }
}
