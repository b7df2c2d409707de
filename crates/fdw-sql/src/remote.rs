// SPDX-License-Identifier: Apache-2.0

//! Remote-dialect expression tree and its SQL rendering
//!
//! The compiler produces this tree; rendering is a separate, mechanical
//! step. Every composite node renders fully parenthesized.

use std::fmt::Write;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use rust_decimal::Decimal;

use crate::ident::RemoteIdent;

/// Comparison operators with a verbatim remote spelling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl CompareOp {
    pub fn as_sql(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::NotEq => "<>",
            CompareOp::Lt => "<",
            CompareOp::LtEq => "<=",
            CompareOp::Gt => ">",
            CompareOp::GtEq => ">=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrimSide {
    Leading,
    Trailing,
}

/// Remote literal
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Int(i64),
    Float(f64),
    Decimal(Decimal),
    Text(String),
    Bool(bool),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
}

/// Remote expression node
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteExpr {
    Column(RemoteIdent),
    Literal(Literal),
    /// Positional placeholder; the index refers to the host parameter.
    Param(usize),
    Compare {
        op: CompareOp,
        left: Box<RemoteExpr>,
        right: Box<RemoteExpr>,
    },
    Like {
        arg: Box<RemoteExpr>,
        pattern: Box<RemoteExpr>,
        negated: bool,
        fold_case: bool,
    },
    And(Vec<RemoteExpr>),
    Or(Vec<RemoteExpr>),
    Not(Box<RemoteExpr>),
    IsNull { arg: Box<RemoteExpr>, negated: bool },
    /// Native `IS TRUE` / `IS FALSE`.
    IsBool { arg: Box<RemoteExpr>, value: bool },
    InList {
        arg: Box<RemoteExpr>,
        items: Vec<RemoteExpr>,
        negated: bool,
    },
    Call { name: &'static str, args: Vec<RemoteExpr> },
    Concat(Vec<RemoteExpr>),
    Position {
        needle: Box<RemoteExpr>,
        haystack: Box<RemoteExpr>,
    },
    Substring {
        arg: Box<RemoteExpr>,
        from: Box<RemoteExpr>,
        length: Option<Box<RemoteExpr>>,
    },
    Trim {
        side: TrimSide,
        chars: Option<Box<RemoteExpr>>,
        arg: Box<RemoteExpr>,
    },
}

impl RemoteExpr {
    pub fn compare(op: CompareOp, left: RemoteExpr, right: RemoteExpr) -> Self {
        RemoteExpr::Compare {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn is_null(arg: RemoteExpr, negated: bool) -> Self {
        RemoteExpr::IsNull {
            arg: Box::new(arg),
            negated,
        }
    }

    pub fn is_bool(arg: RemoteExpr, value: bool) -> Self {
        RemoteExpr::IsBool {
            arg: Box::new(arg),
            value,
        }
    }

    /// Renders the tree, returning the SQL and the parameter indexes in
    /// placeholder order.
    pub fn render(&self) -> (String, Vec<usize>) {
        let mut out = Renderer::default();
        out.expr(self);
        (out.sql, out.params)
    }

    pub fn to_sql(&self) -> String {
        self.render().0
    }
}

/// Quotes a string literal for the remote.
pub fn quote_literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

pub fn render_literal(lit: &Literal) -> String {
    match lit {
        Literal::Null => "NULL".to_string(),
        Literal::Int(i) => i.to_string(),
        Literal::Float(f) => format!("{f:?}"),
        Literal::Decimal(d) => d.to_string(),
        Literal::Text(s) => quote_literal(s),
        Literal::Bool(true) => "TRUE".to_string(),
        Literal::Bool(false) => "FALSE".to_string(),
        Literal::Date(d) => quote_literal(&d.format("%Y-%m-%d").to_string()),
        Literal::Time(t) => quote_literal(&format!(
            "{}.{:04}",
            t.format("%H:%M:%S"),
            t.nanosecond() / 100_000
        )),
        Literal::Timestamp(ts) => quote_literal(&format!(
            "{}.{:04}",
            ts.format("%Y-%m-%d %H:%M:%S"),
            ts.nanosecond() / 100_000
        )),
    }
}

#[derive(Default)]
struct Renderer {
    sql: String,
    params: Vec<usize>,
}

impl Renderer {
    fn list(&mut self, items: &[RemoteExpr], sep: &str) {
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                self.sql.push_str(sep);
            }
            self.expr(item);
        }
    }

    fn expr(&mut self, e: &RemoteExpr) {
        match e {
            RemoteExpr::Column(ident) => {
                let _ = write!(self.sql, "{ident}");
            }
            RemoteExpr::Literal(lit) => self.sql.push_str(&render_literal(lit)),
            RemoteExpr::Param(index) => {
                self.sql.push('?');
                self.params.push(*index);
            }
            RemoteExpr::Compare { op, left, right } => {
                self.sql.push('(');
                self.expr(left);
                let _ = write!(self.sql, " {} ", op.as_sql());
                self.expr(right);
                self.sql.push(')');
            }
            RemoteExpr::Like {
                arg,
                pattern,
                negated,
                fold_case,
            } => {
                let keyword = if *negated { " NOT LIKE " } else { " LIKE " };
                self.sql.push('(');
                if *fold_case {
                    self.sql.push_str("LOWER(");
                    self.expr(arg);
                    self.sql.push(')');
                    self.sql.push_str(keyword);
                    self.sql.push_str("LOWER(");
                    self.expr(pattern);
                    self.sql.push(')');
                } else {
                    self.expr(arg);
                    self.sql.push_str(keyword);
                    self.expr(pattern);
                }
                self.sql.push(')');
            }
            RemoteExpr::And(items) => {
                self.sql.push('(');
                self.list(items, " AND ");
                self.sql.push(')');
            }
            RemoteExpr::Or(items) => {
                self.sql.push('(');
                self.list(items, " OR ");
                self.sql.push(')');
            }
            RemoteExpr::Not(arg) => {
                self.sql.push_str("(NOT ");
                self.expr(arg);
                self.sql.push(')');
            }
            RemoteExpr::IsNull { arg, negated } => {
                self.sql.push('(');
                self.expr(arg);
                self.sql
                    .push_str(if *negated { " IS NOT NULL)" } else { " IS NULL)" });
            }
            RemoteExpr::IsBool { arg, value } => {
                self.sql.push('(');
                self.expr(arg);
                self.sql
                    .push_str(if *value { " IS TRUE)" } else { " IS FALSE)" });
            }
            RemoteExpr::InList {
                arg,
                items,
                negated,
            } => {
                self.sql.push('(');
                self.expr(arg);
                self.sql
                    .push_str(if *negated { " NOT IN (" } else { " IN (" });
                self.list(items, ", ");
                self.sql.push_str("))");
            }
            RemoteExpr::Call { name, args } => {
                self.sql.push_str(name);
                self.sql.push('(');
                self.list(args, ", ");
                self.sql.push(')');
            }
            RemoteExpr::Concat(items) => {
                self.sql.push('(');
                self.list(items, " || ");
                self.sql.push(')');
            }
            RemoteExpr::Position { needle, haystack } => {
                self.sql.push_str("POSITION(");
                self.expr(needle);
                self.sql.push_str(" IN ");
                self.expr(haystack);
                self.sql.push(')');
            }
            RemoteExpr::Substring { arg, from, length } => {
                self.sql.push_str("SUBSTRING(");
                self.expr(arg);
                self.sql.push_str(" FROM ");
                self.expr(from);
                if let Some(length) = length {
                    self.sql.push_str(" FOR ");
                    self.expr(length);
                }
                self.sql.push(')');
            }
            RemoteExpr::Trim { side, chars, arg } => {
                self.sql.push_str(match side {
                    TrimSide::Leading => "TRIM(LEADING ",
                    TrimSide::Trailing => "TRIM(TRAILING ",
                });
                if let Some(chars) = chars {
                    self.expr(chars);
                    self.sql.push(' ');
                }
                self.sql.push_str("FROM ");
                self.expr(arg);
                self.sql.push(')');
            }
        }
    }
}
