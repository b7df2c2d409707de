// SPDX-License-Identifier: Apache-2.0

//! Predicate & expression compiler
//!
//! Translates local qualifiers into the remote dialect. Compilation never
//! fails loudly: anything without a proven remote equivalent yields `None`
//! and the caller keeps that qualifier for local evaluation.
//!
//! Boolean tests are always expanded into explicit two-valued forms so that
//! NULL inputs produce the same row set on both sides.

use std::collections::HashMap;

use fdw_core::bridge::is_remote_precise;
use fdw_core::{BoolSentinel, ConversionMode, LocalType, RemoteVersion, Value};
use serde::{Deserialize, Serialize};

use crate::context::SqlContext;
use crate::expr::{BoolTestKind, Expr, Operator};
use crate::remote::{CompareOp, Literal, RemoteExpr, TrimSide};

/// Largest IN list the remote accepts.
pub const MAX_IN_LIST: usize = 1500;

/// A bound parameter of a compiled fragment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamSlot {
    /// Host parameter index.
    pub index: usize,
    pub ty: LocalType,
}

/// Remote SQL text plus its parameters, in placeholder order
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledFragment {
    pub sql: String,
    pub params: Vec<ParamSlot>,
    pub expr: RemoteExpr,
}

/// Qualifiers split by where they are evaluated
#[derive(Debug, Clone, Default)]
pub struct Classified {
    pub remote: Vec<CompiledFragment>,
    pub local: Vec<Expr>,
}

/// Compiles one predicate, or returns `None` when it must stay local.
pub fn compile(ctx: &SqlContext<'_>, expr: &Expr) -> Option<CompiledFragment> {
    let mut compiler = Compiler {
        ctx,
        param_types: HashMap::new(),
    };
    let remote = compiler.predicate(expr)?;
    let (sql, order) = remote.render();
    let params = order
        .into_iter()
        .map(|index| {
            compiler
                .param_types
                .get(&index)
                .map(|ty| ParamSlot { index, ty: *ty })
        })
        .collect::<Option<Vec<_>>>()?;
    Some(CompiledFragment {
        sql,
        params,
        expr: remote,
    })
}

/// Splits AND-connected qualifiers into pushed and local ones.
///
/// Each top-level conjunct is judged on its own, so one uncompilable
/// clause never prevents the others from being pushed.
pub fn classify(ctx: &SqlContext<'_>, quals: &[Expr]) -> Classified {
    let mut conjuncts = Vec::new();
    for qual in quals {
        flatten_and(qual, &mut conjuncts);
    }

    let mut out = Classified::default();
    for qual in conjuncts {
        if ctx.effective.disable_pushdowns {
            out.local.push(qual.clone());
            continue;
        }
        match compile(ctx, qual) {
            Some(fragment) => {
                tracing::debug!(sql = %fragment.sql, "qualifier pushed down");
                out.remote.push(fragment);
            }
            None => {
                tracing::debug!(?qual, "qualifier evaluated locally");
                out.local.push(qual.clone());
            }
        }
    }
    out
}

fn flatten_and<'e>(expr: &'e Expr, out: &mut Vec<&'e Expr>) {
    match expr {
        Expr::And(items) => items.iter().for_each(|item| flatten_and(item, out)),
        other => out.push(other),
    }
}

struct Typed {
    expr: RemoteExpr,
    ty: Option<LocalType>,
}

impl Typed {
    fn new(expr: RemoteExpr, ty: Option<LocalType>) -> Self {
        Self { expr, ty }
    }
}

struct Compiler<'c, 'a> {
    ctx: &'c SqlContext<'a>,
    param_types: HashMap<usize, LocalType>,
}

fn compare_op(op: &Operator) -> Option<CompareOp> {
    Some(match op {
        Operator::Eq => CompareOp::Eq,
        Operator::NotEq => CompareOp::NotEq,
        Operator::Lt => CompareOp::Lt,
        Operator::LtEq => CompareOp::LtEq,
        Operator::Gt => CompareOp::Gt,
        Operator::GtEq => CompareOp::GtEq,
        _ => return None,
    })
}

fn false_sentinel(sentinel: BoolSentinel) -> RemoteExpr {
    match sentinel {
        BoolSentinel::Integer => RemoteExpr::Literal(Literal::Int(0)),
        BoolSentinel::Char => RemoteExpr::Literal(Literal::Text("0".into())),
    }
}

/// Functions that keep their name and argument list on the remote.
fn plain_function(name: &str) -> Option<(&'static str, RemoteVersion)> {
    let v21 = RemoteVersion::V2_1;
    Some(match name {
        "lower" => ("LOWER", RemoteVersion::V2_0),
        "upper" => ("UPPER", RemoteVersion::V2_0),
        "bit_length" => ("BIT_LENGTH", RemoteVersion::V2_0),
        "octet_length" => ("OCTET_LENGTH", RemoteVersion::V2_0),
        "char_length" | "character_length" => ("CHAR_LENGTH", RemoteVersion::V2_0),
        "length" => ("CHAR_LENGTH", v21),
        "abs" => ("ABS", v21),
        "acos" => ("ACOS", v21),
        "asin" => ("ASIN", v21),
        "atan" => ("ATAN", v21),
        "atan2" => ("ATAN2", v21),
        "ceil" => ("CEIL", v21),
        "ceiling" => ("CEILING", v21),
        "cos" => ("COS", v21),
        "cot" => ("COT", v21),
        "exp" => ("EXP", v21),
        "floor" => ("FLOOR", v21),
        "mod" => ("MOD", v21),
        "nullif" => ("NULLIF", v21),
        "pow" | "power" => ("POWER", v21),
        "reverse" => ("REVERSE", v21),
        "sign" => ("SIGN", v21),
        "sin" => ("SIN", v21),
        "sqrt" => ("SQRT", v21),
        "tan" => ("TAN", v21),
        "trunc" => ("TRUNC", v21),
        "lpad" => ("LPAD", RemoteVersion::V2_5),
        "rpad" => ("RPAD", RemoteVersion::V2_5),
        _ => return None,
    })
}

impl Compiler<'_, '_> {
    fn native_bool(&self) -> bool {
        self.ctx.version.has_native_boolean()
    }

    fn pushable(&self, ty: LocalType) -> bool {
        match ty {
            LocalType::Bytea | LocalType::Uuid | LocalType::TimestampTz => false,
            LocalType::Bool => self.native_bool(),
            _ => true,
        }
    }

    /// Expression in a boolean (WHERE) position.
    fn predicate(&mut self, e: &Expr) -> Option<RemoteExpr> {
        match e {
            Expr::Column(i) => {
                let column = self.ctx.column(*i)?;
                if column.local_type != LocalType::Bool {
                    return None;
                }
                let ident = self.ctx.column_ident(*i)?;
                match self.ctx.mode(*i) {
                    ConversionMode::EmulatedBool(s) => Some(RemoteExpr::compare(
                        CompareOp::NotEq,
                        RemoteExpr::Column(ident),
                        false_sentinel(s),
                    )),
                    _ if self.native_bool() => Some(RemoteExpr::Column(ident)),
                    _ => None,
                }
            }
            Expr::Const(Value::Bool(b)) if self.native_bool() => {
                Some(RemoteExpr::Literal(Literal::Bool(*b)))
            }
            Expr::Param {
                index,
                ty: LocalType::Bool,
            } if self.native_bool() => {
                self.param_types.insert(*index, LocalType::Bool);
                Some(RemoteExpr::Param(*index))
            }
            Expr::Op { op, left, right } if op.is_comparison() => {
                let l = self.value(left)?;
                let r = self.value(right)?;
                let is_bool = |t: &Option<LocalType>| *t == Some(LocalType::Bool);
                if (is_bool(&l.ty) || is_bool(&r.ty)) && !self.native_bool() {
                    return None;
                }
                Some(RemoteExpr::compare(compare_op(op)?, l.expr, r.expr))
            }
            Expr::Op { op, left, right } if op.is_like() => self.like(op, left, right),
            Expr::Not(arg) => Some(RemoteExpr::Not(Box::new(self.predicate(arg)?))),
            Expr::And(items) => items
                .iter()
                .map(|item| self.predicate(item))
                .collect::<Option<Vec<_>>>()
                .map(RemoteExpr::And),
            Expr::Or(items) => items
                .iter()
                .map(|item| self.predicate(item))
                .collect::<Option<Vec<_>>>()
                .map(RemoteExpr::Or),
            Expr::NullTest { arg, negated } => {
                let value = self.raw_value(arg)?;
                Some(RemoteExpr::is_null(value.expr, *negated))
            }
            Expr::BoolTest { arg, test } => self.bool_test(arg, *test),
            Expr::ScalarArray {
                op,
                use_or,
                arg,
                elements,
            } => self.in_list(op, *use_or, arg, elements),
            Expr::Cast {
                arg,
                implicit: true,
                ..
            } => self.predicate(arg),
            _ => None,
        }
    }

    /// Column reference without boolean rewriting, for NULL tests.
    fn raw_value(&mut self, e: &Expr) -> Option<Typed> {
        match e {
            Expr::Column(i) => {
                let column = self.ctx.column(*i)?;
                Some(Typed::new(
                    RemoteExpr::Column(self.ctx.column_ident(*i)?),
                    Some(column.local_type),
                ))
            }
            Expr::Cast {
                arg,
                implicit: true,
                ..
            } => self.raw_value(arg),
            other => self.value(other),
        }
    }

    /// Expression in a value position.
    fn value(&mut self, e: &Expr) -> Option<Typed> {
        match e {
            Expr::Column(i) => {
                let column = self.ctx.column(*i)?;
                let ident = self.ctx.column_ident(*i)?;
                match (column.local_type, self.ctx.mode(*i)) {
                    (LocalType::Bool, ConversionMode::EmulatedBool(s)) if self.native_bool() => {
                        Some(Typed::new(
                            RemoteExpr::compare(
                                CompareOp::NotEq,
                                RemoteExpr::Column(ident),
                                false_sentinel(s),
                            ),
                            Some(LocalType::Bool),
                        ))
                    }
                    (LocalType::Bool, ConversionMode::EmulatedBool(_)) => None,
                    (ty, _) if self.pushable(ty) => {
                        Some(Typed::new(RemoteExpr::Column(ident), Some(ty)))
                    }
                    _ => None,
                }
            }
            Expr::SystemColumn(_) => None,
            Expr::Const(v) => self.literal(v),
            Expr::Param { index, ty } if self.pushable(*ty) => {
                self.param_types.insert(*index, *ty);
                Some(Typed::new(RemoteExpr::Param(*index), Some(*ty)))
            }
            Expr::Op {
                op: op @ (Operator::ShiftLeft | Operator::ShiftRight),
                left,
                right,
            } if self.ctx.version.at_least(RemoteVersion::V2_1) => {
                let l = self.value(left)?;
                let r = self.value(right)?;
                if !l.ty.is_some_and(|t| t.is_integer()) || !r.ty.is_some_and(|t| t.is_integer()) {
                    return None;
                }
                let name = if *op == Operator::ShiftLeft {
                    "BIN_SHL"
                } else {
                    "BIN_SHR"
                };
                Some(Typed::new(
                    RemoteExpr::Call {
                        name,
                        args: vec![l.expr, r.expr],
                    },
                    l.ty,
                ))
            }
            Expr::Func { name, args } => self.function(name, args),
            Expr::Cast {
                arg,
                to,
                implicit: true,
            } if self.pushable(*to) => {
                let inner = self.value(arg)?;
                Some(Typed::new(inner.expr, Some(*to)))
            }
            Expr::Op { op, .. } if !(op.is_comparison() || op.is_like()) => None,
            Expr::Cast { .. } | Expr::Param { .. } => None,
            other if self.native_bool() => self
                .predicate(other)
                .map(|p| Typed::new(p, Some(LocalType::Bool))),
            _ => None,
        }
    }

    fn literal(&self, v: &Value) -> Option<Typed> {
        let (lit, ty) = match v {
            Value::Null => (Literal::Null, None),
            Value::Bool(b) if self.native_bool() => (Literal::Bool(*b), Some(LocalType::Bool)),
            Value::Int(i) => (Literal::Int(*i), Some(LocalType::Int8)),
            Value::Float(f) if f.is_finite() => (Literal::Float(*f), Some(LocalType::Float8)),
            Value::Numeric(d) => (
                Literal::Decimal(*d),
                Some(LocalType::Numeric {
                    precision: 38,
                    scale: d.scale().min(38) as u8,
                }),
            ),
            Value::Text(s) => (Literal::Text(s.clone()), Some(LocalType::Text)),
            Value::Date(d) => (Literal::Date(*d), Some(LocalType::Date)),
            Value::Time(t) if is_remote_precise(*t) => (Literal::Time(*t), Some(LocalType::Time)),
            Value::Timestamp(ts) if is_remote_precise(ts.time()) => {
                (Literal::Timestamp(*ts), Some(LocalType::Timestamp))
            }
            _ => return None,
        };
        Some(Typed::new(RemoteExpr::Literal(lit), ty))
    }

    fn like(&mut self, op: &Operator, left: &Expr, right: &Expr) -> Option<RemoteExpr> {
        let fold_case = matches!(op, Operator::ILike | Operator::NotILike);
        if fold_case && !self.ctx.version.at_least(RemoteVersion::V2_0) {
            return None;
        }
        let arg = self.value(left)?;
        if !arg.ty.is_some_and(|t| t.is_character()) {
            return None;
        }
        // The remote has no default escape character; only escape-free
        // literal patterns mean the same thing on both sides.
        let pattern = match right {
            Expr::Const(Value::Text(p)) if !p.contains('\\') => p.clone(),
            _ => return None,
        };
        Some(RemoteExpr::Like {
            arg: Box::new(arg.expr),
            pattern: Box::new(RemoteExpr::Literal(Literal::Text(pattern))),
            negated: matches!(op, Operator::NotLike | Operator::NotILike),
            fold_case,
        })
    }

    fn bool_test(&mut self, arg: &Expr, test: BoolTestKind) -> Option<RemoteExpr> {
        let column = match arg {
            Expr::Column(i) => Some(*i),
            Expr::Cast {
                arg: inner,
                implicit: true,
                ..
            } => match inner.as_ref() {
                Expr::Column(i) => Some(*i),
                _ => None,
            },
            _ => None,
        };

        if let Some(i) = column {
            if let ConversionMode::EmulatedBool(s) = self.ctx.mode(i) {
                let c = RemoteExpr::Column(self.ctx.column_ident(i)?);
                let zero = false_sentinel(s);
                let is_true = RemoteExpr::compare(CompareOp::NotEq, c.clone(), zero.clone());
                let is_false = RemoteExpr::compare(CompareOp::Eq, c.clone(), zero);
                return Some(match test {
                    BoolTestKind::IsTrue => {
                        RemoteExpr::And(vec![is_true, RemoteExpr::is_null(c, true)])
                    }
                    BoolTestKind::IsFalse => {
                        RemoteExpr::And(vec![is_false, RemoteExpr::is_null(c, true)])
                    }
                    BoolTestKind::IsNotTrue => {
                        RemoteExpr::Or(vec![is_false, RemoteExpr::is_null(c, false)])
                    }
                    BoolTestKind::IsNotFalse => {
                        RemoteExpr::Or(vec![is_true, RemoteExpr::is_null(c, false)])
                    }
                    BoolTestKind::IsUnknown => RemoteExpr::is_null(c, false),
                    BoolTestKind::IsNotUnknown => RemoteExpr::is_null(c, true),
                });
            }
        }

        if !self.native_bool() {
            return None;
        }
        let value = self.value(arg)?;
        if value.ty.is_some_and(|t| t != LocalType::Bool) {
            return None;
        }
        let v = value.expr;
        Some(match test {
            BoolTestKind::IsTrue => RemoteExpr::is_bool(v, true),
            BoolTestKind::IsFalse => RemoteExpr::is_bool(v, false),
            BoolTestKind::IsNotTrue => RemoteExpr::Or(vec![
                RemoteExpr::is_bool(v.clone(), false),
                RemoteExpr::is_null(v, false),
            ]),
            BoolTestKind::IsNotFalse => RemoteExpr::Or(vec![
                RemoteExpr::is_bool(v.clone(), true),
                RemoteExpr::is_null(v, false),
            ]),
            BoolTestKind::IsUnknown => RemoteExpr::is_null(v, false),
            BoolTestKind::IsNotUnknown => RemoteExpr::is_null(v, true),
        })
    }

    fn in_list(
        &mut self,
        op: &Operator,
        use_or: bool,
        arg: &Expr,
        elements: &[Expr],
    ) -> Option<RemoteExpr> {
        let negated = match (op, use_or) {
            (Operator::Eq, true) => false,
            (Operator::NotEq, false) => true,
            _ => return None,
        };
        if elements.is_empty() || elements.len() > MAX_IN_LIST {
            return None;
        }
        let arg = self.value(arg)?;
        if arg.ty == Some(LocalType::Bool) {
            return None;
        }
        let items = elements
            .iter()
            .map(|el| match el {
                Expr::Const(_) | Expr::Param { .. } => self.value(el).map(|t| t.expr),
                _ => None,
            })
            .collect::<Option<Vec<_>>>()?;
        Some(RemoteExpr::InList {
            arg: Box::new(arg.expr),
            items,
            negated,
        })
    }

    fn function(&mut self, name: &str, args: &[Expr]) -> Option<Typed> {
        let version = self.ctx.version;
        let name = name.to_ascii_lowercase();
        let argc = args.len();

        match name.as_str() {
            "concat" if version.at_least(RemoteVersion::V1_5) && argc > 0 => {
                // concat() skips NULL arguments, `||` does not.
                let items = args
                    .iter()
                    .map(|a| {
                        self.value(a).map(|t| RemoteExpr::Call {
                            name: "COALESCE",
                            args: vec![t.expr, RemoteExpr::Literal(Literal::Text(String::new()))],
                        })
                    })
                    .collect::<Option<Vec<_>>>()?;
                Some(Typed::new(RemoteExpr::Concat(items), Some(LocalType::Text)))
            }
            "coalesce" if version.at_least(RemoteVersion::V1_5) && argc >= 2 => {
                let typed = self.values(args)?;
                let ty = typed.iter().find_map(|t| t.ty);
                Some(Typed::new(
                    RemoteExpr::Call {
                        name: "COALESCE",
                        args: typed.into_iter().map(|t| t.expr).collect(),
                    },
                    ty,
                ))
            }
            "substring" if version.at_least(RemoteVersion::V2_0) && (2..=3).contains(&argc) => {
                let mut typed = self.values(args)?;
                if typed[1..].iter().any(|t| !t.ty.is_some_and(|ty| ty.is_integer())) {
                    return None;
                }
                let length = (argc == 3).then(|| typed.pop()).flatten().map(|t| Box::new(t.expr));
                let from = typed.pop()?;
                let arg = typed.pop()?;
                Some(Typed::new(
                    RemoteExpr::Substring {
                        arg: Box::new(arg.expr),
                        from: Box::new(from.expr),
                        length,
                    },
                    Some(LocalType::Text),
                ))
            }
            "ltrim" | "rtrim" if version.at_least(RemoteVersion::V2_1) && (1..=2).contains(&argc) => {
                // TRIM removes a repeated substring, ltrim() any character of
                // a set; they only agree on a single character.
                if let Some(chars) = args.get(1) {
                    let single = matches!(chars, Expr::Const(Value::Text(s)) if s.chars().count() == 1);
                    if !single {
                        return None;
                    }
                }
                let mut typed = self.values(args)?;
                let chars = (argc == 2).then(|| typed.pop()).flatten().map(|t| Box::new(t.expr));
                let arg = typed.pop()?;
                let side = if name == "ltrim" {
                    TrimSide::Leading
                } else {
                    TrimSide::Trailing
                };
                Some(Typed::new(
                    RemoteExpr::Trim {
                        side,
                        chars,
                        arg: Box::new(arg.expr),
                    },
                    Some(LocalType::Text),
                ))
            }
            "position" | "strpos" if version.at_least(RemoteVersion::V2_1) && argc == 2 => {
                let mut typed = self.values(args)?;
                let needle = typed.pop()?;
                let haystack = typed.pop()?;
                Some(Typed::new(
                    RemoteExpr::Position {
                        needle: Box::new(needle.expr),
                        haystack: Box::new(haystack.expr),
                    },
                    Some(LocalType::Int4),
                ))
            }
            "log" if version.at_least(RemoteVersion::V2_1) && (1..=2).contains(&argc) => {
                let typed = self.values(args)?;
                Some(Typed::new(
                    RemoteExpr::Call {
                        name: if argc == 1 { "LOG10" } else { "LOG" },
                        args: typed.into_iter().map(|t| t.expr).collect(),
                    },
                    Some(LocalType::Float8),
                ))
            }
            other => {
                let (remote_name, since) = plain_function(other)?;
                if !version.at_least(since) {
                    return None;
                }
                let typed = self.values(args)?;
                let ty = match remote_name {
                    "CHAR_LENGTH" | "BIT_LENGTH" | "OCTET_LENGTH" => Some(LocalType::Int4),
                    "LOWER" | "UPPER" | "REVERSE" | "LPAD" | "RPAD" => Some(LocalType::Text),
                    _ => typed.first().and_then(|t| t.ty),
                };
                Some(Typed::new(
                    RemoteExpr::Call {
                        name: remote_name,
                        args: typed.into_iter().map(|t| t.expr).collect(),
                    },
                    ty,
                ))
            }
        }
    }

    fn values(&mut self, args: &[Expr]) -> Option<Vec<Typed>> {
        args.iter().map(|a| self.value(a)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval;
    use fdw_core::{from_remote, ColumnDescriptor, ForeignTable, RemoteValue, ServerDescriptor};

    fn server(options: &[(&str, &str)]) -> ServerDescriptor {
        ServerDescriptor::new("fb", options).unwrap()
    }

    fn table() -> ForeignTable {
        ForeignTable::new(
            "items",
            &[] as &[(&str, &str)],
            vec![
                ColumnDescriptor::new("id", LocalType::Int4),
                ColumnDescriptor::new("name", LocalType::Varchar(Some(40))),
                ColumnDescriptor::new("flag", LocalType::Bool)
                    .with_options(&[("implicit_bool_type", "true")])
                    .unwrap(),
                ColumnDescriptor::new("active", LocalType::Bool),
                ColumnDescriptor::new("payload", LocalType::Bytea),
                ColumnDescriptor::new("camel", LocalType::Int4)
                    .with_options(&[("column_name", "CamelCol")])
                    .unwrap(),
            ],
        )
        .unwrap()
    }

    fn sql(expr: &Expr, version: i32) -> Option<String> {
        let t = table();
        let s = server(&[]);
        let ctx = SqlContext::new(&t, &s, RemoteVersion(version));
        compile(&ctx, expr).map(|f| f.sql)
    }

    const ID: usize = 0;
    const NAME: usize = 1;
    const FLAG: usize = 2;
    const ACTIVE: usize = 3;
    const PAYLOAD: usize = 4;
    const CAMEL: usize = 5;

    #[test]
    fn test_comparisons() {
        let e = Expr::op(Operator::GtEq, Expr::col(ID), Expr::lit(10));
        assert_eq!(sql(&e, 30000).unwrap(), "(ID >= 10)");
        let e = Expr::eq(Expr::col(NAME), Expr::lit("O'Neil"));
        assert_eq!(sql(&e, 30000).unwrap(), "(NAME = 'O''Neil')");
        let e = Expr::eq(Expr::col(CAMEL), Expr::lit(1));
        assert_eq!(sql(&e, 30000).unwrap(), "(\"CamelCol\" = 1)");
    }

    #[test]
    fn test_boolean_expressions() {
        let e = Expr::And(vec![
            Expr::eq(Expr::col(ID), Expr::lit(1)),
            Expr::negate(Expr::is_null(Expr::col(NAME))),
        ]);
        assert_eq!(sql(&e, 30000).unwrap(), "((ID = 1) AND (NOT (NAME IS NULL)))");
    }

    #[test]
    fn test_is_not_true_expanded() {
        let e = Expr::bool_test(Expr::col(ACTIVE), BoolTestKind::IsNotTrue);
        assert_eq!(sql(&e, 30000).unwrap(), "((ACTIVE IS FALSE) OR (ACTIVE IS NULL))");
        let e = Expr::bool_test(Expr::col(ACTIVE), BoolTestKind::IsNotFalse);
        assert_eq!(sql(&e, 30000).unwrap(), "((ACTIVE IS TRUE) OR (ACTIVE IS NULL))");
        assert!(sql(&e, 20500).is_none());
    }

    #[test]
    fn test_emulated_boolean_tests() {
        let cases = [
            (BoolTestKind::IsTrue, "((FLAG <> 0) AND (FLAG IS NOT NULL))"),
            (BoolTestKind::IsFalse, "((FLAG = 0) AND (FLAG IS NOT NULL))"),
            (BoolTestKind::IsNotTrue, "((FLAG = 0) OR (FLAG IS NULL))"),
            (BoolTestKind::IsNotFalse, "((FLAG <> 0) OR (FLAG IS NULL))"),
            (BoolTestKind::IsUnknown, "(FLAG IS NULL)"),
            (BoolTestKind::IsNotUnknown, "(FLAG IS NOT NULL)"),
        ];
        for (test, expected) in cases {
            let e = Expr::bool_test(Expr::col(FLAG), test);
            assert_eq!(sql(&e, 20500).unwrap(), expected);
            assert_eq!(sql(&e, 40000).unwrap(), expected);
        }
        assert_eq!(sql(&Expr::col(FLAG), 20500).unwrap(), "(FLAG <> 0)");
    }

    #[test]
    fn test_boolean_literals_need_native_support() {
        let e = Expr::eq(Expr::col(ACTIVE), Expr::lit(true));
        assert_eq!(sql(&e, 30000).unwrap(), "(ACTIVE = TRUE)");
        assert!(sql(&e, 20500).is_none());
    }

    #[test]
    fn test_like() {
        let e = Expr::op(Operator::Like, Expr::col(NAME), Expr::lit("ab%"));
        assert_eq!(sql(&e, 20000).unwrap(), "(NAME LIKE 'ab%')");
        let e = Expr::op(Operator::NotILike, Expr::col(NAME), Expr::lit("ab%"));
        assert_eq!(sql(&e, 20000).unwrap(), "(LOWER(NAME) NOT LIKE LOWER('ab%'))");
        assert!(sql(&e, 10500).is_none());
        let escaped = Expr::op(Operator::Like, Expr::col(NAME), Expr::lit("100\\%"));
        assert!(sql(&escaped, 30000).is_none());
    }

    #[test]
    fn test_in_lists() {
        let e = Expr::in_list(Expr::col(ID), vec![Expr::lit(1), Expr::lit(2)]);
        assert_eq!(sql(&e, 30000).unwrap(), "(ID IN (1, 2))");
        let e = Expr::not_in_list(Expr::col(ID), vec![Expr::lit(3)]);
        assert_eq!(sql(&e, 30000).unwrap(), "(ID NOT IN (3))");
        assert!(sql(&Expr::in_list(Expr::col(ID), vec![]), 30000).is_none());
        let any_ne = Expr::ScalarArray {
            op: Operator::NotEq,
            use_or: true,
            arg: Box::new(Expr::col(ID)),
            elements: vec![Expr::lit(1)],
        };
        assert!(sql(&any_ne, 30000).is_none());
        let huge = Expr::in_list(Expr::col(ID), (0..1501).map(Expr::lit).collect());
        assert!(sql(&huge, 30000).is_none());
    }

    #[test]
    fn test_functions_version_gated() {
        let upper = Expr::eq(Expr::func("upper", vec![Expr::col(NAME)]), Expr::lit("X"));
        assert_eq!(sql(&upper, 20000).unwrap(), "(UPPER(NAME) = 'X')");
        assert!(sql(&upper, 10500).is_none());

        let pos = Expr::op(
            Operator::Gt,
            Expr::func("strpos", vec![Expr::col(NAME), Expr::lit("x")]),
            Expr::lit(0),
        );
        assert_eq!(sql(&pos, 20100).unwrap(), "(POSITION('x' IN NAME) > 0)");
        assert!(sql(&pos, 20000).is_none());

        let pad = Expr::eq(Expr::func("lpad", vec![Expr::col(NAME), Expr::lit(5)]), Expr::lit("   ab"));
        assert!(sql(&pad, 20100).is_none());
        assert!(sql(&pad, 20500).is_some());

        let log = Expr::op(Operator::Gt, Expr::func("log", vec![Expr::col(ID)]), Expr::lit(1));
        assert_eq!(sql(&log, 20100).unwrap(), "(LOG10(ID) > 1)");

        let concat = Expr::eq(
            Expr::func("concat", vec![Expr::col(NAME), Expr::lit("!")]),
            Expr::lit("a!"),
        );
        assert_eq!(
            sql(&concat, 10500).unwrap(),
            "((COALESCE(NAME, '') || COALESCE('!', '')) = 'a!')"
        );

        let unknown = Expr::eq(Expr::func("md5", vec![Expr::col(NAME)]), Expr::lit("x"));
        assert!(sql(&unknown, 40000).is_none());
    }

    #[test]
    fn test_substring_requires_integer_bounds() {
        let ok = Expr::eq(
            Expr::func("substring", vec![Expr::col(NAME), Expr::lit(1), Expr::lit(3)]),
            Expr::lit("abc"),
        );
        assert_eq!(sql(&ok, 20000).unwrap(), "(SUBSTRING(NAME FROM 1 FOR 3) = 'abc')");
        let bad = Expr::eq(
            Expr::func("substring", vec![Expr::col(NAME), Expr::lit("a")]),
            Expr::lit("abc"),
        );
        assert!(sql(&bad, 20000).is_none());
    }

    #[test]
    fn test_trim_set_only_pushed_for_single_characters() {
        let trim = |chars: Expr| {
            Expr::eq(Expr::func("ltrim", vec![Expr::col(NAME), chars]), Expr::lit("abc"))
        };
        assert_eq!(
            sql(&trim(Expr::lit("x")), 20100).unwrap(),
            "(TRIM(LEADING 'x' FROM NAME) = 'abc')"
        );
        assert!(sql(&trim(Expr::lit("xy")), 30000).is_none());
        assert!(sql(&trim(Expr::lit("")), 30000).is_none());
        assert!(sql(&trim(Expr::param(0, LocalType::Text)), 30000).is_none());

        let rtrim = Expr::eq(Expr::func("rtrim", vec![Expr::col(NAME)]), Expr::lit("abc"));
        assert_eq!(sql(&rtrim, 20100).unwrap(), "(TRIM(TRAILING FROM NAME) = 'abc')");

        // ltrim('yxabc', 'xy') strips both characters locally.
        let row = vec![Value::Int(1), Value::Text("yxabc".into())];
        assert!(eval::matches(&trim(Expr::lit("xy")), &row, &[]).unwrap());
    }

    #[test]
    fn test_shift_operators() {
        let e = Expr::eq(
            Expr::op(Operator::ShiftLeft, Expr::col(ID), Expr::lit(2)),
            Expr::lit(8),
        );
        assert_eq!(sql(&e, 20100).unwrap(), "(BIN_SHL(ID, 2) = 8)");
        assert!(sql(&e, 20000).is_none());
    }

    #[test]
    fn test_unpushable_nodes() {
        assert!(sql(&Expr::eq(Expr::col(PAYLOAD), Expr::col(PAYLOAD)), 40000).is_none());
        assert!(sql(&Expr::eq(Expr::SystemColumn("ctid".into()), Expr::lit(1)), 40000).is_none());
        let explicit = Expr::eq(
            Expr::Cast {
                arg: Box::new(Expr::col(ID)),
                to: LocalType::Text,
                implicit: false,
            },
            Expr::lit("1"),
        );
        assert!(sql(&explicit, 40000).is_none());
        let arith = Expr::eq(Expr::op(Operator::Plus, Expr::col(ID), Expr::lit(1)), Expr::lit(2));
        assert!(sql(&arith, 40000).is_none());
        assert!(sql(&Expr::is_null(Expr::col(PAYLOAD)), 40000).is_some());
    }

    #[test]
    fn test_params_bound_in_order() {
        let t = table();
        let s = server(&[]);
        let ctx = SqlContext::new(&t, &s, RemoteVersion::V3_0);
        let e = Expr::And(vec![
            Expr::eq(Expr::col(NAME), Expr::param(1, LocalType::Text)),
            Expr::op(Operator::Gt, Expr::col(ID), Expr::param(0, LocalType::Int4)),
        ]);
        let fragment = compile(&ctx, &e).unwrap();
        assert_eq!(fragment.sql, "((NAME = ?) AND (ID > ?))");
        assert_eq!(
            fragment.params,
            vec![
                ParamSlot { index: 1, ty: LocalType::Text },
                ParamSlot { index: 0, ty: LocalType::Int4 },
            ]
        );
    }

    #[test]
    fn test_classify_and_disable_flag() {
        let t = table();
        let quals = vec![Expr::And(vec![
            Expr::eq(Expr::col(ID), Expr::lit(1)),
            Expr::eq(Expr::func("md5", vec![Expr::col(NAME)]), Expr::lit("x")),
        ])];

        let s = server(&[]);
        let ctx = SqlContext::new(&t, &s, RemoteVersion::V3_0);
        let split = classify(&ctx, &quals);
        assert_eq!(split.remote.len(), 1);
        assert_eq!(split.local.len(), 1);

        let s = server(&[("disable_pushdowns", "true")]);
        let ctx = SqlContext::new(&t, &s, RemoteVersion::V3_0);
        let split = classify(&ctx, &quals);
        assert!(split.remote.is_empty());
        assert_eq!(split.local.len(), 2);
    }

    /// Three-valued evaluation of the remote tree for the equivalence check.
    fn eval_remote(e: &RemoteExpr, flag: &RemoteValue) -> Option<RemoteValue> {
        use RemoteValue as R;
        Some(match e {
            RemoteExpr::Column(_) => flag.clone(),
            RemoteExpr::Literal(Literal::Int(i)) => R::Integer(*i),
            RemoteExpr::Literal(Literal::Bool(b)) => R::Boolean(*b),
            RemoteExpr::Literal(Literal::Null) => R::Null,
            RemoteExpr::Compare { op, left, right } => {
                match (eval_remote(left, flag)?, eval_remote(right, flag)?) {
                    (R::Null, _) | (_, R::Null) => R::Null,
                    (R::Integer(a), R::Integer(b)) => R::Boolean(match op {
                        CompareOp::Eq => a == b,
                        CompareOp::NotEq => a != b,
                        CompareOp::Lt => a < b,
                        CompareOp::LtEq => a <= b,
                        CompareOp::Gt => a > b,
                        CompareOp::GtEq => a >= b,
                    }),
                    (R::Boolean(a), R::Boolean(b)) => R::Boolean(match op {
                        CompareOp::Eq => a == b,
                        CompareOp::NotEq => a != b,
                        _ => return None,
                    }),
                    _ => return None,
                }
            }
            RemoteExpr::And(items) => {
                let vals = items.iter().map(|i| eval_remote(i, flag)).collect::<Option<Vec<_>>>()?;
                if vals.contains(&R::Boolean(false)) {
                    R::Boolean(false)
                } else if vals.contains(&R::Null) {
                    R::Null
                } else {
                    R::Boolean(true)
                }
            }
            RemoteExpr::Or(items) => {
                let vals = items.iter().map(|i| eval_remote(i, flag)).collect::<Option<Vec<_>>>()?;
                if vals.contains(&R::Boolean(true)) {
                    R::Boolean(true)
                } else if vals.contains(&R::Null) {
                    R::Null
                } else {
                    R::Boolean(false)
                }
            }
            RemoteExpr::Not(arg) => match eval_remote(arg, flag)? {
                R::Boolean(b) => R::Boolean(!b),
                other => other,
            },
            RemoteExpr::IsNull { arg, negated } => {
                R::Boolean(eval_remote(arg, flag)?.is_null() != *negated)
            }
            RemoteExpr::IsBool { arg, value } => {
                R::Boolean(eval_remote(arg, flag)? == R::Boolean(*value))
            }
            _ => return None,
        })
    }

    #[test]
    fn test_tri_state_pushdown_matches_local() {
        let t = table();
        let s = server(&[]);
        let tests = [
            BoolTestKind::IsTrue,
            BoolTestKind::IsNotTrue,
            BoolTestKind::IsFalse,
            BoolTestKind::IsNotFalse,
            BoolTestKind::IsUnknown,
            BoolTestKind::IsNotUnknown,
        ];

        for version in [RemoteVersion(20500), RemoteVersion::V4_0] {
            let ctx = SqlContext::new(&t, &s, version);
            let bridge = ctx.bridge();
            for test in tests {
                for wrap_not in [false, true] {
                    let base = Expr::bool_test(Expr::col(FLAG), test);
                    let expr = if wrap_not { Expr::negate(base) } else { base };
                    let fragment = compile(&ctx, &expr).expect("boolean test pushes down");

                    for stored in [
                        RemoteValue::Null,
                        RemoteValue::Integer(0),
                        RemoteValue::Integer(1),
                        RemoteValue::Integer(2),
                    ] {
                        let local_value = from_remote(stored.clone(), &t.columns[FLAG], &bridge).unwrap();
                        let mut row = vec![Value::Null; t.columns.len()];
                        row[FLAG] = local_value;
                        let local = eval::matches(&expr, &row, &[]).unwrap();
                        let remote = eval_remote(&fragment.expr, &stored).unwrap() == RemoteValue::Boolean(true);
                        assert_eq!(
                            local, remote,
                            "{test:?} (not={wrap_not}) on {stored:?} at {version}: {}",
                            fragment.sql
                        );
                    }
                }
            }
        }
    }
}
