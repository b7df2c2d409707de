// SPDX-License-Identifier: Apache-2.0

//! Local evaluation of qualifiers the remote could not take
//!
//! Three-valued: comparisons involving NULL yield NULL, and a row only
//! passes when the whole qualifier is TRUE.

use std::cmp::Ordering;

use fdw_core::{FdwError, FdwResult, LocalType, Value};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};

use crate::expr::{BoolTestKind, Expr, Operator};

/// True when `expr` evaluates to TRUE for `row`.
pub fn matches(expr: &Expr, row: &[Value], params: &[Value]) -> FdwResult<bool> {
    match evaluate(expr, row, params)? {
        Value::Bool(b) => Ok(b),
        Value::Null => Ok(false),
        other => Err(FdwError::conversion(format!(
            "qualifier evaluated to {} instead of boolean",
            other.kind()
        ))),
    }
}

/// All qualifiers hold for `row`.
pub fn matches_all(quals: &[Expr], row: &[Value], params: &[Value]) -> FdwResult<bool> {
    for qual in quals {
        if !matches(qual, row, params)? {
            return Ok(false);
        }
    }
    Ok(true)
}

pub fn evaluate(expr: &Expr, row: &[Value], params: &[Value]) -> FdwResult<Value> {
    let eval = |e: &Expr| evaluate(e, row, params);
    match expr {
        Expr::Column(i) => row
            .get(*i)
            .cloned()
            .ok_or_else(|| FdwError::invalid_state(format!("column {i} not fetched"))),
        Expr::SystemColumn(name) => Err(FdwError::unsupported(format!(
            "system column \"{name}\" in a foreign table qualifier"
        ))),
        Expr::Const(v) => Ok(v.clone()),
        Expr::Param { index, .. } => params
            .get(*index)
            .cloned()
            .ok_or_else(|| FdwError::invalid_state(format!("parameter {index} not bound"))),
        Expr::Op { op, left, right } => binary(op, eval(left)?, eval(right)?),
        Expr::Not(arg) => Ok(match eval(arg)? {
            Value::Null => Value::Null,
            v => Value::Bool(!truth(&v)?),
        }),
        Expr::And(items) => {
            let mut saw_null = false;
            for item in items {
                match eval(item)? {
                    Value::Null => saw_null = true,
                    v if !truth(&v)? => return Ok(Value::Bool(false)),
                    _ => {}
                }
            }
            Ok(if saw_null { Value::Null } else { Value::Bool(true) })
        }
        Expr::Or(items) => {
            let mut saw_null = false;
            for item in items {
                match eval(item)? {
                    Value::Null => saw_null = true,
                    v if truth(&v)? => return Ok(Value::Bool(true)),
                    _ => {}
                }
            }
            Ok(if saw_null { Value::Null } else { Value::Bool(false) })
        }
        Expr::NullTest { arg, negated } => Ok(Value::Bool(eval(arg)?.is_null() != *negated)),
        Expr::BoolTest { arg, test } => {
            let v = match eval(arg)? {
                Value::Null => None,
                v => Some(truth(&v)?),
            };
            Ok(Value::Bool(match test {
                BoolTestKind::IsTrue => v == Some(true),
                BoolTestKind::IsNotTrue => v != Some(true),
                BoolTestKind::IsFalse => v == Some(false),
                BoolTestKind::IsNotFalse => v != Some(false),
                BoolTestKind::IsUnknown => v.is_none(),
                BoolTestKind::IsNotUnknown => v.is_some(),
            }))
        }
        Expr::ScalarArray {
            op,
            use_or,
            arg,
            elements,
        } => {
            let lhs = eval(arg)?;
            let mut saw_null = false;
            for element in elements {
                match binary(op, lhs.clone(), eval(element)?)? {
                    Value::Null => saw_null = true,
                    v => {
                        let hit = truth(&v)?;
                        if hit == *use_or {
                            return Ok(Value::Bool(hit));
                        }
                    }
                }
            }
            Ok(if saw_null {
                Value::Null
            } else {
                Value::Bool(!*use_or)
            })
        }
        Expr::Func { name, args } => {
            let args = args.iter().map(eval).collect::<FdwResult<Vec<_>>>()?;
            function(name, args)
        }
        Expr::Cast { arg, to, .. } => cast(eval(arg)?, *to),
    }
}

fn truth(v: &Value) -> FdwResult<bool> {
    v.as_bool()
        .ok_or_else(|| FdwError::conversion(format!("{} is not a boolean", v.kind())))
}

fn to_decimal(v: &Value) -> Option<Decimal> {
    match v {
        Value::Int(i) => Some(Decimal::from(*i)),
        Value::Numeric(d) => Some(*d),
        Value::Float(f) => Decimal::from_f64(*f),
        _ => None,
    }
}

fn to_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Int(i) => Some(*i as f64),
        Value::Float(f) => Some(*f),
        Value::Numeric(d) => d.to_f64(),
        _ => None,
    }
}

fn compare(l: &Value, r: &Value) -> FdwResult<Ordering> {
    let ord = match (l, r) {
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::Float(_), _) | (_, Value::Float(_)) => match (to_f64(l), to_f64(r)) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => None,
        },
        (Value::Numeric(_) | Value::Int(_), Value::Numeric(_) | Value::Int(_)) => {
            match (to_decimal(l), to_decimal(r)) {
                (Some(a), Some(b)) => Some(a.cmp(&b)),
                _ => None,
            }
        }
        (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
        (Value::Time(a), Value::Time(b)) => Some(a.cmp(b)),
        (Value::Timestamp(a), Value::Timestamp(b)) => Some(a.cmp(b)),
        (Value::Date(a), Value::Timestamp(b)) => Some(a.and_time(chrono::NaiveTime::MIN).cmp(b)),
        (Value::Timestamp(a), Value::Date(b)) => Some(a.cmp(&b.and_time(chrono::NaiveTime::MIN))),
        (Value::TimestampTz(a), Value::TimestampTz(b)) => Some(a.cmp(b)),
        (Value::Uuid(a), Value::Uuid(b)) => Some(a.cmp(b)),
        (Value::Bytes(a), Value::Bytes(b)) | (Value::RawText(a), Value::RawText(b)) => Some(a.cmp(b)),
        _ => None,
    };
    ord.ok_or_else(|| {
        FdwError::conversion(format!("cannot compare {} with {}", l.kind(), r.kind()))
    })
}

fn overflow() -> FdwError {
    FdwError::conversion("integer out of range")
}

fn binary(op: &Operator, l: Value, r: Value) -> FdwResult<Value> {
    if l.is_null() || r.is_null() {
        return Ok(Value::Null);
    }
    if op.is_comparison() {
        let ord = compare(&l, &r)?;
        return Ok(Value::Bool(match op {
            Operator::Eq => ord == Ordering::Equal,
            Operator::NotEq => ord != Ordering::Equal,
            Operator::Lt => ord == Ordering::Less,
            Operator::LtEq => ord != Ordering::Greater,
            Operator::Gt => ord == Ordering::Greater,
            _ => ord != Ordering::Less,
        }));
    }
    match op {
        Operator::Like | Operator::NotLike | Operator::ILike | Operator::NotILike => {
            let (Some(text), Some(pattern)) = (l.as_str(), r.as_str()) else {
                return Err(FdwError::conversion("LIKE requires text operands"));
            };
            let fold = matches!(op, Operator::ILike | Operator::NotILike);
            let hit = if fold {
                like(&text.to_lowercase(), &pattern.to_lowercase())?
            } else {
                like(text, pattern)?
            };
            Ok(Value::Bool(hit != matches!(op, Operator::NotLike | Operator::NotILike)))
        }
        Operator::ShiftLeft | Operator::ShiftRight => {
            let (Some(a), Some(b)) = (l.as_i64(), r.as_i64()) else {
                return Err(FdwError::conversion("shift requires integer operands"));
            };
            let b = u32::try_from(b).map_err(|_| overflow())?;
            let shifted = if *op == Operator::ShiftLeft {
                a.checked_shl(b)
            } else {
                a.checked_shr(b)
            };
            shifted.map(Value::Int).ok_or_else(overflow)
        }
        Operator::Plus | Operator::Minus | Operator::Multiply | Operator::Divide => arithmetic(op, &l, &r),
        Operator::Other(name) => Err(FdwError::unsupported(format!(
            "operator {name} in a locally evaluated qualifier"
        ))),
        _ => Err(FdwError::internal(format!("operator {op:?} not handled"))),
    }
}

fn arithmetic(op: &Operator, l: &Value, r: &Value) -> FdwResult<Value> {
    match (l, r) {
        (Value::Int(a), Value::Int(b)) => {
            let out = match op {
                Operator::Plus => a.checked_add(*b),
                Operator::Minus => a.checked_sub(*b),
                Operator::Multiply => a.checked_mul(*b),
                _ if *b == 0 => return Err(FdwError::conversion("division by zero")),
                _ => a.checked_div(*b),
            };
            out.map(Value::Int).ok_or_else(overflow)
        }
        (Value::Float(_), _) | (_, Value::Float(_)) => {
            let (Some(a), Some(b)) = (to_f64(l), to_f64(r)) else {
                return Err(FdwError::conversion("arithmetic requires numeric operands"));
            };
            Ok(Value::Float(match op {
                Operator::Plus => a + b,
                Operator::Minus => a - b,
                Operator::Multiply => a * b,
                _ if b == 0.0 => return Err(FdwError::conversion("division by zero")),
                _ => a / b,
            }))
        }
        _ => {
            let (Some(a), Some(b)) = (to_decimal(l), to_decimal(r)) else {
                return Err(FdwError::conversion("arithmetic requires numeric operands"));
            };
            let out = match op {
                Operator::Plus => a.checked_add(b),
                Operator::Minus => a.checked_sub(b),
                Operator::Multiply => a.checked_mul(b),
                _ if b.is_zero() => return Err(FdwError::conversion("division by zero")),
                _ => a.checked_div(b),
            };
            out.map(Value::Numeric)
                .ok_or_else(|| FdwError::conversion("numeric value out of range"))
        }
    }
}

/// LIKE matching with `%`, `_` and backslash as the escape character.
pub fn like(text: &str, pattern: &str) -> FdwResult<bool> {
    #[derive(Clone, Copy, PartialEq)]
    enum Token {
        Any,
        One,
        Char(char),
    }

    let mut tokens = Vec::new();
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        tokens.push(match c {
            '%' => Token::Any,
            '_' => Token::One,
            '\\' => Token::Char(chars.next().ok_or_else(|| {
                FdwError::conversion("LIKE pattern must not end with escape character")
            })?),
            c => Token::Char(c),
        });
    }

    let text: Vec<char> = text.chars().collect();
    // dp[j]: pattern prefix of length j matches the current text prefix
    let mut dp = vec![false; tokens.len() + 1];
    dp[0] = true;
    for j in 1..=tokens.len() {
        dp[j] = dp[j - 1] && tokens[j - 1] == Token::Any;
    }
    for ch in text {
        let mut next = vec![false; tokens.len() + 1];
        for j in 1..=tokens.len() {
            next[j] = match tokens[j - 1] {
                Token::Any => next[j - 1] || dp[j],
                Token::One => dp[j - 1],
                Token::Char(c) => dp[j - 1] && c == ch,
            };
        }
        dp = next;
    }
    Ok(dp[tokens.len()])
}

fn text_arg<'v>(name: &str, v: &'v Value) -> FdwResult<&'v str> {
    v.as_str()
        .ok_or_else(|| FdwError::conversion(format!("{name}() expects text, got {}", v.kind())))
}

fn int_arg(name: &str, v: &Value) -> FdwResult<i64> {
    v.as_i64()
        .ok_or_else(|| FdwError::conversion(format!("{name}() expects an integer, got {}", v.kind())))
}

fn function(name: &str, args: Vec<Value>) -> FdwResult<Value> {
    let name = name.to_ascii_lowercase();
    match name.as_str() {
        "coalesce" => return Ok(args.into_iter().find(|v| !v.is_null()).unwrap_or(Value::Null)),
        "concat" => {
            let mut out = String::new();
            for arg in &args {
                match arg {
                    Value::Null => {}
                    Value::Text(s) => out.push_str(s),
                    Value::Int(i) => out.push_str(&i.to_string()),
                    Value::Numeric(d) => out.push_str(&d.to_string()),
                    Value::Float(f) => out.push_str(&f.to_string()),
                    other => return Err(FdwError::unsupported(format!("concat() of {}", other.kind()))),
                }
            }
            return Ok(Value::Text(out));
        }
        "nullif" if args.len() == 2 => {
            if args[0].is_null() || args[1].is_null() {
                return Ok(args[0].clone());
            }
            return Ok(if compare(&args[0], &args[1])? == Ordering::Equal {
                Value::Null
            } else {
                args[0].clone()
            });
        }
        _ => {}
    }

    if args.iter().any(Value::is_null) {
        return Ok(Value::Null);
    }

    match (name.as_str(), args.as_slice()) {
        ("lower", [s]) => Ok(Value::Text(text_arg(&name, s)?.to_lowercase())),
        ("upper", [s]) => Ok(Value::Text(text_arg(&name, s)?.to_uppercase())),
        ("length" | "char_length" | "character_length", [s]) => {
            Ok(Value::Int(text_arg(&name, s)?.chars().count() as i64))
        }
        ("octet_length", [s]) => Ok(Value::Int(text_arg(&name, s)?.len() as i64)),
        ("bit_length", [s]) => Ok(Value::Int(text_arg(&name, s)?.len() as i64 * 8)),
        ("reverse", [s]) => Ok(Value::Text(text_arg(&name, s)?.chars().rev().collect())),
        ("strpos" | "position", [haystack, needle]) => {
            let haystack = text_arg(&name, haystack)?;
            let needle = text_arg(&name, needle)?;
            Ok(Value::Int(match haystack.find(needle) {
                Some(byte) => haystack[..byte].chars().count() as i64 + 1,
                None => 0,
            }))
        }
        ("substring", [s, from, rest @ ..]) if rest.len() <= 1 => {
            let s = text_arg(&name, s)?;
            let from = int_arg(&name, from)?;
            let end = match rest.first() {
                Some(len) => {
                    let len = int_arg(&name, len)?;
                    if len < 0 {
                        return Err(FdwError::conversion("negative substring length not allowed"));
                    }
                    Some(from.saturating_add(len))
                }
                None => None,
            };
            let start = from.max(1);
            let out = s
                .chars()
                .enumerate()
                .filter(|(i, _)| {
                    let pos = *i as i64 + 1;
                    pos >= start && end.is_none_or(|e| pos < e)
                })
                .map(|(_, c)| c)
                .collect();
            Ok(Value::Text(out))
        }
        ("ltrim" | "rtrim", [s, rest @ ..]) if rest.len() <= 1 => {
            let s = text_arg(&name, s)?;
            let set: Vec<char> = match rest.first() {
                Some(chars) => text_arg(&name, chars)?.chars().collect(),
                None => vec![' '],
            };
            let trimmed = if name == "ltrim" {
                s.trim_start_matches(set.as_slice())
            } else {
                s.trim_end_matches(set.as_slice())
            };
            Ok(Value::Text(trimmed.to_string()))
        }
        ("abs", [Value::Int(i)]) => i.checked_abs().map(Value::Int).ok_or_else(overflow),
        ("abs", [Value::Numeric(d)]) => Ok(Value::Numeric(d.abs())),
        ("abs", [Value::Float(f)]) => Ok(Value::Float(f.abs())),
        ("mod", [Value::Int(a), Value::Int(b)]) => {
            if *b == 0 {
                return Err(FdwError::conversion("division by zero"));
            }
            a.checked_rem(*b).map(Value::Int).ok_or_else(overflow)
        }
        ("mod", [a, b]) => {
            let (Some(a), Some(b)) = (to_decimal(a), to_decimal(b)) else {
                return Err(FdwError::conversion("mod() expects numbers"));
            };
            if b.is_zero() {
                return Err(FdwError::conversion("division by zero"));
            }
            a.checked_rem(b)
                .map(Value::Numeric)
                .ok_or_else(|| FdwError::conversion("numeric value out of range"))
        }
        ("sign", [v]) => {
            let f = to_f64(v).ok_or_else(|| FdwError::conversion("sign() expects a number"))?;
            Ok(Value::Int(if f > 0.0 {
                1
            } else if f < 0.0 {
                -1
            } else {
                0
            }))
        }
        ("trunc", [Value::Int(i), rest @ ..]) if rest.len() <= 1 => {
            let places = rest.first().map(|p| int_arg(&name, p)).transpose()?.unwrap_or(0);
            if places >= 0 {
                return Ok(Value::Int(*i));
            }
            let factor = u32::try_from(places.unsigned_abs())
                .ok()
                .and_then(|p| 10_i64.checked_pow(p))
                .unwrap_or(i64::MAX);
            Ok(Value::Int(i / factor * factor))
        }
        ("trunc", [Value::Numeric(d), rest @ ..]) if rest.len() <= 1 => {
            let places = rest.first().map(|p| int_arg(&name, p)).transpose()?.unwrap_or(0);
            if let Ok(places) = u32::try_from(places) {
                return Ok(Value::Numeric(d.round_dp_with_strategy(places, RoundingStrategy::ToZero)));
            }
            let factor = u32::try_from(places.unsigned_abs())
                .ok()
                .and_then(|p| 10_i64.checked_pow(p))
                .map(Decimal::from)
                .ok_or_else(overflow)?;
            d.checked_div(factor)
                .map(|q| q.trunc() * factor)
                .map(Value::Numeric)
                .ok_or_else(overflow)
        }
        ("trunc", [v, rest @ ..]) if rest.len() <= 1 => {
            let f = number_arg(&name, v)?;
            let places = rest.first().map(|p| int_arg(&name, p)).transpose()?.unwrap_or(0);
            let scale = 10_f64.powi(i32::try_from(places).map_err(|_| overflow())?);
            Ok(Value::Float((f * scale).trunc() / scale))
        }
        ("floor" | "ceil" | "ceiling", [Value::Int(i)]) => Ok(Value::Int(*i)),
        ("floor" | "ceil" | "ceiling" | "sqrt" | "exp" | "acos" | "asin" | "atan" | "cos" | "cot" | "sin"
        | "tan", [v]) => {
            let f = number_arg(&name, v)?;
            let out = match name.as_str() {
                "floor" => f.floor(),
                "ceil" | "ceiling" => f.ceil(),
                "sqrt" if f < 0.0 => {
                    return Err(FdwError::conversion("cannot take square root of a negative number"))
                }
                "sqrt" => f.sqrt(),
                "exp" => f.exp(),
                "acos" | "asin" if !(-1.0..=1.0).contains(&f) => {
                    return Err(FdwError::conversion(format!("{name}() input is out of range")))
                }
                "acos" => f.acos(),
                "asin" => f.asin(),
                "atan" => f.atan(),
                "cos" => f.cos(),
                "cot" => 1.0 / f.tan(),
                "sin" => f.sin(),
                _ => f.tan(),
            };
            finite(&name, out)
        }
        ("atan2", [y, x]) => {
            let (y, x) = (number_arg(&name, y)?, number_arg(&name, x)?);
            finite(&name, y.atan2(x))
        }
        ("power" | "pow", [base, exponent]) => {
            let (base, exponent) = (number_arg(&name, base)?, number_arg(&name, exponent)?);
            if base == 0.0 && exponent < 0.0 {
                return Err(FdwError::conversion("zero raised to a negative power is undefined"));
            }
            if base < 0.0 && exponent.fract() != 0.0 {
                return Err(FdwError::conversion(
                    "a negative number raised to a non-integer power yields a complex result",
                ));
            }
            finite(&name, base.powf(exponent))
        }
        ("log", [v]) => {
            let f = number_arg(&name, v)?;
            if f <= 0.0 {
                return Err(FdwError::conversion("cannot take logarithm of a non-positive number"));
            }
            finite(&name, f.log10())
        }
        ("log", [base, v]) => {
            let (base, f) = (number_arg(&name, base)?, number_arg(&name, v)?);
            if base <= 0.0 || f <= 0.0 {
                return Err(FdwError::conversion("cannot take logarithm of a non-positive number"));
            }
            if base == 1.0 {
                return Err(FdwError::conversion("division by zero"));
            }
            finite(&name, f.ln() / base.ln())
        }
        ("lpad" | "rpad", [s, len, rest @ ..]) if rest.len() <= 1 => {
            let s = text_arg(&name, s)?;
            let len = usize::try_from(int_arg(&name, len)?.max(0)).map_err(|_| overflow())?;
            let fill: Vec<char> = match rest.first() {
                Some(fill) => text_arg(&name, fill)?.chars().collect(),
                None => vec![' '],
            };
            Ok(Value::Text(pad(s, len, &fill, name == "lpad")))
        }
        _ if local_function(&name, args.len()) => Err(FdwError::conversion(format!(
            "{name}() does not accept arguments of type {}",
            args.iter().map(Value::kind).collect::<Vec<_>>().join(", ")
        ))),
        _ => Err(FdwError::unsupported(format!(
            "function {name}() in a locally evaluated qualifier"
        ))),
    }
}

fn number_arg(name: &str, v: &Value) -> FdwResult<f64> {
    to_f64(v).ok_or_else(|| FdwError::conversion(format!("{name}() expects a number, got {}", v.kind())))
}

fn finite(name: &str, f: f64) -> FdwResult<Value> {
    if f.is_nan() {
        return Err(FdwError::conversion(format!("{name}() result is not a number")));
    }
    Ok(Value::Float(f))
}

/// Pads or truncates `s` to exactly `len` characters.
fn pad(s: &str, len: usize, fill: &[char], left: bool) -> String {
    let chars: Vec<char> = s.chars().collect();
    if chars.len() >= len || fill.is_empty() {
        return chars.into_iter().take(len).collect();
    }
    let filler = fill.iter().cycle().take(len - chars.len());
    if left {
        filler.chain(chars.iter()).collect()
    } else {
        chars.iter().chain(filler).collect()
    }
}

/// Functions this module evaluates, with their accepted argument counts.
fn local_function(name: &str, argc: usize) -> bool {
    match name {
        "coalesce" | "concat" => argc > 0,
        "nullif" | "strpos" | "position" | "mod" | "power" | "pow" | "atan2" => argc == 2,
        "lower" | "upper" | "length" | "char_length" | "character_length" | "octet_length" | "bit_length"
        | "reverse" | "abs" | "sign" | "floor" | "ceil" | "ceiling" | "sqrt" | "exp" | "acos" | "asin"
        | "atan" | "cos" | "cot" | "sin" | "tan" => argc == 1,
        "ltrim" | "rtrim" | "trunc" | "log" => (1..=2).contains(&argc),
        "substring" | "lpad" | "rpad" => (2..=3).contains(&argc),
        _ => false,
    }
}

/// True when every node of `expr` has a local implementation.
///
/// Qualifiers failing this check are left to the host to recheck; they are
/// never evaluated here.
pub fn evaluable(expr: &Expr) -> bool {
    match expr {
        Expr::Column(_) | Expr::Const(_) | Expr::Param { .. } => true,
        Expr::SystemColumn(_) => false,
        Expr::Op { op, left, right } => !matches!(op, Operator::Other(_)) && evaluable(left) && evaluable(right),
        Expr::Not(arg) | Expr::NullTest { arg, .. } | Expr::BoolTest { arg, .. } => evaluable(arg),
        Expr::And(items) | Expr::Or(items) => items.iter().all(evaluable),
        Expr::ScalarArray { op, arg, elements, .. } => {
            !matches!(op, Operator::Other(_)) && evaluable(arg) && elements.iter().all(evaluable)
        }
        Expr::Func { name, args } => {
            local_function(&name.to_ascii_lowercase(), args.len()) && args.iter().all(evaluable)
        }
        Expr::Cast { arg, to, .. } => *to != LocalType::TimestampTz && evaluable(arg),
    }
}

fn cast_error(v: &Value, to: LocalType) -> FdwError {
    FdwError::conversion(format!("cannot cast {} to {to}", v.kind()))
}

fn parse_text<T: std::str::FromStr>(s: &str, v: &Value, to: LocalType) -> FdwResult<T> {
    s.trim().parse().map_err(|_| cast_error(v, to))
}

fn render_text(v: &Value) -> Option<String> {
    Some(match v {
        Value::Text(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Numeric(d) => d.to_string(),
        Value::Uuid(u) => u.to_string(),
        Value::Date(d) => d.to_string(),
        Value::Time(t) => t.to_string(),
        Value::Timestamp(ts) => ts.to_string(),
        Value::TimestampTz(ts) => {
            let offset = ts.offset().local_minus_utc();
            let sign = if offset < 0 { '-' } else { '+' };
            let (hours, minutes) = (offset.abs() / 3600, offset.abs() % 3600 / 60);
            let mut out = format!("{}{sign}{hours:02}", ts.naive_local());
            if minutes != 0 {
                out.push_str(&format!(":{minutes:02}"));
            }
            out
        }
        Value::Null | Value::RawText(_) | Value::Bytes(_) => return None,
    })
}

fn cast(v: Value, to: LocalType) -> FdwResult<Value> {
    if v.is_null() {
        return Ok(v);
    }
    match to {
        LocalType::Text | LocalType::Varchar(_) | LocalType::Char(_) => {
            let text = render_text(&v).ok_or_else(|| cast_error(&v, to))?;
            Ok(Value::Text(match to {
                LocalType::Varchar(Some(n)) => text.chars().take(n as usize).collect(),
                LocalType::Char(n) => {
                    let n = n as usize;
                    let mut out: String = text.chars().take(n).collect();
                    let missing = n.saturating_sub(out.chars().count());
                    out.extend(std::iter::repeat(' ').take(missing));
                    out
                }
                _ => text,
            }))
        }
        LocalType::Int2 | LocalType::Int4 | LocalType::Int8 => {
            let i = match &v {
                Value::Int(i) => *i,
                Value::Bool(b) => i64::from(*b),
                Value::Numeric(d) => d
                    .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
                    .to_i64()
                    .ok_or_else(overflow)?,
                Value::Float(f) if f.is_finite() => {
                    let rounded = f.round_ties_even();
                    if rounded < i64::MIN as f64 || rounded >= i64::MAX as f64 {
                        return Err(overflow());
                    }
                    rounded as i64
                }
                Value::Text(s) => parse_text(s, &v, to)?,
                _ => return Err(cast_error(&v, to)),
            };
            let fits = match to {
                LocalType::Int2 => i16::try_from(i).is_ok(),
                LocalType::Int4 => i32::try_from(i).is_ok(),
                _ => true,
            };
            if fits {
                Ok(Value::Int(i))
            } else {
                Err(overflow())
            }
        }
        LocalType::Float4 | LocalType::Float8 => match &v {
            Value::Text(s) => parse_text(s, &v, to).map(Value::Float),
            _ => to_f64(&v).map(Value::Float).ok_or_else(|| cast_error(&v, to)),
        },
        LocalType::Numeric { precision, scale } => {
            let d = match &v {
                Value::Text(s) => parse_text::<Decimal>(s, &v, to)?,
                _ => to_decimal(&v).ok_or_else(|| cast_error(&v, to))?,
            };
            Ok(Value::Numeric(if precision > 0 {
                d.round_dp_with_strategy(u32::from(scale), RoundingStrategy::MidpointAwayFromZero)
            } else {
                d
            }))
        }
        LocalType::Bool => match &v {
            Value::Bool(_) => Ok(v),
            Value::Int(i) => Ok(Value::Bool(*i != 0)),
            Value::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "t" | "true" | "y" | "yes" | "on" | "1" => Ok(Value::Bool(true)),
                "f" | "false" | "n" | "no" | "off" | "0" => Ok(Value::Bool(false)),
                _ => Err(cast_error(&v, to)),
            },
            _ => Err(cast_error(&v, to)),
        },
        LocalType::Date => match &v {
            Value::Date(_) => Ok(v),
            Value::Timestamp(ts) => Ok(Value::Date(ts.date())),
            Value::Text(s) => chrono::NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                .map(Value::Date)
                .map_err(|_| cast_error(&v, to)),
            _ => Err(cast_error(&v, to)),
        },
        LocalType::Time => match &v {
            Value::Time(_) => Ok(v),
            Value::Timestamp(ts) => Ok(Value::Time(ts.time())),
            Value::Text(s) => chrono::NaiveTime::parse_from_str(s.trim(), "%H:%M:%S%.f")
                .or_else(|_| chrono::NaiveTime::parse_from_str(s.trim(), "%H:%M"))
                .map(Value::Time)
                .map_err(|_| cast_error(&v, to)),
            _ => Err(cast_error(&v, to)),
        },
        LocalType::Timestamp => match &v {
            Value::Timestamp(_) => Ok(v),
            Value::Date(d) => Ok(Value::Timestamp(d.and_time(chrono::NaiveTime::MIN))),
            Value::Text(s) => {
                let s = s.trim();
                chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
                    .or_else(|_| chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
                    .or_else(|_| {
                        chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").map(|d| d.and_time(chrono::NaiveTime::MIN))
                    })
                    .map(Value::Timestamp)
                    .map_err(|_| cast_error(&v, to))
            }
            _ => Err(cast_error(&v, to)),
        },
        LocalType::Uuid => match &v {
            Value::Uuid(_) => Ok(v),
            Value::Text(s) => uuid::Uuid::parse_str(s.trim())
                .map(Value::Uuid)
                .map_err(|_| cast_error(&v, to)),
            _ => Err(cast_error(&v, to)),
        },
        LocalType::Bytea => match &v {
            Value::Bytes(_) => Ok(v),
            Value::Text(s) => Ok(Value::Bytes(s.clone().into_bytes())),
            _ => Err(cast_error(&v, to)),
        },
        LocalType::TimestampTz => match &v {
            Value::TimestampTz(_) => Ok(v),
            _ => Err(FdwError::unsupported(format!("cast from {} to {to}", v.kind()))),
        },
    }
}
