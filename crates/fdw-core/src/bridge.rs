// SPDX-License-Identifier: Apache-2.0

//! Type & encoding bridge
//!
//! Pure conversions between local [`Value`]s and [`RemoteValue`]s for one
//! column. No I/O happens here; everything the conversion depends on (remote
//! version, session time zones, charset policy) is carried in
//! [`BridgeContext`].

use chrono::{DateTime, FixedOffset, NaiveDateTime, NaiveTime, Offset, TimeZone, Timelike, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::charset::CharsetPolicy;
use crate::descriptor::{BoolSentinel, ColumnDescriptor, ConversionMode};
use crate::error::{FdwError, FdwResult};
use crate::options::ServerOptions;
use crate::types::{LocalType, RemoteVersion};
use crate::value::{RemoteValue, Value};

/// Finest sub-second step the remote stores (1/10000 s).
pub const REMOTE_FRACTION_NANOS: u32 = 100_000;

/// Everything a conversion needs beside the value and its column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeContext {
    pub version: RemoteVersion,
    /// Time zone of the remote session; zoned values are normalized to it on write.
    pub session_zone: FixedOffset,
    /// Zone zoned values are re-tagged with on read.
    pub local_zone: FixedOffset,
    pub charset_policy: CharsetPolicy,
    pub implicit_bool_type: bool,
}

impl BridgeContext {
    pub fn new(server: &ServerOptions, version: RemoteVersion) -> Self {
        let utc = Utc.fix();
        Self {
            version,
            session_zone: utc,
            local_zone: utc,
            charset_policy: server.unmapped_charset,
            implicit_bool_type: server.implicit_bool_type,
        }
    }

    pub fn with_zones(mut self, session_zone: FixedOffset, local_zone: FixedOffset) -> Self {
        self.session_zone = session_zone;
        self.local_zone = local_zone;
        self
    }

    pub fn mode(&self, column: &ColumnDescriptor) -> ConversionMode {
        let server = ServerOptions {
            implicit_bool_type: self.implicit_bool_type,
            ..ServerOptions::default()
        };
        column.conversion_mode(&server, self.version)
    }
}

/// Drops precision below the remote's sub-second step. Never rounds.
pub fn truncate_time(time: NaiveTime) -> NaiveTime {
    let nanos = time.nanosecond();
    time.with_nanosecond(nanos - nanos % REMOTE_FRACTION_NANOS)
        .unwrap_or(time)
}

pub fn truncate_timestamp(ts: NaiveDateTime) -> NaiveDateTime {
    let nanos = ts.nanosecond();
    ts.with_nanosecond(nanos - nanos % REMOTE_FRACTION_NANOS)
        .unwrap_or(ts)
}

/// True when a time value survives a write unchanged.
pub fn is_remote_precise(time: NaiveTime) -> bool {
    time.nanosecond() % REMOTE_FRACTION_NANOS == 0
}

fn mismatch(column: &ColumnDescriptor, value_kind: &str) -> FdwError {
    FdwError::conversion(format!(
        "column \"{}\" of type {} cannot hold a {value_kind} value",
        column.name, column.local_type
    ))
}

fn check_bounds(column: &ColumnDescriptor, v: i64) -> FdwResult<i64> {
    match column.local_type.integer_bounds() {
        Some((min, max)) if v < min || v > max => Err(FdwError::conversion(format!(
            "value {v} out of range for column \"{}\" of type {}",
            column.name, column.local_type
        ))),
        _ => Ok(v),
    }
}

/// Converts a local value for transmission to the remote.
pub fn to_remote(value: &Value, column: &ColumnDescriptor, ctx: &BridgeContext) -> FdwResult<RemoteValue> {
    if value.is_null() {
        return Ok(RemoteValue::Null);
    }

    if let ConversionMode::EmulatedBool(sentinel) = ctx.mode(column) {
        let b = value.as_bool().ok_or_else(|| mismatch(column, value.kind()))?;
        return Ok(match sentinel {
            BoolSentinel::Integer => RemoteValue::Integer(i64::from(b)),
            BoolSentinel::Char => RemoteValue::Text(if b { "1" } else { "0" }.to_string()),
        });
    }

    let remote = match (column.local_type, value) {
        (LocalType::Bool, Value::Bool(b)) => {
            if !ctx.version.has_native_boolean() {
                return Err(FdwError::conversion(format!(
                    "remote server {} has no BOOLEAN type; mark column \"{}\" with implicit_bool_type",
                    ctx.version, column.name
                )));
            }
            RemoteValue::Boolean(*b)
        }
        (ty, Value::Int(i)) if ty.is_integer() => RemoteValue::Integer(check_bounds(column, *i)?),
        (LocalType::Numeric { .. }, Value::Int(i)) => RemoteValue::Integer(*i),
        (LocalType::Numeric { .. }, Value::Numeric(d)) => RemoteValue::Decimal(*d),
        (LocalType::Float4 | LocalType::Float8, Value::Float(f)) => RemoteValue::Double(*f),
        (ty, Value::Text(s)) if ty.is_character() => RemoteValue::Text(s.clone()),
        (ty, Value::RawText(bytes)) if ty.is_character() => RemoteValue::UntaggedText(bytes.clone()),
        (LocalType::Bytea, Value::Bytes(bytes)) => RemoteValue::Binary(bytes.clone()),
        (LocalType::Uuid, Value::Uuid(u)) => RemoteValue::Binary(u.as_bytes().to_vec()),
        (LocalType::Date, Value::Date(d)) => RemoteValue::Date(*d),
        (LocalType::Time, Value::Time(t)) => RemoteValue::Time(truncate_time(*t)),
        (LocalType::Timestamp, Value::Timestamp(ts)) => {
            RemoteValue::Timestamp(truncate_timestamp(*ts))
        }
        (LocalType::TimestampTz, Value::TimestampTz(dt)) => {
            let normalized = dt.with_timezone(&ctx.session_zone);
            let truncated = truncate_timestamp(normalized.naive_local());
            RemoteValue::TimestampTz(attach_zone(truncated, ctx.session_zone, column)?)
        }
        (_, other) => return Err(mismatch(column, other.kind())),
    };
    Ok(remote)
}

fn attach_zone(
    naive: NaiveDateTime,
    zone: FixedOffset,
    column: &ColumnDescriptor,
) -> FdwResult<DateTime<FixedOffset>> {
    zone.from_local_datetime(&naive).single().ok_or_else(|| {
        FdwError::conversion(format!(
            "timestamp {naive} for column \"{}\" is not valid in zone {zone}",
            column.name
        ))
    })
}

fn decimal_to_i64(column: &ColumnDescriptor, d: Decimal) -> FdwResult<i64> {
    if !d.fract().is_zero() {
        return Err(FdwError::conversion(format!(
            "value {d} for column \"{}\" is not an integer",
            column.name
        )));
    }
    d.to_i64()
        .ok_or_else(|| FdwError::conversion(format!("value {d} out of range for column \"{}\"", column.name)))
}

/// Converts a value received from the remote into the column's local type.
pub fn from_remote(value: RemoteValue, column: &ColumnDescriptor, ctx: &BridgeContext) -> FdwResult<Value> {
    if value.is_null() {
        return Ok(Value::Null);
    }

    if let ConversionMode::EmulatedBool(_) = ctx.mode(column) {
        // False is exactly the zero sentinel; every other value reads as true.
        return match value {
            RemoteValue::Integer(i) => Ok(Value::Bool(i != 0)),
            RemoteValue::Int128(i) => Ok(Value::Bool(i != 0)),
            RemoteValue::Decimal(d) => Ok(Value::Bool(!d.is_zero())),
            RemoteValue::Text(s) => Ok(Value::Bool(s.trim_end() != "0")),
            RemoteValue::Boolean(b) => Ok(Value::Bool(b)),
            other => Err(mismatch(column, other.kind())),
        };
    }

    let local = match (column.local_type, value) {
        (LocalType::Bool, RemoteValue::Boolean(b)) => Value::Bool(b),
        (ty, RemoteValue::Integer(i)) if ty.is_integer() => Value::Int(check_bounds(column, i)?),
        (ty, RemoteValue::Int128(i)) if ty.is_integer() => {
            let narrowed = i64::try_from(i)
                .map_err(|_| FdwError::conversion(format!("value {i} out of range for column \"{}\"", column.name)))?;
            Value::Int(check_bounds(column, narrowed)?)
        }
        (ty, RemoteValue::Decimal(d)) if ty.is_integer() => {
            Value::Int(check_bounds(column, decimal_to_i64(column, d)?)?)
        }
        (LocalType::Numeric { .. }, RemoteValue::Decimal(d)) => Value::Numeric(d),
        (LocalType::Numeric { .. }, RemoteValue::Integer(i)) => Value::Numeric(Decimal::from(i)),
        (LocalType::Numeric { .. }, RemoteValue::Int128(i)) => Value::Numeric(
            Decimal::try_from_i128_with_scale(i, 0)
                .map_err(|e| FdwError::conversion(format!("column \"{}\": {e}", column.name)))?,
        ),
        (LocalType::Numeric { .. }, RemoteValue::Double(f)) => Value::Numeric(
            Decimal::from_f64_retain(f)
                .ok_or_else(|| FdwError::conversion(format!("value {f} cannot be represented as numeric")))?,
        ),
        (LocalType::Float4 | LocalType::Float8, RemoteValue::Double(f)) => Value::Float(f),
        (LocalType::Float4 | LocalType::Float8, RemoteValue::Integer(i)) => Value::Float(i as f64),
        (LocalType::Float4 | LocalType::Float8, RemoteValue::Decimal(d)) => {
            Value::Float(d.to_f64().ok_or_else(|| mismatch(column, "decimal"))?)
        }
        (ty, RemoteValue::Text(s)) if ty.is_character() => Value::Text(s),
        (ty, RemoteValue::UntaggedText(bytes)) if ty.is_character() => {
            Value::RawText(ctx.charset_policy.accept_untagged(&column.name, &bytes)?)
        }
        (ty, RemoteValue::Integer(i)) if ty.is_character() => Value::Text(i.to_string()),
        (ty, RemoteValue::Decimal(d)) if ty.is_character() => Value::Text(d.to_string()),
        (LocalType::Bytea, RemoteValue::Binary(bytes) | RemoteValue::UntaggedText(bytes)) => {
            Value::Bytes(bytes)
        }
        (LocalType::Bytea, RemoteValue::Text(s)) => Value::Bytes(s.into_bytes()),
        (LocalType::Uuid, RemoteValue::Binary(bytes) | RemoteValue::UntaggedText(bytes)) => {
            Value::Uuid(Uuid::from_slice(&bytes).map_err(|_| {
                FdwError::conversion(format!(
                    "column \"{}\" expects a 16 byte identifier, got {} bytes",
                    column.name,
                    bytes.len()
                ))
            })?)
        }
        (LocalType::Date, RemoteValue::Date(d)) => Value::Date(d),
        (LocalType::Time, RemoteValue::Time(t)) => Value::Time(t),
        (LocalType::Timestamp, RemoteValue::Timestamp(ts)) => Value::Timestamp(ts),
        (LocalType::TimestampTz, RemoteValue::TimestampTz(dt)) => {
            Value::TimestampTz(dt.with_timezone(&ctx.local_zone))
        }
        (LocalType::TimestampTz, RemoteValue::Timestamp(naive)) => {
            let zoned = attach_zone(naive, ctx.session_zone, column)?;
            Value::TimestampTz(zoned.with_timezone(&ctx.local_zone))
        }
        (_, other) => return Err(mismatch(column, other.kind())),
    };
    Ok(local)
}
