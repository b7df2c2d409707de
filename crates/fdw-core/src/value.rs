// SPDX-License-Identifier: Apache-2.0

//! Value representations on both sides of the bridge
//!
//! [`Value`] is what the host engine sees, [`RemoteValue`] is what travels
//! over the remote channel. Only the bridge converts between the two.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Local (host engine) value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Numeric(Decimal),
    Text(String),
    /// Character data of unknown encoding, passed through uninterpreted.
    RawText(#[serde(with = "base64_bytes")] Vec<u8>),
    Bytes(#[serde(with = "base64_bytes")] Vec<u8>),
    Uuid(Uuid),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<FixedOffset>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Short type label used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Numeric(_) => "numeric",
            Value::Text(_) => "text",
            Value::RawText(_) => "raw text",
            Value::Bytes(_) => "bytes",
            Value::Uuid(_) => "uuid",
            Value::Date(_) => "date",
            Value::Time(_) => "time",
            Value::Timestamp(_) => "timestamp",
            Value::TimestampTz(_) => "timestamptz",
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

/// Value as exchanged with the remote channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum RemoteValue {
    Null,
    Boolean(bool),
    Integer(i64),
    Int128(i128),
    Double(f64),
    Decimal(Decimal),
    /// Character data already transliterated to the connection charset.
    Text(String),
    /// Character data the remote could not transliterate (charset NONE).
    UntaggedText(#[serde(with = "base64_bytes")] Vec<u8>),
    Binary(#[serde(with = "base64_bytes")] Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<FixedOffset>),
}

impl RemoteValue {
    pub fn is_null(&self) -> bool {
        matches!(self, RemoteValue::Null)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RemoteValue::Null => "NULL",
            RemoteValue::Boolean(_) => "BOOLEAN",
            RemoteValue::Integer(_) => "INTEGER",
            RemoteValue::Int128(_) => "INT128",
            RemoteValue::Double(_) => "DOUBLE PRECISION",
            RemoteValue::Decimal(_) => "DECIMAL",
            RemoteValue::Text(_) => "VARCHAR",
            RemoteValue::UntaggedText(_) => "VARCHAR CHARACTER SET NONE",
            RemoteValue::Binary(_) => "BLOB SUB_TYPE BINARY",
            RemoteValue::Date(_) => "DATE",
            RemoteValue::Time(_) => "TIME",
            RemoteValue::Timestamp(_) => "TIMESTAMP",
            RemoteValue::TimestampTz(_) => "TIMESTAMP WITH TIME ZONE",
        }
    }
}

/// Opaque remote row identifier (`RDB$DB_KEY` for a table is 8 bytes)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RowId(#[serde(with = "base64_bytes")] Vec<u8>);

impl RowId {
    pub const LEN: usize = 8;

    pub fn from_bytes(bytes: Vec<u8>) -> Option<Self> {
        (bytes.len() == Self::LEN).then_some(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_remote(&self) -> RemoteValue {
        RemoteValue::Binary(self.0.clone())
    }
}

/// A projected row plus its hidden row identifier
///
/// `values` always has one slot per table column; columns the scan did not
/// retrieve are `Value::Null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub values: Vec<Value>,
    pub row_id: Option<RowId>,
}

impl Row {
    pub fn new(values: Vec<Value>) -> Self {
        Self {
            values,
            row_id: None,
        }
    }

    pub fn with_row_id(mut self, row_id: RowId) -> Self {
        self.row_id = Some(row_id);
        self
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}
