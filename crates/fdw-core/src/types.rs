// SPDX-License-Identifier: Apache-2.0

//! Local and remote type systems
//!
//! `RemoteType` is decoded from the remote catalog (`rdb$fields`). The mapping
//! to `LocalType` is checked once, when a table is defined or imported, so
//! that no unsupported type can reach the row path.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{FdwError, FdwResult};

/// Host engine column type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocalType {
    Bool,
    Int2,
    Int4,
    Int8,
    Float4,
    Float8,
    Numeric { precision: u8, scale: u8 },
    Text,
    Varchar(Option<u32>),
    Char(u32),
    Bytea,
    Uuid,
    Date,
    Time,
    Timestamp,
    TimestampTz,
}

impl LocalType {
    pub fn is_integer(&self) -> bool {
        matches!(self, LocalType::Int2 | LocalType::Int4 | LocalType::Int8)
    }

    pub fn is_character(&self) -> bool {
        matches!(
            self,
            LocalType::Text | LocalType::Varchar(_) | LocalType::Char(_)
        )
    }

    /// Inclusive range of an integer type.
    pub fn integer_bounds(&self) -> Option<(i64, i64)> {
        match self {
            LocalType::Int2 => Some((i16::MIN as i64, i16::MAX as i64)),
            LocalType::Int4 => Some((i32::MIN as i64, i32::MAX as i64)),
            LocalType::Int8 => Some((i64::MIN, i64::MAX)),
            _ => None,
        }
    }
}

impl fmt::Display for LocalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocalType::Bool => write!(f, "boolean"),
            LocalType::Int2 => write!(f, "smallint"),
            LocalType::Int4 => write!(f, "integer"),
            LocalType::Int8 => write!(f, "bigint"),
            LocalType::Float4 => write!(f, "real"),
            LocalType::Float8 => write!(f, "double precision"),
            LocalType::Numeric { precision, scale } => write!(f, "numeric({precision},{scale})"),
            LocalType::Text => write!(f, "text"),
            LocalType::Varchar(Some(len)) => write!(f, "varchar({len})"),
            LocalType::Varchar(None) => write!(f, "varchar"),
            LocalType::Char(len) => write!(f, "char({len})"),
            LocalType::Bytea => write!(f, "bytea"),
            LocalType::Uuid => write!(f, "uuid"),
            LocalType::Date => write!(f, "date"),
            LocalType::Time => write!(f, "time"),
            LocalType::Timestamp => write!(f, "timestamp"),
            LocalType::TimestampTz => write!(f, "timestamp with time zone"),
        }
    }
}

/// Remote column type as recorded in `rdb$fields`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteType {
    SmallInt,
    Integer,
    BigInt,
    Int128,
    Numeric { precision: u8, scale: u8 },
    Float,
    Double,
    Char(u32),
    Varchar(u32),
    Cstring(u32),
    Date,
    Time,
    TimeTz,
    Timestamp,
    TimestampTz,
    Boolean,
    /// Large object; sub type 0 is binary, 1 is text.
    Blob { sub_type: i16 },
    Array,
    Unknown(i16),
}

/// Catalog field type codes
pub mod field_type {
    pub const SMALLINT: i16 = 7;
    pub const INTEGER: i16 = 8;
    pub const QUAD: i16 = 9;
    pub const FLOAT: i16 = 10;
    pub const D_FLOAT: i16 = 11;
    pub const DATE: i16 = 12;
    pub const TIME: i16 = 13;
    pub const CHAR: i16 = 14;
    pub const BIGINT: i16 = 16;
    pub const BOOLEAN: i16 = 23;
    pub const INT128: i16 = 26;
    pub const DOUBLE: i16 = 27;
    pub const TIME_TZ: i16 = 28;
    pub const TIMESTAMP_TZ: i16 = 29;
    pub const TIMESTAMP: i16 = 35;
    pub const VARCHAR: i16 = 37;
    pub const CSTRING: i16 = 40;
    pub const BLOB: i16 = 261;
}

/// Raw column metadata as returned by the catalog query
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMetadata {
    pub field_type: i16,
    pub sub_type: Option<i16>,
    pub char_length: Option<u32>,
    pub precision: Option<i16>,
    pub scale: Option<i16>,
    pub dimensions: Option<i16>,
}

impl RemoteType {
    pub fn from_catalog(meta: &FieldMetadata) -> Self {
        use field_type::*;

        if meta.dimensions.unwrap_or(0) > 0 {
            return RemoteType::Array;
        }

        let sub_type = meta.sub_type.unwrap_or(0);
        let exact = |fallback: RemoteType| -> RemoteType {
            match sub_type {
                1 | 2 => RemoteType::Numeric {
                    precision: meta.precision.unwrap_or(18).clamp(1, 38) as u8,
                    scale: meta.scale.unwrap_or(0).unsigned_abs().min(38) as u8,
                },
                _ => fallback,
            }
        };
        let length = meta.char_length.unwrap_or(1);

        match meta.field_type {
            SMALLINT => exact(RemoteType::SmallInt),
            INTEGER => exact(RemoteType::Integer),
            BIGINT => exact(RemoteType::BigInt),
            INT128 => exact(RemoteType::Int128),
            FLOAT => RemoteType::Float,
            DOUBLE | D_FLOAT => RemoteType::Double,
            DATE => RemoteType::Date,
            TIME => RemoteType::Time,
            TIME_TZ => RemoteType::TimeTz,
            TIMESTAMP => RemoteType::Timestamp,
            TIMESTAMP_TZ => RemoteType::TimestampTz,
            CHAR => RemoteType::Char(length),
            VARCHAR => RemoteType::Varchar(length),
            CSTRING => RemoteType::Cstring(length),
            BOOLEAN => RemoteType::Boolean,
            BLOB => RemoteType::Blob { sub_type },
            other => RemoteType::Unknown(other),
        }
    }

    /// Local type inferred for this remote type.
    pub fn local_type(&self) -> FdwResult<LocalType> {
        let ty = match *self {
            RemoteType::SmallInt => LocalType::Int2,
            RemoteType::Integer => LocalType::Int4,
            RemoteType::BigInt => LocalType::Int8,
            RemoteType::Int128 => LocalType::Numeric {
                precision: 38,
                scale: 0,
            },
            RemoteType::Numeric { precision, scale } => LocalType::Numeric { precision, scale },
            RemoteType::Float => LocalType::Float4,
            RemoteType::Double => LocalType::Float8,
            RemoteType::Char(len) => LocalType::Char(len),
            RemoteType::Varchar(len) => LocalType::Varchar(Some(len)),
            RemoteType::Cstring(_) => LocalType::Text,
            RemoteType::Date => LocalType::Date,
            RemoteType::Time => LocalType::Time,
            RemoteType::Timestamp => LocalType::Timestamp,
            RemoteType::TimestampTz => LocalType::TimestampTz,
            RemoteType::Boolean => LocalType::Bool,
            RemoteType::Blob { sub_type: 1 } => LocalType::Text,
            RemoteType::Blob { sub_type: 0 } => LocalType::Bytea,
            RemoteType::Blob { sub_type } => {
                return Err(FdwError::unsupported_type(format!(
                    "BLOB SUB_TYPE {sub_type} is not supported"
                )))
            }
            RemoteType::TimeTz => {
                return Err(FdwError::unsupported_type(
                    "TIME WITH TIME ZONE has no local equivalent",
                ))
            }
            RemoteType::Array => {
                return Err(FdwError::unsupported_type("array columns are not supported"))
            }
            RemoteType::Unknown(code) => {
                return Err(FdwError::unsupported_type(format!(
                    "unknown remote field type {code}"
                )))
            }
        };
        Ok(ty)
    }

    /// Checks that a declared local column can hold this remote type.
    ///
    /// `emulated_bool` allows a local boolean over a narrow integer or
    /// single character column.
    pub fn check_local(&self, local: LocalType, emulated_bool: bool) -> FdwResult<()> {
        let natural = self.local_type()?;
        let ok = match (local, *self) {
            (LocalType::Bool, RemoteType::Boolean) => true,
            (
                LocalType::Bool,
                RemoteType::SmallInt | RemoteType::Integer | RemoteType::BigInt | RemoteType::Char(1),
            ) => emulated_bool,
            (LocalType::Uuid, RemoteType::Char(16) | RemoteType::Blob { sub_type: 0 }) => true,
            (l, _) if l.is_integer() => natural.is_integer() || self.is_exact_integer(),
            (l, _) if l.is_character() => natural.is_character(),
            (LocalType::Numeric { .. }, _) => {
                natural.is_integer() || matches!(natural, LocalType::Numeric { .. })
            }
            (LocalType::Float4 | LocalType::Float8, _) => matches!(
                natural,
                LocalType::Float4 | LocalType::Float8 | LocalType::Numeric { .. }
            ) || natural.is_integer(),
            (l, _) => l == natural,
        };

        if ok {
            Ok(())
        } else {
            Err(FdwError::unsupported_type(format!(
                "local type {local} cannot represent remote type {self}"
            )))
        }
    }

    fn is_exact_integer(&self) -> bool {
        matches!(self, RemoteType::Numeric { scale: 0, .. } | RemoteType::Int128)
    }
}

impl fmt::Display for RemoteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteType::SmallInt => write!(f, "SMALLINT"),
            RemoteType::Integer => write!(f, "INTEGER"),
            RemoteType::BigInt => write!(f, "BIGINT"),
            RemoteType::Int128 => write!(f, "INT128"),
            RemoteType::Numeric { precision, scale } => write!(f, "NUMERIC({precision},{scale})"),
            RemoteType::Float => write!(f, "FLOAT"),
            RemoteType::Double => write!(f, "DOUBLE PRECISION"),
            RemoteType::Char(len) => write!(f, "CHAR({len})"),
            RemoteType::Varchar(len) => write!(f, "VARCHAR({len})"),
            RemoteType::Cstring(len) => write!(f, "CSTRING({len})"),
            RemoteType::Date => write!(f, "DATE"),
            RemoteType::Time => write!(f, "TIME"),
            RemoteType::TimeTz => write!(f, "TIME WITH TIME ZONE"),
            RemoteType::Timestamp => write!(f, "TIMESTAMP"),
            RemoteType::TimestampTz => write!(f, "TIMESTAMP WITH TIME ZONE"),
            RemoteType::Boolean => write!(f, "BOOLEAN"),
            RemoteType::Blob { sub_type } => write!(f, "BLOB SUB_TYPE {sub_type}"),
            RemoteType::Array => write!(f, "ARRAY"),
            RemoteType::Unknown(code) => write!(f, "UNKNOWN({code})"),
        }
    }
}

/// Remote server version encoded as `major * 10000 + minor * 100 + patch`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RemoteVersion(pub i32);

impl RemoteVersion {
    pub const V1_5: RemoteVersion = RemoteVersion(10500);
    pub const V2_0: RemoteVersion = RemoteVersion(20000);
    pub const V2_1: RemoteVersion = RemoteVersion(20100);
    pub const V2_5: RemoteVersion = RemoteVersion(20500);
    pub const V3_0: RemoteVersion = RemoteVersion(30000);
    pub const V4_0: RemoteVersion = RemoteVersion(40000);

    pub fn at_least(&self, other: RemoteVersion) -> bool {
        self.0 >= other.0
    }

    /// Remote engines before 3.0 have no BOOLEAN type.
    pub fn has_native_boolean(&self) -> bool {
        self.at_least(Self::V3_0)
    }
}

impl fmt::Display for RemoteVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}",
            self.0 / 10000,
            (self.0 / 100) % 100,
            self.0 % 100
        )
    }
}
