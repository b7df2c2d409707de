// SPDX-License-Identifier: Apache-2.0

//! Server, user mapping, table and column descriptors
//!
//! Descriptors are built once from the host catalog and are read-only while
//! statements execute. Constructors validate everything that can be checked
//! without contacting the remote, so configuration and type errors surface
//! at definition time.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::charset::CharsetPolicy;
use crate::error::{FdwError, FdwResult};
use crate::options::{
    ColumnOptions, ServerOptions, TableOptions, UserMappingOptions, DEFAULT_BATCH_SIZE,
    DEFAULT_PORT,
};
use crate::types::{LocalType, RemoteType, RemoteVersion};

/// Identity of a foreign server definition
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServerId(pub String);

/// Foreign server descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerDescriptor {
    pub id: ServerId,
    pub options: ServerOptions,
}

impl ServerDescriptor {
    pub fn new<K: AsRef<str>, V: AsRef<str>>(
        name: impl Into<String>,
        options: &[(K, V)],
    ) -> FdwResult<Self> {
        Ok(Self {
            id: ServerId(name.into()),
            options: ServerOptions::parse(options)?,
        })
    }

    pub fn name(&self) -> &str {
        &self.id.0
    }

    /// Connection string in the remote's `host[/port]:database` form.
    pub fn db_path(&self) -> String {
        let database = self.options.database.as_deref().unwrap_or_default();
        match &self.options.address {
            Some(address) if self.options.port != DEFAULT_PORT => {
                format!("{address}/{}:{database}", self.options.port)
            }
            Some(address) => format!("{address}:{database}"),
            None => database.to_string(),
        }
    }

    /// True when the server runs on this host, which makes startup cheaper.
    pub fn is_local(&self) -> bool {
        matches!(
            self.options.address.as_deref(),
            Some("localhost") | Some("127.0.0.1")
        )
    }

    pub fn charset_policy(&self) -> CharsetPolicy {
        self.options.unmapped_charset
    }
}

/// Local user plus the remote credentials mapped to it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserMapping {
    pub local_user: String,
    pub options: UserMappingOptions,
}

impl UserMapping {
    pub fn new<K: AsRef<str>, V: AsRef<str>>(
        local_user: impl Into<String>,
        options: &[(K, V)],
    ) -> FdwResult<Self> {
        Ok(Self {
            local_user: local_user.into(),
            options: UserMappingOptions::parse(options)?,
        })
    }
}

/// Remote data source of a foreign table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteSource {
    Table(String),
    Query(String),
}

/// Boolean sentinel representation for emulated booleans
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoolSentinel {
    /// `0` / `1` in an integer column
    Integer,
    /// `'0'` / `'1'` in a single character column
    Char,
}

/// How values of a column cross the bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionMode {
    Plain,
    EmulatedBool(BoolSentinel),
    Uuid,
}

/// Column descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    pub local_type: LocalType,
    pub options: ColumnOptions,
    /// Known when the column came from schema import.
    pub remote_type: Option<RemoteType>,
    /// Remote values are computed; never written.
    pub generated: bool,
    pub nullable: bool,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, local_type: LocalType) -> Self {
        Self {
            name: name.into(),
            local_type,
            options: ColumnOptions::default(),
            remote_type: None,
            generated: false,
            nullable: true,
        }
    }

    pub fn with_options<K: AsRef<str>, V: AsRef<str>>(mut self, options: &[(K, V)]) -> FdwResult<Self> {
        self.options = ColumnOptions::parse(options)?;
        Ok(self)
    }

    pub fn with_remote_type(mut self, remote_type: RemoteType) -> Self {
        self.remote_type = Some(remote_type);
        self
    }

    pub fn generated(mut self) -> Self {
        self.generated = true;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Explicit remote name from `column_name`, if any.
    pub fn explicit_remote_name(&self) -> Option<&str> {
        self.options.column_name.as_deref()
    }

    /// Conversion mode given the server settings and remote version.
    pub fn conversion_mode(&self, server: &ServerOptions, version: RemoteVersion) -> ConversionMode {
        match self.local_type {
            LocalType::Uuid => ConversionMode::Uuid,
            LocalType::Bool => {
                let emulated = self.options.implicit_bool_type
                    || (server.implicit_bool_type && !version.has_native_boolean())
                    || matches!(
                        self.remote_type,
                        Some(RemoteType::SmallInt | RemoteType::Integer | RemoteType::BigInt | RemoteType::Char(1))
                    );
                if !emulated {
                    ConversionMode::Plain
                } else if self.remote_type == Some(RemoteType::Char(1)) {
                    ConversionMode::EmulatedBool(BoolSentinel::Char)
                } else {
                    ConversionMode::EmulatedBool(BoolSentinel::Integer)
                }
            }
            _ => ConversionMode::Plain,
        }
    }

    fn validate(&self) -> FdwResult<()> {
        if let Some(remote_type) = self.remote_type {
            remote_type.check_local(self.local_type, self.options.implicit_bool_type)?;
        }
        Ok(())
    }
}

/// Foreign table descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignTable {
    pub name: String,
    pub source: RemoteSource,
    pub columns: Vec<ColumnDescriptor>,
    pub options: TableOptions,
}

impl ForeignTable {
    pub fn new<K: AsRef<str>, V: AsRef<str>>(
        name: impl Into<String>,
        options: &[(K, V)],
        columns: Vec<ColumnDescriptor>,
    ) -> FdwResult<Self> {
        let name = name.into();
        let options = TableOptions::parse(options)?;

        let source = match (&options.query, &options.table_name) {
            (Some(query), _) => RemoteSource::Query(query.clone()),
            (None, Some(table)) => RemoteSource::Table(table.clone()),
            (None, None) => RemoteSource::Table(name.clone()),
        };

        let mut seen = HashSet::new();
        for column in &columns {
            if !seen.insert(column.name.as_str()) {
                return Err(FdwError::config(format!(
                    "column \"{}\" specified more than once",
                    column.name
                )));
            }
            column.validate()?;
        }

        Ok(Self {
            name,
            source,
            columns,
            options,
        })
    }

    pub fn is_query(&self) -> bool {
        matches!(self.source, RemoteSource::Query(_))
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Table options merged over server options.
    pub fn effective(&self, server: &ServerDescriptor) -> EffectiveOptions {
        let s = &server.options;
        let t = &self.options;
        EffectiveOptions {
            updatable: !self.is_query() && t.updatable.or(s.updatable).unwrap_or(true),
            truncatable: t.truncatable.or(s.truncatable).unwrap_or(true),
            batch_size: t.batch_size.or(s.batch_size).unwrap_or(DEFAULT_BATCH_SIZE),
            disable_pushdowns: s.disable_pushdowns,
            quote_identifier: t.quote_identifier.or(s.quote_identifiers),
            estimated_row_count: t.estimated_row_count,
        }
    }
}

/// Effective per-table settings after override resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectiveOptions {
    pub updatable: bool,
    pub truncatable: bool,
    pub batch_size: u32,
    pub disable_pushdowns: bool,
    /// Table-level quoting default, falling back to the server's.
    pub quote_identifier: Option<bool>,
    pub estimated_row_count: Option<u64>,
}
