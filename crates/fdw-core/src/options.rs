// SPDX-License-Identifier: Apache-2.0

//! Definition-time options
//!
//! Options arrive from the host catalog as `(name, value)` pairs. Each scope
//! accepts a closed set of names; everything is parsed into typed structs
//! here, so no untyped option map travels further into the engine.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use sqlparser::ast::Statement;
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

use crate::charset::CharsetPolicy;
use crate::error::{FdwError, FdwResult};
use crate::sensitive::Sensitive;

/// Remote default port
pub const DEFAULT_PORT: u16 = 3050;
/// Rows per INSERT round trip unless configured otherwise
pub const DEFAULT_BATCH_SIZE: u32 = 1;

/// Where an option was attached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionScope {
    Server,
    UserMapping,
    Table,
    Column,
}

impl fmt::Display for OptionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OptionScope::Server => "server",
            OptionScope::UserMapping => "user mapping",
            OptionScope::Table => "foreign table",
            OptionScope::Column => "column",
        })
    }
}

/// Every option name the engine recognizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FdwOption {
    Address,
    Port,
    Database,
    Username,
    Password,
    TableName,
    Query,
    ColumnName,
    Updatable,
    Truncatable,
    DisablePushdowns,
    QuoteIdentifiers,
    QuoteIdentifier,
    ImplicitBoolType,
    EstimatedRowCount,
    BatchSize,
    UnmappedCharset,
}

impl FdwOption {
    pub const ALL: &'static [FdwOption] = &[
        FdwOption::Address,
        FdwOption::Port,
        FdwOption::Database,
        FdwOption::Username,
        FdwOption::Password,
        FdwOption::TableName,
        FdwOption::Query,
        FdwOption::ColumnName,
        FdwOption::Updatable,
        FdwOption::Truncatable,
        FdwOption::DisablePushdowns,
        FdwOption::QuoteIdentifiers,
        FdwOption::QuoteIdentifier,
        FdwOption::ImplicitBoolType,
        FdwOption::EstimatedRowCount,
        FdwOption::BatchSize,
        FdwOption::UnmappedCharset,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            FdwOption::Address => "address",
            FdwOption::Port => "port",
            FdwOption::Database => "database",
            FdwOption::Username => "username",
            FdwOption::Password => "password",
            FdwOption::TableName => "table_name",
            FdwOption::Query => "query",
            FdwOption::ColumnName => "column_name",
            FdwOption::Updatable => "updatable",
            FdwOption::Truncatable => "truncatable",
            FdwOption::DisablePushdowns => "disable_pushdowns",
            FdwOption::QuoteIdentifiers => "quote_identifiers",
            FdwOption::QuoteIdentifier => "quote_identifier",
            FdwOption::ImplicitBoolType => "implicit_bool_type",
            FdwOption::EstimatedRowCount => "estimated_row_count",
            FdwOption::BatchSize => "batch_size",
            FdwOption::UnmappedCharset => "unmapped_charset",
        }
    }

    pub fn valid_in(&self, scope: OptionScope) -> bool {
        use FdwOption::*;
        use OptionScope::*;

        match scope {
            Server => matches!(
                self,
                Address
                    | Port
                    | Database
                    | Updatable
                    | Truncatable
                    | DisablePushdowns
                    | QuoteIdentifiers
                    | ImplicitBoolType
                    | BatchSize
                    | UnmappedCharset
            ),
            UserMapping => matches!(self, Username | Password),
            Table => matches!(
                self,
                TableName
                    | Query
                    | Updatable
                    | Truncatable
                    | EstimatedRowCount
                    | QuoteIdentifier
                    | BatchSize
            ),
            Column => matches!(self, ColumnName | QuoteIdentifier | ImplicitBoolType),
        }
    }

    /// Resolves an option name within a scope.
    pub fn lookup(name: &str, scope: OptionScope) -> FdwResult<FdwOption> {
        Self::ALL
            .iter()
            .copied()
            .find(|opt| opt.valid_in(scope) && opt.name() == name)
            .ok_or_else(|| {
                let valid = Self::ALL
                    .iter()
                    .filter(|opt| opt.valid_in(scope))
                    .map(|opt| opt.name())
                    .collect::<Vec<_>>()
                    .join(", ");
                FdwError::config_with_hint(
                    format!("invalid option \"{name}\" for {scope}"),
                    format!("valid options in this context are: {valid}"),
                )
            })
    }
}

impl fmt::Display for FdwOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Walks `(name, value)` pairs, rejecting unknown and repeated names.
fn for_each_option<K, V>(
    scope: OptionScope,
    options: &[(K, V)],
    mut apply: impl FnMut(FdwOption, &str) -> FdwResult<()>,
) -> FdwResult<()>
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut seen = HashSet::new();
    for (name, value) in options {
        let option = FdwOption::lookup(name.as_ref(), scope)?;
        if !seen.insert(option) {
            return Err(FdwError::config(format!(
                "conflicting or redundant options: {option} ('{}')",
                value.as_ref()
            )));
        }
        apply(option, value.as_ref())?;
    }
    Ok(())
}

/// Parses a boolean the way the host catalog spells them.
pub fn parse_bool(option: FdwOption, value: &str) -> FdwResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "on" | "yes" | "1" | "t" => Ok(true),
        "false" | "off" | "no" | "0" | "f" => Ok(false),
        _ => Err(FdwError::config(format!(
            "{option} requires a Boolean value, got '{value}'"
        ))),
    }
}

fn parse_int(option: FdwOption, value: &str, min: i64, max: i64) -> FdwResult<i64> {
    let parsed: i64 = value.trim().parse().map_err(|_| {
        FdwError::config(format!("invalid value for option {option}: '{value}'"))
    })?;
    if parsed < min || parsed > max {
        return Err(FdwError::config(format!(
            "value for option {option} must be between {min} and {max}, got {parsed}"
        )));
    }
    Ok(parsed)
}

fn non_empty(option: FdwOption, value: &str) -> FdwResult<String> {
    if value.trim().is_empty() {
        return Err(FdwError::config(format!("option {option} must not be empty")));
    }
    Ok(value.to_string())
}

/// Checks that a `query` option holds exactly one SELECT.
///
/// Remote-specific syntax the generic parser does not know is accepted as
/// long as it reads as a single SELECT or WITH statement.
pub fn validate_remote_query(query: &str) -> FdwResult<()> {
    let trimmed = query.trim().trim_end_matches(';').trim();
    match Parser::parse_sql(&GenericDialect {}, trimmed) {
        Ok(statements) => {
            if statements.len() != 1 {
                return Err(FdwError::config(
                    "option query must contain exactly one statement",
                ));
            }
            if !matches!(statements[0], Statement::Query(_)) {
                return Err(FdwError::config("option query must be a SELECT statement"));
            }
            Ok(())
        }
        Err(e) => {
            let head = trimmed
                .split_whitespace()
                .next()
                .unwrap_or_default()
                .to_ascii_uppercase();
            if (head == "SELECT" || head == "WITH") && !trimmed.contains(';') {
                tracing::debug!(error = %e, "query option not understood by generic parser, accepting");
                Ok(())
            } else {
                Err(FdwError::config(format!(
                    "option query must be a single SELECT statement: {e}"
                )))
            }
        }
    }
}

/// Server-level options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerOptions {
    pub address: Option<String>,
    pub port: u16,
    pub database: Option<String>,
    pub updatable: Option<bool>,
    pub truncatable: Option<bool>,
    pub disable_pushdowns: bool,
    pub quote_identifiers: Option<bool>,
    pub implicit_bool_type: bool,
    pub batch_size: Option<u32>,
    pub unmapped_charset: CharsetPolicy,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            address: None,
            port: DEFAULT_PORT,
            database: None,
            updatable: None,
            truncatable: None,
            disable_pushdowns: false,
            quote_identifiers: None,
            implicit_bool_type: false,
            batch_size: None,
            unmapped_charset: CharsetPolicy::Error,
        }
    }
}

impl ServerOptions {
    pub fn parse<K: AsRef<str>, V: AsRef<str>>(options: &[(K, V)]) -> FdwResult<Self> {
        let mut out = Self::default();
        for_each_option(OptionScope::Server, options, |option, value| {
            match option {
                FdwOption::Address => out.address = Some(non_empty(option, value)?),
                FdwOption::Port => out.port = parse_int(option, value, 1, 65535)? as u16,
                FdwOption::Database => out.database = Some(non_empty(option, value)?),
                FdwOption::Updatable => out.updatable = Some(parse_bool(option, value)?),
                FdwOption::Truncatable => out.truncatable = Some(parse_bool(option, value)?),
                FdwOption::DisablePushdowns => out.disable_pushdowns = parse_bool(option, value)?,
                FdwOption::QuoteIdentifiers => {
                    out.quote_identifiers = Some(parse_bool(option, value)?)
                }
                FdwOption::ImplicitBoolType => out.implicit_bool_type = parse_bool(option, value)?,
                FdwOption::BatchSize => {
                    out.batch_size = Some(parse_int(option, value, 1, i32::MAX as i64)? as u32)
                }
                FdwOption::UnmappedCharset => out.unmapped_charset = value.parse()?,
                other => return Err(FdwError::internal(format!("option {other} not handled"))),
            }
            Ok(())
        })?;
        Ok(out)
    }

    /// Options as `(name, value)` pairs, defaults omitted.
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        let mut push = |opt: FdwOption, value: String| pairs.push((opt.name().to_string(), value));
        if let Some(address) = &self.address {
            push(FdwOption::Address, address.clone());
        }
        push(FdwOption::Port, self.port.to_string());
        if let Some(database) = &self.database {
            push(FdwOption::Database, database.clone());
        }
        if let Some(updatable) = self.updatable {
            push(FdwOption::Updatable, updatable.to_string());
        }
        if let Some(truncatable) = self.truncatable {
            push(FdwOption::Truncatable, truncatable.to_string());
        }
        push(FdwOption::DisablePushdowns, self.disable_pushdowns.to_string());
        if let Some(quote) = self.quote_identifiers {
            push(FdwOption::QuoteIdentifiers, quote.to_string());
        }
        push(FdwOption::ImplicitBoolType, self.implicit_bool_type.to_string());
        if let Some(batch_size) = self.batch_size {
            push(FdwOption::BatchSize, batch_size.to_string());
        }
        push(FdwOption::UnmappedCharset, self.unmapped_charset.to_string());
        pairs
    }
}

/// User mapping options
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserMappingOptions {
    pub username: Option<String>,
    pub password: Option<Sensitive<String>>,
}

impl UserMappingOptions {
    pub fn parse<K: AsRef<str>, V: AsRef<str>>(options: &[(K, V)]) -> FdwResult<Self> {
        let mut out = Self::default();
        for_each_option(OptionScope::UserMapping, options, |option, value| {
            match option {
                FdwOption::Username => out.username = Some(value.to_string()),
                FdwOption::Password => out.password = Some(Sensitive::from(value)),
                other => return Err(FdwError::internal(format!("option {other} not handled"))),
            }
            Ok(())
        })?;
        Ok(out)
    }
}

/// Foreign table options
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableOptions {
    pub table_name: Option<String>,
    pub query: Option<String>,
    pub updatable: Option<bool>,
    pub truncatable: Option<bool>,
    pub estimated_row_count: Option<u64>,
    pub quote_identifier: Option<bool>,
    pub batch_size: Option<u32>,
}

impl TableOptions {
    pub fn parse<K: AsRef<str>, V: AsRef<str>>(options: &[(K, V)]) -> FdwResult<Self> {
        let mut out = Self::default();
        for_each_option(OptionScope::Table, options, |option, value| {
            match option {
                FdwOption::TableName => out.table_name = Some(non_empty(option, value)?),
                FdwOption::Query => {
                    validate_remote_query(value)?;
                    out.query = Some(value.trim().trim_end_matches(';').trim().to_string());
                }
                FdwOption::Updatable => out.updatable = Some(parse_bool(option, value)?),
                FdwOption::Truncatable => out.truncatable = Some(parse_bool(option, value)?),
                FdwOption::EstimatedRowCount => {
                    out.estimated_row_count = Some(parse_int(option, value, 0, i64::MAX)? as u64)
                }
                FdwOption::QuoteIdentifier => {
                    out.quote_identifier = Some(parse_bool(option, value)?)
                }
                FdwOption::BatchSize => {
                    out.batch_size = Some(parse_int(option, value, 1, i32::MAX as i64)? as u32)
                }
                other => return Err(FdwError::internal(format!("option {other} not handled"))),
            }
            Ok(())
        })?;

        if out.table_name.is_some() && out.query.is_some() {
            return Err(FdwError::config_with_hint(
                "options table_name and query cannot be used together",
                "use either table_name or query, not both",
            ));
        }
        if out.query.is_some() && out.updatable == Some(true) {
            return Err(FdwError::config(
                "a foreign table defined by a query cannot be updatable",
            ));
        }
        Ok(out)
    }
}

/// Column options
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnOptions {
    pub column_name: Option<String>,
    pub quote_identifier: Option<bool>,
    pub implicit_bool_type: bool,
}

impl ColumnOptions {
    pub fn parse<K: AsRef<str>, V: AsRef<str>>(options: &[(K, V)]) -> FdwResult<Self> {
        let mut out = Self::default();
        for_each_option(OptionScope::Column, options, |option, value| {
            match option {
                FdwOption::ColumnName => out.column_name = Some(non_empty(option, value)?),
                FdwOption::QuoteIdentifier => {
                    out.quote_identifier = Some(parse_bool(option, value)?)
                }
                FdwOption::ImplicitBoolType => out.implicit_bool_type = parse_bool(option, value)?,
                other => return Err(FdwError::internal(format!("option {other} not handled"))),
            }
            Ok(())
        })?;
        Ok(out)
    }
}

/// Validates an option list for a scope without keeping the result.
pub fn validate<K: AsRef<str>, V: AsRef<str>>(
    scope: OptionScope,
    options: &[(K, V)],
) -> FdwResult<()> {
    match scope {
        OptionScope::Server => ServerOptions::parse(options).map(|_| ()),
        OptionScope::UserMapping => UserMappingOptions::parse(options).map(|_| ()),
        OptionScope::Table => TableOptions::parse(options).map(|_| ()),
        OptionScope::Column => ColumnOptions::parse(options).map(|_| ()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_option_lists_valid_ones() {
        let err = ServerOptions::parse(&[("hostname", "localhost")]).unwrap_err();
        match err {
            FdwError::Config { message, hint } => {
                assert!(message.contains("hostname"));
                let hint = hint.unwrap();
                assert!(hint.starts_with("valid options in this context are: address, port"));
                assert!(!hint.contains("username"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_option_in_wrong_scope() {
        assert!(TableOptions::parse(&[("address", "localhost")]).is_err());
        assert!(ColumnOptions::parse(&[("table_name", "T")]).is_err());
        assert!(UserMappingOptions::parse(&[("port", "3050")]).is_err());
    }

    #[test]
    fn test_redundant_option() {
        let err = ServerOptions::parse(&[("port", "3050"), ("port", "3051")]).unwrap_err();
        assert!(err.to_string().contains("conflicting or redundant options"));
    }

    #[test]
    fn test_server_options() {
        let opts = ServerOptions::parse(&[
            ("address", "localhost"),
            ("port", "3051"),
            ("database", "/srv/firebird/test.fdb"),
            ("disable_pushdowns", "on"),
            ("batch_size", "20"),
            ("unmapped_charset", "passthrough"),
        ])
        .unwrap();
        assert_eq!(opts.port, 3051);
        assert!(opts.disable_pushdowns);
        assert_eq!(opts.batch_size, Some(20));
        assert_eq!(opts.unmapped_charset, CharsetPolicy::Passthrough);
        assert_eq!(opts.quote_identifiers, None);
    }

    #[test]
    fn test_numeric_bounds() {
        assert!(ServerOptions::parse(&[("port", "0")]).is_err());
        assert!(ServerOptions::parse(&[("port", "65536")]).is_err());
        assert!(ServerOptions::parse(&[("batch_size", "0")]).is_err());
        assert!(TableOptions::parse(&[("estimated_row_count", "-1")]).is_err());
        assert!(TableOptions::parse(&[("batch_size", "ten")]).is_err());
    }

    #[test]
    fn test_table_source_exclusive() {
        let err = TableOptions::parse(&[("table_name", "T"), ("query", "SELECT 1 FROM rdb$database")])
            .unwrap_err();
        assert!(err.to_string().contains("cannot be used together"));
    }

    #[test]
    fn test_query_table_not_updatable() {
        assert!(TableOptions::parse(&[
            ("query", "SELECT id FROM t"),
            ("updatable", "true")
        ])
        .is_err());
        assert!(TableOptions::parse(&[
            ("query", "SELECT id FROM t"),
            ("updatable", "false")
        ])
        .is_ok());
    }

    #[test]
    fn test_query_must_be_single_select() {
        assert!(validate_remote_query("SELECT id, name FROM users WHERE id > 1").is_ok());
        assert!(validate_remote_query("SELECT FIRST 10 id FROM users").is_ok());
        assert!(validate_remote_query("DELETE FROM users").is_err());
        assert!(validate_remote_query("SELECT 1 FROM a; SELECT 2 FROM b").is_err());
    }

    #[test]
    fn test_bool_spellings() {
        for yes in ["true", "on", "YES", "1"] {
            assert!(parse_bool(FdwOption::Updatable, yes).unwrap());
        }
        for no in ["false", "off", "no", "0"] {
            assert!(!parse_bool(FdwOption::Updatable, no).unwrap());
        }
        assert!(parse_bool(FdwOption::Updatable, "maybe").is_err());
    }

    #[test]
    fn test_validate_entry_point() {
        assert!(validate(OptionScope::Column, &[("column_name", "ID"), ("implicit_bool_type", "true")]).is_ok());
        assert!(validate(OptionScope::UserMapping, &[("username", "sysdba"), ("password", "masterkey")]).is_ok());
    }
}
