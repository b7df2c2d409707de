// SPDX-License-Identifier: Apache-2.0

//! Schema import
//!
//! Reflects remote relations into local foreign table definitions. Output
//! is ordered by remote relation name, so importing an unchanged remote
//! schema twice yields identical definitions.

use std::collections::HashSet;
use std::fmt::Write as _;

use serde::Serialize;

use fdw_core::{
    ColumnDescriptor, FdwError, FdwResult, ForeignTable, LocalType, RemoteType, RemoteValue, ServerDescriptor,
    UserMapping,
};
use fdw_sql::catalog::{self, CatalogColumn};
use fdw_sql::ident::{import_name, quote_local};

use super::types::NestLevel;
use crate::engine::ConnectionManager;

/// Longest identifier the host accepts, in bytes.
pub const MAX_IDENTIFIER_LENGTH: usize = 63;

/// Which remote relations to import
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ImportFilter {
    #[default]
    All,
    LimitTo(Vec<String>),
    Except(Vec<String>),
}

impl ImportFilter {
    /// Names may be given in either their remote or their imported spelling.
    fn accepts(&self, remote: &str, local: &str) -> bool {
        let listed = |names: &[String]| names.iter().any(|n| n == remote || n == local);
        match self {
            ImportFilter::All => true,
            ImportFilter::LimitTo(names) => listed(names),
            ImportFilter::Except(names) => !listed(names),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportOptions {
    pub import_not_null: bool,
    pub import_defaults: bool,
    pub updatable: Option<bool>,
    pub verbose: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            import_not_null: true,
            import_defaults: false,
            updatable: None,
            verbose: false,
        }
    }
}

impl ImportOptions {
    pub fn parse<K: AsRef<str>, V: AsRef<str>>(options: &[(K, V)]) -> FdwResult<Self> {
        let mut out = Self::default();
        let mut seen = HashSet::new();
        for (name, value) in options {
            let name = name.as_ref();
            if !seen.insert(name) {
                return Err(FdwError::config(format!(
                    "conflicting or redundant options: {name} ('{}')",
                    value.as_ref()
                )));
            }
            let flag = parse_flag(name, value.as_ref())?;
            match name {
                "import_not_null" => out.import_not_null = flag,
                "import_defaults" => out.import_defaults = flag,
                "updatable" => out.updatable = Some(flag),
                "verbose" => out.verbose = flag,
                other => {
                    return Err(FdwError::config_with_hint(
                        format!("invalid option \"{other}\" for IMPORT FOREIGN SCHEMA"),
                        "valid options in this context are: import_not_null, import_defaults, updatable, verbose",
                    ))
                }
            }
        }
        Ok(out)
    }
}

fn parse_flag(name: &str, value: &str) -> FdwResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "on" | "yes" | "1" | "t" => Ok(true),
        "false" | "off" | "no" | "0" | "f" => Ok(false),
        _ => Err(FdwError::config(format!(
            "invalid value for option \"{name}\": \"{value}\""
        ))),
    }
}

/// One imported column
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnDefinition {
    pub name: String,
    pub remote_name: String,
    pub quote_identifier: bool,
    pub local_type: LocalType,
    pub remote_type: RemoteType,
    pub not_null: bool,
    pub default: Option<String>,
    pub generated: bool,
}

/// One imported foreign table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableDefinition {
    pub name: String,
    pub remote_name: String,
    pub quote_identifier: bool,
    pub updatable: Option<bool>,
    pub columns: Vec<ColumnDefinition>,
}

impl TableDefinition {
    fn table_options(&self) -> Vec<(&'static str, &'static str)> {
        let mut options = Vec::new();
        if self.updatable == Some(false) {
            options.push(("updatable", "false"));
        }
        if self.quote_identifier {
            options.push(("quote_identifier", "true"));
        }
        options
    }

    /// Renders the `CREATE FOREIGN TABLE` statement for this definition.
    pub fn to_ddl(&self, schema: &str, server: &str) -> String {
        let mut ddl = format!(
            "CREATE FOREIGN TABLE {}.{} (\n",
            quote_local(schema),
            quote_local(&self.name)
        );
        let count = self.columns.len();
        for (i, column) in self.columns.iter().enumerate() {
            let _ = write!(ddl, "\t{} {}", quote_local(&column.name), column.local_type);
            if column.quote_identifier {
                ddl.push_str(" OPTIONS (quote_identifier 'true')");
            }
            if let Some(default) = &column.default {
                let _ = write!(ddl, " DEFAULT {default}");
            }
            if column.not_null {
                ddl.push_str(" NOT NULL");
            }
            ddl.push_str(if i + 1 < count { ",\n" } else { "\n" });
        }
        let _ = write!(ddl, ") SERVER {}", quote_local(server));

        let options = self.table_options();
        if !options.is_empty() {
            let rendered = options
                .iter()
                .map(|(name, value)| format!("\t{name} '{value}'"))
                .collect::<Vec<_>>()
                .join(",\n");
            let _ = write!(ddl, "\nOPTIONS(\n{rendered}\n)");
        }
        ddl
    }

    /// Builds the descriptor the host would create from [`Self::to_ddl`].
    pub fn to_foreign_table(&self) -> FdwResult<ForeignTable> {
        let columns = self
            .columns
            .iter()
            .map(|c| {
                let options: &[(&str, &str)] = if c.quote_identifier {
                    &[("quote_identifier", "true")]
                } else {
                    &[]
                };
                let mut column = ColumnDescriptor::new(&c.name, c.local_type)
                    .with_options(options)?
                    .with_remote_type(c.remote_type);
                if c.not_null {
                    column = column.not_null();
                }
                if c.generated {
                    column = column.generated();
                }
                Ok(column)
            })
            .collect::<FdwResult<Vec<_>>>()?;
        ForeignTable::new(&self.name, &self.table_options(), columns)
    }
}

/// A remote relation left out of the import
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedRelation {
    pub remote_name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImportReport {
    pub tables: Vec<TableDefinition>,
    pub skipped: Vec<SkippedRelation>,
}

fn check_length(kind: &str, name: &str) -> Result<(), String> {
    if name.len() > MAX_IDENTIFIER_LENGTH {
        Err(format!(
            "{kind} name \"{name}\" is longer than {MAX_IDENTIFIER_LENGTH} bytes"
        ))
    } else {
        Ok(())
    }
}

/// Maps one remote relation; `Err` carries the reason it was skipped.
fn build_definition(
    remote_name: &str,
    columns: Vec<CatalogColumn>,
    options: &ImportOptions,
) -> Result<TableDefinition, String> {
    check_length("relation", remote_name)?;
    let table_name = import_name(remote_name);

    let mut defs = Vec::with_capacity(columns.len());
    for column in columns {
        check_length("column", &column.name)?;
        let remote_type = RemoteType::from_catalog(&column.metadata);
        let local_type = remote_type
            .local_type()
            .map_err(|e| format!("column \"{}\": {e}", column.name))?;
        let name = import_name(&column.name);
        let default = if options.import_defaults && !column.computed {
            column.default_expression().map(str::to_string)
        } else {
            None
        };
        defs.push(ColumnDefinition {
            name: name.local,
            quote_identifier: name.quote_identifier,
            local_type,
            remote_type,
            not_null: options.import_not_null && column.not_null,
            default,
            generated: column.computed,
            remote_name: column.name,
        });
    }

    Ok(TableDefinition {
        name: table_name.local,
        remote_name: remote_name.to_string(),
        quote_identifier: table_name.quote_identifier,
        updatable: options.updatable,
        columns: defs,
    })
}

/// Imports the remote schema visible through `(server, user)`.
pub async fn import_schema(
    manager: &ConnectionManager,
    server: &ServerDescriptor,
    user: &UserMapping,
    filter: &ImportFilter,
    options: &ImportOptions,
    nest_level: NestLevel,
) -> FdwResult<ImportReport> {
    let session = manager.acquire(server, user, nest_level).await?;
    let relations = manager.execute(&session, catalog::RELATIONS_QUERY, &[]).await?;
    let mut names = catalog::relation_names(&relations.rows)?;
    names.sort();
    names.dedup();

    let mut report = ImportReport::default();
    for remote_name in names {
        if !filter.accepts(&remote_name, &import_name(&remote_name).local) {
            continue;
        }
        let result = manager
            .execute(
                &session,
                catalog::COLUMNS_QUERY,
                &[RemoteValue::Text(remote_name.clone())],
            )
            .await?;
        let columns = result
            .rows
            .iter()
            .map(|row| CatalogColumn::from_row(row))
            .collect::<FdwResult<Vec<_>>>()?;

        match build_definition(&remote_name, columns, options) {
            Ok(table) => {
                if options.verbose {
                    tracing::info!(relation = %remote_name, table = %table.name, "importing foreign table");
                }
                report.tables.push(table);
            }
            Err(reason) => {
                tracing::warn!(relation = %remote_name, reason = %reason, "skipping remote relation");
                report.skipped.push(SkippedRelation { remote_name, reason });
            }
        }
    }
    Ok(report)
}
