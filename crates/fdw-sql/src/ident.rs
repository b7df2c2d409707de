// SPDX-License-Identifier: Apache-2.0

//! Remote identifier resolution and quoting
//!
//! The remote folds unquoted identifiers to upper case while the host folds
//! them to lower case. A remote name is emitted unquoted only when doing so
//! resolves to exactly the same name on the remote.

use std::fmt;

use fdw_core::{ColumnDescriptor, ForeignTable, RemoteSource};

/// Words the remote will not accept as unquoted identifiers
const RESERVED_WORDS: &[&str] = &[
    "ADD", "ADMIN", "ALL", "ALTER", "AND", "ANY", "AS", "AT", "AVG", "BEGIN", "BETWEEN", "BIGINT",
    "BIT_LENGTH", "BLOB", "BOOLEAN", "BOTH", "BY", "CASE", "CAST", "CHAR", "CHARACTER",
    "CHAR_LENGTH", "CHECK", "CLOSE", "COLLATE", "COLUMN", "COMMIT", "CONNECT", "CONSTRAINT",
    "COUNT", "CREATE", "CROSS", "CURRENT", "CURRENT_DATE", "CURRENT_ROLE", "CURRENT_TIME",
    "CURRENT_TIMESTAMP", "CURRENT_USER", "CURSOR", "DATE", "DAY", "DEC", "DECIMAL", "DECLARE",
    "DEFAULT", "DELETE", "DELETING", "DISCONNECT", "DISTINCT", "DOUBLE", "DROP", "ELSE", "END",
    "ESCAPE", "EXECUTE", "EXISTS", "EXTERNAL", "EXTRACT", "FALSE", "FETCH", "FILTER", "FLOAT",
    "FOR", "FOREIGN", "FROM", "FULL", "FUNCTION", "GDSCODE", "GLOBAL", "GRANT", "GROUP",
    "HAVING", "HOUR", "IN", "INDEX", "INNER", "INSENSITIVE", "INSERT", "INSERTING", "INT",
    "INTEGER", "INTO", "IS", "JOIN", "LEADING", "LEFT", "LIKE", "LONG", "LOWER", "MAX",
    "MAXIMUM_SEGMENT", "MERGE", "MIN", "MINUTE", "MONTH", "NATIONAL", "NATURAL", "NCHAR", "NO",
    "NOT", "NULL", "NUMERIC", "OCTET_LENGTH", "OF", "ON", "ONLY", "OPEN", "OR", "ORDER", "OUTER",
    "PARAMETER", "PLAN", "POSITION", "POST_EVENT", "PRECISION", "PRIMARY", "PROCEDURE",
    "RDB$DB_KEY", "REAL", "RECORD_VERSION", "RECREATE", "RECURSIVE", "REFERENCES", "RELEASE",
    "RETURNING_VALUES", "RETURNS", "REVOKE", "RIGHT", "ROLLBACK", "ROW_COUNT", "ROWS",
    "SAVEPOINT", "SECOND", "SELECT", "SENSITIVE", "SET", "SIMILAR", "SMALLINT", "SOME",
    "SQLCODE", "SQLSTATE", "START", "SUM", "TABLE", "THEN", "TIME", "TIMESTAMP", "TO",
    "TRAILING", "TRIGGER", "TRIM", "TRUE", "UNION", "UNIQUE", "UNKNOWN", "UPDATE", "UPDATING",
    "UPPER", "USER", "USING", "VALUE", "VALUES", "VARCHAR", "VARIABLE", "VARYING", "VIEW",
    "WHEN", "WHERE", "WHILE", "WITH", "YEAR",
];

pub fn is_reserved(name: &str) -> bool {
    RESERVED_WORDS.iter().any(|w| w.eq_ignore_ascii_case(name))
}

/// True when `name` can be written unquoted and still resolve to itself.
pub fn is_plain(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(|c| c.is_ascii_uppercase())
        && chars.all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_' || c == '$')
        && !is_reserved(name)
}

/// Remote default case folding for unquoted identifiers.
pub fn fold_upper(name: &str) -> String {
    name.to_uppercase()
}

/// A remote identifier together with its quoting decision
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemoteIdent {
    pub name: String,
    pub quoted: bool,
}

impl RemoteIdent {
    pub fn plain(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            quoted: false,
        }
    }

    pub fn quoted(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            quoted: true,
        }
    }

    /// Resolves a remote identifier.
    ///
    /// Precedence: `policy` (explicit per-object option, else inherited
    /// table or server default), then the case heuristic. Without an
    /// explicit remote name the local name stands in, folded to upper case
    /// unless quoting was requested.
    pub fn resolve(local_name: &str, explicit: Option<&str>, policy: Option<bool>) -> Self {
        match (policy, explicit) {
            (Some(true), Some(name)) => Self::quoted(name),
            (Some(true), None) => Self::quoted(local_name),
            (Some(false), Some(name)) => Self::plain(name),
            (Some(false), None) => Self::plain(local_name),
            (None, Some(name)) => Self {
                name: name.to_string(),
                quoted: !is_plain(name),
            },
            (None, None) => {
                let folded = fold_upper(local_name);
                let quoted = !is_plain(&folded);
                Self {
                    name: folded,
                    quoted,
                }
            }
        }
    }
}

impl RemoteIdent {
    /// Name as stored in the remote catalog: unquoted identifiers are
    /// folded to upper case by the remote.
    pub fn stored_name(&self) -> String {
        if self.quoted {
            self.name.clone()
        } else {
            fold_upper(&self.name)
        }
    }
}

impl fmt::Display for RemoteIdent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.quoted {
            write!(f, "\"{}\"", self.name.replace('"', "\"\""))
        } else {
            f.write_str(&self.name)
        }
    }
}

/// Remote identifier of a column; `table_default` is the inherited policy.
pub fn column_ident(column: &ColumnDescriptor, table_default: Option<bool>) -> RemoteIdent {
    RemoteIdent::resolve(
        &column.name,
        column.explicit_remote_name(),
        column.options.quote_identifier.or(table_default),
    )
}

/// Remote identifier of a table-backed foreign table, `None` for queries.
pub fn table_ident(table: &ForeignTable, policy: Option<bool>) -> Option<RemoteIdent> {
    match &table.source {
        RemoteSource::Table(name) if table.options.table_name.is_some() => {
            Some(RemoteIdent::resolve(&table.name, Some(name), policy))
        }
        RemoteSource::Table(_) => Some(RemoteIdent::resolve(&table.name, None, policy)),
        RemoteSource::Query(_) => None,
    }
}

/// Local name for an imported remote identifier.
///
/// Plain upper-case names come back in the host's lower case; anything else
/// keeps its exact spelling and must be marked with `quote_identifier`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportedName {
    pub local: String,
    pub quote_identifier: bool,
}

pub fn import_name(remote: &str) -> ImportedName {
    if is_plain(remote) {
        ImportedName {
            local: remote.to_lowercase(),
            quote_identifier: false,
        }
    } else {
        ImportedName {
            local: remote.to_string(),
            quote_identifier: true,
        }
    }
}

/// Host-side identifier rendering (host folds to lower case).
pub fn quote_local(name: &str) -> String {
    let simple = name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_lowercase() || c == '_')
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '$');
    if simple && !is_reserved(name) {
        name.to_string()
    } else {
        format!("\"{}\"", name.replace('"', "\"\""))
    }
}
