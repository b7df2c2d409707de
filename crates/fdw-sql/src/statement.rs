// SPDX-License-Identifier: Apache-2.0

//! Statement builder
//!
//! Renders the remote SELECT / INSERT / UPDATE / DELETE text for a foreign
//! table. Values are always bound as positional `?` parameters; callers bind
//! them in the column order they passed in, with the row identifier last.

use fdw_core::{BoolSentinel, ConversionMode, FdwError, FdwResult};

use crate::compiler::{CompiledFragment, ParamSlot};
use crate::context::SqlContext;
use crate::ident::RemoteIdent;

/// Remote row identifier pseudo column.
pub const ROW_ID_COLUMN: &str = "RDB$DB_KEY";

/// One-row system relation used to build multi-row INSERT ... SELECT.
const SINGLETON_RELATION: &str = "RDB$DATABASE";

/// A rendered SELECT and the layout of its result columns
#[derive(Debug, Clone, PartialEq)]
pub struct SelectStatement {
    pub sql: String,
    /// Table column positions, in result order.
    pub columns: Vec<usize>,
    /// The row identifier follows the table columns.
    pub with_row_id: bool,
    /// Bound parameters in placeholder order, across all fragments.
    pub params: Vec<ParamSlot>,
}

fn idents(ctx: &SqlContext<'_>, columns: &[usize]) -> FdwResult<Vec<RemoteIdent>> {
    columns
        .iter()
        .map(|i| {
            ctx.column_ident(*i)
                .ok_or_else(|| FdwError::internal(format!("column {i} out of range")))
        })
        .collect()
}

fn writable_target(ctx: &SqlContext<'_>) -> FdwResult<RemoteIdent> {
    ctx.table_ident().ok_or_else(|| {
        FdwError::unsupported(format!(
            "modifying foreign table \"{}\" defined by a remote query",
            ctx.table.name
        ))
    })
}

fn join_idents(idents: &[RemoteIdent]) -> String {
    idents
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn returning_clause(ctx: &SqlContext<'_>, returning: &[usize]) -> FdwResult<String> {
    if returning.is_empty() {
        return Ok(String::new());
    }
    Ok(format!("\n RETURNING {}", join_idents(&idents(ctx, returning)?)))
}

/// `SELECT <columns> FROM <target> [WHERE <fragments>]`
pub fn select(
    ctx: &SqlContext<'_>,
    columns: &[usize],
    fragments: &[CompiledFragment],
    with_row_id: bool,
) -> FdwResult<SelectStatement> {
    let mut items = Vec::with_capacity(columns.len() + 1);
    for &index in columns {
        let ident = ctx
            .column_ident(index)
            .ok_or_else(|| FdwError::internal(format!("column {index} out of range")))?;
        // Normalize any non-zero sentinel to 1 so the value reads back as
        // a canonical boolean.
        let item = match ctx.mode(index) {
            ConversionMode::EmulatedBool(BoolSentinel::Integer)
                if !ctx.version.has_native_boolean() =>
            {
                format!("CASE WHEN {ident} <> 0 THEN 1 ELSE {ident} END AS {ident}")
            }
            _ => ident.to_string(),
        };
        items.push(item);
    }
    if with_row_id {
        if ctx.table.is_query() {
            return Err(FdwError::unsupported(format!(
                "row identifiers for foreign table \"{}\" defined by a remote query",
                ctx.table.name
            )));
        }
        items.push(ROW_ID_COLUMN.to_string());
    }
    if items.is_empty() {
        items.push("NULL".to_string());
    }

    let mut sql = format!("SELECT {}\n  FROM {}", items.join(", "), ctx.from_target());
    let mut params = Vec::new();
    if !fragments.is_empty() {
        let conditions = fragments
            .iter()
            .map(|f| f.sql.as_str())
            .collect::<Vec<_>>()
            .join(" AND ");
        sql.push_str("\n WHERE ");
        sql.push_str(&conditions);
        params.extend(fragments.iter().flat_map(|f| f.params.iter().copied()));
    }

    Ok(SelectStatement {
        sql,
        columns: columns.to_vec(),
        with_row_id,
        params,
    })
}

/// Re-reads one row by identifier: `SELECT <columns> FROM <t> WHERE RDB$DB_KEY = ?`
pub fn select_by_row_id(ctx: &SqlContext<'_>, columns: &[usize]) -> FdwResult<String> {
    let target = writable_target(ctx)?;
    let cols = if columns.is_empty() {
        "NULL".to_string()
    } else {
        join_idents(&idents(ctx, columns)?)
    };
    Ok(format!("SELECT {cols}\n  FROM {target}\n WHERE {ROW_ID_COLUMN} = ?"))
}

/// `SELECT COUNT(*) FROM <target>`
pub fn count(ctx: &SqlContext<'_>) -> String {
    format!("SELECT COUNT(*) FROM {}", ctx.from_target())
}

/// INSERT of `rows` rows over `columns`.
///
/// More than one row renders as `INSERT ... SELECT ... UNION ALL`, one
/// select arm per row.
pub fn insert(ctx: &SqlContext<'_>, columns: &[usize], rows: usize, returning: &[usize]) -> FdwResult<String> {
    let target = writable_target(ctx)?;
    if rows == 0 {
        return Err(FdwError::internal("INSERT of zero rows"));
    }
    if rows > 1 && !returning.is_empty() {
        return Err(FdwError::internal("RETURNING requires single-row INSERT"));
    }

    let mut sql = if columns.is_empty() {
        if rows > 1 {
            return Err(FdwError::internal("DEFAULT VALUES cannot be batched"));
        }
        format!("INSERT INTO {target} DEFAULT VALUES")
    } else {
        let cols = join_idents(&idents(ctx, columns)?);
        if rows == 1 {
            format!("INSERT INTO {target} ({cols})\n VALUES ({})", placeholders(columns.len()))
        } else {
            let arm = format!("SELECT {} FROM {SINGLETON_RELATION}", placeholders(columns.len()));
            format!(
                "INSERT INTO {target} ({cols})\n {}",
                vec![arm; rows].join("\n UNION ALL ")
            )
        }
    };
    sql.push_str(&returning_clause(ctx, returning)?);
    Ok(sql)
}

/// `UPDATE <t> SET c = ?, ... WHERE RDB$DB_KEY = ?`
pub fn update(ctx: &SqlContext<'_>, columns: &[usize], returning: &[usize]) -> FdwResult<String> {
    let target = writable_target(ctx)?;
    if columns.is_empty() {
        return Err(FdwError::internal("UPDATE without target columns"));
    }
    let sets = idents(ctx, columns)?
        .iter()
        .map(|c| format!("{c} = ?"))
        .collect::<Vec<_>>()
        .join(", ");
    let mut sql = format!("UPDATE {target} SET {sets}\n WHERE {ROW_ID_COLUMN} = ?");
    sql.push_str(&returning_clause(ctx, returning)?);
    Ok(sql)
}

/// `DELETE FROM <t> WHERE RDB$DB_KEY = ?`
pub fn delete(ctx: &SqlContext<'_>, returning: &[usize]) -> FdwResult<String> {
    let target = writable_target(ctx)?;
    let mut sql = format!("DELETE FROM {target}\n WHERE {ROW_ID_COLUMN} = ?");
    sql.push_str(&returning_clause(ctx, returning)?);
    Ok(sql)
}

/// The remote has no TRUNCATE; an unqualified DELETE stands in.
pub fn truncate(ctx: &SqlContext<'_>) -> FdwResult<String> {
    Ok(format!("DELETE FROM {}", writable_target(ctx)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile;
    use crate::expr::Expr;
    use fdw_core::{ColumnDescriptor, ForeignTable, LocalType, RemoteVersion, ServerDescriptor};

    fn server() -> ServerDescriptor {
        ServerDescriptor::new("fb", &[("database", "/data/test.fdb")]).unwrap()
    }

    fn table() -> ForeignTable {
        ForeignTable::new(
            "orders",
            &[("table_name", "Orders")],
            vec![
                ColumnDescriptor::new("id", LocalType::Int4),
                ColumnDescriptor::new("note", LocalType::Text),
                ColumnDescriptor::new("paid", LocalType::Bool)
                    .with_options(&[("implicit_bool_type", "true")])
                    .unwrap(),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_select_with_where_and_row_id() {
        let (t, s) = (table(), server());
        let ctx = SqlContext::new(&t, &s, RemoteVersion::V3_0);
        let fragment = compile(&ctx, &Expr::eq(Expr::col(0), Expr::param(0, LocalType::Int4))).unwrap();
        let stmt = select(&ctx, &[0, 1], &[fragment], true).unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT ID, NOTE, RDB$DB_KEY\n  FROM \"Orders\"\n WHERE (ID = ?)"
        );
        assert_eq!(stmt.params, vec![ParamSlot { index: 0, ty: LocalType::Int4 }]);
    }

    #[test]
    fn test_select_normalizes_emulated_booleans_before_v3() {
        let (t, s) = (table(), server());
        let ctx = SqlContext::new(&t, &s, RemoteVersion::V2_5);
        let stmt = select(&ctx, &[2], &[], false).unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT CASE WHEN PAID <> 0 THEN 1 ELSE PAID END AS PAID\n  FROM \"Orders\""
        );
        let ctx = SqlContext::new(&t, &s, RemoteVersion::V3_0);
        assert_eq!(select(&ctx, &[2], &[], false).unwrap().sql, "SELECT PAID\n  FROM \"Orders\"");
    }

    #[test]
    fn test_select_nothing_and_query_source() {
        let s = server();
        let t = ForeignTable::new(
            "recent",
            &[("query", "SELECT id FROM orders")],
            vec![ColumnDescriptor::new("id", LocalType::Int4)],
        )
        .unwrap();
        let ctx = SqlContext::new(&t, &s, RemoteVersion::V3_0);
        assert_eq!(
            select(&ctx, &[], &[], false).unwrap().sql,
            "SELECT NULL\n  FROM (SELECT id FROM orders)"
        );
        assert!(select(&ctx, &[0], &[], true).is_err());
        assert!(matches!(
            insert(&ctx, &[0], 1, &[]),
            Err(FdwError::UnsupportedOperation { .. })
        ));
        assert_eq!(count(&ctx), "SELECT COUNT(*) FROM (SELECT id FROM orders)");
    }

    #[test]
    fn test_insert_forms() {
        let (t, s) = (table(), server());
        let ctx = SqlContext::new(&t, &s, RemoteVersion::V3_0);
        assert_eq!(
            insert(&ctx, &[0, 1], 1, &[]).unwrap(),
            "INSERT INTO \"Orders\" (ID, NOTE)\n VALUES (?, ?)"
        );
        assert_eq!(
            insert(&ctx, &[0], 2, &[]).unwrap(),
            "INSERT INTO \"Orders\" (ID)\n SELECT ? FROM RDB$DATABASE\n UNION ALL SELECT ? FROM RDB$DATABASE"
        );
        assert_eq!(
            insert(&ctx, &[], 1, &[0]).unwrap(),
            "INSERT INTO \"Orders\" DEFAULT VALUES\n RETURNING ID"
        );
        assert!(insert(&ctx, &[0], 2, &[0]).is_err());
    }

    #[test]
    fn test_update_delete_truncate() {
        let (t, s) = (table(), server());
        let ctx = SqlContext::new(&t, &s, RemoteVersion::V3_0);
        assert_eq!(
            update(&ctx, &[1], &[0, 1]).unwrap(),
            "UPDATE \"Orders\" SET NOTE = ?\n WHERE RDB$DB_KEY = ?\n RETURNING ID, NOTE"
        );
        assert_eq!(delete(&ctx, &[]).unwrap(), "DELETE FROM \"Orders\"\n WHERE RDB$DB_KEY = ?");
        assert_eq!(truncate(&ctx).unwrap(), "DELETE FROM \"Orders\"");
        assert_eq!(
            select_by_row_id(&ctx, &[0]).unwrap(),
            "SELECT ID\n  FROM \"Orders\"\n WHERE RDB$DB_KEY = ?"
        );
    }
}
