// SPDX-License-Identifier: Apache-2.0

//! TRUNCATE for foreign tables.
//!
//! Every rejection happens before any modifying remote call. Option and
//! flag checks run before a session is even acquired; the only remote
//! statement before the deletes is the foreign key dependency lookup.

use fdw_core::{FdwError, FdwResult, RemoteValue};
use fdw_sql::{catalog, statement};

use super::types::{ForeignRelation, NestLevel};
use crate::engine::ConnectionManager;

/// Options of the host TRUNCATE statement
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TruncateRequest {
    pub cascade: bool,
    pub restart_identity: bool,
    pub nest_level: NestLevel,
}

fn check_options(relation: &ForeignRelation, request: &TruncateRequest) -> FdwResult<()> {
    let table = &relation.table;
    if table.is_query() {
        return Err(FdwError::unsupported(format!(
            "TRUNCATE on foreign table \"{}\" defined by a remote query",
            table.name
        )));
    }
    if !table.effective(&relation.server).truncatable {
        return Err(FdwError::unsupported(format!(
            "TRUNCATE on foreign table \"{}\", which is not truncatable",
            table.name
        )));
    }
    if request.cascade {
        return Err(FdwError::unsupported("TRUNCATE ... CASCADE"));
    }
    if request.restart_identity {
        return Err(FdwError::unsupported("TRUNCATE ... RESTART IDENTITY"));
    }
    Ok(())
}

fn dependent_count(value: Option<&RemoteValue>) -> FdwResult<i64> {
    match value {
        Some(RemoteValue::Integer(n)) => Ok(*n),
        Some(RemoteValue::Int128(n)) => {
            i64::try_from(*n).map_err(|_| FdwError::internal("foreign key dependent count out of range"))
        }
        other => Err(FdwError::internal(format!(
            "foreign key dependent count: expected integer, got {}",
            other.map_or("no value", RemoteValue::kind)
        ))),
    }
}

/// Truncates `relations`; returns the number of rows deleted remotely.
pub async fn truncate(
    manager: &ConnectionManager,
    relations: &[ForeignRelation],
    request: TruncateRequest,
) -> FdwResult<u64> {
    for relation in relations {
        check_options(relation, &request)?;
    }

    let mut statements = Vec::with_capacity(relations.len());
    for relation in relations {
        let session = manager
            .acquire(&relation.server, &relation.user, request.nest_level)
            .await?;
        let ctx = relation.sql_context(&session);
        let Some(ident) = ctx.table_ident() else {
            return Err(FdwError::internal("table identifier missing for a table source"));
        };

        let result = manager
            .execute(&session, catalog::FK_DEPENDENTS_QUERY, &[RemoteValue::Text(ident.stored_name())])
            .await?;
        let dependents = dependent_count(result.scalar())?;
        if dependents > 0 {
            return Err(FdwError::unsupported(format!(
                "TRUNCATE on foreign table \"{}\", which is referenced by {dependents} remote foreign key(s)",
                relation.table.name
            )));
        }
        statements.push((session, statement::truncate(&ctx)?));
    }

    let mut deleted = 0;
    for (session, sql) in statements {
        let result = manager.execute(&session, &sql, &[]).await?;
        deleted += result.affected_rows.unwrap_or(0);
    }
    tracing::debug!(tables = relations.len(), deleted, "foreign tables truncated");
    Ok(deleted)
}
