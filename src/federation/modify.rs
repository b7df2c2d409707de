// SPDX-License-Identifier: Apache-2.0

//! Modification pipeline
//!
//! INSERT (optionally batched), UPDATE and DELETE addressed by the remote
//! row identifier, with RETURNING read back from the remote. Generated
//! columns are never written; when a row is returned their values come
//! from the remote.

use std::sync::Arc;

use tracing::instrument;

use fdw_core::{from_remote, to_remote, BridgeContext, FdwError, FdwResult, RemoteValue, Row, RowId, Value};
use fdw_sql::statement;

use super::types::{ForeignRelation, NestLevel};
use crate::engine::{ConnectionManager, RemoteResult, SessionHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModifyKind {
    Insert,
    Update,
    Delete,
}

impl ModifyKind {
    fn as_str(&self) -> &'static str {
        match self {
            ModifyKind::Insert => "INSERT",
            ModifyKind::Update => "UPDATE",
            ModifyKind::Delete => "DELETE",
        }
    }
}

/// What the host asks a modification to do
#[derive(Debug, Clone)]
pub struct ModifyRequest {
    pub kind: ModifyKind,
    /// Columns whose values the host supplies (INSERT / UPDATE).
    pub target_columns: Vec<usize>,
    /// Columns the host wants back per affected row.
    pub returning: Vec<usize>,
    pub nest_level: NestLevel,
}

impl ModifyRequest {
    pub fn new(kind: ModifyKind, target_columns: Vec<usize>) -> Self {
        Self {
            kind,
            target_columns,
            returning: Vec::new(),
            nest_level: 1,
        }
    }

    pub fn returning(mut self, columns: Vec<usize>) -> Self {
        self.returning = columns;
        self
    }
}

pub struct ForeignModify {
    manager: Arc<ConnectionManager>,
    relation: ForeignRelation,
    kind: ModifyKind,
    session: SessionHandle,
    bridge: BridgeContext,
    /// Columns actually sent: targets minus generated columns.
    send_columns: Vec<usize>,
    /// Columns read back: requested ones plus generated ones.
    returning: Vec<usize>,
    batch_size: usize,
    pending: Vec<Row>,
    round_trips: u64,
    affected: u64,
}

impl std::fmt::Debug for ForeignModify {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForeignModify")
            .field("table", &self.relation.table.name)
            .field("kind", &self.kind)
            .field("batch_size", &self.batch_size)
            .finish_non_exhaustive()
    }
}

/// Rejects modifications the table cannot take, before any remote call.
pub fn check_modifiable(relation: &ForeignRelation, kind: ModifyKind) -> FdwResult<()> {
    let table = &relation.table;
    if table.is_query() {
        return Err(FdwError::unsupported(format!(
            "{} on foreign table \"{}\" defined by a remote query",
            kind.as_str(),
            table.name
        )));
    }
    if !table.effective(&relation.server).updatable {
        return Err(FdwError::unsupported(format!(
            "{} on foreign table \"{}\", which is not updatable",
            kind.as_str(),
            table.name
        )));
    }
    Ok(())
}

impl ForeignModify {
    #[instrument(skip(manager, relation, request), fields(table = %relation.table.name, kind = ?request.kind))]
    pub async fn begin(
        manager: Arc<ConnectionManager>,
        relation: ForeignRelation,
        request: ModifyRequest,
    ) -> FdwResult<Self> {
        check_modifiable(&relation, request.kind)?;

        let table = &relation.table;
        for &index in request.target_columns.iter().chain(&request.returning) {
            if index >= table.columns.len() {
                return Err(FdwError::internal(format!(
                    "column {index} out of range for \"{}\"",
                    table.name
                )));
            }
        }

        let send_columns: Vec<usize> = match request.kind {
            ModifyKind::Delete => Vec::new(),
            _ => request
                .target_columns
                .iter()
                .copied()
                .filter(|&i| !table.columns[i].generated)
                .collect(),
        };

        let mut returning = request.returning.clone();
        if !returning.is_empty() && request.kind != ModifyKind::Delete {
            for (index, column) in table.columns.iter().enumerate() {
                if column.generated && !returning.contains(&index) {
                    returning.push(index);
                }
            }
        }

        let configured = table.effective(&relation.server).batch_size as usize;
        let batch_size = if request.kind != ModifyKind::Insert || !returning.is_empty() || send_columns.is_empty() {
            1
        } else {
            configured.max(1)
        };

        let session = manager
            .acquire(&relation.server, &relation.user, request.nest_level)
            .await?;
        let bridge = relation.bridge(&session, manager.settings().time_zone);

        tracing::debug!(batch_size, returning = returning.len(), "foreign modify prepared");
        Ok(Self {
            manager,
            relation,
            kind: request.kind,
            session,
            bridge,
            send_columns,
            returning,
            batch_size,
            pending: Vec::new(),
            round_trips: 0,
            affected: 0,
        })
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Remote statements issued so far.
    pub fn round_trips(&self) -> u64 {
        self.round_trips
    }

    /// Rows reported affected by the remote so far.
    pub fn affected(&self) -> u64 {
        self.affected
    }

    fn ensure_kind(&self, kind: ModifyKind) -> FdwResult<()> {
        if self.kind != kind {
            return Err(FdwError::invalid_state(format!(
                "{} issued on a {} modification",
                kind.as_str(),
                self.kind.as_str()
            )));
        }
        Ok(())
    }

    fn encode(&self, row: &Row, out: &mut Vec<RemoteValue>) -> FdwResult<()> {
        for &index in &self.send_columns {
            let column = &self.relation.table.columns[index];
            let value = row.get(index).unwrap_or(&Value::Null);
            if value.is_null() && !column.nullable {
                return Err(FdwError::conversion(format!(
                    "null value in column \"{}\" violates not-null constraint",
                    column.name
                )));
            }
            out.push(to_remote(value, column, &self.bridge)?);
        }
        Ok(())
    }

    async fn run(&mut self, sql: &str, params: &[RemoteValue]) -> FdwResult<RemoteResult> {
        let result = self.manager.execute(&self.session, sql, params).await?;
        self.round_trips += 1;
        self.affected += result.affected_rows.unwrap_or(result.rows.len() as u64);
        Ok(result)
    }

    /// Merges the returned remote row into `row`.
    fn read_back(&self, mut row: Row, result: RemoteResult) -> FdwResult<Row> {
        let Some(returned) = result.rows.into_iter().next() else {
            return Err(FdwError::remote_statement(
                format!("{} returned no row", self.kind.as_str()),
                None,
                None,
            ));
        };
        if returned.len() != self.returning.len() {
            return Err(FdwError::internal(format!(
                "{} returned {} fields, expected {}",
                self.kind.as_str(),
                returned.len(),
                self.returning.len()
            )));
        }
        let columns = &self.relation.table.columns;
        if row.values.len() < columns.len() {
            row.values.resize(columns.len(), Value::Null);
        }
        for (&index, value) in self.returning.iter().zip(returned) {
            let (Some(column), Some(slot)) = (columns.get(index), row.values.get_mut(index)) else {
                return Err(FdwError::internal(format!("returned column {index} out of range")));
            };
            *slot = from_remote(value, column, &self.bridge)?;
        }
        Ok(row)
    }

    /// Inserts a row. Returns the row as stored remotely when RETURNING was
    /// requested; otherwise the row may be held until the batch fills.
    pub async fn insert(&mut self, row: Row) -> FdwResult<Option<Row>> {
        self.ensure_kind(ModifyKind::Insert)?;
        if !self.returning.is_empty() {
            let ctx = self.relation.sql_context(&self.session);
            let sql = statement::insert(&ctx, &self.send_columns, 1, &self.returning)?;
            let mut params = Vec::with_capacity(self.send_columns.len());
            self.encode(&row, &mut params)?;
            let result = self.run(&sql, &params).await?;
            return self.read_back(row, result).map(Some);
        }

        self.pending.push(row);
        if self.pending.len() >= self.batch_size {
            self.flush().await?;
        }
        Ok(None)
    }

    /// Sends any buffered INSERT rows; returns how many were sent.
    pub async fn flush(&mut self) -> FdwResult<usize> {
        if self.pending.is_empty() {
            return Ok(0);
        }
        let rows = std::mem::take(&mut self.pending);
        let ctx = self.relation.sql_context(&self.session);
        let sql = statement::insert(&ctx, &self.send_columns, rows.len(), &[])?;
        let mut params = Vec::with_capacity(self.send_columns.len() * rows.len());
        for row in &rows {
            self.encode(row, &mut params)?;
        }
        self.run(&sql, &params).await?;
        tracing::debug!(rows = rows.len(), "insert batch sent");
        Ok(rows.len())
    }

    fn row_id<'r>(&self, row: &'r Row) -> FdwResult<&'r RowId> {
        row.row_id.as_ref().ok_or_else(|| {
            FdwError::invalid_state(format!(
                "{} on \"{}\" requires the row identifier from the preceding scan",
                self.kind.as_str(),
                self.relation.table.name
            ))
        })
    }

    /// Updates the remote row identified by `row.row_id` with the target
    /// column values of `row`.
    pub async fn update(&mut self, row: Row) -> FdwResult<Option<Row>> {
        self.ensure_kind(ModifyKind::Update)?;
        let row_id = self.row_id(&row)?.to_remote();
        let ctx = self.relation.sql_context(&self.session);

        if self.send_columns.is_empty() {
            // Only generated columns were targeted: nothing to write.
            if self.returning.is_empty() {
                return Ok(None);
            }
            let sql = statement::select_by_row_id(&ctx, &self.returning)?;
            let result = self.run(&sql, &[row_id]).await?;
            return self.read_back(row, result).map(Some);
        }

        let sql = statement::update(&ctx, &self.send_columns, &self.returning)?;
        let mut params = Vec::with_capacity(self.send_columns.len() + 1);
        self.encode(&row, &mut params)?;
        params.push(row_id);
        let result = self.run(&sql, &params).await?;
        if self.returning.is_empty() {
            return Ok(None);
        }
        self.read_back(row, result).map(Some)
    }

    /// Deletes the remote row identified by `row.row_id`.
    pub async fn delete(&mut self, row: Row) -> FdwResult<Option<Row>> {
        self.ensure_kind(ModifyKind::Delete)?;
        let row_id = self.row_id(&row)?.to_remote();
        let ctx = self.relation.sql_context(&self.session);
        let sql = statement::delete(&ctx, &self.returning)?;
        let result = self.run(&sql, &[row_id]).await?;
        if self.returning.is_empty() {
            return Ok(None);
        }
        self.read_back(row, result).map(Some)
    }

    /// Flushes outstanding rows and reports the affected row count.
    pub async fn finish(mut self) -> FdwResult<u64> {
        self.flush().await?;
        tracing::debug!(
            round_trips = self.round_trips,
            affected = self.affected,
            "foreign modify finished"
        );
        Ok(self.affected)
    }
}
