// SPDX-License-Identifier: Apache-2.0

//! Scan executor
//!
//! Drives one remote SELECT per scan through
//! `Unopened -> Compiling -> Executing -> Fetching -> (Rescanning -> Fetching)* -> Closed`.
//! A rescan always re-issues the statement with the current parameter
//! values; the previous result is discarded, never rewound.
//!
//! Qualifiers that are not pushed down are filtered here when the local
//! evaluator covers them. The rest come back from [`ForeignScan::recheck_quals`]
//! and rows are returned without applying them.

use std::sync::Arc;

use tracing::instrument;

use fdw_core::{
    from_remote, to_remote, BridgeContext, ColumnDescriptor, FdwError, FdwResult, RemoteValue, Row, RowId, Value,
};
use fdw_sql::{classify, eval, statement, Expr, SelectStatement};

use super::types::{ForeignRelation, NestLevel, ScanState};
use crate::engine::{ConnectionManager, SessionHandle};

/// What the host asks a scan to produce
#[derive(Debug, Clone, Default)]
pub struct ScanRequest {
    /// Table columns the host needs, by position.
    pub columns: Vec<usize>,
    /// Restriction clauses, implicitly AND-ed.
    pub quals: Vec<Expr>,
    /// Also fetch the remote row identifier for a following UPDATE/DELETE.
    pub for_modify: bool,
    pub nest_level: NestLevel,
}

pub struct ForeignScan {
    manager: Arc<ConnectionManager>,
    relation: ForeignRelation,
    request: ScanRequest,
    state: ScanState,
    session: Option<SessionHandle>,
    bridge: Option<BridgeContext>,
    statement: Option<SelectStatement>,
    local_quals: Vec<Expr>,
    recheck_quals: Vec<Expr>,
    params: Vec<Value>,
    buffer: std::vec::IntoIter<Vec<RemoteValue>>,
    executions: u32,
    rows_returned: u64,
}

impl ForeignScan {
    pub fn new(manager: Arc<ConnectionManager>, relation: ForeignRelation, request: ScanRequest) -> Self {
        Self {
            manager,
            relation,
            request,
            state: ScanState::Unopened,
            session: None,
            bridge: None,
            statement: None,
            local_quals: Vec::new(),
            recheck_quals: Vec::new(),
            params: Vec::new(),
            buffer: Vec::new().into_iter(),
            executions: 0,
            rows_returned: 0,
        }
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    /// Remote SQL, once compiled.
    pub fn remote_sql(&self) -> Option<&str> {
        self.statement.as_ref().map(|s| s.sql.as_str())
    }

    /// Qualifiers evaluated locally on every fetched row.
    pub fn local_quals(&self) -> &[Expr] {
        &self.local_quals
    }

    /// Qualifiers the host must apply to the returned rows itself.
    pub fn recheck_quals(&self) -> &[Expr] {
        &self.recheck_quals
    }

    /// Number of times the remote statement has been executed.
    pub fn executions(&self) -> u32 {
        self.executions
    }

    pub fn rows_returned(&self) -> u64 {
        self.rows_returned
    }

    /// Compiles the scan and binds the initial parameter values.
    #[instrument(skip(self, params), fields(table = %self.relation.table.name))]
    pub async fn begin(&mut self, params: Vec<Value>) -> FdwResult<()> {
        if self.state != ScanState::Unopened {
            return Err(FdwError::invalid_state(format!(
                "scan already started (state {:?})",
                self.state
            )));
        }
        self.state = ScanState::Compiling;

        let session = self
            .manager
            .acquire(&self.relation.server, &self.relation.user, self.request.nest_level)
            .await?;

        let ctx = self.relation.sql_context(&session);
        let classified = classify(&ctx, &self.request.quals);

        let mut needed = self.request.columns.clone();
        for qual in &classified.local {
            qual.collect_columns(&mut needed);
        }
        needed.sort_unstable();
        needed.dedup();

        let stmt = statement::select(&ctx, &needed, &classified.remote, self.request.for_modify)?;
        let (local, recheck): (Vec<_>, Vec<_>) = classified.local.into_iter().partition(eval::evaluable);
        tracing::debug!(
            sql = %stmt.sql,
            pushed = classified.remote.len(),
            local = local.len(),
            recheck = recheck.len(),
            "foreign scan compiled"
        );

        self.bridge = Some(self.relation.bridge(&session, self.manager.settings().time_zone));
        self.local_quals = local;
        self.recheck_quals = recheck;
        self.statement = Some(stmt);
        self.session = Some(session);
        self.params = params;
        self.state = ScanState::Executing;
        Ok(())
    }

    /// Next row passing all local qualifiers, or `None` at the end.
    pub async fn next(&mut self) -> FdwResult<Option<Row>> {
        match self.state {
            ScanState::Executing | ScanState::Rescanning => self.execute().await?,
            ScanState::Fetching => {}
            state => {
                return Err(FdwError::invalid_state(format!(
                    "cannot fetch from a scan in state {state:?}"
                )))
            }
        }

        while let Some(raw) = self.buffer.next() {
            let row = self.decode(raw)?;
            if eval::matches_all(&self.local_quals, &row.values, &self.params)? {
                self.rows_returned += 1;
                return Ok(Some(row));
            }
        }
        Ok(None)
    }

    /// Restarts the scan; the next fetch re-executes the remote statement,
    /// with `params` replacing the bound values when given.
    pub fn rescan(&mut self, params: Option<Vec<Value>>) -> FdwResult<()> {
        match self.state {
            ScanState::Executing | ScanState::Fetching | ScanState::Rescanning => {}
            state => {
                return Err(FdwError::invalid_state(format!(
                    "cannot rescan a scan in state {state:?}"
                )))
            }
        }
        if let Some(params) = params {
            self.params = params;
        }
        self.buffer = Vec::new().into_iter();
        self.state = ScanState::Rescanning;
        Ok(())
    }

    pub fn end(&mut self) {
        self.buffer = Vec::new().into_iter();
        self.state = ScanState::Closed;
    }

    async fn execute(&mut self) -> FdwResult<()> {
        let (Some(session), Some(stmt), Some(bridge)) = (&self.session, &self.statement, &self.bridge) else {
            return Err(FdwError::invalid_state("scan executed before it was compiled"));
        };

        let mut remote_params = Vec::with_capacity(stmt.params.len());
        for slot in &stmt.params {
            let value = self.params.get(slot.index).ok_or_else(|| {
                FdwError::invalid_state(format!("parameter ${} not bound", slot.index + 1))
            })?;
            let descriptor = ColumnDescriptor::new(format!("${}", slot.index + 1), slot.ty);
            remote_params.push(to_remote(value, &descriptor, bridge)?);
        }

        let result = self.manager.execute(session, &stmt.sql, &remote_params).await?;
        tracing::debug!(rows = result.rows.len(), rescan = self.executions > 0, "foreign scan executed");
        self.buffer = result.rows.into_iter();
        self.executions += 1;
        self.state = ScanState::Fetching;
        Ok(())
    }

    fn decode(&self, raw: Vec<RemoteValue>) -> FdwResult<Row> {
        let (Some(stmt), Some(bridge)) = (&self.statement, &self.bridge) else {
            return Err(FdwError::invalid_state("scan row decoded before compilation"));
        };
        let table = &self.relation.table;
        let expected = stmt.columns.len().max(usize::from(!stmt.with_row_id)) + usize::from(stmt.with_row_id);
        if raw.len() != expected {
            return Err(FdwError::internal(format!(
                "remote row has {} fields, expected {expected}",
                raw.len()
            )));
        }

        let mut values = vec![Value::Null; table.columns.len()];
        let mut raw = raw.into_iter();
        for &index in &stmt.columns {
            let (Some(value), Some(column)) = (raw.next(), table.columns.get(index)) else {
                return Err(FdwError::internal(format!("column {index} missing from remote row")));
            };
            values[index] = from_remote(value, column, bridge)?;
        }

        let mut row = Row::new(values);
        if stmt.with_row_id {
            match raw.last() {
                Some(RemoteValue::Binary(bytes)) => {
                    let row_id = RowId::from_bytes(bytes)
                        .ok_or_else(|| FdwError::conversion("malformed remote row identifier"))?;
                    row = row.with_row_id(row_id);
                }
                other => {
                    return Err(FdwError::conversion(format!(
                        "expected a row identifier, got {}",
                        other.map_or("nothing", |v| v.kind())
                    )))
                }
            }
        }
        Ok(row)
    }
}
