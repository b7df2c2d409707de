// SPDX-License-Identifier: Apache-2.0

//! Shared types for the federation layer.

use serde::{Deserialize, Serialize};

use fdw_core::{BridgeContext, ColumnDescriptor, ForeignTable, ServerDescriptor, UserMapping};
use fdw_sql::SqlContext;

use crate::engine::SessionHandle;

/// A foreign table resolved together with its server and user mapping.
#[derive(Debug, Clone)]
pub struct ForeignRelation {
    pub server: ServerDescriptor,
    pub user: UserMapping,
    pub table: ForeignTable,
}

impl ForeignRelation {
    pub fn new(server: ServerDescriptor, user: UserMapping, table: ForeignTable) -> Self {
        Self {
            server,
            user,
            table,
        }
    }

    /// Dialect view of the table for a session's remote version.
    pub fn sql_context(&self, session: &SessionHandle) -> SqlContext<'_> {
        SqlContext::new(&self.table, &self.server, session.version)
    }

    pub fn bridge(&self, session: &SessionHandle, local_zone: chrono::FixedOffset) -> BridgeContext {
        BridgeContext::new(&self.server.options, session.version).with_zones(session.session_zone, local_zone)
    }

    pub fn column(&self, index: usize) -> Option<&ColumnDescriptor> {
        self.table.columns.get(index)
    }
}

/// Lifecycle of a foreign scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanState {
    Unopened,
    Compiling,
    Executing,
    Fetching,
    Rescanning,
    Closed,
}

/// Local sub-transaction nesting level of the calling statement (1 = top).
pub type NestLevel = u32;
