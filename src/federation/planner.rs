// SPDX-License-Identifier: Apache-2.0

//! Row and cost estimates for foreign scans.
//!
//! Estimates are a side channel for the host planner; they never affect
//! which rows a scan returns.

use serde::Serialize;

use fdw_core::{FdwError, FdwResult, RemoteValue};
use fdw_sql::statement;

use super::analyze::TableStats;
use super::types::{ForeignRelation, NestLevel};
use crate::engine::ConnectionManager;

pub const LOCAL_STARTUP_COST: f64 = 10.0;
pub const REMOTE_STARTUP_COST: f64 = 25.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimateSource {
    /// `estimated_row_count` table option
    TableOption,
    /// Rows seen by a previous ANALYZE
    Analyze,
    /// Remote `SELECT COUNT(*)`
    RemoteCount,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RelationEstimate {
    pub rows: f64,
    pub startup_cost: f64,
    pub total_cost: f64,
    pub source: EstimateSource,
}

pub fn startup_cost(relation: &ForeignRelation) -> f64 {
    if relation.server.is_local() {
        LOCAL_STARTUP_COST
    } else {
        REMOTE_STARTUP_COST
    }
}

/// Estimates the relation size: table option, then ANALYZE results, then a
/// remote count as a last resort.
pub async fn estimate(
    manager: &ConnectionManager,
    relation: &ForeignRelation,
    stats: Option<&TableStats>,
    nest_level: NestLevel,
) -> FdwResult<RelationEstimate> {
    let effective = relation.table.effective(&relation.server);
    let (rows, source) = if let Some(rows) = effective.estimated_row_count {
        (rows as f64, EstimateSource::TableOption)
    } else if let Some(stats) = stats {
        (stats.total_rows as f64, EstimateSource::Analyze)
    } else {
        let session = manager
            .acquire(&relation.server, &relation.user, nest_level)
            .await?;
        let sql = statement::count(&relation.sql_context(&session));
        let result = manager.execute(&session, &sql, &[]).await?;
        let count = match result.scalar() {
            Some(RemoteValue::Integer(n)) => *n as f64,
            Some(RemoteValue::Int128(n)) => *n as f64,
            other => {
                return Err(FdwError::conversion(format!(
                    "row count query returned {}",
                    other.map_or("no rows", |v| v.kind())
                )))
            }
        };
        (count, EstimateSource::RemoteCount)
    };

    let startup_cost = startup_cost(relation);
    Ok(RelationEstimate {
        rows,
        startup_cost,
        total_cost: rows + startup_cost,
        source,
    })
}
