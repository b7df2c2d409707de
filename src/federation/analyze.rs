// SPDX-License-Identifier: Apache-2.0

//! ANALYZE support: samples remote rows for the host's statistics.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use fdw_core::{FdwResult, Row};

use super::scan::{ForeignScan, ScanRequest};
use super::types::{ForeignRelation, NestLevel};
use crate::engine::ConnectionManager;

/// Result of analyzing one foreign table
#[derive(Debug, Clone, Serialize)]
pub struct TableStats {
    /// Rows seen while scanning.
    pub total_rows: u64,
    /// At most `target_rows` rows, uniformly sampled.
    pub sample: Vec<Row>,
    pub analyzed_at: DateTime<Utc>,
}

/// Samples up to `target_rows` rows. Query-defined tables are not analyzed
/// and yield `None`.
pub async fn analyze(
    manager: Arc<ConnectionManager>,
    relation: ForeignRelation,
    target_rows: usize,
    nest_level: NestLevel,
) -> FdwResult<Option<TableStats>> {
    analyze_with_rng(manager, relation, target_rows, nest_level, &mut StdRng::from_entropy()).await
}

pub async fn analyze_with_rng<R: Rng + Send>(
    manager: Arc<ConnectionManager>,
    relation: ForeignRelation,
    target_rows: usize,
    nest_level: NestLevel,
    rng: &mut R,
) -> FdwResult<Option<TableStats>> {
    if relation.table.is_query() {
        tracing::info!(table = %relation.table.name, "skipping ANALYZE of a query-defined foreign table");
        return Ok(None);
    }

    let columns = (0..relation.table.columns.len()).collect();
    let table_name = relation.table.name.clone();
    let mut scan = ForeignScan::new(
        manager,
        relation,
        ScanRequest {
            columns,
            quals: Vec::new(),
            for_modify: false,
            nest_level,
        },
    );
    scan.begin(Vec::new()).await?;

    let mut sample = Vec::with_capacity(target_rows);
    let mut total_rows: u64 = 0;
    while let Some(row) = scan.next().await? {
        total_rows += 1;
        if sample.len() < target_rows {
            sample.push(row);
        } else {
            // Algorithm R: keep the new row with probability target/seen.
            let slot = rng.gen_range(0..total_rows);
            if let Ok(slot) = usize::try_from(slot) {
                if slot < target_rows {
                    sample[slot] = row;
                }
            }
        }
    }
    scan.end();

    tracing::info!(table = %table_name, total_rows, sampled = sample.len(), "foreign table analyzed");
    Ok(Some(TableStats {
        total_rows,
        sample,
        analyzed_at: Utc::now(),
    }))
}
