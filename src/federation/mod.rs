// SPDX-License-Identifier: Apache-2.0

//! Foreign data federation
//!
//! Scan, modify, truncate, analyze and import operations over foreign
//! relations, all running through the shared [`crate::engine::ConnectionManager`].

pub mod analyze;
pub mod import;
pub mod modify;
pub mod planner;
pub mod scan;
pub mod truncate;
pub mod types;

pub use analyze::TableStats;
pub use import::{ImportFilter, ImportOptions, ImportReport, TableDefinition};
pub use modify::{ForeignModify, ModifyKind, ModifyRequest};
pub use planner::{EstimateSource, RelationEstimate};
pub use scan::{ForeignScan, ScanRequest};
pub use truncate::TruncateRequest;
pub use types::{ForeignRelation, NestLevel, ScanState};
