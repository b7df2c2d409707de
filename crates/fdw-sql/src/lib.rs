// SPDX-License-Identifier: Apache-2.0

//! Firebird dialect layer
//!
//! Local expression trees, the pushdown compiler that turns them into
//! remote predicates, identifier quoting, statement rendering and the
//! catalog queries used by schema reflection.

pub mod catalog;
pub mod compiler;
pub mod context;
pub mod eval;
pub mod expr;
pub mod ident;
pub mod remote;
pub mod statement;

pub use compiler::{classify, compile, Classified, CompiledFragment, ParamSlot};
pub use context::SqlContext;
pub use expr::{BoolTestKind, Expr, Operator};
pub use ident::RemoteIdent;
pub use remote::RemoteExpr;
pub use statement::{SelectStatement, ROW_ID_COLUMN};
