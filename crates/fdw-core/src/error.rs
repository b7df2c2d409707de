// SPDX-License-Identifier: Apache-2.0

//! Normalized error types for the federation engine
//!
//! Every failure the engine can surface to the host is one of these variants.
//! Pushdown refusals are not errors: the compiler reports them as `None`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error type for all federation operations
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq)]
pub enum FdwError {
    /// Bad, unknown, redundant or conflicting option. Raised at definition time.
    #[error("Invalid option: {message}")]
    Config {
        message: String,
        hint: Option<String>,
    },

    /// A remote type the bridge cannot represent. Raised at definition time.
    #[error("Unsupported data type: {message}")]
    UnsupportedType { message: String },

    /// Remote value outside the declared local domain.
    #[error("Data conversion error: {message}")]
    DataConversion { message: String },

    /// The remote engine rejected a statement. Aborts the local transaction.
    #[error("{message}")]
    RemoteStatement {
        message: String,
        detail: Option<String>,
        query: Option<String>,
    },

    /// The remote session is unusable. The cached entry has been evicted.
    #[error("Unable to communicate with remote server: {message}")]
    RemoteConnection { message: String },

    /// Rejected before any remote round trip.
    #[error("Unsupported operation: {feature}")]
    UnsupportedOperation { feature: String },

    /// Executor used out of order.
    #[error("Invalid executor state: {message}")]
    InvalidState { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl FdwError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
            hint: None,
        }
    }

    pub fn config_with_hint(msg: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
            hint: Some(hint.into()),
        }
    }

    pub fn unsupported_type(msg: impl Into<String>) -> Self {
        Self::UnsupportedType { message: msg.into() }
    }

    pub fn conversion(msg: impl Into<String>) -> Self {
        Self::DataConversion { message: msg.into() }
    }

    pub fn remote_statement(
        msg: impl Into<String>,
        detail: Option<String>,
        query: Option<String>,
    ) -> Self {
        Self::RemoteStatement {
            message: msg.into(),
            detail,
            query,
        }
    }

    pub fn remote_connection(msg: impl Into<String>) -> Self {
        Self::RemoteConnection { message: msg.into() }
    }

    pub fn unsupported(feature: impl Into<String>) -> Self {
        Self::UnsupportedOperation {
            feature: feature.into(),
        }
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState { message: msg.into() }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal { message: msg.into() }
    }

    /// True when the cached connection that produced this error must be evicted.
    pub fn is_connection_fatal(&self) -> bool {
        matches!(self, Self::RemoteConnection { .. })
    }

    /// True when the local statement and transaction must be aborted.
    pub fn aborts_transaction(&self) -> bool {
        matches!(
            self,
            Self::RemoteStatement { .. } | Self::RemoteConnection { .. } | Self::DataConversion { .. }
        )
    }

    /// Diagnostic context line attached to remote statement errors.
    pub fn context(&self) -> Option<String> {
        match self {
            Self::RemoteStatement {
                query: Some(query), ..
            } => Some(format!("remote SQL command: {query}")),
            _ => None,
        }
    }
}

/// Result type alias for federation operations
pub type FdwResult<T> = Result<T, FdwError>;
