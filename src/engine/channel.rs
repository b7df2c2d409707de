//! Remote channel abstraction
//!
//! The wire protocol and client library live behind these traits. A channel
//! is one authenticated remote session; results are fully buffered per
//! statement, so several scans may interleave on a single channel.

use std::time::Duration;

use async_trait::async_trait;
use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use fdw_core::{FdwError, RemoteValue, RemoteVersion, Sensitive};

/// Everything needed to open a remote session
#[derive(Debug, Clone)]
pub struct ConnectParams {
    /// `address[/port]:database`
    pub db_path: String,
    pub username: Option<String>,
    pub password: Option<Sensitive<String>>,
    /// Client character set announced on attach.
    pub client_charset: String,
    pub connect_timeout: Option<Duration>,
}

/// Buffered result of one remote statement
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<RemoteValue>>,
    pub affected_rows: Option<u64>,
}

impl RemoteResult {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn affected(count: u64) -> Self {
        Self {
            affected_rows: Some(count),
            ..Self::default()
        }
    }

    pub fn with_rows(columns: Vec<String>, rows: Vec<Vec<RemoteValue>>) -> Self {
        Self {
            columns,
            rows,
            affected_rows: None,
        }
    }

    /// First column of the first row, if any.
    pub fn scalar(&self) -> Option<&RemoteValue> {
        self.rows.first().and_then(|row| row.first())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteErrorKind {
    /// The session is unusable (network loss, shutdown, authentication).
    Connection,
    /// The statement failed; the session itself is intact.
    Statement,
}

/// Error reported by the remote client library
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[error("{message}")]
pub struct RemoteError {
    pub kind: RemoteErrorKind,
    pub message: String,
    pub detail: Option<String>,
}

impl RemoteError {
    pub fn connection(message: impl Into<String>) -> Self {
        Self {
            kind: RemoteErrorKind::Connection,
            message: message.into(),
            detail: None,
        }
    }

    pub fn statement(message: impl Into<String>) -> Self {
        Self {
            kind: RemoteErrorKind::Statement,
            message: message.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Lifts the error into the engine taxonomy, keeping the remote message
    /// verbatim.
    pub fn into_fdw(self, query: Option<&str>) -> FdwError {
        match self.kind {
            RemoteErrorKind::Connection => FdwError::remote_connection(self.message),
            RemoteErrorKind::Statement => {
                FdwError::remote_statement(self.message, self.detail, query.map(str::to_string))
            }
        }
    }
}

/// One remote session
#[async_trait]
pub trait RemoteChannel: Send {
    /// Executes a statement with positional parameters and buffers its result.
    async fn execute(&mut self, sql: &str, params: &[RemoteValue]) -> Result<RemoteResult, RemoteError>;

    async fn commit(&mut self) -> Result<(), RemoteError>;

    async fn rollback(&mut self) -> Result<(), RemoteError>;

    /// Cheap liveness probe.
    async fn is_healthy(&mut self) -> bool;

    fn server_version(&self) -> RemoteVersion;

    /// Human-readable server version, e.g. `WI-V3.0.10.33601 Firebird 3.0`.
    fn server_version_string(&self) -> String;

    /// Session time zone used for zoned values written to the remote.
    fn session_time_zone(&self) -> FixedOffset;

    async fn close(&mut self) -> Result<(), RemoteError>;
}

/// Opens remote sessions
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, params: &ConnectParams) -> Result<Box<dyn RemoteChannel>, RemoteError>;
}
