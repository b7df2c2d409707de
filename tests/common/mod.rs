//! Programmable in-memory remote used by the integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{FixedOffset, Offset, Utc};

use firebird_fdw_lib::engine::{ConnectParams, Connector, RemoteChannel, RemoteError, RemoteResult};
use firebird_fdw_lib::federation::ForeignRelation;
use firebird_fdw_lib::settings::FdwSettings;
use firebird_fdw_lib::FdwRuntime;
use fdw_core::{ColumnDescriptor, ForeignTable, RemoteValue, RemoteVersion, ServerDescriptor, UserMapping};

pub type Handler = dyn Fn(&str, &[RemoteValue]) -> Result<RemoteResult, RemoteError> + Send + Sync;

/// One statement as the remote saw it
#[derive(Debug, Clone, PartialEq)]
pub struct Executed {
    pub sql: String,
    pub params: Vec<RemoteValue>,
}

struct MockState {
    version: RemoteVersion,
    log: Mutex<Vec<Executed>>,
    handler: Mutex<Arc<Handler>>,
    connects: AtomicUsize,
    closes: AtomicUsize,
    healthy: AtomicBool,
    fail_connect: AtomicBool,
    fail_close: AtomicBool,
}

/// Remote server stand-in. Every statement, commit and rollback is
/// recorded; statements are answered by the installed handler.
#[derive(Clone)]
pub struct MockRemote {
    state: Arc<MockState>,
}

impl MockRemote {
    pub fn new(version: RemoteVersion) -> Self {
        Self {
            state: Arc::new(MockState {
                version,
                log: Mutex::new(Vec::new()),
                handler: Mutex::new(Arc::new(|_, _| Ok(RemoteResult::empty()))),
                connects: AtomicUsize::new(0),
                closes: AtomicUsize::new(0),
                healthy: AtomicBool::new(true),
                fail_connect: AtomicBool::new(false),
                fail_close: AtomicBool::new(false),
            }),
        }
    }

    /// Installs the statement handler. Transaction control statements are
    /// answered before the handler sees them.
    pub fn respond<F>(&self, handler: F)
    where
        F: Fn(&str, &[RemoteValue]) -> Result<RemoteResult, RemoteError> + Send + Sync + 'static,
    {
        *self.state.handler.lock().unwrap() = Arc::new(handler);
    }

    pub fn executed(&self) -> Vec<Executed> {
        self.state.log.lock().unwrap().clone()
    }

    pub fn statements(&self) -> Vec<String> {
        self.executed().into_iter().map(|e| e.sql).collect()
    }

    /// Statements other than transaction control.
    pub fn data_statements(&self) -> Vec<Executed> {
        self.executed().into_iter().filter(|e| !is_control(&e.sql)).collect()
    }

    pub fn count_starting_with(&self, prefix: &str) -> usize {
        self.statements().iter().filter(|s| s.starts_with(prefix)).count()
    }

    pub fn clear_log(&self) {
        self.state.log.lock().unwrap().clear();
    }

    pub fn connects(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.state.closes.load(Ordering::SeqCst)
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.state.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn fail_connect(&self, fail: bool) {
        self.state.fail_connect.store(fail, Ordering::SeqCst);
    }

    /// Makes rollback and close report an error after taking effect.
    pub fn fail_close(&self, fail: bool) {
        self.state.fail_close.store(fail, Ordering::SeqCst);
    }

    fn closing_result(&self) -> Result<(), RemoteError> {
        if self.state.fail_close.load(Ordering::SeqCst) {
            return Err(RemoteError::connection("connection lost during shutdown"));
        }
        Ok(())
    }

    fn record(&self, sql: &str, params: &[RemoteValue]) {
        self.state.log.lock().unwrap().push(Executed {
            sql: sql.to_string(),
            params: params.to_vec(),
        });
    }
}

pub fn is_control(sql: &str) -> bool {
    sql == "SET TRANSACTION SNAPSHOT"
        || sql == "COMMIT"
        || sql == "ROLLBACK"
        || sql.starts_with("SAVEPOINT ")
        || sql.starts_with("RELEASE SAVEPOINT ")
        || sql.starts_with("ROLLBACK TO SAVEPOINT ")
}

#[async_trait]
impl Connector for MockRemote {
    async fn connect(&self, _params: &ConnectParams) -> Result<Box<dyn RemoteChannel>, RemoteError> {
        if self.state.fail_connect.load(Ordering::SeqCst) {
            return Err(RemoteError::connection("connection refused"));
        }
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        self.state.healthy.store(true, Ordering::SeqCst);
        Ok(Box::new(MockChannel {
            remote: self.clone(),
            open: true,
        }))
    }
}

struct MockChannel {
    remote: MockRemote,
    open: bool,
}

#[async_trait]
impl RemoteChannel for MockChannel {
    async fn execute(&mut self, sql: &str, params: &[RemoteValue]) -> Result<RemoteResult, RemoteError> {
        if !self.open {
            return Err(RemoteError::connection("connection shutdown"));
        }
        self.remote.record(sql, params);
        if is_control(sql) {
            return Ok(RemoteResult::empty());
        }
        let handler = Arc::clone(&self.remote.state.handler.lock().unwrap());
        handler(sql, params)
    }

    async fn commit(&mut self) -> Result<(), RemoteError> {
        self.remote.record("COMMIT", &[]);
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), RemoteError> {
        self.remote.record("ROLLBACK", &[]);
        self.remote.closing_result()
    }

    async fn is_healthy(&mut self) -> bool {
        self.open && self.remote.state.healthy.load(Ordering::SeqCst)
    }

    fn server_version(&self) -> RemoteVersion {
        self.remote.state.version
    }

    fn server_version_string(&self) -> String {
        format!("WI-V{} Firebird", self.remote.state.version)
    }

    fn session_time_zone(&self) -> FixedOffset {
        Utc.fix()
    }

    async fn close(&mut self) -> Result<(), RemoteError> {
        self.open = false;
        self.remote.state.closes.fetch_add(1, Ordering::SeqCst);
        self.remote.closing_result()
    }
}

pub fn runtime(remote: &MockRemote) -> FdwRuntime {
    FdwRuntime::new(Arc::new(remote.clone()), FdwSettings::default())
}

pub fn server() -> ServerDescriptor {
    ServerDescriptor::new("fb", &[("address", "localhost"), ("database", "/data/test.fdb")]).unwrap()
}

pub fn server_with(options: &[(&str, &str)]) -> ServerDescriptor {
    let mut all = vec![("address", "localhost"), ("database", "/data/test.fdb")];
    all.extend_from_slice(options);
    ServerDescriptor::new("fb", &all).unwrap()
}

pub fn user() -> UserMapping {
    UserMapping::new("alice", &[("username", "SYSDBA"), ("password", "masterkey")]).unwrap()
}

pub fn relation(name: &str, options: &[(&str, &str)], columns: Vec<ColumnDescriptor>) -> ForeignRelation {
    relation_on(server(), name, options, columns)
}

pub fn relation_on(
    server: ServerDescriptor,
    name: &str,
    options: &[(&str, &str)],
    columns: Vec<ColumnDescriptor>,
) -> ForeignRelation {
    ForeignRelation::new(server, user(), ForeignTable::new(name, options, columns).unwrap())
}

pub fn row_id(n: u8) -> RemoteValue {
    RemoteValue::Binary(vec![0, 0, 0, 0, 0, 0, 0, n])
}
