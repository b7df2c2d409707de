//! Connection & transaction coordinator
//!
//! Owns the per-process cache of remote sessions, keyed by server and local
//! user, and keeps each session's remote transaction aligned with the local
//! one: a remote transaction starts lazily on first use, local savepoints are
//! mirrored as remote savepoints, and the local commit or abort ends it
//! exactly once.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::FixedOffset;
use tokio::sync::{Mutex, RwLock};
use tracing::instrument;

use fdw_core::{FdwError, FdwResult, RemoteValue, RemoteVersion, ServerDescriptor, ServerId, UserMapping};

use crate::engine::channel::{ConnectParams, Connector, RemoteChannel, RemoteResult};
use crate::settings::FdwSettings;

/// Cache key: one cached session per server and local user
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionKey {
    pub server: ServerId,
    pub local_user: String,
}

impl ConnectionKey {
    pub fn new(server: &ServerDescriptor, user: &UserMapping) -> Self {
        Self {
            server: server.id.clone(),
            local_user: user.local_user.clone(),
        }
    }
}

struct CachedConnection {
    /// `None` once the session has been evicted.
    channel: Option<Box<dyn RemoteChannel>>,
    /// 0 = no remote transaction, 1 = top level, n > 1 = savepoint `s<n>` open.
    xact_depth: u32,
    /// A statement failed and the remote transaction was rolled back.
    aborted: bool,
    version: RemoteVersion,
    version_string: String,
    session_zone: FixedOffset,
}

impl CachedConnection {
    fn channel(&mut self) -> FdwResult<&mut Box<dyn RemoteChannel>> {
        self.channel
            .as_mut()
            .ok_or_else(|| FdwError::remote_connection("remote connection was closed"))
    }
}

/// Handle on a cached session, valid for the current local transaction
#[derive(Clone)]
pub struct SessionHandle {
    key: ConnectionKey,
    entry: Arc<Mutex<CachedConnection>>,
    pub version: RemoteVersion,
    pub version_string: String,
    pub session_zone: FixedOffset,
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("key", &self.key)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

impl SessionHandle {
    pub fn key(&self) -> &ConnectionKey {
        &self.key
    }
}

/// Process-local cache of remote sessions
pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    settings: FdwSettings,
    connections: RwLock<HashMap<ConnectionKey, Arc<Mutex<CachedConnection>>>>,
}

impl ConnectionManager {
    pub fn new(connector: Arc<dyn Connector>, settings: FdwSettings) -> Self {
        Self {
            connector,
            settings,
            connections: RwLock::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &FdwSettings {
        &self.settings
    }

    fn connect_params(&self, server: &ServerDescriptor, user: &UserMapping) -> ConnectParams {
        ConnectParams {
            db_path: server.db_path(),
            username: user.options.username.clone(),
            password: user.options.password.clone(),
            client_charset: self.settings.client_charset(),
            connect_timeout: self.settings.connect_timeout,
        }
    }

    async fn open(&self, server: &ServerDescriptor, user: &UserMapping) -> FdwResult<CachedConnection> {
        let params = self.connect_params(server, user);
        let channel = self.connector.connect(&params).await.map_err(|e| {
            FdwError::remote_connection(format!(
                "unable to connect to foreign server \"{}\": {}",
                server.name(),
                e.message
            ))
        })?;
        let version = channel.server_version();
        tracing::info!(
            server = %server.name(),
            db_path = %params.db_path,
            version = %version,
            "remote connection established"
        );
        Ok(CachedConnection {
            version,
            version_string: channel.server_version_string(),
            session_zone: channel.session_time_zone(),
            channel: Some(channel),
            xact_depth: 0,
            aborted: false,
        })
    }

    /// Returns the cached session for `(server, user)`, connecting on first
    /// use, and makes sure a remote transaction (plus savepoints up to
    /// `nest_level`) is open.
    #[instrument(skip(self, server, user), fields(server = %server.name(), user = %user.local_user))]
    pub async fn acquire(
        &self,
        server: &ServerDescriptor,
        user: &UserMapping,
        nest_level: u32,
    ) -> FdwResult<SessionHandle> {
        let key = ConnectionKey::new(server, user);

        let existing = self.connections.read().await.get(&key).cloned();
        let entry = match existing {
            Some(entry) => {
                let mut conn = entry.lock().await;
                let healthy = match conn.channel.as_mut() {
                    Some(channel) => channel.is_healthy().await,
                    None => false,
                };
                if healthy {
                    drop(conn);
                    entry
                } else if conn.xact_depth > 0 {
                    conn.channel = None;
                    drop(conn);
                    self.connections.write().await.remove(&key);
                    return Err(FdwError::remote_connection(format!(
                        "connection to foreign server \"{}\" was lost inside a transaction",
                        server.name()
                    )));
                } else {
                    tracing::warn!(server = %server.name(), "cached remote connection is unhealthy, reconnecting");
                    *conn = self.open(server, user).await?;
                    drop(conn);
                    entry
                }
            }
            None => {
                let entry = Arc::new(Mutex::new(self.open(server, user).await?));
                self.connections.write().await.insert(key.clone(), Arc::clone(&entry));
                entry
            }
        };

        let handle = {
            let mut conn = entry.lock().await;
            if conn.aborted {
                return Err(aborted_error());
            }
            self.begin(&key, &mut conn, nest_level.max(1)).await?;
            SessionHandle {
                key,
                version: conn.version,
                version_string: conn.version_string.clone(),
                session_zone: conn.session_zone,
                entry: Arc::clone(&entry),
            }
        };
        Ok(handle)
    }

    async fn begin(&self, key: &ConnectionKey, conn: &mut CachedConnection, nest_level: u32) -> FdwResult<()> {
        if conn.xact_depth == 0 {
            self.run(key, conn, "SET TRANSACTION SNAPSHOT", &[]).await?;
            conn.xact_depth = 1;
        }
        while conn.xact_depth < nest_level {
            let sql = format!("SAVEPOINT s{}", conn.xact_depth + 1);
            self.run(key, conn, &sql, &[]).await?;
            conn.xact_depth += 1;
        }
        Ok(())
    }

    /// Runs one statement and applies the failure policy: connection-fatal
    /// errors evict the session, statement errors roll the remote
    /// transaction back and poison the entry until the local abort.
    async fn run(
        &self,
        key: &ConnectionKey,
        conn: &mut CachedConnection,
        sql: &str,
        params: &[RemoteValue],
    ) -> FdwResult<RemoteResult> {
        tracing::debug!(sql = %sql, params = params.len(), "remote statement");
        let result = conn.channel()?.execute(sql, params).await;
        match result {
            Ok(result) => Ok(result),
            Err(remote) => {
                let err = remote.into_fdw(Some(sql));
                if err.is_connection_fatal() {
                    tracing::warn!(server = %key.server.0, error = %err, "remote connection lost, evicting");
                    self.evict(key, conn).await;
                } else {
                    tracing::debug!(server = %key.server.0, error = %err, "remote statement failed, rolling back");
                    if let Ok(channel) = conn.channel() {
                        if let Err(e) = channel.rollback().await {
                            tracing::warn!(error = %e, "rollback after statement error failed");
                        }
                    }
                    conn.aborted = true;
                }
                Err(err)
            }
        }
    }

    async fn evict(&self, key: &ConnectionKey, conn: &mut CachedConnection) {
        if let Some(mut channel) = conn.channel.take() {
            if let Err(e) = channel.close().await {
                tracing::warn!(server = %key.server.0, error = %e, "error closing evicted remote connection");
            }
        }
        conn.xact_depth = 0;
        conn.aborted = false;
        // Stale handles fail on the missing channel before reaching here, so
        // the cached entry for `key` is always the one being evicted.
        self.connections.write().await.remove(key);
    }

    /// Drops the session behind `handle`; the next acquisition reconnects.
    pub async fn invalidate(&self, handle: &SessionHandle) {
        let mut conn = handle.entry.lock().await;
        if conn.channel.is_some() {
            tracing::info!(server = %handle.key.server.0, "remote session invalidated");
            self.evict(&handle.key, &mut conn).await;
        }
    }

    /// Executes `sql` on the session behind `handle`.
    pub async fn execute(
        &self,
        handle: &SessionHandle,
        sql: &str,
        params: &[RemoteValue],
    ) -> FdwResult<RemoteResult> {
        let mut conn = handle.entry.lock().await;
        if conn.aborted {
            return Err(aborted_error());
        }
        self.run(&handle.key, &mut conn, sql, params).await
    }

    async fn entries(&self) -> Vec<(ConnectionKey, Arc<Mutex<CachedConnection>>)> {
        self.connections
            .read()
            .await
            .iter()
            .map(|(k, v)| (k.clone(), Arc::clone(v)))
            .collect()
    }

    /// Local pre-commit: commits every open remote transaction.
    ///
    /// Fails if any session had a statement error in this transaction; the
    /// caller must then abort locally.
    #[instrument(skip(self))]
    pub async fn pre_commit(&self) -> FdwResult<()> {
        let mut first_error = None;
        for (key, entry) in self.entries().await {
            let mut conn = entry.lock().await;
            if conn.xact_depth == 0 {
                continue;
            }
            if conn.aborted {
                first_error.get_or_insert_with(aborted_error);
                continue;
            }
            let committed = match conn.channel() {
                Ok(channel) => channel.commit().await.map_err(|e| e.into_fdw(Some("COMMIT"))),
                Err(e) => Err(e),
            };
            match committed {
                Ok(()) => {
                    conn.xact_depth = 0;
                    tracing::debug!(server = %key.server.0, "remote transaction committed");
                }
                Err(err) => {
                    if err.is_connection_fatal() {
                        self.evict(&key, &mut conn).await;
                    } else {
                        conn.aborted = true;
                    }
                    first_error.get_or_insert(err);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Local abort: rolls back every open remote transaction and clears
    /// aborted state.
    #[instrument(skip(self))]
    pub async fn abort(&self) {
        for (key, entry) in self.entries().await {
            let mut conn = entry.lock().await;
            if conn.xact_depth == 0 && !conn.aborted {
                continue;
            }
            if !conn.aborted {
                let rolled_back = match conn.channel() {
                    Ok(channel) => channel.rollback().await.map_err(|e| e.into_fdw(Some("ROLLBACK"))),
                    Err(e) => Err(e),
                };
                if let Err(err) = rolled_back {
                    tracing::warn!(server = %key.server.0, error = %err, "remote rollback failed");
                    if err.is_connection_fatal() {
                        self.evict(&key, &mut conn).await;
                    }
                }
            }
            conn.xact_depth = 0;
            conn.aborted = false;
        }
    }

    /// Local savepoint release at `level`.
    pub async fn subxact_commit(&self, level: u32) -> FdwResult<()> {
        for (key, entry) in self.entries().await {
            let mut conn = entry.lock().await;
            if conn.xact_depth < level || level < 2 || conn.aborted {
                continue;
            }
            let sql = format!("RELEASE SAVEPOINT s{level}");
            self.run(&key, &mut conn, &sql, &[]).await?;
            conn.xact_depth = level - 1;
        }
        Ok(())
    }

    /// Local savepoint rollback at `level`.
    pub async fn subxact_abort(&self, level: u32) -> FdwResult<()> {
        for (key, entry) in self.entries().await {
            let mut conn = entry.lock().await;
            if conn.xact_depth < level || level < 2 {
                continue;
            }
            if !conn.aborted {
                self.run(&key, &mut conn, &format!("ROLLBACK TO SAVEPOINT s{level}"), &[])
                    .await?;
                self.run(&key, &mut conn, &format!("RELEASE SAVEPOINT s{level}"), &[])
                    .await?;
            }
            conn.xact_depth = level - 1;
        }
        Ok(())
    }

    /// Closes every cached session; returns how many were closed.
    #[instrument(skip(self))]
    pub async fn close_all(&self) -> usize {
        let drained: Vec<_> = self.connections.write().await.drain().collect();
        let mut closed = 0;
        for (key, entry) in drained {
            let mut conn = entry.lock().await;
            if let Some(mut channel) = conn.channel.take() {
                if conn.xact_depth > 0 && !conn.aborted {
                    if let Err(e) = channel.rollback().await {
                        tracing::warn!(server = %key.server.0, error = %e, "rollback before close failed");
                    }
                }
                if let Err(e) = channel.close().await {
                    tracing::warn!(server = %key.server.0, error = %e, "error closing remote connection");
                }
                closed += 1;
            }
            conn.xact_depth = 0;
        }
        tracing::info!(closed, "cached remote connections closed");
        closed
    }

    pub async fn cached_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Remote transaction depth of a cached session, for diagnostics.
    pub async fn transaction_depth(&self, key: &ConnectionKey) -> Option<u32> {
        let entry = self.connections.read().await.get(key).cloned()?;
        let depth = entry.lock().await.xact_depth;
        Some(depth)
    }
}

fn aborted_error() -> FdwError {
    FdwError::remote_statement(
        "remote transaction aborted",
        Some("an earlier statement failed; the local transaction must be rolled back".to_string()),
        None,
    )
}
