// Firebird foreign data wrapper
// Core library

pub mod admin;
pub mod engine;
pub mod federation;
pub mod observability;
pub mod settings;

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use engine::{ConnectionManager, Connector};
use fdw_core::{FdwResult, ServerDescriptor, ServerId, UserMapping};
use federation::{
    analyze, import, planner, truncate, ForeignModify, ForeignRelation, ForeignScan, ImportFilter, ImportOptions,
    ImportReport, ModifyRequest, NestLevel, RelationEstimate, ScanRequest, TableStats, TruncateRequest,
};
use settings::FdwSettings;

type StatsKey = (ServerId, String);

/// Process-wide state shared by every foreign table operation.
pub struct FdwRuntime {
    settings: FdwSettings,
    connections: Arc<ConnectionManager>,
    stats: RwLock<HashMap<StatsKey, TableStats>>,
}

impl FdwRuntime {
    pub fn new(connector: Arc<dyn Connector>, settings: FdwSettings) -> Self {
        let connections = Arc::new(ConnectionManager::new(connector, settings.clone()));
        Self {
            settings,
            connections,
            stats: RwLock::new(HashMap::new()),
        }
    }

    /// Reads settings from the environment and installs logging.
    pub fn from_env(connector: Arc<dyn Connector>) -> FdwResult<Self> {
        let settings = FdwSettings::from_env()?;
        observability::init_tracing(&settings);
        Ok(Self::new(connector, settings))
    }

    pub fn settings(&self) -> &FdwSettings {
        &self.settings
    }

    pub fn connections(&self) -> &Arc<ConnectionManager> {
        &self.connections
    }

    /// Prepares a scan; the caller drives it with `begin`/`next`/`end`.
    pub fn scan(&self, relation: ForeignRelation, request: ScanRequest) -> ForeignScan {
        ForeignScan::new(Arc::clone(&self.connections), relation, request)
    }

    pub async fn modify(&self, relation: ForeignRelation, request: ModifyRequest) -> FdwResult<ForeignModify> {
        ForeignModify::begin(Arc::clone(&self.connections), relation, request).await
    }

    pub async fn truncate(&self, relations: &[ForeignRelation], request: TruncateRequest) -> FdwResult<u64> {
        truncate::truncate(&self.connections, relations, request).await
    }

    pub async fn import_schema(
        &self,
        server: &ServerDescriptor,
        user: &UserMapping,
        filter: &ImportFilter,
        options: &ImportOptions,
        nest_level: NestLevel,
    ) -> FdwResult<ImportReport> {
        import::import_schema(&self.connections, server, user, filter, options, nest_level).await
    }

    /// Analyzes `relation` and keeps the row count for later estimates.
    pub async fn analyze(
        &self,
        relation: ForeignRelation,
        target_rows: usize,
        nest_level: NestLevel,
    ) -> FdwResult<Option<TableStats>> {
        let key = (relation.server.id.clone(), relation.table.name.clone());
        let stats = analyze::analyze(Arc::clone(&self.connections), relation, target_rows, nest_level).await?;
        if let Some(stats) = &stats {
            self.stats.write().await.insert(key, stats.clone());
        }
        Ok(stats)
    }

    pub async fn estimate(&self, relation: &ForeignRelation, nest_level: NestLevel) -> FdwResult<RelationEstimate> {
        let key = (relation.server.id.clone(), relation.table.name.clone());
        let stats = self.stats.read().await.get(&key).cloned();
        planner::estimate(&self.connections, relation, stats.as_ref(), nest_level).await
    }

    pub async fn pre_commit(&self) -> FdwResult<()> {
        self.connections.pre_commit().await
    }

    pub async fn abort(&self) {
        self.connections.abort().await
    }

    pub async fn subxact_commit(&self, level: NestLevel) -> FdwResult<()> {
        self.connections.subxact_commit(level).await
    }

    pub async fn subxact_abort(&self, level: NestLevel) -> FdwResult<()> {
        self.connections.subxact_abort(level).await
    }

    pub async fn close_connections(&self) -> usize {
        admin::close_connections(&self.connections).await
    }

    /// Effective options of `server` and, when given, its user mapping.
    pub fn server_options(&self, server: &ServerDescriptor, user: Option<&UserMapping>) -> Vec<admin::Setting> {
        admin::server_options(server, user)
    }

    pub async fn diag_settings(&self) -> Vec<admin::Setting> {
        admin::diag_settings(&self.connections).await
    }

    pub async fn remote_version(
        &self,
        server: &ServerDescriptor,
        user: &UserMapping,
    ) -> FdwResult<admin::RemoteVersionInfo> {
        admin::remote_version(&self.connections, server, user).await
    }
}
