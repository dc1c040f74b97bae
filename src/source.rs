use std::sync::Arc;

use tracing::info;

use crate::catalog::SchemaIntrospector;
use crate::config::SourceConfig;
use crate::engine::{DuckDbEngineProvider, EngineProvider};
use crate::error::DataSourceError;
use crate::files::{FileReference, RegistrationReport, VirtualFileRegistry};
use crate::query::{BatchStreamExecutor, QueryParams, ResultBatchStream};
use crate::session::{ConnectionManager, ConnectionState};
use crate::sql::{QueryTranslator, SqlTranslator, StructuredQuery};
use crate::types::{ResultBatch, TableInfo};

/// A named tabular data source backed by an embedded engine.
///
/// The engine is booted lazily on first use (or by [`DataSource::connect`]).
/// File operations other than [`DataSource::reset`] need a booted engine.
pub struct DataSource {
    name: String,
    config: Arc<SourceConfig>,
    manager: Arc<ConnectionManager>,
    files: VirtualFileRegistry,
    executor: Arc<BatchStreamExecutor>,
    catalog: SchemaIntrospector,
}

impl DataSource {
    pub fn new(
        name: impl Into<String>,
        config: SourceConfig,
        provider: Arc<dyn EngineProvider>,
    ) -> Self {
        Self::with_translator(name, config, provider, Arc::new(SqlTranslator))
    }

    /// A data source over an in-memory DuckDB database.
    pub fn duckdb(name: impl Into<String>, config: SourceConfig) -> Self {
        let provider = Arc::new(DuckDbEngineProvider::new(&config));
        Self::new(name, config, provider)
    }

    pub fn with_translator(
        name: impl Into<String>,
        config: SourceConfig,
        provider: Arc<dyn EngineProvider>,
        translator: Arc<dyn QueryTranslator>,
    ) -> Self {
        let name = name.into();
        let config = Arc::new(config);
        let manager = Arc::new(ConnectionManager::new(provider, config.extensions.clone()));
        let files = VirtualFileRegistry::new(manager.clone(), config.clone());
        let executor = Arc::new(BatchStreamExecutor::new(
            manager.clone(),
            config.clone(),
            translator,
        ));
        let catalog = SchemaIntrospector::new(executor.clone());
        info!(source = %name, extensions = ?config.extensions, "data source created");
        Self {
            name,
            config,
            manager,
            files,
            executor,
            catalog,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &SourceConfig {
        &self.config
    }

    /// Advisory batch size for callers; streams are not re-chunked to it.
    pub fn batch_size(&self) -> usize {
        self.config.batch_size
    }

    pub async fn state(&self) -> ConnectionState {
        self.manager.state().await
    }

    pub async fn connect(&self) -> Result<(), DataSourceError> {
        self.manager.connect().await
    }

    pub async fn test(&self) -> Result<(), DataSourceError> {
        self.manager.test().await
    }

    pub async fn import_file(
        &self,
        file: &FileReference,
    ) -> Result<RegistrationReport, DataSourceError> {
        self.files.register(file).await
    }

    pub async fn drop_file(&self, file: &FileReference) -> Result<(), DataSourceError> {
        self.files.unregister(file).await
    }

    pub async fn reset(&self) -> Result<(), DataSourceError> {
        self.files.reset().await
    }

    pub async fn list_files(&self) -> Result<Vec<String>, DataSourceError> {
        self.files.list_all().await
    }

    pub async fn import_remote_file(&self, url: &str) -> Result<(), DataSourceError> {
        self.files.import_remote(url).await
    }

    pub async fn query(
        &self,
        params: &QueryParams,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<ResultBatch, DataSourceError> {
        self.executor.query(params, limit, offset).await
    }

    pub async fn query_native(
        &self,
        sql: &str,
        limit: Option<i64>,
    ) -> Result<ResultBatch, DataSourceError> {
        self.executor.query_native(sql, limit).await
    }

    pub async fn stream_raw(&self, sql: &str) -> Result<ResultBatchStream, DataSourceError> {
        self.executor.stream_raw(sql).await
    }

    pub async fn create_view(
        &self,
        name: &str,
        query: &StructuredQuery,
    ) -> Result<(), DataSourceError> {
        self.executor.create_view(name, query).await
    }

    pub async fn get_datasets(&self) -> Result<Vec<TableInfo>, DataSourceError> {
        self.catalog.list_tables().await
    }
}

impl std::fmt::Debug for DataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataSource")
            .field("name", &self.name)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
