//! DuckDB engine bootstrap.
//!
//! The provider opens one in-memory database per data source. Connections are
//! clones of the root connection, so they share catalog state, created views
//! and the virtual filesystem.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use duckdb::{Config, Connection};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::config::SourceConfig;
use crate::engine::connection::DuckDbConnection;
use crate::engine::vfs::{ScratchFileSystem, VirtualFile};
use crate::engine::{Engine, EngineConnection, EngineProvider};
use crate::error::DataSourceError;

/// Provider for in-memory DuckDB engines.
#[derive(Debug, Clone)]
pub struct DuckDbEngineProvider {
    scratch_dir: Option<PathBuf>,
    prefetch_batches: usize,
}

impl DuckDbEngineProvider {
    pub fn new(config: &SourceConfig) -> Self {
        Self {
            scratch_dir: config.scratch_dir.clone(),
            prefetch_batches: config.prefetch_batches.max(1),
        }
    }
}

#[async_trait]
impl EngineProvider for DuckDbEngineProvider {
    #[instrument(skip(self))]
    async fn boot(&self) -> Result<Arc<dyn Engine>, DataSourceError> {
        let scratch_dir = self.scratch_dir.clone();
        let prefetch_batches = self.prefetch_batches;
        let engine = tokio::task::spawn_blocking(move || {
            DuckDbEngine::open(scratch_dir, prefetch_batches)
        })
        .await
        .map_err(DataSourceError::from_join)??;
        info!(scratch = %engine.files.root().display(), "DuckDB engine booted");
        Ok(Arc::new(engine))
    }
}

/// An in-memory DuckDB database plus its scratch-backed virtual filesystem.
pub struct DuckDbEngine {
    root: Arc<Mutex<Connection>>,
    files: Arc<ScratchFileSystem>,
    prefetch_batches: usize,
}

impl DuckDbEngine {
    /// Open the database. A temporary scratch directory is created (and later
    /// removed) when `scratch_dir` is not given.
    pub fn open(
        scratch_dir: Option<PathBuf>,
        prefetch_batches: usize,
    ) -> Result<Self, DataSourceError> {
        let config = Config::default()
            .enable_autoload_extension(true)
            .map_err(DataSourceError::connection)?;
        let conn =
            Connection::open_in_memory_with_flags(config).map_err(DataSourceError::connection)?;

        let files = match scratch_dir {
            Some(dir) => ScratchFileSystem::new(dir, false)?,
            None => {
                let dir = std::env::temp_dir().join(format!("duckbridge-{}", Uuid::new_v4()));
                ScratchFileSystem::new(dir, true)?
            }
        };

        Ok(Self {
            root: Arc::new(Mutex::new(conn)),
            files: Arc::new(files),
            prefetch_batches: prefetch_batches.max(1),
        })
    }

    fn search_path_sql(&self) -> String {
        let root = self.files.root().to_string_lossy().replace('\'', "''");
        format!("SET file_search_path = '{root}';")
    }

    async fn with_files<T, F>(&self, f: F) -> Result<T, DataSourceError>
    where
        T: Send + 'static,
        F: FnOnce(&ScratchFileSystem) -> Result<T, DataSourceError> + Send + 'static,
    {
        let files = Arc::clone(&self.files);
        tokio::task::spawn_blocking(move || f(&files))
            .await
            .map_err(DataSourceError::from_join)?
    }
}

#[async_trait]
impl Engine for DuckDbEngine {
    fn name(&self) -> &str {
        "duckdb"
    }

    #[instrument(skip(self))]
    async fn connect(&self) -> Result<Arc<dyn EngineConnection>, DataSourceError> {
        let root = Arc::clone(&self.root);
        let init_sql = self.search_path_sql();
        let session_sql = init_sql.clone();
        let conn = tokio::task::spawn_blocking(move || {
            let guard = root
                .lock()
                .map_err(|_| DataSourceError::Internal("root connection poisoned".to_string()))?;
            let conn = guard.try_clone().map_err(DataSourceError::connection)?;
            conn.execute_batch(&session_sql)
                .map_err(DataSourceError::connection)?;
            Ok::<_, DataSourceError>(conn)
        })
        .await
        .map_err(DataSourceError::from_join)??;

        info!("opened DuckDB connection");
        Ok(Arc::new(DuckDbConnection::new(
            conn,
            init_sql,
            self.prefetch_batches,
        )))
    }

    async fn register_file(&self, file: VirtualFile) -> Result<(), DataSourceError> {
        self.with_files(move |files| files.register(file)).await
    }

    async fn drop_file(&self, path: &str) -> Result<(), DataSourceError> {
        let path = path.to_string();
        self.with_files(move |files| files.drop_file(&path)).await
    }

    async fn drop_files(&self) -> Result<(), DataSourceError> {
        self.with_files(|files| files.drop_files()).await
    }

    async fn glob_files(&self, pattern: &str) -> Result<Vec<String>, DataSourceError> {
        let pattern = pattern.to_string();
        self.with_files(move |files| files.glob(&pattern)).await
    }
}
