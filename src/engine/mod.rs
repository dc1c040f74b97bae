//! Embedded engine seam - boot, connections, native batch streams and the
//! engine-side virtual filesystem.
//!
//! This module provides:
//! - `EngineProvider`: injected bootstrap producing a shared `Engine`
//! - `Engine` / `EngineConnection`: what the data source needs from the engine
//! - `NativeBatchStream`: pull-based stream of Arrow batches for one query
//! - `DuckDbEngineProvider`: the DuckDB implementation

pub mod batch;
pub mod connection;
mod factory;
pub mod vfs;

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use duckdb::arrow::datatypes::SchemaRef;
use duckdb::arrow::record_batch::RecordBatch;
use futures::stream::{self, BoxStream};
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;

use crate::error::DataSourceError;

pub use connection::DuckDbConnection;
pub use factory::{DuckDbEngine, DuckDbEngineProvider};
pub use vfs::{FileProtocol, FileSource, VirtualFile};

/// Boots an engine instance. Called at most once per data source.
#[async_trait]
pub trait EngineProvider: Send + Sync {
    async fn boot(&self) -> Result<Arc<dyn Engine>, DataSourceError>;
}

/// A booted engine: hands out connections and owns the virtual filesystem.
#[async_trait]
pub trait Engine: Send + Sync {
    fn name(&self) -> &str;

    async fn connect(&self) -> Result<Arc<dyn EngineConnection>, DataSourceError>;

    /// Register (or overwrite) a virtual file.
    async fn register_file(&self, file: VirtualFile) -> Result<(), DataSourceError>;

    async fn drop_file(&self, path: &str) -> Result<(), DataSourceError>;

    async fn drop_files(&self) -> Result<(), DataSourceError>;

    /// Registered virtual paths matching a `*`/`?` glob.
    async fn glob_files(&self, pattern: &str) -> Result<Vec<String>, DataSourceError>;
}

/// An open session on the engine.
#[async_trait]
pub trait EngineConnection: Send + Sync {
    /// Submit `sql` and return its result as a lazily pulled batch stream.
    async fn query(&self, sql: &str) -> Result<NativeBatchStream, DataSourceError>;

    /// Run `sql` for its side effects, draining any result.
    async fn execute(&self, sql: &str) -> Result<(), DataSourceError> {
        let mut batches = self.query(sql).await?;
        while let Some(batch) = batches.next().await {
            batch?;
        }
        Ok(())
    }
}

/// Arrow batches of one query, in engine order.
///
/// The stream ends (`None`) once the engine has no more batches. It cannot be
/// restarted; dropping it abandons the remaining output.
pub struct NativeBatchStream {
    schema: SchemaRef,
    inner: BoxStream<'static, Result<RecordBatch, DataSourceError>>,
}

impl NativeBatchStream {
    pub fn new(
        schema: SchemaRef,
        inner: BoxStream<'static, Result<RecordBatch, DataSourceError>>,
    ) -> Self {
        Self { schema, inner }
    }

    /// Stream over batches that are already materialised.
    pub fn from_batches(schema: SchemaRef, batches: Vec<RecordBatch>) -> Self {
        Self::new(schema, stream::iter(batches.into_iter().map(Ok)).boxed())
    }

    /// Stream fed by a bounded channel; the sender side applies backpressure.
    pub fn from_receiver(
        schema: SchemaRef,
        rx: mpsc::Receiver<Result<RecordBatch, DataSourceError>>,
    ) -> Self {
        let inner = stream::unfold(rx, |mut rx| async move {
            let item = rx.recv().await?;
            Some((item, rx))
        })
        .boxed();
        Self::new(schema, inner)
    }

    /// Result schema declared by the engine before any batch was pulled.
    pub fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }
}

impl Stream for NativeBatchStream {
    type Item = Result<RecordBatch, DataSourceError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

impl std::fmt::Debug for NativeBatchStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeBatchStream")
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}
