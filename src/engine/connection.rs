//! DuckDB connection wrapper with streaming query execution.
//!
//! The Connection is wrapped in a Mutex because duckdb::Connection contains
//! RefCell internally and is not Sync. Each query runs on its own clone of the
//! session connection, on the blocking pool, and hands batches to the caller
//! through a bounded channel, so the engine only fetches ahead by
//! `prefetch_batches` batches. A stream the caller stops pulling holds its
//! clone only; the session connection stays free for other statements.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use duckdb::arrow::datatypes::SchemaRef;
use duckdb::arrow::record_batch::RecordBatch;
use duckdb::Connection;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, instrument};

use crate::engine::{EngineConnection, NativeBatchStream};
use crate::error::DataSourceError;

pub struct DuckDbConnection {
    conn: Arc<Mutex<Connection>>,
    init_sql: Arc<str>,
    prefetch_batches: usize,
}

impl DuckDbConnection {
    /// `init_sql` runs on every per-query clone.
    pub fn new(conn: Connection, init_sql: impl Into<Arc<str>>, prefetch_batches: usize) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            init_sql: init_sql.into(),
            prefetch_batches: prefetch_batches.max(1),
        }
    }

    fn reject_nul(sql: &str) -> Result<(), DataSourceError> {
        if sql.contains('\0') {
            return Err(DataSourceError::Query("SQL contains null bytes".to_string()));
        }
        Ok(())
    }
}

type BatchSender = mpsc::Sender<Result<RecordBatch, DataSourceError>>;

/// Clone the session connection for one query and apply the session settings.
fn clone_for_query(conn: &Mutex<Connection>, init_sql: &str) -> Result<Connection, DataSourceError> {
    let clone = {
        let guard = conn
            .lock()
            .map_err(|_| DataSourceError::Internal("connection mutex poisoned".to_string()))?;
        guard.try_clone().map_err(DataSourceError::connection)?
    };
    clone
        .execute_batch(init_sql)
        .map_err(DataSourceError::connection)?;
    Ok(clone)
}

/// Body of the blocking producer task for one query.
///
/// The schema (or the error preventing execution) is reported first; batches
/// follow until the engine is exhausted or the consumer hangs up.
fn produce_batches(
    conn: &Connection,
    sql: &str,
    schema_tx: oneshot::Sender<Result<SchemaRef, DataSourceError>>,
    tx: BatchSender,
) {
    let mut stmt = match conn.prepare(sql) {
        Ok(stmt) => stmt,
        Err(err) => {
            let _ = schema_tx.send(Err(DataSourceError::query(err)));
            return;
        }
    };
    let arrow = match stmt.query_arrow([]) {
        Ok(arrow) => arrow,
        Err(err) => {
            let _ = schema_tx.send(Err(DataSourceError::query(err)));
            return;
        }
    };
    if schema_tx.send(Ok(arrow.get_schema())).is_err() {
        return;
    }

    let mut delivered = 0usize;
    for batch in arrow {
        if tx.blocking_send(Ok(batch)).is_err() {
            debug!(delivered, "consumer stopped pulling; abandoning query");
            return;
        }
        delivered += 1;
    }
    debug!(delivered, "query result exhausted");
}

#[async_trait]
impl EngineConnection for DuckDbConnection {
    #[instrument(skip(self), fields(sql = %sql))]
    async fn query(&self, sql: &str) -> Result<NativeBatchStream, DataSourceError> {
        Self::reject_nul(sql)?;
        let conn = Arc::clone(&self.conn);
        let init_sql = Arc::clone(&self.init_sql);
        let sql = sql.to_string();
        let (tx, rx) = mpsc::channel(self.prefetch_batches);
        let (schema_tx, schema_rx) = oneshot::channel();

        tokio::task::spawn_blocking(move || match clone_for_query(&conn, &init_sql) {
            Ok(query_conn) => produce_batches(&query_conn, &sql, schema_tx, tx),
            Err(err) => {
                let _ = schema_tx.send(Err(err));
            }
        });

        let schema = schema_rx.await.map_err(|_| {
            DataSourceError::Internal("query task ended before reporting a schema".to_string())
        })??;
        debug!(field_count = schema.fields().len(), "query submitted");
        Ok(NativeBatchStream::from_receiver(schema, rx))
    }

    #[instrument(skip(self), fields(sql = %sql))]
    async fn execute(&self, sql: &str) -> Result<(), DataSourceError> {
        Self::reject_nul(sql)?;
        let conn = Arc::clone(&self.conn);
        let sql = sql.to_string();
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| DataSourceError::Internal("connection mutex poisoned".to_string()))?;
            guard.execute_batch(&sql).map_err(DataSourceError::query)
        })
        .await
        .map_err(DataSourceError::from_join)??;
        debug!("executed statement");
        Ok(())
    }
}
