use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::config::SourceConfig;
use crate::error::DataSourceError;
use crate::query::stream::ResultBatchStream;
use crate::session::ConnectionManager;
use crate::sql::{create_view_sql, QueryTranslator, StructuredQuery};
use crate::types::{Record, ResultBatch};

/// Parameters of [`BatchStreamExecutor::query`]. Raw SQL wins when both are set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<StructuredQuery>,
}

impl QueryParams {
    pub fn raw(sql: impl Into<String>) -> Self {
        Self {
            raw_query: Some(sql.into()),
            query: None,
        }
    }

    pub fn structured(query: StructuredQuery) -> Self {
        Self {
            raw_query: None,
            query: Some(query),
        }
    }
}

pub struct BatchStreamExecutor {
    manager: Arc<ConnectionManager>,
    config: Arc<SourceConfig>,
    translator: Arc<dyn QueryTranslator>,
}

impl BatchStreamExecutor {
    pub fn new(
        manager: Arc<ConnectionManager>,
        config: Arc<SourceConfig>,
        translator: Arc<dyn QueryTranslator>,
    ) -> Self {
        Self {
            manager,
            config,
            translator,
        }
    }

    /// Submit `sql` and return its lazily transformed batches.
    #[instrument(skip(self), fields(sql = %sql))]
    pub async fn stream_raw(&self, sql: &str) -> Result<ResultBatchStream, DataSourceError> {
        let conn = self.manager.ensure_connected().await?;
        let native = conn.query(sql).await?;
        Ok(ResultBatchStream::new(native))
    }

    /// Drain `sql` into a single batch.
    ///
    /// A non-negative `limit` stops pulling once that many rows have arrived and
    /// truncates to exactly `limit`.
    #[instrument(skip(self), fields(sql = %sql))]
    pub async fn query_native(
        &self,
        sql: &str,
        limit: Option<i64>,
    ) -> Result<ResultBatch, DataSourceError> {
        let limit = limit
            .filter(|limit| *limit >= 0)
            .map(|limit| usize::try_from(limit).unwrap_or(usize::MAX));
        let mut stream = self.stream_raw(sql).await?;
        let mut columns = None;
        let mut values: Vec<Record> = Vec::new();

        while let Some(batch) = stream.next_batch().await? {
            columns = Some(batch.columns);
            values.extend(batch.values);
            if let Some(limit) = limit {
                if values.len() >= limit {
                    values.truncate(limit);
                    break;
                }
            }
        }

        let columns = columns.unwrap_or_else(|| stream.columns().to_vec());
        debug!(
            rows = values.len(),
            batches = stream.batches_pulled(),
            "query drained"
        );
        Ok(ResultBatch { columns, values })
    }

    /// Run raw SQL or a translated structured query.
    ///
    /// Raw SQL is capped by `limit` or the configured raw limit. Structured
    /// queries are paginated in SQL with `limit` (or the preview limit) and
    /// `offset` (or 0).
    pub async fn query(
        &self,
        params: &QueryParams,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<ResultBatch, DataSourceError> {
        if let Some(sql) = params.raw_query.as_deref() {
            let limit = limit.unwrap_or(self.config.raw_limit);
            return self.query_native(sql, Some(limit)).await;
        }
        let query = params.query.as_ref().ok_or_else(|| {
            DataSourceError::Query("either a raw query or a structured query is required".into())
        })?;
        let sql = self.translator.translate(
            query,
            Some(limit.unwrap_or(self.config.preview_limit)),
            Some(offset.unwrap_or(0)),
        )?;
        self.query_native(&sql, None).await
    }

    /// `CREATE OR REPLACE VIEW` named `name` over the unpaginated query.
    #[instrument(skip(self, query))]
    pub async fn create_view(
        &self,
        name: &str,
        query: &StructuredQuery,
    ) -> Result<(), DataSourceError> {
        let sql = self.translator.translate(query, None, None)?;
        self.query_native(&create_view_sql(name, &sql), None).await?;
        Ok(())
    }
}
